use chrono::{DateTime, Utc};
use rand::Rng;

/// Crockford-style alphabet: no I, L, O or U to keep numbers readable over the phone.
const ALPHABET: &[u8] = b"0123456789ABCDEFGHJKMNPQRSTVWXYZ";
const SUFFIX_LEN: usize = 8;

/// Produces candidate order numbers. Uniqueness is enforced by the database;
/// callers retry on collision.
pub trait OrderNumberGenerator: Send + Sync {
    fn generate(&self, now: DateTime<Utc>) -> String;
}

/// `PREFIX-YYYYMMDD-XXXXXXXX`
#[derive(Debug, Clone)]
pub struct RandomOrderNumberGenerator {
    prefix: String,
}

impl RandomOrderNumberGenerator {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }
}

impl OrderNumberGenerator for RandomOrderNumberGenerator {
    fn generate(&self, now: DateTime<Utc>) -> String {
        let mut rng = rand::thread_rng();
        let suffix: String = (0..SUFFIX_LEN)
            .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
            .collect();
        format!("{}-{}-{}", self.prefix, now.format("%Y%m%d"), suffix)
    }
}
