use hmac::{Hmac, Mac};
use sha2::Sha256;

use super::{GatewayError, GatewayResult};

type HmacSha256 = Hmac<Sha256>;

/// Values of the `x-timestamp` / `x-signature` headers of a notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationSignature {
    pub timestamp: String,
    pub signature: String,
}

/// HMAC-SHA256 over `"{timestamp}.{body}"`, hex encoded.
#[derive(Clone)]
pub struct WebhookVerifier {
    secret: String,
    tolerance_secs: i64,
}

impl std::fmt::Debug for WebhookVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookVerifier")
            .field("tolerance_secs", &self.tolerance_secs)
            .finish_non_exhaustive()
    }
}

impl WebhookVerifier {
    pub fn new(secret: impl Into<String>, tolerance_secs: i64) -> Self {
        Self {
            secret: secret.into(),
            tolerance_secs,
        }
    }

    fn mac(&self, timestamp: &str, body: &[u8]) -> GatewayResult<HmacSha256> {
        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
            .map_err(|e| GatewayError::Authenticity(e.to_string()))?;
        mac.update(timestamp.as_bytes());
        mac.update(b".");
        mac.update(body);
        Ok(mac)
    }

    pub fn sign(&self, timestamp: i64, body: &[u8]) -> GatewayResult<NotificationSignature> {
        let timestamp = timestamp.to_string();
        let mac = self.mac(&timestamp, body)?;
        Ok(NotificationSignature {
            signature: hex::encode(mac.finalize().into_bytes()),
            timestamp,
        })
    }

    /// Checks freshness against `now` (unix seconds) and the MAC in constant time.
    pub fn verify(
        &self,
        signature: &NotificationSignature,
        body: &[u8],
        now: i64,
    ) -> GatewayResult<()> {
        let sent_at: i64 = signature
            .timestamp
            .trim()
            .parse()
            .map_err(|_| GatewayError::Authenticity("timestamp is not a unix time".into()))?;

        let skew = now.checked_sub(sent_at).map(i64::unsigned_abs);
        if skew.map_or(true, |skew| skew > self.tolerance_secs.unsigned_abs()) {
            return Err(GatewayError::Authenticity(format!(
                "timestamp outside {}s tolerance",
                self.tolerance_secs
            )));
        }

        let provided = hex::decode(signature.signature.trim())
            .map_err(|_| GatewayError::Authenticity("signature is not hex".into()))?;

        self.mac(signature.timestamp.trim(), body)?
            .verify_slice(&provided)
            .map_err(|_| GatewayError::Authenticity("signature mismatch".into()))
    }
}
