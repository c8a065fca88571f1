// Pricing and catalog lookups
pub mod catalog;
pub mod discounts;

// Stock movements
pub mod inventory;

// Order state machine and its persistence
pub mod order_lifecycle;
pub mod order_number;
pub mod orders;

// Entry points that drive the state machine
pub mod checkout;
pub mod payment_reconciliation;
