//! Payment core for the print storefront.
//!
//! Routes checkout sessions across Razorpay, Stripe, PhonePe and PayU with
//! ordered fallback, keeps an append-only transaction ledger, and ingests
//! gateway webhooks idempotently.

pub mod config;
pub mod core;
pub mod middleware;
pub mod modules;

pub use modules::gateways;
pub use modules::orders;
pub use modules::transactions;
pub use modules::webhooks;
