pub mod gateways;
pub mod orders;
pub mod transactions;
pub mod webhooks;
