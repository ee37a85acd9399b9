pub mod adapters;
pub mod models;
pub mod repositories;
pub mod services;

pub use adapters::{CheckoutFlow, PaymentProvider};
pub use models::{GatewayConfig, GatewayCredentials, GatewayMode, GatewayName};
pub use repositories::{GatewayRegistry, SqlxGatewayRepository};
pub use services::{PaymentRouter, RouterOptions, RoutingStrategy};
