pub mod router;
pub mod stats;

pub use router::{
    FleetHealth, GatewayHealth, PaymentRouter, RouterOptions, RoutingStrategy, SelectionCriteria,
};
pub use stats::ProviderStats;
