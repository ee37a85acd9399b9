pub mod models;
pub mod repositories;
pub mod services;

pub use models::{OrderPaymentStatus, PrintOrder};
pub use repositories::{OrderStore, SqlxOrderRepository};
pub use services::{LoggingCompletionHook, PaymentCompleted, PaymentCompletedHook};
