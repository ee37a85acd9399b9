pub mod order;

pub use order::{OrderPaymentStatus, PrintOrder};
