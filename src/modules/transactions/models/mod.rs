pub mod transaction;

pub use transaction::{PaymentConfirmation, PaymentTransaction, TransactionStatus};
