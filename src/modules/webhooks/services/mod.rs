pub mod ingestor;
pub mod interpreters;

pub use ingestor::{WebhookDelivery, WebhookIngestor, WebhookOutcome};
pub use interpreters::{Interpretation, TxnReference, WebhookAction};
