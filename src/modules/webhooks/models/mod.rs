pub mod webhook_record;

pub use webhook_record::{sanitize_headers, WebhookRecord, WebhookStatus};
