pub mod controllers;
pub mod models;
pub mod repositories;
pub mod services;

pub use models::{WebhookRecord, WebhookStatus};
pub use repositories::{SqlxWebhookRepository, WebhookStore};
pub use services::{WebhookDelivery, WebhookIngestor, WebhookOutcome};
