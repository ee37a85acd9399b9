use crate::core::Result;
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{policies::ExponentialBackoff, RetryTransientMiddleware};
use std::time::Duration;

/// Shared HTTP clients for gateway traffic.
///
/// The plain client is for non-idempotent calls (initialize, refund), which
/// must never be silently retried. The retrying client wraps the same
/// connection pool with exponential backoff and is for idempotent status and
/// health probes only.
#[derive(Clone)]
pub struct GatewayHttp {
    plain: reqwest::Client,
    retrying: ClientWithMiddleware,
}

impl GatewayHttp {
    pub fn new() -> Result<Self> {
        let plain = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .build()?;

        let retry_policy = ExponentialBackoff::builder().build_with_max_retries(3);
        let retrying = ClientBuilder::new(plain.clone())
            .with(RetryTransientMiddleware::new_with_policy(retry_policy))
            .build();

        Ok(Self { plain, retrying })
    }

    /// Client for calls that must execute at most once.
    pub fn plain(&self) -> &reqwest::Client {
        &self.plain
    }

    /// Client for idempotent lookups; retries transient failures.
    pub fn retrying(&self) -> &ClientWithMiddleware {
        &self.retrying
    }
}
