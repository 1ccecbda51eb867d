use std::{ops::Deref, time::Duration};

use reqwest::{Client, ClientBuilder, IntoUrl, Response, StatusCode};

use crate::error::ProxyResult;

/// Retry transient failures with exponential backoff.
///
/// The n-th retry waits `backoff_factor * 2^(n-1)`, capped at [`RetryPolicy::MAX_BACKOFF`].
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Maximum number of retries after the first request.
    pub attempts: u32,
    pub backoff_factor: Duration,
    /// Responses with these statuses are retried.
    pub statuses: Vec<StatusCode>,
}

impl RetryPolicy {
    pub const MAX_BACKOFF: Duration = Duration::from_secs(120);

    pub fn none() -> Self {
        Self {
            attempts: 0,
            ..Default::default()
        }
    }

    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts;
        self
    }

    pub fn with_backoff_factor(mut self, backoff_factor: Duration) -> Self {
        self.backoff_factor = backoff_factor;
        self
    }

    pub fn backoff(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(16);
        self.backoff_factor
            .saturating_mul(1 << exponent)
            .min(Self::MAX_BACKOFF)
    }

    fn should_retry(&self, result: &reqwest::Result<Response>) -> bool {
        match result {
            Ok(response) => self.statuses.contains(&response.status()),
            Err(e) => e.is_connect() || e.is_timeout(),
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 15,
            backoff_factor: Duration::from_millis(100),
            statuses: vec![
                StatusCode::TOO_MANY_REQUESTS,
                StatusCode::INTERNAL_SERVER_ERROR,
                StatusCode::BAD_GATEWAY,
                StatusCode::SERVICE_UNAVAILABLE,
                StatusCode::GATEWAY_TIMEOUT,
            ],
        }
    }
}

#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
    retry: RetryPolicy,
}

impl HttpClient {
    pub fn new(builder: ClientBuilder, retry: RetryPolicy) -> ProxyResult<Self> {
        let client = builder.build()?;
        Ok(Self { client, retry })
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// GET `url`, retrying according to the [`RetryPolicy`].
    ///
    /// The last response is returned as is once retries are exhausted, its status still
    /// needs to be checked by the caller.
    pub async fn get_with_retry(&self, url: impl IntoUrl) -> ProxyResult<Response> {
        let url = url.into_url()?;
        let mut retries = 0;

        loop {
            let result = self.client.get(url.clone()).send().await;
            if retries >= self.retry.attempts || !self.retry.should_retry(&result) {
                return Ok(result?);
            }

            retries += 1;
            let backoff = self.retry.backoff(retries);
            match &result {
                Ok(response) => tracing::debug!(
                    "{url} returned {}, retry {retries}/{} in {backoff:?}",
                    response.status(),
                    self.retry.attempts
                ),
                Err(e) => tracing::debug!(
                    "Requesting {url} failed, retry {retries}/{} in {backoff:?}. {e}",
                    self.retry.attempts
                ),
            }
            tokio::time::sleep(backoff).await;
        }
    }
}

impl Default for HttpClient {
    fn default() -> Self {
        Self {
            client: Client::new(),
            retry: RetryPolicy::default(),
        }
    }
}

impl Deref for HttpClient {
    type Target = Client;

    fn deref(&self) -> &Self::Target {
        &self.client
    }
}
