//! Transport capability for the license exchange.

use crate::{Error, Result};
use log::debug;
use reqwest::blocking::Client;
use reqwest::header;
use std::time::Duration;

/// Performs one network exchange with the license server.
///
/// Implementations map a timed-out attempt to
/// [`Error::TimeOut`](crate::Error::TimeOut) so the key source can retry it;
/// every other transport failure surfaces to the caller verbatim.
pub trait KeyFetcher: Send + Sync {
    /// POSTs `request` to `service_address` and returns the raw response
    /// body.
    fn fetch_keys(&self, service_address: &str, request: &str) -> Result<String>;
}

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default [`KeyFetcher`] over blocking HTTP.
pub struct HttpKeyFetcher {
    client: Client,
}

impl HttpKeyFetcher {
    /// Creates a fetcher with the default 30 second per-attempt timeout.
    pub fn new() -> Result<Self> {
        Self::with_timeout(DEFAULT_TIMEOUT)
    }

    /// Creates a fetcher with a custom per-attempt timeout.
    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Internal(format!("cannot build http client: {e}")))?;

        Ok(Self { client })
    }
}

impl KeyFetcher for HttpKeyFetcher {
    fn fetch_keys(&self, service_address: &str, request: &str) -> Result<String> {
        debug!("license request to {service_address}");

        let response = self
            .client
            .post(service_address)
            .header(header::CONTENT_TYPE, "application/json")
            .body(request.to_owned())
            .send()
            .map_err(|e| {
                if e.is_timeout() {
                    Error::TimeOut(format!("license request to {service_address} timed out"))
                } else {
                    Error::Network(format!("license request failed: {e}"))
                }
            })?;

        let status = response.status();
        let body = response
            .text()
            .map_err(|e| Error::Network(format!("cannot read license response: {e}")))?;

        if !status.is_success() {
            return Err(Error::Network(format!(
                "license server returned {status}: {body}"
            )));
        }

        Ok(body)
    }
}
