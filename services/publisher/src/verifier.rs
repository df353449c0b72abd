use anyhow::{Context, Result};
use parking_lot::Mutex;
use reqwest::{Client as HttpClient, Response, Url};
use std::time::Duration;
use tracing::{info, instrument, warn};

/// Fetches a freshly published URL the way a downstream embed proxy would.
///
/// With `close_response_body` off, each response is kept alive inside the
/// fetcher and never read or dropped. Its connection never returns to the
/// pool, so open connections grow by one per verification.
pub struct Verifier {
    client: HttpClient,
    close_response_body: bool,
    retained: Mutex<Vec<Response>>,
}

impl Verifier {
    pub fn new(close_response_body: bool, timeout: Option<Duration>) -> Result<Self> {
        let mut builder = HttpClient::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .context("Failed to create HTTP client for verification")?;

        Ok(Self {
            client,
            close_response_body,
            retained: Mutex::new(Vec::new()),
        })
    }

    pub fn closes_response_body(&self) -> bool {
        self.close_response_body
    }

    /// Number of responses whose bodies were never released
    pub fn open_responses(&self) -> usize {
        self.retained.lock().len()
    }

    /// Issue a single GET against `public_url`.
    ///
    /// Any HTTP response counts as reachable; only transport errors and
    /// unparseable URLs fail.
    #[instrument(skip(self), fields(close_body = self.close_response_body))]
    pub async fn verify(&self, public_url: &str) -> Result<()> {
        let url = Url::parse(public_url)
            .with_context(|| format!("Invalid verification URL {public_url}"))?;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .context("Verification request failed")?;

        let status = response.status();
        if status.is_success() {
            info!(status = status.as_u16(), "Verification fetch completed");
        } else {
            warn!(status = status.as_u16(), "Verification fetch returned non-success status");
        }

        if self.close_response_body {
            drop(response);
        } else {
            let mut retained = self.retained.lock();
            retained.push(response);
            metrics::gauge!("verification_open_responses").set(retained.len() as f64);
        }

        Ok(())
    }
}
