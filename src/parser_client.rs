//! Upstream Parser client: fetches the unified match snapshot consumed by
//! the Aggregator and Detector, with bounded retries on transient failure.

use std::time::Duration;

use anyhow::{anyhow, Context};
use reqwest::Client;
use tokio::sync::watch;
use tracing::warn;

use crate::error::CalculatorError;
use crate::models::{Match, ParserMatchesResponse};

const FETCH_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_RETRIES: u32 = 3;
const RETRY_BACKOFF: Duration = Duration::from_secs(2);

pub struct ParserClient {
    client: Client,
    base_url: String,
}

impl ParserClient {
    pub fn new(base_url: String) -> Self {
        let client = Client::builder()
            .timeout(FETCH_TIMEOUT)
            .build()
            .expect("reqwest client builds with a fixed, valid config");
        Self { client, base_url }
    }

    /// Fetches the current match snapshot. Retries up to `MAX_RETRIES` times
    /// on connection-level failures (EOF, reset, refused), waiting
    /// `RETRY_BACKOFF` between attempts; a cancelled `shutdown` aborts
    /// between retries without another attempt.
    pub async fn fetch_matches(&self, shutdown: &mut watch::Receiver<bool>) -> Result<Vec<Match>, CalculatorError> {
        let url = format!("{}/matches", self.base_url.trim_end_matches('/'));
        let mut last_err = None;

        for attempt in 1..=MAX_RETRIES {
            match self.try_fetch(&url).await {
                Ok(matches) => return Ok(matches),
                Err(err) => {
                    let transient = is_transient(&err);
                    warn!(attempt, error = %err, transient, "parser fetch failed");
                    last_err = Some(err);
                    if !transient || attempt == MAX_RETRIES {
                        break;
                    }
                    tokio::select! {
                        _ = tokio::time::sleep(RETRY_BACKOFF) => {}
                        _ = shutdown.changed() => {
                            if *shutdown.borrow() {
                                break;
                            }
                        }
                    }
                }
            }
        }

        Err(CalculatorError::Upstream(
            last_err.map(|e| e.to_string()).unwrap_or_else(|| "parser fetch exhausted retries".into()),
        ))
    }

    async fn try_fetch(&self, url: &str) -> anyhow::Result<Vec<Match>> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .context("sending request to parser")?;

        if !response.status().is_success() {
            return Err(anyhow!("parser returned {}", response.status()));
        }

        let body: ParserMatchesResponse = response.json().await.context("decoding parser response")?;
        Ok(body.matches)
    }
}

fn is_transient(err: &anyhow::Error) -> bool {
    if let Some(reqwest_err) = err.downcast_ref::<reqwest::Error>() {
        return reqwest_err.is_timeout() || reqwest_err.is_connect() || reqwest_err.is_request();
    }
    let msg = err.to_string();
    msg.contains("EOF") || msg.contains("connection reset") || msg.contains("connection refused")
}
