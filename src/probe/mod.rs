//! HTTP probe -- sends a randomized payload and measures round-trip time.

pub mod payload;

use crate::analysis::Sample;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use std::time::{Duration, Instant};
use tracing::warn;
use uuid::Uuid;

/// Trait for probe implementations.
#[async_trait]
pub trait Probe: Send + Sync {
    /// Execute one probe and return the measured sample. Transport failures
    /// still yield a sample (success=false) so outages show up in history.
    async fn run(&self) -> Result<Sample>;
}

/// POSTs a random JSON payload to the monitored endpoint and records the
/// elapsed wall time plus the response status.
pub struct HttpProbe {
    client: Client,
    url: String,
}

impl HttpProbe {
    pub fn new(url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            client,
            url: url.to_string(),
        })
    }
}

#[async_trait]
impl Probe for HttpProbe {
    async fn run(&self) -> Result<Sample> {
        let body = payload::random_payload();

        let start = Instant::now();
        let result = self.client.post(&self.url).json(&body).send().await;
        let value_ms = start.elapsed().as_secs_f64() * 1000.0;
        let timestamp = Utc::now();

        match result {
            Ok(resp) => Ok(Sample {
                id: Uuid::new_v4(),
                timestamp,
                value_ms,
                status_code: resp.status().as_u16(),
                success: resp.status().is_success(),
            }),
            Err(e) => {
                warn!(url = %self.url, error = %e, "Probe request failed");
                Ok(Sample {
                    id: Uuid::new_v4(),
                    timestamp,
                    value_ms,
                    status_code: 0,
                    success: false,
                })
            }
        }
    }
}
