// =============================================================================
// Drift-Corrected Clock — one authoritative time query, then local arithmetic
// =============================================================================
//
// External time queries are costly and rate-limited, so the clock queries the
// authoritative source exactly once at startup and thereafter derives the
// current time as reference + elapsed local monotonic time. Accurate within
// local clock-drift tolerances for a run measured in minutes to hours.
// =============================================================================

use std::time::{Duration, Instant};

use anyhow::Context;
use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::error::ClockInitError;

/// Timestamp format used for every snapshot row, e.g. `02:41:07.123456 PM`.
const TIME_FORMAT: &str = "%I:%M:%S%.6f %p";

// -----------------------------------------------------------------------------
// Time source collaborator
// -----------------------------------------------------------------------------

/// External authoritative time source. Queried exactly once, at startup.
pub trait TimeSource {
    fn query_authoritative_time(
        &self,
    ) -> impl std::future::Future<Output = Result<DateTime<Utc>, ClockInitError>> + Send;
}

/// Queries a server-time REST endpoint that answers with epoch milliseconds,
/// e.g. `{"serverTime": 1724668800123}`.
pub struct HttpTimeSource {
    url: String,
    client: reqwest::Client,
}

impl HttpTimeSource {
    pub fn new(url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .expect("failed to build reqwest client");

        Self {
            url: url.into(),
            client,
        }
    }

    async fn fetch_server_time_ms(&self) -> anyhow::Result<i64> {
        let resp = self
            .client
            .get(&self.url)
            .send()
            .await
            .context("server-time request failed")?;

        let status = resp.status();
        let body: serde_json::Value = resp
            .json()
            .await
            .context("failed to parse server-time response")?;

        if !status.is_success() {
            anyhow::bail!("server-time endpoint returned {}: {}", status, body);
        }

        body["serverTime"]
            .as_i64()
            .context("server-time response missing 'serverTime'")
    }
}

impl TimeSource for HttpTimeSource {
    async fn query_authoritative_time(&self) -> Result<DateTime<Utc>, ClockInitError> {
        let ms = self
            .fetch_server_time_ms()
            .await
            .map_err(|e| ClockInitError::Unreachable(format!("{e:#}")))?;

        let ts = DateTime::<Utc>::from_timestamp_millis(ms)
            .ok_or_else(|| ClockInitError::BadResponse(format!("epoch ms out of range: {ms}")))?;

        debug!(server_time = %ts, "authoritative time retrieved");
        Ok(ts)
    }
}

// -----------------------------------------------------------------------------
// Drift clock
// -----------------------------------------------------------------------------

/// Immutable after initialization: one authoritative instant paired with the
/// local monotonic instant sampled alongside it.
pub struct DriftClock {
    reference_utc: DateTime<Utc>,
    reference_instant: Instant,
}

impl DriftClock {
    /// Query the time source once and capture the reference pair. Failure
    /// here is fatal to startup; the process cannot proceed without a time
    /// reference.
    pub async fn initialize<S: TimeSource>(source: &S) -> Result<Self, ClockInitError> {
        let reference_utc = source.query_authoritative_time().await?;
        let reference_instant = Instant::now();

        info!(reference = %reference_utc, "drift clock initialized");
        Ok(Self {
            reference_utc,
            reference_instant,
        })
    }

    /// Build from an already-captured reference pair. Used by tests.
    #[cfg(test)]
    pub fn from_reference(reference_utc: DateTime<Utc>, reference_instant: Instant) -> Self {
        Self {
            reference_utc,
            reference_instant,
        }
    }

    /// Authoritative-time-equivalent of the current moment. Never re-queries
    /// the external source.
    pub fn now(&self) -> DateTime<Utc> {
        self.now_from(Instant::now())
    }

    /// Derive the authoritative time for an arbitrary local monotonic instant
    /// at or after the reference instant.
    pub fn now_from(&self, local_now: Instant) -> DateTime<Utc> {
        let elapsed = local_now.saturating_duration_since(self.reference_instant);
        self.reference_utc
            + chrono::Duration::from_std(elapsed).unwrap_or_else(|_| chrono::Duration::zero())
    }

    /// Render a timestamp in snapshot row format.
    pub fn timestamp_string(t: DateTime<Utc>) -> String {
        t.format(TIME_FORMAT).to_string()
    }
}

// -----------------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------------
