//! Durable-store gateway client
//!
//! The gateway is the only persistence mechanism in the system: the core
//! never touches a database. Decisions and telemetry are appended over
//! HTTP with bearer + API-key auth; the gateway deduplicates on
//! `decision_id`.

use modelbench_core::{DecisionRecord, Error, Result, TelemetryEvent, TtlCache};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Base URL of the ruvector durable-store service
    pub base_url: String,
    pub api_key: String,
    /// Per-request timeout
    pub timeout: Duration,
}

impl GatewayConfig {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            timeout: Duration::from_secs(5),
        }
    }
}

pub struct GatewayClient {
    config: GatewayConfig,
    client: reqwest::Client,
}

impl GatewayClient {
    pub fn new(config: GatewayConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .use_rustls_tls()
            .build()
            .map_err(|e| Error::Config(format!("failed to create gateway client: {}", e)))?;
        Ok(Self { config, client })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    /// Append a decision record. 2xx means accepted; the gateway is
    /// idempotent on `decision_id`.
    pub async fn append_decision(&self, record: &DecisionRecord) -> Result<()> {
        let response = self
            .client
            .post(self.url("/api/v1/decisions"))
            .bearer_auth(&self.config.api_key)
            .header("X-API-Key", &self.config.api_key)
            .json(record)
            .send()
            .await
            .map_err(|e| Error::Persistence(format!("gateway unreachable: {}", e)))?;
        if !response.status().is_success() {
            return Err(Error::Persistence(format!(
                "gateway rejected decision: HTTP {}",
                response.status().as_u16()
            )));
        }
        debug!(decision_id = %record.decision_id, "decision persisted");
        Ok(())
    }

    /// Append a telemetry event.
    pub async fn append_telemetry(&self, event: &TelemetryEvent) -> Result<()> {
        let response = self
            .client
            .post(self.url("/api/v1/telemetry"))
            .bearer_auth(&self.config.api_key)
            .header("X-API-Key", &self.config.api_key)
            .json(event)
            .send()
            .await
            .map_err(|e| Error::Persistence(format!("gateway unreachable: {}", e)))?;
        if !response.status().is_success() {
            return Err(Error::Persistence(format!(
                "gateway rejected telemetry: HTTP {}",
                response.status().as_u16()
            )));
        }
        Ok(())
    }

    /// Liveness probe. Startup aborts on failure; at runtime the health
    /// endpoints report the cached result.
    pub async fn liveness(&self) -> Result<()> {
        let response = self
            .client
            .get(self.url("/health"))
            .send()
            .await
            .map_err(|e| Error::Persistence(format!("gateway liveness probe failed: {}", e)))?;
        if !response.status().is_success() {
            return Err(Error::Persistence(format!(
                "gateway liveness probe returned HTTP {}",
                response.status().as_u16()
            )));
        }
        Ok(())
    }
}

/// Most-recent liveness result with a short TTL, so the health endpoints
/// do not probe the gateway on every scrape.
pub struct GatewayHealth {
    gateway: Arc<GatewayClient>,
    cache: TtlCache<&'static str, bool>,
}

const HEALTH_KEY: &str = "gateway";

impl GatewayHealth {
    pub fn new(gateway: Arc<GatewayClient>) -> Self {
        Self {
            gateway,
            cache: TtlCache::new(1, Duration::from_secs(10)),
        }
    }

    pub async fn is_healthy(&self) -> bool {
        if let Some(cached) = self.cache.get(&HEALTH_KEY) {
            return cached;
        }
        let healthy = self.gateway.liveness().await.is_ok();
        self.cache.insert(HEALTH_KEY, healthy);
        healthy
    }
}
