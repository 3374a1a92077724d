//! Write-behind decision persistence
//!
//! Emission never blocks the caller: records land in a bounded in-memory
//! buffer and a dedicated flusher drains it to the gateway. Overflow drops
//! the oldest entries and emits a `persistence_drop` telemetry event so
//! the loss stays observable. Shutdown drains until empty or a 10 s
//! deadline elapses.

use crate::gateway::GatewayClient;
use modelbench_core::{
    ConfidenceFactor, Constraint, DecisionRecord, ExecutionRef, TelemetryEvent,
};
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub buffer_capacity: usize,
    pub flush_attempts: u32,
    pub attempt_timeout: Duration,
    pub drain_deadline: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            buffer_capacity: 256,
            flush_attempts: 3,
            attempt_timeout: Duration::from_secs(5),
            drain_deadline: Duration::from_secs(10),
        }
    }
}

enum PersistItem {
    Decision(Box<DecisionRecord>),
    Telemetry(TelemetryEvent),
}

struct PipelineInner {
    buffer: Mutex<VecDeque<PersistItem>>,
    notify: Notify,
    gateway: Arc<GatewayClient>,
    config: PipelineConfig,
    shutdown: CancellationToken,
    dropped: AtomicU64,
}

impl PipelineInner {
    /// Drop-oldest enqueue; producers never block.
    fn enqueue(&self, item: PersistItem) {
        let mut dropped_agent: Option<String> = None;
        {
            let mut buffer = self.buffer.lock().expect("persist buffer poisoned");
            if buffer.len() >= self.config.buffer_capacity {
                if let Some(oldest) = buffer.pop_front() {
                    self.dropped.fetch_add(1, Ordering::Relaxed);
                    dropped_agent = Some(match oldest {
                        PersistItem::Decision(record) => record.agent_id,
                        PersistItem::Telemetry(event) => event.agent_id,
                    });
                }
            }
            buffer.push_back(item);
        }
        if let Some(agent_id) = dropped_agent {
            warn!(agent_id, "persistence buffer overflow, dropped oldest entry");
            let mut buffer = self.buffer.lock().expect("persist buffer poisoned");
            if buffer.len() < self.config.buffer_capacity {
                buffer.push_back(PersistItem::Telemetry(TelemetryEvent::persistence_drop(
                    &agent_id,
                )));
            }
        }
        self.notify.notify_one();
    }

    async fn flush_item(&self, item: &PersistItem) -> bool {
        for attempt in 0..self.config.flush_attempts {
            if attempt > 0 {
                let backoff = Duration::from_millis(100 * 2u64.pow(attempt - 1));
                tokio::time::sleep(backoff).await;
            }
            let send = async {
                match item {
                    PersistItem::Decision(record) => self.gateway.append_decision(record).await,
                    PersistItem::Telemetry(event) => self.gateway.append_telemetry(event).await,
                }
            };
            match tokio::time::timeout(self.config.attempt_timeout, send).await {
                Ok(Ok(())) => return true,
                Ok(Err(err)) => {
                    debug!(attempt, %err, "gateway write failed");
                }
                Err(_) => {
                    debug!(attempt, "gateway write attempt timed out");
                }
            }
        }
        false
    }
}

/// The decision pipeline: builds records, emits telemetry, and hands both
/// to the write-behind flusher.
pub struct DecisionPipeline {
    inner: Arc<PipelineInner>,
    flusher: Mutex<Option<JoinHandle<()>>>,
}

impl DecisionPipeline {
    pub fn start(gateway: Arc<GatewayClient>, config: PipelineConfig) -> Self {
        let inner = Arc::new(PipelineInner {
            buffer: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
            gateway,
            config,
            shutdown: CancellationToken::new(),
            dropped: AtomicU64::new(0),
        });
        let flusher = tokio::spawn(run_flusher(Arc::clone(&inner)));
        Self {
            inner,
            flusher: Mutex::new(Some(flusher)),
        }
    }

    /// Emit one decision: telemetry first, then the record itself, both
    /// through the write-behind buffer. Returns immediately.
    pub fn emit(&self, record: DecisionRecord) {
        let telemetry = TelemetryEvent::decision_emitted(
            &record.agent_id,
            &record.decision_id,
            record.confidence,
        );
        debug!(
            decision_id = %record.decision_id,
            agent_id = %record.agent_id,
            confidence = record.confidence,
            "decision emitted"
        );
        self.inner.enqueue(PersistItem::Telemetry(telemetry));
        self.inner.enqueue(PersistItem::Decision(Box::new(record)));
    }

    pub fn emit_telemetry(&self, event: TelemetryEvent) {
        self.inner.enqueue(PersistItem::Telemetry(event));
    }

    /// Entries lost to overflow since startup.
    pub fn dropped_count(&self) -> u64 {
        self.inner.dropped.load(Ordering::Relaxed)
    }

    pub fn pending(&self) -> usize {
        self.inner
            .buffer
            .lock()
            .expect("persist buffer poisoned")
            .len()
    }

    /// Graceful shutdown: flush until empty or the drain deadline elapses.
    pub async fn shutdown(&self) {
        self.inner.shutdown.cancel();
        self.inner.notify.notify_one();
        let handle = self
            .flusher
            .lock()
            .expect("flusher handle poisoned")
            .take();
        if let Some(handle) = handle {
            let deadline = self.inner.config.drain_deadline;
            if tokio::time::timeout(deadline, handle).await.is_err() {
                warn!("decision pipeline drain deadline elapsed with entries pending");
            }
        }
    }
}

async fn run_flusher(inner: Arc<PipelineInner>) {
    loop {
        let item = inner
            .buffer
            .lock()
            .expect("persist buffer poisoned")
            .pop_front();
        match item {
            Some(item) => {
                if !inner.flush_item(&item).await {
                    inner.dropped.fetch_add(1, Ordering::Relaxed);
                    warn!("decision pipeline gave up on entry after retries");
                }
            }
            None => {
                if inner.shutdown.is_cancelled() {
                    break;
                }
                tokio::select! {
                    _ = inner.notify.notified() => {}
                    _ = inner.shutdown.cancelled() => {}
                }
            }
        }
    }
}

/// Assemble a decision record: canonical input hash, fresh decision id,
/// combined confidence, UTC timestamp.
#[allow(clippy::too_many_arguments)]
pub fn new_decision(
    agent_id: &str,
    agent_version: &str,
    decision_type: &str,
    inputs: &Value,
    inputs_summary: Value,
    outputs: Value,
    confidence_factors: Vec<ConfidenceFactor>,
    constraints_applied: Vec<Constraint>,
    duration_ms: u64,
) -> DecisionRecord {
    let confidence = ConfidenceFactor::combine(&confidence_factors);
    DecisionRecord {
        agent_id: agent_id.to_string(),
        agent_version: agent_version.to_string(),
        decision_type: decision_type.to_string(),
        decision_id: Uuid::new_v4().to_string(),
        inputs_hash: crate::canonical::inputs_hash(inputs),
        inputs_summary,
        outputs,
        confidence,
        confidence_factors,
        constraints_applied,
        execution_ref: ExecutionRef::new(),
        timestamp: chrono::Utc::now(),
        duration_ms,
    }
}
