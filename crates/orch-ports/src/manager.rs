use std::sync::Arc;
use std::time::Duration;

use orch_core::Shutdown;
use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::error::PortError;
use crate::frontend::{Frontend, InboundSink};
use crate::model::ModelAdapter;
use crate::types::{ChatRequest, ChatResponse, OutboundFrame, PortStatus};

/// Minimum delay between reconnect attempts (seconds).
const BACKOFF_BASE_SECS: u64 = 5;
const BACKOFF_MAX_SECS: u64 = 300;
const JITTER_FRACTION: f64 = 0.10;

#[derive(Clone, Copy)]
pub struct PortManagerConfig {
    pub health_check_interval_secs: u64,
    pub max_reconnect_attempts: u32,
}

/// Adapts external chat frontends and model backends into the uniform
/// send/receive interfaces the rest of the system depends on. Grounded on
/// `ChannelManager::connect_with_backoff`, generalized to two adapter kinds
/// and given a liveness loop.
pub struct PortManager {
    frontends: Vec<Arc<dyn Frontend>>,
    models: Vec<Arc<dyn ModelAdapter>>,
    config: PortManagerConfig,
}

impl PortManager {
    pub fn new(config: PortManagerConfig) -> Self {
        Self {
            frontends: Vec::new(),
            models: Vec::new(),
            config,
        }
    }

    pub fn register_frontend(&mut self, frontend: Arc<dyn Frontend>) {
        info!(frontend = frontend.name(), "registering frontend adapter");
        self.frontends.push(frontend);
    }

    pub fn register_model(&mut self, model: Arc<dyn ModelAdapter>) {
        info!(model = model.name(), "registering model adapter");
        self.models.push(model);
    }

    /// Starts every registered frontend (wiring inbound frames to `sink`)
    /// and every registered model adapter, with retry backoff on failure.
    pub async fn start_all(&self, sink: Arc<dyn InboundSink>) {
        for frontend in &self.frontends {
            if let Err(e) = start_frontend_with_backoff(frontend.as_ref(), sink.clone(), self.config.max_reconnect_attempts).await {
                error!(frontend = frontend.name(), error = %e, "failed to start frontend after retries");
            }
        }
        for model in &self.models {
            if let Err(e) = start_model_with_backoff(model.as_ref(), self.config.max_reconnect_attempts).await {
                error!(model = model.name(), error = %e, "failed to start model adapter after retries");
            }
        }
    }

    pub async fn stop_all(&self) {
        for frontend in &self.frontends {
            if let Err(e) = frontend.stop().await {
                warn!(frontend = frontend.name(), error = %e, "error stopping frontend");
            }
        }
        for model in &self.models {
            if let Err(e) = model.stop().await {
                warn!(model = model.name(), error = %e, "error stopping model adapter");
            }
        }
    }

    /// Fans a completed response out to every registered frontend.
    pub async fn send_response_async(&self, frame: &OutboundFrame) {
        for frontend in &self.frontends {
            if let Err(e) = frontend.send(frame).await {
                warn!(frontend = frontend.name(), error = %e, "failed to deliver response");
            }
        }
    }

    /// Picks any model adapter below its concurrency cap, reserves a
    /// slot, dispatches the request, and releases the slot on completion.
    /// Returns `None` when every adapter is saturated.
    pub async fn send_to_model_async(&self, request: &ChatRequest) -> Option<Result<ChatResponse, PortError>> {
        for model in &self.models {
            if model.try_reserve() {
                let result = model.send_request(request).await;
                model.release();
                return Some(result);
            }
        }
        None
    }

    pub async fn frontend_statuses(&self) -> Vec<(String, PortStatus)> {
        let mut out = Vec::with_capacity(self.frontends.len());
        for f in &self.frontends {
            out.push((f.name().to_string(), f.status().await));
        }
        out
    }

    pub async fn model_statuses(&self) -> Vec<(String, PortStatus)> {
        let mut out = Vec::with_capacity(self.models.len());
        for m in &self.models {
            out.push((m.name().to_string(), m.status().await));
        }
        out
    }

    /// Polls every adapter's liveness every `health_check_interval_secs`
    /// and attempts bounded reconnection on a disconnect transition.
    pub async fn run_health_monitor(self: Arc<Self>, sink: Arc<dyn InboundSink>, shutdown: Shutdown) {
        let mut ticker = tokio::time::interval(Duration::from_secs(self.config.health_check_interval_secs));
        loop {
            tokio::select! {
                _ = ticker.tick() => self.check_health(&sink).await,
                _ = shutdown.cancelled() => {
                    info!("port health monitor shutting down");
                    break;
                }
            }
        }
    }

    async fn check_health(&self, sink: &Arc<dyn InboundSink>) {
        for frontend in &self.frontends {
            if frontend.status().await != PortStatus::Connected {
                warn!(frontend = frontend.name(), "frontend disconnected, attempting reconnect");
                if let Err(e) = start_frontend_with_backoff(frontend.as_ref(), sink.clone(), self.config.max_reconnect_attempts).await {
                    error!(frontend = frontend.name(), error = %e, "reconnect failed");
                }
            }
        }
        for model in &self.models {
            if !model.is_connected().await {
                warn!(model = model.name(), "model adapter disconnected, attempting reconnect");
                if let Err(e) = start_model_with_backoff(model.as_ref(), self.config.max_reconnect_attempts).await {
                    error!(model = model.name(), error = %e, "reconnect failed");
                }
            }
        }
    }
}

async fn start_frontend_with_backoff(frontend: &dyn Frontend, sink: Arc<dyn InboundSink>, max_attempts: u32) -> Result<(), PortError> {
    let mut delay_secs = BACKOFF_BASE_SECS;
    for attempt in 1..=max_attempts {
        match frontend.start(sink.clone()).await {
            Ok(()) => {
                info!(frontend = frontend.name(), attempt, "frontend started");
                return Ok(());
            }
            Err(e) if attempt == max_attempts => return Err(e),
            Err(e) => {
                let total = delay_secs + jitter_secs(delay_secs);
                warn!(frontend = frontend.name(), attempt, error = %e, retry_after_secs = total, "frontend start failed, retrying");
                sleep(Duration::from_secs(total)).await;
                delay_secs = (delay_secs * 2).min(BACKOFF_MAX_SECS);
            }
        }
    }
    unreachable!("backoff loop exited without returning")
}

async fn start_model_with_backoff(model: &dyn ModelAdapter, max_attempts: u32) -> Result<(), PortError> {
    let mut delay_secs = BACKOFF_BASE_SECS;
    for attempt in 1..=max_attempts {
        match model.start().await {
            Ok(()) => {
                info!(model = model.name(), attempt, "model adapter started");
                return Ok(());
            }
            Err(e) if attempt == max_attempts => return Err(e),
            Err(e) => {
                let total = delay_secs + jitter_secs(delay_secs);
                warn!(model = model.name(), attempt, error = %e, retry_after_secs = total, "model adapter start failed, retrying");
                sleep(Duration::from_secs(total)).await;
                delay_secs = (delay_secs * 2).min(BACKOFF_MAX_SECS);
            }
        }
    }
    unreachable!("backoff loop exited without returning")
}

fn jitter_secs(base_secs: u64) -> u64 {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0);
    let max_jitter = ((base_secs as f64) * JITTER_FRACTION) as u64;
    if max_jitter == 0 {
        return 0;
    }
    (nanos as u64) % max_jitter
}
