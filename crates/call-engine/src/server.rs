//! Engine server
//!
//! Wires the orchestrator to a control-plane event stream: one worker task
//! per inbound event, a periodic orphaned-lock sweep in the background, and
//! a fatal stop when the control plane reports its reconnection attempts
//! exhausted (the process restarts under external supervision rather than
//! running degraded).

use std::sync::Arc;

use tokio::sync::mpsc;

use callflow_control_core::{ControlEvent, ControlPlane};
use callflow_store_core::KeyValueStore;

use crate::admission::{AdmissionControl, AllowAll};
use crate::agent::VoiceAgent;
use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::notify::{BroadcastSink, NotificationSink};
use crate::orchestrator::CallOrchestrator;

/// Builder for [`CallEngineServer`]
pub struct CallEngineServerBuilder {
    config: EngineConfig,
    store: Option<Arc<dyn KeyValueStore>>,
    control: Option<Arc<dyn ControlPlane>>,
    sink: Option<Arc<dyn NotificationSink>>,
    admission: Option<Arc<dyn AdmissionControl>>,
    agents: Vec<(String, Arc<dyn VoiceAgent>)>,
}

impl CallEngineServerBuilder {
    pub fn new() -> Self {
        Self {
            config: EngineConfig::default(),
            store: None,
            control: None,
            sink: None,
            admission: None,
            agents: Vec::new(),
        }
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_store(mut self, store: Arc<dyn KeyValueStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_control_plane(mut self, control: Arc<dyn ControlPlane>) -> Self {
        self.control = Some(control);
        self
    }

    pub fn with_notification_sink(mut self, sink: Arc<dyn NotificationSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn with_admission_control(mut self, admission: Arc<dyn AdmissionControl>) -> Self {
        self.admission = Some(admission);
        self
    }

    /// Register a voice agent under a mode tag
    pub fn with_agent(mut self, mode: &str, agent: Arc<dyn VoiceAgent>) -> Self {
        self.agents.push((mode.to_string(), agent));
        self
    }

    pub fn build(self) -> Result<CallEngineServer> {
        let store = self
            .store
            .ok_or_else(|| EngineError::Config("a shared store is required".into()))?;
        let control = self
            .control
            .ok_or_else(|| EngineError::Config("a control plane is required".into()))?;
        let sink = self
            .sink
            .unwrap_or_else(|| Arc::new(BroadcastSink::default()));
        let admission = self.admission.unwrap_or_else(|| Arc::new(AllowAll));

        let orchestrator = CallOrchestrator::new(self.config, store, control, sink, admission);
        for (mode, agent) in self.agents {
            orchestrator.register_agent(&mode, agent);
        }
        Ok(CallEngineServer { orchestrator })
    }
}

impl Default for CallEngineServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// The running engine
pub struct CallEngineServer {
    orchestrator: Arc<CallOrchestrator>,
}

impl CallEngineServer {
    pub fn builder() -> CallEngineServerBuilder {
        CallEngineServerBuilder::new()
    }

    pub fn orchestrator(&self) -> Arc<CallOrchestrator> {
        self.orchestrator.clone()
    }

    /// Pump events until the stream closes or the connection is lost
    ///
    /// Each event gets its own worker task: a slow or failing handler never
    /// stalls other calls' events. Handler errors are logged and dropped;
    /// the design relies on later events and TTLs to reconcile, not on
    /// retries.
    pub async fn run(&self, mut events: mpsc::Receiver<ControlEvent>) -> Result<()> {
        tracing::info!("Call engine server starting");

        let sweep_interval = self.orchestrator.config.lock_sweep_interval;
        let sweeper = {
            let orchestrator = Arc::downgrade(&self.orchestrator);
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(sweep_interval);
                ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
                loop {
                    ticker.tick().await;
                    let Some(orchestrator) = orchestrator.upgrade() else {
                        break;
                    };
                    match orchestrator.sweep_orphaned_locks().await {
                        Ok(0) => {}
                        Ok(swept) => tracing::warn!("Swept {} orphaned lock(s)", swept),
                        Err(e) => tracing::warn!("Lock sweep failed: {}", e),
                    }
                }
            })
        };

        let result = loop {
            let Some(event) = events.recv().await else {
                tracing::info!("Event stream closed, stopping");
                break Ok(());
            };
            if matches!(event, ControlEvent::MaxRetriesExceeded) {
                tracing::error!("Control plane gone for good, shutting down for restart");
                break Err(EngineError::ConnectionLost);
            }
            let orchestrator = self.orchestrator.clone();
            tokio::spawn(async move {
                let kind = event.kind();
                if let Err(e) = orchestrator.handle_event(event).await {
                    tracing::error!("Error handling {} event: {}", kind, e);
                }
            });
        };

        sweeper.abort();
        result
    }
}
