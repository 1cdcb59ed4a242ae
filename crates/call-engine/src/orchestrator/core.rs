//! The `CallOrchestrator` struct and shared helpers

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock, Weak};

use dashmap::DashMap;

use callflow_control_core::ControlPlane;
use callflow_store_core::{DistributedLock, KeyValueStore};

use crate::admission::AdmissionControl;
use crate::agent::VoiceAgent;
use crate::config::EngineConfig;
use crate::error::Result;
use crate::notify::{CallNotification, NotificationKind, NotificationSink};
use crate::orchestrator::bridge::BridgeManager;
use crate::orchestrator::guard::OriginationGuard;
use crate::orchestrator::snoop::{SnoopContract, SnoopManager};
use crate::session::SessionRegistry;

/// Prefix under which per-call cleanup locks live in the store
pub(crate) const CLEANUP_LOCK_PREFIX: &str = "callflow:lock:cleanup:";

/// Counters over the orchestrator's lifetime
#[derive(Debug, Default)]
pub struct OrchestratorStats {
    pub events_processed: AtomicU64,
    pub cleanups_completed: AtomicU64,
    pub cleanups_skipped: AtomicU64,
    pub guards_fired: AtomicU64,
    pub guards_cancelled: AtomicU64,
}

impl OrchestratorStats {
    pub(crate) fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// The call orchestration engine
///
/// One instance serves every in-flight call; per-call state lives in the
/// shared store, never in fields here. Handlers are invoked concurrently
/// from independent workers and must stay safe under that.
pub struct CallOrchestrator {
    pub(crate) config: EngineConfig,
    pub(crate) control: Arc<dyn ControlPlane>,
    pub(crate) registry: SessionRegistry,
    pub(crate) bridges: BridgeManager,
    pub(crate) guard: OriginationGuard,
    pub(crate) snoops: SnoopManager,
    pub(crate) cleanup_lock: DistributedLock,
    pub(crate) sink: Arc<dyn NotificationSink>,
    pub(crate) admission: Arc<dyn AdmissionControl>,
    pub(crate) agents: DashMap<String, Arc<dyn VoiceAgent>>,
    pub(crate) stats: OrchestratorStats,
    /// Backreference for spawned timers; set once at construction
    self_ref: OnceLock<Weak<CallOrchestrator>>,
}

impl CallOrchestrator {
    pub fn new(
        config: EngineConfig,
        store: Arc<dyn KeyValueStore>,
        control: Arc<dyn ControlPlane>,
        sink: Arc<dyn NotificationSink>,
        admission: Arc<dyn AdmissionControl>,
    ) -> Arc<Self> {
        let registry = SessionRegistry::new(store.clone(), config.session_ttl, config.marker_ttl);
        let bridges = BridgeManager::new(control.clone());
        let snoops = SnoopManager::new(
            store.clone(),
            control.clone(),
            config.session_ttl,
            config.snoop_app_name.clone(),
        );
        let cleanup_lock = DistributedLock::new(store, CLEANUP_LOCK_PREFIX);

        let orchestrator = Arc::new(Self {
            config,
            control,
            registry,
            bridges,
            guard: OriginationGuard::new(),
            snoops,
            cleanup_lock,
            sink,
            admission,
            agents: DashMap::new(),
            stats: OrchestratorStats::default(),
            self_ref: OnceLock::new(),
        });
        let _ = orchestrator.self_ref.set(Arc::downgrade(&orchestrator));
        orchestrator
    }

    /// Weak handle to this orchestrator for spawned timers
    pub(crate) fn weak_self(&self) -> Weak<CallOrchestrator> {
        self.self_ref.get().cloned().unwrap_or_default()
    }

    /// Register a voice agent under a mode tag
    pub fn register_agent(&self, mode: &str, agent: Arc<dyn VoiceAgent>) {
        tracing::info!("Registered voice agent for mode {:?}", mode);
        self.agents.insert(mode.to_string(), agent);
    }

    pub(crate) fn agent_modes(&self) -> Vec<String> {
        self.agents.iter().map(|e| e.key().clone()).collect()
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    pub fn stats(&self) -> &OrchestratorStats {
        &self.stats
    }

    /// Whether an origination guard is currently armed for a call
    pub fn guard_is_armed(&self, linked_id: &str) -> bool {
        self.guard.is_armed(linked_id)
    }

    // ===== Snoop contract access =====

    pub async fn snoop_contract(&self, snoop_id: &str) -> Result<Option<SnoopContract>> {
        self.snoops.get(snoop_id).await
    }

    pub async fn snoop_for_parent(
        &self,
        parent_channel_id: &str,
    ) -> Result<Option<SnoopContract>> {
        self.snoops.for_parent(parent_channel_id).await
    }

    /// Destroy a tap if its contract permits it for this reason
    pub async fn destroy_snoop(&self, snoop_id: &str, reason: &str) -> Result<bool> {
        self.snoops.destroy(snoop_id, reason).await
    }

    /// Run one pass of the orphaned-lock sweep
    pub async fn sweep_orphaned_locks(&self) -> Result<usize> {
        Ok(self.cleanup_lock.sweep_orphans().await?)
    }

    // ===== Notification helpers =====

    /// Publish a notification; sink failures are logged, never propagated
    pub(crate) async fn emit(&self, notification: CallNotification) {
        let topic = notification.kind.topic();
        let channel = notification.channel_id.clone();
        if let Err(e) = self.sink.publish(notification).await {
            tracing::warn!("Failed to publish {} for {}: {}", topic, channel, e);
        }
    }

    /// Build a notification, enriching party fields from the active-call
    /// snapshot when one exists, falling back to a live channel lookup
    pub(crate) async fn notification_for(
        &self,
        kind: NotificationKind,
        channel_id: &str,
        linked_id: &str,
    ) -> CallNotification {
        let base = CallNotification::new(kind, channel_id, linked_id);
        match self.registry.get_active(channel_id).await {
            Ok(Some(call)) => base.with_party(&call.channel.ani, &call.channel.dnis, call.direction()),
            _ => match self.control.get_channel(channel_id).await {
                Ok(Some(info)) => base.with_party(&info.ani, &info.dnis, "unknown"),
                _ => base,
            },
        }
    }

    /// Marker-gated hangup-family emission
    ///
    /// Returns whether this caller won the idempotency marker and actually
    /// published. Every path that reports a channel's end goes through
    /// here, which is what makes the notification at-most-once across
    /// racing handlers.
    pub(crate) async fn emit_hangup_once(
        &self,
        channel_id: &str,
        linked_id: &str,
        kind: NotificationKind,
        reason: &str,
    ) -> Result<bool> {
        if !self.registry.mark_hangup_once(channel_id).await? {
            tracing::debug!("Hangup already reported for {}, skipping", channel_id);
            return Ok(false);
        }
        let notification = self
            .notification_for(kind, channel_id, linked_id)
            .await
            .with_reason(reason);
        self.emit(notification).await;
        Ok(true)
    }

    /// Resolve the linked id for a channel: active snapshot first, then a
    /// live control-plane lookup, finally the channel's own id
    pub(crate) async fn resolve_linked_id(&self, channel_id: &str) -> String {
        if let Ok(Some(call)) = self.registry.get_active(channel_id).await {
            return call.linked_id;
        }
        if let Ok(Some(info)) = self.control.get_channel(channel_id).await {
            return info.linked_or_own_id().to_string();
        }
        channel_id.to_string()
    }
}
