//! Shared test fixtures: an in-memory scripted control plane and an engine
//! harness wired to the in-process store and broadcast sink.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use callflow_call_engine::admission::{AdmissionControl, RuleType};
use callflow_call_engine::notify::{BroadcastSink, CallNotification, NotificationKind};
use callflow_call_engine::prelude::*;
use callflow_store_core::MemoryStore;

/// One recorded control-plane command or query
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Op {
    Answer(String),
    Hangup(String),
    CreateBridge(String),
    AddToBridge(String, String),
    DestroyBridge(String),
    BridgeMembers(String),
    ListChannels,
    Originate(String),
    StartRecording(String),
    StopRecording(String),
    StartSnoop(String, String),
    GetChannel(String),
}

/// Scripted control plane
///
/// Holds channel and bridge state in memory, records every operation for
/// assertions, and lets tests mutate state between events the way a real
/// PBX would.
pub struct FakeControlPlane {
    channels: Mutex<HashMap<String, ChannelInfo>>,
    bridges: Mutex<HashMap<String, Vec<String>>>,
    ops: Mutex<Vec<Op>>,
    originations: Mutex<Vec<OriginateParams>>,
    counter: AtomicU64,
    query_latency: Mutex<Duration>,
    fail_originate: AtomicBool,
}

impl FakeControlPlane {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            channels: Mutex::new(HashMap::new()),
            bridges: Mutex::new(HashMap::new()),
            ops: Mutex::new(Vec::new()),
            originations: Mutex::new(Vec::new()),
            counter: AtomicU64::new(0),
            query_latency: Mutex::new(Duration::ZERO),
            fail_originate: AtomicBool::new(false),
        })
    }

    fn record(&self, op: Op) {
        self.ops.lock().unwrap().push(op);
    }

    fn next_id(&self, prefix: &str) -> String {
        format!("{}-{}", prefix, self.counter.fetch_add(1, Ordering::SeqCst))
    }

    // ----- scripting -----

    pub fn add_channel(&self, info: ChannelInfo) {
        self.channels.lock().unwrap().insert(info.id.clone(), info);
    }

    pub fn set_state(&self, channel_id: &str, state: ChannelState) {
        if let Some(info) = self.channels.lock().unwrap().get_mut(channel_id) {
            info.state = state;
        }
    }

    pub fn drop_channel(&self, channel_id: &str) {
        self.channels.lock().unwrap().remove(channel_id);
    }

    /// Slow down channel/bridge queries to widen race windows in tests
    pub fn set_query_latency(&self, latency: Duration) {
        *self.query_latency.lock().unwrap() = latency;
    }

    async fn apply_query_latency(&self) {
        let latency = *self.query_latency.lock().unwrap();
        if latency > Duration::ZERO {
            tokio::time::sleep(latency).await;
        }
    }

    pub fn fail_next_originations(&self, fail: bool) {
        self.fail_originate.store(fail, Ordering::SeqCst);
    }

    // ----- assertions -----

    pub fn ops(&self) -> Vec<Op> {
        self.ops.lock().unwrap().clone()
    }

    pub fn count_ops<F: Fn(&Op) -> bool>(&self, pred: F) -> usize {
        self.ops.lock().unwrap().iter().filter(|op| pred(op)).count()
    }

    pub fn hangups(&self) -> Vec<String> {
        self.ops
            .lock()
            .unwrap()
            .iter()
            .filter_map(|op| match op {
                Op::Hangup(id) => Some(id.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn originations(&self) -> Vec<OriginateParams> {
        self.originations.lock().unwrap().clone()
    }

    pub fn bridge_channels(&self, bridge_id: &str) -> Option<Vec<String>> {
        self.bridges.lock().unwrap().get(bridge_id).cloned()
    }

    pub fn channel(&self, channel_id: &str) -> Option<ChannelInfo> {
        self.channels.lock().unwrap().get(channel_id).cloned()
    }
}

#[async_trait]
impl ControlPlane for FakeControlPlane {
    async fn answer(&self, channel_id: &str) -> callflow_control_core::Result<()> {
        self.record(Op::Answer(channel_id.to_string()));
        let mut channels = self.channels.lock().unwrap();
        match channels.get_mut(channel_id) {
            Some(info) => {
                info.state = ChannelState::Up;
                Ok(())
            }
            None => Err(callflow_control_core::ControlError::NotFound(
                channel_id.to_string(),
            )),
        }
    }

    async fn originate(
        &self,
        params: OriginateParams,
    ) -> callflow_control_core::Result<ChannelInfo> {
        self.record(Op::Originate(params.endpoint.clone()));
        if self.fail_originate.load(Ordering::SeqCst) {
            return Err(callflow_control_core::ControlError::Rejected(
                "scripted origination failure".to_string(),
            ));
        }
        let dnis = params
            .endpoint
            .split_once('/')
            .map(|(_, number)| number.to_string())
            .unwrap_or_else(|| params.endpoint.clone());
        let info = ChannelInfo {
            id: self.next_id("out"),
            state: ChannelState::Ringing,
            ani: params.caller_id.clone(),
            dnis,
            linked_id: params.linked_id.clone(),
        };
        self.channels
            .lock()
            .unwrap()
            .insert(info.id.clone(), info.clone());
        self.originations.lock().unwrap().push(params);
        Ok(info)
    }

    async fn hangup(&self, channel_id: &str) -> callflow_control_core::Result<()> {
        self.record(Op::Hangup(channel_id.to_string()));
        match self.channels.lock().unwrap().remove(channel_id) {
            Some(_) => Ok(()),
            None => Err(callflow_control_core::ControlError::NotFound(
                channel_id.to_string(),
            )),
        }
    }

    async fn create_bridge(&self, bridge_id: &str) -> callflow_control_core::Result<BridgeInfo> {
        self.record(Op::CreateBridge(bridge_id.to_string()));
        let mut bridges = self.bridges.lock().unwrap();
        if bridges.contains_key(bridge_id) {
            return Err(callflow_control_core::ControlError::AlreadyExists(
                bridge_id.to_string(),
            ));
        }
        bridges.insert(bridge_id.to_string(), Vec::new());
        Ok(BridgeInfo {
            id: bridge_id.to_string(),
            channels: Vec::new(),
        })
    }

    async fn add_to_bridge(
        &self,
        bridge_id: &str,
        channel_id: &str,
    ) -> callflow_control_core::Result<()> {
        self.record(Op::AddToBridge(bridge_id.to_string(), channel_id.to_string()));
        let mut bridges = self.bridges.lock().unwrap();
        match bridges.get_mut(bridge_id) {
            None => Err(callflow_control_core::ControlError::NotFound(
                bridge_id.to_string(),
            )),
            Some(members) => {
                if members.iter().any(|m| m == channel_id) {
                    Err(callflow_control_core::ControlError::AlreadyExists(
                        channel_id.to_string(),
                    ))
                } else {
                    members.push(channel_id.to_string());
                    Ok(())
                }
            }
        }
    }

    async fn destroy_bridge(&self, bridge_id: &str) -> callflow_control_core::Result<()> {
        self.record(Op::DestroyBridge(bridge_id.to_string()));
        match self.bridges.lock().unwrap().remove(bridge_id) {
            Some(_) => Ok(()),
            None => Err(callflow_control_core::ControlError::NotFound(
                bridge_id.to_string(),
            )),
        }
    }

    async fn bridge_members(&self, bridge_id: &str) -> callflow_control_core::Result<Vec<String>> {
        self.record(Op::BridgeMembers(bridge_id.to_string()));
        self.apply_query_latency().await;
        match self.bridges.lock().unwrap().get(bridge_id) {
            Some(members) => Ok(members.clone()),
            None => Err(callflow_control_core::ControlError::NotFound(
                bridge_id.to_string(),
            )),
        }
    }

    async fn get_channel(
        &self,
        channel_id: &str,
    ) -> callflow_control_core::Result<Option<ChannelInfo>> {
        self.record(Op::GetChannel(channel_id.to_string()));
        Ok(self.channels.lock().unwrap().get(channel_id).cloned())
    }

    async fn list_channels(&self) -> callflow_control_core::Result<Vec<ChannelInfo>> {
        self.record(Op::ListChannels);
        self.apply_query_latency().await;
        Ok(self.channels.lock().unwrap().values().cloned().collect())
    }

    async fn start_recording(
        &self,
        channel_id: &str,
        _name: &str,
    ) -> callflow_control_core::Result<String> {
        self.record(Op::StartRecording(channel_id.to_string()));
        Ok(self.next_id("rec"))
    }

    async fn stop_recording(
        &self,
        handle: &str,
    ) -> callflow_control_core::Result<Option<String>> {
        self.record(Op::StopRecording(handle.to_string()));
        Ok(Some(format!("/var/spool/callflow/{}.wav", handle)))
    }

    async fn start_snoop(
        &self,
        channel_id: &str,
        snoop_id: &str,
        _app: &str,
    ) -> callflow_control_core::Result<ChannelInfo> {
        self.record(Op::StartSnoop(channel_id.to_string(), snoop_id.to_string()));
        if !self.channels.lock().unwrap().contains_key(channel_id) {
            return Err(callflow_control_core::ControlError::NotFound(
                channel_id.to_string(),
            ));
        }
        let info = ChannelInfo {
            id: snoop_id.to_string(),
            state: ChannelState::Up,
            ani: String::new(),
            dnis: String::new(),
            linked_id: None,
        };
        self.channels
            .lock()
            .unwrap()
            .insert(info.id.clone(), info.clone());
        Ok(info)
    }
}

/// Admission gate with fixed answers
pub struct ScriptedAdmission {
    pub vip: bool,
    pub holiday: bool,
    pub schedule: bool,
}

impl ScriptedAdmission {
    pub fn open() -> Self {
        Self {
            vip: false,
            holiday: false,
            schedule: true,
        }
    }

    pub fn closed() -> Self {
        Self {
            vip: false,
            holiday: false,
            schedule: false,
        }
    }
}

#[async_trait]
impl AdmissionControl for ScriptedAdmission {
    async fn check_rule(
        &self,
        rule: RuleType,
        _value: Option<&str>,
    ) -> callflow_call_engine::Result<bool> {
        Ok(match rule {
            RuleType::Vip => self.vip,
            RuleType::Holiday => self.holiday,
            RuleType::Schedule => self.schedule,
        })
    }
}

/// Everything a dispatcher test needs in one place
pub struct TestEngine {
    pub orchestrator: Arc<CallOrchestrator>,
    pub control: Arc<FakeControlPlane>,
    pub store: Arc<MemoryStore>,
    pub sink: Arc<BroadcastSink>,
    pub notifications: tokio::sync::broadcast::Receiver<CallNotification>,
}

impl TestEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self::with_admission(config, Arc::new(ScriptedAdmission::open()))
    }

    pub fn with_admission(config: EngineConfig, admission: Arc<dyn AdmissionControl>) -> Self {
        let control = FakeControlPlane::new();
        let store = Arc::new(MemoryStore::new());
        let sink = Arc::new(BroadcastSink::new(64));
        let notifications = sink.subscribe();
        let orchestrator = CallOrchestrator::new(
            config,
            store.clone(),
            control.clone(),
            sink.clone(),
            admission,
        );
        Self {
            orchestrator,
            control,
            store,
            sink,
            notifications,
        }
    }

    /// Pull everything published so far off the broadcast channel
    pub fn drain_notifications(&mut self) -> Vec<CallNotification> {
        let mut drained = Vec::new();
        while let Ok(notification) = self.notifications.try_recv() {
            drained.push(notification);
        }
        drained
    }
}

/// Fast timings so guard tests run in milliseconds
pub fn fast_config() -> EngineConfig {
    EngineConfig {
        origination_timeout: Duration::from_millis(100),
        ring_guard: Duration::from_millis(50),
        lock_ttl: Duration::from_secs(10),
        marker_ttl: Duration::from_secs(10),
        agent_connect_delay: Duration::from_millis(5),
        ..EngineConfig::default()
    }
}

pub fn channel(id: &str, ani: &str, dnis: &str, linked: Option<&str>, state: ChannelState) -> ChannelInfo {
    ChannelInfo {
        id: id.to_string(),
        state,
        ani: ani.to_string(),
        dnis: dnis.to_string(),
        linked_id: linked.map(|s| s.to_string()),
    }
}

/// Count notifications of a kind for a channel
pub fn count_kind(notifications: &[CallNotification], kind: NotificationKind, channel_id: &str) -> usize {
    notifications
        .iter()
        .filter(|n| n.kind == kind && n.channel_id == channel_id)
        .count()
}
