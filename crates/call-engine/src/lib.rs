//! # Callflow Call Orchestration Engine
//!
//! The engine sits between a PBX's asynchronous signaling interface and a
//! set of call-handling applications (extension-to-extension transfer,
//! automated voice agents). It observes raw per-channel telephony events,
//! reconstructs the logical call each channel belongs to, coordinates the
//! legs of that call through a mixing bridge, enforces timeouts on
//! unanswered originations, and guarantees that teardown and cross-leg
//! hangup propagation happen exactly once — even though events for the same
//! call arrive out of order, duplicated, or interleaved with timer
//! callbacks.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │              CallEngineServer               │
//! ├─────────────────────────────────────────────┤
//! │             CallOrchestrator                │
//! │  correlation │ bridge │ guard │ snoop │ ... │
//! ├─────────────────────────────────────────────┤
//! │   SessionRegistry   │   DistributedLock     │
//! ├─────────────────────────────────────────────┤
//! │  KeyValueStore (shared)  │  ControlPlane    │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! All shared mutable call state (sessions, pair relations, locks, hangup
//! markers) lives in the external store, never in process memory keyed by
//! call: event handlers for one call must be safe to run concurrently from
//! independent workers. The only structural mutual exclusion is the
//! per-linked-id cleanup lock; everything else is idempotent by design.

pub mod admission;
pub mod agent;
pub mod config;
pub mod error;
pub mod notify;
pub mod orchestrator;
pub mod server;
pub mod session;

pub use config::EngineConfig;
pub use error::{EngineError, Result};
pub use orchestrator::CallOrchestrator;
pub use server::{CallEngineServer, CallEngineServerBuilder};

/// Common imports for engine consumers
pub mod prelude {
    pub use crate::admission::{AdmissionControl, AllowAll, RuleType};
    pub use crate::agent::{AgentContext, VoiceAgent};
    pub use crate::config::EngineConfig;
    pub use crate::error::{EngineError, Result};
    pub use crate::notify::{BroadcastSink, CallNotification, NotificationKind, NotificationSink};
    pub use crate::orchestrator::{CallOrchestrator, CleanupOutcome};
    pub use crate::server::{CallEngineServer, CallEngineServerBuilder};
    pub use crate::session::{CallSession, ChannelRef, LegRole, SessionRegistry};
    pub use callflow_control_core::{
        BridgeInfo, ControlEvent, ControlPlane, ChannelInfo, ChannelState, OriginateParams,
    };
    pub use callflow_store_core::{DistributedLock, KeyValueStore, MemoryStore};
}
