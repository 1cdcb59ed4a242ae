//! Call orchestration
//!
//! The orchestrator is the coordination layer between the control-plane
//! event stream and everything else: it classifies events by call mode and
//! leg role, mutates the session registry, and drives the correlation
//! engine, bridge manager, origination guard, snoop contracts and the
//! lock-guarded cleanup protocol.
//!
//! Module organization:
//!
//! - [`core`]: the `CallOrchestrator` struct, construction and shared helpers
//! - [`handler`]: the canonical per-event dispatch (one handler per kind)
//! - [`correlation`]: three-tier partner lookup
//! - [`bridge`]: idempotent bridge lifecycle
//! - [`guard`]: origination timeout enforcement
//! - [`snoop`]: audio-tap contract state machine
//! - [`cleanup`]: lock-guarded teardown and cross-leg hangup

pub mod bridge;
pub mod cleanup;
pub mod core;
pub mod correlation;
pub mod guard;
pub mod snoop;

mod handler;

pub use bridge::BridgeManager;
pub use cleanup::CleanupOutcome;
pub use core::{CallOrchestrator, OrchestratorStats};
pub use guard::OriginationGuard;
pub use snoop::{SnoopContract, SnoopManager, SnoopState};
