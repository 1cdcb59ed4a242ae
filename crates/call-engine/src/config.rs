//! Engine configuration
//!
//! Typed configuration with environment overrides. Every duration the core
//! relies on (origination wait, lock TTLs, marker TTLs) is explicit and
//! bounded here; no unbounded waits exist anywhere in the engine.

use std::env;
use std::time::Duration;

use crate::error::{EngineError, Result};

/// Configuration for the call orchestration engine
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// How long an originated destination leg may ring
    pub origination_timeout: Duration,
    /// Extra slack on top of `origination_timeout` before the guard fires,
    /// so the guard never races the control plane's own state propagation
    pub ring_guard: Duration,
    /// TTL of the per-call cleanup lock
    pub lock_ttl: Duration,
    /// TTL of session registry entries; refreshed on activity, expiry is
    /// the last-resort teardown for calls whose events were lost
    pub session_ttl: Duration,
    /// TTL of hangup idempotency markers
    pub marker_ttl: Duration,
    /// Protective delay before handing a channel to a voice agent, so call
    /// setup latency is not misclassified as caller silence
    pub agent_connect_delay: Duration,
    /// Interval between orphaned-lock sweeps
    pub lock_sweep_interval: Duration,
    /// Control-plane application name for regular call legs
    pub app_name: String,
    /// Control-plane application name for audio-tap channels
    pub snoop_app_name: String,
    /// Dial context used when originating destination legs
    pub dial_context: String,
    /// Channel technology prefix for originated endpoints, e.g. `PJSIP`
    pub endpoint_tech: String,
    /// Whether voice-agent calls get an audio tap for capture
    pub capture_audio: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            origination_timeout: Duration::from_secs(45),
            ring_guard: Duration::from_secs(2),
            lock_ttl: Duration::from_secs(10),
            session_ttl: Duration::from_secs(7200),
            marker_ttl: Duration::from_secs(30),
            agent_connect_delay: Duration::from_secs(1),
            lock_sweep_interval: Duration::from_secs(60),
            app_name: "callflow".to_string(),
            snoop_app_name: "callflow-snoop".to_string(),
            dial_context: "internal".to_string(),
            endpoint_tech: "PJSIP".to_string(),
            capture_audio: false,
        }
    }
}

impl EngineConfig {
    /// Build a configuration from `CALLFLOW_*` environment variables,
    /// falling back to defaults for anything unset
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.origination_timeout =
            env_duration("CALLFLOW_ORIGINATION_TIMEOUT_SECS", config.origination_timeout)?;
        config.ring_guard = env_duration("CALLFLOW_RING_GUARD_SECS", config.ring_guard)?;
        config.lock_ttl = env_duration("CALLFLOW_LOCK_TTL_SECS", config.lock_ttl)?;
        config.session_ttl = env_duration("CALLFLOW_SESSION_TTL_SECS", config.session_ttl)?;
        config.marker_ttl = env_duration("CALLFLOW_MARKER_TTL_SECS", config.marker_ttl)?;
        config.agent_connect_delay =
            env_duration("CALLFLOW_AGENT_CONNECT_DELAY_SECS", config.agent_connect_delay)?;
        config.lock_sweep_interval =
            env_duration("CALLFLOW_LOCK_SWEEP_INTERVAL_SECS", config.lock_sweep_interval)?;
        config.app_name = env_string("CALLFLOW_APP_NAME", &config.app_name);
        config.snoop_app_name = env_string("CALLFLOW_SNOOP_APP_NAME", &config.snoop_app_name);
        config.dial_context = env_string("CALLFLOW_DIAL_CONTEXT", &config.dial_context);
        config.endpoint_tech = env_string("CALLFLOW_ENDPOINT_TECH", &config.endpoint_tech);
        config.capture_audio = env::var("CALLFLOW_CAPTURE_AUDIO")
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(config.capture_audio);
        Ok(config)
    }

    /// Total wait before a silent origination is forced down
    pub fn guard_deadline(&self) -> Duration {
        self.origination_timeout + self.ring_guard
    }
}

fn env_duration(name: &str, default: Duration) -> Result<Duration> {
    match env::var(name) {
        Ok(raw) => {
            let secs: u64 = raw
                .parse()
                .map_err(|_| EngineError::Config(format!("{} must be a number of seconds, got {:?}", name, raw)))?;
            Ok(Duration::from_secs(secs))
        }
        Err(_) => Ok(default),
    }
}

fn env_string(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}
