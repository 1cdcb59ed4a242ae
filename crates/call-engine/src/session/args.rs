//! Session-start argument parsing
//!
//! Application arguments arrive as a vector of strings whose first token
//! names the call mode; the rest are either `key=value` pairs or positional
//! `ani, dnis[, bridge]`. Parsing is strict about shape: anything malformed
//! lands in [`CallMode::Unknown`] rather than a guessed mode, and missing
//! party fields fall back to the channel's own ani/dnis at the call site.

use serde::{Deserialize, Serialize};

/// Routed call mode
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CallMode {
    /// Extension-to-extension call: admission gate, bridge setup, B-leg
    /// origination, guard
    Internal,
    /// Destination leg joining an existing named bridge
    Bridge,
    /// Hand-off to a registered voice agent under this mode tag
    Agent(String),
    /// Unroutable; answered and hung up defensively
    Unknown,
}

/// Parsed session-start arguments
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallArgs {
    pub mode: CallMode,
    pub ani: Option<String>,
    pub dnis: Option<String>,
    pub bridge_id: Option<String>,
}

impl CallArgs {
    /// Parse the raw argument vector
    ///
    /// `agent_modes` lists the registered voice-agent tags; a first token
    /// matching one of them routes to that agent. `bridge` mode without a
    /// bridge id is malformed and demotes to `Unknown`.
    pub fn parse(args: &[String], agent_modes: &[String]) -> Self {
        let mut parsed = CallArgs {
            mode: CallMode::Unknown,
            ani: None,
            dnis: None,
            bridge_id: None,
        };

        let Some(tag) = args.first().map(|s| s.trim()) else {
            return parsed;
        };
        if tag.is_empty() {
            return parsed;
        }

        let mut positional = Vec::new();
        for raw in &args[1..] {
            match raw.split_once('=') {
                Some(("ani", v)) => parsed.ani = non_empty(v),
                Some(("dnis", v)) => parsed.dnis = non_empty(v),
                Some(("bridge", v)) => parsed.bridge_id = non_empty(v),
                Some((key, _)) => {
                    tracing::debug!("Ignoring unknown session-start argument key {:?}", key);
                }
                None => positional.push(raw.trim()),
            }
        }

        // Positional fallback: ani, dnis, bridge — only for slots the
        // key=value form did not already fill
        let mut slots = positional.into_iter();
        if parsed.ani.is_none() {
            parsed.ani = slots.next().and_then(non_empty);
        }
        if parsed.dnis.is_none() {
            parsed.dnis = slots.next().and_then(non_empty);
        }
        if parsed.bridge_id.is_none() {
            parsed.bridge_id = slots.next().and_then(non_empty);
        }

        parsed.mode = match tag {
            "internal" => CallMode::Internal,
            "bridge" => {
                if parsed.bridge_id.is_some() {
                    CallMode::Bridge
                } else {
                    tracing::warn!("bridge mode without a bridge id, treating as unknown");
                    CallMode::Unknown
                }
            }
            other if agent_modes.iter().any(|m| m == other) => {
                CallMode::Agent(other.to_string())
            }
            other => {
                tracing::warn!("Unrecognized call mode {:?}", other);
                CallMode::Unknown
            }
        };

        parsed
    }
}

fn non_empty(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn parses_internal_with_positional_parties() {
        let args = CallArgs::parse(&strings(&["internal", "1002", "1001"]), &[]);
        assert_eq!(args.mode, CallMode::Internal);
        assert_eq!(args.ani.as_deref(), Some("1002"));
        assert_eq!(args.dnis.as_deref(), Some("1001"));
        assert_eq!(args.bridge_id, None);
    }

    #[test]
    fn parses_bridge_with_keyed_id() {
        let args = CallArgs::parse(&strings(&["bridge", "bridge=bridge-call-1"]), &[]);
        assert_eq!(args.mode, CallMode::Bridge);
        assert_eq!(args.bridge_id.as_deref(), Some("bridge-call-1"));
    }

    #[test]
    fn bridge_without_id_demotes_to_unknown() {
        let args = CallArgs::parse(&strings(&["bridge"]), &[]);
        assert_eq!(args.mode, CallMode::Unknown);
    }

    #[test]
    fn registered_agent_tag_routes_to_agent() {
        let agents = strings(&["receptionist"]);
        let args = CallArgs::parse(&strings(&["receptionist", "1002", "600"]), &agents);
        assert_eq!(args.mode, CallMode::Agent("receptionist".to_string()));
        // Unregistered tags never guess
        let args = CallArgs::parse(&strings(&["concierge"]), &agents);
        assert_eq!(args.mode, CallMode::Unknown);
    }

    #[test]
    fn empty_and_malformed_input_is_unknown() {
        assert_eq!(CallArgs::parse(&[], &[]).mode, CallMode::Unknown);
        assert_eq!(CallArgs::parse(&strings(&["  "]), &[]).mode, CallMode::Unknown);
    }

    #[test]
    fn keyed_values_win_over_positional() {
        let args = CallArgs::parse(
            &strings(&["internal", "ani=1002", "9999", "1001"]),
            &[],
        );
        assert_eq!(args.ani.as_deref(), Some("1002"));
        // First unused positional slot fills the next empty field
        assert_eq!(args.dnis.as_deref(), Some("9999"));
    }
}
