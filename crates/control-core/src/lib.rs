//! Control-plane boundary for the Callflow stack
//!
//! Callflow drives an external PBX through an asynchronous signaling
//! interface: an event stream describing per-channel lifecycle, and
//! imperative commands over channels, bridges and recordings. This crate
//! defines that boundary — the typed data model ([`ChannelInfo`],
//! [`BridgeInfo`], [`ChannelState`]), the consumed event stream
//! ([`ControlEvent`]), and the issued command surface ([`ControlPlane`]).
//!
//! Command errors carry a taxonomy: "already exists" and "no such
//! channel/bridge" are expected outcomes of concurrent call handling and are
//! classified benign via [`ControlError::is_benign`]; callers treat them as
//! success and never log them as errors.

pub mod client;
pub mod error;
pub mod events;
pub mod types;

pub use client::{ControlPlane, OriginateParams};
pub use error::{ControlError, Result};
pub use events::ControlEvent;
pub use types::{BridgeInfo, ChannelInfo, ChannelState};
