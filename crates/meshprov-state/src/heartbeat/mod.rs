//! Heartbeat filtering for the provisioner.
//!
//! Inbound heartbeat messages are matched against a whitelist or blacklist
//! of `(source, destination)` entries before being reported upward.

pub mod filter;

pub use filter::{DropReason, FilterEntry, FilterMode, FilterOp, HeartbeatDecision, HeartbeatFilter};
