//! In-memory state engines for the mesh provisioner.
//!
//! This crate holds the three synchronous state machines behind the
//! provisioner facade: the local key store, the bounded table of
//! provisioned nodes, and the heartbeat filter. All time-dependent
//! operations take the current time as a parameter so they can be tested
//! without a clock.

pub mod error;
pub mod heartbeat;
pub mod keystore;
pub mod node_table;

pub use error::{FilterError, KeyStoreError, NodeTableError};
pub use heartbeat::{DropReason, FilterMode, FilterOp, HeartbeatDecision, HeartbeatFilter};
pub use keystore::{AppKeyEntry, KeyStore, ModelBinding, ModelKey, NetKeyEntry};
pub use node_table::{NodeRecord, NodeTable};
