//! Bounded event channel between the provisioner core and the application.
//!
//! The core never invokes application callbacks directly: it writes events
//! into a bounded queue and the application drains them on its own task.
//! When the queue is full the event is dropped with a warning rather than
//! blocking the core, so heartbeat evaluation and key allocation are never
//! held up by a slow consumer.

use tokio::sync::mpsc;
use tracing::{debug, warn};

use meshprov_core::types::{MeshAddr, UnicastAddr};

use crate::settings::Selector;

/// Which key namespace an allocation event refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyKind {
    Net,
    App,
}

/// A heartbeat that passed the filter, with its path metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeartbeatReport {
    pub src: UnicastAddr,
    pub dst: MeshAddr,
    pub init_ttl: u8,
    pub rx_ttl: u8,
    /// Hops traversed, derived from the TTL delta.
    pub hops: u8,
}

/// Events delivered from the provisioner core to the application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProvisionerEvent {
    /// A key add with the auto index resolved to this index.
    KeyIndexAllocated { kind: KeyKind, index: u16 },
    /// Provisioning completed; the node landed on this table slot.
    NodeAdded { slot: u16, unicast_addr: UnicastAddr },
    /// A node was removed from the table.
    NodeDeleted { slot: u16 },
    /// A heartbeat passed the filter.
    Heartbeat(HeartbeatReport),
    /// A settings context was marked failed after a storage fault.
    SettingsFailed { selector: Selector },
}

/// Sending half of the event channel.
#[derive(Debug, Clone)]
pub struct EventSender {
    tx: mpsc::Sender<ProvisionerEvent>,
}

impl EventSender {
    /// Enqueue an event without blocking. Drops the event if the queue is
    /// full or the receiver is gone.
    pub fn emit(&self, event: ProvisionerEvent) {
        match self.tx.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(event)) => {
                warn!(?event, "event queue full, dropping event");
            }
            Err(mpsc::error::TrySendError::Closed(event)) => {
                debug!(?event, "event receiver gone, dropping event");
            }
        }
    }
}

/// Create a bounded event channel of the given depth.
pub fn event_channel(depth: usize) -> (EventSender, mpsc::Receiver<ProvisionerEvent>) {
    let (tx, rx) = mpsc::channel(depth);
    (EventSender { tx }, rx)
}
