//! Coarse-locked provisioner facade.
//!
//! One mutex guards the whole in-memory working set (keys, node table,
//! heartbeat filter) so cross-component operations stay atomic. The
//! settings store sits behind its own lock: snapshot I/O copies the
//! working set in or out and never holds the state lock across `await`
//! points on the storage path.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use meshprov_core::types::{DeviceUuid, KeyIndex, KeyMaterial, MeshAddr, UnicastAddr};
use meshprov_state::{
    FilterMode, FilterOp, HeartbeatDecision, HeartbeatFilter, KeyStore, NodeRecord, NodeTable,
};

use crate::config::ProvisionerConfig;
use crate::error::ProvisionerError;
use crate::events::{
    event_channel, EventSender, HeartbeatReport, KeyKind, ProvisionerEvent,
};
use crate::settings::{ContextState, Selector, SettingsError, SettingsStore};
use crate::storage::SettingsStorage;

/// Seconds since the Unix epoch, used for filter entry deadlines.
fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

/// The live working set, guarded as one unit.
struct WorkingState {
    keystore: KeyStore,
    nodes: NodeTable,
    heartbeat: HeartbeatFilter,
}

/// Provisioner-side network-state manager.
pub struct Provisioner {
    state: Mutex<WorkingState>,
    settings: Mutex<SettingsStore>,
    events: EventSender,
    node_capacity: usize,
    persist_interval: u64,
}

impl Provisioner {
    /// Build a provisioner from configuration.
    ///
    /// Returns the provisioner and the receiving half of its event channel.
    pub async fn new(
        config: &ProvisionerConfig,
    ) -> Result<(Self, mpsc::Receiver<ProvisionerEvent>), ProvisionerError> {
        let storage = match &config.settings.storage_path {
            Some(path) => SettingsStorage::new(PathBuf::from(path)),
            None => SettingsStorage::default_path(),
        }
        .map_err(SettingsError::from)?;

        let node_capacity = config.provisioner.max_nodes;
        let settings =
            SettingsStore::load(storage, config.settings.max_contexts, node_capacity).await?;
        let (events, rx) = event_channel(config.provisioner.event_queue_depth);

        info!(
            max_nodes = node_capacity,
            max_contexts = config.settings.max_contexts,
            "provisioner initialized"
        );

        Ok((
            Self {
                state: Mutex::new(WorkingState {
                    keystore: KeyStore::new(),
                    nodes: NodeTable::new(node_capacity),
                    heartbeat: HeartbeatFilter::new(),
                }),
                settings: Mutex::new(settings),
                events,
                node_capacity,
                persist_interval: config.settings.persist_interval,
            },
            rx,
        ))
    }

    /// Spawn the periodic persistence task.
    ///
    /// Every `persist_interval` seconds the currently restored context, if
    /// any, is written back to storage. The first write happens right after
    /// spawning. Returns `None` when the interval is configured as 0.
    pub fn spawn_persist_task(self: &Arc<Self>) -> Option<JoinHandle<()>> {
        if self.persist_interval == 0 {
            return None;
        }
        let prov = Arc::clone(self);
        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(prov.persist_interval));
            loop {
                ticker.tick().await;
                prov.persist_restored().await;
            }
        }))
    }

    /// Persist the restored context, if any. No-op while nothing is restored.
    async fn persist_restored(&self) {
        let Some(index) = self.settings.lock().await.restored_index() else {
            return;
        };
        let selector = Selector::Index(index);
        match self.persist_settings(&selector).await {
            Ok(()) => {}
            Err(ProvisionerError::Settings(e)) if e.is_wrong_state() => {
                // The context was released between the check and the write
                debug!(%selector, "skipping periodic persist");
            }
            Err(e) => warn!(%selector, error = %e, "periodic persist failed"),
        }
    }

    // --- keys ---

    /// Add a local NetKey, reporting the index when it was auto-allocated.
    pub async fn add_net_key(
        &self,
        material: Option<KeyMaterial>,
        index: KeyIndex,
    ) -> Result<u16, ProvisionerError> {
        let auto = index.is_auto();
        let mut state = self.state.lock().await;
        let index = state.keystore.add_net_key(material, index)?;
        drop(state);

        debug!(index, auto, "net key added");
        if auto {
            self.events.emit(ProvisionerEvent::KeyIndexAllocated {
                kind: KeyKind::Net,
                index,
            });
        }
        Ok(index)
    }

    pub async fn update_net_key(
        &self,
        material: KeyMaterial,
        index: u16,
    ) -> Result<(), ProvisionerError> {
        let mut state = self.state.lock().await;
        state.keystore.update_net_key(material, index)?;
        debug!(index, "net key updated");
        Ok(())
    }

    pub async fn net_key(&self, index: u16) -> Option<KeyMaterial> {
        self.state.lock().await.keystore.get_net_key(index).copied()
    }

    /// Add a local AppKey bound to `net_index`.
    pub async fn add_app_key(
        &self,
        material: Option<KeyMaterial>,
        net_index: u16,
        app_index: KeyIndex,
    ) -> Result<u16, ProvisionerError> {
        let auto = app_index.is_auto();
        let mut state = self.state.lock().await;
        let index = state.keystore.add_app_key(material, net_index, app_index)?;
        drop(state);

        debug!(index, net_index, auto, "app key added");
        if auto {
            self.events.emit(ProvisionerEvent::KeyIndexAllocated {
                kind: KeyKind::App,
                index,
            });
        }
        Ok(index)
    }

    pub async fn update_app_key(
        &self,
        material: KeyMaterial,
        net_index: u16,
        app_index: u16,
    ) -> Result<(), ProvisionerError> {
        let mut state = self.state.lock().await;
        state.keystore.update_app_key(material, net_index, app_index)?;
        debug!(app_index, net_index, "app key updated");
        Ok(())
    }

    pub async fn app_key(&self, net_index: u16, app_index: u16) -> Option<KeyMaterial> {
        self.state
            .lock()
            .await
            .keystore
            .get_app_key(net_index, app_index)
            .copied()
    }

    /// Bind an AppKey to a local model.
    pub async fn bind_local_model(
        &self,
        element_addr: UnicastAddr,
        app_index: u16,
        model_id: u16,
        company_id: u16,
    ) -> Result<(), ProvisionerError> {
        let mut state = self.state.lock().await;
        state
            .keystore
            .bind_local_model(element_addr, app_index, model_id, company_id)?;
        debug!(%element_addr, app_index, model_id, "app key bound to local model");
        Ok(())
    }

    // --- nodes ---

    /// Record a provisioned node, returning its table slot.
    pub async fn add_node(
        &self,
        uuid: DeviceUuid,
        unicast_addr: UnicastAddr,
        element_count: u8,
    ) -> Result<u16, ProvisionerError> {
        let mut state = self.state.lock().await;
        let slot = state.nodes.add(uuid, unicast_addr, element_count)?;
        drop(state);

        info!(slot, %unicast_addr, "node provisioned");
        self.events
            .emit(ProvisionerEvent::NodeAdded { slot, unicast_addr });
        Ok(slot)
    }

    pub async fn rename_node(&self, slot: u16, name: &str) -> Result<(), ProvisionerError> {
        let mut state = self.state.lock().await;
        state.nodes.rename(slot, name)?;
        Ok(())
    }

    pub async fn node(&self, slot: u16) -> Option<NodeRecord> {
        self.state.lock().await.nodes.get(slot).cloned()
    }

    pub async fn node_name(&self, slot: u16) -> Option<String> {
        self.state
            .lock()
            .await
            .nodes
            .get_name(slot)
            .map(str::to_string)
    }

    pub async fn node_by_uuid(&self, uuid: &DeviceUuid) -> Option<NodeRecord> {
        self.state.lock().await.nodes.get_by_uuid(uuid).cloned()
    }

    pub async fn node_by_addr(&self, addr: UnicastAddr) -> Option<NodeRecord> {
        self.state.lock().await.nodes.get_by_addr(addr).cloned()
    }

    pub async fn node_by_name(&self, name: &str) -> Option<u16> {
        self.state.lock().await.nodes.get_by_name(name)
    }

    /// Delete a node by device UUID, returning the freed slot.
    pub async fn delete_node_by_uuid(&self, uuid: &DeviceUuid) -> Result<u16, ProvisionerError> {
        let mut state = self.state.lock().await;
        let slot = state.nodes.delete_by_uuid(uuid)?;
        drop(state);

        info!(slot, "node deleted");
        self.events.emit(ProvisionerEvent::NodeDeleted { slot });
        Ok(slot)
    }

    /// Delete a node by primary unicast address, returning the freed slot.
    pub async fn delete_node_by_addr(&self, addr: UnicastAddr) -> Result<u16, ProvisionerError> {
        let mut state = self.state.lock().await;
        let slot = state.nodes.delete_by_addr(addr)?;
        drop(state);

        info!(slot, %addr, "node deleted");
        self.events.emit(ProvisionerEvent::NodeDeleted { slot });
        Ok(slot)
    }

    pub async fn store_composition_data(
        &self,
        addr: UnicastAddr,
        data: &[u8],
    ) -> Result<(), ProvisionerError> {
        let mut state = self.state.lock().await;
        state.nodes.store_composition_data(addr, data)?;
        debug!(%addr, len = data.len(), "composition data stored");
        Ok(())
    }

    pub async fn node_count(&self) -> usize {
        self.state.lock().await.nodes.count()
    }

    // --- heartbeat ---

    /// Enable heartbeat processing with an empty blacklist.
    pub async fn start_heartbeat(&self) {
        let mut state = self.state.lock().await;
        state.heartbeat.start();
        info!("heartbeat processing started");
    }

    /// Set the heartbeat filter mode. Changing the mode clears all entries.
    pub async fn set_heartbeat_filter_type(
        &self,
        mode: FilterMode,
    ) -> Result<(), ProvisionerError> {
        let mut state = self.state.lock().await;
        state.heartbeat.set_filter_type(mode)?;
        debug!(?mode, "heartbeat filter mode set");
        Ok(())
    }

    /// Add, remove, or clean heartbeat filter entries.
    pub async fn set_heartbeat_filter_info(&self, op: FilterOp) -> Result<(), ProvisionerError> {
        let mut state = self.state.lock().await;
        state.heartbeat.set_filter_info(op, now_secs())?;
        Ok(())
    }

    /// Run an incoming heartbeat through the filter.
    ///
    /// A passing heartbeat is reported on the event channel with its hop
    /// count derived from the TTL delta.
    pub async fn handle_heartbeat(
        &self,
        src: UnicastAddr,
        dst: MeshAddr,
        init_ttl: u8,
        rx_ttl: u8,
    ) -> HeartbeatDecision {
        let mut state = self.state.lock().await;
        let decision = state.heartbeat.evaluate(src, dst, now_secs());
        drop(state);

        match decision {
            HeartbeatDecision::Report => {
                let hops = init_ttl.saturating_sub(rx_ttl).saturating_add(1);
                debug!(%src, %dst, hops, "heartbeat reported");
                self.events.emit(ProvisionerEvent::Heartbeat(HeartbeatReport {
                    src,
                    dst,
                    init_ttl,
                    rx_ttl,
                    hops,
                }));
            }
            HeartbeatDecision::Drop { reason } => {
                debug!(%src, %dst, ?reason, "heartbeat dropped");
            }
        }
        decision
    }

    // --- settings ---

    /// Open a settings context. Returns the context index.
    pub async fn open_settings(&self, selector: &Selector) -> Result<u16, ProvisionerError> {
        let index = self.settings.lock().await.open(selector).await?;
        info!(%selector, index, "settings context opened");
        Ok(u16::from(index))
    }

    /// Restore a settings context, installing its snapshot as the working set.
    ///
    /// The settings lock is held across the install so the snapshot cannot
    /// be wiped by a release racing on another context.
    pub async fn restore_settings(&self, selector: &Selector) -> Result<(), ProvisionerError> {
        let mut settings = self.settings.lock().await;
        let (keystore, nodes) = settings.restore(selector).await?;

        let mut state = self.state.lock().await;
        state.keystore = keystore;
        state.nodes = nodes;
        let count = state.nodes.count();
        drop(state);
        drop(settings);

        info!(%selector, nodes = count, "settings context restored");
        Ok(())
    }

    /// Persist the current working set into the restored context.
    pub async fn persist_settings(&self, selector: &Selector) -> Result<(), ProvisionerError> {
        // Copy out under the state lock, then write without holding it.
        let state = self.state.lock().await;
        let keystore = state.keystore.clone();
        let nodes = state.nodes.clone();
        drop(state);

        let mut settings = self.settings.lock().await;
        settings.persist(selector, &keystore, &nodes).await?;
        debug!(%selector, "working set persisted");
        Ok(())
    }

    /// Release the restored context and clear the working set.
    ///
    /// With `erase` the stored snapshot is purged too; a storage fault
    /// during the purge marks the context failed and is reported as an
    /// event, but the working set is cleared either way.
    pub async fn release_settings(
        &self,
        selector: &Selector,
        erase: bool,
    ) -> Result<(), ProvisionerError> {
        // The working set is cleared while the settings lock is still held,
        // so a restore racing on another context cannot install a snapshot
        // in between and have it wiped.
        let mut settings = self.settings.lock().await;
        let result = settings.release(selector, erase).await;

        match result {
            Err(e) if e.is_wrong_state() || matches!(e, SettingsError::NotFound) => {
                return Err(e.into())
            }
            Err(e) => {
                self.clear_working_set().await;
                drop(settings);
                warn!(%selector, error = %e, "settings erase failed during release");
                self.events.emit(ProvisionerEvent::SettingsFailed {
                    selector: selector.clone(),
                });
                return Err(e.into());
            }
            Ok(()) => {}
        }

        self.clear_working_set().await;
        drop(settings);
        info!(%selector, erase, "settings context released");
        Ok(())
    }

    /// Close a settings context. With `erase` the stored snapshot and the
    /// selector's user-id mapping are removed.
    pub async fn close_settings(
        &self,
        selector: &Selector,
        erase: bool,
    ) -> Result<(), ProvisionerError> {
        let mut settings = self.settings.lock().await;
        let result = settings.close(selector, erase).await;
        drop(settings);

        if let Err(e) = result {
            if !e.is_wrong_state() && !matches!(e, SettingsError::NotFound) {
                warn!(%selector, error = %e, "settings erase failed during close");
                self.events.emit(ProvisionerEvent::SettingsFailed {
                    selector: selector.clone(),
                });
            }
            return Err(e.into());
        }
        info!(%selector, erase, "settings context closed");
        Ok(())
    }

    /// Erase a stale, closed settings context.
    pub async fn delete_settings(&self, selector: &Selector) -> Result<(), ProvisionerError> {
        self.settings.lock().await.delete(selector).await?;
        info!(%selector, "settings context deleted");
        Ok(())
    }

    /// Erase every settings context. Valid only while all are closed.
    pub async fn erase_all_settings(&self) -> Result<(), ProvisionerError> {
        self.settings.lock().await.direct_erase_all().await?;
        info!("all settings contexts erased");
        Ok(())
    }

    pub async fn settings_user_id(&self, index: u8) -> Option<String> {
        self.settings
            .lock()
            .await
            .user_id(index)
            .map(str::to_string)
    }

    pub async fn settings_index_of(&self, user_id: &str) -> Option<u8> {
        self.settings.lock().await.index_of(user_id)
    }

    pub async fn settings_free_slots(&self) -> usize {
        self.settings.lock().await.free_slots()
    }

    pub async fn settings_state(&self, index: u8) -> Option<ContextState> {
        self.settings.lock().await.state_of(index)
    }

    async fn clear_working_set(&self) {
        let mut state = self.state.lock().await;
        state.keystore.clear();
        state.nodes = NodeTable::new(self.node_capacity);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProvisionerConfig;

    async fn provisioner() -> (
        tempfile::TempDir,
        Provisioner,
        mpsc::Receiver<ProvisionerEvent>,
    ) {
        let dir = tempfile::tempdir().unwrap();
        let toml = format!(
            "[provisioner]\nmax_nodes = 4\n\n[settings]\nstorage_path = {:?}\nmax_contexts = 2\n",
            dir.path()
        );
        let config = ProvisionerConfig::parse(&toml).unwrap();
        let (prov, rx) = Provisioner::new(&config).await.unwrap();
        (dir, prov, rx)
    }

    fn uuid(seed: u8) -> DeviceUuid {
        DeviceUuid::new([seed; 16])
    }

    fn addr(v: u16) -> UnicastAddr {
        UnicastAddr::new(v).unwrap()
    }

    #[tokio::test]
    async fn auto_key_index_is_reported_as_event() {
        let (_dir, prov, mut rx) = provisioner().await;
        let index = prov.add_net_key(None, KeyIndex::AUTO).await.unwrap();
        assert_eq!(index, 0);
        assert_eq!(
            rx.recv().await,
            Some(ProvisionerEvent::KeyIndexAllocated {
                kind: KeyKind::Net,
                index: 0
            })
        );
    }

    #[tokio::test]
    async fn explicit_key_index_emits_no_event() {
        let (_dir, prov, mut rx) = provisioner().await;
        prov.add_net_key(None, KeyIndex::new(3)).await.unwrap();
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn node_add_and_delete_emit_events() {
        let (_dir, prov, mut rx) = provisioner().await;
        let slot = prov.add_node(uuid(1), addr(0x0010), 2).await.unwrap();
        assert_eq!(
            rx.recv().await,
            Some(ProvisionerEvent::NodeAdded {
                slot,
                unicast_addr: addr(0x0010)
            })
        );

        prov.delete_node_by_addr(addr(0x0010)).await.unwrap();
        assert_eq!(rx.recv().await, Some(ProvisionerEvent::NodeDeleted { slot }));
    }

    #[tokio::test]
    async fn heartbeat_report_carries_hop_count() {
        let (_dir, prov, mut rx) = provisioner().await;
        prov.start_heartbeat().await;

        let decision = prov
            .handle_heartbeat(addr(5), MeshAddr::new(0xC000), 7, 5)
            .await;
        assert_eq!(decision, HeartbeatDecision::Report);
        assert_eq!(
            rx.recv().await,
            Some(ProvisionerEvent::Heartbeat(HeartbeatReport {
                src: addr(5),
                dst: MeshAddr::new(0xC000),
                init_ttl: 7,
                rx_ttl: 5,
                hops: 3
            }))
        );
    }

    #[tokio::test]
    async fn dropped_heartbeat_emits_no_event() {
        let (_dir, prov, mut rx) = provisioner().await;
        // Not started
        let decision = prov
            .handle_heartbeat(addr(5), MeshAddr::new(1), 7, 7)
            .await;
        assert!(matches!(decision, HeartbeatDecision::Drop { .. }));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn persist_task_disabled_at_interval_zero() {
        let dir = tempfile::tempdir().unwrap();
        let toml = format!(
            "[settings]\nstorage_path = {:?}\npersist_interval = 0\n",
            dir.path()
        );
        let config = ProvisionerConfig::parse(&toml).unwrap();
        let (prov, _rx) = Provisioner::new(&config).await.unwrap();
        assert!(Arc::new(prov).spawn_persist_task().is_none());
    }

    #[tokio::test]
    async fn release_clears_working_set() {
        let (_dir, prov, _rx) = provisioner().await;
        let sel = Selector::Index(0);
        prov.open_settings(&sel).await.unwrap();
        prov.restore_settings(&sel).await.unwrap();

        prov.add_node(uuid(1), addr(1), 1).await.unwrap();
        prov.add_net_key(None, KeyIndex::AUTO).await.unwrap();
        assert_eq!(prov.node_count().await, 1);

        prov.release_settings(&sel, false).await.unwrap();
        assert_eq!(prov.node_count().await, 0);
        assert!(prov.net_key(0).await.is_none());
    }
}
