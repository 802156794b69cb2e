//! End-to-end settings lifecycle tests against real storage.

use meshprov_core::types::{DeviceUuid, KeyIndex, UnicastAddr};
use meshprov_node::{
    ContextState, Provisioner, ProvisionerConfig, ProvisionerError, Selector, SettingsError,
};

async fn provisioner_at(path: &std::path::Path) -> Provisioner {
    let toml = format!(
        "[provisioner]\nmax_nodes = 8\n\n[settings]\nstorage_path = {path:?}\nmax_contexts = 3\n",
    );
    let config = ProvisionerConfig::parse(&toml).unwrap();
    let (prov, _rx) = Provisioner::new(&config).await.unwrap();
    prov
}

fn uuid(seed: u8) -> DeviceUuid {
    DeviceUuid::new([seed; 16])
}

fn addr(v: u16) -> UnicastAddr {
    UnicastAddr::new(v).unwrap()
}

#[tokio::test]
async fn restore_before_open_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let prov = provisioner_at(dir.path()).await;

    let err = prov.restore_settings(&Selector::Index(0)).await.unwrap_err();
    assert!(matches!(
        err,
        ProvisionerError::Settings(SettingsError::NotOpened)
    ));
}

#[tokio::test]
async fn working_set_survives_full_lifecycle() {
    let dir = tempfile::tempdir().unwrap();
    let sel = Selector::UserId("site-a".to_string());

    {
        let prov = provisioner_at(dir.path()).await;
        prov.open_settings(&sel).await.unwrap();
        prov.restore_settings(&sel).await.unwrap();

        prov.add_net_key(None, KeyIndex::new(0)).await.unwrap();
        prov.add_app_key(None, 0, KeyIndex::new(0)).await.unwrap();
        let slot = prov.add_node(uuid(1), addr(0x0010), 2).await.unwrap();
        prov.rename_node(slot, "gateway").await.unwrap();
        prov.store_composition_data(addr(0x0010), &[0x0C, 0x00])
            .await
            .unwrap();

        prov.persist_settings(&sel).await.unwrap();
        prov.release_settings(&sel, false).await.unwrap();
        prov.close_settings(&sel, false).await.unwrap();
    }

    // A fresh provisioner over the same storage sees the same contents
    let prov = provisioner_at(dir.path()).await;
    assert_eq!(prov.settings_index_of("site-a").await, Some(0));
    prov.open_settings(&sel).await.unwrap();
    prov.restore_settings(&sel).await.unwrap();

    assert!(prov.net_key(0).await.is_some());
    assert!(prov.app_key(0, 0).await.is_some());
    let node = prov.node_by_addr(addr(0x0010)).await.unwrap();
    assert_eq!(node.uuid, uuid(1));
    assert_eq!(node.element_count, 2);
    assert_eq!(node.composition_data, vec![0x0C, 0x00]);
    assert_eq!(prov.node_by_name("gateway").await, Some(0));
}

#[tokio::test]
async fn release_without_persist_discards_changes() {
    let dir = tempfile::tempdir().unwrap();
    let sel = Selector::Index(0);

    let prov = provisioner_at(dir.path()).await;
    prov.open_settings(&sel).await.unwrap();
    prov.restore_settings(&sel).await.unwrap();
    prov.add_node(uuid(1), addr(1), 1).await.unwrap();
    prov.release_settings(&sel, false).await.unwrap();
    prov.close_settings(&sel, false).await.unwrap();

    prov.open_settings(&sel).await.unwrap();
    prov.restore_settings(&sel).await.unwrap();
    assert_eq!(prov.node_count().await, 0);
}

#[tokio::test]
async fn delete_while_open_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let prov = provisioner_at(dir.path()).await;
    let sel = Selector::Index(1);

    prov.open_settings(&sel).await.unwrap();
    let err = prov.delete_settings(&sel).await.unwrap_err();
    assert!(matches!(
        err,
        ProvisionerError::Settings(SettingsError::InUse)
    ));

    prov.close_settings(&sel, false).await.unwrap();
    prov.delete_settings(&sel).await.unwrap();
}

#[tokio::test]
async fn close_with_erase_frees_the_user_id() {
    let dir = tempfile::tempdir().unwrap();
    let prov = provisioner_at(dir.path()).await;
    let sel = Selector::UserId("ephemeral".to_string());

    prov.open_settings(&sel).await.unwrap();
    assert_eq!(prov.settings_free_slots().await, 2);
    prov.close_settings(&sel, true).await.unwrap();

    assert_eq!(prov.settings_free_slots().await, 3);
    assert!(prov.settings_index_of("ephemeral").await.is_none());
}

#[tokio::test]
async fn contexts_are_isolated() {
    let dir = tempfile::tempdir().unwrap();
    let prov = provisioner_at(dir.path()).await;

    // Context 0 holds one node
    let a = Selector::Index(0);
    prov.open_settings(&a).await.unwrap();
    prov.restore_settings(&a).await.unwrap();
    prov.add_node(uuid(1), addr(1), 1).await.unwrap();
    prov.persist_settings(&a).await.unwrap();
    prov.release_settings(&a, false).await.unwrap();
    prov.close_settings(&a, false).await.unwrap();

    // Context 1 starts empty
    let b = Selector::Index(1);
    prov.open_settings(&b).await.unwrap();
    prov.restore_settings(&b).await.unwrap();
    assert_eq!(prov.node_count().await, 0);
    prov.release_settings(&b, false).await.unwrap();
    prov.close_settings(&b, false).await.unwrap();

    // Context 0 still holds its node
    prov.open_settings(&a).await.unwrap();
    prov.restore_settings(&a).await.unwrap();
    assert_eq!(prov.node_count().await, 1);
}

#[tokio::test]
async fn second_restore_requires_release_of_the_first() {
    let dir = tempfile::tempdir().unwrap();
    let prov = provisioner_at(dir.path()).await;

    prov.open_settings(&Selector::Index(0)).await.unwrap();
    prov.open_settings(&Selector::Index(1)).await.unwrap();
    prov.restore_settings(&Selector::Index(0)).await.unwrap();

    let err = prov
        .restore_settings(&Selector::Index(1))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ProvisionerError::Settings(SettingsError::AlreadyRestored)
    ));
    assert_eq!(prov.settings_state(0).await, Some(ContextState::Restored));
    assert_eq!(prov.settings_state(1).await, Some(ContextState::Opened));
}
