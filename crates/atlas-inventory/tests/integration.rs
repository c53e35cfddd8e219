//! Integration tests for atlas-inventory against in-process SQLite.

use atlas_core::{ContainerKey, Facts, OnlineStatus, Scope};
use atlas_inventory::{InventoryStore, StoreConfig};

use chrono::{Duration, Utc};

async fn fresh_store() -> InventoryStore {
    let store = InventoryStore::connect_in_memory().await.unwrap();
    store.initialize_schema().await.unwrap();
    store
}

fn deep_facts(ip: &str, iface: &str) -> Facts {
    Facts {
        display_name: "nas.local".to_string(),
        os_details: Some("Linux 5.15".to_string()),
        mac_address: Some("AA:BB:CC:DD:EE:01".to_string()),
        open_ports: Some(vec!["22/tcp (ssh)".to_string(), "445/tcp (microsoft-ds)".to_string()]),
        ..Facts::host(ip, iface, "LAN")
    }
}

fn container_facts(id: &str, network: &str, state: &str) -> Facts {
    Facts {
        address: "172.17.0.2".to_string(),
        display_name: format!("svc-{id}"),
        ..Facts::container(id, state, network)
    }
}

#[tokio::test]
async fn test_schema_initialization_is_idempotent() {
    let store = fresh_store().await;
    store.initialize_schema().await.unwrap();

    let state = store.scheduler_state().await.unwrap();
    assert_eq!(state.scan_interval_minutes, 60);
    assert!(state.enabled);
    assert!(state.last_run.is_none());
}

#[tokio::test]
async fn test_host_upsert_is_idempotent() {
    let store = fresh_store().await;
    let facts = deep_facts("10.0.1.5", "eth0");

    let first = Utc::now();
    store.upsert_host(&facts, first).await.unwrap();
    let second = first + Duration::seconds(30);
    store.upsert_host(&facts, second).await.unwrap();

    let hosts = store.list_hosts().await.unwrap();
    assert_eq!(hosts.len(), 1);
    let host = &hosts[0];
    assert_eq!(host.address, "10.0.1.5");
    assert_eq!(host.display_name, "nas.local");
    assert_eq!(host.open_ports, "22/tcp (ssh), 445/tcp (microsoft-ds)");
    assert_eq!(host.online_status, OnlineStatus::Online);
    assert_eq!(host.last_seen, second);
}

#[tokio::test]
async fn test_same_address_on_two_interfaces_is_two_rows() {
    let store = fresh_store().await;
    let now = Utc::now();
    store.upsert_host(&deep_facts("10.0.1.5", "eth0"), now).await.unwrap();
    store.upsert_host(&deep_facts("10.0.1.5", "wlan0"), now).await.unwrap();
    store.upsert_host(&deep_facts("10.0.1.5", "eth0"), now).await.unwrap();

    let hosts = store.list_hosts().await.unwrap();
    assert_eq!(hosts.len(), 2);
    assert!(store.get_host("10.0.1.5", "wlan0").await.unwrap().is_some());
    assert!(store.get_host("10.0.1.6", "eth0").await.unwrap().is_none());
}

#[tokio::test]
async fn test_liveness_facts_keep_deep_detail() {
    let store = fresh_store().await;
    let now = Utc::now();
    store.upsert_host(&deep_facts("10.0.1.5", "eth0"), now).await.unwrap();

    let sweep = Facts {
        next_hop: Some("10.0.1.1".to_string()),
        ..Facts::host("10.0.1.5", "eth0", "LAN")
    };
    store.upsert_host(&sweep, now).await.unwrap();

    let host = store.get_host("10.0.1.5", "eth0").await.unwrap().unwrap();
    assert_eq!(host.display_name, "nas.local");
    assert_eq!(host.os_details, "Linux 5.15");
    assert_eq!(host.mac_address, "AA:BB:CC:DD:EE:01");
    assert_eq!(host.open_ports, "22/tcp (ssh), 445/tcp (microsoft-ds)");
    assert_eq!(host.next_hop, "10.0.1.1");
}

#[tokio::test]
async fn test_first_insert_stores_sentinels() {
    let store = fresh_store().await;
    store
        .upsert_host(&Facts::host("10.0.1.9", "eth0", "LAN"), Utc::now())
        .await
        .unwrap();

    let host = store.get_host("10.0.1.9", "eth0").await.unwrap().unwrap();
    assert_eq!(host.display_name, "NoName");
    assert_eq!(host.os_details, "Unknown");
    assert_eq!(host.open_ports, "Unknown");
    assert_eq!(host.next_hop, "");
}

#[tokio::test]
async fn test_mark_offline_respects_scope() {
    let store = fresh_store().await;
    let now = Utc::now();
    store.upsert_host(&deep_facts("10.0.1.5", "eth0"), now).await.unwrap();
    store.upsert_host(&deep_facts("10.0.1.6", "eth0"), now).await.unwrap();
    store.upsert_host(&deep_facts("192.168.1.5", "wlan0"), now).await.unwrap();

    let touched = store
        .mark_hosts_offline(&Scope::Interface("eth0".to_string()))
        .await
        .unwrap();
    assert_eq!(touched, 2);

    let wlan = store.get_host("192.168.1.5", "wlan0").await.unwrap().unwrap();
    assert_eq!(wlan.online_status, OnlineStatus::Online);

    let touched = store
        .mark_hosts_offline(&Scope::Interfaces(vec!["eth1".to_string(), "eth0".to_string()]))
        .await
        .unwrap();
    assert_eq!(touched, 2);
    let wlan = store.get_host("192.168.1.5", "wlan0").await.unwrap().unwrap();
    assert_eq!(wlan.online_status, OnlineStatus::Online);

    let touched = store
        .mark_hosts_offline(&Scope::Interfaces(Vec::new()))
        .await
        .unwrap();
    assert_eq!(touched, 0);
    let wlan = store.get_host("192.168.1.5", "wlan0").await.unwrap().unwrap();
    assert_eq!(wlan.online_status, OnlineStatus::Online);

    assert!(store
        .mark_hosts_offline(&Scope::AllExcept(vec!["abc".to_string()]))
        .await
        .is_err());

    store.mark_hosts_offline(&Scope::All).await.unwrap();
    let hosts = store.list_hosts().await.unwrap();
    assert!(hosts.iter().all(|h| h.online_status == OnlineStatus::Offline));
}

#[tokio::test]
async fn test_container_upsert_and_delete_vanished() {
    let store = fresh_store().await;
    let now = Utc::now();
    store.upsert_container(&container_facts("aaa", "bridge", "running"), now).await.unwrap();
    store.upsert_container(&container_facts("aaa", "backend", "running"), now).await.unwrap();
    store.upsert_container(&container_facts("bbb", "bridge", "exited"), now).await.unwrap();
    store.upsert_container(&container_facts("ccc", "bridge", "running"), now).await.unwrap();

    let containers = store.list_containers().await.unwrap();
    assert_eq!(containers.len(), 4);
    let bbb = containers
        .iter()
        .find(|c| c.container_id.as_deref() == Some("bbb"))
        .unwrap();
    assert_eq!(bbb.online_status, OnlineStatus::Offline);

    // aaa left "backend", bbb is gone, ccc failed inspection this pass.
    let live = vec![ContainerKey {
        container_id: "aaa".to_string(),
        network_name: "bridge".to_string(),
    }];
    let deleted = store
        .delete_vanished_containers(&live, &["ccc".to_string()])
        .await
        .unwrap();
    assert_eq!(deleted, 2);

    let remaining: Vec<_> = store
        .list_containers()
        .await
        .unwrap()
        .into_iter()
        .map(|c| (c.container_id.unwrap(), c.network_name))
        .collect();
    assert_eq!(
        remaining,
        vec![
            ("aaa".to_string(), "bridge".to_string()),
            ("ccc".to_string(), "bridge".to_string()),
        ]
    );
}

#[tokio::test]
async fn test_empty_live_set_deletes_nothing() {
    let store = fresh_store().await;
    store
        .upsert_container(&container_facts("aaa", "bridge", "running"), Utc::now())
        .await
        .unwrap();

    let deleted = store.delete_vanished_containers(&[], &[]).await.unwrap();
    assert_eq!(deleted, 0);
    assert_eq!(store.list_containers().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_container_without_id_is_rejected() {
    let store = fresh_store().await;
    let result = store
        .upsert_container(&Facts::host("10.0.0.1", "eth0", "LAN"), Utc::now())
        .await;
    assert!(result.is_err());
}

#[tokio::test]
async fn test_external_network_upsert_refreshes_last_seen() {
    let store = fresh_store().await;
    let first = Utc::now();
    store
        .upsert_external_network("203.0.113.7", None, None, first)
        .await
        .unwrap();
    let later = first + Duration::minutes(5);
    store
        .upsert_external_network("203.0.113.7", Some("ExampleNet"), None, later)
        .await
        .unwrap();

    let networks = store.list_external_networks().await.unwrap();
    assert_eq!(networks.len(), 1);
    assert_eq!(networks[0].last_seen, later);
    assert_eq!(networks[0].provider.as_deref(), Some("ExampleNet"));
}

#[tokio::test]
async fn test_scheduler_config_roundtrip() {
    let store = fresh_store().await;
    store.update_scheduler_config(15, false).await.unwrap();
    let ran_at = Utc::now();
    store.record_scheduler_run(ran_at).await.unwrap();

    let state = store.scheduler_state().await.unwrap();
    assert_eq!(state.scan_interval_minutes, 15);
    assert!(!state.enabled);
    assert_eq!(state.last_run, Some(ran_at));
}

#[tokio::test]
async fn test_concurrent_writers_on_file_store() {
    let dir = tempfile::tempdir().unwrap();
    let config = StoreConfig {
        path: dir.path().join("db").join("atlas.db"),
        ..StoreConfig::default()
    };
    let store = InventoryStore::connect(&config).await.unwrap();
    store.initialize_schema().await.unwrap();

    let mut handles = Vec::new();
    for i in 0..24 {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            let facts = deep_facts(&format!("10.0.2.{i}"), "eth0");
            // Every writer hits the same key twice to exercise the conflict path.
            store.upsert_host(&facts, Utc::now()).await.unwrap();
            store.upsert_host(&facts, Utc::now()).await.unwrap();
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    assert_eq!(store.list_hosts().await.unwrap().len(), 24);
    store.close().await;
}
