//! Integration tests for the registry actor and its JSON store.

mod common;

use std::fs;

use tempfile::TempDir;
use wold::registry::{spawn_registry, RegistryError, TargetStore};

use common::target;

#[tokio::test]
async fn test_targets_survive_restart() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("computers.json");

    {
        let registry = spawn_registry(TargetStore::new(&path)).await.unwrap();
        registry
            .upsert(target("desktop", "00:11:22:33:44:55", "192.168.1.50"))
            .await
            .unwrap();
        registry
            .upsert(target("nas", "aa-bb-cc-dd-ee-ff", "192.168.1.10"))
            .await
            .unwrap();
    }

    let registry = spawn_registry(TargetStore::new(&path)).await.unwrap();
    let targets = registry.list().await;

    assert_eq!(targets.len(), 2);
    assert_eq!(targets[0].name, "desktop");
    assert_eq!(targets[1].name, "nas");
    assert_eq!(targets[1].mac.to_string(), "AA:BB:CC:DD:EE:FF");
    assert_eq!(targets[1].ip.to_string(), "192.168.1.10");
}

#[tokio::test]
async fn test_upsert_replaces_by_name() {
    let dir = TempDir::new().unwrap();
    let registry = spawn_registry(TargetStore::new(dir.path().join("computers.json")))
        .await
        .unwrap();

    let first = registry
        .upsert(target("pc", "00:11:22:33:44:55", "10.0.0.2"))
        .await
        .unwrap();
    let second = registry
        .upsert(target("pc", "00:11:22:33:44:66", "10.0.0.3"))
        .await
        .unwrap();

    assert!(!first.replaced);
    assert!(second.replaced);

    let pc = registry.get("pc").await.unwrap();
    assert_eq!(pc.mac.to_string(), "00:11:22:33:44:66");
    assert_eq!(registry.list().await.len(), 1);
}

#[tokio::test]
async fn test_names_are_case_sensitive() {
    let dir = TempDir::new().unwrap();
    let registry = spawn_registry(TargetStore::new(dir.path().join("computers.json")))
        .await
        .unwrap();

    registry
        .upsert(target("PC", "00:11:22:33:44:55", "10.0.0.2"))
        .await
        .unwrap();
    let upserted = registry
        .upsert(target("pc", "00:11:22:33:44:55", "10.0.0.3"))
        .await
        .unwrap();

    assert!(!upserted.replaced);
    assert_eq!(registry.list().await.len(), 2);
    assert!(registry.get("Pc").await.is_none());
}

#[tokio::test]
async fn test_remove() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("computers.json");
    let registry = spawn_registry(TargetStore::new(&path)).await.unwrap();
    registry
        .upsert(target("pc", "00:11:22:33:44:55", "10.0.0.2"))
        .await
        .unwrap();

    let removed = registry.remove("pc").await.unwrap();
    assert_eq!(removed.name, "pc");
    assert!(registry.get("pc").await.is_none());

    let again = registry.remove("pc").await;
    assert!(matches!(again, Err(RegistryError::NotFound(name)) if name == "pc"));

    // The removal reached the file
    let on_disk: serde_json::Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(on_disk, serde_json::json!({}));
}

#[tokio::test]
async fn test_corrupt_file_starts_empty_and_is_kept_aside() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("computers.json");
    fs::write(&path, "desktop = 00:11:22:33:44:55").unwrap();

    let registry = spawn_registry(TargetStore::new(&path)).await.unwrap();
    assert!(registry.list().await.is_empty());

    let aside: Vec<_> = fs::read_dir(dir.path())
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().contains(".corrupt-"))
        .collect();
    assert_eq!(aside.len(), 1);

    // New data is written to a fresh file, the garbage is never merged
    registry
        .upsert(target("pc", "00:11:22:33:44:55", "10.0.0.2"))
        .await
        .unwrap();
    let reloaded = TargetStore::new(&path).load().await.unwrap();
    assert_eq!(reloaded.keys().collect::<Vec<_>>(), vec!["pc"]);
}

#[tokio::test]
async fn test_snapshot_is_a_copy() {
    let dir = TempDir::new().unwrap();
    let registry = spawn_registry(TargetStore::new(dir.path().join("computers.json")))
        .await
        .unwrap();
    registry
        .upsert(target("pc", "00:11:22:33:44:55", "10.0.0.2"))
        .await
        .unwrap();

    let snapshot = registry.snapshot().await;
    registry.remove("pc").await.unwrap();

    assert_eq!(snapshot.len(), 1);
    assert_eq!(snapshot["pc"].ip.to_string(), "10.0.0.2");
}

#[tokio::test]
async fn test_concurrent_handles() {
    let dir = TempDir::new().unwrap();
    let registry = spawn_registry(TargetStore::new(dir.path().join("computers.json")))
        .await
        .unwrap();

    let mut tasks = Vec::new();
    for i in 0..20u8 {
        let handle = registry.clone();
        tasks.push(tokio::spawn(async move {
            let mac = format!("00:11:22:33:44:{i:02X}");
            let ip = format!("10.0.0.{}", i + 1);
            handle
                .upsert(target(&format!("host-{i:02}"), &mac, &ip))
                .await
                .unwrap();
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    let targets = registry.list().await;
    assert_eq!(targets.len(), 20);
    assert_eq!(targets[0].name, "host-00");
    assert_eq!(targets[19].name, "host-19");
}
