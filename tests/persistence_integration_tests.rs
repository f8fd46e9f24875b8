//! Integration tests for store snapshots and restart recovery

use chrono::DateTime;
use epg_timeline::storage::{EpgStore, SnapshotManager};
use epg_timeline::{ChannelData, EpgConfig, EpgError, MemoryEpgStore, ProgramEntry, Timestamp, TimelineContainer};
use std::sync::Arc;
use tempfile::TempDir;

fn t(secs: i64) -> Timestamp {
    DateTime::from_timestamp(secs, 0).unwrap()
}

#[test]
fn test_snapshot_survives_restart() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("epg.snapshot");
    let config = EpgConfig::from_pairs(&format!("past_days=2;snapshot={}", path.display())).unwrap();

    {
        let store = Arc::new(MemoryEpgStore::with_config(&config).unwrap());
        let channel = Arc::new(ChannelData::new(3, "Three"));
        let mut container = TimelineContainer::new(1, Some(channel), Some(store.clone()));
        container
            .apply_update(ProgramEntry::new(1, t(0), t(60)).unwrap().title("Morning Show").broadcast_id(11))
            .unwrap();
        container
            .apply_update(ProgramEntry::new(1, t(60), t(120)).unwrap().title("Weather"))
            .unwrap();
        container.flush().unwrap();
        store.save_snapshot().unwrap();
    }

    assert!(path.exists());
    // temp file is renamed away
    assert!(!path.with_extension("tmp").exists());

    let store = Arc::new(MemoryEpgStore::with_config(&config).unwrap());
    assert_eq!(store.entry_count(1).unwrap(), 2);

    let container = TimelineContainer::new(1, None, Some(store.clone()));
    let show = container.get_by_broadcast_id(11).unwrap().unwrap();
    assert_eq!(show.details().title, "Morning Show");
    assert_eq!(show.persisted_id(), Some(1));

    // ids keep counting after a restore
    store.queue_upsert(&ProgramEntry::new(1, t(120), t(180)).unwrap()).unwrap();
    assert_eq!(store.entry_by_start(1, t(120)).unwrap().unwrap().persisted_id(), Some(3));
}

#[test]
fn test_missing_snapshot_starts_empty() {
    let temp_dir = TempDir::new().unwrap();
    let config = EpgConfig::new().snapshot_path(temp_dir.path().join("absent.snapshot"));

    let store = MemoryEpgStore::with_config(&config).unwrap();
    assert!(store.timeline_ids().unwrap().is_empty());
}

#[test]
fn test_save_without_path_fails() {
    let store = MemoryEpgStore::new();
    assert!(matches!(store.save_snapshot(), Err(EpgError::NotFound(_))));
}

#[test]
fn test_corrupt_snapshot_is_reported() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("broken.snapshot");
    std::fs::write(&path, b"not a snapshot").unwrap();

    let manager = SnapshotManager::new(&path);
    assert!(manager.exists());
    assert!(matches!(manager.load(), Err(EpgError::Serialization(_))));

    let config = EpgConfig::new().snapshot_path(&path);
    assert!(MemoryEpgStore::with_config(&config).is_err());
}
