//! Snapshot files for the in-memory store

use crate::core::{EpgError, ProgramEntry, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

pub const SNAPSHOT_FORMAT_VERSION: u32 = 1;

// ============================================================================
// Store Snapshot
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct StoreSnapshot {
    pub version: u32,
    pub timelines: BTreeMap<i32, Vec<ProgramEntry>>,
    pub next_id: i64,
    pub metadata: SnapshotMetadata,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SnapshotMetadata {
    pub created_at: u64,
    pub entry_count: usize,
    pub timeline_count: usize,
}

impl StoreSnapshot {
    pub fn new(timelines: BTreeMap<i32, Vec<ProgramEntry>>, next_id: i64) -> Self {
        let entry_count = timelines.values().map(Vec::len).sum();
        let timeline_count = timelines.len();
        let created_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);

        Self {
            version: SNAPSHOT_FORMAT_VERSION,
            timelines,
            next_id,
            metadata: SnapshotMetadata { created_at, entry_count, timeline_count },
        }
    }
}

fn io_error(context: &'static str) -> impl FnOnce(std::io::Error) -> EpgError {
    move |e| EpgError::IoError(format!("{}: {}", context, e))
}

// ============================================================================
// Snapshot Manager
// ============================================================================

pub struct SnapshotManager {
    snapshot_path: PathBuf,
}

impl SnapshotManager {
    pub fn new<P: AsRef<Path>>(snapshot_path: P) -> Self {
        Self {
            snapshot_path: snapshot_path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.snapshot_path
    }

    /// Write to a sibling temp file, sync, then rename over the target.
    pub fn save(&self, snapshot: &StoreSnapshot) -> Result<()> {
        if let Some(parent) = self.snapshot_path.parent() {
            fs::create_dir_all(parent).map_err(io_error("Failed to create snapshot directory"))?;
        }
        let temp_path = self.snapshot_path.with_extension("tmp");
        let temp_file = File::create(&temp_path).map_err(io_error("Failed to create temp file"))?;
        let mut writer = BufWriter::new(temp_file);
        let serialized = rmp_serde::to_vec(snapshot).map_err(|e| {
            EpgError::Serialization(format!("Failed to serialize snapshot: {}", e))
        })?;
        writer.write_all(&serialized).map_err(io_error("Failed to write snapshot"))?;
        writer.flush().map_err(io_error("Failed to flush snapshot"))?;
        writer.get_mut().sync_all().map_err(io_error("Failed to sync snapshot"))?;
        fs::rename(&temp_path, &self.snapshot_path).map_err(io_error("Failed to rename snapshot"))?;
        Ok(())
    }

    pub fn load(&self) -> Result<Option<StoreSnapshot>> {
        if !self.snapshot_path.exists() {
            return Ok(None);
        }
        let mut file =
            File::open(&self.snapshot_path).map_err(io_error("Failed to open snapshot"))?;
        let mut data = Vec::new();
        file.read_to_end(&mut data).map_err(io_error("Failed to read snapshot"))?;
        let snapshot: StoreSnapshot = rmp_serde::from_slice(&data).map_err(|e| {
            EpgError::Serialization(format!("Failed to deserialize snapshot: {}", e))
        })?;
        if snapshot.version != SNAPSHOT_FORMAT_VERSION {
            return Err(EpgError::Serialization(format!(
                "Unsupported snapshot version {} (expected {})",
                snapshot.version, SNAPSHOT_FORMAT_VERSION
            )));
        }
        Ok(Some(snapshot))
    }

    pub fn exists(&self) -> bool {
        self.snapshot_path.exists()
    }

    pub fn delete(&self) -> Result<()> {
        if self.snapshot_path.exists() {
            fs::remove_file(&self.snapshot_path).map_err(io_error("Failed to delete snapshot"))?;
        }
        Ok(())
    }
}
