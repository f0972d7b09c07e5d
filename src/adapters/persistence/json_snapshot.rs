//! Implements SnapshotPort using a JSON file.
//!
//! Holds the full broadcast set; rewritten after every store mutation.

use crate::domain::{Broadcast, DomainError};
use crate::ports::SnapshotPort;
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

/// On-disk layout. Versioned so the format can evolve.
#[derive(Debug, Default, Serialize, Deserialize)]
struct SnapshotData {
    version: u32,
    broadcasts: Vec<Broadcast>,
}

const SNAPSHOT_VERSION: u32 = 1;

/// JSON file-based broadcast snapshot.
pub struct JsonSnapshot {
    path: PathBuf,
}

impl JsonSnapshot {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

#[async_trait::async_trait]
impl SnapshotPort for JsonSnapshot {
    async fn load(&self) -> Result<Vec<Broadcast>, DomainError> {
        let raw = match fs::read_to_string(&self.path).await {
            Ok(s) => s,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(DomainError::Snapshot(format!("read snapshot: {}", e))),
        };
        let data: SnapshotData = serde_json::from_str(&raw)
            .map_err(|e| DomainError::Snapshot(format!("parse {}: {}", self.path.display(), e)))?;
        Ok(data.broadcasts)
    }

    /// Atomic save using write-replace: temp file, sync_all, rename over the target.
    async fn save(&self, broadcasts: &[Broadcast]) -> Result<(), DomainError> {
        let data = SnapshotData {
            version: SNAPSHOT_VERSION,
            broadcasts: broadcasts.to_vec(),
        };
        let json = serde_json::to_string_pretty(&data)
            .map_err(|e| DomainError::Snapshot(e.to_string()))?;

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| DomainError::Snapshot(format!("create snapshot dir: {}", e)))?;
        }

        let temp_path = self.path.with_extension("json.tmp");
        let mut f = fs::File::create(&temp_path)
            .await
            .map_err(|e| DomainError::Snapshot(format!("create temp file: {}", e)))?;
        f.write_all(json.as_bytes())
            .await
            .map_err(|e| DomainError::Snapshot(format!("write temp file: {}", e)))?;
        f.sync_all()
            .await
            .map_err(|e| DomainError::Snapshot(format!("sync temp file: {}", e)))?;
        drop(f);

        fs::rename(&temp_path, &self.path)
            .await
            .map_err(|e| DomainError::Snapshot(format!("atomic rename failed: {}", e)))?;
        Ok(())
    }
}
