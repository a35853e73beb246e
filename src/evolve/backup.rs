//! Snapshot store and rollback.
//!
//! Before any modification is written, every candidate file is copied
//! whole into a snapshot directory keyed by a monotonic id. Snapshots are
//! immutable once written; rollback reads them back only on explicit,
//! confirmed request.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::error::EvolveError;

const MANIFEST_FILE: &str = "manifest.json";

/// One immutable backup of a set of files.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    /// Time-ordered id; ids sort lexicographically.
    pub id: String,
    pub created_at: chrono::DateTime<Utc>,
    /// Original path -> backup copy path.
    pub files: HashMap<PathBuf, PathBuf>,
}

/// Request for one rollback.
#[derive(Debug, Clone, Default)]
pub struct RollbackRequest {
    /// Snapshot to restore; latest when absent.
    pub snapshot_id: Option<String>,
    /// Restore only these original paths when given.
    pub file_paths: Option<Vec<PathBuf>>,
    /// Destructive operations refuse to run without this.
    pub confirm: bool,
}

/// One file that failed to restore.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestoreFailure {
    pub path: PathBuf,
    pub error: String,
}

/// Structured result of `rollback_modifications`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RollbackReport {
    pub success: bool,
    pub snapshot_id: Option<String>,
    pub restored_count: usize,
    pub restored: Vec<PathBuf>,
    pub failures: Vec<RestoreFailure>,
    pub error: Option<String>,
}

/// Whole-file snapshot store under one backup root.
pub struct SnapshotStore {
    root: PathBuf,
    // Distinguishes snapshots taken within the same millisecond.
    sequence: AtomicU64,
}

impl SnapshotStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            sequence: AtomicU64::new(0),
        }
    }

    /// Allocate the next snapshot id. Wall-clock prefix keeps ids ordered
    /// across processes; the sequence suffix keeps them ordered within
    /// one.
    fn next_id(&self) -> String {
        let stamp = Utc::now().format("%Y%m%d%H%M%S%3f");
        let seq = self.sequence.fetch_add(1, Ordering::SeqCst);
        format!("{stamp}-{seq:04}")
    }

    /// Copy `files` into a fresh snapshot directory.
    ///
    /// Fails without partial state on disk being reused: the id is never
    /// handed out twice, and an existing directory for it is an error.
    pub fn create_snapshot(&self, files: &[PathBuf]) -> Result<Snapshot, EvolveError> {
        let id = self.next_id();
        let dir = self.root.join(&id);
        if dir.exists() {
            return Err(EvolveError::SnapshotFailed(format!(
                "snapshot directory {id} already exists"
            )));
        }
        std::fs::create_dir_all(&dir)?;

        let mut copies = HashMap::new();
        for original in files {
            let relative = mirror_path(original);
            let backup = dir.join(&relative);
            if let Some(parent) = backup.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::copy(original, &backup).map_err(|e| {
                EvolveError::SnapshotFailed(format!(
                    "copying {} failed: {e}",
                    original.display()
                ))
            })?;
            copies.insert(original.clone(), backup);
        }

        let snapshot = Snapshot {
            id: id.clone(),
            created_at: Utc::now(),
            files: copies,
        };

        let manifest = serde_json::to_string_pretty(&snapshot)
            .map_err(|e| EvolveError::SnapshotFailed(e.to_string()))?;
        std::fs::write(dir.join(MANIFEST_FILE), manifest)?;

        tracing::info!(snapshot = %id, files = snapshot.files.len(), "snapshot created");
        Ok(snapshot)
    }

    /// All snapshot ids, oldest first.
    pub fn list_ids(&self) -> Result<Vec<String>, EvolveError> {
        let mut ids = Vec::new();
        let entries = match std::fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(ids),
            Err(e) => return Err(EvolveError::Io(e)),
        };

        for entry in entries.flatten() {
            if entry.path().join(MANIFEST_FILE).is_file() {
                ids.push(entry.file_name().to_string_lossy().to_string());
            }
        }
        ids.sort();
        Ok(ids)
    }

    /// Load one snapshot's manifest.
    pub fn load(&self, id: &str) -> Result<Snapshot, EvolveError> {
        let manifest = self.root.join(id).join(MANIFEST_FILE);
        let raw = std::fs::read_to_string(&manifest).map_err(|_| EvolveError::SnapshotNotFound {
            id: id.to_string(),
        })?;
        serde_json::from_str(&raw).map_err(|e| {
            EvolveError::SnapshotFailed(format!("manifest for {id} corrupt: {e}"))
        })
    }

    /// Restore files from a snapshot.
    pub fn rollback_modifications(&self, req: &RollbackRequest) -> RollbackReport {
        match self.rollback_inner(req) {
            Ok(report) => report,
            Err(err) => RollbackReport {
                success: false,
                snapshot_id: req.snapshot_id.clone(),
                restored_count: 0,
                restored: Vec::new(),
                failures: Vec::new(),
                error: Some(err.to_string()),
            },
        }
    }

    fn rollback_inner(&self, req: &RollbackRequest) -> Result<RollbackReport, EvolveError> {
        // The confirm gate comes first: without it nothing is resolved,
        // read, or touched.
        if !req.confirm {
            return Err(EvolveError::ConfirmationRequired);
        }

        let id = match &req.snapshot_id {
            Some(id) => id.clone(),
            None => self
                .list_ids()?
                .pop()
                .ok_or(EvolveError::NoBackupsFound)?,
        };
        let snapshot = self.load(&id)?;

        let mut restored = Vec::new();
        let mut failures = Vec::new();

        for (original, backup) in &snapshot.files {
            if let Some(only) = &req.file_paths
                && !only.iter().any(|p| p == original)
            {
                continue;
            }

            let result = original
                .parent()
                .map(std::fs::create_dir_all)
                .transpose()
                .and_then(|_| std::fs::copy(backup, original));

            match result {
                Ok(_) => restored.push(original.clone()),
                Err(e) => {
                    tracing::warn!(file = %original.display(), error = %e, "restore failed");
                    failures.push(RestoreFailure {
                        path: original.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }

        restored.sort();
        tracing::info!(snapshot = %id, restored = restored.len(), "rollback complete");
        Ok(RollbackReport {
            success: true,
            snapshot_id: Some(id),
            restored_count: restored.len(),
            restored,
            failures,
            error: None,
        })
    }
}

/// Where a file lands inside the snapshot directory: its path with the
/// root component stripped, mirroring the original layout.
fn mirror_path(original: &Path) -> PathBuf {
    let mut relative = PathBuf::new();
    for component in original.components() {
        if let std::path::Component::Normal(part) = component {
            relative.push(part);
        }
    }
    relative
}
