//! Snapshot and restore of a service's mutable files around a run.
//!
//! Each snapshot lives in its own directory with a `manifest.json`, so a restore can be
//! performed by a later process than the one that took the snapshot.
use std::{
    fs, io,
    path::{Path, PathBuf},
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::error::SupervisorError;

const MANIFEST: &str = "manifest.json";

/// One snapshotted path.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BackupEntry {
    /// Where the file lives while the service runs.
    pub original: PathBuf,
    /// Where the copy was stored.
    pub saved: PathBuf,
    /// False when the path did not exist at backup time; restore then deletes it.
    pub existed: bool,
    pub is_dir: bool,
}

/// A complete snapshot for one service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupSet {
    pub service: String,
    pub root: PathBuf,
    pub created_at: DateTime<Utc>,
    pub entries: Vec<BackupEntry>,
}

fn slot_name(original: &Path) -> String {
    let digest = Sha256::digest(original.to_string_lossy().as_bytes());
    let prefix: String = digest
        .iter()
        .take(8)
        .map(|byte| format!("{byte:02x}"))
        .collect();
    let file_name = original
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "root".to_string());
    format!("{prefix}-{file_name}")
}

/// Copies a file, or a directory tree, creating parents as needed.
fn copy_recursive(src: &Path, dst: &Path) -> io::Result<()> {
    if src.is_dir() {
        fs::create_dir_all(dst)?;
        for entry in fs::read_dir(src)? {
            let entry = entry?;
            copy_recursive(&entry.path(), &dst.join(entry.file_name()))?;
        }
    } else {
        if let Some(parent) = dst.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::copy(src, dst)?;
    }
    Ok(())
}

fn remove_path(path: &Path) -> io::Result<()> {
    match fs::symlink_metadata(path) {
        Ok(meta) if meta.is_dir() => fs::remove_dir_all(path),
        Ok(_) => fs::remove_file(path),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err),
    }
}

impl BackupSet {
    /// Copies every path in `paths` under `root`, replacing whatever snapshot was there, and
    /// writes the manifest.
    pub fn capture(
        service: &str,
        paths: &[PathBuf],
        root: &Path,
    ) -> Result<Self, SupervisorError> {
        let backup_err = |path: &Path| {
            let path = path.to_path_buf();
            move |source| SupervisorError::BackupFailed { path, source }
        };

        remove_path(root).map_err(backup_err(root))?;
        fs::create_dir_all(root).map_err(backup_err(root))?;

        let mut entries = Vec::with_capacity(paths.len());
        for original in paths {
            let saved = root.join(slot_name(original));
            let existed = original.exists();
            let is_dir = original.is_dir();
            if existed {
                copy_recursive(original, &saved).map_err(backup_err(original))?;
                debug!("Backed up {} to {}", original.display(), saved.display());
            } else {
                debug!(
                    "{} does not exist yet; restore will remove it",
                    original.display()
                );
            }
            entries.push(BackupEntry {
                original: original.clone(),
                saved,
                existed,
                is_dir,
            });
        }

        let set = Self {
            service: service.to_string(),
            root: root.to_path_buf(),
            created_at: Utc::now(),
            entries,
        };
        set.write_manifest()?;
        info!(
            "Backed up {} path(s) for '{}' into {}",
            set.entries.len(),
            service,
            root.display()
        );
        Ok(set)
    }

    /// Loads the snapshot stored under `root`, if any.
    pub fn load(root: &Path) -> Result<Option<Self>, SupervisorError> {
        let manifest = root.join(MANIFEST);
        let content = match fs::read_to_string(&manifest) {
            Ok(content) => content,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(SupervisorError::RestoreFailed {
                    path: manifest,
                    source,
                });
            }
        };
        serde_json::from_str(&content)
            .map(Some)
            .map_err(|err| SupervisorError::RestoreFailed {
                path: manifest,
                source: io::Error::new(io::ErrorKind::InvalidData, err),
            })
    }

    fn write_manifest(&self) -> Result<(), SupervisorError> {
        let manifest = self.root.join(MANIFEST);
        let json = serde_json::to_string_pretty(self).map_err(|err| {
            SupervisorError::BackupFailed {
                path: manifest.clone(),
                source: io::Error::other(err),
            }
        })?;
        fs::write(&manifest, json).map_err(|source| SupervisorError::BackupFailed {
            path: manifest,
            source,
        })
    }

    /// Puts every entry back. All entries are attempted; the first failure is returned.
    pub fn restore(&self) -> Result<(), SupervisorError> {
        let mut first_error = None;
        for entry in &self.entries {
            if let Err(source) = Self::restore_entry(entry) {
                warn!("Failed to restore {}: {source}", entry.original.display());
                first_error.get_or_insert(SupervisorError::RestoreFailed {
                    path: entry.original.clone(),
                    source,
                });
            }
        }
        match first_error {
            Some(err) => Err(err),
            None => {
                info!(
                    "Restored {} path(s) for '{}'",
                    self.entries.len(),
                    self.service
                );
                Ok(())
            }
        }
    }

    fn restore_entry(entry: &BackupEntry) -> io::Result<()> {
        remove_path(&entry.original)?;
        if entry.existed {
            copy_recursive(&entry.saved, &entry.original)?;
            debug!("Restored {}", entry.original.display());
        } else {
            debug!("Removed {} created during the run", entry.original.display());
        }
        Ok(())
    }

    /// Deletes the snapshot directory.
    pub fn discard(&self) -> Result<(), SupervisorError> {
        remove_path(&self.root).map_err(|source| SupervisorError::RestoreFailed {
            path: self.root.clone(),
            source,
        })
    }
}
