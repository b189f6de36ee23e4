//! Source snapshots - read each page object once per run
//!
//! The first read of a file is cached, including a failed read. Later
//! lookups return the cached outcome, so every manifest entry carries the
//! state of the file before any patch in this run.

use crate::error::Result;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

/// Hex SHA-256 of a file body
pub fn content_digest(content: &str) -> String {
    format!("{:x}", Sha256::digest(content.as_bytes()))
}

/// Outcome of the one disk read of a file. A miss keeps the error kind and
/// message so it can be reported again without touching the disk.
#[derive(Debug, Clone)]
enum Snapshot {
    Read(String),
    Failed(io::ErrorKind, String),
}

/// Thread-safe read-once cache of source files
#[derive(Debug, Clone, Default)]
pub struct SourceSnapshots {
    entries: Arc<RwLock<HashMap<PathBuf, Snapshot>>>,
    disk_reads: Arc<AtomicUsize>,
}

impl SourceSnapshots {
    pub fn new() -> Self {
        Self::default()
    }

    /// Content of `path`, read from disk only on first request.
    pub async fn read(&self, path: &Path) -> Result<String> {
        let snapshot = match self.get(path) {
            Some(snapshot) => snapshot,
            None => {
                self.disk_reads.fetch_add(1, Ordering::SeqCst);
                let snapshot = match tokio::fs::read_to_string(path).await {
                    Ok(content) => Snapshot::Read(content),
                    Err(e) => Snapshot::Failed(e.kind(), e.to_string()),
                };
                if let Ok(mut entries) = self.entries.write() {
                    entries.insert(path.to_path_buf(), snapshot.clone());
                }
                snapshot
            }
        };

        match snapshot {
            Snapshot::Read(content) => Ok(content),
            Snapshot::Failed(kind, message) => Err(io::Error::new(kind, message).into()),
        }
    }

    fn get(&self, path: &Path) -> Option<Snapshot> {
        self.entries.read().ok()?.get(path).cloned()
    }

    /// Number of times a file was actually read from disk, failures included.
    pub fn disk_reads(&self) -> usize {
        self.disk_reads.load(Ordering::SeqCst)
    }

    /// Files read successfully.
    pub fn tracked_count(&self) -> usize {
        self.entries
            .read()
            .map(|entries| {
                entries
                    .values()
                    .filter(|s| matches!(s, Snapshot::Read(_)))
                    .count()
            })
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HealError;

    #[test]
    fn test_digest_is_stable() {
        assert_eq!(content_digest("abc"), content_digest("abc"));
        assert_ne!(content_digest("abc"), content_digest("abd"));
        assert_eq!(content_digest("").len(), 64);
    }

    #[tokio::test]
    async fn test_reads_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("LoginPage.ts");
        std::fs::write(&path, "export class LoginPage {}\n").unwrap();

        let snapshots = SourceSnapshots::new();
        let first = snapshots.read(&path).await.unwrap();

        // later edits are not observed through the cache
        std::fs::write(&path, "changed").unwrap();
        let second = snapshots.read(&path).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(snapshots.disk_reads(), 1);
        assert_eq!(snapshots.tracked_count(), 1);
    }

    #[tokio::test]
    async fn test_missing_file_is_read_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nope.ts");
        let snapshots = SourceSnapshots::new();

        let first = snapshots.read(&path).await.unwrap_err();
        // appearing later does not change the outcome for this run
        std::fs::write(&path, "export class Nope {}\n").unwrap();
        let second = snapshots.read(&path).await.unwrap_err();

        for err in [first, second] {
            match err {
                HealError::Io(e) => assert_eq!(e.kind(), io::ErrorKind::NotFound),
                other => panic!("unexpected error: {other}"),
            }
        }
        assert_eq!(snapshots.disk_reads(), 1);
        assert_eq!(snapshots.tracked_count(), 0);
    }
}
