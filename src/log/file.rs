//! Log backend writing one JSON file per entry.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use super::{Collection, LogEntry, ReplayLog};
use crate::error::Result;

/// Tie-breaker for entries written within the same nanosecond.
static SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Stores entries at `{base}/{collection}/{session}/{nanos}_{seq}.json`.
/// File names sort in write order.
#[derive(Debug, Clone)]
pub struct LocalFileLog {
    base: PathBuf,
}

impl LocalFileLog {
    pub fn new(base: impl Into<PathBuf>) -> Result<Self> {
        let base = base.into();
        std::fs::create_dir_all(&base)?;
        Ok(Self { base })
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    fn folder(&self, collection: Collection, session: &str) -> PathBuf {
        self.base.join(collection.to_string()).join(session)
    }
}

impl ReplayLog for LocalFileLog {
    fn write(&self, collection: Collection, session: &str, entry: &LogEntry) -> Result<()> {
        let folder = self.folder(collection, session);
        std::fs::create_dir_all(&folder)?;
        let nanos = entry.timestamp.timestamp_nanos_opt().unwrap_or_default();
        let seq = SEQUENCE.fetch_add(1, Ordering::Relaxed);
        let file = folder.join(format!("{nanos:020}_{seq:08}.json"));
        std::fs::write(file, serde_json::to_vec_pretty(entry)?)?;
        Ok(())
    }

    fn read(&self, collection: Collection, session: &str) -> Result<Vec<LogEntry>> {
        let folder = self.folder(collection, session);
        if !folder.exists() {
            return Ok(Vec::new());
        }
        let mut files: Vec<PathBuf> = std::fs::read_dir(&folder)?
            .filter_map(|e| e.ok().map(|e| e.path()))
            .filter(|p| p.is_file() && p.extension().is_some_and(|ext| ext == "json"))
            .collect();
        files.sort();
        files
            .iter()
            .map(|f| Ok(serde_json::from_slice(&std::fs::read(f)?)?))
            .collect()
    }

    fn delete_session(&self, collection: Collection, session: &str) -> Result<()> {
        let folder = self.folder(collection, session);
        if folder.exists() {
            std::fs::remove_dir_all(folder)?;
        }
        Ok(())
    }

    fn delete_collection(&self, collection: Collection) -> Result<()> {
        let folder = self.base.join(collection.to_string());
        if folder.exists() {
            std::fs::remove_dir_all(folder)?;
        }
        Ok(())
    }
}
