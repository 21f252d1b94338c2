//! Incident files for unrecoverable call failures.

use std::path::{Path, PathBuf};

use chrono::Utc;
use serde_json::json;

use crate::dialog::short_hex;
use crate::error::{ParleyError, Result};

/// Writes `{dir}/{agent}/{timestamp}_{incident}.json`.
#[derive(Debug, Clone)]
pub struct DiagnosticSink {
    dir: PathBuf,
}

impl DiagnosticSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Record `error` for `agent`, returning the file written.
    pub fn record(&self, agent: &str, error: &ParleyError) -> Result<PathBuf> {
        let now = Utc::now();
        let folder = self.dir.join(agent);
        std::fs::create_dir_all(&folder)?;
        let file = folder.join(format!("{}_{}.json", now.format("%Y%m%d_%H%M%S%3f"), short_hex()));
        let body = json!({
            "timestamp": now.to_rfc3339(),
            "error_message": error.to_string(),
        });
        std::fs::write(&file, serde_json::to_vec_pretty(&body)?)?;
        Ok(file)
    }
}
