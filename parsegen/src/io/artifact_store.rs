//! Storage for generated programs, one slot per target.
//!
//! Each save overwrites the previous program for the same target; only the
//! latest attempt is kept on disk.

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::debug;

use crate::io::write_atomic;

/// A stored program as read back from disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub target: String,
    pub path: PathBuf,
    pub source: String,
}

/// Deterministic `<dir>/<target>_parser.<ext>` store.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    dir: PathBuf,
    extension: String,
}

impl ArtifactStore {
    pub fn new(dir: impl Into<PathBuf>, extension: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            extension: extension.into(),
        }
    }

    /// Location of the program for `target`.
    pub fn path_for(&self, target: &str) -> PathBuf {
        self.dir
            .join(format!("{target}_parser.{}", self.extension))
    }

    /// Write `source` for `target`, replacing any previous program.
    pub fn save(&self, target: &str, source: &str) -> Result<PathBuf> {
        let path = self.path_for(target);
        debug!(target_id = target, path = %path.display(), bytes = source.len(), "saving artifact");
        write_atomic(&path, source).with_context(|| format!("save artifact for {target}"))?;
        Ok(path)
    }

    /// Read the current program for `target` from disk.
    pub fn load(&self, target: &str) -> Result<Artifact> {
        let path = self.path_for(target);
        let source = fs::read_to_string(&path)
            .with_context(|| format!("read artifact {}", path.display()))?;
        debug!(target_id = target, path = %path.display(), bytes = source.len(), "loaded artifact");
        Ok(Artifact {
            target: target.to_string(),
            path,
            source,
        })
    }
}
