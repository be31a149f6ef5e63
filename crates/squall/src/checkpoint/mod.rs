//! Checkpoint persistence for resumable extraction.
//!
//! The checkpoint is a single text file per job identity holding the
//! decimal epoch-second start of the last fully processed window.
//!
//! # Atomic Writes
//!
//! Checkpoint updates use atomic write pattern:
//! 1. Write to temp file: `{job}.checkpoint.tmp`
//! 2. Rename to final path: `{job}.checkpoint`
//!
//! This ensures a subsequent load never observes a torn write.

use std::path::{Path, PathBuf};

use snafu::ResultExt;
use tracing::{debug, info, warn};

use crate::error::{CheckpointError, CreateDirSnafu, SwapSnafu, WriteTempSnafu};

/// Persists and restores the last completed window start for one job.
///
/// A disabled store (used for bounded replays with explicit start and end
/// bounds) turns `save` into a no-op so a backfill never perturbs the
/// resumable checkpoint of the unbounded tailing job.
pub struct CheckpointStore {
    path: Option<PathBuf>,
}

impl CheckpointStore {
    /// Create a store writing to `{dir}/{job}.checkpoint`.
    pub fn new(dir: &Path, job: &str) -> Self {
        Self {
            path: Some(dir.join(format!("{job}.checkpoint"))),
        }
    }

    /// Create a disabled store whose `save` is a no-op.
    pub fn disabled() -> Self {
        Self { path: None }
    }

    /// Whether this store persists anything.
    pub fn is_enabled(&self) -> bool {
        self.path.is_some()
    }

    /// Load the persisted window start, `None` when no usable checkpoint
    /// exists.
    ///
    /// A missing file means a cold start; an unparseable file is treated
    /// the same way with a warning (resumption degrades, extraction never
    /// aborts).
    pub async fn load(&self) -> Option<i64> {
        let path = self.path.as_ref()?;

        let contents = match tokio::fs::read_to_string(path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "No checkpoint found, starting fresh");
                return None;
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to read checkpoint, starting fresh");
                return None;
            }
        };

        match contents.trim().parse::<i64>() {
            Ok(last_start) => {
                info!(path = %path.display(), last_start, "Loaded checkpoint");
                Some(last_start)
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Unparseable checkpoint, starting fresh");
                None
            }
        }
    }

    /// Save the given window start using atomic write.
    ///
    /// Uses temp file + rename so a concurrent load never sees a torn
    /// write. Callers log and swallow the error: losing a checkpoint
    /// write degrades resumption granularity but must never abort
    /// extraction.
    pub async fn save(&self, last_start: i64) -> Result<(), CheckpointError> {
        let Some(path) = self.path.as_ref() else {
            return Ok(());
        };

        if let Some(dir) = path.parent() {
            tokio::fs::create_dir_all(dir).await.context(CreateDirSnafu)?;
        }

        let tmp = path.with_extension("checkpoint.tmp");
        tokio::fs::write(&tmp, format!("{last_start}\n"))
            .await
            .context(WriteTempSnafu)?;
        tokio::fs::rename(&tmp, path).await.context(SwapSnafu)?;

        debug!(path = %path.display(), last_start, "Saved checkpoint");
        Ok(())
    }
}
