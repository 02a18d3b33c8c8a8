//! Where clip files go.

use crate::error::EngineError;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

/// Persistent storage as seen by the engine.
pub trait Storage {
    /// Whether recording may proceed at all.
    fn is_ready(&self) -> bool;

    /// A path under `subdir` that no earlier clip has used.
    fn make_unique_path(
        &mut self,
        subdir: &str,
        prefix: &str,
        extension: &str,
    ) -> Result<PathBuf, EngineError>;
}

/// Files under a mounted directory, named `<prefix>_<millis>.<ext>`.
///
/// The stamp never repeats within one process: if the clock has not moved
/// since the last name, or a file already holds the name, it is bumped.
#[derive(Debug, Clone)]
pub struct DirStorage {
    root: PathBuf,
    last_stamp: u64,
}

impl DirStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            last_stamp: 0,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn next_stamp(&mut self) -> u64 {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX))
            .unwrap_or_default();
        self.last_stamp = now.max(self.last_stamp.saturating_add(1));
        self.last_stamp
    }
}

fn check_component(value: &str, label: &str) -> Result<(), EngineError> {
    if value.is_empty()
        || value == "."
        || value == ".."
        || value.contains(['/', '\\'])
        || value.chars().any(char::is_control)
    {
        return Err(EngineError::InvalidArgument(format!(
            "{label} '{value}' is not a plain file name component"
        )));
    }
    Ok(())
}

impl Storage for DirStorage {
    fn is_ready(&self) -> bool {
        self.root.is_dir()
    }

    fn make_unique_path(
        &mut self,
        subdir: &str,
        prefix: &str,
        extension: &str,
    ) -> Result<PathBuf, EngineError> {
        check_component(subdir, "subdirectory")?;
        check_component(prefix, "prefix")?;
        check_component(extension, "extension")?;
        if !self.is_ready() {
            return Err(EngineError::StorageNotReady);
        }
        let dir = self.root.join(subdir);
        fs::create_dir_all(&dir).map_err(|err| EngineError::io(&dir, err))?;
        loop {
            let stamp = self.next_stamp();
            let candidate = dir.join(format!("{prefix}_{stamp}.{extension}"));
            if !candidate.exists() {
                return Ok(candidate);
            }
        }
    }
}
