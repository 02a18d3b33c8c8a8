//! Error kinds raised by the monitoring engine.
//!
//! Only allocation failure is fatal. Everything else is contained to the
//! current monitoring window or the current clip.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    /// Backing storage for a buffer could not be reserved.
    #[error("failed to reserve {samples} samples for the {what}")]
    AllocationFailure { what: &'static str, samples: usize },

    /// The audio hardware could not be brought up for this window.
    #[error("audio hardware acquisition failed: {0}")]
    HardwareAcquisition(String),

    /// The storage collaborator is not mounted or not writable.
    #[error("storage is not ready")]
    StorageNotReady,

    /// The sample source reported that its wait budget ran out.
    #[error("sample source timed out")]
    ReadTimeout,

    /// The sample source reported a device error.
    #[error("sample source read failed: {0}")]
    Read(String),

    #[error("i/o failure on '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Caller misuse, reported immediately.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl EngineError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        EngineError::Io {
            path: path.into(),
            source,
        }
    }

    /// True when the engine must decline to start.
    pub fn is_fatal(&self) -> bool {
        matches!(self, EngineError::AllocationFailure { .. })
    }

    /// Stable tag for events and structured logs.
    pub fn label(&self) -> &'static str {
        match self {
            EngineError::AllocationFailure { .. } => "allocation_failure",
            EngineError::HardwareAcquisition(_) => "hardware_acquisition_failure",
            EngineError::StorageNotReady => "storage_not_ready",
            EngineError::ReadTimeout => "read_timeout",
            EngineError::Read(_) => "read_error",
            EngineError::Io { .. } => "io_failure",
            EngineError::InvalidArgument(_) => "invalid_argument",
        }
    }
}
