//! Error types for the transfer engine.
//!
//! The primary error type is `EngineError`, which represents job-level errors
//! that prevent a transfer from being executed. File-level errors are recorded
//! in the FileRecord outcome and reported through the sink, not as EngineError.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::model::RunState;

/// Errors that can occur at the job level.
///
/// Configuration errors (unknown profile, bad roots, unwritable destination)
/// and lifecycle misuse are fatal for the job. The copy/move helpers in
/// `fs_ops` also return this type; the executor turns those into per-file
/// failures instead of propagating them.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Filesystem profile name not present in the registry
    #[error("Unknown filesystem profile '{name}' (known profiles: {known})")]
    UnknownProfile { name: String, known: String },

    /// Source directory does not exist
    #[error("Source directory not found: {}", .path.display())]
    SourceNotFound { path: PathBuf },

    /// Source directory is not accessible (permissions)
    #[error("Source directory access denied: {}", .path.display())]
    SourceAccessDenied {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A root path exists but is not a directory
    #[error("Not a directory: {}", .path.display())]
    NotADirectory { path: PathBuf },

    /// Destination root cannot be written to
    #[error("Destination directory is not writable: {}", .path.display())]
    DestinationNotWritable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Destination root did not exist and could not be created
    #[error("Failed to create destination directory: {}: {source}", .path.display())]
    DestinationCreationFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Destination root lies inside the source tree
    #[error("Destination {} is inside source {}", .destination.display(), .source_root.display())]
    DestinationInsideSource {
        source_root: PathBuf,
        destination: PathBuf,
    },

    /// Failed to read from source file
    #[error("Failed to read file: {}: {source}", .path.display())]
    ReadError {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Failed to write to destination file
    #[error("Failed to write file: {}: {source}", .path.display())]
    WriteError {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Move copied the file but could not delete the original
    #[error("Copied but failed to remove source: {}: {source}", .path.display())]
    SourceRemovalFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Failed to create a directory below the destination root
    #[error("Failed to create directory: {}: {source}", .path.display())]
    DirectoryCreationFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A lifecycle function was called in the wrong run state
    #[error("Job is in state {actual:?}; expected {expected:?}")]
    InvalidState { expected: RunState, actual: RunState },

    /// run_job was called before the caller confirmed the transfer
    #[error("Transfer has not been confirmed")]
    NotConfirmed,
}

impl EngineError {
    /// Extract the OS error code from this error, if available.
    pub fn raw_os_error(&self) -> Option<i32> {
        match self {
            Self::SourceAccessDenied { source, .. }
            | Self::DestinationNotWritable { source, .. }
            | Self::DestinationCreationFailed { source, .. }
            | Self::ReadError { source, .. }
            | Self::WriteError { source, .. }
            | Self::SourceRemovalFailed { source, .. }
            | Self::DirectoryCreationFailed { source, .. } => source.raw_os_error(),
            _ => None,
        }
    }

    /// True for errors the lifecycle functions return, which stop the job.
    ///
    /// The remaining variants come from the per-file copy and move helpers
    /// and end up as file failures instead.
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            Self::UnknownProfile { .. }
                | Self::SourceNotFound { .. }
                | Self::SourceAccessDenied { .. }
                | Self::NotADirectory { .. }
                | Self::DestinationNotWritable { .. }
                | Self::DestinationCreationFailed { .. }
                | Self::DestinationInsideSource { .. }
                | Self::InvalidState { .. }
                | Self::NotConfirmed
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_includes_path() {
        let err = EngineError::SourceNotFound {
            path: PathBuf::from("/nowhere"),
        };
        assert_eq!(err.to_string(), "Source directory not found: /nowhere");
        assert!(err.is_configuration_error());
    }

    #[test]
    fn test_raw_os_error() {
        let err = EngineError::WriteError {
            path: PathBuf::from("/x"),
            source: io::Error::from_raw_os_error(28),
        };
        assert_eq!(err.raw_os_error(), Some(28));
        assert!(!err.is_configuration_error());
    }

    #[test]
    fn test_configuration_errors_exclude_per_file_failures() {
        let nested = EngineError::DirectoryCreationFailed {
            path: PathBuf::from("/dst/sub"),
            source: io::Error::from(io::ErrorKind::PermissionDenied),
        };
        assert!(!nested.is_configuration_error());

        let root = EngineError::DestinationCreationFailed {
            path: PathBuf::from("/dst"),
            source: io::Error::from(io::ErrorKind::PermissionDenied),
        };
        assert!(root.is_configuration_error());

        let state = EngineError::InvalidState {
            expected: RunState::NotStarted,
            actual: RunState::Completed,
        };
        assert!(state.is_configuration_error());
        assert!(EngineError::NotConfirmed.is_configuration_error());
    }
}
