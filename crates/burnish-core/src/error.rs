//! Error types for the Burnish core library

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for Burnish operations
#[derive(Error, Debug)]
pub enum Error {
    /// The backend process could not be spawned
    #[error("Could not start {program}: {source}")]
    Launch {
        /// Program that failed to start
        program: PathBuf,
        /// The underlying error
        source: std::io::Error,
    },

    /// The backend's input channel is closed
    #[error("Backend input channel closed: {0}")]
    Pipe(std::io::Error),

    /// IO error while supervising the backend
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Device collaborator reported a failure
    #[error("Device error: {0}")]
    Device(String),
}

/// Result type alias using the Burnish error type
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::Device("tray locked".to_string());
        assert_eq!(err.to_string(), "Device error: tray locked");

        let err = Error::Launch {
            program: PathBuf::from("/usr/bin/cdrecord"),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };
        assert!(err.to_string().contains("/usr/bin/cdrecord"));
        assert!(err.to_string().contains("denied"));
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "test");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_pipe_error() {
        let err = Error::Pipe(std::io::Error::new(
            std::io::ErrorKind::BrokenPipe,
            "closed",
        ));
        assert!(err.to_string().contains("input channel closed"));
    }
}
