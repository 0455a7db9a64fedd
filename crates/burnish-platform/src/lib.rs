//! # Burnish Platform
//!
//! Platform-specific adapters for optical drive handling and system checks.
//!
//! The burning backends talk to the drive themselves. This crate only covers
//! what happens around a run: checking whether the process runs with elevated
//! privileges, unlocking a tray a backend left locked, and ejecting the
//! medium when a run is canceled or finished.

#![warn(missing_docs)]
#![warn(clippy::all)]

use std::process::Command;
use thiserror::Error;

/// Platform-specific errors
#[derive(Error, Debug)]
pub enum PlatformError {
    /// IO operation failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Device access denied (need elevated privileges)
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Device not found
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    /// Operation not supported on this platform
    #[error("Not supported: {0}")]
    NotSupported(String),

    /// Command execution failed
    #[error("Command failed: {0}")]
    CommandFailed(String),
}

/// Result type for platform operations
pub type Result<T> = std::result::Result<T, PlatformError>;

/// Platform-specific operations
pub trait PlatformOps {
    /// Check if running with elevated privileges
    fn has_elevated_privileges() -> bool;

    /// Release a tray lock left behind by a backend
    fn unlock_tray(path: &str) -> Result<()>;

    /// Eject the medium
    fn eject(path: &str) -> Result<()>;

    /// Unlock the tray, then eject.
    ///
    /// A failed unlock is logged and does not prevent the eject attempt.
    fn unlock_and_eject(path: &str) -> Result<()> {
        if let Err(e) = Self::unlock_tray(path) {
            tracing::debug!("Unlocking {} failed: {}", path, e);
        }
        Self::eject(path)
    }
}

/// Check whether a drive identifier is a SCSI bus address such as `0,0,0`
/// or `ATA:1,0,0`.
pub fn is_scsi_address(id: &str) -> bool {
    let address = match id.split_once(':') {
        Some((transport, rest)) => {
            if transport.is_empty() || !transport.chars().all(|c| c.is_ascii_alphanumeric()) {
                return false;
            }
            rest
        }
        None => id,
    };

    let fields: Vec<&str> = address.split(',').collect();
    (2..=3).contains(&fields.len())
        && fields
            .iter()
            .all(|f| !f.is_empty() && f.chars().all(|c| c.is_ascii_digit()))
}

/// Normalize a user supplied drive identifier.
///
/// Bus addresses and absolute paths are kept. On Unix a bare node name like
/// `sr0` becomes `/dev/sr0`.
pub fn normalize_device_path(id: &str) -> String {
    let id = id.trim();
    if id.is_empty() || is_scsi_address(id) || id.starts_with('/') || id.contains(':') {
        return id.to_string();
    }

    if cfg!(unix) {
        format!("/dev/{}", id)
    } else {
        id.to_string()
    }
}

/// Run a helper tool and map failures onto platform errors
#[allow(dead_code)]
pub(crate) fn run_tool(program: &str, args: &[&str]) -> Result<()> {
    tracing::debug!("Running {} {}", program, args.join(" "));

    let output = Command::new(program).args(args).output().map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            PlatformError::NotSupported(format!("{} is not installed", program))
        } else {
            PlatformError::CommandFailed(format!("Failed to run {}: {}", program, e))
        }
    })?;

    if output.status.success() {
        return Ok(());
    }

    let stderr = String::from_utf8_lossy(&output.stderr);
    let stderr = stderr.trim();
    if stderr.contains("ermission denied") || stderr.contains("Operation not permitted") {
        return Err(PlatformError::PermissionDenied(stderr.to_string()));
    }

    Err(PlatformError::CommandFailed(format!(
        "{} exited with code {:?}: {}",
        program,
        output.status.code(),
        stderr
    )))
}

// Platform-specific implementations
cfg_if::cfg_if! {
    if #[cfg(target_os = "linux")] {
        mod linux;
        pub use linux::LinuxPlatform as Platform;
    } else if #[cfg(target_os = "macos")] {
        mod macos;
        pub use macos::MacOSPlatform as Platform;
    } else if #[cfg(target_os = "windows")] {
        mod windows;
        pub use windows::WindowsPlatform as Platform;
    }
}

// Convenience functions that use the current platform
cfg_if::cfg_if! {
    if #[cfg(any(target_os = "linux", target_os = "macos", target_os = "windows"))] {
        /// Check if running with elevated privileges
        pub fn has_elevated_privileges() -> bool {
            Platform::has_elevated_privileges()
        }

        /// Release a tray lock using platform defaults
        pub fn unlock_tray(path: &str) -> Result<()> {
            Platform::unlock_tray(path)
        }

        /// Eject the medium using platform defaults
        pub fn eject(path: &str) -> Result<()> {
            Platform::eject(path)
        }

        /// Unlock the tray and eject the medium
        pub fn unlock_and_eject(path: &str) -> Result<()> {
            Platform::unlock_and_eject(path)
        }
    } else {
        /// Check if running with elevated privileges
        pub fn has_elevated_privileges() -> bool {
            false
        }

        /// Release a tray lock (not supported on this platform)
        pub fn unlock_tray(_path: &str) -> Result<()> {
            Err(PlatformError::NotSupported("Platform not supported".to_string()))
        }

        /// Eject the medium (not supported on this platform)
        pub fn eject(_path: &str) -> Result<()> {
            Err(PlatformError::NotSupported("Platform not supported".to_string()))
        }

        /// Unlock the tray and eject the medium (not supported on this platform)
        pub fn unlock_and_eject(_path: &str) -> Result<()> {
            Err(PlatformError::NotSupported("Platform not supported".to_string()))
        }
    }
}

// ============================================================================
// UNIT TESTS
// ============================================================================
