//! Linux platform implementation
//!
//! Tray handling goes through the util-linux `eject` tool, which issues the
//! CDROM ioctls for us.

use crate::{is_scsi_address, run_tool, PlatformError, PlatformOps, Result};
use std::path::Path;

/// Linux platform implementation
pub struct LinuxPlatform;

impl PlatformOps for LinuxPlatform {
    fn has_elevated_privileges() -> bool {
        #[allow(unsafe_code)]
        unsafe {
            libc::geteuid() == 0
        }
    }

    fn unlock_tray(path: &str) -> Result<()> {
        let node = device_node(path)?;
        run_tool("eject", &["-i", "off", node])
    }

    fn eject(path: &str) -> Result<()> {
        let node = device_node(path)?;
        run_tool("eject", &[node])
    }
}

/// Resolve the device node the `eject` tool can operate on
fn device_node(path: &str) -> Result<&str> {
    if is_scsi_address(path) {
        return Err(PlatformError::NotSupported(format!(
            "Cannot control the tray of bus address {}",
            path
        )));
    }

    if !Path::new(path).exists() {
        return Err(PlatformError::DeviceNotFound(path.to_string()));
    }

    Ok(path)
}

// ============================================================================
// UNIT TESTS
// ============================================================================
