//! macOS platform implementation
//!
//! Optical drives are controlled with `drutil`, which acts on the first
//! optical drive.

use crate::{run_tool, PlatformOps, Result};

/// macOS platform implementation
pub struct MacOSPlatform;

impl PlatformOps for MacOSPlatform {
    fn has_elevated_privileges() -> bool {
        #[allow(unsafe_code)]
        unsafe {
            libc::geteuid() == 0
        }
    }

    fn unlock_tray(_path: &str) -> Result<()> {
        // drutil has no separate unlock; ejecting releases the lock.
        Ok(())
    }

    fn eject(_path: &str) -> Result<()> {
        run_tool("drutil", &["tray", "eject"])
    }
}

// ============================================================================
// UNIT TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unlock_is_noop() {
        assert!(MacOSPlatform::unlock_tray("/dev/disk3").is_ok());
    }
}
