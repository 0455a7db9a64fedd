//! Windows platform implementation
//!
//! The cdrecord ports for Windows manage the tray on their own, so only the
//! privilege check is implemented natively.

use crate::{PlatformError, PlatformOps, Result};

/// Windows platform implementation
pub struct WindowsPlatform;

impl PlatformOps for WindowsPlatform {
    fn has_elevated_privileges() -> bool {
        is_elevated()
    }

    fn unlock_tray(path: &str) -> Result<()> {
        Err(PlatformError::NotSupported(format!(
            "Tray control for {} is not available on Windows",
            path
        )))
    }

    fn eject(path: &str) -> Result<()> {
        Err(PlatformError::NotSupported(format!(
            "Tray control for {} is not available on Windows",
            path
        )))
    }
}

/// Check if running with administrator privileges
#[allow(unsafe_code)]
fn is_elevated() -> bool {
    use windows_sys::Win32::Foundation::{CloseHandle, HANDLE};
    use windows_sys::Win32::Security::{
        GetTokenInformation, TokenElevation, TOKEN_ELEVATION, TOKEN_QUERY,
    };
    use windows_sys::Win32::System::Threading::{GetCurrentProcess, OpenProcessToken};

    unsafe {
        let mut token: HANDLE = 0;
        if OpenProcessToken(GetCurrentProcess(), TOKEN_QUERY, &mut token) == 0 {
            return false;
        }

        let mut elevation: TOKEN_ELEVATION = std::mem::zeroed();
        let mut size: u32 = 0;

        let result = GetTokenInformation(
            token,
            TokenElevation,
            &mut elevation as *mut _ as *mut _,
            std::mem::size_of::<TOKEN_ELEVATION>() as u32,
            &mut size,
        );

        CloseHandle(token);

        result != 0 && elevation.TokenIsElevated != 0
    }
}

// ============================================================================
// UNIT TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_eject_not_supported() {
        let result = WindowsPlatform::eject("D:");
        assert!(matches!(result, Err(PlatformError::NotSupported(_))));
    }
}
