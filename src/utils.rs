//! Filesystem helpers: free space probing and the pre-join space check

use crate::config::DiskSpaceConfig;
use crate::error::{Error, Result};
use std::path::Path;

/// Free space, in bytes, available to unprivileged writers on the filesystem holding `path`
///
/// - Unix: `statvfs` (`f_bavail * f_frsize`)
/// - Windows: `GetDiskFreeSpaceExW`
pub fn get_available_space(path: &Path) -> std::io::Result<u64> {
    #[cfg(unix)]
    {
        use std::ffi::CString;
        use std::os::unix::ffi::OsStrExt;

        let c_path = CString::new(path.as_os_str().as_bytes())
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;

        // SAFETY: c_path is a valid NUL-terminated string, stat is zero-initialized
        // and only read after statvfs reported success.
        unsafe {
            let mut stat: libc::statvfs = std::mem::zeroed();
            if libc::statvfs(c_path.as_ptr(), &mut stat) != 0 {
                return Err(std::io::Error::last_os_error());
            }
            #[allow(clippy::unnecessary_cast)]
            Ok((stat.f_bavail as u64).saturating_mul(stat.f_frsize as u64))
        }
    }

    #[cfg(windows)]
    {
        use std::os::windows::ffi::OsStrExt;
        use winapi::um::fileapi::GetDiskFreeSpaceExW;

        let wide: Vec<u16> = path
            .as_os_str()
            .encode_wide()
            .chain(std::iter::once(0))
            .collect();

        // SAFETY: wide is NUL-terminated and every out pointer refers to a live u64.
        unsafe {
            let mut available: u64 = 0;
            let mut total: u64 = 0;
            let mut total_free: u64 = 0;
            if GetDiskFreeSpaceExW(
                wide.as_ptr(),
                &mut available as *mut u64 as *mut _,
                &mut total as *mut u64 as *mut _,
                &mut total_free as *mut u64 as *mut _,
            ) == 0
            {
                return Err(std::io::Error::last_os_error());
            }
            Ok(available)
        }
    }

    #[cfg(not(any(unix, windows)))]
    {
        let _ = path;
        Err(std::io::Error::new(
            std::io::ErrorKind::Unsupported,
            "disk space checking is not supported on this platform",
        ))
    }
}

/// Make sure `dir` can take `bytes_to_write` more bytes plus the configured headroom
///
/// Does nothing when the check is disabled. When `dir` does not exist yet its
/// parent is checked instead.
pub fn ensure_disk_space(config: &DiskSpaceConfig, dir: &Path, bytes_to_write: u64) -> Result<()> {
    if !config.enabled {
        return Ok(());
    }

    let required = bytes_to_write.saturating_add(config.min_free_space);

    let checked = if dir.exists() {
        dir
    } else {
        dir.parent().ok_or_else(|| {
            Error::DiskSpaceCheckFailed(format!(
                "cannot determine parent directory of '{}'",
                dir.display()
            ))
        })?
    };

    let available = get_available_space(checked).map_err(|e| {
        Error::DiskSpaceCheckFailed(format!(
            "failed to check disk space for '{}': {}",
            checked.display(),
            e
        ))
    })?;

    if available < required {
        return Err(Error::InsufficientSpace {
            required,
            available,
        });
    }
    Ok(())
}
