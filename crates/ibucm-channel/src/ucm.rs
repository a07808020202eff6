use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::os::fd::{AsRawFd, RawFd};
use std::path::{Path, PathBuf};
use std::time::Duration;

use ibucm_wire::Command;
use tracing::{debug, info, warn};

use crate::config::DeviceConfig;
use crate::error::{ChannelError, Result};
use crate::traits::Device;

/// The kernel connection manager device, opened read/write.
///
/// All commands and notifications of the process flow through this one
/// descriptor.
pub struct UcmDevice {
    path: PathBuf,
    file: Option<File>,
}

impl UcmDevice {
    /// Open the device, failing if it is missing or not accessible.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&path)
            .map_err(|e| ChannelError::Open {
                path: path.clone(),
                source: e,
            })?;
        info!(?path, "opened connection manager device");
        Ok(Self {
            path,
            file: Some(file),
        })
    }

    /// Open the device, tolerating its absence.
    ///
    /// A missing or inaccessible device is logged; the returned value then
    /// fails every command with [`ChannelError::Unavailable`].
    pub fn open_lenient(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        match Self::open(path) {
            Ok(device) => device,
            Err(e) => {
                warn!(?path, error = %e, "connection manager device unavailable");
                Self {
                    path: path.to_path_buf(),
                    file: None,
                }
            }
        }
    }

    /// Open according to `config`.
    pub fn with_config(config: &DeviceConfig) -> Result<Self> {
        if config.required {
            Self::open(&config.path)
        } else {
            Ok(Self::open_lenient(&config.path))
        }
    }

    /// Path the device was opened from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns true if the device descriptor is open.
    pub fn is_open(&self) -> bool {
        self.file.is_some()
    }

    /// Raw descriptor for integration with external poll loops.
    pub fn as_raw_fd(&self) -> Option<RawFd> {
        self.file.as_ref().map(AsRawFd::as_raw_fd)
    }

    fn file(&self) -> Result<&File> {
        self.file.as_ref().ok_or_else(|| ChannelError::Unavailable {
            path: self.path.clone(),
        })
    }
}

impl Device for UcmDevice {
    fn submit(&self, command: &mut Command) -> Result<usize> {
        let mut file = self.file()?;
        // Addresses stay valid: `command` is borrowed for the whole write.
        let wire = command.encode_with_addresses();
        let written = file.write(&wire)?;
        debug!(opcode = %command.opcode(), written, "wrote command");
        Ok(written)
    }

    fn wait_readable(&self, timeout: Option<Duration>) -> Result<bool> {
        let fd = self.file()?.as_raw_fd();
        let timeout_ms = match timeout {
            Some(t) => i32::try_from(t.as_millis()).unwrap_or(i32::MAX),
            None => -1,
        };
        let mut pfd = libc::pollfd {
            fd,
            events: libc::POLLIN,
            revents: 0,
        };

        loop {
            // SAFETY: `pfd` is a valid pollfd for an open descriptor owned by
            // `self`, and we pass exactly one entry.
            let rc = unsafe { libc::poll(&mut pfd, 1, timeout_ms) };
            if rc == 0 {
                return Ok(false);
            }
            if rc > 0 {
                return readiness(pfd.revents);
            }
            let err = io::Error::last_os_error();
            if err.kind() != io::ErrorKind::Interrupted {
                return Err(ChannelError::Io(err));
            }
        }
    }

    fn name(&self) -> &str {
        "ucm"
    }
}

/// Interpret the events reported for a descriptor that `poll` flagged.
///
/// A hangup or error without pending input is a channel fault, never
/// "nothing ready".
fn readiness(revents: libc::c_short) -> Result<bool> {
    if revents & libc::POLLIN != 0 {
        return Ok(true);
    }
    if revents & libc::POLLNVAL != 0 {
        return Err(ChannelError::Io(io::Error::from_raw_os_error(libc::EBADF)));
    }
    if revents & (libc::POLLERR | libc::POLLHUP) != 0 {
        return Err(ChannelError::Io(io::Error::new(
            io::ErrorKind::BrokenPipe,
            "device hung up or reported an error",
        )));
    }
    Ok(false)
}

impl std::fmt::Debug for UcmDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UcmDevice")
            .field("path", &self.path)
            .field("open", &self.file.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_DEVICE_PATH;
    use ibucm_wire::{request, HEADER_SIZE};

    fn temp_file(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("ibucm-channel-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(tag);
        std::fs::write(&path, b"").unwrap();
        path
    }

    #[test]
    fn test_submit_writes_header_and_payload() {
        let path = temp_file("submit");
        let device = UcmDevice::open(&path).unwrap();
        let mut cmd = request::listen(7, 0x1234, u64::MAX);

        let written = device.submit(&mut cmd).unwrap();
        assert_eq!(written, cmd.wire_len());

        let on_disk = std::fs::read(&path).unwrap();
        assert_eq!(on_disk.len(), HEADER_SIZE + 24);
        assert_eq!(&on_disk[..4], &3u32.to_le_bytes());
        assert_eq!(&on_disk[HEADER_SIZE..HEADER_SIZE + 8], &0x1234u64.to_le_bytes());
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_regular_file_is_readable() {
        let path = temp_file("poll");
        let device = UcmDevice::open(&path).unwrap();
        assert!(device
            .wait_readable(Some(Duration::from_millis(10)))
            .unwrap());
        assert!(device.as_raw_fd().is_some());
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_open_missing_device_fails() {
        let err = UcmDevice::open("/nonexistent/ibucm/ucm").unwrap_err();
        assert!(matches!(err, ChannelError::Open { .. }));
    }

    #[test]
    fn test_lenient_open_defers_failure() {
        let device = UcmDevice::open_lenient("/nonexistent/ibucm/ucm");
        assert!(!device.is_open());
        assert!(device.as_raw_fd().is_none());

        let mut cmd = request::establish(1);
        let err = device.submit(&mut cmd).unwrap_err();
        assert!(matches!(err, ChannelError::Unavailable { .. }));
        let err = device.wait_readable(None).unwrap_err();
        assert!(matches!(err, ChannelError::Unavailable { .. }));
    }

    #[test]
    fn test_config_selects_open_mode() {
        let config = DeviceConfig {
            path: PathBuf::from("/nonexistent/ibucm/ucm"),
            required: false,
        };
        assert!(!UcmDevice::with_config(&config).unwrap().is_open());

        let strict = DeviceConfig::with_path("/nonexistent/ibucm/ucm");
        assert!(strict.required);
        assert!(UcmDevice::with_config(&strict).is_err());
        assert_eq!(DeviceConfig::default().path, PathBuf::from(DEFAULT_DEVICE_PATH));
    }

    #[test]
    fn test_hangup_is_a_fault_not_a_timeout() {
        let err = readiness(libc::POLLHUP).unwrap_err();
        assert!(matches!(err, ChannelError::Io(e) if e.kind() == io::ErrorKind::BrokenPipe));
        assert!(matches!(readiness(libc::POLLERR), Err(ChannelError::Io(_))));
        assert!(matches!(readiness(libc::POLLNVAL), Err(ChannelError::Io(_))));
    }

    #[test]
    fn test_pending_input_wins_over_hangup() {
        assert!(readiness(libc::POLLIN).unwrap());
        assert!(readiness(libc::POLLIN | libc::POLLHUP).unwrap());
        assert!(!readiness(0).unwrap());
    }
}
