use std::path::PathBuf;

/// Character device exported by the kernel connection manager.
pub const DEFAULT_DEVICE_PATH: &str = "/dev/infiniband/ucm";

/// Where and how to open the connection manager device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceConfig {
    /// Device node path.
    pub path: PathBuf,
    /// Fail at open time when the device cannot be opened. When false the
    /// failure is logged and every later command reports
    /// [`ChannelError::Unavailable`](crate::ChannelError::Unavailable).
    pub required: bool,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(DEFAULT_DEVICE_PATH),
            required: true,
        }
    }
}

impl DeviceConfig {
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }
}
