use ibucm_channel::DeviceConfig;
use ibucm_wire::MAX_VAR_LEN;

/// Connection manager configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CmConfig {
    /// Device to open.
    pub device: DeviceConfig,
    /// Size of the private-data and info scratch buffers offered to the
    /// kernel on every event fetch. The default asks for the maximum.
    pub scratch_len: u8,
}

impl Default for CmConfig {
    fn default() -> Self {
        Self {
            device: DeviceConfig::default(),
            scratch_len: MAX_VAR_LEN,
        }
    }
}
