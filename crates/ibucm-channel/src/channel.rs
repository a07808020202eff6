use std::io;
use std::time::Duration;

use ibucm_wire::Command;
use tracing::{trace, warn};

use crate::error::{ChannelError, Result};
use crate::traits::Device;

/// Synchronous request/response primitive over a [`Device`].
///
/// Every command goes out in one write. The kernel either accepts the whole
/// command or fails it, so a short write is reported as
/// [`ChannelError::Incomplete`] and the command, including any response
/// buffer, is discarded.
pub struct CommandChannel {
    device: Box<dyn Device>,
}

impl CommandChannel {
    pub fn new(device: impl Device + 'static) -> Self {
        Self {
            device: Box::new(device),
        }
    }

    /// Send `command` and hand it back with its response and output
    /// buffers filled in.
    pub fn transact(&self, mut command: Command) -> Result<Command> {
        let expected = command.wire_len();
        let opcode = command.opcode();
        let written = self.device.submit(&mut command)?;

        if written == 0 {
            warn!(%opcode, expected, "device accepted no bytes");
            return Err(ChannelError::Io(io::Error::new(
                io::ErrorKind::WriteZero,
                "device accepted no bytes",
            )));
        }
        if written != expected {
            warn!(%opcode, written, expected, "short write to device");
            return Err(ChannelError::Incomplete { written, expected });
        }

        trace!(%opcode, written, "command accepted");
        Ok(command)
    }

    /// Block until a notification is queued or `timeout` elapses.
    pub fn wait_readable(&self, timeout: Option<Duration>) -> Result<bool> {
        self.device.wait_readable(timeout)
    }

    /// Name of the underlying device.
    pub fn device_name(&self) -> &str {
        self.device.name()
    }
}

impl std::fmt::Debug for CommandChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandChannel")
            .field("device", &self.device.name())
            .finish()
    }
}
