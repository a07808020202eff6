use std::time::Duration;

use ibucm_wire::Command;

use crate::error::Result;

/// A message-exchange endpoint the kernel connection manager listens on.
///
/// `submit` hands one command to the kernel in a single write and returns
/// the number of bytes accepted. Responses and output buffers are written
/// by the kernel into the buffers the command owns, before `submit`
/// returns. Implementations must be usable from several threads at once;
/// the kernel serializes commands on its side.
pub trait Device: Send + Sync {
    /// Write `command` (header + payload) and return the bytes accepted.
    fn submit(&self, command: &mut Command) -> Result<usize>;

    /// Block until a notification is queued or `timeout` elapses.
    ///
    /// Returns `Ok(false)` on timeout. `None` waits without bound.
    fn wait_readable(&self, timeout: Option<Duration>) -> Result<bool>;

    /// Device name for diagnostics.
    fn name(&self) -> &str;
}

impl<D: Device + ?Sized> Device for Box<D> {
    fn submit(&self, command: &mut Command) -> Result<usize> {
        (**self).submit(command)
    }

    fn wait_readable(&self, timeout: Option<Duration>) -> Result<bool> {
        (**self).wait_readable(timeout)
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

impl<D: Device + ?Sized> Device for std::sync::Arc<D> {
    fn submit(&self, command: &mut Command) -> Result<usize> {
        (**self).submit(command)
    }

    fn wait_readable(&self, timeout: Option<Duration>) -> Result<bool> {
        (**self).wait_readable(timeout)
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}
