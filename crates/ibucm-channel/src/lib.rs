//! Command channel to the kernel connection manager.
//!
//! A [`Device`] is the message-exchange endpoint: it accepts one encoded
//! command per write and reports read-readiness when notifications are
//! queued. [`CommandChannel`] turns a device into the synchronous
//! request/response primitive the connection manager builds on.
//!
//! On Unix, [`UcmDevice`] talks to the character device exported by the
//! kernel (`/dev/infiniband/ucm` by default).

pub mod channel;
pub mod config;
pub mod error;
pub mod traits;

#[cfg(unix)]
pub mod ucm;

pub use channel::CommandChannel;
pub use config::{DeviceConfig, DEFAULT_DEVICE_PATH};
pub use error::{ChannelError, Result};
pub use traits::Device;

#[cfg(unix)]
pub use ucm::UcmDevice;
