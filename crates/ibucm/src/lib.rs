//! User-space connection manager for channel-based fabrics.
//!
//! ibucm drives the kernel connection manager through its character device:
//! it creates connection handles, sends connection-establishment messages
//! and delivers the kernel's asynchronous notifications as typed events.
//!
//! # Crate Structure
//!
//! - [`wire`]: Fixed-layout command and event records
//! - [`channel`]: Command channel over the device (or any [`channel::Device`])
//! - [`cm`]: Handles, operations and event delivery
//!
//! The most used types are re-exported at the top level.

/// Re-export wire types.
pub mod wire {
    pub use ibucm_wire::*;
}

/// Re-export channel types.
pub mod channel {
    pub use ibucm_channel::*;
}

/// Re-export connection manager types.
pub mod cm {
    pub use ibucm_cm::*;
}

pub use ibucm_cm::{
    CmConfig, CmError, CmId, ConnectionManager, DestroyError, Event, EventKind, EventParams,
};

#[cfg(feature = "async")]
pub use ibucm_cm::AsyncEvents;
