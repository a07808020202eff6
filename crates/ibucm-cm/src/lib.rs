//! User-space connection manager.
//!
//! A [`ConnectionManager`] owns the command channel and the registry of
//! live handles. Applications create [`CmId`] handles, drive the connection
//! protocol through the `send_*` operations, and consume asynchronously
//! delivered notifications with [`ConnectionManager::get_event`].
//!
//! Every [`Event`] counts against one handle until it is released, either
//! with [`ConnectionManager::release_event`] or by dropping it.
//! [`ConnectionManager::destroy_id`] waits for those releases before it
//! returns, so a destroyed handle is never referenced by a live event.

pub mod config;
pub mod error;
pub mod event;
pub mod id;
pub mod manager;

#[cfg(feature = "async")]
pub mod async_events;

pub use config::CmConfig;
pub use error::{CmError, DestroyError, Result};
pub use event::{Event, EventParams};
pub use id::CmId;
pub use manager::ConnectionManager;

#[cfg(feature = "async")]
pub use async_events::AsyncEvents;

pub use ibucm_wire::{
    EventKind, IdAttributes, InitQpAttr, PathRecord, QpState, QpType, RepEventParams, RepParams,
    ReqEventParams, ReqParams, SidrRepEventParams, SidrRepParams, SidrReqParams,
};
