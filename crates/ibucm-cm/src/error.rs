use std::time::Duration;

use ibucm_channel::ChannelError;
use ibucm_wire::WireError;

use crate::id::CmId;

/// Errors that can occur in connection manager operations.
#[derive(Debug, thiserror::Error)]
pub enum CmError {
    /// The command channel failed.
    #[error("channel error: {0}")]
    Channel(#[from] ChannelError),

    /// A record could not be encoded or decoded.
    #[error("wire error: {0}")]
    Wire(WireError),

    /// An argument was rejected before the channel was used.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// No notification became ready in time.
    #[error("no event within {0:?}")]
    Timeout(Duration),

    /// A notification names a handle this process does not know.
    #[error("event for unknown handle (uid {uid}, id {id})")]
    UnknownHandle { uid: u64, id: u32 },

    /// A scratch or response buffer could not be allocated.
    #[error("out of memory allocating {0} bytes")]
    OutOfMemory(usize),
}

impl From<WireError> for CmError {
    fn from(err: WireError) -> Self {
        match err {
            WireError::OutOfMemory(len) => CmError::OutOfMemory(len),
            WireError::TooLong { .. } => CmError::InvalidArgument(err.to_string()),
            other => CmError::Wire(other),
        }
    }
}

/// A failed [`destroy_id`](crate::ConnectionManager::destroy_id).
///
/// The destroy command never reached the kernel, so the handle is handed
/// back intact and can be used or destroyed again.
#[derive(Debug, thiserror::Error)]
#[error("failed to destroy handle {}: {source}", .id.handle())]
pub struct DestroyError {
    pub id: CmId,
    #[source]
    pub source: CmError,
}

impl DestroyError {
    pub fn into_parts(self) -> (CmId, CmError) {
        (self.id, self.source)
    }
}

pub type Result<T> = std::result::Result<T, CmError>;
