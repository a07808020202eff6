use std::sync::Arc;
use std::time::Duration;

use ibucm_channel::ChannelError;
use tracing::trace;

use crate::error::{CmError, Result};
use crate::event::Event;
use crate::manager::ConnectionManager;

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Async source of connection manager events.
///
/// Fetches run on tokio's blocking pool with a bounded readiness wait, so a
/// dropped `next_event` future leaves at most one short wait behind.
#[derive(Debug, Clone)]
pub struct AsyncEvents {
    manager: Arc<ConnectionManager>,
    poll_interval: Duration,
}

impl AsyncEvents {
    pub fn new(manager: Arc<ConnectionManager>) -> Self {
        Self {
            manager,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Bound of each readiness wait on the blocking pool.
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn manager(&self) -> &Arc<ConnectionManager> {
        &self.manager
    }

    /// Wait for the next event.
    pub async fn next_event(&self) -> Result<Event> {
        loop {
            let manager = Arc::clone(&self.manager);
            let interval = self.poll_interval;
            let fetched = tokio::task::spawn_blocking(move || manager.get_event_timed(interval))
                .await
                .map_err(|e| CmError::Channel(ChannelError::Io(std::io::Error::other(e))))?;

            match fetched {
                Err(CmError::Timeout(_)) => trace!("no event yet"),
                other => return other,
            }
        }
    }
}
