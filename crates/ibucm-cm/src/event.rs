use ibucm_wire::{
    EventKind, PathRecord, RepEventParams, ReqEventParams, SidrRepEventParams,
};

use crate::id::CmId;

/// Kind-specific parameters of an [`Event`].
#[derive(Debug)]
pub enum EventParams {
    /// Inbound connection request. The event's handle is the new child;
    /// `listen_id` is the listening handle the request arrived on.
    ReqReceived {
        listen_id: CmId,
        params: ReqEventParams,
        primary_path: PathRecord,
        alternate_path: Option<PathRecord>,
    },
    RepReceived(RepEventParams),
    MraReceived {
        service_timeout: u8,
    },
    RejReceived {
        reason: u32,
        /// Additional rejection information.
        ari: Option<Vec<u8>>,
    },
    LapReceived {
        alternate_path: PathRecord,
    },
    AprReceived {
        status: u32,
        info: Option<Vec<u8>>,
    },
    /// Inbound service id resolution request; the event's handle is the
    /// new child.
    SidrReqReceived {
        listen_id: CmId,
        pkey: u16,
    },
    SidrRepReceived {
        params: SidrRepEventParams,
        info: Option<Vec<u8>>,
    },
    /// Status of a send, or an error/timeout report.
    SendStatus(u32),
}

/// A notification delivered by the kernel.
///
/// An event counts against one handle (the listening handle for inbound
/// requests, its own handle otherwise) until it is released. Dropping the
/// event releases it; [`ConnectionManager::release_event`] does the same
/// explicitly. A pending [`ConnectionManager::destroy_id`] on the owning
/// handle waits for that release.
///
/// [`ConnectionManager::release_event`]: crate::ConnectionManager::release_event
/// [`ConnectionManager::destroy_id`]: crate::ConnectionManager::destroy_id
#[derive(Debug)]
pub struct Event {
    id: CmId,
    kind: EventKind,
    params: EventParams,
    private_data: Option<Vec<u8>>,
}

impl Event {
    pub(crate) fn new(
        id: CmId,
        kind: EventKind,
        params: EventParams,
        private_data: Option<Vec<u8>>,
    ) -> Self {
        Self {
            id,
            kind,
            params,
            private_data,
        }
    }

    /// The handle this event is for.
    pub fn id(&self) -> &CmId {
        &self.id
    }

    pub fn kind(&self) -> EventKind {
        self.kind
    }

    pub fn params(&self) -> &EventParams {
        &self.params
    }

    /// Listening handle of an inbound request.
    pub fn listen_id(&self) -> Option<&CmId> {
        match &self.params {
            EventParams::ReqReceived { listen_id, .. }
            | EventParams::SidrReqReceived { listen_id, .. } => Some(listen_id),
            _ => None,
        }
    }

    /// Application private data carried by the message, if any.
    pub fn private_data(&self) -> Option<&[u8]> {
        self.private_data.as_deref()
    }

    /// Move the private data out of the event.
    pub fn take_private_data(&mut self) -> Option<Vec<u8>> {
        self.private_data.take()
    }

    /// Additional information bytes (REJ, APR and SIDR_REP), if any.
    pub fn info(&self) -> Option<&[u8]> {
        match &self.params {
            EventParams::RejReceived { ari: info, .. }
            | EventParams::AprReceived { info, .. }
            | EventParams::SidrRepReceived { info, .. } => info.as_deref(),
            _ => None,
        }
    }

    /// The handle whose outstanding-event count this event feeds.
    pub fn owner(&self) -> &CmId {
        self.listen_id().unwrap_or(&self.id)
    }
}

impl Drop for Event {
    fn drop(&mut self) {
        self.owner().complete_event();
    }
}
