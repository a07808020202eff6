use std::time::Duration;

use bytes::Bytes;
use ibucm_channel::{CommandChannel, Device};
use ibucm_wire::{
    request, Command, EventBody, EventKind, EventResponse, IdAttributes, InitQpAttr, Opcode,
    PathRecord, Presence, QpState, RepParams, ReqParams, SidrRepParams, SidrReqParams, Slot,
    INFO_LEN, MAX_VAR_LEN,
};
use tracing::{debug, info, trace};

use crate::error::{CmError, DestroyError, Result};
use crate::event::{Event, EventParams};
use crate::id::{CmId, Registry};

#[cfg(unix)]
use crate::config::CmConfig;

/// Entry point for all connection manager operations.
///
/// Owns the command channel and the registry of live handles. Every method
/// takes `&self`; one manager is shared by all threads of the process.
pub struct ConnectionManager {
    channel: CommandChannel,
    registry: Registry,
    scratch_len: u8,
}

impl ConnectionManager {
    /// Manager over an arbitrary device.
    pub fn new(device: impl Device + 'static) -> Self {
        Self {
            channel: CommandChannel::new(device),
            registry: Registry::new(),
            scratch_len: MAX_VAR_LEN,
        }
    }

    /// Change the size of the scratch buffers offered on event fetch.
    pub fn with_scratch_len(mut self, scratch_len: u8) -> Self {
        self.scratch_len = scratch_len;
        self
    }

    /// Open the kernel device described by `config`.
    #[cfg(unix)]
    pub fn open(config: &CmConfig) -> Result<Self> {
        let device = ibucm_channel::UcmDevice::with_config(&config.device)?;
        Ok(Self::new(device).with_scratch_len(config.scratch_len))
    }

    /// Process-wide manager over the default device.
    ///
    /// The device is opened on first use. A missing device is logged, and
    /// every operation then fails with
    /// [`ChannelError::Unavailable`](ibucm_channel::ChannelError::Unavailable).
    #[cfg(unix)]
    pub fn global() -> &'static ConnectionManager {
        static GLOBAL: std::sync::OnceLock<ConnectionManager> = std::sync::OnceLock::new();
        GLOBAL.get_or_init(|| {
            let device = ibucm_channel::UcmDevice::open_lenient(ibucm_channel::DEFAULT_DEVICE_PATH);
            ConnectionManager::new(device)
        })
    }

    /// Number of handles currently registered (created and not destroyed).
    pub fn live_ids(&self) -> usize {
        self.registry.len()
    }

    fn transact(&self, command: Command) -> Result<Command> {
        Ok(self.channel.transact(command)?)
    }

    fn response<'a>(command: &'a Command) -> &'a [u8] {
        command.response().unwrap_or_default()
    }

    /// Create a handle carrying `context`.
    ///
    /// Nothing stays registered if the kernel rejects the command.
    pub fn create_id(&self, context: u64) -> Result<CmId> {
        let id = self.registry.allocate(context);
        let created = request::create_id(id.token())
            .map_err(CmError::from)
            .and_then(|cmd| self.transact(cmd))
            .and_then(|cmd| Ok(request::decode_create_id_resp(Self::response(&cmd))?));

        match created {
            Ok(handle) => {
                id.set_handle(handle);
                debug!(handle, token = id.token(), "created handle");
                Ok(id)
            }
            Err(e) => {
                self.registry.remove(&id);
                Err(e)
            }
        }
    }

    /// Destroy a handle.
    ///
    /// The kernel reports how many events it had already delivered for the
    /// handle; this call then blocks until each of them has been released
    /// (counting inbound requests against their listening handle). There is
    /// no timeout: an event that is never released or dropped blocks this
    /// call forever.
    ///
    /// If the destroy command fails, the handle is returned inside the
    /// error and nothing is waited for.
    pub fn destroy_id(&self, id: CmId) -> std::result::Result<(), DestroyError> {
        let handle = id.handle();
        let reported = match request::destroy_id(handle)
            .map_err(CmError::from)
            .and_then(|cmd| self.transact(cmd))
            .and_then(|cmd| Ok(request::decode_destroy_id_resp(Self::response(&cmd))?))
        {
            Ok(reported) => reported,
            Err(source) => return Err(DestroyError { id, source }),
        };

        debug!(handle, reported, "waiting for outstanding events");
        id.wait_for_events(reported);
        self.registry.remove(&id);
        debug!(handle, "destroyed handle");
        Ok(())
    }

    /// Query the service binding and communication ids of a handle.
    pub fn attr_id(&self, id: &CmId) -> Result<IdAttributes> {
        let cmd = self.transact(request::attr_id(id.handle())?)?;
        Ok(IdAttributes::decode(Self::response(&cmd))?)
    }

    /// Ask the kernel for the queue-pair attributes needed to move a QP
    /// into `qp_state` for this connection.
    pub fn init_qp_attr(&self, id: &CmId, qp_state: QpState) -> Result<InitQpAttr> {
        let cmd = self.transact(request::init_qp_attr(id.handle(), qp_state)?)?;
        Ok(InitQpAttr::decode(Self::response(&cmd), qp_state)?)
    }

    /// Listen for connection requests on `service_id` under `service_mask`.
    pub fn listen(&self, id: &CmId, service_id: u64, service_mask: u64) -> Result<()> {
        self.transact(request::listen(id.handle(), service_id, service_mask))?;
        info!(handle = id.handle(), service_id, service_mask, "listening");
        Ok(())
    }

    pub fn send_req(&self, id: &CmId, param: &ReqParams) -> Result<()> {
        self.transact(request::req(id.handle(), param)?)?;
        Ok(())
    }

    /// Reply to a connection request. The reply carries the handle's token
    /// so later notifications for a child handle are tagged.
    pub fn send_rep(&self, id: &CmId, param: &RepParams) -> Result<()> {
        self.transact(request::rep(id.token(), id.handle(), param)?)?;
        Ok(())
    }

    pub fn send_rtu(&self, id: &CmId, data: &[u8]) -> Result<()> {
        self.send_private_data(Opcode::SendRtu, id, data)
    }

    pub fn send_dreq(&self, id: &CmId, data: &[u8]) -> Result<()> {
        self.send_private_data(Opcode::SendDreq, id, data)
    }

    pub fn send_drep(&self, id: &CmId, data: &[u8]) -> Result<()> {
        self.send_private_data(Opcode::SendDrep, id, data)
    }

    fn send_private_data(&self, opcode: Opcode, id: &CmId, data: &[u8]) -> Result<()> {
        let cmd = request::private_data(opcode, id.handle(), Bytes::copy_from_slice(data))?;
        self.transact(cmd)?;
        Ok(())
    }

    /// Tell the kernel the connection is established (first receive on the
    /// QP arrived before the RTU).
    pub fn establish(&self, id: &CmId) -> Result<()> {
        self.transact(request::establish(id.handle()))?;
        Ok(())
    }

    pub fn send_rej(&self, id: &CmId, reason: u32, ari: &[u8], data: &[u8]) -> Result<()> {
        self.send_status_info(Opcode::SendRej, id, reason, ari, data)
    }

    pub fn send_apr(&self, id: &CmId, status: u32, info: &[u8], data: &[u8]) -> Result<()> {
        self.send_status_info(Opcode::SendApr, id, status, info, data)
    }

    fn send_status_info(
        &self,
        opcode: Opcode,
        id: &CmId,
        status: u32,
        info: &[u8],
        data: &[u8],
    ) -> Result<()> {
        let cmd = request::status_info(
            opcode,
            id.handle(),
            status,
            Bytes::copy_from_slice(info),
            Bytes::copy_from_slice(data),
        )?;
        self.transact(cmd)?;
        Ok(())
    }

    pub fn send_mra(&self, id: &CmId, service_timeout: u8, data: &[u8]) -> Result<()> {
        let cmd = request::mra(id.handle(), service_timeout, Bytes::copy_from_slice(data))?;
        self.transact(cmd)?;
        Ok(())
    }

    pub fn send_lap(&self, id: &CmId, alternate_path: &PathRecord, data: &[u8]) -> Result<()> {
        let cmd = request::lap(id.handle(), alternate_path, Bytes::copy_from_slice(data))?;
        self.transact(cmd)?;
        Ok(())
    }

    pub fn send_sidr_req(&self, id: &CmId, param: &SidrReqParams) -> Result<()> {
        self.transact(request::sidr_req(id.handle(), param)?)?;
        Ok(())
    }

    pub fn send_sidr_rep(&self, id: &CmId, param: &SidrRepParams) -> Result<()> {
        self.transact(request::sidr_rep(id.handle(), param)?)?;
        Ok(())
    }

    /// Block until readiness of the notification channel or `timeout`.
    pub fn wait_readable(&self, timeout: Option<Duration>) -> Result<bool> {
        Ok(self.channel.wait_readable(timeout)?)
    }

    /// Like [`get_event`](Self::get_event), but gives up with
    /// [`CmError::Timeout`] if no notification is ready within `timeout`.
    ///
    /// The timeout bounds only the wait; the fetch itself is not bounded.
    pub fn get_event_timed(&self, timeout: Duration) -> Result<Event> {
        if !self.channel.wait_readable(Some(timeout))? {
            trace!(?timeout, "no event ready");
            return Err(CmError::Timeout(timeout));
        }
        self.get_event()
    }

    /// Fetch the next notification, blocking until one is queued.
    ///
    /// Inbound connection and service id resolution requests materialize a
    /// new child handle for the endpoint the kernel already created.
    pub fn get_event(&self) -> Result<Event> {
        let mut cmd = self.transact(request::event_get(self.scratch_len)?)?;
        let resp = EventResponse::decode(Self::response(&cmd))?;

        let kind = resp.kind();
        let target = self
            .registry
            .resolve(resp.uid, resp.id, !kind.creates_id())
            .ok_or(CmError::UnknownHandle {
                uid: resp.uid,
                id: resp.id,
            })?;
        if let EventKind::Other(raw_kind) = kind {
            debug!(handle = target.handle(), raw_kind, "event kind without a dedicated layout");
        }
        let body = resp.body();

        let info = if kind.carries_info() && resp.present.contains(Presence::INFO) {
            cmd.take_output(Slot::Info).map(|buf| trim(buf, Some(INFO_LEN)))
        } else {
            None
        };

        let (id, params) = match body {
            EventBody::Req {
                params,
                primary_path,
                alternate_path,
            } => {
                let child = self.registry.allocate(target.context());
                child.set_handle(resp.id);
                let alternate_path = resp
                    .present
                    .contains(Presence::ALTERNATE)
                    .then_some(alternate_path);
                (
                    child,
                    EventParams::ReqReceived {
                        listen_id: target,
                        params,
                        primary_path,
                        alternate_path,
                    },
                )
            }
            EventBody::SidrReq { pkey } => {
                let child = self.registry.allocate(target.context());
                child.set_handle(resp.id);
                (
                    child,
                    EventParams::SidrReqReceived {
                        listen_id: target,
                        pkey,
                    },
                )
            }
            EventBody::Rep(params) => (target, EventParams::RepReceived(params)),
            EventBody::Mra { service_timeout } => {
                (target, EventParams::MraReceived { service_timeout })
            }
            EventBody::Rej { reason } => (target, EventParams::RejReceived { reason, ari: info }),
            EventBody::Lap { alternate_path } => {
                (target, EventParams::LapReceived { alternate_path })
            }
            EventBody::Apr { status } => (target, EventParams::AprReceived { status, info }),
            EventBody::SidrRep(params) => (target, EventParams::SidrRepReceived { params, info }),
            EventBody::Status(status) => (target, EventParams::SendStatus(status)),
        };

        let private_data = if resp.present.contains(Presence::DATA) {
            cmd.take_output(Slot::Data)
                .map(|buf| trim(buf, kind.private_data_len()))
        } else {
            None
        };

        debug!(
            event = %kind,
            handle = id.handle(),
            token = id.token(),
            private_data = private_data.as_ref().map_or(0, Vec::len),
            "received event"
        );
        Ok(Event::new(id, kind, params, private_data))
    }

    /// Release an event, letting a pending destroy of its owning handle
    /// make progress. Equivalent to dropping the event.
    pub fn release_event(&self, event: Event) {
        trace!(event = %event.kind(), handle = event.owner().handle(), "releasing event");
        drop(event);
    }
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("channel", &self.channel)
            .field("live_ids", &self.registry.len())
            .field("scratch_len", &self.scratch_len)
            .finish()
    }
}

/// Cut a claimed scratch buffer down to the message's field size, never to
/// zero.
fn trim(mut buf: Vec<u8>, len: Option<usize>) -> Vec<u8> {
    if let Some(len) = len {
        if len > 0 && len < buf.len() {
            buf.truncate(len);
            buf.shrink_to_fit();
        }
    }
    buf
}
