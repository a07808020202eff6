//! Event response record returned by the `EVENT` command.
//!
//! ```text
//! ┌──────────┬────────┬──────────┬────────────┬──────────┬──────────────┐
//! │ uid      │ id     │ event    │ present    │ reserved │ union        │
//! │ (8B LE)  │ (4B)   │ (4B)     │ (4B flags) │ (4B)     │ (160B)       │
//! └──────────┴────────┴──────────┴────────────┴──────────┴──────────────┘
//! ```
//!
//! The layout of the union depends on the event kind. Decoding the fixed
//! part never fails on an unknown kind; only [`EventResponse::body`] does,
//! so callers can still account for the notification.

use std::fmt;
use std::ops::BitOr;

use bytes::{Buf, BufMut, BytesMut};

use crate::error::{Result, WireError};
use crate::path::{PathRecord, WirePathRec, PATH_RECORD_SIZE};

/// Size of the `EVENT` response record.
pub const EVENT_RESPONSE_SIZE: usize = 184;

/// Size of the kind-dependent union inside the response record.
pub const EVENT_UNION_SIZE: usize = 160;

/// Size of the additional-information field carried by REJ, APR and SIDR_REP.
pub const INFO_LEN: usize = 72;

const FIXED_PART: usize = EVENT_RESPONSE_SIZE - EVENT_UNION_SIZE;

/// Kind of an asynchronously delivered notification.
///
/// Raw values outside the known set decode to [`EventKind::Other`] and are
/// delivered as status events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    ReqError,
    ReqReceived,
    RepError,
    RepReceived,
    RtuReceived,
    UserEstablished,
    DreqError,
    DreqReceived,
    DrepReceived,
    TimewaitExit,
    MraReceived,
    RejReceived,
    LapError,
    LapReceived,
    AprReceived,
    SidrReqError,
    SidrReqReceived,
    SidrRepReceived,
    /// A kind this library has no layout for; holds the raw value.
    Other(u32),
}

impl EventKind {
    /// All kinds in wire order.
    pub const ALL: [EventKind; 18] = [
        EventKind::ReqError,
        EventKind::ReqReceived,
        EventKind::RepError,
        EventKind::RepReceived,
        EventKind::RtuReceived,
        EventKind::UserEstablished,
        EventKind::DreqError,
        EventKind::DreqReceived,
        EventKind::DrepReceived,
        EventKind::TimewaitExit,
        EventKind::MraReceived,
        EventKind::RejReceived,
        EventKind::LapError,
        EventKind::LapReceived,
        EventKind::AprReceived,
        EventKind::SidrReqError,
        EventKind::SidrReqReceived,
        EventKind::SidrRepReceived,
    ];

    pub fn from_raw(raw: u32) -> Self {
        usize::try_from(raw)
            .ok()
            .and_then(|index| Self::ALL.get(index))
            .copied()
            .unwrap_or(EventKind::Other(raw))
    }

    pub fn as_u32(self) -> u32 {
        match self {
            EventKind::ReqError => 0,
            EventKind::ReqReceived => 1,
            EventKind::RepError => 2,
            EventKind::RepReceived => 3,
            EventKind::RtuReceived => 4,
            EventKind::UserEstablished => 5,
            EventKind::DreqError => 6,
            EventKind::DreqReceived => 7,
            EventKind::DrepReceived => 8,
            EventKind::TimewaitExit => 9,
            EventKind::MraReceived => 10,
            EventKind::RejReceived => 11,
            EventKind::LapError => 12,
            EventKind::LapReceived => 13,
            EventKind::AprReceived => 14,
            EventKind::SidrReqError => 15,
            EventKind::SidrReqReceived => 16,
            EventKind::SidrRepReceived => 17,
            EventKind::Other(raw) => raw,
        }
    }

    /// Returns true for kinds that announce a peer-initiated endpoint the
    /// kernel already created (the echoed id names the new child).
    pub fn creates_id(self) -> bool {
        matches!(self, EventKind::ReqReceived | EventKind::SidrReqReceived)
    }

    /// Fixed private-data size of the fabric message behind this kind.
    pub fn private_data_len(self) -> Option<usize> {
        match self {
            EventKind::ReqReceived => Some(92),
            EventKind::RepReceived => Some(196),
            EventKind::RtuReceived => Some(224),
            EventKind::DreqReceived => Some(220),
            EventKind::DrepReceived => Some(224),
            EventKind::MraReceived => Some(222),
            EventKind::RejReceived => Some(148),
            EventKind::LapReceived => Some(168),
            EventKind::AprReceived => Some(148),
            EventKind::SidrReqReceived => Some(216),
            EventKind::SidrRepReceived => Some(136),
            _ => None,
        }
    }

    /// Returns true if this kind may carry an additional-information buffer.
    pub fn carries_info(self) -> bool {
        matches!(
            self,
            EventKind::RejReceived | EventKind::AprReceived | EventKind::SidrRepReceived
        )
    }

    pub fn name(self) -> &'static str {
        match self {
            EventKind::ReqError => "REQ_ERROR",
            EventKind::ReqReceived => "REQ_RECEIVED",
            EventKind::RepError => "REP_ERROR",
            EventKind::RepReceived => "REP_RECEIVED",
            EventKind::RtuReceived => "RTU_RECEIVED",
            EventKind::UserEstablished => "USER_ESTABLISHED",
            EventKind::DreqError => "DREQ_ERROR",
            EventKind::DreqReceived => "DREQ_RECEIVED",
            EventKind::DrepReceived => "DREP_RECEIVED",
            EventKind::TimewaitExit => "TIMEWAIT_EXIT",
            EventKind::MraReceived => "MRA_RECEIVED",
            EventKind::RejReceived => "REJ_RECEIVED",
            EventKind::LapError => "LAP_ERROR",
            EventKind::LapReceived => "LAP_RECEIVED",
            EventKind::AprReceived => "APR_RECEIVED",
            EventKind::SidrReqError => "SIDR_REQ_ERROR",
            EventKind::SidrReqReceived => "SIDR_REQ_RECEIVED",
            EventKind::SidrRepReceived => "SIDR_REP_RECEIVED",
            EventKind::Other(_) => "OTHER",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventKind::Other(raw) => write!(f, "OTHER({raw})"),
            known => f.write_str(known.name()),
        }
    }
}

/// Presence flags of the optional trailing fields of an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Presence(pub u32);

impl Presence {
    pub const NONE: Presence = Presence(0);
    pub const DATA: Presence = Presence(0x1);
    pub const INFO: Presence = Presence(0x2);
    pub const PRIMARY: Presence = Presence(0x4);
    pub const ALTERNATE: Presence = Presence(0x8);

    pub fn contains(self, other: Presence) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn bits(self) -> u32 {
        self.0
    }
}

impl BitOr for Presence {
    type Output = Presence;

    fn bitor(self, rhs: Presence) -> Presence {
        Presence(self.0 | rhs.0)
    }
}

/// Parameters of an inbound connection request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReqEventParams {
    pub remote_ca_guid: u64,
    pub remote_qkey: u32,
    pub remote_qpn: u32,
    pub qp_type: u32,
    pub starting_psn: u32,
    pub responder_resources: u8,
    pub initiator_depth: u8,
    pub local_cm_response_timeout: u8,
    pub flow_control: bool,
    pub remote_cm_response_timeout: u8,
    pub retry_count: u8,
    pub rnr_retry_count: u8,
    pub srq: bool,
}

/// Parameters of a received connection reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RepEventParams {
    pub remote_ca_guid: u64,
    pub remote_qkey: u32,
    pub remote_qpn: u32,
    pub starting_psn: u32,
    pub responder_resources: u8,
    pub initiator_depth: u8,
    pub target_ack_delay: u8,
    pub failover_accepted: u8,
    pub flow_control: bool,
    pub rnr_retry_count: u8,
    pub srq: bool,
}

/// Parameters of a received service id resolution reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SidrRepEventParams {
    pub status: u32,
    pub qkey: u32,
    pub qpn: u32,
}

/// Kind-specific part of an event, without the variable-length buffers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventBody {
    Req {
        params: ReqEventParams,
        primary_path: PathRecord,
        alternate_path: PathRecord,
    },
    Rep(RepEventParams),
    Mra { service_timeout: u8 },
    Rej { reason: u32 },
    Lap { alternate_path: PathRecord },
    Apr { status: u32 },
    SidrReq { pkey: u16 },
    SidrRep(SidrRepEventParams),
    /// Completion status of a fire-and-forget send, or an error report.
    Status(u32),
}

impl EventBody {
    fn decode(kind: EventKind, union: &[u8; EVENT_UNION_SIZE]) -> Self {
        let mut buf = &union[..];
        match kind {
            EventKind::ReqReceived => {
                let params = ReqEventParams {
                    remote_ca_guid: buf.get_u64_le(),
                    remote_qkey: buf.get_u32_le(),
                    remote_qpn: buf.get_u32_le(),
                    qp_type: buf.get_u32_le(),
                    starting_psn: buf.get_u32_le(),
                    responder_resources: buf.get_u8(),
                    initiator_depth: buf.get_u8(),
                    local_cm_response_timeout: buf.get_u8(),
                    flow_control: buf.get_u8() != 0,
                    remote_cm_response_timeout: buf.get_u8(),
                    retry_count: buf.get_u8(),
                    rnr_retry_count: buf.get_u8(),
                    srq: buf.get_u8() != 0,
                };
                let primary_path = PathRecord::from(&WirePathRec::read(&mut buf));
                let alternate_path = PathRecord::from(&WirePathRec::read(&mut buf));
                EventBody::Req {
                    params,
                    primary_path,
                    alternate_path,
                }
            }
            EventKind::RepReceived => EventBody::Rep(RepEventParams {
                remote_ca_guid: buf.get_u64_le(),
                remote_qkey: buf.get_u32_le(),
                remote_qpn: buf.get_u32_le(),
                starting_psn: buf.get_u32_le(),
                responder_resources: buf.get_u8(),
                initiator_depth: buf.get_u8(),
                target_ack_delay: buf.get_u8(),
                failover_accepted: buf.get_u8(),
                flow_control: buf.get_u8() != 0,
                rnr_retry_count: buf.get_u8(),
                srq: buf.get_u8() != 0,
            }),
            EventKind::MraReceived => EventBody::Mra {
                service_timeout: buf.get_u8(),
            },
            EventKind::RejReceived => EventBody::Rej {
                reason: buf.get_u32_le(),
            },
            EventKind::LapReceived => EventBody::Lap {
                alternate_path: PathRecord::from(&WirePathRec::read(&mut buf)),
            },
            EventKind::AprReceived => EventBody::Apr {
                status: buf.get_u32_le(),
            },
            EventKind::SidrReqReceived => EventBody::SidrReq {
                pkey: buf.get_u16_le(),
            },
            EventKind::SidrRepReceived => EventBody::SidrRep(SidrRepEventParams {
                status: buf.get_u32_le(),
                qkey: buf.get_u32_le(),
                qpn: buf.get_u32_le(),
            }),
            _ => EventBody::Status(buf.get_u32_le()),
        }
    }

    /// Encode into a union, zero padded to its full size.
    pub fn encode(&self) -> [u8; EVENT_UNION_SIZE] {
        let mut dst = BytesMut::with_capacity(EVENT_UNION_SIZE);
        match self {
            EventBody::Req {
                params,
                primary_path,
                alternate_path,
            } => {
                dst.put_u64_le(params.remote_ca_guid);
                dst.put_u32_le(params.remote_qkey);
                dst.put_u32_le(params.remote_qpn);
                dst.put_u32_le(params.qp_type);
                dst.put_u32_le(params.starting_psn);
                dst.put_u8(params.responder_resources);
                dst.put_u8(params.initiator_depth);
                dst.put_u8(params.local_cm_response_timeout);
                dst.put_u8(u8::from(params.flow_control));
                dst.put_u8(params.remote_cm_response_timeout);
                dst.put_u8(params.retry_count);
                dst.put_u8(params.rnr_retry_count);
                dst.put_u8(u8::from(params.srq));
                WirePathRec::from(primary_path).encode(&mut dst);
                WirePathRec::from(alternate_path).encode(&mut dst);
            }
            EventBody::Rep(params) => {
                dst.put_u64_le(params.remote_ca_guid);
                dst.put_u32_le(params.remote_qkey);
                dst.put_u32_le(params.remote_qpn);
                dst.put_u32_le(params.starting_psn);
                dst.put_u8(params.responder_resources);
                dst.put_u8(params.initiator_depth);
                dst.put_u8(params.target_ack_delay);
                dst.put_u8(params.failover_accepted);
                dst.put_u8(u8::from(params.flow_control));
                dst.put_u8(params.rnr_retry_count);
                dst.put_u8(u8::from(params.srq));
            }
            EventBody::Mra { service_timeout } => dst.put_u8(*service_timeout),
            EventBody::Rej { reason } => dst.put_u32_le(*reason),
            EventBody::Lap { alternate_path } => {
                WirePathRec::from(alternate_path).encode(&mut dst)
            }
            EventBody::Apr { status } => dst.put_u32_le(*status),
            EventBody::SidrReq { pkey } => dst.put_u16_le(*pkey),
            EventBody::SidrRep(params) => {
                dst.put_u32_le(params.status);
                dst.put_u32_le(params.qkey);
                dst.put_u32_le(params.qpn);
            }
            EventBody::Status(status) => dst.put_u32_le(*status),
        }
        let mut union = [0u8; EVENT_UNION_SIZE];
        union[..dst.len()].copy_from_slice(&dst);
        union
    }
}

/// Decoded `EVENT` response record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventResponse {
    /// Local tag echoed back by the kernel (0 when it has none).
    pub uid: u64,
    /// Kernel identifier of the handle; for request kinds, the new child.
    pub id: u32,
    /// Raw event kind.
    pub raw_kind: u32,
    pub present: Presence,
    union: [u8; EVENT_UNION_SIZE],
}

impl EventResponse {
    /// Build a response around an already encoded body.
    pub fn new(uid: u64, id: u32, kind: EventKind, present: Presence, body: &EventBody) -> Self {
        Self {
            uid,
            id,
            raw_kind: kind.as_u32(),
            present,
            union: body.encode(),
        }
    }

    /// Build a status response with an arbitrary raw kind.
    pub fn with_raw_kind(
        uid: u64,
        id: u32,
        raw_kind: u32,
        present: Presence,
        status: u32,
    ) -> Self {
        Self {
            uid,
            id,
            raw_kind,
            present,
            union: EventBody::Status(status).encode(),
        }
    }

    /// Decode the fixed part of a response record.
    pub fn decode(src: &[u8]) -> Result<Self> {
        if src.len() < EVENT_RESPONSE_SIZE {
            return Err(WireError::Truncated {
                record: "event response",
                len: src.len(),
                need: EVENT_RESPONSE_SIZE,
            });
        }
        let mut buf = src;
        let uid = buf.get_u64_le();
        let id = buf.get_u32_le();
        let raw_kind = buf.get_u32_le();
        let present = Presence(buf.get_u32_le());
        buf.advance(4);
        let mut union = [0u8; EVENT_UNION_SIZE];
        buf.copy_to_slice(&mut union);
        Ok(Self {
            uid,
            id,
            raw_kind,
            present,
            union,
        })
    }

    pub fn encode(&self, dst: &mut BytesMut) {
        dst.reserve(EVENT_RESPONSE_SIZE);
        dst.put_u64_le(self.uid);
        dst.put_u32_le(self.id);
        dst.put_u32_le(self.raw_kind);
        dst.put_u32_le(self.present.bits());
        dst.put_u32_le(0);
        dst.put_slice(&self.union);
    }

    pub fn kind(&self) -> EventKind {
        EventKind::from_raw(self.raw_kind)
    }

    /// Decode the kind-specific union. Kinds without a dedicated layout
    /// carry a single status value.
    pub fn body(&self) -> EventBody {
        EventBody::decode(self.kind(), &self.union)
    }
}

const _: () = assert!(FIXED_PART == 24);
const _: () = assert!(32 + 2 * PATH_RECORD_SIZE == EVENT_UNION_SIZE);
