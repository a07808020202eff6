//! Fixed-layout wire records for the user-space connection manager ABI.
//!
//! Every command sent to the kernel channel is framed as:
//! - an 8-byte header (`opcode`, payload length, response length)
//! - a fixed-size payload record whose layout depends on the opcode
//!
//! Variable-length inputs and all outputs never travel inline. The payload
//! carries 64-bit pointer slots instead, and the [`Command`] owns the buffers
//! behind them. This crate does no I/O.

pub mod attr;
pub mod codec;
pub mod error;
pub mod event;
pub mod opcode;
pub mod path;
pub mod request;

pub use attr::{
    AhAttr, GlobalRoute, IdAttributes, InitQpAttr, QpAttr, QpAttrMask, QpCap, QpState,
    WireAhAttr, AH_ATTR_SIZE,
};
pub use codec::{decode_header, encode_header, Command, CommandHeader, Slot, HEADER_SIZE};
pub use error::{Result, WireError};
pub use event::{
    EventBody, EventKind, EventResponse, Presence, RepEventParams, ReqEventParams,
    SidrRepEventParams, EVENT_RESPONSE_SIZE, EVENT_UNION_SIZE, INFO_LEN,
};
pub use opcode::Opcode;
pub use path::{Gid, PathRecord, WirePathRec, PATH_RECORD_SIZE};
pub use request::{QpType, RepParams, ReqParams, SidrRepParams, SidrReqParams, MAX_VAR_LEN};
