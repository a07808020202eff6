//! Command encoders, one per opcode, plus the parameter sets they carry.
//!
//! Each encoder returns a [`Command`] whose payload matches the opcode's
//! fixed layout. Response records and variable-length buffers are attached
//! as pointer slots.

use bytes::{Buf, Bytes};

use crate::attr::QpState;
use crate::codec::{Command, Slot};
use crate::error::{Result, WireError};
use crate::opcode::Opcode;
use crate::path::PathRecord;

/// Largest length an 8-bit length field can describe. Event fetches ask for
/// this much private data and info ("give me everything").
pub const MAX_VAR_LEN: u8 = u8::MAX;

/// Transport service type of a queue pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u32)]
pub enum QpType {
    #[default]
    Rc = 2,
    Uc = 3,
    Ud = 4,
}

impl QpType {
    pub fn as_u32(self) -> u32 {
        self as u32
    }
}

/// Parameters of an outbound connection request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReqParams {
    pub primary_path: PathRecord,
    pub alternate_path: Option<PathRecord>,
    pub service_id: u64,
    pub qp_num: u32,
    pub qp_type: QpType,
    pub starting_psn: u32,
    pub private_data: Bytes,
    pub peer_to_peer: bool,
    pub responder_resources: u8,
    pub initiator_depth: u8,
    pub remote_cm_response_timeout: u8,
    pub flow_control: bool,
    pub local_cm_response_timeout: u8,
    pub retry_count: u8,
    pub rnr_retry_count: u8,
    pub max_cm_retries: u8,
    pub srq: bool,
}

/// Parameters of a connection reply.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RepParams {
    pub qp_num: u32,
    pub starting_psn: u32,
    pub private_data: Bytes,
    pub responder_resources: u8,
    pub initiator_depth: u8,
    pub target_ack_delay: u8,
    pub failover_accepted: u8,
    pub flow_control: bool,
    pub rnr_retry_count: u8,
    pub srq: bool,
}

/// Parameters of a datagram-style service id resolution request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SidrReqParams {
    pub path: PathRecord,
    pub service_id: u64,
    pub timeout_ms: u32,
    pub pkey: u16,
    pub max_cm_retries: u8,
    pub private_data: Bytes,
}

/// Parameters of a datagram-style service id resolution reply.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SidrRepParams {
    pub qp_num: u32,
    pub qkey: u32,
    pub status: u32,
    pub info: Bytes,
    pub private_data: Bytes,
}

fn var_len(field: &'static str, data: &[u8]) -> Result<u8> {
    u8::try_from(data.len()).map_err(|_| WireError::TooLong {
        field,
        len: data.len(),
        max: MAX_VAR_LEN as usize,
    })
}

/// `CREATE_ID {uid, response}` carrying the local tag of the new handle.
pub fn create_id(uid: u64) -> Result<Command> {
    let mut cmd = Command::new(Opcode::CreateId);
    cmd.put_u64(uid);
    cmd.put_response()?;
    Ok(cmd.finish())
}

/// `DESTROY_ID {response, id}`.
pub fn destroy_id(id: u32) -> Result<Command> {
    let mut cmd = Command::new(Opcode::DestroyId);
    cmd.put_response()?;
    cmd.put_u32(id);
    cmd.put_zeros(4);
    Ok(cmd.finish())
}

/// `ATTR_ID {response, id}`.
pub fn attr_id(id: u32) -> Result<Command> {
    let mut cmd = Command::new(Opcode::AttrId);
    cmd.put_response()?;
    cmd.put_u32(id);
    cmd.put_zeros(4);
    Ok(cmd.finish())
}

/// `INIT_QP_ATTR {response, id, qp_state}`.
pub fn init_qp_attr(id: u32, qp_state: QpState) -> Result<Command> {
    let mut cmd = Command::new(Opcode::InitQpAttr);
    cmd.put_response()?;
    cmd.put_u32(id);
    cmd.put_u32(qp_state.as_u32());
    Ok(cmd.finish())
}

/// `LISTEN {service_id, service_mask, id}`.
pub fn listen(id: u32, service_id: u64, service_mask: u64) -> Command {
    let mut cmd = Command::new(Opcode::Listen);
    cmd.put_u64(service_id);
    cmd.put_u64(service_mask);
    cmd.put_u32(id);
    cmd.put_zeros(4);
    cmd.finish()
}

/// `ESTABLISH {id}`.
pub fn establish(id: u32) -> Command {
    let mut cmd = Command::new(Opcode::Establish);
    cmd.put_u32(id);
    cmd.put_zeros(4);
    cmd.finish()
}

/// `{data, id, len}` shared by `SEND_RTU`, `SEND_DREQ` and `SEND_DREP`.
pub fn private_data(opcode: Opcode, id: u32, data: Bytes) -> Result<Command> {
    debug_assert!(matches!(
        opcode,
        Opcode::SendRtu | Opcode::SendDreq | Opcode::SendDrep
    ));
    let len = var_len("private data", &data)?;
    let mut cmd = Command::new(opcode);
    cmd.put_input(Slot::Data, data);
    cmd.put_u32(id);
    cmd.put_u8(len);
    cmd.put_zeros(3);
    Ok(cmd.finish())
}

/// `SEND_REQ`.
pub fn req(id: u32, param: &ReqParams) -> Result<Command> {
    let len = var_len("private data", &param.private_data)?;
    let mut cmd = Command::new(Opcode::SendReq);
    cmd.put_u32(id);
    cmd.put_u32(param.qp_num);
    cmd.put_u32(param.qp_type.as_u32());
    cmd.put_u32(param.starting_psn);
    cmd.put_u64(param.service_id);
    cmd.put_input(Slot::Data, param.private_data.clone());
    cmd.put_input(Slot::PrimaryPath, param.primary_path.to_bytes());
    match &param.alternate_path {
        Some(path) => cmd.put_input(Slot::AlternatePath, path.to_bytes()),
        None => cmd.put_null(),
    }
    cmd.put_u8(len);
    cmd.put_u8(u8::from(param.peer_to_peer));
    cmd.put_u8(param.responder_resources);
    cmd.put_u8(param.initiator_depth);
    cmd.put_u8(param.remote_cm_response_timeout);
    cmd.put_u8(u8::from(param.flow_control));
    cmd.put_u8(param.local_cm_response_timeout);
    cmd.put_u8(param.retry_count);
    cmd.put_u8(param.rnr_retry_count);
    cmd.put_u8(param.max_cm_retries);
    cmd.put_u8(u8::from(param.srq));
    cmd.put_zeros(5);
    Ok(cmd.finish())
}

/// `SEND_REP`. `uid` is the replying handle's local tag so the kernel can
/// tag later notifications for a handle created by an inbound request.
pub fn rep(uid: u64, id: u32, param: &RepParams) -> Result<Command> {
    let len = var_len("private data", &param.private_data)?;
    let mut cmd = Command::new(Opcode::SendRep);
    cmd.put_u64(uid);
    cmd.put_input(Slot::Data, param.private_data.clone());
    cmd.put_u32(id);
    cmd.put_u32(param.qp_num);
    cmd.put_u32(param.starting_psn);
    cmd.put_u8(param.responder_resources);
    cmd.put_u8(param.initiator_depth);
    cmd.put_u8(param.target_ack_delay);
    cmd.put_u8(param.failover_accepted);
    cmd.put_u8(u8::from(param.flow_control));
    cmd.put_u8(param.rnr_retry_count);
    cmd.put_u8(u8::from(param.srq));
    cmd.put_u8(len);
    cmd.put_zeros(4);
    Ok(cmd.finish())
}

/// `{id, status, info, data}` shared by `SEND_REJ` and `SEND_APR`.
pub fn status_info(
    opcode: Opcode,
    id: u32,
    status: u32,
    info: Bytes,
    data: Bytes,
) -> Result<Command> {
    debug_assert!(matches!(opcode, Opcode::SendRej | Opcode::SendApr));
    let info_len = var_len("info", &info)?;
    let data_len = var_len("private data", &data)?;
    let mut cmd = Command::new(opcode);
    cmd.put_u32(id);
    cmd.put_u32(status);
    cmd.put_input(Slot::Info, info);
    cmd.put_input(Slot::Data, data);
    cmd.put_u8(info_len);
    cmd.put_u8(data_len);
    cmd.put_zeros(6);
    Ok(cmd.finish())
}

/// `SEND_MRA`.
pub fn mra(id: u32, service_timeout: u8, data: Bytes) -> Result<Command> {
    let len = var_len("private data", &data)?;
    let mut cmd = Command::new(Opcode::SendMra);
    cmd.put_input(Slot::Data, data);
    cmd.put_u32(id);
    cmd.put_u8(len);
    cmd.put_u8(service_timeout);
    cmd.put_zeros(2);
    Ok(cmd.finish())
}

/// `SEND_LAP`.
pub fn lap(id: u32, alternate_path: &PathRecord, data: Bytes) -> Result<Command> {
    let len = var_len("private data", &data)?;
    let mut cmd = Command::new(Opcode::SendLap);
    cmd.put_input(Slot::AlternatePath, alternate_path.to_bytes());
    cmd.put_input(Slot::Data, data);
    cmd.put_u32(id);
    cmd.put_u8(len);
    cmd.put_zeros(3);
    Ok(cmd.finish())
}

/// `SEND_SIDR_REQ`.
pub fn sidr_req(id: u32, param: &SidrReqParams) -> Result<Command> {
    let len = var_len("private data", &param.private_data)?;
    let mut cmd = Command::new(Opcode::SendSidrReq);
    cmd.put_u32(id);
    cmd.put_u32(param.timeout_ms);
    cmd.put_u64(param.service_id);
    cmd.put_input(Slot::Data, param.private_data.clone());
    cmd.put_input(Slot::PrimaryPath, param.path.to_bytes());
    cmd.put_u16(param.pkey);
    cmd.put_u8(len);
    cmd.put_u8(param.max_cm_retries);
    cmd.put_zeros(4);
    Ok(cmd.finish())
}

/// `SEND_SIDR_REP`.
pub fn sidr_rep(id: u32, param: &SidrRepParams) -> Result<Command> {
    let info_len = var_len("info", &param.info)?;
    let data_len = var_len("private data", &param.private_data)?;
    let mut cmd = Command::new(Opcode::SendSidrRep);
    cmd.put_u32(id);
    cmd.put_u32(param.qp_num);
    cmd.put_u32(param.qkey);
    cmd.put_u32(param.status);
    cmd.put_input(Slot::Info, param.info.clone());
    cmd.put_input(Slot::Data, param.private_data.clone());
    cmd.put_u8(info_len);
    cmd.put_u8(data_len);
    cmd.put_zeros(6);
    Ok(cmd.finish())
}

/// `EVENT {response, data, info, data_len, info_len}`.
///
/// Both scratch buffers are allocated at `scratch_len` bytes up front; a
/// zero length leaves the slot null.
pub fn event_get(scratch_len: u8) -> Result<Command> {
    let mut cmd = Command::new(Opcode::Event);
    cmd.put_response()?;
    if scratch_len == 0 {
        cmd.put_null();
        cmd.put_null();
    } else {
        cmd.put_output(Slot::Data, scratch_len as usize)?;
        cmd.put_output(Slot::Info, scratch_len as usize)?;
    }
    cmd.put_u8(scratch_len);
    cmd.put_u8(scratch_len);
    cmd.put_zeros(6);
    Ok(cmd.finish())
}

/// Read the new kernel id from a `CREATE_ID` response.
pub fn decode_create_id_resp(src: &[u8]) -> Result<u32> {
    read_u32("create_id response", src)
}

/// Read `events_reported` from a `DESTROY_ID` response.
pub fn decode_destroy_id_resp(src: &[u8]) -> Result<u32> {
    read_u32("destroy_id response", src)
}

fn read_u32(record: &'static str, src: &[u8]) -> Result<u32> {
    if src.len() < 4 {
        return Err(WireError::Truncated {
            record,
            len: src.len(),
            need: 4,
        });
    }
    let mut buf = src;
    Ok(buf.get_u32_le())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::HEADER_SIZE;

    fn field_u32(payload: &[u8], at: usize) -> u32 {
        let mut raw = [0u8; 4];
        raw.copy_from_slice(&payload[at..at + 4]);
        u32::from_le_bytes(raw)
    }

    #[test]
    fn every_encoder_matches_its_layout() {
        let commands = vec![
            create_id(1).unwrap(),
            destroy_id(2).unwrap(),
            attr_id(3).unwrap(),
            init_qp_attr(4, QpState::Rtr).unwrap(),
            listen(5, 0x10, u64::MAX),
            establish(6),
            private_data(Opcode::SendRtu, 7, Bytes::from_static(b"rtu")).unwrap(),
            req(8, &ReqParams::default()).unwrap(),
            rep(99, 9, &RepParams::default()).unwrap(),
            status_info(Opcode::SendRej, 10, 28, Bytes::new(), Bytes::new()).unwrap(),
            mra(11, 20, Bytes::new()).unwrap(),
            lap(12, &PathRecord::default(), Bytes::new()).unwrap(),
            sidr_req(13, &SidrReqParams::default()).unwrap(),
            sidr_rep(14, &SidrRepParams::default()).unwrap(),
            event_get(MAX_VAR_LEN).unwrap(),
        ];

        for cmd in commands {
            let op = cmd.opcode();
            assert_eq!(cmd.payload().len(), op.payload_len(), "{op}");
            assert_eq!(cmd.wire_len(), HEADER_SIZE + op.payload_len(), "{op}");
            assert_eq!(cmd.header().out_len as usize, op.response_len(), "{op}");
            assert_eq!(cmd.has_slot(Slot::Response), op.expects_response(), "{op}");
        }
    }

    #[test]
    fn req_attaches_paths_and_private_data() {
        let primary = PathRecord {
            dlid: 1,
            slid: 2,
            ..PathRecord::default()
        };
        let alternate = PathRecord {
            dlid: 3,
            slid: 4,
            ..PathRecord::default()
        };
        let param = ReqParams {
            primary_path: primary,
            alternate_path: Some(alternate),
            service_id: 0x1234,
            qp_num: 0x55,
            private_data: Bytes::from_static(b"hello"),
            ..ReqParams::default()
        };

        let cmd = req(42, &param).unwrap();
        let payload = cmd.payload();
        assert_eq!(field_u32(payload, 0), 42);
        assert_eq!(field_u32(payload, 4), 0x55);
        assert_eq!(field_u32(payload, 8), QpType::Rc.as_u32());
        assert_eq!(payload[48], 5);
        assert_eq!(cmd.slot_offset(Slot::Data), Some(24));
        assert_eq!(cmd.slot_offset(Slot::PrimaryPath), Some(32));
        assert_eq!(cmd.slot_offset(Slot::AlternatePath), Some(40));
        assert_eq!(cmd.input(Slot::Data), Some(&b"hello"[..]));
        assert_eq!(
            PathRecord::from_bytes(cmd.input(Slot::PrimaryPath).unwrap()).unwrap(),
            primary
        );
        assert_eq!(
            PathRecord::from_bytes(cmd.input(Slot::AlternatePath).unwrap()).unwrap(),
            alternate
        );
    }

    #[test]
    fn req_without_alternate_leaves_slot_null() {
        let cmd = req(1, &ReqParams::default()).unwrap();
        assert!(cmd.has_slot(Slot::PrimaryPath));
        assert!(!cmd.has_slot(Slot::AlternatePath));
        assert_eq!(&cmd.payload()[40..48], &[0u8; 8]);
    }

    #[test]
    fn oversized_private_data_rejected() {
        let data = Bytes::from(vec![0u8; 256]);
        let err = private_data(Opcode::SendDreq, 1, data).unwrap_err();
        assert!(matches!(
            err,
            WireError::TooLong {
                len: 256,
                max: 255,
                ..
            }
        ));
    }

    #[test]
    fn rep_carries_local_tag() {
        let cmd = rep(0xdead_beef, 7, &RepParams::default()).unwrap();
        let mut raw = [0u8; 8];
        raw.copy_from_slice(&cmd.payload()[..8]);
        assert_eq!(u64::from_le_bytes(raw), 0xdead_beef);
        assert_eq!(field_u32(cmd.payload(), 16), 7);
    }

    #[test]
    fn event_get_requests_maximum_buffers() {
        let cmd = event_get(MAX_VAR_LEN).unwrap();
        assert_eq!(cmd.output(Slot::Data).map(<[u8]>::len), Some(255));
        assert_eq!(cmd.output(Slot::Info).map(<[u8]>::len), Some(255));
        assert_eq!(cmd.payload()[24], 255);
        assert_eq!(cmd.payload()[25], 255);
    }

    #[test]
    fn event_get_without_scratch() {
        let cmd = event_get(0).unwrap();
        assert!(!cmd.has_slot(Slot::Data));
        assert!(!cmd.has_slot(Slot::Info));
        assert!(cmd.has_slot(Slot::Response));
    }

    #[test]
    fn decode_short_responses() {
        assert_eq!(decode_create_id_resp(&7u32.to_le_bytes()).unwrap(), 7);
        assert!(matches!(
            decode_destroy_id_resp(&[1, 2]),
            Err(WireError::Truncated { .. })
        ));
    }
}
