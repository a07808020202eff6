//! Query responses: handle attributes and queue-pair attribute derivation.

use bytes::{Buf, BufMut, BytesMut};

use crate::error::{Result, WireError};
use crate::path::Gid;

/// Address-handle attribute on the wire: 16-byte GID + 16 bytes of fields.
pub const AH_ATTR_SIZE: usize = 32;

/// Size of the `INIT_QP_ATTR` response record.
pub const INIT_QP_ATTR_RESP_SIZE: usize = 144;

/// Size of the `ATTR_ID` response record.
pub const ATTR_ID_RESP_SIZE: usize = 24;

fn check_len(record: &'static str, src: &[u8], need: usize) -> Result<()> {
    if src.len() < need {
        return Err(WireError::Truncated {
            record,
            len: src.len(),
            need,
        });
    }
    Ok(())
}

/// Service binding and communication ids of one handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IdAttributes {
    pub service_id: u64,
    pub service_mask: u64,
    pub local_id: u32,
    pub remote_id: u32,
}

impl IdAttributes {
    /// Decode an `ATTR_ID` response record.
    pub fn decode(src: &[u8]) -> Result<Self> {
        check_len("attr_id response", src, ATTR_ID_RESP_SIZE)?;
        let mut buf = src;
        Ok(Self {
            service_id: buf.get_u64_le(),
            service_mask: buf.get_u64_le(),
            local_id: buf.get_u32_le(),
            remote_id: buf.get_u32_le(),
        })
    }

    /// Encode as an `ATTR_ID` response record.
    pub fn encode(&self, dst: &mut BytesMut) {
        dst.reserve(ATTR_ID_RESP_SIZE);
        dst.put_u64_le(self.service_id);
        dst.put_u64_le(self.service_mask);
        dst.put_u32_le(self.local_id);
        dst.put_u32_le(self.remote_id);
    }
}

/// Global routing header attributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GlobalRoute {
    pub dgid: Gid,
    pub flow_label: u32,
    pub sgid_index: u8,
    pub hop_limit: u8,
    pub traffic_class: u8,
}

/// Address-handle attributes used to reach the remote port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AhAttr {
    pub grh: GlobalRoute,
    pub dlid: u16,
    pub sl: u8,
    pub src_path_bits: u8,
    pub static_rate: u8,
    pub is_global: bool,
    pub port_num: u8,
}

/// Flat address-handle record exactly as the kernel lays it out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WireAhAttr {
    pub grh_dgid: [u8; 16],
    pub grh_flow_label: u32,
    pub dlid: u16,
    pub grh_sgid_index: u8,
    pub grh_hop_limit: u8,
    pub grh_traffic_class: u8,
    pub sl: u8,
    pub src_path_bits: u8,
    pub static_rate: u8,
    pub is_global: u8,
    pub port_num: u8,
}

impl WireAhAttr {
    pub fn encode(&self, dst: &mut BytesMut) {
        dst.reserve(AH_ATTR_SIZE);
        dst.put_slice(&self.grh_dgid);
        dst.put_u32_le(self.grh_flow_label);
        dst.put_u16_le(self.dlid);
        dst.put_u16_le(0);
        dst.put_u8(self.grh_sgid_index);
        dst.put_u8(self.grh_hop_limit);
        dst.put_u8(self.grh_traffic_class);
        dst.put_u8(self.sl);
        dst.put_u8(self.src_path_bits);
        dst.put_u8(self.static_rate);
        dst.put_u8(self.is_global);
        dst.put_u8(self.port_num);
    }

    pub(crate) fn read(buf: &mut &[u8]) -> Self {
        let mut grh_dgid = [0u8; 16];
        buf.copy_to_slice(&mut grh_dgid);
        let grh_flow_label = buf.get_u32_le();
        let dlid = buf.get_u16_le();
        buf.advance(2);
        Self {
            grh_dgid,
            grh_flow_label,
            dlid,
            grh_sgid_index: buf.get_u8(),
            grh_hop_limit: buf.get_u8(),
            grh_traffic_class: buf.get_u8(),
            sl: buf.get_u8(),
            src_path_bits: buf.get_u8(),
            static_rate: buf.get_u8(),
            is_global: buf.get_u8(),
            port_num: buf.get_u8(),
        }
    }
}

impl From<&WireAhAttr> for AhAttr {
    fn from(wire: &WireAhAttr) -> Self {
        Self {
            grh: GlobalRoute {
                dgid: Gid(wire.grh_dgid),
                flow_label: wire.grh_flow_label,
                sgid_index: wire.grh_sgid_index,
                hop_limit: wire.grh_hop_limit,
                traffic_class: wire.grh_traffic_class,
            },
            dlid: wire.dlid,
            sl: wire.sl,
            src_path_bits: wire.src_path_bits,
            static_rate: wire.static_rate,
            is_global: wire.is_global != 0,
            port_num: wire.port_num,
        }
    }
}

impl From<&AhAttr> for WireAhAttr {
    fn from(attr: &AhAttr) -> Self {
        Self {
            grh_dgid: attr.grh.dgid.0,
            grh_flow_label: attr.grh.flow_label,
            dlid: attr.dlid,
            grh_sgid_index: attr.grh.sgid_index,
            grh_hop_limit: attr.grh.hop_limit,
            grh_traffic_class: attr.grh.traffic_class,
            sl: attr.sl,
            src_path_bits: attr.src_path_bits,
            static_rate: attr.static_rate,
            is_global: u8::from(attr.is_global),
            port_num: attr.port_num,
        }
    }
}

/// Queue-pair states a caller can ask attributes for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum QpState {
    Reset = 0,
    Init = 1,
    Rtr = 2,
    Rts = 3,
    Sqd = 4,
    Sqe = 5,
    Err = 6,
}

impl QpState {
    pub fn as_u32(self) -> u32 {
        self as u32
    }
}

/// Bit set naming which [`QpAttr`] fields the kernel filled in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct QpAttrMask(pub u32);

impl QpAttrMask {
    pub const STATE: u32 = 1 << 0;
    pub const CUR_STATE: u32 = 1 << 1;
    pub const EN_SQD_ASYNC_NOTIFY: u32 = 1 << 2;
    pub const ACCESS_FLAGS: u32 = 1 << 3;
    pub const PKEY_INDEX: u32 = 1 << 4;
    pub const PORT: u32 = 1 << 5;
    pub const QKEY: u32 = 1 << 6;
    pub const AV: u32 = 1 << 7;
    pub const PATH_MTU: u32 = 1 << 8;
    pub const TIMEOUT: u32 = 1 << 9;
    pub const RETRY_CNT: u32 = 1 << 10;
    pub const RNR_RETRY: u32 = 1 << 11;
    pub const RQ_PSN: u32 = 1 << 12;
    pub const MAX_QP_RD_ATOMIC: u32 = 1 << 13;
    pub const ALT_PATH: u32 = 1 << 14;
    pub const MIN_RNR_TIMER: u32 = 1 << 15;
    pub const SQ_PSN: u32 = 1 << 16;
    pub const MAX_DEST_RD_ATOMIC: u32 = 1 << 17;
    pub const PATH_MIG_STATE: u32 = 1 << 18;
    pub const CAP: u32 = 1 << 19;
    pub const DEST_QPN: u32 = 1 << 20;

    pub fn contains(self, bits: u32) -> bool {
        self.0 & bits == bits
    }
}

/// Queue-pair capacity limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct QpCap {
    pub max_send_wr: u32,
    pub max_recv_wr: u32,
    pub max_send_sge: u32,
    pub max_recv_sge: u32,
    pub max_inline_data: u32,
}

/// Queue-pair attributes derived by the kernel for a state transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct QpAttr {
    pub qp_state: u32,
    pub cur_qp_state: u32,
    pub path_mtu: u32,
    pub path_mig_state: u32,
    pub qkey: u32,
    pub rq_psn: u32,
    pub sq_psn: u32,
    pub dest_qp_num: u32,
    pub qp_access_flags: u32,
    pub cap: QpCap,
    pub ah_attr: AhAttr,
    pub alt_ah_attr: AhAttr,
    pub pkey_index: u16,
    pub alt_pkey_index: u16,
    pub en_sqd_async_notify: u8,
    pub sq_draining: u8,
    pub max_rd_atomic: u8,
    pub max_dest_rd_atomic: u8,
    pub min_rnr_timer: u8,
    pub port_num: u8,
    pub timeout: u8,
    pub retry_cnt: u8,
    pub rnr_retry: u8,
    pub alt_port_num: u8,
    pub alt_timeout: u8,
}

/// Decoded `INIT_QP_ATTR` response: attribute values plus the mask naming
/// which of them are meaningful.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct InitQpAttr {
    pub mask: QpAttrMask,
    pub attr: QpAttr,
}

impl InitQpAttr {
    /// Decode an `INIT_QP_ATTR` response record.
    ///
    /// `qp_state` is the state the attributes were requested for; it is
    /// carried into [`QpAttr::qp_state`].
    pub fn decode(src: &[u8], qp_state: QpState) -> Result<Self> {
        check_len("init_qp_attr response", src, INIT_QP_ATTR_RESP_SIZE)?;
        let mut buf = &src[..INIT_QP_ATTR_RESP_SIZE];

        let mask = QpAttrMask(buf.get_u32_le());
        // Reported state is ignored in favour of the requested one.
        buf.advance(4);
        let cur_qp_state = buf.get_u32_le();
        let path_mtu = buf.get_u32_le();
        let path_mig_state = buf.get_u32_le();
        let qkey = buf.get_u32_le();
        let rq_psn = buf.get_u32_le();
        let sq_psn = buf.get_u32_le();
        let dest_qp_num = buf.get_u32_le();
        let qp_access_flags = buf.get_u32_le();
        let ah_attr = AhAttr::from(&WireAhAttr::read(&mut buf));
        let alt_ah_attr = AhAttr::from(&WireAhAttr::read(&mut buf));
        let cap = QpCap {
            max_send_wr: buf.get_u32_le(),
            max_recv_wr: buf.get_u32_le(),
            max_send_sge: buf.get_u32_le(),
            max_recv_sge: buf.get_u32_le(),
            max_inline_data: buf.get_u32_le(),
        };

        let attr = QpAttr {
            qp_state: qp_state.as_u32(),
            cur_qp_state,
            path_mtu,
            path_mig_state,
            qkey,
            rq_psn,
            sq_psn,
            dest_qp_num,
            qp_access_flags,
            cap,
            ah_attr,
            alt_ah_attr,
            pkey_index: buf.get_u16_le(),
            alt_pkey_index: buf.get_u16_le(),
            en_sqd_async_notify: buf.get_u8(),
            sq_draining: buf.get_u8(),
            max_rd_atomic: buf.get_u8(),
            max_dest_rd_atomic: buf.get_u8(),
            min_rnr_timer: buf.get_u8(),
            port_num: buf.get_u8(),
            timeout: buf.get_u8(),
            retry_cnt: buf.get_u8(),
            rnr_retry: buf.get_u8(),
            alt_port_num: buf.get_u8(),
            alt_timeout: buf.get_u8(),
        };

        Ok(Self { mask, attr })
    }

    /// Encode as an `INIT_QP_ATTR` response record.
    pub fn encode(&self, dst: &mut BytesMut) {
        let attr = &self.attr;
        dst.reserve(INIT_QP_ATTR_RESP_SIZE);
        dst.put_u32_le(self.mask.0);
        dst.put_u32_le(attr.qp_state);
        dst.put_u32_le(attr.cur_qp_state);
        dst.put_u32_le(attr.path_mtu);
        dst.put_u32_le(attr.path_mig_state);
        dst.put_u32_le(attr.qkey);
        dst.put_u32_le(attr.rq_psn);
        dst.put_u32_le(attr.sq_psn);
        dst.put_u32_le(attr.dest_qp_num);
        dst.put_u32_le(attr.qp_access_flags);
        WireAhAttr::from(&attr.ah_attr).encode(dst);
        WireAhAttr::from(&attr.alt_ah_attr).encode(dst);
        dst.put_u32_le(attr.cap.max_send_wr);
        dst.put_u32_le(attr.cap.max_recv_wr);
        dst.put_u32_le(attr.cap.max_send_sge);
        dst.put_u32_le(attr.cap.max_recv_sge);
        dst.put_u32_le(attr.cap.max_inline_data);
        dst.put_u16_le(attr.pkey_index);
        dst.put_u16_le(attr.alt_pkey_index);
        dst.put_u8(attr.en_sqd_async_notify);
        dst.put_u8(attr.sq_draining);
        dst.put_u8(attr.max_rd_atomic);
        dst.put_u8(attr.max_dest_rd_atomic);
        dst.put_u8(attr.min_rnr_timer);
        dst.put_u8(attr.port_num);
        dst.put_u8(attr.timeout);
        dst.put_u8(attr.retry_cnt);
        dst.put_u8(attr.rnr_retry);
        dst.put_u8(attr.alt_port_num);
        dst.put_u8(attr.alt_timeout);
        dst.put_bytes(0, 5);
    }
}
