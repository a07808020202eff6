//! Command opcodes understood by the kernel connection manager.
//!
//! Each opcode fixes the size of its payload record and of the response
//! record the kernel writes back. Fire-and-forget commands have no response.

/// Command opcode carried in the header of every command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum Opcode {
    CreateId = 0,
    DestroyId = 1,
    AttrId = 2,
    Listen = 3,
    Establish = 4,
    SendReq = 5,
    SendRep = 6,
    SendRtu = 7,
    SendDreq = 8,
    SendDrep = 9,
    SendRej = 10,
    SendMra = 11,
    SendLap = 12,
    SendApr = 13,
    SendSidrReq = 14,
    SendSidrRep = 15,
    Event = 16,
    InitQpAttr = 17,
}

impl Opcode {
    /// All opcodes in wire order.
    pub const ALL: [Opcode; 18] = [
        Opcode::CreateId,
        Opcode::DestroyId,
        Opcode::AttrId,
        Opcode::Listen,
        Opcode::Establish,
        Opcode::SendReq,
        Opcode::SendRep,
        Opcode::SendRtu,
        Opcode::SendDreq,
        Opcode::SendDrep,
        Opcode::SendRej,
        Opcode::SendMra,
        Opcode::SendLap,
        Opcode::SendApr,
        Opcode::SendSidrReq,
        Opcode::SendSidrRep,
        Opcode::Event,
        Opcode::InitQpAttr,
    ];

    /// Raw value written into the command header.
    pub fn as_u32(self) -> u32 {
        self as u32
    }

    /// Look up an opcode by its raw header value.
    pub fn from_raw(raw: u32) -> Option<Self> {
        Self::ALL.get(raw as usize).copied()
    }

    /// Size of the fixed payload record that follows the header.
    pub fn payload_len(self) -> usize {
        match self {
            Opcode::CreateId | Opcode::DestroyId | Opcode::AttrId | Opcode::InitQpAttr => 16,
            Opcode::Listen => 24,
            Opcode::Establish => 8,
            Opcode::SendRtu | Opcode::SendDreq | Opcode::SendDrep | Opcode::SendMra => 16,
            Opcode::SendReq => 64,
            Opcode::SendRep => 40,
            Opcode::SendRej | Opcode::SendApr => 32,
            Opcode::SendLap => 24,
            Opcode::SendSidrReq | Opcode::SendSidrRep => 40,
            Opcode::Event => 32,
        }
    }

    /// Size of the response record, or 0 when the command expects none.
    pub fn response_len(self) -> usize {
        match self {
            Opcode::CreateId | Opcode::DestroyId => 4,
            Opcode::AttrId => 24,
            Opcode::InitQpAttr => crate::attr::INIT_QP_ATTR_RESP_SIZE,
            Opcode::Event => crate::event::EVENT_RESPONSE_SIZE,
            _ => 0,
        }
    }

    /// Returns true if the kernel writes a response record for this opcode.
    pub fn expects_response(self) -> bool {
        self.response_len() > 0
    }

    /// Human-readable name for diagnostics.
    pub fn name(self) -> &'static str {
        match self {
            Opcode::CreateId => "CREATE_ID",
            Opcode::DestroyId => "DESTROY_ID",
            Opcode::AttrId => "ATTR_ID",
            Opcode::Listen => "LISTEN",
            Opcode::Establish => "ESTABLISH",
            Opcode::SendReq => "SEND_REQ",
            Opcode::SendRep => "SEND_REP",
            Opcode::SendRtu => "SEND_RTU",
            Opcode::SendDreq => "SEND_DREQ",
            Opcode::SendDrep => "SEND_DREP",
            Opcode::SendRej => "SEND_REJ",
            Opcode::SendMra => "SEND_MRA",
            Opcode::SendLap => "SEND_LAP",
            Opcode::SendApr => "SEND_APR",
            Opcode::SendSidrReq => "SEND_SIDR_REQ",
            Opcode::SendSidrRep => "SEND_SIDR_REP",
            Opcode::Event => "EVENT",
            Opcode::InitQpAttr => "INIT_QP_ATTR",
        }
    }
}

impl std::fmt::Display for Opcode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
