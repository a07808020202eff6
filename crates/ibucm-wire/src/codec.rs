use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{Result, WireError};
use crate::opcode::Opcode;

/// Command header: opcode (4) + input length (2) + output length (2) = 8 bytes.
pub const HEADER_SIZE: usize = 8;

/// Header that precedes every command payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandHeader {
    /// Raw opcode value.
    pub opcode: u32,
    /// Length of the payload record that follows the header.
    pub in_len: u16,
    /// Length of the response record the kernel writes back.
    pub out_len: u16,
}

/// Encode a command header.
///
/// Wire format:
/// ```text
/// ┌──────────────┬───────────┬───────────┐
/// │ Opcode       │ In        │ Out       │
/// │ (4B LE)      │ (2B LE)   │ (2B LE)   │
/// └──────────────┴───────────┴───────────┘
/// ```
pub fn encode_header(header: &CommandHeader, dst: &mut BytesMut) {
    dst.reserve(HEADER_SIZE);
    dst.put_u32_le(header.opcode);
    dst.put_u16_le(header.in_len);
    dst.put_u16_le(header.out_len);
}

/// Decode a command header from the start of `src`.
pub fn decode_header(src: &[u8]) -> Result<CommandHeader> {
    if src.len() < HEADER_SIZE {
        return Err(WireError::Truncated {
            record: "command header",
            len: src.len(),
            need: HEADER_SIZE,
        });
    }
    let mut opcode = [0u8; 4];
    opcode.copy_from_slice(&src[0..4]);
    let mut in_len = [0u8; 2];
    in_len.copy_from_slice(&src[4..6]);
    let mut out_len = [0u8; 2];
    out_len.copy_from_slice(&src[6..8]);
    Ok(CommandHeader {
        opcode: u32::from_le_bytes(opcode),
        in_len: u16::from_le_bytes(in_len),
        out_len: u16::from_le_bytes(out_len),
    })
}

/// Named pointer slot inside a command payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Slot {
    /// Fixed-size response record written by the kernel.
    Response,
    /// Application private data (input on sends, output on event fetch).
    Data,
    /// Additional information bytes (rejection ARI, APR info, SIDR info).
    Info,
    /// Primary path record.
    PrimaryPath,
    /// Alternate path record.
    AlternatePath,
}

#[derive(Debug)]
enum SlotBuffer {
    Input(Bytes),
    Output(Vec<u8>),
}

#[derive(Debug)]
struct Attachment {
    slot: Slot,
    offset: usize,
    buffer: SlotBuffer,
}

/// One command ready to be written to the kernel channel.
///
/// The payload is a fixed-size record. Pointer fields are stored as zero and
/// the buffers behind them are owned by the command, so they live exactly as
/// long as one encode/transfer/decode cycle. Output buffers are zero-filled
/// when attached and can be claimed with [`Command::take_output`] once the
/// transfer completed.
#[derive(Debug)]
pub struct Command {
    opcode: Opcode,
    payload: BytesMut,
    attachments: Vec<Attachment>,
}

impl Command {
    /// Start an empty command for `opcode`.
    pub fn new(opcode: Opcode) -> Self {
        Self {
            opcode,
            payload: BytesMut::with_capacity(opcode.payload_len()),
            attachments: Vec::new(),
        }
    }

    /// The command opcode.
    pub fn opcode(&self) -> Opcode {
        self.opcode
    }

    /// The header describing this command.
    pub fn header(&self) -> CommandHeader {
        CommandHeader {
            opcode: self.opcode.as_u32(),
            in_len: self.payload.len() as u16,
            out_len: self.opcode.response_len() as u16,
        }
    }

    /// The payload record with pointer slots zeroed.
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Total number of bytes a single write must accept (header + payload).
    pub fn wire_len(&self) -> usize {
        HEADER_SIZE + self.payload.len()
    }

    /// Header and payload with pointer slots left as zero.
    pub fn encode(&self) -> BytesMut {
        let mut dst = BytesMut::with_capacity(self.wire_len());
        encode_header(&self.header(), &mut dst);
        dst.put_slice(&self.payload);
        dst
    }

    /// Header and payload with each pointer slot set to the address of its
    /// attached buffer.
    ///
    /// The addresses stay valid while `self` is neither moved nor dropped;
    /// the kernel writes output buffers through them during the write call.
    pub fn encode_with_addresses(&mut self) -> BytesMut {
        let mut dst = self.encode();
        for attachment in &mut self.attachments {
            let address = match &mut attachment.buffer {
                SlotBuffer::Input(data) => data.as_ptr() as u64,
                SlotBuffer::Output(buf) => buf.as_mut_ptr() as u64,
            };
            let start = HEADER_SIZE + attachment.offset;
            dst[start..start + 8].copy_from_slice(&address.to_le_bytes());
        }
        tracing::trace!(
            opcode = %self.opcode,
            slots = self.attachments.len(),
            len = dst.len(),
            "encoded command"
        );
        dst
    }

    /// Returns true if a buffer is attached to `slot`.
    pub fn has_slot(&self, slot: Slot) -> bool {
        self.attachment(slot).is_some()
    }

    /// Payload offset of the pointer field for `slot`.
    pub fn slot_offset(&self, slot: Slot) -> Option<usize> {
        self.attachment(slot).map(|a| a.offset)
    }

    /// Borrow an input buffer the kernel will read.
    pub fn input(&self, slot: Slot) -> Option<&[u8]> {
        match &self.attachment(slot)?.buffer {
            SlotBuffer::Input(data) => Some(data.as_ref()),
            SlotBuffer::Output(_) => None,
        }
    }

    /// Borrow an output buffer.
    pub fn output(&self, slot: Slot) -> Option<&[u8]> {
        match &self.attachment(slot)?.buffer {
            SlotBuffer::Output(buf) => Some(buf.as_slice()),
            SlotBuffer::Input(_) => None,
        }
    }

    /// Mutably borrow an output buffer (the kernel side of a transfer).
    pub fn output_mut(&mut self, slot: Slot) -> Option<&mut [u8]> {
        let attachment = self.attachments.iter_mut().find(|a| a.slot == slot)?;
        match &mut attachment.buffer {
            SlotBuffer::Output(buf) => Some(buf.as_mut_slice()),
            SlotBuffer::Input(_) => None,
        }
    }

    /// The response record, if this opcode expects one.
    pub fn response(&self) -> Option<&[u8]> {
        self.output(Slot::Response)
    }

    /// Mutable response record.
    pub fn response_mut(&mut self) -> Option<&mut [u8]> {
        self.output_mut(Slot::Response)
    }

    /// Move an output buffer out of the command.
    ///
    /// The slot keeps pointing at nothing afterwards; buffers never claimed
    /// are released with the command.
    pub fn take_output(&mut self, slot: Slot) -> Option<Vec<u8>> {
        let index = self.attachments.iter().position(|a| {
            a.slot == slot && matches!(a.buffer, SlotBuffer::Output(_))
        })?;
        match self.attachments.swap_remove(index).buffer {
            SlotBuffer::Output(buf) => Some(buf),
            SlotBuffer::Input(_) => None,
        }
    }

    fn attachment(&self, slot: Slot) -> Option<&Attachment> {
        self.attachments.iter().find(|a| a.slot == slot)
    }

    pub(crate) fn put_u8(&mut self, value: u8) {
        self.payload.put_u8(value);
    }

    pub(crate) fn put_u16(&mut self, value: u16) {
        self.payload.put_u16_le(value);
    }

    pub(crate) fn put_u32(&mut self, value: u32) {
        self.payload.put_u32_le(value);
    }

    pub(crate) fn put_u64(&mut self, value: u64) {
        self.payload.put_u64_le(value);
    }

    pub(crate) fn put_zeros(&mut self, count: usize) {
        self.payload.put_bytes(0, count);
    }

    /// Write a null pointer field.
    pub(crate) fn put_null(&mut self) {
        self.payload.put_u64_le(0);
    }

    /// Write a pointer field backed by a zero-filled output buffer of `len` bytes.
    pub(crate) fn put_output(&mut self, slot: Slot, len: usize) -> Result<()> {
        let mut buf = Vec::new();
        buf.try_reserve_exact(len)
            .map_err(|_| WireError::OutOfMemory(len))?;
        buf.resize(len, 0);
        self.attach(slot, SlotBuffer::Output(buf));
        Ok(())
    }

    /// Write a pointer field backed by `data`, or a null field when empty.
    pub(crate) fn put_input(&mut self, slot: Slot, data: Bytes) {
        if data.is_empty() {
            self.put_null();
        } else {
            self.attach(slot, SlotBuffer::Input(data));
        }
    }

    /// Write the response pointer field for this opcode.
    pub(crate) fn put_response(&mut self) -> Result<()> {
        let len = self.opcode.response_len();
        self.put_output(Slot::Response, len)
    }

    fn attach(&mut self, slot: Slot, buffer: SlotBuffer) {
        let offset = self.payload.len();
        self.payload.put_u64_le(0);
        self.attachments.push(Attachment {
            slot,
            offset,
            buffer,
        });
    }

    pub(crate) fn finish(self) -> Self {
        debug_assert_eq!(
            self.payload.len(),
            self.opcode.payload_len(),
            "{} payload layout",
            self.opcode
        );
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_encode_decode() {
        let header = CommandHeader {
            opcode: 16,
            in_len: 32,
            out_len: 184,
        };
        let mut buf = BytesMut::new();
        encode_header(&header, &mut buf);
        assert_eq!(buf.len(), HEADER_SIZE);
        assert_eq!(&buf[..4], &16u32.to_le_bytes());
        assert_eq!(decode_header(&buf).unwrap(), header);
    }

    #[test]
    fn decode_truncated_header() {
        let err = decode_header(&[0x10, 0x00, 0x00]).unwrap_err();
        assert!(matches!(
            err,
            WireError::Truncated {
                len: 3,
                need: HEADER_SIZE,
                ..
            }
        ));
    }

    #[test]
    fn encode_leaves_pointer_slots_zero() {
        let mut cmd = Command::new(Opcode::CreateId);
        cmd.put_u64(7);
        cmd.put_response().unwrap();
        let cmd = cmd.finish();

        let wire = cmd.encode();
        assert_eq!(wire.len(), cmd.wire_len());
        assert_eq!(&wire[HEADER_SIZE + 8..], &[0u8; 8]);
        assert_eq!(cmd.slot_offset(Slot::Response), Some(8));
    }

    #[test]
    fn encode_with_addresses_points_at_owned_buffers() {
        let mut cmd = Command::new(Opcode::SendRtu);
        cmd.put_input(Slot::Data, Bytes::from_static(b"hello"));
        cmd.put_u32(3);
        cmd.put_u8(5);
        cmd.put_zeros(3);
        let mut cmd = cmd.finish();

        let expected = cmd.input(Slot::Data).unwrap().as_ptr() as u64;
        let wire = cmd.encode_with_addresses();
        let mut address = [0u8; 8];
        address.copy_from_slice(&wire[HEADER_SIZE..HEADER_SIZE + 8]);
        assert_eq!(u64::from_le_bytes(address), expected);
    }

    #[test]
    fn empty_input_is_a_null_slot() {
        let mut cmd = Command::new(Opcode::SendRtu);
        cmd.put_input(Slot::Data, Bytes::new());
        assert!(!cmd.has_slot(Slot::Data));
        assert_eq!(cmd.payload(), &[0u8; 8]);
    }

    #[test]
    fn take_output_moves_buffer_out() {
        let mut cmd = Command::new(Opcode::Event);
        cmd.put_response().unwrap();
        cmd.put_output(Slot::Data, 255).unwrap();

        cmd.output_mut(Slot::Data).unwrap()[0] = 0xAB;
        let data = cmd.take_output(Slot::Data).unwrap();
        assert_eq!(data.len(), 255);
        assert_eq!(data[0], 0xAB);
        assert!(cmd.take_output(Slot::Data).is_none());
        assert!(cmd.response().is_some());
    }

    #[test]
    fn inputs_are_not_outputs() {
        let mut cmd = Command::new(Opcode::SendRtu);
        cmd.put_input(Slot::Data, Bytes::from_static(b"x"));
        assert!(cmd.output(Slot::Data).is_none());
        assert!(cmd.take_output(Slot::Data).is_none());
        assert_eq!(cmd.input(Slot::Data), Some(&b"x"[..]));
    }
}
