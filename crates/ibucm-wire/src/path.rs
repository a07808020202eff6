use std::fmt;

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{Result, WireError};

/// Path record on the wire: 2 GIDs + 48 bytes of scalar fields = 64 bytes.
pub const PATH_RECORD_SIZE: usize = 64;

/// 128-bit global identifier of a port, kept as raw bytes in network order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Gid(pub [u8; 16]);

impl Gid {
    /// Build a GID from a subnet prefix and an interface id.
    pub fn from_parts(subnet_prefix: u64, interface_id: u64) -> Self {
        let mut raw = [0u8; 16];
        raw[..8].copy_from_slice(&subnet_prefix.to_be_bytes());
        raw[8..].copy_from_slice(&interface_id.to_be_bytes());
        Self(raw)
    }

    /// Raw GID bytes.
    pub fn raw(&self) -> &[u8; 16] {
        &self.0
    }
}

impl fmt::Display for Gid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, pair) in self.0.chunks(2).enumerate() {
            if i > 0 {
                f.write_str(":")?;
            }
            write!(f, "{:02x}{:02x}", pair[0], pair[1])?;
        }
        Ok(())
    }
}

/// Route and QoS description of one path between two ports.
///
/// Selector fields (`mtu_selector`, `rate_selector`,
/// `packet_life_time_selector`) and enumerated values (`mtu`, `rate`) carry
/// the fabric's raw encodings unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PathRecord {
    pub dgid: Gid,
    pub sgid: Gid,
    pub dlid: u16,
    pub slid: u16,
    pub raw_traffic: bool,
    pub flow_label: u32,
    pub hop_limit: u8,
    pub traffic_class: u8,
    pub reversible: bool,
    pub numb_path: u8,
    pub pkey: u16,
    pub sl: u8,
    pub mtu_selector: u8,
    pub mtu: u32,
    pub rate_selector: u8,
    pub rate: u8,
    pub packet_life_time_selector: u8,
    pub packet_life_time: u8,
    pub preference: u8,
}

impl PathRecord {
    /// Encode this path into its 64-byte wire form.
    pub fn to_bytes(&self) -> Bytes {
        let mut dst = BytesMut::with_capacity(PATH_RECORD_SIZE);
        WirePathRec::from(self).encode(&mut dst);
        dst.freeze()
    }

    /// Decode a path from its wire form.
    pub fn from_bytes(src: &[u8]) -> Result<Self> {
        WirePathRec::decode(src).map(|wire| PathRecord::from(&wire))
    }
}

/// Flat path record exactly as the kernel lays it out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WirePathRec {
    pub dgid: [u8; 16],
    pub sgid: [u8; 16],
    pub dlid: u16,
    pub slid: u16,
    pub raw_traffic: u32,
    pub flow_label: u32,
    pub reversible: u32,
    pub mtu: u32,
    pub pkey: u16,
    pub hop_limit: u8,
    pub traffic_class: u8,
    pub numb_path: u8,
    pub sl: u8,
    pub mtu_selector: u8,
    pub rate_selector: u8,
    pub rate: u8,
    pub packet_life_time_selector: u8,
    pub packet_life_time: u8,
    pub preference: u8,
}

impl WirePathRec {
    /// Append the 64-byte record to `dst`.
    pub fn encode(&self, dst: &mut BytesMut) {
        dst.reserve(PATH_RECORD_SIZE);
        dst.put_slice(&self.dgid);
        dst.put_slice(&self.sgid);
        dst.put_u16_le(self.dlid);
        dst.put_u16_le(self.slid);
        dst.put_u32_le(self.raw_traffic);
        dst.put_u32_le(self.flow_label);
        dst.put_u32_le(self.reversible);
        dst.put_u32_le(self.mtu);
        dst.put_u16_le(self.pkey);
        dst.put_u8(self.hop_limit);
        dst.put_u8(self.traffic_class);
        dst.put_u8(self.numb_path);
        dst.put_u8(self.sl);
        dst.put_u8(self.mtu_selector);
        dst.put_u8(self.rate_selector);
        dst.put_u8(self.rate);
        dst.put_u8(self.packet_life_time_selector);
        dst.put_u8(self.packet_life_time);
        dst.put_u8(self.preference);
    }

    /// Decode a record from the start of `src`.
    pub fn decode(src: &[u8]) -> Result<Self> {
        if src.len() < PATH_RECORD_SIZE {
            return Err(WireError::Truncated {
                record: "path",
                len: src.len(),
                need: PATH_RECORD_SIZE,
            });
        }
        let mut buf = &src[..PATH_RECORD_SIZE];
        Ok(Self::read(&mut buf))
    }

    /// Read a record from a buffer already checked to hold one.
    pub(crate) fn read(buf: &mut &[u8]) -> Self {
        let mut dgid = [0u8; 16];
        buf.copy_to_slice(&mut dgid);
        let mut sgid = [0u8; 16];
        buf.copy_to_slice(&mut sgid);
        Self {
            dgid,
            sgid,
            dlid: buf.get_u16_le(),
            slid: buf.get_u16_le(),
            raw_traffic: buf.get_u32_le(),
            flow_label: buf.get_u32_le(),
            reversible: buf.get_u32_le(),
            mtu: buf.get_u32_le(),
            pkey: buf.get_u16_le(),
            hop_limit: buf.get_u8(),
            traffic_class: buf.get_u8(),
            numb_path: buf.get_u8(),
            sl: buf.get_u8(),
            mtu_selector: buf.get_u8(),
            rate_selector: buf.get_u8(),
            rate: buf.get_u8(),
            packet_life_time_selector: buf.get_u8(),
            packet_life_time: buf.get_u8(),
            preference: buf.get_u8(),
        }
    }
}

impl From<&PathRecord> for WirePathRec {
    fn from(path: &PathRecord) -> Self {
        Self {
            dgid: path.dgid.0,
            sgid: path.sgid.0,
            dlid: path.dlid,
            slid: path.slid,
            raw_traffic: u32::from(path.raw_traffic),
            flow_label: path.flow_label,
            reversible: u32::from(path.reversible),
            mtu: path.mtu,
            pkey: path.pkey,
            hop_limit: path.hop_limit,
            traffic_class: path.traffic_class,
            numb_path: path.numb_path,
            sl: path.sl,
            mtu_selector: path.mtu_selector,
            rate_selector: path.rate_selector,
            rate: path.rate,
            packet_life_time_selector: path.packet_life_time_selector,
            packet_life_time: path.packet_life_time,
            preference: path.preference,
        }
    }
}

impl From<&WirePathRec> for PathRecord {
    fn from(wire: &WirePathRec) -> Self {
        Self {
            dgid: Gid(wire.dgid),
            sgid: Gid(wire.sgid),
            dlid: wire.dlid,
            slid: wire.slid,
            raw_traffic: wire.raw_traffic != 0,
            flow_label: wire.flow_label,
            hop_limit: wire.hop_limit,
            traffic_class: wire.traffic_class,
            reversible: wire.reversible != 0,
            numb_path: wire.numb_path,
            pkey: wire.pkey,
            sl: wire.sl,
            mtu_selector: wire.mtu_selector,
            mtu: wire.mtu,
            rate_selector: wire.rate_selector,
            rate: wire.rate,
            packet_life_time_selector: wire.packet_life_time_selector,
            packet_life_time: wire.packet_life_time,
            preference: wire.preference,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_path() -> PathRecord {
        PathRecord {
            dgid: Gid::from_parts(0xfe80_0000_0000_0000, 0x0002_c903_0001_0a0b),
            sgid: Gid::from_parts(0xfe80_0000_0000_0000, 0x0002_c903_0001_0c0d),
            dlid: 0x0011,
            slid: 0x0022,
            raw_traffic: false,
            flow_label: 0x000a_bcde,
            hop_limit: 64,
            traffic_class: 3,
            reversible: true,
            numb_path: 1,
            pkey: 0xffff,
            sl: 5,
            mtu_selector: 2,
            mtu: 4,
            rate_selector: 2,
            rate: 6,
            packet_life_time_selector: 2,
            packet_life_time: 18,
            preference: 1,
        }
    }

    #[test]
    fn path_roundtrip_preserves_every_field() {
        let path = sample_path();
        let wire = path.to_bytes();
        assert_eq!(wire.len(), PATH_RECORD_SIZE);
        assert_eq!(PathRecord::from_bytes(&wire).unwrap(), path);
    }

    #[test]
    fn gid_bytes_are_copied_verbatim() {
        let path = sample_path();
        let wire = path.to_bytes();
        assert_eq!(&wire[..16], path.dgid.raw());
        assert_eq!(&wire[16..32], path.sgid.raw());
    }

    #[test]
    fn flags_widen_to_u32() {
        let wire = WirePathRec::from(&sample_path());
        assert_eq!(wire.raw_traffic, 0);
        assert_eq!(wire.reversible, 1);
        assert_eq!(wire.mtu, 4);
    }

    #[test]
    fn wide_mtu_survives_decode() {
        let mut wire = WirePathRec::from(&sample_path());
        wire.mtu = 0x0001_0005;
        let mut dst = BytesMut::new();
        wire.encode(&mut dst);
        let path = PathRecord::from_bytes(&dst).unwrap();
        assert_eq!(path.mtu, 0x0001_0005);
        assert_eq!(WirePathRec::from(&path), wire);
    }

    #[test]
    fn decode_truncated_path() {
        let err = WirePathRec::decode(&[0u8; 63]).unwrap_err();
        assert!(matches!(err, WireError::Truncated { need: 64, .. }));
    }

    #[test]
    fn gid_display() {
        let gid = Gid::from_parts(0xfe80_0000_0000_0000, 0x0002_c903_0001_0a0b);
        assert_eq!(gid.to_string(), "fe80:0000:0000:0000:0002:c903:0001:0a0b");
    }
}
