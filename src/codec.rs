//! Byte-exact framing of an entry set into a section buffer (header + LIST
//! payload) and back, per the v2 on-disk layout: a 24-byte header followed
//! by a flat sequence of `(key_len, value_len, key, value)` records.

use crate::entryset::EntrySet;
use crate::error::{NvramError, Result};

/// ASCII `"NVR2"` read as a little-endian u32 — the magic that distinguishes
/// a v2 section from noise or a foreign format.
pub const NVRAM_MAGIC: u32 = u32::from_le_bytes(*b"NVR2");

/// Payload kind tag. Only `List` is specified; others are reserved for
/// formats this crate does not implement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadType {
    List,
    Unknown(u8),
}

impl From<u8> for PayloadType {
    fn from(b: u8) -> Self {
        match b {
            0 => PayloadType::List,
            other => PayloadType::Unknown(other),
        }
    }
}

impl From<PayloadType> for u8 {
    fn from(t: PayloadType) -> Self {
        match t {
            PayloadType::List => 0,
            PayloadType::Unknown(b) => b,
        }
    }
}

pub const HEADER_SIZE: usize = 24;

/// The 24-byte section header, parsed or about to be serialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SectionHeader {
    pub magic: u32,
    pub counter: u32,
    pub data_len: u32,
    pub data_crc32: u32,
    pub header_crc32: u32,
    pub payload_type: PayloadType,
}

impl SectionHeader {
    /// A header skeleton for a fresh serialization: caller supplies counter
    /// and type, everything else is computed by `serialize`.
    pub fn skeleton(counter: u32, payload_type: PayloadType) -> Self {
        SectionHeader {
            magic: NVRAM_MAGIC,
            counter,
            data_len: 0,
            data_crc32: 0,
            header_crc32: 0,
            payload_type,
        }
    }
}

/// Exact size in bytes a serialized section of this entry set will occupy.
pub fn serialize_size(set: &EntrySet) -> usize {
    HEADER_SIZE
        + set
            .iter()
            .map(|(k, v)| 8 + k.len() + v.len())
            .sum::<usize>()
}

/// Emits `header || payload` for `set`. `header.counter` and
/// `header.payload_type` are taken from the caller; `data_len`, the two CRCs
/// and `magic` are computed here and overwrite whatever was passed in.
pub fn serialize(set: &EntrySet, header: SectionHeader) -> Result<Vec<u8>> {
    let total = serialize_size(set);
    let mut buf = Vec::with_capacity(total);
    buf.resize(HEADER_SIZE, 0);

    for (k, v) in set.iter() {
        if k.len() > u32::MAX as usize || v.len() > u32::MAX as usize {
            return Err(NvramError::invalid_argument("entry too large to serialize"));
        }
        buf.extend_from_slice(&(k.len() as u32).to_le_bytes());
        buf.extend_from_slice(&(v.len() as u32).to_le_bytes());
        buf.extend_from_slice(k);
        buf.extend_from_slice(v);
    }

    let data_len = (buf.len() - HEADER_SIZE) as u32;
    let data_crc32 = crc32fast::hash(&buf[HEADER_SIZE..]);

    buf[0..4].copy_from_slice(&NVRAM_MAGIC.to_le_bytes());
    buf[4..8].copy_from_slice(&header.counter.to_le_bytes());
    buf[8..12].copy_from_slice(&data_len.to_le_bytes());
    buf[12..16].copy_from_slice(&data_crc32.to_le_bytes());
    buf[16] = header.payload_type.into();
    buf[17..20].copy_from_slice(&[0, 0, 0]);

    let header_crc32 = crc32fast::hash(&buf[0..20]);
    buf[20..24].copy_from_slice(&header_crc32.to_le_bytes());

    Ok(buf)
}

/// Checks magic and header_crc32 only; does not look at payload bytes.
/// `buf` must be at least `HEADER_SIZE` bytes; `section_capacity` is the
/// total usable size of the section, used to reject a `data_len` that would
/// run past the end of the backing storage.
pub fn validate_header(buf: &[u8], section_capacity: u64) -> Result<SectionHeader> {
    if buf.len() < HEADER_SIZE {
        return Err(NvramError::corrupt("section shorter than header"));
    }
    let magic = u32::from_le_bytes(buf[0..4].try_into().unwrap());
    if magic != NVRAM_MAGIC {
        return Err(NvramError::corrupt("bad magic"));
    }
    let counter = u32::from_le_bytes(buf[4..8].try_into().unwrap());
    let data_len = u32::from_le_bytes(buf[8..12].try_into().unwrap());
    let data_crc32 = u32::from_le_bytes(buf[12..16].try_into().unwrap());
    let payload_type = PayloadType::from(buf[16]);
    let header_crc32_stored = u32::from_le_bytes(buf[20..24].try_into().unwrap());

    let computed = crc32fast::hash(&buf[0..20]);
    if computed != header_crc32_stored {
        return Err(NvramError::corrupt("header CRC mismatch"));
    }

    if (data_len as u64) > section_capacity.saturating_sub(HEADER_SIZE as u64) {
        return Err(NvramError::corrupt("data_len exceeds section capacity"));
    }

    Ok(SectionHeader {
        magic,
        counter,
        data_len,
        data_crc32,
        header_crc32: header_crc32_stored,
        payload_type,
    })
}

/// Verifies `data_len`/`data_crc32` against `payload_bytes` and parses the
/// LIST records. A record with `key_len == 0`, or one that would run past
/// the end of `payload_bytes`, is fatal. Duplicate keys resolve last-wins,
/// matching payload order.
pub fn deserialize(payload_bytes: &[u8], header: &SectionHeader) -> Result<EntrySet> {
    if payload_bytes.len() != header.data_len as usize {
        return Err(NvramError::corrupt("data_len does not match payload length"));
    }
    let computed = crc32fast::hash(payload_bytes);
    if computed != header.data_crc32 {
        return Err(NvramError::corrupt("data CRC mismatch"));
    }

    let mut set = EntrySet::new();
    let mut pos = 0usize;
    while pos < payload_bytes.len() {
        if pos + 8 > payload_bytes.len() {
            return Err(NvramError::corrupt("truncated record header"));
        }
        let key_len = u32::from_le_bytes(payload_bytes[pos..pos + 4].try_into().unwrap()) as usize;
        let value_len =
            u32::from_le_bytes(payload_bytes[pos + 4..pos + 8].try_into().unwrap()) as usize;
        pos += 8;
        if key_len == 0 {
            return Err(NvramError::corrupt("zero-length key in payload"));
        }
        if pos + key_len + value_len > payload_bytes.len() {
            return Err(NvramError::corrupt("record runs past payload end"));
        }
        let key = &payload_bytes[pos..pos + key_len];
        let value = &payload_bytes[pos + key_len..pos + key_len + value_len];
        set.set(key, value);
        pos += key_len + value_len;
    }

    Ok(set)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_set() -> EntrySet {
        let mut s = EntrySet::new();
        s.set(b"k", b"v\0");
        s
    }

    #[test]
    fn round_trip_identity() {
        let set = sample_set();
        let header = SectionHeader::skeleton(1, PayloadType::List);
        let buf = serialize(&set, header).unwrap();
        let parsed_header = validate_header(&buf, buf.len() as u64).unwrap();
        let restored = deserialize(&buf[HEADER_SIZE..], &parsed_header).unwrap();
        assert_eq!(restored.iter().collect::<Vec<_>>(), set.iter().collect::<Vec<_>>());
    }

    #[test]
    fn matches_literal_scenario_one() {
        // {"k","v\0"} at counter=1: key_len=1, value_len=2, then the bytes
        // themselves -- the LIST layout from the data model section.
        let set = sample_set();
        let header = SectionHeader::skeleton(1, PayloadType::List);
        let buf = serialize(&set, header).unwrap();
        assert_eq!(
            &buf[HEADER_SIZE..],
            &[0x01, 0x00, 0x00, 0x00, 0x02, 0x00, 0x00, 0x00, b'k', b'v', 0x00]
        );
    }

    #[test]
    fn header_crc_rejects_bit_flip() {
        let set = sample_set();
        let header = SectionHeader::skeleton(1, PayloadType::List);
        let mut buf = serialize(&set, header).unwrap();
        buf[0] ^= 0x01;
        assert!(validate_header(&buf, buf.len() as u64).is_err());
    }

    #[test]
    fn data_crc_rejects_bit_flip() {
        let set = sample_set();
        let header = SectionHeader::skeleton(1, PayloadType::List);
        let mut buf = serialize(&set, header).unwrap();
        let parsed_header = validate_header(&buf, buf.len() as u64).unwrap();
        let last = buf.len() - 1;
        buf[last] ^= 0x01;
        assert!(deserialize(&buf[HEADER_SIZE..], &parsed_header).is_err());
    }

    #[test]
    fn empty_set_is_legal() {
        let set = EntrySet::new();
        let header = SectionHeader::skeleton(1, PayloadType::List);
        let buf = serialize(&set, header).unwrap();
        assert_eq!(buf.len(), HEADER_SIZE);
        let parsed_header = validate_header(&buf, buf.len() as u64).unwrap();
        let restored = deserialize(&buf[HEADER_SIZE..], &parsed_header).unwrap();
        assert!(restored.is_empty());
    }

    #[test]
    fn duplicate_keys_last_wins() {
        let mut set = EntrySet::new();
        set.set(b"k", b"first");
        let header = SectionHeader::skeleton(1, PayloadType::List);
        let mut buf = serialize(&set, header).unwrap();
        // Hand-craft a payload with a duplicate key, bypassing EntrySet's
        // own dedup, to exercise the decoder's last-wins rule directly.
        let mut payload = Vec::new();
        payload.extend_from_slice(&1u32.to_le_bytes());
        payload.extend_from_slice(&1u32.to_le_bytes());
        payload.push(b'k');
        payload.push(b'a');
        payload.extend_from_slice(&1u32.to_le_bytes());
        payload.extend_from_slice(&1u32.to_le_bytes());
        payload.push(b'k');
        payload.push(b'b');
        let data_crc32 = crc32fast::hash(&payload);
        buf.truncate(HEADER_SIZE);
        buf[8..12].copy_from_slice(&(payload.len() as u32).to_le_bytes());
        buf[12..16].copy_from_slice(&data_crc32.to_le_bytes());
        let header_crc32 = crc32fast::hash(&buf[0..20]);
        buf[20..24].copy_from_slice(&header_crc32.to_le_bytes());
        buf.extend_from_slice(&payload);

        let parsed_header = validate_header(&buf, buf.len() as u64).unwrap();
        let restored = deserialize(&buf[HEADER_SIZE..], &parsed_header).unwrap();
        assert_eq!(restored.get(b"k"), Some(b"b".as_slice()));
        assert_eq!(restored.len(), 1);
    }
}
