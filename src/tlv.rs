//! TLV (Type-Length-Value) record encoding and decoding.
//!
//! Each record in an LWP payload is encoded as:
//!
//! ```text
//! Offset  Size  Field
//! 0       1     Type
//! 1       4     Length (u32 LE)
//! 5       N     Value (N = Length)
//! ```
//!
//! Records are packed contiguously with no alignment or padding.

const TLV_HDR_SIZE: usize = 5;

/// TLV record type identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RecordType {
    Reserved = 0x00,
    RawData = 0x01,
    Json = 0x02,
    Msgpack = 0x03,
    Protobuf = 0x04,
    Avro = 0x05,
    KeyValue = 0x10,
    Timestamped = 0x11,
    KeyTimestamped = 0x12,
    Null = 0xFF,
}

impl RecordType {
    pub fn from_u8(v: u8) -> Option<Self> {
        Some(match v {
            0x00 => RecordType::Reserved,
            0x01 => RecordType::RawData,
            0x02 => RecordType::Json,
            0x03 => RecordType::Msgpack,
            0x04 => RecordType::Protobuf,
            0x05 => RecordType::Avro,
            0x10 => RecordType::KeyValue,
            0x11 => RecordType::Timestamped,
            0x12 => RecordType::KeyTimestamped,
            0xFF => RecordType::Null,
            _ => return None,
        })
    }
}

/// A single TLV record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlvRecord {
    pub record_type: u8,
    pub value: Vec<u8>,
}

impl TlvRecord {
    pub fn total_size(&self) -> usize {
        TLV_HDR_SIZE + self.value.len()
    }

    /// Encode this record to bytes.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.total_size());
        out.push(self.record_type);
        out.extend_from_slice(&(self.value.len() as u32).to_le_bytes());
        out.extend_from_slice(&self.value);
        out
    }

    pub fn raw(data: impl Into<Vec<u8>>) -> Self {
        TlvRecord {
            record_type: RecordType::RawData as u8,
            value: data.into(),
        }
    }

    pub fn json(data: impl Into<Vec<u8>>) -> Self {
        TlvRecord {
            record_type: RecordType::Json as u8,
            value: data.into(),
        }
    }

    pub fn key_value(key: &str, value: &[u8]) -> Self {
        let key_bytes = key.as_bytes();
        let mut payload = Vec::with_capacity(2 + key_bytes.len() + value.len());
        payload.extend_from_slice(&(key_bytes.len() as u16).to_le_bytes());
        payload.extend_from_slice(key_bytes);
        payload.extend_from_slice(value);
        TlvRecord {
            record_type: RecordType::KeyValue as u8,
            value: payload,
        }
    }

    pub fn timestamped(timestamp_ns: u64, data: &[u8]) -> Self {
        let mut payload = Vec::with_capacity(8 + data.len());
        payload.extend_from_slice(&timestamp_ns.to_le_bytes());
        payload.extend_from_slice(data);
        TlvRecord {
            record_type: RecordType::Timestamped as u8,
            value: payload,
        }
    }

    pub fn key_timestamped(key: &str, timestamp_ns: u64, data: &[u8]) -> Self {
        let key_bytes = key.as_bytes();
        let mut payload = Vec::with_capacity(2 + key_bytes.len() + 8 + data.len());
        payload.extend_from_slice(&(key_bytes.len() as u16).to_le_bytes());
        payload.extend_from_slice(key_bytes);
        payload.extend_from_slice(&timestamp_ns.to_le_bytes());
        payload.extend_from_slice(data);
        TlvRecord {
            record_type: RecordType::KeyTimestamped as u8,
            value: payload,
        }
    }

    pub fn null() -> Self {
        TlvRecord {
            record_type: RecordType::Null as u8,
            value: Vec::new(),
        }
    }

    // --- Accessors for structured types ---

    /// Parse a `KeyValue` record into `(key, value)`. Lazy: callers choose
    /// when to pay the UTF-8 decode and slice cost.
    pub fn as_key_value(&self) -> (String, &[u8]) {
        if self.value.len() < 2 {
            return (String::new(), &self.value);
        }
        let key_len = u16::from_le_bytes(self.value[0..2].try_into().unwrap()) as usize;
        let key_end = (2 + key_len).min(self.value.len());
        let key = String::from_utf8_lossy(&self.value[2..key_end]).into_owned();
        (key, &self.value[key_end..])
    }

    /// Parse a `Timestamped` record into `(timestamp_ns, data)`.
    pub fn as_timestamped(&self) -> (u64, &[u8]) {
        if self.value.len() < 8 {
            return (0, &self.value);
        }
        let ts = u64::from_le_bytes(self.value[0..8].try_into().unwrap());
        (ts, &self.value[8..])
    }

    /// Parse a `KeyTimestamped` record into `(key, timestamp_ns, data)`.
    pub fn as_key_timestamped(&self) -> (String, u64, &[u8]) {
        if self.value.len() < 2 {
            return (String::new(), 0, &self.value);
        }
        let key_len = u16::from_le_bytes(self.value[0..2].try_into().unwrap()) as usize;
        let key_end = (2 + key_len).min(self.value.len());
        let key = String::from_utf8_lossy(&self.value[2..key_end]).into_owned();
        if self.value.len() < key_end + 8 {
            return (key, 0, &self.value[key_end..]);
        }
        let ts = u64::from_le_bytes(self.value[key_end..key_end + 8].try_into().unwrap());
        (key, ts, &self.value[key_end + 8..])
    }
}

/// Encode a list of TLV records into their concatenation.
pub fn encode_records(records: &[TlvRecord]) -> Vec<u8> {
    let total: usize = records.iter().map(TlvRecord::total_size).sum();
    let mut out = Vec::with_capacity(total);
    for record in records {
        out.extend_from_slice(&record.encode());
    }
    out
}

/// Decode TLV records from a contiguous payload.
///
/// Walks the buffer; a trailing fragment shorter than a TLV header (5 bytes)
/// or whose declared length exceeds the remaining bytes is silently dropped,
/// not treated as an error. `expected_count`, when given, bounds the number
/// of records returned.
pub fn decode_records(payload: &[u8], expected_count: Option<usize>) -> Vec<TlvRecord> {
    let mut records = Vec::new();
    let mut offset = 0;
    let limit = expected_count.unwrap_or(usize::MAX);

    while offset + TLV_HDR_SIZE <= payload.len() && records.len() < limit {
        let record_type = payload[offset];
        let length = u32::from_le_bytes(payload[offset + 1..offset + 5].try_into().unwrap()) as usize;

        let end = offset + TLV_HDR_SIZE + length;
        if end > payload.len() {
            break;
        }

        records.push(TlvRecord {
            record_type,
            value: payload[offset + TLV_HDR_SIZE..end].to_vec(),
        });
        offset = end;
    }

    records
}
