//! LWP frame header: a fixed 44-byte little-endian header with dual CRC32C
//! integrity, followed by 0..N bytes of payload.
//!
//! ```text
//! Offset  Size  Field
//! 0       4     Magic ("LANC")
//! 4       1     Version
//! 5       1     Flags
//! 6       2     Reserved (written as 0)
//! 8       4     Header CRC32C (of bytes 0-7, reserved taken as zero)
//! 12      8     Batch ID (repurposed as command code on control frames)
//! 20      8     Timestamp NS
//! 28      4     Record Count
//! 32      4     Payload Length
//! 36      4     Payload CRC32C (0 iff payload_length == 0)
//! 40      4     Topic ID
//! ```

use crate::error::{LanceError, Result};

pub const MAGIC: [u8; 4] = *b"LANC";
pub const PROTOCOL_VERSION: u8 = 1;
pub const HEADER_SIZE: usize = 44;
pub const DEFAULT_PORT: u16 = 1992;
pub const KEEPALIVE_INTERVAL_S: u64 = 10;
pub const KEEPALIVE_TIMEOUT_S: u64 = 30;
pub const MAX_RECORD_SIZE: usize = 16 * 1024 * 1024;

/// LWP header flag bits. `CONTROL` and `BATCH_MODE` are exclusive in practice.
pub struct Flag;

impl Flag {
    pub const COMPRESSED: u8 = 0x01;
    pub const ENCRYPTED: u8 = 0x02;
    pub const BATCH_MODE: u8 = 0x04;
    pub const ACK: u8 = 0x08;
    pub const BACKPRESSURE: u8 = 0x10;
    pub const KEEPALIVE: u8 = 0x20;
    pub const CONTROL: u8 = 0x40;
}

/// Control frame command codes, carried in the `batch_id` field when the
/// `CONTROL` flag is set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlCommand {
    CreateTopic,
    DeleteTopic,
    ListTopics,
    GetTopic,
    SetRetention,
    CreateTopicWithRetention,
    Fetch,
    FetchResponse,
    Subscribe,
    Unsubscribe,
    CommitOffset,
    SubscribeAck,
    CommitAck,
    TopicResponse,
    ErrorResponse,
}

impl ControlCommand {
    pub fn code(self) -> u64 {
        match self {
            ControlCommand::CreateTopic => 0x01,
            ControlCommand::DeleteTopic => 0x02,
            ControlCommand::ListTopics => 0x03,
            ControlCommand::GetTopic => 0x04,
            ControlCommand::SetRetention => 0x05,
            ControlCommand::CreateTopicWithRetention => 0x06,
            ControlCommand::Fetch => 0x10,
            ControlCommand::FetchResponse => 0x11,
            ControlCommand::Subscribe => 0x20,
            ControlCommand::Unsubscribe => 0x21,
            ControlCommand::CommitOffset => 0x22,
            ControlCommand::SubscribeAck => 0x23,
            ControlCommand::CommitAck => 0x24,
            ControlCommand::TopicResponse => 0x80,
            ControlCommand::ErrorResponse => 0xFF,
        }
    }

    pub fn from_code(code: u64) -> Option<Self> {
        Some(match code {
            0x01 => ControlCommand::CreateTopic,
            0x02 => ControlCommand::DeleteTopic,
            0x03 => ControlCommand::ListTopics,
            0x04 => ControlCommand::GetTopic,
            0x05 => ControlCommand::SetRetention,
            0x06 => ControlCommand::CreateTopicWithRetention,
            0x10 => ControlCommand::Fetch,
            0x11 => ControlCommand::FetchResponse,
            0x20 => ControlCommand::Subscribe,
            0x21 => ControlCommand::Unsubscribe,
            0x22 => ControlCommand::CommitOffset,
            0x23 => ControlCommand::SubscribeAck,
            0x24 => ControlCommand::CommitAck,
            0x80 => ControlCommand::TopicResponse,
            0xFF => ControlCommand::ErrorResponse,
            _ => return None,
        })
    }
}

/// A parsed LWP frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Header {
    pub version: u8,
    pub flags: u8,
    pub header_crc: u32,
    pub batch_id: u64,
    pub timestamp_ns: u64,
    pub record_count: u32,
    pub payload_length: u32,
    pub payload_crc: u32,
    pub topic_id: u32,
}

impl Header {
    pub fn new(flags: u8, batch_id: u64, topic_id: u32) -> Self {
        Header {
            version: PROTOCOL_VERSION,
            flags,
            header_crc: 0,
            batch_id,
            timestamp_ns: now_ns(),
            record_count: 0,
            payload_length: 0,
            payload_crc: 0,
            topic_id,
        }
    }

    pub fn is_ack(&self) -> bool {
        self.flags & Flag::ACK != 0
    }

    pub fn is_keepalive(&self) -> bool {
        self.flags & Flag::KEEPALIVE != 0
    }

    pub fn is_backpressure(&self) -> bool {
        self.flags & Flag::BACKPRESSURE != 0
    }

    pub fn is_control(&self) -> bool {
        self.flags & Flag::CONTROL != 0
    }

    pub fn is_batch(&self) -> bool {
        self.flags & Flag::BATCH_MODE != 0
    }

    pub fn is_compressed(&self) -> bool {
        self.flags & Flag::COMPRESSED != 0
    }

    /// The control command this frame carries, if it is a control frame with
    /// a recognized code.
    pub fn command(&self) -> Option<ControlCommand> {
        if !self.is_control() {
            return None;
        }
        ControlCommand::from_code(self.batch_id)
    }

    /// Serialize this header to 44 bytes, computing the header CRC.
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0..4].copy_from_slice(&MAGIC);
        buf[4] = self.version;
        buf[5] = self.flags;
        buf[6..8].copy_from_slice(&0u16.to_le_bytes());

        let crc = crc32c::crc32c(&buf[0..8]);
        buf[8..12].copy_from_slice(&crc.to_le_bytes());

        buf[12..20].copy_from_slice(&self.batch_id.to_le_bytes());
        buf[20..28].copy_from_slice(&self.timestamp_ns.to_le_bytes());
        buf[28..32].copy_from_slice(&self.record_count.to_le_bytes());
        buf[32..36].copy_from_slice(&self.payload_length.to_le_bytes());
        buf[36..40].copy_from_slice(&self.payload_crc.to_le_bytes());
        buf[40..44].copy_from_slice(&self.topic_id.to_le_bytes());
        buf
    }

    /// Parse a 44-byte buffer into a [`Header`].
    ///
    /// Fails with [`LanceError::InvalidFrame`] when the buffer is too short,
    /// the magic does not match, or the header CRC disagrees. Fails with
    /// [`LanceError::Protocol`] when the version byte doesn't match
    /// [`PROTOCOL_VERSION`].
    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() < HEADER_SIZE {
            return Err(LanceError::InvalidFrame(format!(
                "buffer too small: {} < {HEADER_SIZE}",
                buf.len()
            )));
        }

        if buf[0..4] != MAGIC {
            return Err(LanceError::InvalidFrame(format!(
                "invalid magic: {:?}",
                &buf[0..4]
            )));
        }

        let expected_crc = crc32c::crc32c(&buf[0..8]);
        let header_crc = u32::from_le_bytes(buf[8..12].try_into().unwrap());
        if header_crc != expected_crc {
            return Err(LanceError::InvalidFrame(format!(
                "header CRC mismatch: got {header_crc:#010x}, expected {expected_crc:#010x}"
            )));
        }

        let version = buf[4];
        if version != PROTOCOL_VERSION {
            return Err(LanceError::Protocol(format!(
                "unsupported protocol version: {version} (expected {PROTOCOL_VERSION})"
            )));
        }

        Ok(Header {
            version: buf[4],
            flags: buf[5],
            header_crc,
            batch_id: u64::from_le_bytes(buf[12..20].try_into().unwrap()),
            timestamp_ns: u64::from_le_bytes(buf[20..28].try_into().unwrap()),
            record_count: u32::from_le_bytes(buf[28..32].try_into().unwrap()),
            payload_length: u32::from_le_bytes(buf[32..36].try_into().unwrap()),
            payload_crc: u32::from_le_bytes(buf[36..40].try_into().unwrap()),
            topic_id: u32::from_le_bytes(buf[40..44].try_into().unwrap()),
        })
    }
}

fn now_ns() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as u64
}

// ---------------------------------------------------------------------------
// Frame builders
// ---------------------------------------------------------------------------

/// Build a complete Ingest frame (header + payload).
pub fn build_ingest_frame(
    payload: &[u8],
    batch_id: u64,
    record_count: u32,
    topic_id: u32,
    compressed: bool,
) -> Vec<u8> {
    let mut flags = Flag::BATCH_MODE;
    if compressed {
        flags |= Flag::COMPRESSED;
    }

    let mut header = Header::new(flags, batch_id, topic_id);
    header.record_count = record_count;
    header.payload_length = payload.len() as u32;
    header.payload_crc = crc32c::crc32c(payload);

    let mut out = Vec::with_capacity(HEADER_SIZE + payload.len());
    out.extend_from_slice(&header.encode());
    out.extend_from_slice(payload);
    out
}

/// Build a zero-payload Keepalive frame.
pub fn build_keepalive_frame() -> [u8; HEADER_SIZE] {
    Header {
        flags: Flag::KEEPALIVE,
        timestamp_ns: 0,
        ..Header::default()
    }
    .encode()
}

/// Build a Control frame for topic management, fetch, or commit operations.
pub fn build_control_frame(command: ControlCommand, payload: &[u8], topic_id: u32) -> Vec<u8> {
    let mut header = Header::new(Flag::CONTROL, command.code(), topic_id);
    header.payload_length = payload.len() as u32;
    header.payload_crc = if payload.is_empty() {
        0
    } else {
        crc32c::crc32c(payload)
    };

    let mut out = Vec::with_capacity(HEADER_SIZE + payload.len());
    out.extend_from_slice(&header.encode());
    out.extend_from_slice(payload);
    out
}

// --- Control payload builders ---

pub fn build_fetch_payload(topic_id: u32, offset: u64, max_bytes: u32) -> Vec<u8> {
    let mut buf = Vec::with_capacity(16);
    buf.extend_from_slice(&topic_id.to_le_bytes());
    buf.extend_from_slice(&offset.to_le_bytes());
    buf.extend_from_slice(&max_bytes.to_le_bytes());
    buf
}

pub fn build_subscribe_payload(
    topic_id: u32,
    start_offset: u64,
    max_batch_bytes: u32,
    consumer_id: u64,
) -> Vec<u8> {
    let mut buf = Vec::with_capacity(24);
    buf.extend_from_slice(&topic_id.to_le_bytes());
    buf.extend_from_slice(&start_offset.to_le_bytes());
    buf.extend_from_slice(&max_batch_bytes.to_le_bytes());
    buf.extend_from_slice(&consumer_id.to_le_bytes());
    buf
}

pub fn build_unsubscribe_payload(topic_id: u32, consumer_id: u64) -> Vec<u8> {
    let mut buf = Vec::with_capacity(12);
    buf.extend_from_slice(&topic_id.to_le_bytes());
    buf.extend_from_slice(&consumer_id.to_le_bytes());
    buf
}

pub fn build_commit_offset_payload(topic_id: u32, consumer_id: u64, offset: u64) -> Vec<u8> {
    let mut buf = Vec::with_capacity(20);
    buf.extend_from_slice(&topic_id.to_le_bytes());
    buf.extend_from_slice(&consumer_id.to_le_bytes());
    buf.extend_from_slice(&offset.to_le_bytes());
    buf
}

pub fn build_set_retention_payload(topic_id: u32, max_age_secs: u64, max_bytes: u64) -> Vec<u8> {
    let mut buf = Vec::with_capacity(20);
    buf.extend_from_slice(&topic_id.to_le_bytes());
    buf.extend_from_slice(&max_age_secs.to_le_bytes());
    buf.extend_from_slice(&max_bytes.to_le_bytes());
    buf
}

pub fn build_create_topic_with_retention_payload(
    name: &str,
    max_age_secs: u64,
    max_bytes: u64,
) -> Vec<u8> {
    let name_bytes = name.as_bytes();
    let mut buf = Vec::with_capacity(2 + name_bytes.len() + 16);
    buf.extend_from_slice(&(name_bytes.len() as u16).to_le_bytes());
    buf.extend_from_slice(name_bytes);
    buf.extend_from_slice(&max_age_secs.to_le_bytes());
    buf.extend_from_slice(&max_bytes.to_le_bytes());
    buf
}

/// Parse a FetchResponse payload into `(start_offset, end_offset,
/// high_water_mark, data)`. Falls back to the legacy 16-byte layout when the
/// payload is shorter than the 24-byte extended header.
pub fn parse_fetch_response(payload: &[u8]) -> (u64, u64, u64, &[u8]) {
    if payload.len() < 24 {
        if payload.len() < 16 {
            return (0, 0, 0, &[]);
        }
        let next_off = u64::from_le_bytes(payload[0..8].try_into().unwrap());
        let bytes_ret = u32::from_le_bytes(payload[8..12].try_into().unwrap()) as usize;
        let data_end = (16 + bytes_ret).min(payload.len());
        let data = &payload[16..data_end];
        return (0, next_off, next_off, data);
    }

    let start_off = u64::from_le_bytes(payload[0..8].try_into().unwrap());
    let end_off = u64::from_le_bytes(payload[8..16].try_into().unwrap());
    let hwm = u64::from_le_bytes(payload[16..24].try_into().unwrap());
    (start_off, end_off, hwm, &payload[24..])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crc32c_vectors() {
        assert_eq!(crc32c::crc32c(b""), 0x0000_0000);
        assert_eq!(crc32c::crc32c(b"a"), 0xC1D0_4330);
        assert_eq!(crc32c::crc32c(b"hello"), 0x9A71_BB4C);
    }

    #[test]
    fn keepalive_frame_vector() {
        let frame = build_keepalive_frame();
        assert_eq!(frame.len(), HEADER_SIZE);
        assert_eq!(&frame[0..4], b"LANC");
        assert_eq!(frame[5], Flag::KEEPALIVE);
        let expected_crc = crc32c::crc32c(&frame[0..8]);
        assert_eq!(u32::from_le_bytes(frame[8..12].try_into().unwrap()), expected_crc);
        assert!(frame[12..44].iter().all(|&b| b == 0));
    }

    #[test]
    fn ingest_round_trip() {
        let frame = build_ingest_frame(b"hello world", 1, 1, 5, false);
        assert_eq!(frame.len(), HEADER_SIZE + 11);
        let header = Header::decode(&frame).unwrap();
        assert!(header.is_batch());
        assert_eq!(header.batch_id, 1);
        assert_eq!(header.payload_length, 11);
        assert_eq!(header.topic_id, 5);
        assert_eq!(header.payload_crc, crc32c::crc32c(b"hello world"));
    }

    #[test]
    fn decode_round_trips_every_field() {
        let header = Header {
            version: PROTOCOL_VERSION,
            flags: Flag::CONTROL | Flag::COMPRESSED,
            header_crc: 0,
            batch_id: u64::MAX,
            timestamp_ns: 123_456_789,
            record_count: 7,
            payload_length: 0,
            payload_crc: 0,
            topic_id: 42,
        };
        let encoded = header.encode();
        let decoded = Header::decode(&encoded).unwrap();
        assert_eq!(decoded.flags, header.flags);
        assert_eq!(decoded.batch_id, header.batch_id);
        assert_eq!(decoded.timestamp_ns, header.timestamp_ns);
        assert_eq!(decoded.record_count, header.record_count);
        assert_eq!(decoded.topic_id, header.topic_id);
    }

    #[test]
    fn decode_rejects_short_buffer() {
        let buf = [0u8; 10];
        assert!(matches!(
            Header::decode(&buf),
            Err(LanceError::InvalidFrame(_))
        ));
    }

    #[test]
    fn decode_rejects_bad_magic() {
        let mut frame = build_keepalive_frame();
        frame[0] = b'X';
        assert!(matches!(
            Header::decode(&frame),
            Err(LanceError::InvalidFrame(_))
        ));
    }

    #[test]
    fn mutating_first_eight_bytes_breaks_crc() {
        let frame = build_ingest_frame(b"payload", 9, 1, 0, false);
        for i in 0..8 {
            let mut mutated = frame.clone();
            mutated[i] ^= 0xFF;
            assert!(
                Header::decode(&mutated).is_err(),
                "byte {i} mutation should invalidate header CRC"
            );
        }
    }

    #[test]
    fn zero_length_payload_has_zero_crc() {
        let frame = build_control_frame(ControlCommand::ListTopics, &[], 0);
        let header = Header::decode(&frame).unwrap();
        assert_eq!(header.payload_length, 0);
        assert_eq!(header.payload_crc, 0);
    }

    #[test]
    fn decode_rejects_unsupported_version() {
        let mut frame = build_keepalive_frame();
        frame[4] = PROTOCOL_VERSION + 1;
        let crc = crc32c::crc32c(&frame[0..8]);
        frame[8..12].copy_from_slice(&crc.to_le_bytes());
        assert!(matches!(
            Header::decode(&frame),
            Err(LanceError::Protocol(_))
        ));
    }

    #[test]
    fn command_round_trips_through_control_frame() {
        let frame = build_control_frame(ControlCommand::Fetch, &[1, 2, 3], 7);
        let header = Header::decode(&frame).unwrap();
        assert_eq!(header.command(), Some(ControlCommand::Fetch));
    }

    #[test]
    fn fetch_response_extended_layout() {
        let mut payload = Vec::new();
        payload.extend_from_slice(&10u64.to_le_bytes());
        payload.extend_from_slice(&20u64.to_le_bytes());
        payload.extend_from_slice(&30u64.to_le_bytes());
        payload.extend_from_slice(b"abc");
        let (start, end, hwm, data) = parse_fetch_response(&payload);
        assert_eq!((start, end, hwm), (10, 20, 30));
        assert_eq!(data, b"abc");
    }

    #[test]
    fn fetch_response_legacy_layout() {
        let mut payload = Vec::new();
        payload.extend_from_slice(&99u64.to_le_bytes());
        payload.extend_from_slice(&3u32.to_le_bytes());
        payload.extend_from_slice(&1u32.to_le_bytes());
        payload.extend_from_slice(b"xyz");
        let (start, end, hwm, data) = parse_fetch_response(&payload);
        assert_eq!((start, end, hwm), (0, 99, 99));
        assert_eq!(data, b"xyz");
    }

    #[test]
    fn fetch_response_too_short_is_empty() {
        let (start, end, hwm, data) = parse_fetch_response(&[1, 2, 3]);
        assert_eq!((start, end, hwm), (0, 0, 0));
        assert!(data.is_empty());
    }
}
