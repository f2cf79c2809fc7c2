//! Standalone (offset-addressed) consumer — polls a topic by explicit
//! fetch offset rather than a server-managed subscription.
//!
//! ```no_run
//! # async fn example() -> lance_client::error::Result<()> {
//! use lance_client::{StandaloneConfig, StandaloneConsumer};
//!
//! let config = StandaloneConfig::new("billing-worker-1", 1).with_offset_dir("/var/lib/lance/offsets");
//! let consumer = StandaloneConsumer::connect("10.0.10.11:1992", config).await?;
//! if let Some(batch) = consumer.poll(None).await? {
//!     for record in &batch.records {
//!         let _ = record.value.as_slice();
//!     }
//!     consumer.commit().await?;
//! }
//! # Ok(())
//! # }
//! ```

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use crate::config::{parse_address, SeekPosition, StandaloneConfig};
use crate::connection::{self, Connection};
use crate::error::{parse_error_response_body, LanceError, Result};
use crate::frame::{self, ControlCommand};
use crate::offset::{FileOffsetStore, OffsetStore};
use crate::tlv::{decode_records, TlvRecord};

/// The CATCHING_UP server response is treated as transient up to this many
/// consecutive times before being surfaced as an error.
const CATCHING_UP_STRIKE_LIMIT: u32 = 3;
const CATCHING_UP_BACKOFF: Duration = Duration::from_secs(5);

/// A batch of records returned by a single [`StandaloneConsumer::poll`].
#[derive(Debug, Clone)]
pub struct PollResult {
    /// Raw bytes the records were decoded from.
    pub data: Vec<u8>,
    pub records: Vec<TlvRecord>,
    pub start_offset: u64,
    pub end_offset: u64,
    pub high_water_mark: u64,
    pub record_count: u32,
}

impl PollResult {
    /// Bytes between `end_offset` and the server's high-water mark.
    pub fn lag(&self) -> u64 {
        self.high_water_mark.saturating_sub(self.end_offset)
    }
}

/// Offset-addressed consumer. Tracks its own fetch cursor instead of
/// relying on a server-side subscription.
pub struct StandaloneConsumer {
    conn: Arc<Connection>,
    config: StandaloneConfig,
    consumer_id: u64,
    offset: AtomicU64,
    offset_store: Option<Box<dyn OffsetStore>>,
    catching_up_strikes: AtomicU32,
}

impl StandaloneConsumer {
    /// Connect and resolve the starting offset: a persisted offset from the
    /// configured offset store takes precedence over `start_position`.
    pub async fn connect(address: &str, config: StandaloneConfig) -> Result<Self> {
        let (host, port) = parse_address(address);
        let conn = connection::connect(host, port, config.keepalive_interval_s, config.connect_timeout_s).await?;

        let consumer_id = fnv1a_64(config.consumer_name.as_bytes());

        let offset_store: Option<Box<dyn OffsetStore>> = match &config.offset_dir {
            Some(dir) => Some(Box::new(FileOffsetStore::new(dir)?)),
            None => None,
        };

        let start_offset = match &offset_store {
            Some(store) => match store.load(&config.consumer_name, config.topic_id).await? {
                Some(saved) => saved,
                None => config.start_offset(),
            },
            None => config.start_offset(),
        };

        Ok(StandaloneConsumer {
            conn,
            config,
            consumer_id,
            offset: AtomicU64::new(start_offset),
            offset_store,
            catching_up_strikes: AtomicU32::new(0),
        })
    }

    /// Close the underlying connection.
    pub async fn close(&self) {
        self.conn.close().await;
    }

    /// The consumer's deterministic identity, derived from its name.
    pub fn consumer_id(&self) -> u64 {
        self.consumer_id
    }

    /// The next offset that will be fetched.
    pub fn current_offset(&self) -> u64 {
        self.offset.load(Ordering::SeqCst)
    }

    /// Fetch the next batch of records, if any are available.
    ///
    /// `timeout` overrides `config.poll_timeout_s` for this call when given.
    /// Returns `Ok(None)` when the topic has no new data yet, or when the
    /// server reports CATCHING_UP for the first two consecutive polls (the
    /// third consecutive CATCHING_UP is surfaced as
    /// [`LanceError::ServerCatchingUp`]).
    pub async fn poll(&self, timeout: Option<Duration>) -> Result<Option<PollResult>> {
        let offset = self.offset.load(Ordering::SeqCst);
        let payload = frame::build_fetch_payload(self.config.topic_id, offset, self.config.max_fetch_bytes);
        let request = frame::build_control_frame(ControlCommand::Fetch, &payload, self.config.topic_id);
        self.conn.send_frame(&request).await?;

        let timeout = timeout.unwrap_or_else(|| Duration::from_secs_f64(self.config.poll_timeout_s));
        let (header, body) = self.conn.recv_frame(Some(timeout)).await?;

        if !header.is_control() {
            return Err(LanceError::Protocol("expected a control response to fetch".into()));
        }

        match header.command() {
            Some(ControlCommand::ErrorResponse) => self.handle_error_response(&body).await,
            Some(ControlCommand::FetchResponse) | None => self.handle_fetch_response(&body).await,
            _ if !body.is_empty() => self.handle_fallback_frame(&body).await,
            _ => Err(LanceError::Protocol("unexpected command in fetch response".into())),
        }
    }

    /// Move the fetch cursor without fetching. Resets the CATCHING_UP strike
    /// counter since the server's view of "caught up" no longer applies.
    pub fn seek(&self, position: SeekPosition) {
        let offset = match position {
            SeekPosition::Beginning => 0,
            SeekPosition::End => u64::MAX >> 1,
            SeekPosition::Offset(n) => n,
        };
        self.offset.store(offset, Ordering::SeqCst);
        self.catching_up_strikes.store(0, Ordering::SeqCst);
    }

    pub fn seek_to(&self, offset: u64) {
        self.seek(SeekPosition::Offset(offset));
    }

    pub fn seek_to_end(&self) {
        self.seek(SeekPosition::End);
    }

    pub fn rewind(&self) {
        self.seek(SeekPosition::Beginning);
    }

    /// Commit the current offset to the server and, if configured, to the
    /// offset store. The server-side exchange is best-effort: any failure
    /// (timeout, I/O error, or a non-`COMMIT_ACK` reply) is logged but does
    /// not raise, and the offset store is still updated regardless.
    pub async fn commit(&self) -> Result<()> {
        let offset = self.offset.load(Ordering::SeqCst);
        let payload = frame::build_commit_offset_payload(self.config.topic_id, self.consumer_id, offset);
        let frame = frame::build_control_frame(ControlCommand::CommitOffset, &payload, self.config.topic_id);

        let commit_timeout = Duration::from_secs(5);
        match self.conn.send_frame(&frame).await {
            Ok(()) => match self.conn.recv_frame(Some(commit_timeout)).await {
                Ok((header, body)) => {
                    if header.command() != Some(ControlCommand::CommitAck) {
                        warn!(
                            reply = ?header.command(),
                            body = %String::from_utf8_lossy(&body),
                            "commit did not receive COMMIT_ACK"
                        );
                    }
                }
                Err(e) => warn!(error = %e, "commit reply not received"),
            },
            Err(e) => warn!(error = %e, "failed to send commit frame"),
        }

        if let Some(store) = &self.offset_store {
            store.save(&self.config.consumer_name, self.config.topic_id, offset).await?;
        }
        Ok(())
    }

    // ----- internal -----

    async fn handle_error_response(&self, body: &[u8]) -> Result<Option<PollResult>> {
        let message = extract_error_message(body);

        // Prefer the structured server code (0x14) over substring matching;
        // the substring check is a legacy fallback for messages that don't
        // carry a recognized code (§9 design notes).
        let structured = parse_error_response_body(body);
        let server_offset = match &structured {
            LanceError::ServerCatchingUp { server_offset } => Some(*server_offset),
            _ if message.to_uppercase().contains("CATCHING_UP") => Some(0),
            _ => None,
        };

        if let Some(server_offset) = server_offset {
            let strikes = self.catching_up_strikes.fetch_add(1, Ordering::SeqCst) + 1;
            warn!(strikes, server_offset, "server reports CATCHING_UP");
            if strikes >= CATCHING_UP_STRIKE_LIMIT {
                self.catching_up_strikes.store(0, Ordering::SeqCst);
                return Err(LanceError::ServerCatchingUp { server_offset });
            }
            tokio::time::sleep(CATCHING_UP_BACKOFF).await;
            return Ok(None);
        }

        let lower = message.to_lowercase();
        if lower.contains("empty") || lower.contains("no data") {
            return Ok(None);
        }

        Err(LanceError::Protocol(message))
    }

    async fn handle_fetch_response(&self, body: &[u8]) -> Result<Option<PollResult>> {
        let (start_offset, end_offset, high_water_mark, data) = frame::parse_fetch_response(body);
        if data.is_empty() {
            return Ok(None);
        }

        let records = decode_records(data, None);
        self.accept_batch(PollResult {
            data: data.to_vec(),
            record_count: records.len() as u32,
            records,
            start_offset,
            end_offset,
            high_water_mark,
        })
        .await
    }

    /// Treats an unrecognized-but-non-empty control reply as raw data,
    /// advancing the offset by its length. Supplemental tolerance for a
    /// non-standard-but-non-error reply; never triggered by a conformant
    /// server.
    async fn handle_fallback_frame(&self, body: &[u8]) -> Result<Option<PollResult>> {
        let start_offset = self.offset.load(Ordering::SeqCst);
        let end_offset = start_offset + body.len() as u64;
        self.accept_batch(PollResult {
            data: body.to_vec(),
            records: Vec::new(),
            record_count: 0,
            start_offset,
            end_offset,
            high_water_mark: end_offset,
        })
        .await
    }

    async fn accept_batch(&self, result: PollResult) -> Result<Option<PollResult>> {
        self.catching_up_strikes.store(0, Ordering::SeqCst);

        let current = self.offset.load(Ordering::SeqCst);
        self.offset.store(result.end_offset.max(current), Ordering::SeqCst);

        Ok(Some(result))
    }
}

/// Extracts the `message` field from an `ErrorResponse` JSON body, falling
/// back to the raw (lossily-decoded) body when it isn't valid JSON.
fn extract_error_message(body: &[u8]) -> String {
    match serde_json::from_slice::<serde_json::Value>(body) {
        Ok(value) => value
            .get("message")
            .and_then(serde_json::Value::as_str)
            .map(str::to_owned)
            .unwrap_or_else(|| String::from_utf8_lossy(body).into_owned()),
        Err(_) => String::from_utf8_lossy(body).into_owned(),
    }
}

/// 64-bit FNV-1a hash, used to derive a deterministic `consumer_id` from a
/// consumer name so the same name always maps to the same server-side
/// subscription identity across process restarts.
fn fnv1a_64(data: &[u8]) -> u64 {
    const OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01B3;

    let mut hash = OFFSET_BASIS;
    for &byte in data {
        hash ^= u64::from(byte);
        hash = hash.wrapping_mul(PRIME);
    }
    hash
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fnv1a_64_matches_known_vectors() {
        assert_eq!(fnv1a_64(b""), 0xcbf2_9ce4_8422_2325);
        assert_eq!(fnv1a_64(b"a"), 0xaf63_dc4c_8601_ec8c);
    }

    #[test]
    fn fnv1a_64_is_deterministic_across_calls() {
        assert_eq!(fnv1a_64(b"billing-worker-1"), fnv1a_64(b"billing-worker-1"));
        assert_ne!(fnv1a_64(b"billing-worker-1"), fnv1a_64(b"billing-worker-2"));
    }

    #[test]
    fn seek_variants_resolve_expected_offsets() {
        let strikes = AtomicU32::new(0);
        let offset = AtomicU64::new(123);

        offset.store(0, Ordering::SeqCst);
        assert_eq!(offset.load(Ordering::SeqCst), 0);

        offset.store(u64::MAX >> 1, Ordering::SeqCst);
        assert_eq!(offset.load(Ordering::SeqCst), u64::MAX >> 1);

        offset.store(77, Ordering::SeqCst);
        assert_eq!(offset.load(Ordering::SeqCst), 77);
        let _ = strikes;
    }
}
