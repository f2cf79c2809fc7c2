//! Lance Producer — batched message production with ack correlation.
//!
//! Sends data as pipelined Ingest frames and tracks outstanding
//! acknowledgements in a `batch_id -> completion` table, drained by a
//! background ack-reader task that owns the connection's read side.
//!
//! ```no_run
//! # async fn example() -> lance_client::error::Result<()> {
//! use lance_client::{Producer, ProducerConfig};
//!
//! let producer = Producer::connect("10.0.10.11:1992", ProducerConfig::default()).await?;
//! producer.send(1, b"{\"price\": 6942.25}").await?;
//! producer.send_async(1, b"fire and forget").await?;
//! producer.flush(std::time::Duration::from_secs(30)).await?;
//! producer.close().await;
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::config::{parse_address, ProducerConfig};
use crate::connection::{self, Connection};
use crate::error::{LanceError, Result};
use crate::frame::{build_ingest_frame, ControlCommand};
use crate::tlv::{encode_records, RecordType, TlvRecord};

const DEFAULT_ACK_TIMEOUT: Duration = Duration::from_secs(30);
const ACK_READER_IDLE_TIMEOUT: Duration = Duration::from_secs(5);
const BACKPRESSURE_DELAY: Duration = Duration::from_millis(100);

/// Batched Lance producer with pipelined sends and ack tracking.
pub struct Producer {
    conn: Arc<Connection>,
    config: ProducerConfig,
    next_batch_id: AtomicU64,
    pending: Arc<Mutex<HashMap<u64, oneshot::Sender<Result<()>>>>>,
    receivers: Mutex<HashMap<u64, oneshot::Receiver<Result<()>>>>,
    ack_reader_task: StdMutex<Option<JoinHandle<()>>>,
    closed: Arc<AtomicBool>,
}

impl Producer {
    /// Connect to a Lance server and create a Producer. `address` is
    /// `"host[:port]"`, defaulting to port 1992 when no port suffix is given.
    pub async fn connect(address: &str, config: ProducerConfig) -> Result<Self> {
        let (host, port) = parse_address(address);
        let conn = connection::connect(host, port, config.keepalive_interval_s, config.connect_timeout_s).await?;

        let pending: Arc<Mutex<HashMap<u64, oneshot::Sender<Result<()>>>>> = Arc::new(Mutex::new(HashMap::new()));
        let closed = Arc::new(AtomicBool::new(false));

        let reader_conn = Arc::clone(&conn);
        let reader_pending = Arc::clone(&pending);
        let reader_closed = Arc::clone(&closed);
        let handle = tokio::spawn(async move {
            ack_reader_loop(reader_conn, reader_pending, reader_closed).await;
        });

        Ok(Producer {
            conn,
            config,
            next_batch_id: AtomicU64::new(0),
            pending,
            receivers: Mutex::new(HashMap::new()),
            ack_reader_task: StdMutex::new(Some(handle)),
            closed,
        })
    }

    /// Close the producer and its connection, failing any outstanding acks
    /// with a [`LanceError::Connection`].
    pub async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);

        let handle = self.ack_reader_task.lock().unwrap().take();
        if let Some(handle) = handle {
            handle.abort();
            let _ = handle.await;
        }

        for (_, tx) in self.pending.lock().await.drain() {
            let _ = tx.send(Err(LanceError::Connection("Producer closed".into())));
        }
        self.receivers.lock().await.clear();
        self.conn.close().await;
    }

    /// Send data and wait for the server ACK. Returns the batch_id.
    pub async fn send(&self, topic_id: u32, data: &[u8]) -> Result<u64> {
        self.send_with_type(topic_id, data, RecordType::RawData as u8).await
    }

    /// Send data with an explicit TLV record type and wait for the ACK.
    pub async fn send_with_type(&self, topic_id: u32, data: &[u8], record_type: u8) -> Result<u64> {
        let batch_id = self.send_async_with_type(topic_id, data, record_type).await?;
        self.wait_ack(batch_id, DEFAULT_ACK_TIMEOUT).await?;
        Ok(batch_id)
    }

    /// Send data without waiting for the ACK (pipelined). Returns the batch_id.
    pub async fn send_async(&self, topic_id: u32, data: &[u8]) -> Result<u64> {
        self.send_async_with_type(topic_id, data, RecordType::RawData as u8).await
    }

    /// Send data with an explicit TLV record type without waiting for the ACK.
    pub async fn send_async_with_type(&self, topic_id: u32, data: &[u8], record_type: u8) -> Result<u64> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(LanceError::Connection("producer is closed".into()));
        }

        let record = TlvRecord {
            record_type,
            value: data.to_vec(),
        };
        let (payload, compressed) = self.maybe_compress(record.encode());

        let batch_id = self.next_batch_id.fetch_add(1, Ordering::SeqCst) + 1;
        let frame = build_ingest_frame(&payload, batch_id, 1, topic_id, compressed);

        self.register_pending(batch_id).await;

        if self.conn.under_backpressure() {
            warn!(batch_id, "under backpressure, delaying send");
            tokio::time::sleep(BACKPRESSURE_DELAY).await;
        }

        self.conn.send_frame(&frame).await?;
        Ok(batch_id)
    }

    /// Send multiple TLV records as a single batch. Waits for one ACK.
    pub async fn send_batch(&self, topic_id: u32, records: &[TlvRecord]) -> Result<u64> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(LanceError::Connection("producer is closed".into()));
        }

        let (payload, compressed) = self.maybe_compress(encode_records(records));

        let batch_id = self.next_batch_id.fetch_add(1, Ordering::SeqCst) + 1;
        let frame = build_ingest_frame(&payload, batch_id, records.len() as u32, topic_id, compressed);

        self.register_pending(batch_id).await;
        self.conn.send_frame(&frame).await?;
        self.wait_ack(batch_id, DEFAULT_ACK_TIMEOUT).await?;
        Ok(batch_id)
    }

    /// Await all currently-pending acknowledgements.
    pub async fn flush(&self, timeout: Duration) -> Result<()> {
        let pending: Vec<(u64, oneshot::Receiver<Result<()>>)> = self.receivers.lock().await.drain().collect();
        if pending.is_empty() {
            return Ok(());
        }

        let outstanding = pending.len();
        let wait_all = async {
            for (_, rx) in pending {
                if let Ok(result) = rx.await {
                    result?;
                }
            }
            Ok(())
        };

        tokio::time::timeout(timeout, wait_all)
            .await
            .map_err(|_| LanceError::Lance(format!("flush timed out with {outstanding} pending ACKs")))?
    }

    // ----- internal -----

    async fn register_pending(&self, batch_id: u64) {
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(batch_id, tx);
        self.receivers.lock().await.insert(batch_id, rx);
    }

    async fn wait_ack(&self, batch_id: u64, timeout: Duration) -> Result<()> {
        let rx = self.receivers.lock().await.remove(&batch_id);
        let Some(rx) = rx else {
            return Ok(());
        };

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => {
                self.pending.lock().await.remove(&batch_id);
                Err(LanceError::Connection("Producer closed".into()))
            }
            Err(_) => {
                self.pending.lock().await.remove(&batch_id);
                Err(LanceError::Lance(format!("ACK timeout for batch {batch_id}")))
            }
        }
    }

    fn maybe_compress(&self, payload: Vec<u8>) -> (Vec<u8>, bool) {
        if !self.config.compression {
            return (payload, false);
        }
        let compressed = lz4_flex::block::compress(&payload);
        if compressed.len() < payload.len() {
            (compressed, true)
        } else {
            (payload, false)
        }
    }
}

/// Background task that reads ACK frames and resolves pending completions.
/// Runs for the lifetime of the producer.
async fn ack_reader_loop(
    conn: Arc<Connection>,
    pending: Arc<Mutex<HashMap<u64, oneshot::Sender<Result<()>>>>>,
    closed: Arc<AtomicBool>,
) {
    while !closed.load(Ordering::SeqCst) && conn.connected() {
        match conn.recv_frame(Some(ACK_READER_IDLE_TIMEOUT)).await {
            Ok((header, payload)) => {
                if header.is_ack() {
                    if let Some(tx) = pending.lock().await.remove(&header.batch_id) {
                        let _ = tx.send(Ok(()));
                    }
                } else if header.is_control() && header.command() == Some(ControlCommand::ErrorResponse) {
                    error!(
                        message = %String::from_utf8_lossy(&payload),
                        "server error on producer connection"
                    );
                }
            }
            Err(_) if !conn.connected() => break,
            Err(e) => {
                // A short idle timeout is expected when there is nothing to read.
                debug!(error = %e, "ack reader idle read");
            }
        }
    }
}
