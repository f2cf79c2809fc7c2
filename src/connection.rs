//! Async TCP connection with keepalive, backpressure, and exponential-backoff
//! reconnection. Implements the full-duplex, single-socket LWP transport.
//!
//! The read half is guarded by a lock so a single long-lived reader task
//! (the producer's ack-reader, or a consumer's poll loop) drives it
//! exclusively; the write half is guarded by a separate lock so user sends
//! and the keepalive task never interleave frame bytes (§5 of the protocol
//! design).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::ReconnectConfig;
use crate::error::{LanceError, Result};
use crate::frame::{self, Header};

/// Async TCP connection implementing the LWP transport layer.
pub struct Connection {
    host: String,
    port: u16,
    keepalive_interval_s: f64,
    connect_timeout_s: f64,
    reader: AsyncMutex<Option<OwnedReadHalf>>,
    writer: AsyncMutex<Option<OwnedWriteHalf>>,
    connected: AtomicBool,
    backpressure: AtomicBool,
    keepalive_task: StdMutex<Option<JoinHandle<()>>>,
}

impl Connection {
    pub fn new(host: impl Into<String>, port: u16, keepalive_interval_s: f64, connect_timeout_s: f64) -> Self {
        Connection {
            host: host.into(),
            port,
            keepalive_interval_s,
            connect_timeout_s,
            reader: AsyncMutex::new(None),
            writer: AsyncMutex::new(None),
            connected: AtomicBool::new(false),
            backpressure: AtomicBool::new(false),
            keepalive_task: StdMutex::new(None),
        }
    }

    pub fn connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    pub fn under_backpressure(&self) -> bool {
        self.backpressure.load(Ordering::SeqCst)
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    // ----- lifecycle -----

    /// Open the TCP connection and start the keepalive task.
    pub async fn connect(self: &Arc<Self>) -> Result<()> {
        let stream = tokio::time::timeout(
            Duration::from_secs_f64(self.connect_timeout_s),
            TcpStream::connect((self.host.as_str(), self.port)),
        )
        .await
        .map_err(|_| {
            LanceError::Timeout(format!(
                "connection to {}:{} timed out after {}s",
                self.host, self.port, self.connect_timeout_s
            ))
        })?
        .map_err(|e| {
            LanceError::Connection(format!("failed to connect to {}:{}: {e}", self.host, self.port))
        })?;

        let (read_half, write_half) = stream.into_split();
        *self.reader.lock().await = Some(read_half);
        *self.writer.lock().await = Some(write_half);
        self.connected.store(true, Ordering::SeqCst);
        self.backpressure.store(false, Ordering::SeqCst);

        let keepalive_conn = Arc::clone(self);
        let handle = tokio::spawn(async move { keepalive_conn.keepalive_loop().await });
        *self.keepalive_task.lock().unwrap() = Some(handle);

        info!(host = %self.host, port = self.port, "connected");
        Ok(())
    }

    /// Close the connection and stop the keepalive task.
    pub async fn close(&self) {
        self.connected.store(false, Ordering::SeqCst);

        let handle = self.keepalive_task.lock().unwrap().take();
        if let Some(handle) = handle {
            handle.abort();
            let _ = handle.await;
        }

        self.writer.lock().await.take();
        self.reader.lock().await.take();

        info!(host = %self.host, port = self.port, "disconnected");
    }

    /// Reconnect with exponential backoff. Closes the current socket first,
    /// then retries with delays from [`ReconnectConfig::delay_for_attempt`]
    /// using a 1-indexed attempt counter.
    pub async fn reconnect(self: &Arc<Self>, config: &ReconnectConfig) -> Result<()> {
        self.close().await;

        let mut attempt = 0u32;
        loop {
            attempt += 1;
            if config.max_attempts > 0 && attempt > config.max_attempts {
                return Err(LanceError::Connection(format!(
                    "failed to reconnect after {} attempts",
                    config.max_attempts
                )));
            }

            let delay = config.delay_for_attempt(attempt);
            info!(
                attempt,
                delay_ms = delay.as_millis() as u64,
                host = %self.host,
                port = self.port,
                "reconnect attempt"
            );
            tokio::time::sleep(delay).await;

            match self.connect().await {
                Ok(()) => {
                    info!(attempt, "reconnected");
                    return Ok(());
                }
                Err(e) => {
                    warn!(attempt, error = %e, "reconnect attempt failed");
                }
            }
        }
    }

    // ----- I/O -----

    /// Send a complete frame (header + optional payload).
    pub async fn send_frame(&self, frame: &[u8]) -> Result<()> {
        if !self.connected() {
            return Err(LanceError::Connection("not connected".into()));
        }

        let mut guard = self.writer.lock().await;
        let writer = guard
            .as_mut()
            .ok_or_else(|| LanceError::Connection("not connected".into()))?;

        match writer.write_all(frame).await {
            Ok(()) => Ok(()),
            Err(e) => {
                self.connected.store(false, Ordering::SeqCst);
                Err(LanceError::Connection(format!("send failed: {e}")))
            }
        }
    }

    /// Read and parse a 44-byte header from the stream.
    pub async fn recv_header(&self, timeout: Option<Duration>) -> Result<Header> {
        let buf = self.recv_exact(frame::HEADER_SIZE, timeout).await?;
        Header::decode(&buf)
    }

    /// Read the payload for a given header and validate its CRC.
    pub async fn recv_payload(&self, header: &Header, timeout: Option<Duration>) -> Result<Vec<u8>> {
        if header.payload_length == 0 {
            return Ok(Vec::new());
        }

        if header.payload_length as usize > frame::MAX_RECORD_SIZE {
            self.connected.store(false, Ordering::SeqCst);
            return Err(LanceError::Protocol(format!(
                "payload length {} exceeds max record size {}",
                header.payload_length,
                frame::MAX_RECORD_SIZE
            )));
        }

        let data = self.recv_exact(header.payload_length as usize, timeout).await?;

        if header.payload_crc != 0 {
            let actual_crc = crc32c::crc32c(&data);
            if actual_crc != header.payload_crc {
                self.connected.store(false, Ordering::SeqCst);
                return Err(LanceError::InvalidFrame(format!(
                    "payload CRC mismatch: got {actual_crc:#010x}, expected {:#010x}",
                    header.payload_crc
                )));
            }
        }

        Ok(data)
    }

    /// Read a complete frame (header + payload).
    ///
    /// Handles Keepalive (reflected) and Backpressure (absorbed) frames
    /// inline; returns the next frame that is neither.
    pub async fn recv_frame(&self, timeout: Option<Duration>) -> Result<(Header, Vec<u8>)> {
        loop {
            let header = self.recv_header(timeout).await?;

            if header.is_keepalive() {
                self.send_frame(&frame::build_keepalive_frame()).await?;
                continue;
            }

            if header.is_backpressure() {
                self.backpressure.store(true, Ordering::SeqCst);
                warn!("server signaled backpressure");
                continue;
            }

            if header.is_ack() {
                self.backpressure.store(false, Ordering::SeqCst);
            }

            let payload = self.recv_payload(&header, timeout).await?;
            return Ok((header, payload));
        }
    }

    // ----- internal -----

    async fn recv_exact(&self, n: usize, timeout: Option<Duration>) -> Result<Vec<u8>> {
        let mut guard = self.reader.lock().await;
        let reader = guard
            .as_mut()
            .ok_or_else(|| LanceError::Connection("not connected".into()))?;

        let mut buf = vec![0u8; n];
        let read_result = match timeout {
            Some(d) => tokio::time::timeout(d, reader.read_exact(&mut buf))
                .await
                .map_err(|_| LanceError::Timeout(format!("read timed out after {d:?}")))?,
            None => reader.read_exact(&mut buf).await,
        };

        match read_result {
            Ok(_) => Ok(buf),
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                self.connected.store(false, Ordering::SeqCst);
                Err(LanceError::Connection(format!(
                    "connection closed (short read, wanted {n} bytes)"
                )))
            }
            Err(e) => {
                self.connected.store(false, Ordering::SeqCst);
                Err(LanceError::Connection(format!("read failed: {e}")))
            }
        }
    }

    async fn keepalive_loop(self: Arc<Self>) {
        let frame = frame::build_keepalive_frame();
        let interval = Duration::from_secs_f64(self.keepalive_interval_s.max(0.001));
        loop {
            tokio::time::sleep(interval).await;
            if !self.connected() {
                break;
            }
            if let Err(e) = self.send_frame(&frame).await {
                warn!(error = %e, "keepalive send failed, stopping keepalive task");
                break;
            }
        }
    }
}

/// Create and connect a [`Connection`].
pub async fn connect(
    host: impl Into<String>,
    port: u16,
    keepalive_interval_s: f64,
    connect_timeout_s: f64,
) -> Result<Arc<Connection>> {
    let conn = Arc::new(Connection::new(host, port, keepalive_interval_s, connect_timeout_s));
    conn.connect().await?;
    Ok(conn)
}
