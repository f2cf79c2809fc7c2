//! Client for the Lance Wire Protocol (LWP): a low-latency, length-prefixed
//! binary protocol for a topic-oriented streaming system.
//!
//! Three public surfaces are provided:
//!
//! - [`LanceClient`] — topic lifecycle management (create/delete/list/get,
//!   retention policy).
//! - [`Producer`] — pipelined batch ingestion with ack correlation, optional
//!   LZ4 compression, and flush semantics.
//! - [`StandaloneConsumer`] — offset-addressed byte-range fetching with
//!   seek/rewind/commit and a pluggable durable offset store.
//!
//! The wire framing (44-byte header, dual CRC32C, TLV payload records) is in
//! [`frame`] and [`tlv`]; the transport is in [`connection`]. This crate does
//! not implement the server, TLS, or subscription/push delivery — see the
//! crate-level design notes in `DESIGN.md` for what is and isn't covered.

pub mod client;
pub mod config;
pub mod connection;
pub mod consumer;
pub mod error;
pub mod frame;
pub mod offset;
pub mod producer;
pub mod tlv;

pub use client::LanceClient;
pub use config::{ClientConfig, ProducerConfig, ReconnectConfig, SeekPosition, StandaloneConfig};
pub use connection::Connection;
pub use consumer::{PollResult, StandaloneConsumer};
pub use error::{LanceError, Result};
pub use frame::{ControlCommand, Flag, Header};
pub use offset::{FileOffsetStore, MemoryOffsetStore, OffsetStore};
pub use producer::Producer;
pub use tlv::{RecordType, TlvRecord};
