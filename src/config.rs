//! Configuration builders for the Lance client components.

use std::path::{Path, PathBuf};

use rand::Rng;

/// Position specifier for seeking within a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekPosition {
    Beginning,
    End,
    Offset(u64),
}

/// `"host[:port]"` → `(host, port)`, defaulting to [`crate::frame::DEFAULT_PORT`]
/// when no port suffix is present.
pub fn parse_address(address: &str) -> (String, u16) {
    match address.rsplit_once(':') {
        Some((host, port_str)) => match port_str.parse() {
            Ok(port) => (host.to_string(), port),
            Err(_) => (address.to_string(), crate::frame::DEFAULT_PORT),
        },
        None => (address.to_string(), crate::frame::DEFAULT_PORT),
    }
}

/// Configuration for the management [`crate::client::LanceClient`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub host: String,
    pub port: u16,
    pub connect_timeout_s: f64,
    pub request_timeout_s: f64,
    pub keepalive_interval_s: f64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            host: "127.0.0.1".to_string(),
            port: crate::frame::DEFAULT_PORT,
            connect_timeout_s: 10.0,
            request_timeout_s: 30.0,
            keepalive_interval_s: 10.0,
        }
    }
}

impl ClientConfig {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_connect_timeout(mut self, timeout_s: f64) -> Self {
        self.connect_timeout_s = timeout_s;
        self
    }

    pub fn with_request_timeout(mut self, timeout_s: f64) -> Self {
        self.request_timeout_s = timeout_s;
        self
    }

    pub fn with_keepalive_interval(mut self, interval_s: f64) -> Self {
        self.keepalive_interval_s = interval_s;
        self
    }
}

/// Configuration for the [`crate::producer::Producer`].
#[derive(Debug, Clone)]
pub struct ProducerConfig {
    pub batch_size: usize,
    pub linger_ms: u64,
    pub compression: bool,
    pub max_pending_acks: usize,
    pub connect_timeout_s: f64,
    pub request_timeout_s: f64,
    pub keepalive_interval_s: f64,
    pub auto_reconnect: bool,
}

impl Default for ProducerConfig {
    fn default() -> Self {
        ProducerConfig {
            batch_size: 32 * 1024,
            linger_ms: 5,
            compression: false,
            max_pending_acks: 64,
            connect_timeout_s: 10.0,
            request_timeout_s: 30.0,
            keepalive_interval_s: 10.0,
            auto_reconnect: true,
        }
    }
}

impl ProducerConfig {
    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size;
        self
    }

    pub fn with_linger_ms(mut self, ms: u64) -> Self {
        self.linger_ms = ms;
        self
    }

    pub fn with_compression(mut self, enabled: bool) -> Self {
        self.compression = enabled;
        self
    }

    pub fn with_max_pending_acks(mut self, n: usize) -> Self {
        self.max_pending_acks = n;
        self
    }

    pub fn with_connect_timeout(mut self, timeout_s: f64) -> Self {
        self.connect_timeout_s = timeout_s;
        self
    }

    pub fn with_request_timeout(mut self, timeout_s: f64) -> Self {
        self.request_timeout_s = timeout_s;
        self
    }

    pub fn with_auto_reconnect(mut self, enabled: bool) -> Self {
        self.auto_reconnect = enabled;
        self
    }
}

/// Configuration for a [`crate::consumer::StandaloneConsumer`].
#[derive(Debug, Clone)]
pub struct StandaloneConfig {
    pub consumer_name: String,
    pub topic_id: u32,
    pub max_fetch_bytes: u32,
    pub start_position: SeekPosition,
    pub offset_dir: Option<PathBuf>,
    pub auto_commit_interval_s: Option<f64>,
    pub connect_timeout_s: f64,
    pub poll_timeout_s: f64,
    pub keepalive_interval_s: f64,
    pub poll_interval_ms: u64,
    pub auto_reconnect: bool,
}

impl StandaloneConfig {
    pub fn new(consumer_name: impl Into<String>, topic_id: u32) -> Self {
        StandaloneConfig {
            consumer_name: consumer_name.into(),
            topic_id,
            max_fetch_bytes: 1_048_576,
            start_position: SeekPosition::Beginning,
            offset_dir: None,
            auto_commit_interval_s: Some(5.0),
            connect_timeout_s: 10.0,
            poll_timeout_s: 0.1,
            keepalive_interval_s: 10.0,
            poll_interval_ms: 50,
            auto_reconnect: true,
        }
    }

    /// Resolve `start_position` to a numeric offset for the initial fetch.
    pub fn start_offset(&self) -> u64 {
        match self.start_position {
            SeekPosition::Beginning => 0,
            SeekPosition::End => u64::MAX >> 1,
            SeekPosition::Offset(offset) => offset,
        }
    }

    pub fn with_max_fetch_bytes(mut self, n: u32) -> Self {
        self.max_fetch_bytes = n;
        self
    }

    pub fn with_start_position(mut self, pos: SeekPosition) -> Self {
        self.start_position = pos;
        self
    }

    pub fn with_offset_dir(mut self, path: impl AsRef<Path>) -> Self {
        self.offset_dir = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn with_auto_commit_interval(mut self, interval_s: Option<f64>) -> Self {
        self.auto_commit_interval_s = interval_s;
        self
    }

    pub fn with_manual_commit(mut self) -> Self {
        self.auto_commit_interval_s = None;
        self
    }

    pub fn with_poll_timeout(mut self, timeout_s: f64) -> Self {
        self.poll_timeout_s = timeout_s;
        self
    }

    pub fn with_connect_timeout(mut self, timeout_s: f64) -> Self {
        self.connect_timeout_s = timeout_s;
        self
    }

    pub fn with_auto_reconnect(mut self, enabled: bool) -> Self {
        self.auto_reconnect = enabled;
        self
    }
}

/// Reconnection parameters with exponential backoff.
#[derive(Debug, Clone, Copy)]
pub struct ReconnectConfig {
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    /// 0 = unlimited.
    pub max_attempts: u32,
    pub jitter_factor: f64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        ReconnectConfig {
            base_delay_ms: 100,
            max_delay_ms: 30_000,
            max_attempts: 0,
            jitter_factor: 0.1,
        }
    }
}

impl ReconnectConfig {
    /// Delay for a given attempt value, as a [`std::time::Duration`].
    ///
    /// `delay_for_attempt(n) = min(base_delay_ms * 2^n, max_delay_ms)` plus
    /// uniform jitter in `[0, jitter_factor * delay)`.
    pub fn delay_for_attempt(&self, attempt: u32) -> std::time::Duration {
        let base_delay_ms = self
            .base_delay_ms
            .saturating_mul(1u64.checked_shl(attempt).unwrap_or(u64::MAX).max(1))
            .min(self.max_delay_ms);

        let jitter_ms = if self.jitter_factor > 0.0 {
            let max_jitter = base_delay_ms as f64 * self.jitter_factor;
            rand::thread_rng().gen_range(0.0..max_jitter.max(f64::MIN_POSITIVE))
        } else {
            0.0
        };

        std::time::Duration::from_secs_f64((base_delay_ms as f64 + jitter_ms) / 1000.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_address_splits_host_and_port() {
        assert_eq!(parse_address("10.0.0.1:1992"), ("10.0.0.1".to_string(), 1992));
    }

    #[test]
    fn parse_address_defaults_port_when_absent() {
        assert_eq!(
            parse_address("10.0.0.1"),
            ("10.0.0.1".to_string(), crate::frame::DEFAULT_PORT)
        );
    }

    #[test]
    fn start_offset_resolves_each_position() {
        let cfg = StandaloneConfig::new("c", 1).with_start_position(SeekPosition::Beginning);
        assert_eq!(cfg.start_offset(), 0);

        let cfg = StandaloneConfig::new("c", 1).with_start_position(SeekPosition::Offset(77));
        assert_eq!(cfg.start_offset(), 77);

        let cfg = StandaloneConfig::new("c", 1).with_start_position(SeekPosition::End);
        assert_eq!(cfg.start_offset(), u64::MAX >> 1);
    }

    #[test]
    fn exponential_backoff_vector() {
        let cfg = ReconnectConfig {
            base_delay_ms: 100,
            max_delay_ms: 500,
            max_attempts: 0,
            jitter_factor: 0.0,
        };
        let expected_secs = [0.1, 0.2, 0.4, 0.5, 0.5];
        for (attempt, expected) in expected_secs.iter().enumerate() {
            let delay = cfg.delay_for_attempt(attempt as u32).as_secs_f64();
            assert!(
                (delay - expected).abs() < 1e-9,
                "attempt {attempt}: expected {expected}, got {delay}"
            );
        }
    }

    #[test]
    fn backoff_is_bounded_by_max_plus_jitter() {
        let cfg = ReconnectConfig {
            base_delay_ms: 100,
            max_delay_ms: 500,
            max_attempts: 0,
            jitter_factor: 0.1,
        };
        for attempt in 0..10 {
            let delay_ms = cfg.delay_for_attempt(attempt).as_secs_f64() * 1000.0;
            let lower = (cfg.base_delay_ms * 2u64.pow(attempt)).min(cfg.max_delay_ms) as f64;
            let upper = cfg.max_delay_ms as f64 + cfg.max_delay_ms as f64 * cfg.jitter_factor;
            assert!(delay_ms >= lower - 1e-6, "attempt {attempt}: {delay_ms} < {lower}");
            assert!(delay_ms <= upper + 1e-6, "attempt {attempt}: {delay_ms} > {upper}");
        }
    }
}
