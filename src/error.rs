//! Error taxonomy for the Lance client.
//!
//! Mirrors the reference implementation's exception hierarchy as a single
//! `thiserror`-derived enum, with [`LanceError::retryable`] replacing
//! `is_retryable()`.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, LanceError>;

#[derive(Debug, Error)]
pub enum LanceError {
    /// TCP refused/closed, DNS failure, or another OS-level I/O error.
    #[error("connection error: {0}")]
    Connection(String),

    /// A deadline elapsed on connect/read/ack/flush.
    #[error("timeout: {0}")]
    Timeout(String),

    /// The server signaled backpressure (or returned code 0x30/0x31).
    #[error("backpressure: {0}")]
    Backpressure(String),

    /// The server has not yet replicated to the requested offset.
    #[error("server catching up (at offset {server_offset})")]
    ServerCatchingUp { server_offset: u64 },

    /// This node is not the cluster leader; `leader_addr` carries a redirect.
    #[error("not leader{}", leader_addr.as_ref().map(|a| format!(" — redirect to {a}")).unwrap_or_default())]
    NotLeader { leader_addr: Option<String> },

    /// Version mismatch, payload too large, or another malformed-payload
    /// condition that is not a CRC/framing failure.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Magic mismatch, header/payload CRC failure, or a truncated header.
    #[error("invalid frame: {0}")]
    InvalidFrame(String),

    /// The specified topic ID or name does not exist.
    #[error("topic not found: {0}")]
    TopicNotFound(String),

    /// A topic with the specified name already exists.
    #[error("topic already exists: {0}")]
    TopicAlreadyExists(String),

    /// The client is not authorized for the requested operation.
    #[error("access denied: {0}")]
    AccessDenied(String),

    /// Generic/unclassified Lance server error.
    #[error("lance error: {0}")]
    Lance(String),
}

impl LanceError {
    /// Whether this error is transient and the operation can be retried.
    pub fn retryable(&self) -> bool {
        matches!(
            self,
            LanceError::Connection(_)
                | LanceError::Timeout(_)
                | LanceError::Backpressure(_)
                | LanceError::ServerCatchingUp { .. }
                | LanceError::NotLeader { .. }
        )
    }
}

impl From<std::io::Error> for LanceError {
    fn from(e: std::io::Error) -> Self {
        if e.kind() == std::io::ErrorKind::TimedOut {
            LanceError::Timeout(e.to_string())
        } else {
            LanceError::Connection(e.to_string())
        }
    }
}

impl From<serde_json::Error> for LanceError {
    fn from(e: serde_json::Error) -> Self {
        LanceError::Protocol(format!("JSON error: {e}"))
    }
}

/// Server error-code → [`LanceError`] mapping, normative per §6/§7 of the
/// protocol specification.
pub fn error_from_response(code: u32, message: String, details: Option<&serde_json::Value>) -> LanceError {
    match code {
        0x10 | 0x13 => LanceError::TopicNotFound(message),
        0x11 => LanceError::TopicAlreadyExists(message),
        0x14 => {
            let server_offset = details
                .and_then(|d| d.get("server_offset"))
                .and_then(|v| v.as_u64())
                .unwrap_or(0);
            LanceError::ServerCatchingUp { server_offset }
        }
        0x20 => {
            let leader_addr = details
                .and_then(|d| d.get("leader_addr"))
                .and_then(|v| v.as_str())
                .map(str::to_owned);
            LanceError::NotLeader { leader_addr }
        }
        0x30 | 0x31 => LanceError::Backpressure(message),
        0x40..=0x42 => LanceError::AccessDenied(message),
        // 0x01, 0x50-0x61, and any other unlisted code are generic/unclassified
        // per the normative server-code table (§7).
        _ => LanceError::Lance(message),
    }
}

/// Parse a control-frame `ErrorResponse` JSON body into a [`LanceError`],
/// falling back to a generic [`LanceError::Lance`] when the body is not
/// valid `{code, message, details}` JSON.
pub fn parse_error_response_body(body: &[u8]) -> LanceError {
    let parsed: serde_json::Value = match serde_json::from_slice(body) {
        Ok(v) => v,
        Err(_) => return LanceError::Lance(String::from_utf8_lossy(body).into_owned()),
    };

    let code = parsed.get("code").and_then(serde_json::Value::as_u64).unwrap_or(0) as u32;
    let message = parsed
        .get("message")
        .and_then(serde_json::Value::as_str)
        .unwrap_or("unknown server error")
        .to_string();
    let details = parsed.get("details");

    error_from_response(code, message, details)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_and_timeout_are_retryable() {
        assert!(LanceError::Connection("x".into()).retryable());
        assert!(LanceError::Timeout("x".into()).retryable());
        assert!(LanceError::Backpressure("x".into()).retryable());
        assert!(LanceError::ServerCatchingUp { server_offset: 0 }.retryable());
        assert!(LanceError::NotLeader { leader_addr: None }.retryable());
    }

    #[test]
    fn protocol_and_invalid_frame_are_not_retryable() {
        assert!(!LanceError::Protocol("x".into()).retryable());
        assert!(!LanceError::InvalidFrame("x".into()).retryable());
        assert!(!LanceError::TopicNotFound("x".into()).retryable());
        assert!(!LanceError::TopicAlreadyExists("x".into()).retryable());
        assert!(!LanceError::AccessDenied("x".into()).retryable());
        assert!(!LanceError::Lance("x".into()).retryable());
    }

    #[test]
    fn code_table_matches_spec() {
        assert!(matches!(
            error_from_response(0x10, "nope".into(), None),
            LanceError::TopicNotFound(_)
        ));
        assert!(matches!(
            error_from_response(0x11, "nope".into(), None),
            LanceError::TopicAlreadyExists(_)
        ));
        assert!(matches!(
            error_from_response(0x40, "nope".into(), None),
            LanceError::AccessDenied(_)
        ));
        assert!(matches!(
            error_from_response(0x9999, "mystery".into(), None),
            LanceError::Lance(_)
        ));
        // Codes in the generic bucket (0x01, 0x50-0x61) and anything else not
        // explicitly classified fall through to Lance, per the normative table.
        for code in [0x01, 0x50, 0x61, 0x62] {
            assert!(matches!(
                error_from_response(code, "generic".into(), None),
                LanceError::Lance(_)
            ));
        }
    }

    #[test]
    fn not_leader_parses_redirect_address() {
        let details = serde_json::json!({ "leader_addr": "10.0.0.5:1992" });
        let err = error_from_response(0x20, "not leader".into(), Some(&details));
        match err {
            LanceError::NotLeader { leader_addr } => {
                assert_eq!(leader_addr.as_deref(), Some("10.0.0.5:1992"));
            }
            other => panic!("expected NotLeader, got {other:?}"),
        }
    }

    #[test]
    fn catching_up_parses_server_offset_default_zero() {
        let err = error_from_response(0x14, "catching up".into(), None);
        match err {
            LanceError::ServerCatchingUp { server_offset } => assert_eq!(server_offset, 0),
            other => panic!("expected ServerCatchingUp, got {other:?}"),
        }
    }
}
