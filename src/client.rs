//! Lance management client — topic lifecycle and retention control.
//!
//! ```no_run
//! # async fn example() -> lance_client::error::Result<()> {
//! use lance_client::{ClientConfig, LanceClient};
//!
//! let client = LanceClient::connect(ClientConfig::default().with_host("10.0.10.11")).await?;
//! let metadata = client.create_topic("prices").await?;
//! let topic_id = metadata["topic_id"].as_u64().unwrap() as u32;
//! let topics = client.list_topics().await?;
//! client.set_retention(topic_id, 3600, 0).await?;
//! client.close().await;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};

use crate::config::ClientConfig;
use crate::connection::{self, Connection};
use crate::error::{parse_error_response_body, LanceError, Result};
use crate::frame::{self, ControlCommand};

/// Management client for topic CRUD and retention operations.
pub struct LanceClient {
    conn: Arc<Connection>,
    config: ClientConfig,
}

impl LanceClient {
    /// Connect to the Lance management port.
    pub async fn connect(config: ClientConfig) -> Result<Self> {
        let conn = connection::connect(
            config.host.clone(),
            config.port,
            config.keepalive_interval_s,
            config.connect_timeout_s,
        )
        .await?;
        Ok(LanceClient { conn, config })
    }

    /// Close the underlying connection.
    pub async fn close(&self) {
        self.conn.close().await;
    }

    /// Create a topic, returning its metadata as returned by the server.
    pub async fn create_topic(&self, name: &str) -> Result<Value> {
        self.request(ControlCommand::CreateTopic, name.as_bytes(), 0).await
    }

    /// Create a topic with an initial retention policy, returning its metadata.
    pub async fn create_topic_with_retention(&self, name: &str, max_age_secs: u64, max_bytes: u64) -> Result<Value> {
        let payload = frame::build_create_topic_with_retention_payload(name, max_age_secs, max_bytes);
        self.request(ControlCommand::CreateTopicWithRetention, &payload, 0).await
    }

    /// Delete a topic by id.
    pub async fn delete_topic(&self, topic_id: u32) -> Result<()> {
        self.request(ControlCommand::DeleteTopic, &topic_id.to_le_bytes(), topic_id).await?;
        Ok(())
    }

    /// List all topics known to the server.
    pub async fn list_topics(&self) -> Result<Vec<Value>> {
        let body = self.request(ControlCommand::ListTopics, &[], 0).await?;
        match body {
            Value::Array(topics) => Ok(topics),
            Value::Object(ref map) => match map.get("topics") {
                Some(Value::Array(topics)) => Ok(topics.clone()),
                _ => Ok(Vec::new()),
            },
            _ => Ok(Vec::new()),
        }
    }

    /// Fetch metadata for a single topic.
    pub async fn get_topic(&self, topic_id: u32) -> Result<Value> {
        self.request(ControlCommand::GetTopic, &topic_id.to_le_bytes(), topic_id).await
    }

    /// Set the retention policy for a topic, returning the updated metadata.
    /// `max_age_secs == 0` or `max_bytes == 0` means "no limit" for that
    /// dimension.
    pub async fn set_retention(&self, topic_id: u32, max_age_secs: u64, max_bytes: u64) -> Result<Value> {
        let payload = frame::build_set_retention_payload(topic_id, max_age_secs, max_bytes);
        self.request(ControlCommand::SetRetention, &payload, topic_id).await
    }

    // ----- internal -----

    async fn request(&self, command: ControlCommand, payload: &[u8], topic_id: u32) -> Result<Value> {
        let frame = frame::build_control_frame(command, payload, topic_id);
        self.conn.send_frame(&frame).await?;

        let timeout = Duration::from_secs_f64(self.config.request_timeout_s);
        let (header, body) = self.conn.recv_frame(Some(timeout)).await?;

        if !header.is_control() {
            return Err(LanceError::Protocol("expected a control response frame".into()));
        }

        match header.command() {
            Some(ControlCommand::ErrorResponse) => Err(parse_error_response_body(&body)),
            Some(ControlCommand::TopicResponse) => parse_json_body(&body),
            _ => {
                // Lenient fallback for non-standard command echoes: best-effort
                // JSON, otherwise an empty object.
                Ok(parse_json_body(&body).unwrap_or_else(|_| json!({})))
            }
        }
    }
}

fn parse_json_body(body: &[u8]) -> Result<Value> {
    if body.is_empty() {
        return Ok(json!({}));
    }
    Ok(serde_json::from_slice(body)?)
}
