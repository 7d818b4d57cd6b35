//! Presence protocol messages
//!
//! Frames are JSON text objects tagged by `"type"`:
//!
//! ```text
//! client → server   {"type":"userLogin","userId":"42"}
//! server → client   {"type":"activeUsersCount","count":3}
//! server → client   {"type":"error","message":"..."}
//! ```

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::Result;

/// Message sent by a client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientMessage {
    /// Claim a user identity for this connection
    ///
    /// Numeric ids are accepted and kept in their decimal form.
    #[serde(rename_all = "camelCase")]
    UserLogin {
        #[serde(deserialize_with = "string_or_number")]
        user_id: String,
    },
}

impl ClientMessage {
    /// Parse a text frame
    pub fn decode(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }
}

/// Message sent by the server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerMessage {
    /// Number of distinct users currently online
    ActiveUsersCount { count: usize },
    /// A client frame was rejected
    Error { message: String },
}

impl ServerMessage {
    /// Create an error message
    pub fn error(message: impl Into<String>) -> Self {
        ServerMessage::Error {
            message: message.into(),
        }
    }

    /// Serialize to a text frame
    pub fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

fn string_or_number<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Text(String),
        Number(serde_json::Number),
    }

    Ok(match RawId::deserialize(deserializer)? {
        RawId::Text(text) => text,
        RawId::Number(number) => number.to_string(),
    })
}
