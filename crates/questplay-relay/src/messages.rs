//! Remote-play protocol frames.

use serde::{Deserialize, Serialize};

/// An event submission from a peer, or a committed event broadcast back out.
///
/// `id` is absent on submission when the peer wants the server to assign the
/// sequence number; broadcasts always carry the committed id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventFrame {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance: Option<String>,
    #[serde(rename = "type")]
    pub event_type: String,
    pub json: String,
}

impl EventFrame {
    /// The broadcast form of this frame after a successful commit.
    pub fn committed(mut self, id: i64) -> Self {
        self.id = Some(id);
        self
    }

    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// Terminal reply to the submitting peer.
///
/// Every commit attempt yields exactly one of these - never a silent drop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServerFrame {
    InflightCommit {
        id: i64,
    },
    InflightReject {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<i64>,
        error: String,
    },
}

impl ServerFrame {
    pub fn commit(id: i64) -> Self {
        Self::InflightCommit { id }
    }

    pub fn reject(id: Option<i64>, error: impl Into<String>) -> Self {
        Self::InflightReject {
            id,
            error: error.into(),
        }
    }

    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
