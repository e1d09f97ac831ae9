//! Database model types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Session record - a remote-play room.
///
/// `event_counter` is both the length of the committed event log and the
/// optimistic-concurrency token guarding it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: i64,
    pub secret: String,
    pub event_counter: i64,
    pub locked: bool,
    pub created_at: DateTime<Utc>,
}

/// Parameters for inserting a new session.
#[derive(Debug, Clone)]
pub struct NewSession {
    pub id: i64,
    pub secret: String,
}

/// Committed event record - one immutable entry in a session's log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredEvent {
    pub session_id: i64,
    pub id: i64,
    pub client: Option<String>,
    pub instance: Option<String>,
    pub event_type: String,
    pub json: String,
    pub timestamp: DateTime<Utc>,
}

impl StoredEvent {
    /// True when this row was written by the same request tuple.
    ///
    /// Retried submissions carry identical (client, instance, type, json);
    /// the coordinator absorbs them without advancing the counter.
    pub fn matches_request(
        &self,
        client: Option<&str>,
        instance: Option<&str>,
        event_type: &str,
        json: &str,
    ) -> bool {
        self.client.as_deref() == client
            && self.instance.as_deref() == instance
            && self.event_type == event_type
            && self.json == json
    }
}

/// Parameters for writing an event row.
#[derive(Debug, Clone)]
pub struct NewEvent {
    pub session_id: i64,
    pub id: i64,
    pub client: Option<String>,
    pub instance: Option<String>,
    pub event_type: String,
    pub json: String,
}

/// Session client record - a participant's join-time capability.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionClientRecord {
    pub session_id: i64,
    pub client: String,
    pub secret: String,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event() -> StoredEvent {
        StoredEvent {
            session_id: 1,
            id: 3,
            client: Some("c1".to_string()),
            instance: Some("i1".to_string()),
            event_type: "move".to_string(),
            json: r#"{"x":1}"#.to_string(),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn matches_request_on_identical_tuple() {
        let e = event();
        assert!(e.matches_request(Some("c1"), Some("i1"), "move", r#"{"x":1}"#));
    }

    #[test]
    fn matches_request_rejects_differing_fields() {
        let e = event();
        assert!(!e.matches_request(Some("c2"), Some("i1"), "move", r#"{"x":1}"#));
        assert!(!e.matches_request(Some("c1"), Some("i2"), "move", r#"{"x":1}"#));
        assert!(!e.matches_request(Some("c1"), Some("i1"), "join", r#"{"x":1}"#));
        assert!(!e.matches_request(Some("c1"), Some("i1"), "move", r#"{"x":2}"#));
    }

    #[test]
    fn matches_request_with_absent_client() {
        let mut e = event();
        e.client = None;
        e.instance = None;
        assert!(e.matches_request(None, None, "move", r#"{"x":1}"#));
        assert!(!e.matches_request(Some("c1"), None, "move", r#"{"x":1}"#));
    }
}
