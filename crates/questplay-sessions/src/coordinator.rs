//! The transactional commit protocol for remote-play event logs.
//!
//! Each commit runs as one `BEGIN IMMEDIATE` transaction on the database
//! thread: load the session row, check for a retried duplicate, advance
//! the counter conditionally, persist the event. Read-check-write is a
//! single atomic unit; a writer holding a stale counter value fails with
//! `ConcurrencyConflict` or `SequenceMismatch` rather than overwriting.

use crate::{generate_secret, SessionError, SessionIdGenerator, SessionResult};
use questplay_database::{queries, AsyncDatabase, NewEvent, NewSession, Session, SessionClientRecord, StoredEvent};
use rusqlite::TransactionBehavior;
use tracing::{debug, info};

/// Terminal outcome of a commit attempt, resolved inside the transaction.
enum CommitDecision {
    /// Counter advanced and event persisted under this id.
    Committed(i64),
    /// Retried request; the prior id is returned without mutation.
    Duplicate(i64),
    UnknownSession,
    /// Another writer advanced the counter since the caller read it.
    Conflict,
    /// Client-asserted id does not follow the counter.
    Mismatch { expected: i64, got: i64 },
}

/// Coordinates session lifecycle and event-log commits.
///
/// Cheap to clone; all clones share the database executor and the id
/// generator.
#[derive(Clone)]
pub struct SessionCoordinator {
    db: AsyncDatabase,
    ids: std::sync::Arc<SessionIdGenerator>,
}

impl SessionCoordinator {
    pub fn new(db: AsyncDatabase) -> Self {
        Self {
            db,
            ids: std::sync::Arc::new(SessionIdGenerator::new()),
        }
    }

    /// Create a new unlocked session with a fresh secret and a zeroed
    /// event counter. The id is never exposed until a successful join.
    pub async fn create_session(&self) -> SessionResult<Session> {
        let new_session = NewSession {
            id: self.ids.next_id(),
            secret: generate_secret(),
        };

        let session = self
            .db
            .call(move |conn| queries::insert_session(conn, &new_session))
            .await?;

        info!(session_id = session.id, "Created session");
        Ok(session)
    }

    /// Look up a session by id.
    pub async fn get_session(&self, id: i64) -> SessionResult<Session> {
        self.db
            .call(move |conn| queries::get_session(conn, id))
            .await?
            .ok_or(SessionError::UnknownSession(id))
    }

    /// Join a session by secret, recording the client's membership.
    ///
    /// Locked sessions are invisible here even with the correct secret.
    pub async fn join_session(&self, secret: &str, client: &str) -> SessionResult<Session> {
        let secret = secret.to_string();
        let client = client.to_string();

        let session = self
            .db
            .call(move |conn| {
                let session = match queries::get_session_by_secret(conn, &secret)? {
                    Some(s) => s,
                    None => return Ok(None),
                };
                queries::upsert_session_client(conn, session.id, &client, &secret)?;
                Ok(Some(session))
            })
            .await?
            .ok_or(SessionError::NotFound)?;

        info!(session_id = session.id, "Client joined session");
        Ok(session)
    }

    /// Check a WebSocket upgrade's (session, client, secret) against the
    /// join records.
    pub async fn verify_client(&self, session: i64, client: &str, secret: &str) -> SessionResult<bool> {
        let client = client.to_string();
        let secret = secret.to_string();
        Ok(self
            .db
            .call(move |conn| queries::verify_session_client(conn, session, &client, &secret))
            .await?)
    }

    /// Commit an event whose sequence number the server assigns.
    ///
    /// Returns the committed id. A submission identical to the last
    /// committed event is a retried request and returns the existing id
    /// without advancing the counter.
    pub async fn commit_event_without_id(
        &self,
        session: i64,
        client: Option<String>,
        instance: Option<String>,
        event_type: String,
        json: String,
    ) -> SessionResult<i64> {
        let decision = self
            .db
            .call(move |conn| {
                let txn = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

                let s = match queries::get_session(&txn, session)? {
                    Some(s) => s,
                    None => return Ok(CommitDecision::UnknownSession),
                };

                if let Some(last) = queries::get_last_event(&txn, session)? {
                    if last.matches_request(client.as_deref(), instance.as_deref(), &event_type, &json)
                    {
                        return Ok(CommitDecision::Duplicate(s.event_counter));
                    }
                }

                let next = s.event_counter + 1;
                if !queries::advance_counter(&txn, session, s.event_counter, next)? {
                    return Ok(CommitDecision::Conflict);
                }

                queries::upsert_event(
                    &txn,
                    &NewEvent {
                        session_id: session,
                        id: next,
                        client,
                        instance,
                        event_type,
                        json,
                    },
                )?;

                txn.commit()?;
                Ok(CommitDecision::Committed(next))
            })
            .await?;

        self.resolve(session, decision)
    }

    /// Commit an event at the client-asserted sequence number.
    ///
    /// The id must be exactly `event_counter + 1`; anything else means the
    /// client's view of the log is stale and it must resynchronize via
    /// [`Self::events_after`]. A retried submission of an
    /// already-committed event is absorbed and returns success.
    pub async fn commit_event(
        &self,
        session: i64,
        client: Option<String>,
        instance: Option<String>,
        event_id: i64,
        event_type: String,
        json: String,
    ) -> SessionResult<i64> {
        let decision = self
            .db
            .call(move |conn| {
                let txn = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

                let s = match queries::get_session(&txn, session)? {
                    Some(s) => s,
                    None => return Ok(CommitDecision::UnknownSession),
                };

                if let Some(existing) = queries::get_event_by_id(&txn, session, event_id)? {
                    if existing.matches_request(
                        client.as_deref(),
                        instance.as_deref(),
                        &event_type,
                        &json,
                    ) {
                        // Clients retry requests; an already-committed
                        // event is success, not a second commit.
                        return Ok(CommitDecision::Duplicate(event_id));
                    }
                }

                let expected = s.event_counter + 1;
                if expected != event_id {
                    return Ok(CommitDecision::Mismatch {
                        expected,
                        got: event_id,
                    });
                }

                if !queries::advance_counter(&txn, session, s.event_counter, event_id)? {
                    return Ok(CommitDecision::Conflict);
                }

                queries::upsert_event(
                    &txn,
                    &NewEvent {
                        session_id: session,
                        id: event_id,
                        client,
                        instance,
                        event_type,
                        json,
                    },
                )?;

                txn.commit()?;
                Ok(CommitDecision::Committed(event_id))
            })
            .await?;

        self.resolve(session, decision)
    }

    /// Fetch all events after `start`, ascending by id. The catch-up
    /// primitive for reconnecting clients.
    pub async fn events_after(&self, session: i64, start: i64) -> SessionResult<Vec<StoredEvent>> {
        Ok(self
            .db
            .call(move |conn| queries::get_events_after(conn, session, start))
            .await?)
    }

    /// Lock a session, hiding it from join-by-secret.
    pub async fn lock_session(&self, session: i64) -> SessionResult<()> {
        let updated = self
            .db
            .call(move |conn| queries::set_locked(conn, session, true))
            .await?;
        if !updated {
            return Err(SessionError::UnknownSession(session));
        }
        info!(session_id = session, "Session locked");
        Ok(())
    }

    /// List a client's session memberships.
    pub async fn sessions_for_client(&self, client: &str) -> SessionResult<Vec<SessionClientRecord>> {
        let client = client.to_string();
        Ok(self
            .db
            .call(move |conn| queries::get_sessions_by_client(conn, &client))
            .await?)
    }

    fn resolve(&self, session: i64, decision: CommitDecision) -> SessionResult<i64> {
        match decision {
            CommitDecision::Committed(id) => {
                debug!(session_id = session, event_id = id, "Committed event");
                Ok(id)
            }
            CommitDecision::Duplicate(id) => {
                debug!(session_id = session, event_id = id, "Absorbed retried event");
                Ok(id)
            }
            CommitDecision::UnknownSession => Err(SessionError::UnknownSession(session)),
            CommitDecision::Conflict => Err(SessionError::ConcurrencyConflict),
            CommitDecision::Mismatch { expected, got } => {
                Err(SessionError::SequenceMismatch { expected, got })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn make_coordinator() -> SessionCoordinator {
        let db = AsyncDatabase::in_memory().await.unwrap();
        SessionCoordinator::new(db)
    }

    fn c(s: &str) -> Option<String> {
        Some(s.to_string())
    }

    // =========================================================================
    // Session lifecycle
    // =========================================================================

    #[tokio::test]
    async fn create_session_starts_unlocked_at_zero() {
        let coord = make_coordinator().await;
        let session = coord.create_session().await.unwrap();

        assert_eq!(session.event_counter, 0);
        assert!(!session.locked);
        assert_eq!(session.secret.len(), crate::SECRET_LEN);
    }

    #[tokio::test]
    async fn created_sessions_have_distinct_ids() {
        let coord = make_coordinator().await;
        let a = coord.create_session().await.unwrap();
        let b = coord.create_session().await.unwrap();
        assert_ne!(a.id, b.id);
    }

    #[tokio::test]
    async fn join_session_by_secret() {
        let coord = make_coordinator().await;
        let created = coord.create_session().await.unwrap();

        let joined = coord.join_session(&created.secret, "client-1").await.unwrap();
        assert_eq!(joined.id, created.id);

        // Membership recorded for websocket authorization
        assert!(coord
            .verify_client(created.id, "client-1", &created.secret)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn join_with_unknown_secret_fails() {
        let coord = make_coordinator().await;
        coord.create_session().await.unwrap();

        let result = coord.join_session("ZZZZZZ", "client-1").await;
        assert!(matches!(result, Err(SessionError::NotFound)));
    }

    #[tokio::test]
    async fn locked_session_rejects_joins() {
        let coord = make_coordinator().await;
        let session = coord.create_session().await.unwrap();
        coord.lock_session(session.id).await.unwrap();

        let result = coord.join_session(&session.secret, "client-1").await;
        assert!(matches!(result, Err(SessionError::NotFound)));
    }

    #[tokio::test]
    async fn lock_unknown_session_fails() {
        let coord = make_coordinator().await;
        let result = coord.lock_session(12345).await;
        assert!(matches!(result, Err(SessionError::UnknownSession(12345))));
    }

    #[tokio::test]
    async fn get_session_unknown_id() {
        let coord = make_coordinator().await;
        let result = coord.get_session(4242).await;
        assert!(matches!(result, Err(SessionError::UnknownSession(4242))));
    }

    // =========================================================================
    // Server-assigned commits
    // =========================================================================

    #[tokio::test]
    async fn commit_without_id_assigns_dense_sequence() {
        let coord = make_coordinator().await;
        let session = coord.create_session().await.unwrap();

        for expected in 1..=5 {
            let id = coord
                .commit_event_without_id(
                    session.id,
                    c("c1"),
                    c("i1"),
                    "move".to_string(),
                    format!(r#"{{"step":{}}}"#, expected),
                )
                .await
                .unwrap();
            assert_eq!(id, expected);
        }

        // Density invariant: ids are exactly {1..5}
        let events = coord.events_after(session.id, 0).await.unwrap();
        let ids: Vec<i64> = events.iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![1, 2, 3, 4, 5]);
    }

    #[tokio::test]
    async fn commit_without_id_unknown_session() {
        let coord = make_coordinator().await;
        let result = coord
            .commit_event_without_id(999, c("c1"), c("i1"), "join".to_string(), "{}".to_string())
            .await;
        assert!(matches!(result, Err(SessionError::UnknownSession(999))));
    }

    #[tokio::test]
    async fn duplicate_retry_returns_same_id_without_advancing() {
        let coord = make_coordinator().await;
        let session = coord.create_session().await.unwrap();

        let first = coord
            .commit_event_without_id(
                session.id,
                c("c1"),
                c("i1"),
                "join".to_string(),
                "{}".to_string(),
            )
            .await
            .unwrap();
        let second = coord
            .commit_event_without_id(
                session.id,
                c("c1"),
                c("i1"),
                "join".to_string(),
                "{}".to_string(),
            )
            .await
            .unwrap();

        assert_eq!(first, 1);
        assert_eq!(second, 1);

        // Counter advanced once, no second row
        let session = coord.get_session(session.id).await.unwrap();
        assert_eq!(session.event_counter, 1);
        assert_eq!(coord.events_after(session.id, 0).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn same_payload_from_other_client_is_not_a_duplicate() {
        let coord = make_coordinator().await;
        let session = coord.create_session().await.unwrap();

        let a = coord
            .commit_event_without_id(
                session.id,
                c("c1"),
                c("i1"),
                "join".to_string(),
                "{}".to_string(),
            )
            .await
            .unwrap();
        let b = coord
            .commit_event_without_id(
                session.id,
                c("c2"),
                c("i1"),
                "join".to_string(),
                "{}".to_string(),
            )
            .await
            .unwrap();

        assert_eq!(a, 1);
        assert_eq!(b, 2);
    }

    #[tokio::test]
    async fn concurrent_commits_get_distinct_ids() {
        let coord = make_coordinator().await;
        let session = coord.create_session().await.unwrap();

        let c1 = coord.clone();
        let c2 = coord.clone();
        let id = session.id;
        let (a, b) = tokio::join!(
            c1.commit_event_without_id(id, c("c1"), c("i1"), "move".to_string(), r#"{"x":1}"#.to_string()),
            c2.commit_event_without_id(id, c("c2"), c("i2"), "move".to_string(), r#"{"x":2}"#.to_string()),
        );

        let mut ids = vec![a.unwrap(), b.unwrap()];
        ids.sort_unstable();
        assert_eq!(ids, vec![1, 2]);
    }

    // =========================================================================
    // Client-assigned commits
    // =========================================================================

    #[tokio::test]
    async fn commit_event_accepts_the_next_id() {
        let coord = make_coordinator().await;
        let session = coord.create_session().await.unwrap();

        let id = coord
            .commit_event(
                session.id,
                c("c1"),
                c("i1"),
                1,
                "join".to_string(),
                "{}".to_string(),
            )
            .await
            .unwrap();
        assert_eq!(id, 1);
    }

    #[tokio::test]
    async fn commit_event_retry_is_idempotent() {
        let coord = make_coordinator().await;
        let session = coord.create_session().await.unwrap();

        for _ in 0..2 {
            let id = coord
                .commit_event(
                    session.id,
                    c("c1"),
                    c("i1"),
                    1,
                    "join".to_string(),
                    "{}".to_string(),
                )
                .await
                .unwrap();
            assert_eq!(id, 1);
        }

        let session = coord.get_session(session.id).await.unwrap();
        assert_eq!(session.event_counter, 1);
    }

    #[tokio::test]
    async fn stale_client_gets_sequence_mismatch() {
        let coord = make_coordinator().await;
        let session = coord.create_session().await.unwrap();

        // Counter reaches 2
        for event_id in 1..=2 {
            coord
                .commit_event(
                    session.id,
                    c("c1"),
                    c("i1"),
                    event_id,
                    "move".to_string(),
                    format!(r#"{{"n":{}}}"#, event_id),
                )
                .await
                .unwrap();
        }

        // Client asserts event 5 while the counter is 2
        let result = coord
            .commit_event(
                session.id,
                c("c1"),
                c("i1"),
                5,
                "move".to_string(),
                r#"{"n":5}"#.to_string(),
            )
            .await;
        assert!(matches!(
            result,
            Err(SessionError::SequenceMismatch { expected: 3, got: 5 })
        ));
    }

    #[tokio::test]
    async fn commit_event_unknown_session() {
        let coord = make_coordinator().await;
        let result = coord
            .commit_event(777, c("c1"), c("i1"), 1, "join".to_string(), "{}".to_string())
            .await;
        assert!(matches!(result, Err(SessionError::UnknownSession(777))));
    }

    #[tokio::test]
    async fn racing_client_asserted_commits_pick_one_winner() {
        let coord = make_coordinator().await;
        let session = coord.create_session().await.unwrap();

        let c1 = coord.clone();
        let c2 = coord.clone();
        let id = session.id;
        let (a, b) = tokio::join!(
            c1.commit_event(id, c("c1"), c("i1"), 1, "move".to_string(), r#"{"x":1}"#.to_string()),
            c2.commit_event(id, c("c2"), c("i2"), 1, "move".to_string(), r#"{"x":2}"#.to_string()),
        );

        // Exactly one wins id 1; the loser sees a mismatch and must
        // resynchronize.
        let outcomes = [a, b];
        let wins = outcomes.iter().filter(|r| r.is_ok()).count();
        assert_eq!(wins, 1);
        assert!(outcomes
            .iter()
            .any(|r| matches!(r, Err(SessionError::SequenceMismatch { .. }))));

        let session = coord.get_session(id).await.unwrap();
        assert_eq!(session.event_counter, 1);
    }

    // =========================================================================
    // Catch-up
    // =========================================================================

    #[tokio::test]
    async fn events_after_orders_and_filters() {
        let coord = make_coordinator().await;
        let session = coord.create_session().await.unwrap();

        for n in 1..=4 {
            coord
                .commit_event_without_id(
                    session.id,
                    c("c1"),
                    c("i1"),
                    "move".to_string(),
                    format!(r#"{{"n":{}}}"#, n),
                )
                .await
                .unwrap();
        }

        let events = coord.events_after(session.id, 2).await.unwrap();
        let ids: Vec<i64> = events.iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![3, 4]);
        assert!(events.iter().all(|e| e.id > 2));
    }

    // =========================================================================
    // End-to-end scenarios
    // =========================================================================

    #[tokio::test]
    async fn join_retry_then_move_scenario() {
        let coord = make_coordinator().await;
        let session = coord.create_session().await.unwrap();

        // Commit event 1
        let id = coord
            .commit_event(
                session.id,
                c("c1"),
                c("i1"),
                1,
                "join".to_string(),
                "{}".to_string(),
            )
            .await
            .unwrap();
        assert_eq!(id, 1);

        // Identical retry: same id, no new row
        let id = coord
            .commit_event(
                session.id,
                c("c1"),
                c("i1"),
                1,
                "join".to_string(),
                "{}".to_string(),
            )
            .await
            .unwrap();
        assert_eq!(id, 1);
        assert_eq!(coord.events_after(session.id, 0).await.unwrap().len(), 1);

        // Server-assigned move lands at 2
        let id = coord
            .commit_event_without_id(
                session.id,
                c("c1"),
                c("i1"),
                "move".to_string(),
                r#"{"x":1}"#.to_string(),
            )
            .await
            .unwrap();
        assert_eq!(id, 2);
    }

    #[tokio::test]
    async fn sessions_for_client_reports_history() {
        let coord = make_coordinator().await;
        let a = coord.create_session().await.unwrap();
        let b = coord.create_session().await.unwrap();
        coord.join_session(&a.secret, "client-1").await.unwrap();
        coord.join_session(&b.secret, "client-1").await.unwrap();

        let history = coord.sessions_for_client("client-1").await.unwrap();
        assert_eq!(history.len(), 2);
    }
}
