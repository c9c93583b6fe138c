//! Mailbox Store: the durable, append-only envelope log plus the session
//! lifecycle table. It is the only resource shared between conductor
//! processes and candidate clients.
//!
//! `MailboxStore` is carried as `Arc<dyn MailboxStore>`; `PgMailbox` is the
//! production backend.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

pub mod handlers;
pub mod postgres;

#[cfg(test)]
pub mod memory;

// ────────────────────────────────────────────────────────────────────────────
// Enumerations stored as TEXT
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    ToCandidate,
    FromCandidate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryState {
    New,
    Done,
}

/// `pending → claimed → active → closed`, or back to `pending` on abort.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    Pending,
    Claimed,
    Active,
    Closed,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::ToCandidate => "to_candidate",
            Direction::FromCandidate => "from_candidate",
        }
    }
}

impl DeliveryState {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryState::New => "new",
            DeliveryState::Done => "done",
        }
    }
}

impl LifecycleState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleState::Pending => "pending",
            LifecycleState::Claimed => "claimed",
            LifecycleState::Active => "active",
            LifecycleState::Closed => "closed",
        }
    }
}

impl FromStr for Direction {
    type Err = MailboxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "to_candidate" => Ok(Direction::ToCandidate),
            "from_candidate" => Ok(Direction::FromCandidate),
            other => Err(MailboxError::Corrupt(format!("unknown direction '{other}'"))),
        }
    }
}

impl FromStr for DeliveryState {
    type Err = MailboxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "new" => Ok(DeliveryState::New),
            "done" => Ok(DeliveryState::Done),
            other => Err(MailboxError::Corrupt(format!(
                "unknown delivery state '{other}'"
            ))),
        }
    }
}

impl FromStr for LifecycleState {
    type Err = MailboxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(LifecycleState::Pending),
            "claimed" => Ok(LifecycleState::Claimed),
            "active" => Ok(LifecycleState::Active),
            "closed" => Ok(LifecycleState::Closed),
            other => Err(MailboxError::Corrupt(format!(
                "unknown lifecycle state '{other}'"
            ))),
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Domain records
// ────────────────────────────────────────────────────────────────────────────

/// One end-to-end automated interview attempt tied to a candidate/vacancy pair.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Session {
    pub id: Uuid,
    pub vacancy_ref: i64,
    pub candidate_ref: i64,
    pub lifecycle_state: LifecycleState,
    /// Number of times the session has been claimed.
    pub attempts: i32,
    /// Token of the current (or last) claim. Lifecycle writes are fenced on it.
    pub claimed_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One directional message unit. `seq` is the creation-order key.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Envelope {
    pub id: Uuid,
    pub seq: i64,
    pub session_id: Uuid,
    pub direction: Direction,
    pub body: String,
    pub delivery_state: DeliveryState,
    pub created_at: DateTime<Utc>,
    pub consumed_at: Option<DateTime<Utc>>,
}

/// Source documents the question lists are built from. Missing documents read
/// as empty text.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Documents {
    pub vacancy_text: String,
    pub resume_text: String,
}

// ────────────────────────────────────────────────────────────────────────────
// Errors
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum MailboxError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Session not found: {0}")]
    SessionNotFound(Uuid),

    #[error("Envelope not found: {0}")]
    EnvelopeNotFound(Uuid),

    #[error("Corrupt mailbox row: {0}")]
    Corrupt(String),

    #[error("Mailbox store unavailable: {0}")]
    Unavailable(String),
}

impl MailboxError {
    /// Errors worth retrying with backoff. Missing rows and corrupt data are
    /// final; connectivity problems are not.
    pub fn is_transient(&self) -> bool {
        match self {
            MailboxError::Database(e) => matches!(
                e,
                sqlx::Error::Io(_)
                    | sqlx::Error::PoolTimedOut
                    | sqlx::Error::PoolClosed
                    | sqlx::Error::WorkerCrashed
                    | sqlx::Error::Protocol(_)
            ),
            MailboxError::Unavailable(_) => true,
            MailboxError::SessionNotFound(_)
            | MailboxError::EnvelopeNotFound(_)
            | MailboxError::Corrupt(_) => false,
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Store trait
// ────────────────────────────────────────────────────────────────────────────

/// Every operation is a single atomic, row-level statement.
#[async_trait]
pub trait MailboxStore: Send + Sync {
    /// Enrollment: inserts a new `pending` session.
    async fn create_session(
        &self,
        vacancy_ref: i64,
        candidate_ref: i64,
    ) -> Result<Session, MailboxError>;

    async fn get_session(&self, id: Uuid) -> Result<Session, MailboxError>;

    /// `pending` sessions, oldest first.
    async fn pending_sessions(&self, limit: i64) -> Result<Vec<Session>, MailboxError>;

    /// Exclusive claim `pending → claimed` under the token `owner`. First
    /// writer wins; a repeat by the same owner succeeds and counts one attempt.
    async fn claim(&self, id: Uuid, owner: Uuid) -> Result<bool, MailboxError>;

    /// Compare-and-set on the lifecycle column, fenced on the claim owner.
    /// Returns `false` when the session is not in `from` under `owner`. A
    /// session already in `to` under `owner` counts as applied, so a retried
    /// write whose acknowledgement was lost still succeeds.
    async fn transition(
        &self,
        id: Uuid,
        owner: Uuid,
        from: LifecycleState,
        to: LifecycleState,
    ) -> Result<bool, MailboxError>;

    /// Refreshes the lease heartbeat (`updated_at`). Returns `false` once the
    /// session is no longer `claimed`/`active` under `owner`.
    async fn renew_lease(&self, id: Uuid, owner: Uuid) -> Result<bool, MailboxError>;

    /// Moves `claimed`/`active` sessions whose heartbeat is older than
    /// `stale_after` back to `pending`. Returns their ids.
    async fn expire_leases(&self, stale_after: Duration) -> Result<Vec<Uuid>, MailboxError>;

    async fn documents(&self, session: &Session) -> Result<Documents, MailboxError>;

    /// Appends an envelope in state `new` under a caller-chosen id. Replaying
    /// an id returns the stored envelope instead of appending a second one.
    async fn append(
        &self,
        envelope_id: Uuid,
        session_id: Uuid,
        direction: Direction,
        body: &str,
    ) -> Result<Envelope, MailboxError>;

    /// Appends under a fresh id.
    async fn enqueue(
        &self,
        session_id: Uuid,
        direction: Direction,
        body: &str,
    ) -> Result<Envelope, MailboxError> {
        self.append(Uuid::new_v4(), session_id, direction, body)
            .await
    }

    /// Matching envelopes in creation order.
    async fn poll(
        &self,
        session_id: Uuid,
        direction: Direction,
        state: DeliveryState,
    ) -> Result<Vec<Envelope>, MailboxError>;

    /// `new → done`. Consuming an already-consumed envelope is a no-op.
    async fn mark_consumed(&self, envelope_id: Uuid) -> Result<(), MailboxError>;

    /// The full envelope log of a session in creation order.
    async fn transcript(&self, session_id: Uuid) -> Result<Vec<Envelope>, MailboxError>;
}
