use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

use crate::mailbox::{Envelope, MailboxError};

#[derive(Debug, Clone, FromRow)]
pub struct EnvelopeRow {
    pub seq: i64,
    pub id: Uuid,
    pub session_id: Uuid,
    pub direction: String,
    pub body: String,
    pub delivery_state: String,
    pub created_at: DateTime<Utc>,
    pub consumed_at: Option<DateTime<Utc>>,
}

impl TryFrom<EnvelopeRow> for Envelope {
    type Error = MailboxError;

    fn try_from(row: EnvelopeRow) -> Result<Self, Self::Error> {
        Ok(Envelope {
            id: row.id,
            seq: row.seq,
            session_id: row.session_id,
            direction: row.direction.parse()?,
            body: row.body,
            delivery_state: row.delivery_state.parse()?,
            created_at: row.created_at,
            consumed_at: row.consumed_at,
        })
    }
}
