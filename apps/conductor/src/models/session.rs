use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

use crate::mailbox::{MailboxError, Session};

#[derive(Debug, Clone, FromRow)]
pub struct SessionRow {
    pub id: Uuid,
    pub vacancy_ref: i64,
    pub candidate_ref: i64,
    pub lifecycle_state: String,
    pub attempts: i32,
    pub claimed_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct DocumentsRow {
    pub vacancy_text: String,
    pub resume_text: String,
}

impl TryFrom<SessionRow> for Session {
    type Error = MailboxError;

    fn try_from(row: SessionRow) -> Result<Self, Self::Error> {
        Ok(Session {
            id: row.id,
            vacancy_ref: row.vacancy_ref,
            candidate_ref: row.candidate_ref,
            lifecycle_state: row.lifecycle_state.parse()?,
            attempts: row.attempts,
            claimed_by: row.claimed_by,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}
