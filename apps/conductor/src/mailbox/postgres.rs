use std::time::Duration;

use async_trait::async_trait;
use sqlx::PgPool;
use tracing::debug;
use uuid::Uuid;

use crate::mailbox::{
    DeliveryState, Direction, Documents, Envelope, LifecycleState, MailboxError, MailboxStore,
    Session,
};
use crate::models::envelope::EnvelopeRow;
use crate::models::session::{DocumentsRow, SessionRow};

const SESSION_COLUMNS: &str =
    "id, vacancy_ref, candidate_ref, lifecycle_state, attempts, claimed_by, created_at, updated_at";
const ENVELOPE_COLUMNS: &str =
    "seq, id, session_id, direction, body, delivery_state, created_at, consumed_at";

/// PostgreSQL-backed mailbox.
/// CRITICAL: envelopes are append-only. The only UPDATE touches `delivery_state`.
#[derive(Clone)]
pub struct PgMailbox {
    pool: PgPool,
}

impl PgMailbox {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MailboxStore for PgMailbox {
    async fn create_session(
        &self,
        vacancy_ref: i64,
        candidate_ref: i64,
    ) -> Result<Session, MailboxError> {
        let row: SessionRow = sqlx::query_as(&format!(
            r#"
            INSERT INTO interview_sessions (id, vacancy_ref, candidate_ref, lifecycle_state)
            VALUES ($1, $2, $3, 'pending')
            RETURNING {SESSION_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(vacancy_ref)
        .bind(candidate_ref)
        .fetch_one(&self.pool)
        .await?;
        row.try_into()
    }

    async fn get_session(&self, id: Uuid) -> Result<Session, MailboxError> {
        let row: Option<SessionRow> = sqlx::query_as(&format!(
            "SELECT {SESSION_COLUMNS} FROM interview_sessions WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.ok_or(MailboxError::SessionNotFound(id))?.try_into()
    }

    async fn pending_sessions(&self, limit: i64) -> Result<Vec<Session>, MailboxError> {
        let rows: Vec<SessionRow> = sqlx::query_as(&format!(
            r#"
            SELECT {SESSION_COLUMNS}
            FROM interview_sessions
            WHERE lifecycle_state = 'pending'
            ORDER BY created_at ASC
            LIMIT $1
            "#
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Session::try_from).collect()
    }

    async fn claim(&self, id: Uuid, owner: Uuid) -> Result<bool, MailboxError> {
        let result = sqlx::query(
            r#"
            UPDATE interview_sessions
            SET lifecycle_state = 'claimed',
                claimed_by = $2,
                attempts = attempts + CASE WHEN lifecycle_state = 'pending' THEN 1 ELSE 0 END,
                updated_at = now()
            WHERE id = $1
              AND (lifecycle_state = 'pending'
                   OR (lifecycle_state = 'claimed' AND claimed_by = $2))
            "#,
        )
        .bind(id)
        .bind(owner)
        .execute(&self.pool)
        .await?;

        let applied = result.rows_affected() == 1;
        debug!(session_id = %id, %owner, applied, "Claim");
        Ok(applied)
    }

    async fn transition(
        &self,
        id: Uuid,
        owner: Uuid,
        from: LifecycleState,
        to: LifecycleState,
    ) -> Result<bool, MailboxError> {
        let result = sqlx::query(
            r#"
            UPDATE interview_sessions
            SET lifecycle_state = $4,
                updated_at = now()
            WHERE id = $1 AND claimed_by = $2 AND lifecycle_state IN ($3, $4)
            "#,
        )
        .bind(id)
        .bind(owner)
        .bind(from.as_str())
        .bind(to.as_str())
        .execute(&self.pool)
        .await?;

        let applied = result.rows_affected() == 1;
        debug!(session_id = %id, %from, %to, applied, "Lifecycle compare-and-set");
        Ok(applied)
    }

    async fn renew_lease(&self, id: Uuid, owner: Uuid) -> Result<bool, MailboxError> {
        let result = sqlx::query(
            r#"
            UPDATE interview_sessions
            SET updated_at = now()
            WHERE id = $1 AND claimed_by = $2 AND lifecycle_state IN ('claimed', 'active')
            "#,
        )
        .bind(id)
        .bind(owner)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn expire_leases(&self, stale_after: Duration) -> Result<Vec<Uuid>, MailboxError> {
        let expired: Vec<Uuid> = sqlx::query_scalar(
            r#"
            UPDATE interview_sessions
            SET lifecycle_state = 'pending',
                updated_at = now()
            WHERE lifecycle_state IN ('claimed', 'active')
              AND updated_at < now() - make_interval(secs => $1)
            RETURNING id
            "#,
        )
        .bind(stale_after.as_secs_f64())
        .fetch_all(&self.pool)
        .await?;
        Ok(expired)
    }

    async fn documents(&self, session: &Session) -> Result<Documents, MailboxError> {
        let row: DocumentsRow = sqlx::query_as(
            r#"
            SELECT
                COALESCE((SELECT vacancy_text FROM vacancies WHERE id = $1), '') AS vacancy_text,
                COALESCE((SELECT resume_text FROM resumes WHERE id = $2), '') AS resume_text
            "#,
        )
        .bind(session.vacancy_ref)
        .bind(session.candidate_ref)
        .fetch_one(&self.pool)
        .await?;

        Ok(Documents {
            vacancy_text: row.vacancy_text,
            resume_text: row.resume_text,
        })
    }

    async fn append(
        &self,
        envelope_id: Uuid,
        session_id: Uuid,
        direction: Direction,
        body: &str,
    ) -> Result<Envelope, MailboxError> {
        // The outer SELECT runs on the pre-insert snapshot, so the second
        // branch only sees a row committed by an earlier call with this id.
        let row: EnvelopeRow = sqlx::query_as(&format!(
            r#"
            WITH inserted AS (
                INSERT INTO interview_envelopes (id, session_id, direction, body, delivery_state)
                VALUES ($1, $2, $3, $4, 'new')
                ON CONFLICT (id) DO NOTHING
                RETURNING {ENVELOPE_COLUMNS}
            )
            SELECT {ENVELOPE_COLUMNS} FROM inserted
            UNION ALL
            SELECT {ENVELOPE_COLUMNS} FROM interview_envelopes
            WHERE id = $1 AND session_id = $2
            "#
        ))
        .bind(envelope_id)
        .bind(session_id)
        .bind(direction.as_str())
        .bind(body)
        .fetch_one(&self.pool)
        .await?;
        row.try_into()
    }

    async fn poll(
        &self,
        session_id: Uuid,
        direction: Direction,
        state: DeliveryState,
    ) -> Result<Vec<Envelope>, MailboxError> {
        let rows: Vec<EnvelopeRow> = sqlx::query_as(&format!(
            r#"
            SELECT {ENVELOPE_COLUMNS}
            FROM interview_envelopes
            WHERE session_id = $1 AND direction = $2 AND delivery_state = $3
            ORDER BY seq ASC
            "#
        ))
        .bind(session_id)
        .bind(direction.as_str())
        .bind(state.as_str())
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Envelope::try_from).collect()
    }

    async fn mark_consumed(&self, envelope_id: Uuid) -> Result<(), MailboxError> {
        let result = sqlx::query(
            r#"
            UPDATE interview_envelopes
            SET delivery_state = 'done',
                consumed_at = COALESCE(consumed_at, now())
            WHERE id = $1
            "#,
        )
        .bind(envelope_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(MailboxError::EnvelopeNotFound(envelope_id));
        }
        Ok(())
    }

    async fn transcript(&self, session_id: Uuid) -> Result<Vec<Envelope>, MailboxError> {
        let rows: Vec<EnvelopeRow> = sqlx::query_as(&format!(
            "SELECT {ENVELOPE_COLUMNS} FROM interview_envelopes WHERE session_id = $1 ORDER BY seq ASC"
        ))
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Envelope::try_from).collect()
    }
}
