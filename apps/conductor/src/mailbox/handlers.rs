use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::AppError;
use crate::interview::prompts::GOODBYE;
use crate::mailbox::{DeliveryState, Direction, Envelope, LifecycleState, Session};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct EnrollRequest {
    pub vacancy_ref: i64,
    pub candidate_ref: i64,
}

#[derive(Debug, Deserialize)]
pub struct ReplyRequest {
    pub body: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TranscriptResponse {
    pub session: Session,
    pub envelopes: Vec<Envelope>,
}

/// POST /api/v1/sessions
pub async fn handle_enroll(
    State(state): State<AppState>,
    Json(req): Json<EnrollRequest>,
) -> Result<(StatusCode, Json<Session>), AppError> {
    let session = state
        .mailbox
        .create_session(req.vacancy_ref, req.candidate_ref)
        .await?;
    tracing::info!(session_id = %session.id, "Enrolled interview session");
    Ok((StatusCode::CREATED, Json(session)))
}

/// GET /api/v1/sessions/:id
pub async fn handle_get_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Session>, AppError> {
    Ok(Json(state.mailbox.get_session(id).await?))
}

/// GET /api/v1/sessions/:id/inbox
/// Interviewer messages the candidate has not acknowledged yet.
pub async fn handle_inbox(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<Envelope>>, AppError> {
    state.mailbox.get_session(id).await?;
    let inbox = state
        .mailbox
        .poll(id, Direction::ToCandidate, DeliveryState::New)
        .await?;
    Ok(Json(inbox))
}

/// POST /api/v1/sessions/:id/inbox/:envelope_id/ack
pub async fn handle_ack(
    State(state): State<AppState>,
    Path((id, envelope_id)): Path<(Uuid, Uuid)>,
) -> Result<StatusCode, AppError> {
    let log = state.mailbox.transcript(id).await?;
    let owned = log
        .iter()
        .any(|e| e.id == envelope_id && e.direction == Direction::ToCandidate);
    if !owned {
        return Err(AppError::NotFound(format!(
            "Envelope {envelope_id} not found in session {id}"
        )));
    }
    state.mailbox.mark_consumed(envelope_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/v1/sessions/:id/replies
/// Accepted only while the interview is running and a question awaits an answer.
/// The closing message goes out before the session closes, so it is rejected
/// by content.
pub async fn handle_reply(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<ReplyRequest>,
) -> Result<(StatusCode, Json<Envelope>), AppError> {
    let body = req.body.trim();
    if body.is_empty() {
        return Err(AppError::Validation("Reply body must not be empty".into()));
    }

    let session = state.mailbox.get_session(id).await?;
    if session.lifecycle_state != LifecycleState::Active {
        return Err(AppError::Conflict(format!(
            "Session {id} is {}, not accepting replies",
            session.lifecycle_state
        )));
    }

    let log = state.mailbox.transcript(id).await?;
    match log.last() {
        Some(last) if last.direction == Direction::ToCandidate => {
            if last.body.ends_with(GOODBYE) {
                return Err(AppError::Conflict("The interview has ended".into()));
            }
        }
        Some(_) => {
            return Err(AppError::Conflict(
                "A reply is already waiting to be read".into(),
            ))
        }
        None => return Err(AppError::Conflict("No question has been asked yet".into())),
    }

    let envelope = state
        .mailbox
        .enqueue(id, Direction::FromCandidate, body)
        .await?;
    Ok((StatusCode::CREATED, Json(envelope)))
}

/// GET /api/v1/sessions/:id/transcript
pub async fn handle_transcript(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<TranscriptResponse>, AppError> {
    let session = state.mailbox.get_session(id).await?;
    let envelopes = state.mailbox.transcript(id).await?;
    Ok(Json(TranscriptResponse { session, envelopes }))
}
