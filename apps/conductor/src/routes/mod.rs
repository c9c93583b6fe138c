pub mod health;

use axum::{
    routing::{get, post},
    Router,
};

use crate::mailbox::handlers;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // Mailbox gateway: enrollment and the candidate client's polling surface
        .route("/api/v1/sessions", post(handlers::handle_enroll))
        .route("/api/v1/sessions/:id", get(handlers::handle_get_session))
        .route("/api/v1/sessions/:id/inbox", get(handlers::handle_inbox))
        .route(
            "/api/v1/sessions/:id/inbox/:envelope_id/ack",
            post(handlers::handle_ack),
        )
        .route("/api/v1/sessions/:id/replies", post(handlers::handle_reply))
        .route(
            "/api/v1/sessions/:id/transcript",
            get(handlers::handle_transcript),
        )
        .with_state(state)
}
