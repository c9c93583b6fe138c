use std::sync::Arc;

use crate::mailbox::MailboxStore;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    /// Same store the session poller drives; the gateway only reads it and
    /// appends candidate replies.
    pub mailbox: Arc<dyn MailboxStore>,
}
