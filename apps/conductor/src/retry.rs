use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::llm_client::LlmError;
use crate::mailbox::MailboxError;

/// Exponential backoff: `base`, `2·base`, `4·base`, ...
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(1000),
        }
    }
}

impl RetryPolicy {
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay * (1u32 << attempt.min(16))
    }
}

/// Errors that may succeed on a later attempt.
pub trait Transient {
    fn is_transient(&self) -> bool;
}

impl Transient for MailboxError {
    fn is_transient(&self) -> bool {
        MailboxError::is_transient(self)
    }
}

impl Transient for LlmError {
    /// Rate limits, 5xx and transport failures. A body that fails to decode is final.
    fn is_transient(&self) -> bool {
        match self {
            LlmError::Http(e) => !e.is_decode(),
            LlmError::Api { status, .. } => *status == 429 || *status >= 500,
            LlmError::RateLimited { .. } | LlmError::EmptyContent => false,
        }
    }
}

/// Runs `op` until it succeeds, fails permanently, or attempts run out.
/// Each attempt is a whole operation, so a retry never observes a half write.
pub async fn with_backoff<T, E, F, Fut>(
    policy: &RetryPolicy,
    what: &str,
    mut op: F,
) -> Result<T, E>
where
    E: Transient + Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt + 1 < policy.max_attempts => {
                let delay = policy.delay_for(attempt);
                warn!(
                    "{} failed (attempt {}/{}): {}. Retrying after {}ms...",
                    what,
                    attempt + 1,
                    policy.max_attempts,
                    e,
                    delay.as_millis()
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
