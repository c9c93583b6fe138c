//! Session Poller: claims `pending` sessions and runs one interview task per
//! claim, bounded by a semaphore.
//!
//! Claim → documents → question set → InterviewMachine. Any failure after the
//! claim releases the session back to `pending`; a finished interview stays
//! `closed`. Each claim carries a fresh owner token, and every scan first
//! returns sessions whose lease went silent (a crashed conductor, a lost
//! release) to `pending`. On shutdown the poller stops claiming and waits for in-flight
//! interviews, which abort their reply wait and release.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::archive::TranscriptArchive;
use crate::interview::{InterviewMachine, InterviewOutcome, WaitBudget};
use crate::llm_client::TextGenerator;
use crate::retry::{with_backoff, RetryPolicy};
use crate::mailbox::{LifecycleState, MailboxError, MailboxStore, Session};
use crate::questions::rubric::Rubrics;
use crate::questions::QuestionSetBuilder;

#[derive(Debug, Clone, Copy)]
pub struct PollerSettings {
    pub scan_interval: Duration,
    pub lease_margin: Duration,
    pub max_concurrent: usize,
    pub budget: WaitBudget,
    pub retry: RetryPolicy,
}

impl PollerSettings {
    /// Heartbeat age after which a `claimed`/`active` session is presumed abandoned.
    pub fn lease(&self) -> Duration {
        self.budget.reply_timeout + self.lease_margin
    }
}

impl Default for PollerSettings {
    fn default() -> Self {
        Self {
            scan_interval: Duration::from_secs(5),
            lease_margin: Duration::from_secs(900),
            max_concurrent: 8,
            budget: WaitBudget::default(),
            retry: RetryPolicy::default(),
        }
    }
}

/// A claimed session plus the concurrency slot it occupies.
pub struct Claim {
    pub session: Session,
    permit: OwnedSemaphorePermit,
}

#[derive(Debug)]
pub enum Disposition {
    Closed(Box<InterviewOutcome>),
    Released { reason: String },
}

#[derive(Clone)]
pub struct SessionPoller {
    store: Arc<dyn MailboxStore>,
    llm: Arc<dyn TextGenerator>,
    builder: QuestionSetBuilder,
    archive: Option<TranscriptArchive>,
    settings: PollerSettings,
    slots: Arc<Semaphore>,
    shutdown: watch::Receiver<bool>,
}

impl SessionPoller {
    pub fn new(
        store: Arc<dyn MailboxStore>,
        llm: Arc<dyn TextGenerator>,
        rubrics: Rubrics,
        settings: PollerSettings,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            builder: QuestionSetBuilder::new(llm.clone(), rubrics),
            store,
            llm,
            archive: None,
            slots: Arc::new(Semaphore::new(settings.max_concurrent.max(1))),
            settings,
            shutdown,
        }
    }

    pub fn with_archive(mut self, archive: TranscriptArchive) -> Self {
        self.archive = Some(archive);
        self
    }

    /// Scans until shutdown, then waits for in-flight interviews.
    pub async fn run(self) {
        let mut shutdown = self.shutdown.clone();
        let mut ticker = tokio::time::interval(self.settings.scan_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut running: JoinSet<Disposition> = JoinSet::new();

        info!(
            "Session poller started (scan every {:?}, up to {} concurrent interviews)",
            self.settings.scan_interval, self.settings.max_concurrent
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.claim_pending().await {
                        Ok(claims) => {
                            for claim in claims {
                                let poller = self.clone();
                                running.spawn(async move {
                                    let Claim { session, permit } = claim;
                                    let disposition = poller.conduct(session).await;
                                    drop(permit);
                                    disposition
                                });
                            }
                        }
                        Err(e) => warn!("Session scan failed: {e}"),
                    }
                }
                Some(joined) = running.join_next(), if !running.is_empty() => {
                    if let Err(e) = joined {
                        error!("Interview task failed: {e}");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!(
            "Session poller stopping; waiting for {} interviews",
            running.len()
        );
        while let Some(joined) = running.join_next().await {
            if let Err(e) = joined {
                error!("Interview task failed: {e}");
            }
        }
        info!("Session poller stopped");
    }

    /// Expires silent leases, then claims as many `pending` sessions, oldest
    /// first, as there are free slots. A session another poller claimed first
    /// is skipped.
    pub async fn claim_pending(&self) -> Result<Vec<Claim>, MailboxError> {
        let store = &self.store;
        let retry = &self.settings.retry;
        let lease = self.settings.lease();
        let expired = with_backoff(retry, "expire_leases", || store.expire_leases(lease)).await?;
        for id in expired {
            warn!(session_id = %id, "Lease silent for over {lease:?}; session returned to pending");
        }

        let free = self.slots.available_permits();
        if free == 0 {
            return Ok(Vec::new());
        }

        let pending = with_backoff(retry, "pending_sessions", || {
            store.pending_sessions(free as i64)
        })
        .await?;

        let mut claims = Vec::new();
        for session in pending {
            let Ok(permit) = self.slots.clone().try_acquire_owned() else {
                break;
            };
            let id = session.id;
            let owner = Uuid::new_v4();
            match with_backoff(retry, "claim", || store.claim(id, owner)).await {
                Ok(true) => {
                    let session = Session {
                        lifecycle_state: LifecycleState::Claimed,
                        attempts: session.attempts + 1,
                        claimed_by: Some(owner),
                        ..session
                    };
                    info!(session_id = %id, attempt = session.attempts, "Claimed session");
                    claims.push(Claim { session, permit });
                }
                Ok(false) => debug!(session_id = %id, "Session already claimed elsewhere"),
                Err(e) => warn!(session_id = %id, "Claim failed: {e}"),
            }
        }
        Ok(claims)
    }

    /// Runs one claimed session to completion or release.
    pub async fn conduct(&self, session: Session) -> Disposition {
        let id = session.id;
        let store = &self.store;
        let documents =
            match with_backoff(&self.settings.retry, "documents", || store.documents(&session))
                .await
            {
                Ok(documents) => documents,
                Err(e) => {
                    return self
                        .release(&session, format!("documents unavailable: {e}"))
                        .await
                }
            };

        let questions = match self.builder.build(&documents).await {
            Ok(questions) => questions,
            Err(e) => {
                return self
                    .release(&session, format!("question generation failed: {e}"))
                    .await
            }
        };

        let machine = InterviewMachine::new(
            session.clone(),
            self.store.clone(),
            self.llm.clone(),
            questions,
            documents.resume_text,
        )
        .with_budget(self.settings.budget)
        .with_retry(self.settings.retry)
        .with_shutdown(self.shutdown.clone());

        match machine.run().await {
            Ok(outcome) => {
                if let Some(archive) = &self.archive {
                    if let Err(e) = archive.upload(&session, &outcome).await {
                        warn!(session_id = %id, "Transcript archival failed: {e}");
                    }
                }
                Disposition::Closed(Box::new(outcome))
            }
            Err(e) => self.release(&session, e.to_string()).await,
        }
    }

    /// Returns the session to `pending` from whichever of `active`/`claimed`
    /// it is in, provided this claim still owns it. The envelope log is left
    /// untouched.
    async fn release(&self, session: &Session, reason: String) -> Disposition {
        let id = session.id;
        warn!(session_id = %id, "Releasing session to pending: {reason}");
        let Some(owner) = session.claimed_by else {
            error!(session_id = %id, "Session carries no claim owner; left for lease expiry");
            return Disposition::Released { reason };
        };
        let store = &self.store;
        let retry = &self.settings.retry;
        for from in [LifecycleState::Active, LifecycleState::Claimed] {
            match with_backoff(retry, "release", || {
                store.transition(id, owner, from, LifecycleState::Pending)
            })
            .await
            {
                Ok(true) => break,
                Ok(false) => continue,
                Err(e) => {
                    error!(session_id = %id, "Could not release session: {e}");
                    break;
                }
            }
        }
        Disposition::Released { reason }
    }
}
