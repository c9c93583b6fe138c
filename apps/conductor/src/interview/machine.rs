//! Interview State Machine runner.
//!
//! Flow: claimed → active → greeting → readiness_check → (ask_* / *_detail)*
//!       or plan_interview → goodbye → closed.
//!
//! One `InterviewMachine` owns one session: its phase cursors, the running
//! conversation and the outbox of messages that expect no reply. The only
//! suspension point is `wait_for_reply`, a bounded poll on the mailbox.
//!
//! Messages that expect no reply (greeting, section notice, date confirmation)
//! are buffered and delivered in the same envelope as the next outbound
//! message. A restarted run first collects the reply to any prompt an earlier
//! attempt left unanswered, so the envelope log of a session strictly
//! alternates direction across restarts too.

use std::sync::Arc;
use std::time::Duration;

use chrono::{Local, NaiveDate};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::interview::completeness::{suffix, CompletenessClassifier, Readiness, Verdict};
use crate::interview::graph::{next_state, Signal, State};
use crate::interview::prompts::{
    DETAIL_FALLBACK, DETAIL_PROMPT, GOODBYE, GREETING_FALLBACK, GREETING_PROMPT, PLAN_QUESTION,
    READINESS_QUESTION, SECTION_NOTICE,
};
use crate::interview::scheduling::{confirmation, DatePlanner};
use crate::interview::transcript::{render_dialogue, AnswerRecord, Turn, MESSAGE_SEPARATOR};
use crate::llm_client::prompts::{document_context, VERBATIM_INSTRUCTION};
use crate::llm_client::TextGenerator;
use crate::retry::{with_backoff, RetryPolicy};
use crate::mailbox::{
    DeliveryState, Direction, Envelope, LifecycleState, MailboxError, MailboxStore, Session,
};
use crate::questions::{Phase, QuestionSet};

/// Bounded inbound wait: poll every `poll_interval`, give up after `reply_timeout`.
#[derive(Debug, Clone, Copy)]
pub struct WaitBudget {
    pub poll_interval: Duration,
    pub reply_timeout: Duration,
}

impl Default for WaitBudget {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            reply_timeout: Duration::from_secs(600),
        }
    }
}

#[derive(Debug, Error)]
pub enum InterviewError {
    #[error("No reply from candidate within {waited:?}")]
    ReplyTimeout { waited: Duration },

    #[error("Interview cancelled by shutdown")]
    Cancelled,

    #[error("Session {0} is not in the claimed state")]
    NotClaimed(Uuid),

    #[error("Session {0} lease was taken over")]
    LeaseLost(Uuid),

    #[error("No transition from {state} on {signal:?}")]
    NoTransition { state: State, signal: Signal },

    #[error(transparent)]
    Mailbox(#[from] MailboxError),
}

/// What a completed run produced.
#[derive(Debug, Clone, Serialize)]
pub struct InterviewOutcome {
    pub session_id: Uuid,
    /// Every state entered, in order, ending with `goodbye`.
    pub path: Vec<State>,
    /// Phase questions sent, as `(phase, cursor)` pairs.
    pub asked: Vec<(Phase, usize)>,
    pub answers: Vec<AnswerRecord>,
    pub planned_date: Option<NaiveDate>,
    pub envelopes_sent: usize,
    pub replies_received: usize,
}

#[derive(Debug, Default, Clone, Copy)]
struct Cursors {
    base: usize,
    redflag: usize,
    skill: usize,
}

impl Cursors {
    fn get_mut(&mut self, phase: Phase) -> &mut usize {
        match phase {
            Phase::Base => &mut self.base,
            Phase::RedFlag => &mut self.redflag,
            Phase::Skill => &mut self.skill,
        }
    }
}

pub struct InterviewMachine {
    session: Session,
    store: Arc<dyn MailboxStore>,
    llm: Arc<dyn TextGenerator>,
    classifier: CompletenessClassifier,
    planner: DatePlanner,
    questions: QuestionSet,
    resume: String,
    cursors: Cursors,
    conversation: Vec<Turn>,
    current: Option<AnswerRecord>,
    answers: Vec<AnswerRecord>,
    outbox: Vec<String>,
    budget: WaitBudget,
    retry: RetryPolicy,
    today: NaiveDate,
    shutdown: Option<watch::Receiver<bool>>,
    path: Vec<State>,
    asked: Vec<(Phase, usize)>,
    planned_date: Option<NaiveDate>,
    envelopes_sent: usize,
    replies_received: usize,
}

impl InterviewMachine {
    pub fn new(
        session: Session,
        store: Arc<dyn MailboxStore>,
        llm: Arc<dyn TextGenerator>,
        questions: QuestionSet,
        resume: String,
    ) -> Self {
        Self {
            session,
            store,
            classifier: CompletenessClassifier::new(llm.clone()),
            planner: DatePlanner::new(llm.clone()),
            llm,
            questions,
            resume,
            cursors: Cursors::default(),
            conversation: Vec::new(),
            current: None,
            answers: Vec::new(),
            outbox: Vec::new(),
            budget: WaitBudget::default(),
            retry: RetryPolicy::default(),
            today: Local::now().date_naive(),
            shutdown: None,
            path: Vec::new(),
            asked: Vec::new(),
            planned_date: None,
            envelopes_sent: 0,
            replies_received: 0,
        }
    }

    pub fn with_budget(mut self, budget: WaitBudget) -> Self {
        self.budget = budget;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Reference date for interview planning.
    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = today;
        self
    }

    /// A `true` on this channel (or its sender going away) aborts any reply wait.
    pub fn with_shutdown(mut self, shutdown: watch::Receiver<bool>) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    /// Drives the session from `claimed` to `closed`. Any error leaves the
    /// session `active`; the caller decides how to release it.
    pub async fn run(mut self) -> Result<InterviewOutcome, InterviewError> {
        let id = self.session.id;
        let owner = self.owner()?;
        let store = &self.store;
        let activated = with_backoff(&self.retry, "activate", || {
            store.transition(id, owner, LifecycleState::Claimed, LifecycleState::Active)
        })
        .await?;
        if !activated {
            return Err(InterviewError::NotClaimed(id));
        }
        info!(
            session_id = %id,
            attempt = self.session.attempts,
            "Interview started: base={}, redflag={}, skill={}",
            self.questions.base.len(),
            self.questions.redflag.len(),
            self.questions.skill.len()
        );

        self.settle_previous_attempt().await?;

        let mut state = State::Greeting;
        loop {
            self.path.push(state);
            if state.is_terminal() {
                break;
            }
            let signal = self.step(state).await?;
            debug!(session_id = %id, "{state} --{signal:?}-->");
            state = next_state(state, signal).ok_or(InterviewError::NoTransition { state, signal })?;
        }

        self.goodbye().await?;
        info!(
            session_id = %id,
            "Interview closed after {} envelopes out, {} replies in",
            self.envelopes_sent,
            self.replies_received
        );

        Ok(InterviewOutcome {
            session_id: id,
            path: self.path,
            asked: self.asked,
            answers: self.answers,
            planned_date: self.planned_date,
            envelopes_sent: self.envelopes_sent,
            replies_received: self.replies_received,
        })
    }

    async fn step(&mut self, state: State) -> Result<Signal, InterviewError> {
        match state {
            State::Greeting => {
                let greeting = self.greeting().await;
                self.buffer(greeting);
                Ok(Signal::Done)
            }
            State::ReadinessCheck => {
                let reply = self.exchange(READINESS_QUESTION.to_string()).await?;
                Ok(match self.classifier.readiness(&reply).await {
                    Readiness::Ready => Signal::Ready,
                    Readiness::NotReady => Signal::NotReady,
                })
            }
            State::PlanInterview => {
                let reply = self.exchange(PLAN_QUESTION.to_string()).await?;
                self.planned_date = self.planner.plan(&reply, self.today).await;
                self.buffer(confirmation(self.planned_date));
                Ok(Signal::Done)
            }
            State::Ask(phase) => self.ask(phase).await,
            State::Detail(phase) => {
                let question = self.detail_question().await;
                let reply = self.exchange(question).await?;
                if let Some(record) = self.current.as_mut() {
                    record.push(reply);
                }
                Ok(Signal::Done)
            }
            State::Goodbye => Err(InterviewError::NoTransition {
                state,
                signal: Signal::Done,
            }),
        }
    }

    async fn ask(&mut self, phase: Phase) -> Result<Signal, InterviewError> {
        let list_len = self.questions.list(phase).len();
        let cursor = *self.cursors.get_mut(phase);
        if cursor >= list_len {
            return Ok(self.next_section());
        }

        let question = self.questions.list(phase)[cursor].clone();
        self.fold_current();
        self.current = Some(AnswerRecord::new(phase, question.clone()));
        self.asked.push((phase, cursor));

        let reply = self.exchange(question).await?;
        if let Some(record) = self.current.as_mut() {
            record.push(reply);
        }
        *self.cursors.get_mut(phase) += 1;

        if cursor + 1 >= list_len {
            return Ok(self.next_section());
        }
        Ok(match self.classifier.classify(suffix(&self.conversation)).await {
            Verdict::NeedsFollowup => Signal::Details,
            Verdict::Complete => Signal::NextQuestion,
        })
    }

    fn next_section(&mut self) -> Signal {
        self.fold_current();
        self.buffer(SECTION_NOTICE.to_string());
        Signal::NextSection
    }

    fn fold_current(&mut self) {
        if let Some(record) = self.current.take() {
            self.answers.push(record);
        }
    }

    async fn goodbye(&mut self) -> Result<(), InterviewError> {
        self.fold_current();
        self.send(GOODBYE.to_string()).await?;

        let id = self.session.id;
        let owner = self.owner()?;
        let store = &self.store;
        let closed = with_backoff(&self.retry, "close", || {
            store.transition(id, owner, LifecycleState::Active, LifecycleState::Closed)
        })
        .await?;
        if !closed {
            warn!(session_id = %id, "Session left the active state before goodbye");
        }
        Ok(())
    }

    // ── LLM-backed messages ────────────────────────────────────────────────

    fn owner(&self) -> Result<Uuid, InterviewError> {
        self.session
            .claimed_by
            .ok_or(InterviewError::NotClaimed(self.session.id))
    }

    async fn greeting(&self) -> String {
        let context = document_context("резюме", &self.resume);
        let prompt = format!("{GREETING_PROMPT}\n{VERBATIM_INSTRUCTION}");
        match self.llm.generate(&context, &prompt).await {
            Ok(text) => text,
            Err(e) => {
                warn!(session_id = %self.session.id, "Greeting generation failed: {e}");
                GREETING_FALLBACK.to_string()
            }
        }
    }

    async fn detail_question(&self) -> String {
        let context = render_dialogue(suffix(&self.conversation));
        let prompt = format!("{DETAIL_PROMPT}\n{VERBATIM_INSTRUCTION}");
        match self.llm.generate(&context, &prompt).await {
            Ok(text) => text,
            Err(e) => {
                warn!(session_id = %self.session.id, "Clarifying question generation failed: {e}");
                DETAIL_FALLBACK.to_string()
            }
        }
    }

    // ── Mailbox exchange ───────────────────────────────────────────────────

    /// Queues a message to go out with the next envelope.
    fn buffer(&mut self, text: String) {
        self.conversation.push(Turn::interviewer(text.clone()));
        self.outbox.push(text);
    }

    /// Sends `text` (with anything buffered) and blocks for one reply.
    async fn exchange(&mut self, text: String) -> Result<String, InterviewError> {
        self.conversation.push(Turn::interviewer(text.clone()));
        self.flush(text).await?;
        let reply = self.wait_for_reply().await?;
        self.replies_received += 1;
        self.conversation.push(Turn::candidate(reply.clone()));
        Ok(reply)
    }

    /// Sends `text` with anything buffered; no reply expected.
    async fn send(&mut self, text: String) -> Result<(), InterviewError> {
        self.conversation.push(Turn::interviewer(text.clone()));
        self.flush(text).await
    }

    /// One envelope id per outbound message: a retry after a lost
    /// acknowledgement replays the same append.
    async fn flush(&mut self, text: String) -> Result<(), InterviewError> {
        self.renew_lease().await?;
        self.outbox.push(text);
        let body = self.outbox.join(MESSAGE_SEPARATOR);

        let id = self.session.id;
        let envelope_id = Uuid::new_v4();
        let store = &self.store;
        with_backoff(&self.retry, "enqueue", || {
            store.append(envelope_id, id, Direction::ToCandidate, &body)
        })
        .await?;
        self.outbox.clear();
        self.envelopes_sent += 1;
        Ok(())
    }

    async fn inbound(&self) -> Result<Vec<Envelope>, MailboxError> {
        let id = self.session.id;
        let store = &self.store;
        with_backoff(&self.retry, "poll", || {
            store.poll(id, Direction::FromCandidate, DeliveryState::New)
        })
        .await
    }

    async fn consume(&self, envelope_id: Uuid) -> Result<(), MailboxError> {
        let store = &self.store;
        with_backoff(&self.retry, "mark_consumed", || store.mark_consumed(envelope_id)).await
    }

    async fn renew_lease(&self) -> Result<(), InterviewError> {
        let id = self.session.id;
        let owner = self.owner()?;
        let store = &self.store;
        let held =
            with_backoff(&self.retry, "renew_lease", || store.renew_lease(id, owner)).await?;
        if !held {
            warn!(session_id = %id, "Lease lost; abandoning interview");
            return Err(InterviewError::LeaseLost(id));
        }
        Ok(())
    }

    /// Brings the log of an earlier aborted attempt to a point where the next
    /// outbound envelope keeps directions alternating: stale replies are
    /// consumed, and a prompt left unanswered is waited on (within the reply
    /// budget) and its reply discarded before the greeting goes out.
    async fn settle_previous_attempt(&mut self) -> Result<(), InterviewError> {
        self.drain_stale_replies().await?;

        let id = self.session.id;
        let store = &self.store;
        let log = with_backoff(&self.retry, "transcript", || store.transcript(id)).await?;
        match log.last() {
            Some(last) if last.direction == Direction::ToCandidate => {
                info!(
                    session_id = %id,
                    "Waiting for the reply to a prompt from an earlier attempt"
                );
                self.wait_for_reply().await?;
            }
            Some(last) if last.delivery_state == DeliveryState::New => {
                self.consume(last.id).await?;
            }
            _ => {}
        }
        Ok(())
    }

    /// Replies left unconsumed by an aborted earlier attempt answer questions
    /// this run never asked.
    async fn drain_stale_replies(&self) -> Result<(), InterviewError> {
        let stale = self.inbound().await?;
        if !stale.is_empty() {
            info!(
                session_id = %self.session.id,
                "Discarding {} stale replies from an earlier attempt",
                stale.len()
            );
        }
        for envelope in stale {
            self.consume(envelope.id).await?;
        }
        Ok(())
    }

    /// Bounded poll for the oldest `new` reply. Marks it consumed.
    async fn wait_for_reply(&mut self) -> Result<String, InterviewError> {
        let started = Instant::now();
        loop {
            if let Some(envelope) = self.inbound().await?.into_iter().next() {
                self.consume(envelope.id).await?;
                self.renew_lease().await?;
                return Ok(envelope.body);
            }

            let waited = started.elapsed();
            if waited >= self.budget.reply_timeout {
                warn!(session_id = %self.session.id, "No reply within {waited:?}");
                return Err(InterviewError::ReplyTimeout { waited });
            }

            let interval = self.budget.poll_interval;
            let cancelled = match self.shutdown.as_mut() {
                Some(rx) => tokio::select! {
                    _ = tokio::time::sleep(interval) => false,
                    changed = rx.changed() => changed.is_err() || *rx.borrow(),
                },
                None => {
                    tokio::time::sleep(interval).await;
                    false
                }
            };
            if cancelled {
                return Err(InterviewError::Cancelled);
            }
        }
    }
}
