//! In-memory `MailboxStore` for tests. Same ordering and CAS semantics as
//! `PgMailbox`. `fail_next` injects outages before a write lands;
//! `lose_next_ack` lets a write land and then reports a transient error.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use crate::mailbox::{
    DeliveryState, Direction, Documents, Envelope, LifecycleState, MailboxError, MailboxStore,
    Session,
};

#[derive(Default)]
struct Inner {
    sessions: Vec<Session>,
    envelopes: Vec<Envelope>,
    vacancies: HashMap<i64, String>,
    resumes: HashMap<i64, String>,
    next_seq: i64,
    failures_left: u32,
    lost_acks: Vec<LostAck>,
}

/// Writes whose acknowledgement can be dropped after they commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LostAck {
    Claim,
    Outbound,
}

impl Inner {
    fn take_lost_ack(&mut self, write: LostAck) -> Result<(), MailboxError> {
        match self.lost_acks.iter().position(|w| *w == write) {
            Some(pos) => {
                self.lost_acks.remove(pos);
                Err(MailboxError::Unavailable("connection reset after commit".to_string()))
            }
            None => Ok(()),
        }
    }
}

#[derive(Default)]
pub struct MemoryMailbox {
    inner: Mutex<Inner>,
}

impl MemoryMailbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_vacancy(&self, id: i64, text: &str) {
        self.inner.lock().unwrap().vacancies.insert(id, text.to_string());
    }

    pub fn put_resume(&self, id: i64, text: &str) {
        self.inner.lock().unwrap().resumes.insert(id, text.to_string());
    }

    /// The next `n` operations fail with `MailboxError::Unavailable`.
    pub fn fail_next(&self, n: u32) {
        self.inner.lock().unwrap().failures_left = n;
    }

    /// The next matching write commits, then fails as if the reply was lost.
    pub fn lose_next_ack(&self, write: LostAck) {
        self.inner.lock().unwrap().lost_acks.push(write);
    }

    /// Ages the lease heartbeat of a session by `by`.
    pub fn backdate(&self, id: Uuid, by: Duration) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(session) = inner.sessions.iter_mut().find(|s| s.id == id) {
            session.updated_at = session.updated_at - chrono::Duration::from_std(by).unwrap();
        }
    }

    /// Plays the candidate client: answers each outbound envelope with the
    /// next reply in `replies`, then stops. Injected outages are retried.
    pub fn spawn_candidate(
        self: &Arc<Self>,
        session_id: Uuid,
        replies: &[&str],
    ) -> tokio::task::JoinHandle<()> {
        let store = Arc::clone(self);
        let replies: Vec<String> = replies.iter().map(|s| s.to_string()).collect();
        tokio::spawn(async move {
            let pause = Duration::from_millis(200);
            for reply in replies {
                loop {
                    let Ok(inbox) = store
                        .poll(session_id, Direction::ToCandidate, DeliveryState::New)
                        .await
                    else {
                        tokio::time::sleep(pause).await;
                        continue;
                    };
                    if let Some(envelope) = inbox.into_iter().next() {
                        if store.mark_consumed(envelope.id).await.is_err() {
                            tokio::time::sleep(pause).await;
                            continue;
                        }
                        let reply_id = Uuid::new_v4();
                        while store
                            .append(reply_id, session_id, Direction::FromCandidate, &reply)
                            .await
                            .is_err()
                        {
                            tokio::time::sleep(pause).await;
                        }
                        break;
                    }
                    tokio::time::sleep(pause).await;
                }
            }
        })
    }

    fn check_available(inner: &mut Inner) -> Result<(), MailboxError> {
        if inner.failures_left > 0 {
            inner.failures_left -= 1;
            return Err(MailboxError::Unavailable("injected outage".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl MailboxStore for MemoryMailbox {
    async fn create_session(
        &self,
        vacancy_ref: i64,
        candidate_ref: i64,
    ) -> Result<Session, MailboxError> {
        let mut inner = self.inner.lock().unwrap();
        Self::check_available(&mut inner)?;
        let now = Utc::now();
        let session = Session {
            id: Uuid::new_v4(),
            vacancy_ref,
            candidate_ref,
            lifecycle_state: LifecycleState::Pending,
            attempts: 0,
            claimed_by: None,
            created_at: now,
            updated_at: now,
        };
        inner.sessions.push(session.clone());
        Ok(session)
    }

    async fn get_session(&self, id: Uuid) -> Result<Session, MailboxError> {
        let mut inner = self.inner.lock().unwrap();
        Self::check_available(&mut inner)?;
        inner
            .sessions
            .iter()
            .find(|s| s.id == id)
            .cloned()
            .ok_or(MailboxError::SessionNotFound(id))
    }

    async fn pending_sessions(&self, limit: i64) -> Result<Vec<Session>, MailboxError> {
        let mut inner = self.inner.lock().unwrap();
        Self::check_available(&mut inner)?;
        let mut pending: Vec<Session> = inner
            .sessions
            .iter()
            .filter(|s| s.lifecycle_state == LifecycleState::Pending)
            .cloned()
            .collect();
        pending.sort_by_key(|s| s.created_at);
        pending.truncate(limit.max(0) as usize);
        Ok(pending)
    }

    async fn claim(&self, id: Uuid, owner: Uuid) -> Result<bool, MailboxError> {
        let mut inner = self.inner.lock().unwrap();
        Self::check_available(&mut inner)?;
        let session = inner
            .sessions
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or(MailboxError::SessionNotFound(id))?;
        match session.lifecycle_state {
            LifecycleState::Pending => session.attempts += 1,
            LifecycleState::Claimed if session.claimed_by == Some(owner) => {}
            _ => return Ok(false),
        }
        session.lifecycle_state = LifecycleState::Claimed;
        session.claimed_by = Some(owner);
        session.updated_at = Utc::now();
        inner.take_lost_ack(LostAck::Claim)?;
        Ok(true)
    }

    async fn transition(
        &self,
        id: Uuid,
        owner: Uuid,
        from: LifecycleState,
        to: LifecycleState,
    ) -> Result<bool, MailboxError> {
        let mut inner = self.inner.lock().unwrap();
        Self::check_available(&mut inner)?;
        let session = inner
            .sessions
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or(MailboxError::SessionNotFound(id))?;
        let in_place = session.lifecycle_state == from || session.lifecycle_state == to;
        if session.claimed_by != Some(owner) || !in_place {
            return Ok(false);
        }
        session.lifecycle_state = to;
        session.updated_at = Utc::now();
        Ok(true)
    }

    async fn renew_lease(&self, id: Uuid, owner: Uuid) -> Result<bool, MailboxError> {
        let mut inner = self.inner.lock().unwrap();
        Self::check_available(&mut inner)?;
        let session = inner
            .sessions
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or(MailboxError::SessionNotFound(id))?;
        let held = session.claimed_by == Some(owner)
            && matches!(
                session.lifecycle_state,
                LifecycleState::Claimed | LifecycleState::Active
            );
        if held {
            session.updated_at = Utc::now();
        }
        Ok(held)
    }

    async fn expire_leases(&self, stale_after: Duration) -> Result<Vec<Uuid>, MailboxError> {
        let mut inner = self.inner.lock().unwrap();
        Self::check_available(&mut inner)?;
        let now = Utc::now();
        let cutoff = now - chrono::Duration::from_std(stale_after).unwrap();
        let mut expired = Vec::new();
        for session in inner.sessions.iter_mut() {
            let leased = matches!(
                session.lifecycle_state,
                LifecycleState::Claimed | LifecycleState::Active
            );
            if leased && session.updated_at < cutoff {
                session.lifecycle_state = LifecycleState::Pending;
                session.updated_at = now;
                expired.push(session.id);
            }
        }
        Ok(expired)
    }

    async fn documents(&self, session: &Session) -> Result<Documents, MailboxError> {
        let mut inner = self.inner.lock().unwrap();
        Self::check_available(&mut inner)?;
        Ok(Documents {
            vacancy_text: inner
                .vacancies
                .get(&session.vacancy_ref)
                .cloned()
                .unwrap_or_default(),
            resume_text: inner
                .resumes
                .get(&session.candidate_ref)
                .cloned()
                .unwrap_or_default(),
        })
    }

    async fn append(
        &self,
        envelope_id: Uuid,
        session_id: Uuid,
        direction: Direction,
        body: &str,
    ) -> Result<Envelope, MailboxError> {
        let mut inner = self.inner.lock().unwrap();
        Self::check_available(&mut inner)?;
        if let Some(existing) = inner.envelopes.iter().find(|e| e.id == envelope_id) {
            return Ok(existing.clone());
        }
        inner.next_seq += 1;
        let envelope = Envelope {
            id: envelope_id,
            seq: inner.next_seq,
            session_id,
            direction,
            body: body.to_string(),
            delivery_state: DeliveryState::New,
            created_at: Utc::now(),
            consumed_at: None,
        };
        inner.envelopes.push(envelope.clone());
        if direction == Direction::ToCandidate {
            inner.take_lost_ack(LostAck::Outbound)?;
        }
        Ok(envelope)
    }

    async fn poll(
        &self,
        session_id: Uuid,
        direction: Direction,
        state: DeliveryState,
    ) -> Result<Vec<Envelope>, MailboxError> {
        let mut inner = self.inner.lock().unwrap();
        Self::check_available(&mut inner)?;
        Ok(inner
            .envelopes
            .iter()
            .filter(|e| {
                e.session_id == session_id && e.direction == direction && e.delivery_state == state
            })
            .cloned()
            .collect())
    }

    async fn mark_consumed(&self, envelope_id: Uuid) -> Result<(), MailboxError> {
        let mut inner = self.inner.lock().unwrap();
        Self::check_available(&mut inner)?;
        let envelope = inner
            .envelopes
            .iter_mut()
            .find(|e| e.id == envelope_id)
            .ok_or(MailboxError::EnvelopeNotFound(envelope_id))?;
        if envelope.delivery_state == DeliveryState::New {
            envelope.delivery_state = DeliveryState::Done;
            envelope.consumed_at = Some(Utc::now());
        }
        Ok(())
    }

    async fn transcript(&self, session_id: Uuid) -> Result<Vec<Envelope>, MailboxError> {
        let mut inner = self.inner.lock().unwrap();
        Self::check_available(&mut inner)?;
        Ok(inner
            .envelopes
            .iter()
            .filter(|e| e.session_id == session_id)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_claim_is_first_writer_wins() {
        let store = MemoryMailbox::new();
        let session = store.create_session(1, 2).await.unwrap();
        let (ours, theirs) = (Uuid::new_v4(), Uuid::new_v4());

        assert!(store.claim(session.id, ours).await.unwrap());
        assert!(!store.claim(session.id, theirs).await.unwrap());

        let claimed = store.get_session(session.id).await.unwrap();
        assert_eq!(claimed.lifecycle_state, LifecycleState::Claimed);
        assert_eq!(claimed.claimed_by, Some(ours));
        assert_eq!(claimed.attempts, 1);
    }

    #[tokio::test]
    async fn test_repeated_claim_by_same_owner_counts_once() {
        let store = MemoryMailbox::new();
        let session = store.create_session(1, 2).await.unwrap();
        let owner = Uuid::new_v4();
        store.lose_next_ack(LostAck::Claim);

        assert!(store.claim(session.id, owner).await.is_err());
        assert!(store.claim(session.id, owner).await.unwrap());
        assert_eq!(store.get_session(session.id).await.unwrap().attempts, 1);
    }

    #[tokio::test]
    async fn test_claiming_active_session_is_rejected() {
        let store = MemoryMailbox::new();
        let session = store.create_session(1, 2).await.unwrap();
        let owner = Uuid::new_v4();
        store.claim(session.id, owner).await.unwrap();
        store
            .transition(session.id, owner, LifecycleState::Claimed, LifecycleState::Active)
            .await
            .unwrap();

        assert!(!store.claim(session.id, owner).await.unwrap());
        assert!(!store.claim(session.id, Uuid::new_v4()).await.unwrap());
        let current = store.get_session(session.id).await.unwrap();
        assert_eq!(current.lifecycle_state, LifecycleState::Active);
    }

    #[tokio::test]
    async fn test_transition_is_fenced_on_owner_and_repeatable() {
        let store = MemoryMailbox::new();
        let session = store.create_session(1, 2).await.unwrap();
        let owner = Uuid::new_v4();
        store.claim(session.id, owner).await.unwrap();

        let stranger = Uuid::new_v4();
        assert!(!store
            .transition(session.id, stranger, LifecycleState::Claimed, LifecycleState::Active)
            .await
            .unwrap());
        for _ in 0..2 {
            assert!(store
                .transition(session.id, owner, LifecycleState::Claimed, LifecycleState::Active)
                .await
                .unwrap());
        }
        assert!(!store
            .transition(session.id, owner, LifecycleState::Pending, LifecycleState::Claimed)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_stale_leases_return_to_pending() {
        let store = MemoryMailbox::new();
        let fresh = store.create_session(1, 2).await.unwrap();
        let stale = store.create_session(3, 4).await.unwrap();
        let dead = Uuid::new_v4();
        store.claim(fresh.id, Uuid::new_v4()).await.unwrap();
        store.claim(stale.id, dead).await.unwrap();
        store
            .transition(stale.id, dead, LifecycleState::Claimed, LifecycleState::Active)
            .await
            .unwrap();
        store.backdate(stale.id, Duration::from_secs(900));

        let expired = store.expire_leases(Duration::from_secs(600)).await.unwrap();

        assert_eq!(expired, vec![stale.id]);
        let reverted = store.get_session(stale.id).await.unwrap();
        assert_eq!(reverted.lifecycle_state, LifecycleState::Pending);
        assert!(!store.renew_lease(stale.id, dead).await.unwrap());
        let untouched = store.get_session(fresh.id).await.unwrap();
        assert_eq!(untouched.lifecycle_state, LifecycleState::Claimed);
    }

    #[tokio::test]
    async fn test_append_replay_returns_stored_envelope() {
        let store = MemoryMailbox::new();
        let sid = Uuid::new_v4();
        let id = Uuid::new_v4();
        store.lose_next_ack(LostAck::Outbound);

        assert!(store
            .append(id, sid, Direction::ToCandidate, "Q1")
            .await
            .is_err());
        let replayed = store
            .append(id, sid, Direction::ToCandidate, "Q1")
            .await
            .unwrap();

        assert_eq!(replayed.id, id);
        assert_eq!(store.transcript(sid).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_poll_returns_creation_order_and_consume_is_idempotent() {
        let store = MemoryMailbox::new();
        let sid = Uuid::new_v4();
        let first = store.enqueue(sid, Direction::FromCandidate, "a").await.unwrap();
        store.enqueue(sid, Direction::ToCandidate, "q").await.unwrap();
        store.enqueue(sid, Direction::FromCandidate, "b").await.unwrap();

        let inbound = store
            .poll(sid, Direction::FromCandidate, DeliveryState::New)
            .await
            .unwrap();
        assert_eq!(
            inbound.iter().map(|e| e.body.as_str()).collect::<Vec<_>>(),
            vec!["a", "b"]
        );

        store.mark_consumed(first.id).await.unwrap();
        store.mark_consumed(first.id).await.unwrap();
        let remaining = store
            .poll(sid, Direction::FromCandidate, DeliveryState::New)
            .await
            .unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(store.transcript(sid).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_missing_documents_read_as_empty() {
        let store = MemoryMailbox::new();
        store.put_resume(2, "Петров Пётр");
        let session = store.create_session(1, 2).await.unwrap();
        let docs = store.documents(&session).await.unwrap();
        assert_eq!(docs.vacancy_text, "");
        assert_eq!(docs.resume_text, "Петров Пётр");
    }
}
