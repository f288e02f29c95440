//! Scripted transport for engine and session tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;

use crate::store::SessionView;
use crate::transport::{
    ChangeBatch, CookieJar, EstablishedSession, LoginStatus, LoginStatusResponse, PollOutcome,
    Transport, TransportError, TransportResult,
};
use crate::types::{Credentials, MessageRecord, RequestContext, SyncCursor, UserProfile};

pub(crate) fn sample_credentials() -> Credentials {
    Credentials {
        server_id: "sid-1".to_string(),
        session_key: "@crypt_key".to_string(),
        pass_ticket: "ticket".to_string(),
        user_id: 42,
    }
}

pub(crate) fn record(id: &str) -> MessageRecord {
    MessageRecord {
        msg_id: id.to_string(),
        from_user_name: "@friend".to_string(),
        to_user_name: "@me".to_string(),
        msg_type: 1,
        content: format!("message {id}"),
        ..MessageRecord::default()
    }
}

pub(crate) fn batch(cursor: &[(u64, u64)], ids: &[&str]) -> ChangeBatch {
    ChangeBatch {
        cursor: SyncCursor::from_pairs(cursor.iter().copied()),
        records: ids.iter().map(|id| record(id)).collect(),
    }
}

fn pop<T>(queue: &Mutex<VecDeque<T>>) -> Option<T> {
    queue.lock().unwrap_or_else(PoisonError::into_inner).pop_front()
}

fn push<T>(queue: &Mutex<VecDeque<T>>, item: T) {
    queue.lock().unwrap_or_else(PoisonError::into_inner).push_back(item);
}

/// Transport that replays queued responses.
///
/// Once the poll script runs out, `poll_for_changes` hangs like an idle
/// long-poll; other exhausted scripts answer with an error.
#[derive(Default)]
pub(crate) struct ScriptedTransport {
    qr_tokens: Mutex<VecDeque<TransportResult<String>>>,
    statuses: Mutex<VecDeque<TransportResult<LoginStatusResponse>>>,
    establish: Mutex<VecDeque<TransportResult<EstablishedSession>>>,
    polls: Mutex<VecDeque<TransportResult<PollOutcome>>>,
    batches: Mutex<VecDeque<TransportResult<ChangeBatch>>>,
    logout_error: Mutex<Option<TransportError>>,
    logout_delay: Mutex<Option<Duration>>,
    notify_error: Mutex<Option<TransportError>>,

    status_calls: AtomicUsize,
    poll_calls: AtomicUsize,
    fetch_calls: AtomicUsize,
    logout_calls: AtomicUsize,
    notify_calls: AtomicUsize,
    established_with: Mutex<Vec<RequestContext>>,
    polled_cursors: Mutex<Vec<SyncCursor>>,
    fetched_cursors: Mutex<Vec<SyncCursor>>,

    cookies: CookieJar,
    domain: RwLock<Option<String>>,
}

impl ScriptedTransport {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_qr_token(self, token: &str) -> Self {
        push(&self.qr_tokens, Ok(token.to_string()));
        self
    }

    pub(crate) fn with_status(self, status: LoginStatus, payload: &[u8]) -> Self {
        push(&self.statuses, Ok(LoginStatusResponse::new(status, payload)));
        self
    }

    /// Waiting, Scanned, Confirmed with [`sample_credentials`].
    pub(crate) fn with_confirmed_login(self) -> Self {
        self.with_status(LoginStatus::Waiting, b"")
            .with_status(LoginStatus::Scanned, b"avatar")
            .with_status(LoginStatus::Confirmed, &sample_credentials().to_confirmation())
    }

    pub(crate) fn with_status_error(self, err: TransportError) -> Self {
        push(&self.statuses, Err(err));
        self
    }

    pub(crate) fn with_establish_error(self, err: TransportError) -> Self {
        push(&self.establish, Err(err));
        self
    }

    pub(crate) fn with_poll(self, outcome: PollOutcome) -> Self {
        push(&self.polls, Ok(outcome));
        self
    }

    pub(crate) fn with_poll_error(self, err: TransportError) -> Self {
        push(&self.polls, Err(err));
        self
    }

    pub(crate) fn with_batch(self, batch: ChangeBatch) -> Self {
        push(&self.batches, Ok(batch));
        self
    }

    pub(crate) fn with_logout_error(self, err: TransportError) -> Self {
        *self.logout_error.lock().unwrap_or_else(PoisonError::into_inner) = Some(err);
        self
    }

    /// Every logout call takes `delay` before answering.
    pub(crate) fn with_logout_delay(self, delay: Duration) -> Self {
        *self.logout_delay.lock().unwrap_or_else(PoisonError::into_inner) = Some(delay);
        self
    }

    pub(crate) fn with_notify_error(self, err: TransportError) -> Self {
        *self.notify_error.lock().unwrap_or_else(PoisonError::into_inner) = Some(err);
        self
    }

    pub(crate) fn status_calls(&self) -> usize {
        self.status_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn poll_calls(&self) -> usize {
        self.poll_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn fetch_calls(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn logout_calls(&self) -> usize {
        self.logout_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn notify_calls(&self) -> usize {
        self.notify_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn established_with(&self) -> Vec<RequestContext> {
        self.established_with
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub(crate) fn polled_cursors(&self) -> Vec<SyncCursor> {
        self.polled_cursors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub(crate) fn fetched_cursors(&self) -> Vec<SyncCursor> {
        self.fetched_cursors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

fn exhausted(what: &str) -> TransportError {
    TransportError::Network(format!("{what} script exhausted"))
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn request_qr_token(&self) -> TransportResult<String> {
        pop(&self.qr_tokens).unwrap_or_else(|| Err(exhausted("qr token")))
    }

    async fn fetch_login_status(&self, _token: &str) -> TransportResult<LoginStatusResponse> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        pop(&self.statuses).unwrap_or_else(|| Err(exhausted("login status")))
    }

    async fn establish_session(&self, context: &RequestContext) -> TransportResult<EstablishedSession> {
        self.established_with
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(context.clone());
        pop(&self.establish).unwrap_or_else(|| {
            Ok(EstablishedSession {
                cursor: SyncCursor::from_pairs([(1, 100), (2, 200)]),
                profile: UserProfile {
                    user_name: "@me".to_string(),
                    nick_name: "Me".to_string(),
                },
            })
        })
    }

    async fn notify_login(&self, _session: &SessionView) -> TransportResult<()> {
        self.notify_calls.fetch_add(1, Ordering::SeqCst);
        match self.notify_error.lock().unwrap_or_else(PoisonError::into_inner).take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn poll_for_changes(&self, session: &SessionView) -> TransportResult<PollOutcome> {
        self.poll_calls.fetch_add(1, Ordering::SeqCst);
        self.polled_cursors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(session.cursor.clone());
        match pop(&self.polls) {
            Some(outcome) => outcome,
            None => std::future::pending().await,
        }
    }

    async fn fetch_change_batch(&self, session: &SessionView) -> TransportResult<ChangeBatch> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        self.fetched_cursors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(session.cursor.clone());
        pop(&self.batches).unwrap_or_else(|| Err(exhausted("change batch")))
    }

    async fn logout(&self, _context: &RequestContext) -> TransportResult<()> {
        self.logout_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.logout_delay.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        match self.logout_error.lock().unwrap_or_else(PoisonError::into_inner).take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn cookies(&self) -> &CookieJar {
        &self.cookies
    }

    fn domain(&self) -> Option<String> {
        self.domain
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set_domain(&self, domain: Option<String>) {
        *self.domain.write().unwrap_or_else(PoisonError::into_inner) = domain;
    }
}
