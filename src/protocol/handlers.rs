//! Registrable consumer callbacks.
//!
//! Each slot holds at most one handler and the last registration wins.
//! Handlers are cloned out of their slot before being called, so a handler
//! may re-register itself or others without deadlocking.

use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use crate::protocol::SessionError;
use crate::types::Message;

pub type QrIssuedHandler = dyn Fn(&str) + Send + Sync;
pub type PayloadHandler = dyn Fn(&[u8]) + Send + Sync;
pub type SessionEndedHandler = dyn Fn(Option<&SessionError>) + Send + Sync;
pub type MessageHandler = dyn Fn(Message) + Send + Sync;
pub type SyncFailureHandler = dyn Fn(&SessionError) + Send + Sync;

struct Slot<T: ?Sized>(RwLock<Option<Arc<T>>>);

impl<T: ?Sized> Default for Slot<T> {
    fn default() -> Self {
        Self(RwLock::new(None))
    }
}

impl<T: ?Sized> Slot<T> {
    fn set(&self, handler: Arc<T>) {
        *self.0.write().unwrap_or_else(PoisonError::into_inner) = Some(handler);
    }

    fn get(&self) -> Option<Arc<T>> {
        self.0.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn clear(&self) {
        *self.0.write().unwrap_or_else(PoisonError::into_inner) = None;
    }

    fn is_set(&self) -> bool {
        self.0.read().unwrap_or_else(PoisonError::into_inner).is_some()
    }
}

/// Callbacks for login progress, messages and session termination.
///
/// Every callback runs inline on a tokio worker thread: login notifications
/// on the task driving [`Session::login`](crate::Session::login), messages
/// on the sync task. They must return quickly and must not block. Hand
/// heavy or blocking work off, either into a channel drained by a task of
/// your own or through [`tokio::task::spawn_blocking`]:
///
/// ```no_run
/// # fn demo(session: &webwx_rust::Session) {
/// let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
/// session.handlers().on_message(move |msg| {
///     let _ = tx.send(msg);
/// });
/// tokio::spawn(async move {
///     while let Some(msg) = rx.recv().await {
///         println!("{}", msg.record.content);
///     }
/// });
/// # }
/// ```
#[derive(Default)]
pub struct Handlers {
    qr_issued: Slot<QrIssuedHandler>,
    scanned: Slot<PayloadHandler>,
    login: Slot<PayloadHandler>,
    session_ended: Slot<SessionEndedHandler>,
    message: Slot<MessageHandler>,
    sync_failure: Slot<SyncFailureHandler>,
}

impl Handlers {
    /// Called with the QR token once one has been issued.
    pub fn on_qr_issued<F>(&self, handler: F)
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.qr_issued.set(Arc::new(handler));
    }

    /// Called with the remote payload when the QR code has been scanned.
    pub fn on_scanned<F>(&self, handler: F)
    where
        F: Fn(&[u8]) + Send + Sync + 'static,
    {
        self.scanned.set(Arc::new(handler));
    }

    /// Called with the confirmation payload once the login is confirmed.
    pub fn on_login<F>(&self, handler: F)
    where
        F: Fn(&[u8]) + Send + Sync + 'static,
    {
        self.login.set(Arc::new(handler));
    }

    /// Called once per session when it ends, with the failure if there was one.
    pub fn on_session_ended<F>(&self, handler: F)
    where
        F: Fn(Option<&SessionError>) + Send + Sync + 'static,
    {
        self.session_ended.set(Arc::new(handler));
    }

    /// Called for every delivered message, in server order.
    ///
    /// The next poll waits for this to return. A panic ends the session
    /// with [`SessionError::SyncAborted`].
    pub fn on_message<F>(&self, handler: F)
    where
        F: Fn(Message) + Send + Sync + 'static,
    {
        self.message.set(Arc::new(handler));
    }

    /// Called once with the error that ended the sync loop. Teardown happens
    /// afterwards regardless of what the handler does.
    pub fn on_sync_failure<F>(&self, handler: F)
    where
        F: Fn(&SessionError) + Send + Sync + 'static,
    {
        self.sync_failure.set(Arc::new(handler));
    }

    /// Drop the message handler; messages are then discarded.
    pub fn clear_message_handler(&self) {
        self.message.clear();
    }

    pub(crate) fn qr_issued(&self, token: &str) {
        if let Some(handler) = self.qr_issued.get() {
            handler(token);
        }
    }

    pub(crate) fn scanned(&self, payload: &[u8]) {
        if let Some(handler) = self.scanned.get() {
            handler(payload);
        }
    }

    pub(crate) fn login(&self, payload: &[u8]) {
        if let Some(handler) = self.login.get() {
            handler(payload);
        }
    }

    pub(crate) fn session_ended(&self, cause: Option<&SessionError>) {
        if let Some(handler) = self.session_ended.get() {
            handler(cause);
        }
    }

    pub(crate) fn message(&self, message: Message) {
        match self.message.get() {
            Some(handler) => handler(message),
            None => log::debug!("no message handler; dropping {}", message.record.msg_id),
        }
    }

    pub(crate) fn sync_failure(&self, err: &SessionError) {
        match self.sync_failure.get() {
            Some(handler) => handler(err),
            None => log::error!("exit with: {err}"),
        }
    }
}

impl fmt::Debug for Handlers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handlers")
            .field("qr_issued", &self.qr_issued.is_set())
            .field("scanned", &self.scanned.is_set())
            .field("login", &self.login.is_set())
            .field("session_ended", &self.session_ended.is_set())
            .field("message", &self.message.is_set())
            .field("sync_failure", &self.sync_failure.is_set())
            .finish()
    }
}
