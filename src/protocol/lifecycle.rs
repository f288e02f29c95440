//! Liveness of one login and the parts of a session shared with its tasks.

use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, PoisonError};

use tokio_util::sync::CancellationToken;

use crate::protocol::{Handlers, SessionError};
use crate::store::{SessionStore, SessionView};
use crate::transport::Transport;

/// State, liveness and terminal outcome of one login.
///
/// The outcome is claimed at most once; whoever claims it owns teardown.
/// Each login gets its own `Lifecycle`, so a late teardown of an old login
/// never touches the state of a newer one.
#[derive(Debug)]
pub(crate) struct Lifecycle {
    store: SessionStore,
    /// Cancelled once teardown is complete.
    done: CancellationToken,
    /// Stops the sync engine. Child of `done`.
    engine: CancellationToken,
    outcome: Mutex<Option<Option<SessionError>>>,
}

impl Lifecycle {
    pub(crate) fn new(view: SessionView) -> Self {
        let store = SessionStore::new();
        store.materialize(view);
        let done = CancellationToken::new();
        let engine = done.child_token();
        Self {
            store,
            done,
            engine,
            outcome: Mutex::new(None),
        }
    }

    pub(crate) fn store(&self) -> &SessionStore {
        &self.store
    }

    /// Claim the terminal outcome. Returns `false` if it was already claimed.
    pub(crate) fn finish(&self, cause: Option<SessionError>) -> bool {
        let mut outcome = self.outcome.lock().unwrap_or_else(PoisonError::into_inner);
        if outcome.is_some() {
            return false;
        }
        *outcome = Some(cause);
        true
    }

    /// Neither ending nor ended.
    pub(crate) fn is_live(&self) -> bool {
        !self.done.is_cancelled()
            && self
                .outcome
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .is_none()
    }

    pub(crate) fn is_torn_down(&self) -> bool {
        self.done.is_cancelled()
    }

    /// `None` while live, `Some(None)` after a clean stop.
    pub(crate) fn outcome(&self) -> Option<Option<SessionError>> {
        self.outcome
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub(crate) fn engine_token(&self) -> &CancellationToken {
        &self.engine
    }

    /// Stop the sync engine without ending the login.
    pub(crate) fn stop_engine(&self) {
        self.engine.cancel();
    }

    /// Resolves once teardown is complete.
    pub(crate) async fn torn_down(&self) {
        self.done.cancelled().await;
    }

    /// Clear the state, notify, then mark the login torn down.
    ///
    /// Must follow a successful [`Lifecycle::finish`]. A panicking
    /// session-ended handler is logged and does not keep waiters asleep.
    pub(crate) fn teardown(&self, handlers: &Handlers, cause: Option<&SessionError>) {
        self.engine.cancel();
        self.store.clear();
        match cause {
            Some(err) => log::info!("session ended: {err}"),
            None => log::info!("session ended"),
        }
        if panic::catch_unwind(AssertUnwindSafe(|| handlers.session_ended(cause))).is_err() {
            log::error!("session-ended handler panicked");
        }
        self.done.cancel();
    }
}

/// Session parts shared between the public handle and background tasks.
#[derive(Clone)]
pub(crate) struct SessionCore {
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) handlers: Arc<Handlers>,
}

impl SessionCore {
    pub(crate) fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            handlers: Arc::new(Handlers::default()),
        }
    }

    pub(crate) fn teardown(&self, lifecycle: &Lifecycle, cause: Option<&SessionError>) {
        lifecycle.teardown(&self.handlers, cause);
    }
}

#[cfg(test)]
pub(crate) fn sample_view() -> SessionView {
    use crate::testing::sample_credentials;
    use crate::types::{DeviceId, RequestContext, SyncCursor, UserProfile};

    let credentials = sample_credentials();
    let context = RequestContext::derive(&credentials, DeviceId::random());
    SessionView::new(
        credentials,
        context,
        UserProfile::default(),
        SyncCursor::from_pairs([(1, 10), (2, 20)]),
    )
}
