//! Session handle.
//!
//! A [`Session`] owns the state of one login at a time: it runs the QR
//! handshake (or a warm start from a snapshot), materializes the session
//! store, and keeps a background sync engine alive until logout, remote
//! termination or an unrecoverable failure.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use crate::protocol::lifecycle::{Lifecycle, SessionCore};
use crate::protocol::login::Authenticator;
use crate::protocol::{sync, Handlers, SessionError};
use crate::store::{PersistedSnapshot, SessionView, SnapshotStore, StoreError};
use crate::transport::Transport;
use crate::types::{DeviceId, UserProfile};

struct SessionInner {
    core: SessionCore,
    lifecycle: Mutex<Option<Arc<Lifecycle>>>,
    /// Serializes login attempts.
    login_gate: tokio::sync::Mutex<()>,
}

impl SessionInner {
    fn lifecycle(&self) -> MutexGuard<'_, Option<Arc<Lifecycle>>> {
        self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for SessionInner {
    fn drop(&mut self) {
        let lifecycle = self
            .lifecycle
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(lifecycle) = lifecycle {
            if lifecycle.finish(None) {
                self.core.teardown(&lifecycle, None);
            }
        }
    }
}

/// Client for one account.
///
/// Cloning is cheap and every clone drives the same session. The session is
/// torn down when the last clone is dropped.
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

/// Non-owning handle to a [`Session`], carried by delivered messages.
#[derive(Clone, Default)]
pub struct SessionRef(Weak<SessionInner>);

impl SessionRef {
    /// The session, if any handle to it is still alive.
    pub fn upgrade(&self) -> Option<Session> {
        self.0.upgrade().map(|inner| Session { inner })
    }

    #[cfg(test)]
    pub(crate) fn dangling() -> Self {
        Self::default()
    }
}

impl fmt::Debug for SessionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SessionRef")
            .field(&(self.0.strong_count() > 0))
            .finish()
    }
}

impl Session {
    /// Create an empty session over `transport`. Nothing is sent until
    /// [`Session::login`].
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            inner: Arc::new(SessionInner {
                core: SessionCore::new(transport),
                lifecycle: Mutex::new(None),
                login_gate: tokio::sync::Mutex::new(()),
            }),
        }
    }

    /// Register callbacks here. Later registrations replace earlier ones.
    pub fn handlers(&self) -> &Handlers {
        &self.inner.core.handlers
    }

    /// The transport, for authenticated calls outside the session core.
    pub fn transport(&self) -> Arc<dyn Transport> {
        Arc::clone(&self.inner.core.transport)
    }

    pub fn downgrade(&self) -> SessionRef {
        SessionRef(Arc::downgrade(&self.inner))
    }

    /// Log in and start syncing.
    ///
    /// With `persistence`, a stored snapshot is tried first. If resuming it
    /// fails, `retry_on_stale_snapshot` decides between falling back to a QR
    /// login and returning the failure. A snapshot that cannot be loaded or
    /// does not validate counts as no snapshot. After a QR login the new
    /// session is saved to `persistence`.
    ///
    /// Returns once the sync engine has started.
    pub async fn login(
        &self,
        persistence: Option<Arc<dyn SnapshotStore>>,
        retry_on_stale_snapshot: bool,
    ) -> Result<(), SessionError> {
        self.run_login(None, persistence, retry_on_stale_snapshot)
            .await
    }

    /// Like [`Session::login`], but with a QR token the caller already has.
    pub async fn login_with_token(
        &self,
        token: impl Into<String>,
        persistence: Option<Arc<dyn SnapshotStore>>,
        retry_on_stale_snapshot: bool,
    ) -> Result<(), SessionError> {
        self.run_login(Some(token.into()), persistence, retry_on_stale_snapshot)
            .await
    }

    async fn run_login(
        &self,
        token: Option<String>,
        persistence: Option<Arc<dyn SnapshotStore>>,
        retry_on_stale_snapshot: bool,
    ) -> Result<(), SessionError> {
        let _gate = self
            .inner
            .login_gate
            .try_lock()
            .map_err(|_| SessionError::AlreadyLoggedIn)?;
        // A login that is still ending counts as logged in until its
        // teardown completes.
        if self
            .current_lifecycle()
            .is_some_and(|lifecycle| !lifecycle.is_torn_down())
        {
            return Err(SessionError::AlreadyLoggedIn);
        }

        let core = &self.inner.core;
        let auth = Authenticator::new(Arc::clone(&core.transport), Arc::clone(&core.handlers));

        if let Some(store) = &persistence {
            match load_valid(store.as_ref()).await {
                Ok(snapshot) => match auth.resume_from_snapshot(&snapshot).await {
                    Ok(view) => {
                        self.start(Lifecycle::new(view));
                        return Ok(());
                    }
                    Err(err) if retry_on_stale_snapshot => {
                        log::warn!("stale snapshot, falling back to QR login: {err}");
                    }
                    Err(err) => return Err(err),
                },
                Err(StoreError::NotFound) => log::debug!("no snapshot stored"),
                Err(err) => log::warn!("ignoring unusable snapshot: {err}"),
            }
        }

        let token = match token {
            Some(token) => token,
            None => auth.begin_login().await?,
        };
        let credentials = auth.await_confirmation(&token).await?;
        let view = auth.establish(credentials, DeviceId::random()).await?;

        self.finish_fresh_login(&view, persistence.as_deref()).await?;
        self.start(Lifecycle::new(view));
        Ok(())
    }

    async fn finish_fresh_login(
        &self,
        view: &SessionView,
        persistence: Option<&dyn SnapshotStore>,
    ) -> Result<(), SessionError> {
        self.inner.core.transport.notify_login(view).await?;
        if let Some(store) = persistence {
            store.save(&self.snapshot_of(view)).await?;
            log::debug!("snapshot saved");
        }
        Ok(())
    }

    /// Install `lifecycle` as the current login and spawn its engine.
    fn start(&self, lifecycle: Lifecycle) {
        if let Some(view) = lifecycle.store().view() {
            log::info!("logged in as {}", view.profile.user_name);
        }
        let lifecycle = Arc::new(lifecycle);
        *self.inner.lifecycle() = Some(Arc::clone(&lifecycle));
        sync::spawn(self.inner.core.clone(), lifecycle, self.downgrade());
    }

    fn snapshot_of(&self, view: &SessionView) -> PersistedSnapshot {
        let transport = &self.inner.core.transport;
        PersistedSnapshot::new(
            transport.cookies().snapshot(),
            (*view.request_context).clone(),
            (*view.credentials).clone(),
            transport.domain(),
        )
    }

    fn current_lifecycle(&self) -> Option<Arc<Lifecycle>> {
        self.inner.lifecycle().clone()
    }

    fn live_lifecycle(&self) -> Option<Arc<Lifecycle>> {
        self.current_lifecycle().filter(|lifecycle| lifecycle.is_live())
    }

    /// Log out on the server and tear the session down.
    ///
    /// Teardown happens even if the server call fails; its error is returned
    /// afterwards. [`Session::wait_until_done`] returns only once teardown
    /// is complete, so a login started from there never overlaps it.
    pub async fn logout(&self) -> Result<(), SessionError> {
        let lifecycle = self.live_lifecycle().ok_or(SessionError::NotLoggedIn)?;
        let view = lifecycle.store().view().ok_or(SessionError::NotLoggedIn)?;
        if !lifecycle.finish(None) {
            return Err(SessionError::NotLoggedIn);
        }
        // Stop polling before the server drops the session under it.
        lifecycle.stop_engine();

        let result = self
            .inner
            .core
            .transport
            .logout(&view.request_context)
            .await;
        self.inner.core.teardown(&lifecycle, None);

        if let Err(err) = &result {
            log::warn!("logout request failed: {err}");
        }
        result.map_err(SessionError::from)
    }

    /// Wait for the current session to end.
    ///
    /// Returns the error that ended it, or `Ok` after a logout.
    pub async fn wait_until_done(&self) -> Result<(), SessionError> {
        let lifecycle = self.current_lifecycle().ok_or(SessionError::NotLoggedIn)?;
        lifecycle.torn_down().await;
        match lifecycle.outcome() {
            Some(Some(err)) => Err(err),
            _ => Ok(()),
        }
    }

    pub fn is_alive(&self) -> bool {
        self.live_lifecycle().is_some()
    }

    /// Why the last session ended, if it ended with an error.
    pub fn crash_reason(&self) -> Option<SessionError> {
        self.current_lifecycle()
            .and_then(|lifecycle| lifecycle.outcome())
            .flatten()
    }

    /// Consistent copy of the live session state.
    pub fn view(&self) -> Result<SessionView, SessionError> {
        self.current_lifecycle()
            .and_then(|lifecycle| lifecycle.store().view())
            .ok_or(SessionError::NotLoggedIn)
    }

    pub fn current_user(&self) -> Result<UserProfile, SessionError> {
        self.view().map(|view| (*view.profile).clone())
    }

    /// Write the live session to `store` for a later warm start.
    pub async fn save_snapshot(&self, store: &dyn SnapshotStore) -> Result<(), SessionError> {
        let view = self.view()?;
        store.save(&self.snapshot_of(&view)).await?;
        Ok(())
    }
}

async fn load_valid(store: &dyn SnapshotStore) -> Result<PersistedSnapshot, StoreError> {
    let snapshot = store.load().await?;
    snapshot.validate()?;
    Ok(snapshot)
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("alive", &self.is_alive())
            .field("handlers", &self.inner.core.handlers)
            .finish()
    }
}
