//! In-memory state of one login.
//!
//! The store is populated in one step after a successful login and
//! afterwards only the sync engine moves the cursor. Readers always get a
//! consistent [`SessionView`] copy; the lock is never held by callers.

use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::types::{Credentials, RequestContext, SyncCursor, UserProfile};

/// Consistent snapshot of the session state.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionView {
    pub credentials: Arc<Credentials>,
    pub request_context: Arc<RequestContext>,
    pub profile: Arc<UserProfile>,
    pub cursor: SyncCursor,
}

impl SessionView {
    pub fn new(
        credentials: Credentials,
        request_context: RequestContext,
        profile: UserProfile,
        cursor: SyncCursor,
    ) -> Self {
        Self {
            credentials: Arc::new(credentials),
            request_context: Arc::new(request_context),
            profile: Arc::new(profile),
            cursor,
        }
    }
}

/// Holder of credentials, request context and sync cursor.
#[derive(Debug, Default)]
pub struct SessionStore {
    state: RwLock<Option<SessionView>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, Option<SessionView>> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Option<SessionView>> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Copy of the current state, `None` before login or after teardown.
    pub fn view(&self) -> Option<SessionView> {
        self.read().clone()
    }

    pub fn is_materialized(&self) -> bool {
        self.read().is_some()
    }

    pub fn cursor(&self) -> Option<SyncCursor> {
        self.read().as_ref().map(|v| v.cursor.clone())
    }

    /// Replace the whole state at once.
    pub(crate) fn materialize(&self, view: SessionView) {
        *self.write() = Some(view);
    }

    /// Move the cursor forward. Returns the resulting cursor, or `None` if
    /// the store was torn down in the meantime.
    pub(crate) fn advance_cursor(&self, next: SyncCursor) -> Option<SyncCursor> {
        let mut state = self.write();
        let view = state.as_mut()?;
        view.cursor.advance(next);
        Some(view.cursor.clone())
    }

    pub(crate) fn clear(&self) -> Option<SessionView> {
        self.write().take()
    }
}
