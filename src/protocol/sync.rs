//! The long-polling change loop.
//!
//! One engine task runs per live session. It alternates between a
//! change-detection long-poll and a batch fetch, advances the cursor, and
//! hands records to the message handler in server order. A supervisor task
//! turns a failed or panicking engine into session teardown.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use tokio::task::{JoinError, JoinHandle};

use crate::protocol::lifecycle::{Lifecycle, SessionCore};
use crate::protocol::{SessionError, SessionRef};
use crate::transport::{ChangeBatch, PollOutcome};
use crate::types::Message;

pub(crate) struct SyncEngine {
    core: SessionCore,
    lifecycle: Arc<Lifecycle>,
    session: SessionRef,
}

impl SyncEngine {
    pub(crate) fn new(core: SessionCore, lifecycle: Arc<Lifecycle>, session: SessionRef) -> Self {
        Self {
            core,
            lifecycle,
            session,
        }
    }

    /// Run until cancelled (`Ok`) or until the session can no longer sync.
    pub(crate) async fn run(self) -> Result<(), SessionError> {
        let token = self.lifecycle.engine_token().clone();

        while !token.is_cancelled() {
            let Some(view) = self.lifecycle.store().view() else {
                break;
            };

            let outcome = tokio::select! {
                biased;
                _ = token.cancelled() => break,
                outcome = self.core.transport.poll_for_changes(&view) => outcome?,
            };
            log::debug!("poll: {outcome:?}");

            match outcome {
                PollOutcome::Unchanged => {}
                PollOutcome::Terminated { code } => {
                    return Err(SessionError::RemoteLogout { code });
                }
                PollOutcome::Changed => {
                    let batch = tokio::select! {
                        biased;
                        _ = token.cancelled() => break,
                        batch = self.core.transport.fetch_change_batch(&view) => batch?,
                    };
                    self.apply(batch);
                }
            }
        }

        log::debug!("sync loop stopped");
        Ok(())
    }

    /// Advance the cursor, then dispatch every record of the batch.
    fn apply(&self, batch: ChangeBatch) {
        match self.lifecycle.store().advance_cursor(batch.cursor) {
            Some(cursor) => log::debug!("cursor now {cursor}"),
            None => log::debug!("session torn down while fetching"),
        }

        for record in batch.records {
            self.core
                .handlers
                .message(Message::new(record, self.session.clone()));
        }
    }
}

/// Start the engine and its supervisor.
///
/// The supervisor claims the terminal outcome when the engine fails, calls
/// the sync-failure handler once, and then tears the session down. A clean
/// stop leaves teardown to whoever stopped the engine.
pub(crate) fn spawn(
    core: SessionCore,
    lifecycle: Arc<Lifecycle>,
    session: SessionRef,
) -> JoinHandle<()> {
    let engine = SyncEngine::new(core.clone(), lifecycle.clone(), session);
    let worker = tokio::spawn(engine.run());

    tokio::spawn(async move {
        let err = match worker.await {
            Ok(Ok(())) => return,
            Ok(Err(err)) => err,
            Err(join_err) => SessionError::SyncAborted(describe(join_err)),
        };

        if !lifecycle.finish(Some(err.clone())) {
            log::debug!("session already ending; dropping sync error: {err}");
            return;
        }

        let observed = panic::catch_unwind(AssertUnwindSafe(|| core.handlers.sync_failure(&err)));
        if observed.is_err() {
            log::error!("sync failure handler panicked");
        }
        core.teardown(&lifecycle, Some(&err));
    })
}

fn describe(err: JoinError) -> String {
    if !err.is_panic() {
        return err.to_string();
    }
    let payload: Box<dyn Any + Send> = err.into_panic();
    if let Some(msg) = payload.downcast_ref::<&str>() {
        format!("panicked: {msg}")
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        format!("panicked: {msg}")
    } else {
        "panicked".to_string()
    }
}
