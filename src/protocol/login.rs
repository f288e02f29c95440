//! QR login state machine and warm-start resumption.

use std::sync::Arc;

use crate::protocol::{Handlers, SessionError};
use crate::store::{PersistedSnapshot, SessionView};
use crate::transport::{LoginStatus, Transport};
use crate::types::{Credentials, DeviceId, RequestContext};

/// Progress of one QR handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginState {
    /// A token was issued; nothing heard back yet.
    Requested,
    Waiting,
    Scanned,
    Confirmed,
    Expired,
    /// The transport failed while polling.
    Error,
}

impl LoginState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            LoginState::Confirmed | LoginState::Expired | LoginState::Error
        )
    }

    /// Transition on a status reported by the remote.
    ///
    /// Terminal states absorb everything, and a scanned code never falls
    /// back to waiting.
    pub fn advance(self, status: LoginStatus) -> LoginState {
        if self.is_terminal() {
            return self;
        }
        match status {
            LoginStatus::Waiting if self == LoginState::Scanned => LoginState::Scanned,
            LoginStatus::Waiting => LoginState::Waiting,
            LoginStatus::Scanned => LoginState::Scanned,
            LoginStatus::Confirmed => LoginState::Confirmed,
            LoginStatus::Expired => LoginState::Expired,
        }
    }
}

/// Drives the QR handshake and session establishment against a transport.
pub struct Authenticator {
    transport: Arc<dyn Transport>,
    handlers: Arc<Handlers>,
}

impl Authenticator {
    pub fn new(transport: Arc<dyn Transport>, handlers: Arc<Handlers>) -> Self {
        Self {
            transport,
            handlers,
        }
    }

    /// Ask for a fresh QR token and announce it.
    pub async fn begin_login(&self) -> Result<String, SessionError> {
        let token = self.transport.request_qr_token().await?;
        log::info!("QR token issued: {token}");
        self.handlers.qr_issued(&token);
        Ok(token)
    }

    /// Poll the login status of `token` until the user confirms or the code
    /// expires.
    ///
    /// The remote holds each status request open, so there is no delay
    /// between polls. Transport faults end the handshake immediately.
    pub async fn await_confirmation(&self, token: &str) -> Result<Credentials, SessionError> {
        let mut state = LoginState::Requested;
        loop {
            let response = match self.transport.fetch_login_status(token).await {
                Ok(response) => response,
                Err(err) => {
                    log::debug!("login {state:?} -> {:?}: {err}", LoginState::Error);
                    return Err(err.into());
                }
            };

            let next = state.advance(response.status);
            let entered = next != state;
            if entered {
                log::debug!("login {state:?} -> {next:?}");
            }
            state = next;

            match state {
                LoginState::Scanned if entered => self.handlers.scanned(&response.payload),
                LoginState::Confirmed => {
                    let credentials = Credentials::from_confirmation(&response.payload)?;
                    log::info!("login confirmed for uin {}", credentials.user_id);
                    self.handlers.login(&response.payload);
                    return Ok(credentials);
                }
                LoginState::Expired => return Err(SessionError::QrExpired),
                _ => {}
            }
        }
    }

    /// Derive a request context for fresh credentials and establish the
    /// session with it.
    pub async fn establish(
        &self,
        credentials: Credentials,
        device_id: DeviceId,
    ) -> Result<SessionView, SessionError> {
        let context = RequestContext::derive(&credentials, device_id);
        let established = self.transport.establish_session(&context).await?;
        log::debug!("session established as {}", established.profile.user_name);
        Ok(SessionView::new(
            credentials,
            context,
            established.profile,
            established.cursor,
        ))
    }

    /// Restore a persisted session without a QR handshake.
    ///
    /// The snapshot is validated before anything is restored. Establishment
    /// errors are returned so the caller can decide whether to fall back to
    /// a fresh login.
    pub async fn resume_from_snapshot(
        &self,
        snapshot: &PersistedSnapshot,
    ) -> Result<SessionView, SessionError> {
        snapshot.validate()?;

        self.transport.cookies().restore(snapshot.cookies.clone());
        self.transport.set_domain(snapshot.domain.clone());

        let established = match self
            .transport
            .establish_session(&snapshot.request_context)
            .await
        {
            Ok(established) => established,
            Err(err) => {
                self.transport.cookies().clear();
                self.transport.set_domain(None);
                return Err(err.into());
            }
        };
        log::info!(
            "resumed session for uin {} saved at {}",
            snapshot.credentials.user_id,
            snapshot.saved_at
        );
        Ok(SessionView::new(
            snapshot.credentials.clone(),
            snapshot.request_context.clone(),
            established.profile,
            established.cursor,
        ))
    }
}
