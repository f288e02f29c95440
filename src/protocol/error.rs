//! Session error taxonomy.

use thiserror::Error;

use crate::store::StoreError;
use crate::transport::TransportError;
use crate::types::CredentialsError;

/// Coarse class of a [`SessionError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Could not ask the remote.
    Transport,
    /// The remote answered with something unexpected.
    Protocol,
    /// The QR code or the session was invalidated; restart login.
    Expiry,
    /// The call was made in the wrong lifecycle state.
    Precondition,
    /// Snapshot storage failed.
    Persistence,
    /// The sync task died.
    Aborted,
}

/// Errors surfaced by login, sync and the session lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("transport error: {0}")]
    Transport(TransportError),
    #[error("protocol error: {0}")]
    Protocol(String),
    #[error("QR code expired; request a new one")]
    QrExpired,
    #[error("session terminated by the remote (code {code})")]
    RemoteLogout { code: String },
    #[error("no session is logged in")]
    NotLoggedIn,
    #[error("a session is already logged in")]
    AlreadyLoggedIn,
    #[error("snapshot persistence failed: {0}")]
    Persistence(#[from] StoreError),
    #[error("sync task aborted: {0}")]
    SyncAborted(String),
}

impl SessionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SessionError::Transport(_) => ErrorKind::Transport,
            SessionError::Protocol(_) => ErrorKind::Protocol,
            SessionError::QrExpired | SessionError::RemoteLogout { .. } => ErrorKind::Expiry,
            SessionError::NotLoggedIn | SessionError::AlreadyLoggedIn => ErrorKind::Precondition,
            SessionError::Persistence(_) => ErrorKind::Persistence,
            SessionError::SyncAborted(_) => ErrorKind::Aborted,
        }
    }

    /// Whether restarting the QR login is the expected reaction.
    pub fn requires_relogin(&self) -> bool {
        self.kind() == ErrorKind::Expiry
    }
}

impl From<TransportError> for SessionError {
    fn from(err: TransportError) -> Self {
        if err.is_protocol() {
            SessionError::Protocol(err.to_string())
        } else {
            SessionError::Transport(err)
        }
    }
}

impl From<CredentialsError> for SessionError {
    fn from(err: CredentialsError) -> Self {
        SessionError::Protocol(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_faults_stay_transport() {
        let err = SessionError::from(TransportError::Network("reset".to_string()));
        assert_eq!(err.kind(), ErrorKind::Transport);
        assert_eq!(
            err,
            SessionError::Transport(TransportError::Network("reset".to_string()))
        );
    }

    #[test]
    fn test_remote_refusals_become_protocol() {
        let err = SessionError::from(TransportError::Rejected {
            code: "1205".to_string(),
            message: "nope".to_string(),
        });
        assert_eq!(err.kind(), ErrorKind::Protocol);

        let err = SessionError::from(CredentialsError::MissingField("server_id"));
        assert_eq!(err.kind(), ErrorKind::Protocol);
    }

    #[test]
    fn test_expiry_requires_relogin() {
        assert!(SessionError::QrExpired.requires_relogin());
        assert!(SessionError::RemoteLogout {
            code: "1101".to_string()
        }
        .requires_relogin());
        assert!(!SessionError::NotLoggedIn.requires_relogin());
        assert_eq!(
            SessionError::from(StoreError::NotFound).kind(),
            ErrorKind::Persistence
        );
    }
}
