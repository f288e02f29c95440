//! Transport contract between the session core and the remote service.
//!
//! The core only speaks in logical requests. A binding turns them into
//! whatever goes over the wire; [`HttpTransport`] is the reference one.

mod cookies;
mod http;
mod wire;

use async_trait::async_trait;

use crate::store::SessionView;
use crate::types::{MessageRecord, RequestContext, SyncCursor, UserProfile};

pub use cookies::{Cookie, CookieJar, CookieMap};
pub use http::{qrcode_url, HttpTransport};

/// Login progress reported by the remote for a QR token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginStatus {
    Waiting,
    Scanned,
    Confirmed,
    Expired,
}

/// Answer to a login status query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginStatusResponse {
    pub status: LoginStatus,
    /// For `Scanned`, whatever the remote sent (e.g. an avatar). For
    /// `Confirmed`, the normalized credentials JSON.
    pub payload: Vec<u8>,
}

impl LoginStatusResponse {
    pub fn new(status: LoginStatus, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            payload: payload.into(),
        }
    }
}

/// Result of establishing a session.
#[derive(Debug, Clone, PartialEq)]
pub struct EstablishedSession {
    pub cursor: SyncCursor,
    pub profile: UserProfile,
}

/// Outcome of one change-detection long-poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    Unchanged,
    Changed,
    /// The remote invalidated the session (e.g. logged out from the phone).
    Terminated { code: String },
}

/// A fetched batch of changes.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ChangeBatch {
    pub cursor: SyncCursor,
    /// Records in server order.
    pub records: Vec<MessageRecord>,
}

/// Transport-level failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// Could not reach the remote or the connection broke.
    #[error("network error: {0}")]
    Network(String),
    /// The remote answered with an HTTP error status.
    #[error("unexpected HTTP status {0}")]
    Status(u16),
    /// The runtime could not drive the call.
    #[error("transport task failed: {0}")]
    Task(String),
    /// The remote answered, but not in a shape we understand.
    #[error("malformed response: {0}")]
    Malformed(String),
    /// The remote answered with an explicit refusal.
    #[error("remote rejected request ({code}): {message}")]
    Rejected { code: String, message: String },
}

impl TransportError {
    /// Whether the remote was reached and answered.
    pub fn is_protocol(&self) -> bool {
        matches!(
            self,
            TransportError::Malformed(_) | TransportError::Rejected { .. }
        )
    }
}

pub type TransportResult<T> = Result<T, TransportError>;

/// Logical operations the session core needs from the remote.
///
/// Implementations own their retry policy; the core never retries. Long-poll
/// calls may block for as long as the remote holds them open.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Request a fresh QR token.
    async fn request_qr_token(&self) -> TransportResult<String>;

    /// Long-poll the login status of `token`.
    async fn fetch_login_status(&self, token: &str) -> TransportResult<LoginStatusResponse>;

    /// Validate a request context and fetch the initial sync state.
    async fn establish_session(&self, context: &RequestContext) -> TransportResult<EstablishedSession>;

    /// Tell the account's other devices that this client logged in.
    async fn notify_login(&self, session: &SessionView) -> TransportResult<()>;

    /// Long-poll for changes past the session's cursor.
    async fn poll_for_changes(&self, session: &SessionView) -> TransportResult<PollOutcome>;

    /// Fetch the changes past the session's cursor.
    async fn fetch_change_batch(&self, session: &SessionView) -> TransportResult<ChangeBatch>;

    /// Terminate the session server-side.
    async fn logout(&self, context: &RequestContext) -> TransportResult<()>;

    /// Cookies captured so far.
    fn cookies(&self) -> &CookieJar;

    /// Routing domain the session lives on, if the binding tracks one.
    fn domain(&self) -> Option<String> {
        None
    }

    fn set_domain(&self, _domain: Option<String>) {}
}
