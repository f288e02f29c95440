//! Identity material issued by the remote service.
//!
//! `Credentials` are captured once at QR confirmation and never mutated.
//! Every authenticated call afterwards carries a `RequestContext`, which can
//! only be derived from a `Credentials` value.

use std::fmt;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Identity issued at confirmation time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    /// Server-side session id (`wxsid`).
    pub server_id: String,
    /// Session key (`skey`).
    pub session_key: String,
    /// Pass ticket required by a handful of endpoints.
    pub pass_ticket: String,
    /// Numeric user id (`wxuin`).
    pub user_id: i64,
}

impl Credentials {
    /// Decode credentials from a `Confirmed` login payload.
    ///
    /// Transport bindings normalize the confirmation response to the JSON
    /// form of this struct before handing it to the login state machine.
    pub fn from_confirmation(payload: &[u8]) -> Result<Self, CredentialsError> {
        let credentials: Credentials = serde_json::from_slice(payload)
            .map_err(|e| CredentialsError::Malformed(e.to_string()))?;
        credentials.check()?;
        Ok(credentials)
    }

    /// Encode into the normalized confirmation payload.
    pub fn to_confirmation(&self) -> Vec<u8> {
        // A struct of strings and an integer always serializes.
        serde_json::to_vec(self).unwrap_or_default()
    }

    pub(crate) fn check(&self) -> Result<(), CredentialsError> {
        if self.server_id.is_empty() {
            return Err(CredentialsError::MissingField("server_id"));
        }
        if self.session_key.is_empty() {
            return Err(CredentialsError::MissingField("session_key"));
        }
        Ok(())
    }
}

/// Problems decoding a credentials payload.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CredentialsError {
    #[error("malformed credentials payload: {0}")]
    Malformed(String),
    #[error("credentials payload is missing `{0}`")]
    MissingField(&'static str),
}

/// Locally generated device identifier: `e` followed by 15 digits.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(String);

impl DeviceId {
    pub fn random() -> Self {
        let mut rng = rand::thread_rng();
        let digits: String = (0..15)
            .map(|_| char::from(b'0' + rng.gen_range(0..10u8)))
            .collect();
        Self(format!("e{digits}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for DeviceId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Per-request authentication context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestContext {
    pub user_id: i64,
    pub server_id: String,
    pub session_key: String,
    pub device_id: DeviceId,
}

impl RequestContext {
    /// Derive the context for a freshly captured identity.
    pub fn derive(credentials: &Credentials, device_id: DeviceId) -> Self {
        Self {
            user_id: credentials.user_id,
            server_id: credentials.server_id.clone(),
            session_key: credentials.session_key.clone(),
            device_id,
        }
    }

    /// Whether this context was derived from `credentials`.
    pub fn matches(&self, credentials: &Credentials) -> bool {
        self.user_id == credentials.user_id
            && self.server_id == credentials.server_id
            && self.session_key == credentials.session_key
    }
}

/// The logged-in account as reported when the session is established.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    /// Session-scoped handle used to address the account.
    pub user_name: String,
    /// Display name.
    pub nick_name: String,
}
