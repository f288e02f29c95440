//! Point-in-time copy of a live session, used for warm restarts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::store::{StoreError, StoreResult};
use crate::transport::CookieMap;
use crate::types::{Credentials, RequestContext};

/// Everything needed to resume a session without a QR handshake.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedSnapshot {
    pub cookies: CookieMap,
    pub request_context: RequestContext,
    pub credentials: Credentials,
    /// Routing domain the login was redirected to.
    #[serde(default)]
    pub domain: Option<String>,
    pub saved_at: DateTime<Utc>,
}

impl PersistedSnapshot {
    pub fn new(
        cookies: CookieMap,
        request_context: RequestContext,
        credentials: Credentials,
        domain: Option<String>,
    ) -> Self {
        Self {
            cookies,
            request_context,
            credentials,
            domain,
            saved_at: Utc::now(),
        }
    }

    /// Check the snapshot is usable as a whole.
    ///
    /// A snapshot is either applied completely or not at all, so anything
    /// inconsistent is rejected here rather than half-restored later.
    pub fn validate(&self) -> StoreResult<()> {
        self.credentials
            .check()
            .map_err(|e| StoreError::Invalid(e.to_string()))?;
        if !self.request_context.matches(&self.credentials) {
            return Err(StoreError::Invalid(
                "request context was not derived from the stored credentials".to_string(),
            ));
        }
        if self.request_context.device_id.as_str().is_empty() {
            return Err(StoreError::Invalid("missing device id".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
pub(crate) fn sample_snapshot() -> PersistedSnapshot {
    use crate::transport::Cookie;
    use crate::types::DeviceId;

    let credentials = Credentials {
        server_id: "sid-7".to_string(),
        session_key: "@crypt_7".to_string(),
        pass_ticket: "pt-7".to_string(),
        user_id: 7,
    };
    let context = RequestContext::derive(&credentials, DeviceId::from("e000000000000007".to_string()));
    let mut cookies = CookieMap::new();
    cookies.insert(
        "https://wx2.qq.com/cgi-bin/mmwebwx-bin/webwxnewloginpage".to_string(),
        vec![Cookie::new("wxsid", "sid-7")],
    );
    PersistedSnapshot::new(cookies, context, credentials, Some("wx2.qq.com".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_snapshot() {
        assert!(sample_snapshot().validate().is_ok());
    }

    #[test]
    fn test_mismatched_context_rejected() {
        let mut snapshot = sample_snapshot();
        snapshot.request_context.session_key = "@crypt_stale".to_string();
        assert!(matches!(snapshot.validate(), Err(StoreError::Invalid(_))));
    }

    #[test]
    fn test_empty_credentials_rejected() {
        let mut snapshot = sample_snapshot();
        snapshot.credentials.server_id.clear();
        snapshot.request_context.server_id.clear();
        assert!(matches!(snapshot.validate(), Err(StoreError::Invalid(_))));
    }

    #[test]
    fn test_json_roundtrip_keeps_domain() {
        let snapshot = sample_snapshot();
        let json = serde_json::to_string(&snapshot).unwrap();
        let back: PersistedSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(back, snapshot);
        assert_eq!(back.domain.as_deref(), Some("wx2.qq.com"));
    }
}
