use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Which web client the HTTP binding impersonates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientMode {
    /// Plain browser login.
    #[default]
    Normal,
    /// Desktop-client login, which sends the extra patch headers.
    Desktop,
}

/// Base configuration used by the HTTP binding and the file snapshot store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WebwxConfig {
    /// Host serving the QR login endpoints.
    pub login_host: String,
    /// Host serving QR code images.
    pub qrcode_host: String,
    /// Routing domain used until a login redirect names another one.
    pub default_domain: String,
    /// Application id sent when requesting a QR token.
    pub app_id: String,
    /// Language parameter sent on every call that takes one.
    pub lang: String,
    /// Identifier sent in the User-Agent header.
    pub user_agent: String,
    /// Client flavour to present during login.
    pub mode: ClientMode,
    /// `client-version` header value for desktop mode.
    pub desktop_client_version: String,
    /// `extspam` header value for desktop mode.
    pub desktop_extspam: String,
    /// Read timeout for long-poll calls, in seconds. Must exceed the server's hold time.
    pub poll_timeout_secs: u64,
    /// Connect timeout, in seconds.
    pub connect_timeout_secs: u64,
    /// Where [`JsonFileSnapshotStore`](crate::store::JsonFileSnapshotStore) keeps snapshots.
    pub snapshot_path: String,
}

impl Default for WebwxConfig {
    fn default() -> Self {
        Self {
            login_host: "login.wx.qq.com".into(),
            qrcode_host: "login.weixin.qq.com".into(),
            default_domain: "wx.qq.com".into(),
            app_id: "wx782c26e4c19acffb".into(),
            lang: "zh_CN".into(),
            user_agent: "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/89.0.4389.114 Safari/537.36".into(),
            mode: ClientMode::Normal,
            desktop_client_version: "2.0.0".into(),
            desktop_extspam: String::new(),
            poll_timeout_secs: 35,
            connect_timeout_secs: 10,
            snapshot_path: "./data/session.json".into(),
        }
    }
}

impl WebwxConfig {
    /// Override the login host.
    pub fn with_login_host(mut self, host: impl Into<String>) -> Self {
        self.login_host = host.into();
        self
    }

    /// Override the initial routing domain.
    pub fn with_default_domain(mut self, domain: impl Into<String>) -> Self {
        self.default_domain = domain.into();
        self
    }

    /// Override the user agent string.
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Switch between browser and desktop login.
    pub fn with_mode(mut self, mode: ClientMode) -> Self {
        self.mode = mode;
        self
    }

    /// Set the desktop `extspam` header.
    pub fn with_desktop_extspam(mut self, extspam: impl Into<String>) -> Self {
        self.desktop_extspam = extspam.into();
        self
    }

    /// Override the long-poll read timeout.
    pub fn with_poll_timeout(mut self, timeout: Duration) -> Self {
        self.poll_timeout_secs = timeout.as_secs();
        self
    }

    /// Override the snapshot file location.
    pub fn with_snapshot_path(mut self, path: impl Into<String>) -> Self {
        self.snapshot_path = path.into();
        self
    }

    pub fn poll_timeout(&self) -> Duration {
        Duration::from_secs(self.poll_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builders_override_defaults() {
        let config = WebwxConfig::default()
            .with_mode(ClientMode::Desktop)
            .with_default_domain("wx2.qq.com")
            .with_poll_timeout(Duration::from_secs(60));
        assert_eq!(config.mode, ClientMode::Desktop);
        assert_eq!(config.default_domain, "wx2.qq.com");
        assert_eq!(config.poll_timeout(), Duration::from_secs(60));
        assert_eq!(config.lang, "zh_CN");
    }

    #[test]
    fn test_config_deserializes_from_json() {
        let json = serde_json::to_string(&WebwxConfig::default()).unwrap();
        let back: WebwxConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, WebwxConfig::default());
    }
}
