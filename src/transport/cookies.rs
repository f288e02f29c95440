//! Cookie capture shared between a transport and snapshot persistence.
//!
//! The transport writes on every response while persistence reads a copy
//! now and then, so a short-lived mutex around the map is enough.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use url::Url;

/// One captured cookie.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cookie {
    pub name: String,
    pub value: String,
    /// `Domain` attribute, without a leading dot. Empty for host-only cookies.
    #[serde(default)]
    pub domain: String,
    #[serde(default)]
    pub path: String,
}

impl Cookie {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            domain: String::new(),
            path: String::new(),
        }
    }

    /// Parse a `Set-Cookie` header value.
    pub fn parse(header: &str) -> Option<Self> {
        let mut parts = header.split(';');
        let (name, value) = parts.next()?.trim().split_once('=')?;
        if name.is_empty() {
            return None;
        }

        let mut cookie = Cookie::new(name.trim(), value.trim());
        for attr in parts {
            let (key, val) = match attr.trim().split_once('=') {
                Some((k, v)) => (k.trim(), v.trim()),
                None => continue,
            };
            if key.eq_ignore_ascii_case("domain") {
                cookie.domain = val.trim_start_matches('.').to_ascii_lowercase();
            } else if key.eq_ignore_ascii_case("path") {
                cookie.path = val.to_string();
            }
        }
        Some(cookie)
    }

    fn applies_to(&self, host: &str, origin_host: &str) -> bool {
        if self.domain.is_empty() {
            return host == origin_host;
        }
        host == self.domain || host.ends_with(&format!(".{}", self.domain))
    }
}

/// Cookies keyed by the URL of the response that set them.
pub type CookieMap = BTreeMap<String, Vec<Cookie>>;

/// Thread-safe cookie store.
#[derive(Debug, Default)]
pub struct CookieJar {
    cookies: Mutex<CookieMap>,
}

impl CookieJar {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, CookieMap> {
        self.cookies.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record the cookies a response to `url` set.
    pub fn capture(&self, url: &str, cookies: Vec<Cookie>) {
        if cookies.is_empty() {
            return;
        }
        self.lock().insert(url.to_string(), cookies);
    }

    /// Copy of every captured cookie, for persistence.
    pub fn snapshot(&self) -> CookieMap {
        self.lock().clone()
    }

    /// Replace the jar contents with a persisted map.
    pub fn restore(&self, cookies: CookieMap) {
        *self.lock() = cookies;
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Look up a cookie value by name, for any host.
    pub fn get(&self, name: &str) -> Option<String> {
        self.lock()
            .values()
            .flatten()
            .filter(|c| c.name == name)
            .map(|c| c.value.clone())
            .last()
    }

    /// `Cookie` request header for a request to `url`.
    pub fn header_for(&self, url: &str) -> Option<String> {
        let host = host_of(url)?;
        let jar = self.lock();
        let mut selected: BTreeMap<&str, &str> = BTreeMap::new();
        for (origin, cookies) in jar.iter() {
            let Some(origin_host) = host_of(origin) else {
                continue;
            };
            for cookie in cookies.iter().filter(|c| c.applies_to(&host, &origin_host)) {
                selected.insert(&cookie.name, &cookie.value);
            }
        }

        if selected.is_empty() {
            return None;
        }
        Some(
            selected
                .iter()
                .map(|(name, value)| format!("{name}={value}"))
                .collect::<Vec<_>>()
                .join("; "),
        )
    }
}

/// Host part of an absolute URL, `None` if it does not parse.
fn host_of(url: &str) -> Option<String> {
    Url::parse(url).ok()?.host_str().map(str::to_string)
}
