//! Reference HTTP binding for the web endpoints.
//!
//! `ureq` is blocking, so every call runs on tokio's blocking pool. Redirects
//! are never followed automatically: the login confirmation redirect carries
//! the credentials and is followed by hand.

use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde_json::json;
use url::Url;

use crate::config::{ClientMode, WebwxConfig};
use crate::store::SessionView;
use crate::transport::wire::{self, BaseRequest, InitResponse, StatusOnly, SyncKey, SyncResponse};
use crate::transport::{
    ChangeBatch, Cookie, CookieJar, EstablishedSession, LoginStatus, LoginStatusResponse,
    PollOutcome, Transport, TransportError, TransportResult,
};
use crate::types::RequestContext;

const JSON_CONTENT_TYPE: &str = "application/json; charset=UTF-8";

/// URL of the QR image for `token`.
pub fn qrcode_url(config: &WebwxConfig, token: &str) -> String {
    format!("https://{}/qrcode/{}", config.qrcode_host, token)
}

/// One logical HTTP request.
#[derive(Debug)]
struct Call {
    method: &'static str,
    url: String,
    query: Vec<(&'static str, String)>,
    headers: Vec<(&'static str, String)>,
    body: Option<String>,
}

impl Call {
    fn get(url: impl Into<String>) -> Self {
        Self {
            method: "GET",
            url: url.into(),
            query: Vec::new(),
            headers: Vec::new(),
            body: None,
        }
    }

    fn post_json(url: impl Into<String>, body: &serde_json::Value) -> Self {
        Self {
            method: "POST",
            body: Some(body.to_string()),
            ..Self::get(url)
        }
    }

    fn query(mut self, name: &'static str, value: impl ToString) -> Self {
        self.query.push((name, value.to_string()));
        self
    }

    fn header(mut self, name: &'static str, value: impl Into<String>) -> Self {
        self.headers.push((name, value.into()));
        self
    }
}

/// Transport that talks to the web endpoints over HTTPS.
pub struct HttpTransport {
    config: WebwxConfig,
    agent: ureq::Agent,
    cookies: Arc<CookieJar>,
    domain: RwLock<Option<String>>,
}

impl HttpTransport {
    pub fn new(config: WebwxConfig) -> Self {
        let agent = ureq::AgentBuilder::new()
            .redirects(0)
            .timeout_connect(config.connect_timeout())
            .timeout_read(config.poll_timeout())
            .build();
        Self {
            config,
            agent,
            cookies: Arc::new(CookieJar::new()),
            domain: RwLock::new(None),
        }
    }

    pub fn config(&self) -> &WebwxConfig {
        &self.config
    }

    /// Domain authenticated calls go to.
    fn routing_domain(&self) -> String {
        self.domain()
            .unwrap_or_else(|| self.config.default_domain.clone())
    }

    fn endpoint(&self, name: &str) -> String {
        format!("https://{}/cgi-bin/mmwebwx-bin/{}", self.routing_domain(), name)
    }

    fn push_endpoint(&self, name: &str) -> String {
        format!(
            "https://webpush.{}/cgi-bin/mmwebwx-bin/{}",
            self.routing_domain(),
            name
        )
    }

    fn login_page_url(&self) -> String {
        let page = format!(
            "https://{}/cgi-bin/mmwebwx-bin/webwxnewloginpage",
            self.config.default_domain
        );
        match self.config.mode {
            ClientMode::Normal => page,
            ClientMode::Desktop => format!("{page}?mod=desktop"),
        }
    }

    async fn execute(&self, call: Call) -> TransportResult<String> {
        let agent = self.agent.clone();
        let jar = Arc::clone(&self.cookies);
        let user_agent = self.config.user_agent.clone();
        log::debug!("{} {}", call.method, call.url);
        tokio::task::spawn_blocking(move || execute_blocking(&agent, &jar, &user_agent, call))
            .await
            .map_err(|e| TransportError::Task(e.to_string()))?
    }

    async fn execute_json<T: DeserializeOwned>(&self, call: Call) -> TransportResult<T> {
        let body = self.execute(call).await?;
        serde_json::from_str(&body).map_err(|e| TransportError::Malformed(e.to_string()))
    }

    /// Follow the confirmation redirect and normalize the credentials it returns.
    async fn redeem_confirmation(&self, redirect: &str) -> TransportResult<Vec<u8>> {
        let domain = redirect_host(redirect)?;
        let mut call = Call::get(redirect)
            .query("fun", "new")
            .query("version", "v2");
        if self.config.mode == ClientMode::Desktop {
            call = call
                .header("client-version", self.config.desktop_client_version.clone())
                .header("extspam", self.config.desktop_extspam.clone());
        }

        let body = self.execute(call).await?;
        let credentials = wire::parse_login_info(&body)?;
        self.set_domain(Some(domain));
        Ok(credentials.to_confirmation())
    }
}

/// Routing domain named by a confirmation redirect.
fn redirect_host(redirect: &str) -> TransportResult<String> {
    let url = Url::parse(redirect)
        .map_err(|e| TransportError::Malformed(format!("bad redirect {redirect:?}: {e}")))?;
    url.host_str()
        .map(str::to_string)
        .ok_or_else(|| TransportError::Malformed(format!("redirect without host: {redirect:?}")))
}

fn execute_blocking(
    agent: &ureq::Agent,
    jar: &CookieJar,
    user_agent: &str,
    call: Call,
) -> TransportResult<String> {
    let mut request = agent
        .request(call.method, &call.url)
        .set("User-Agent", user_agent);
    for (name, value) in &call.query {
        request = request.query(name, value);
    }
    for (name, value) in &call.headers {
        request = request.set(name, value);
    }
    if let Some(cookie) = jar.header_for(&call.url) {
        request = request.set("Cookie", &cookie);
    }

    let result = match &call.body {
        Some(body) => request.set("Content-Type", JSON_CONTENT_TYPE).send_string(body),
        None => request.call(),
    };
    let response = match result {
        Ok(response) => response,
        Err(ureq::Error::Status(code, _)) => return Err(TransportError::Status(code)),
        Err(ureq::Error::Transport(err)) => return Err(TransportError::Network(err.to_string())),
    };

    let cookies = response
        .all("set-cookie")
        .into_iter()
        .filter_map(Cookie::parse)
        .collect();
    jar.capture(&call.url, cookies);

    response
        .into_string()
        .map_err(|e| TransportError::Network(e.to_string()))
}

#[async_trait]
impl Transport for HttpTransport {
    async fn request_qr_token(&self) -> TransportResult<String> {
        let call = Call::get(format!("https://{}/jslogin", self.config.login_host))
            .query("appid", &self.config.app_id)
            .query("redirect_uri", self.login_page_url())
            .query("fun", "new")
            .query("lang", &self.config.lang)
            .query("_", Utc::now().timestamp());
        let body = self.execute(call).await?;
        wire::parse_qr_token(&body)
    }

    async fn fetch_login_status(&self, token: &str) -> TransportResult<LoginStatusResponse> {
        let now = Utc::now().timestamp();
        let call = Call::get(format!(
            "https://{}/cgi-bin/mmwebwx-bin/login",
            self.config.login_host
        ))
        .query("r", now / 1579)
        .query("_", now)
        .query("loginicon", "true")
        .query("uuid", token)
        .query("tip", "0");

        let body = self.execute(call).await?;
        match wire::parse_login_status(&body)? {
            (LoginStatus::Confirmed, Some(redirect)) => {
                let payload = self.redeem_confirmation(&redirect).await?;
                Ok(LoginStatusResponse::new(LoginStatus::Confirmed, payload))
            }
            (status, _) => Ok(LoginStatusResponse::new(status, body)),
        }
    }

    async fn establish_session(&self, context: &RequestContext) -> TransportResult<EstablishedSession> {
        let call = Call::post_json(
            self.endpoint("webwxinit"),
            &json!({ "BaseRequest": BaseRequest::from(context) }),
        )
        .query("_", Utc::now().timestamp());

        let resp: InitResponse = self.execute_json(call).await?;
        resp.base_response.check()?;
        Ok(EstablishedSession {
            cursor: resp.sync_key.into(),
            profile: resp.user.into(),
        })
    }

    async fn notify_login(&self, session: &SessionView) -> TransportResult<()> {
        let user_name = &session.profile.user_name;
        let call = Call::post_json(
            self.endpoint("webwxstatusnotify"),
            &json!({
                "BaseRequest": BaseRequest::from(&*session.request_context),
                "ClientMsgId": Utc::now().timestamp_millis(),
                "Code": 3,
                "FromUserName": user_name,
                "ToUserName": user_name,
            }),
        )
        .query("lang", &self.config.lang)
        .query("pass_ticket", &session.credentials.pass_ticket);

        let resp: StatusOnly = self.execute_json(call).await?;
        resp.base_response.check()
    }

    async fn poll_for_changes(&self, session: &SessionView) -> TransportResult<PollOutcome> {
        let ctx = &session.request_context;
        let now = Utc::now().timestamp_millis();
        let call = Call::get(self.push_endpoint("synccheck"))
            .query("r", now)
            .query("skey", &ctx.session_key)
            .query("sid", &ctx.server_id)
            .query("uin", ctx.user_id)
            .query("deviceid", ctx.device_id.as_str())
            .query("synckey", session.cursor.to_query_value())
            .query("_", now);

        let body = self.execute(call).await?;
        wire::parse_sync_check(&body)
    }

    async fn fetch_change_batch(&self, session: &SessionView) -> TransportResult<ChangeBatch> {
        let ctx = &session.request_context;
        let call = Call::post_json(
            self.endpoint("webwxsync"),
            &json!({
                "BaseRequest": BaseRequest::from(&**ctx),
                "SyncKey": SyncKey::from(&session.cursor),
                "rr": Utc::now().timestamp().to_string(),
            }),
        )
        .query("sid", &ctx.server_id)
        .query("skey", &ctx.session_key)
        .query("pass_ticket", &session.credentials.pass_ticket);

        let resp: SyncResponse = self.execute_json(call).await?;
        resp.base_response.check()?;
        Ok(ChangeBatch {
            cursor: resp.sync_key.into(),
            records: resp.add_msg_list,
        })
    }

    async fn logout(&self, context: &RequestContext) -> TransportResult<()> {
        let call = Call::get(self.endpoint("webwxlogout"))
            .query("redirect", "1")
            .query("type", "1")
            .query("skey", &context.session_key);
        self.execute(call).await.map(|_| ())
    }

    fn cookies(&self) -> &CookieJar {
        &self.cookies
    }

    fn domain(&self) -> Option<String> {
        self.domain
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set_domain(&self, domain: Option<String>) {
        *self.domain.write().unwrap_or_else(PoisonError::into_inner) = domain;
    }
}
