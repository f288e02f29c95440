//! Wire formats of the web endpoints.
//!
//! Login endpoints answer with JavaScript assignments, the confirmation
//! redirect with a small XML document, everything after login with JSON.

use std::collections::HashMap;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::transport::{LoginStatus, PollOutcome, TransportError, TransportResult};
use crate::types::{Credentials, MessageRecord, RequestContext, SyncCursor, UserProfile};

/// Remote codes that mean the session was invalidated.
const LOGGED_OUT_CODES: [&str; 3] = ["1100", "1101", "1102"];

fn cached(cell: &'static OnceLock<Regex>, pattern: &str) -> &'static Regex {
    cell.get_or_init(|| Regex::new(pattern).expect("valid wire regex"))
}

fn qr_code_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    cached(&RE, r"window\.QRLogin\.code\s*=\s*(\d+)")
}

fn qr_uuid_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    cached(&RE, r#"window\.QRLogin\.uuid\s*=\s*"([^"]*)""#)
}

fn login_code_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    cached(&RE, r"window\.code\s*=\s*(\d+)")
}

fn redirect_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    cached(&RE, r#"window\.redirect_uri\s*=\s*"([^"]*)""#)
}

fn retcode_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    cached(&RE, r#"retcode\s*:\s*"(\d+)""#)
}

fn selector_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    cached(&RE, r#"selector\s*:\s*"(\d+)""#)
}

/// `<name>value</name>` leaves; the closing name is captured separately
/// since the regex engine has no backreferences.
fn xml_leaf_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    cached(&RE, r"<(\w+)>([^<]*)</(\w+)>")
}

/// First capture group of `re` in `body`.
fn capture<'a>(re: &Regex, body: &'a str) -> Option<&'a str> {
    re.captures(body)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

/// Token from the `jslogin` answer.
pub(crate) fn parse_qr_token(body: &str) -> TransportResult<String> {
    let code = capture(qr_code_re(), body)
        .ok_or_else(|| TransportError::Malformed(format!("no QR login code in {body:?}")))?;
    if code != "200" {
        return Err(TransportError::Rejected {
            code: code.to_string(),
            message: "QR token request refused".to_string(),
        });
    }
    capture(qr_uuid_re(), body)
        .filter(|uuid| !uuid.is_empty())
        .map(str::to_string)
        .ok_or_else(|| TransportError::Malformed("no QR token in jslogin answer".to_string()))
}

/// Status code of a login poll, plus the redirect once confirmed.
pub(crate) fn parse_login_status(body: &str) -> TransportResult<(LoginStatus, Option<String>)> {
    let code = capture(login_code_re(), body)
        .ok_or_else(|| TransportError::Malformed(format!("no login status code in {body:?}")))?;
    match code {
        "408" => Ok((LoginStatus::Waiting, None)),
        "201" => Ok((LoginStatus::Scanned, None)),
        "400" => Ok((LoginStatus::Expired, None)),
        "200" => {
            let redirect = capture(redirect_re(), body)
                .filter(|uri| !uri.is_empty())
                .ok_or_else(|| {
                    TransportError::Malformed("login confirmed without redirect".to_string())
                })?;
            Ok((LoginStatus::Confirmed, Some(redirect.to_string())))
        }
        other => Err(TransportError::Rejected {
            code: other.to_string(),
            message: "unknown login status".to_string(),
        }),
    }
}

fn xml_leaves(body: &str) -> HashMap<&str, &str> {
    xml_leaf_re()
        .captures_iter(body)
        .filter_map(|caps| {
            let (open, value, close) = (caps.get(1)?, caps.get(2)?, caps.get(3)?);
            (open.as_str() == close.as_str()).then(|| (open.as_str(), value.as_str()))
        })
        .collect()
}

/// Credentials from the confirmation redirect's XML answer.
pub(crate) fn parse_login_info(body: &str) -> TransportResult<Credentials> {
    let leaves = xml_leaves(body);
    let ret = leaves
        .get("ret")
        .ok_or_else(|| TransportError::Malformed("login info without <ret>".to_string()))?;
    if *ret != "0" {
        return Err(TransportError::Rejected {
            code: ret.to_string(),
            message: leaves.get("message").copied().unwrap_or_default().to_string(),
        });
    }

    let field = |tag: &str| {
        leaves
            .get(tag)
            .map(|value| value.to_string())
            .ok_or_else(|| TransportError::Malformed(format!("login info without <{tag}>")))
    };
    let user_id = field("wxuin")?
        .parse::<i64>()
        .map_err(|e| TransportError::Malformed(format!("bad wxuin: {e}")))?;

    Ok(Credentials {
        server_id: field("wxsid")?,
        session_key: field("skey")?,
        pass_ticket: field("pass_ticket")?,
        user_id,
    })
}

/// Outcome of a `synccheck` long-poll.
pub(crate) fn parse_sync_check(body: &str) -> TransportResult<PollOutcome> {
    let retcode = capture(retcode_re(), body)
        .ok_or_else(|| TransportError::Malformed(format!("no retcode in {body:?}")))?;
    let selector = capture(selector_re(), body).unwrap_or("0");

    if LOGGED_OUT_CODES.contains(&retcode) {
        return Ok(PollOutcome::Terminated {
            code: retcode.to_string(),
        });
    }
    if retcode != "0" {
        return Err(TransportError::Rejected {
            code: retcode.to_string(),
            message: "sync check failed".to_string(),
        });
    }
    Ok(if selector == "0" {
        PollOutcome::Unchanged
    } else {
        PollOutcome::Changed
    })
}

#[derive(Debug, Serialize)]
pub(crate) struct BaseRequest<'a> {
    #[serde(rename = "Uin")]
    pub uin: i64,
    #[serde(rename = "Sid")]
    pub sid: &'a str,
    #[serde(rename = "Skey")]
    pub skey: &'a str,
    #[serde(rename = "DeviceID")]
    pub device_id: &'a str,
}

impl<'a> From<&'a RequestContext> for BaseRequest<'a> {
    fn from(ctx: &'a RequestContext) -> Self {
        Self {
            uin: ctx.user_id,
            sid: &ctx.server_id,
            skey: &ctx.session_key,
            device_id: ctx.device_id.as_str(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct BaseResponse {
    #[serde(rename = "Ret")]
    pub ret: i64,
    #[serde(rename = "ErrMsg", default)]
    pub err_msg: String,
}

impl BaseResponse {
    pub fn check(&self) -> TransportResult<()> {
        if self.ret == 0 {
            return Ok(());
        }
        Err(TransportError::Rejected {
            code: self.ret.to_string(),
            message: self.err_msg.clone(),
        })
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub(crate) struct SyncKeyItem {
    #[serde(rename = "Key")]
    pub key: u64,
    #[serde(rename = "Val")]
    pub val: u64,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub(crate) struct SyncKey {
    #[serde(rename = "Count", default)]
    pub count: usize,
    #[serde(rename = "List", default)]
    pub list: Vec<SyncKeyItem>,
}

impl From<&SyncCursor> for SyncKey {
    fn from(cursor: &SyncCursor) -> Self {
        Self {
            count: cursor.len(),
            list: cursor
                .entries()
                .iter()
                .map(|e| SyncKeyItem {
                    key: e.key,
                    val: e.value,
                })
                .collect(),
        }
    }
}

impl From<SyncKey> for SyncCursor {
    fn from(key: SyncKey) -> Self {
        SyncCursor::from_pairs(key.list.into_iter().map(|item| (item.key, item.val)))
    }
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct WireUser {
    #[serde(rename = "UserName", default)]
    pub user_name: String,
    #[serde(rename = "NickName", default)]
    pub nick_name: String,
}

impl From<WireUser> for UserProfile {
    fn from(user: WireUser) -> Self {
        Self {
            user_name: user.user_name,
            nick_name: user.nick_name,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct InitResponse {
    #[serde(rename = "BaseResponse", default)]
    pub base_response: BaseResponse,
    #[serde(rename = "User", default)]
    pub user: WireUser,
    #[serde(rename = "SyncKey", default)]
    pub sync_key: SyncKey,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SyncResponse {
    #[serde(rename = "BaseResponse", default)]
    pub base_response: BaseResponse,
    #[serde(rename = "AddMsgList", default)]
    pub add_msg_list: Vec<MessageRecord>,
    #[serde(rename = "SyncKey", default)]
    pub sync_key: SyncKey,
}

#[derive(Debug, Deserialize)]
pub(crate) struct StatusOnly {
    #[serde(rename = "BaseResponse", default)]
    pub base_response: BaseResponse,
}
