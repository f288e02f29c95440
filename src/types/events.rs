//! Message records delivered by the sync engine.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::protocol::{Session, SessionRef};

/// A raw message record as returned in a change batch.
///
/// Only the envelope fields are typed; content parsing belongs to the
/// consumer, everything else stays in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MessageRecord {
    #[serde(rename = "MsgId", default)]
    pub msg_id: String,
    #[serde(rename = "FromUserName", default)]
    pub from_user_name: String,
    #[serde(rename = "ToUserName", default)]
    pub to_user_name: String,
    #[serde(rename = "MsgType", default)]
    pub msg_type: i64,
    #[serde(rename = "Content", default)]
    pub content: String,
    #[serde(rename = "CreateTime", default)]
    pub create_time: i64,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A record handed to the message handler, bound to the session it arrived on.
#[derive(Debug, Clone)]
pub struct Message {
    pub record: MessageRecord,
    session: SessionRef,
}

impl Message {
    pub(crate) fn new(record: MessageRecord, session: SessionRef) -> Self {
        Self { record, session }
    }

    /// The owning session, for authenticated follow-up calls.
    ///
    /// `None` once every `Session` handle has been dropped.
    pub fn session(&self) -> Option<Session> {
        self.session.upgrade()
    }

    pub fn is_sent_by(&self, user_name: &str) -> bool {
        self.record.from_user_name == user_name
    }
}
