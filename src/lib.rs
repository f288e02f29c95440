//! webwx-rust: session lifecycle and sync engine for the web messaging protocol
//!
//! Logs a user in through the QR handshake (or resumes a saved session),
//! then long-polls for changes and hands every new message to a callback.
//!
//! ## Modules
//!
//! - `protocol` - `Session`, the login state machine and the sync loop
//! - `transport` - The `Transport` contract and the reference HTTP binding
//! - `store` - Live session state and snapshot persistence
//! - `types` - Credentials, request context, sync cursor, message records
//! - `config` - Configuration for the HTTP binding and the file store
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use webwx_rust::{HttpTransport, JsonFileSnapshotStore, Session, WebwxConfig};
//!
//! # async fn run() -> Result<(), webwx_rust::SessionError> {
//! let config = WebwxConfig::default();
//! let store = Arc::new(JsonFileSnapshotStore::from_config(&config));
//! let transport = Arc::new(HttpTransport::new(config));
//! let session = Session::new(transport);
//!
//! session.handlers().on_qr_issued(|token| println!("scan: {token}"));
//! session.handlers().on_message(|msg| println!("{}", msg.record.content));
//!
//! session.login(Some(store), true).await?;
//! session.wait_until_done().await
//! # }
//! ```

pub mod config;
pub mod protocol;
pub mod store;
pub mod transport;
pub mod types;

#[cfg(test)]
mod testing;

pub use config::{ClientMode, WebwxConfig};
pub use protocol::{Handlers, Session, SessionError, SessionRef};
pub use store::{JsonFileSnapshotStore, MemorySnapshotStore, PersistedSnapshot, SnapshotStore};
pub use transport::{qrcode_url, HttpTransport, Transport};
pub use types::{Credentials, Message, MessageRecord, SyncCursor};
