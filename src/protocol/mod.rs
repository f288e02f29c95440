//! Session lifecycle: QR login, warm start and the sync loop.
//!
//! [`Session`] is the entry point. [`Authenticator`] and [`LoginState`] are
//! exposed for callers that want to drive the handshake themselves.

mod client;
mod error;
mod handlers;
mod lifecycle;
mod login;
mod sync;

pub use client::{Session, SessionRef};
pub use error::{ErrorKind, SessionError};
pub use handlers::*;
pub use login::{Authenticator, LoginState};
