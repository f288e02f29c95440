//! Core data types of a web session.
//!
//! Credentials and request context, the sync cursor, and the message records
//! handed to consumers.

mod credentials;
mod cursor;
mod events;

pub use credentials::*;
pub use cursor::*;
pub use events::*;
