//! Session state and snapshot persistence.
//!
//! [`SessionStore`] holds the live state of one login. [`SnapshotStore`] is
//! the pluggable warm-restart contract, with file and memory implementations.

mod file;
mod memory;
mod session;
pub(crate) mod snapshot;
mod traits;

pub use file::*;
pub use memory::*;
pub use session::*;
pub use snapshot::PersistedSnapshot;
pub use traits::*;
