//! Directory access: persisted grants, application state, and scoped access.
//!
//! - `state` - JSON application state (grant token, first-launch flag)
//! - `bookmark` - Token creation, resolution and staleness checks
//! - `scope` - Reference-counted access scopes with RAII guards

mod bookmark;
mod scope;
mod state;

pub use bookmark::{AccessGrant, BookmarkStore};
pub use scope::{AccessGuard, AccessScopes};
pub use state::AppStateStore;
