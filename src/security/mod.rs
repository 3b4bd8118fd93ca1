//! Security features.
//!
//! Authority levels, principals, and the authority comparison used by the
//! interceptor and the repository registry.

pub mod authority;

pub use authority::{AccessResult, Authority, Principal, satisfies};
