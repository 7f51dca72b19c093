//! Storage traits for auth state.
//!
//! - [`RevocationStore`] - revoked access tokens, with the in-process
//!   [`InMemoryRevocationStore`]
//! - [`UserDirectory`] - subject to role lookup, implemented by the host
//!   application

pub mod revoked_token;
pub mod user;

pub use revoked_token::{
    InMemoryRevocationStore, RevocationStore, revocation_key, spawn_revocation_sweeper,
};
pub use user::{DirectoryEntry, UserDirectory};
