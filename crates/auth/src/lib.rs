//! Session lifecycle: login, registration, token persistence, profile and
//! permission retrieval.

pub mod manager;
pub mod storage;

pub use {
    manager::{ProfileFetch, SessionManager},
    storage::TokenStore,
};
