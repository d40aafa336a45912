//! Navigation policy: which paths a session may visit, and where to send it
//! otherwise.

pub mod guard;
pub mod navigator;

pub use {
    guard::{Decision, RoutePolicy, decide},
    navigator::{HistoryNavigator, Navigator},
};
