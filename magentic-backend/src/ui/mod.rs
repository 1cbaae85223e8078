//! Interactive web UI: sessions, run orchestration and HTML rendering

pub mod controller;
pub mod session;
pub mod templates;

pub use controller::{RunReport, RunRequest, StoredRun, UiController};
pub use session::{SESSION_COOKIE, SessionContext, SessionStore};
