//! Magentic-One web backend
//!
//! Two entry points share this library: the interactive UI server
//! (`magentic-ui`) and the background task API (`task_api`).

pub mod agents;
pub mod ai;
pub mod config;
pub mod controllers;
pub mod db;
pub mod executor;
pub mod interactions;
pub mod models;
pub mod storage;
pub mod task_queue;
pub mod ui;

use std::sync::Arc;

use config::Config;
use task_queue::TaskQueue;
use ui::{SessionStore, UiController};

/// Shared state of the interactive UI server
pub struct AppState {
    pub config: Config,
    pub sessions: Arc<SessionStore>,
    pub ui: Arc<UiController>,
}

/// Shared state of the task API server
pub struct ApiState {
    pub tasks: TaskQueue,
}
