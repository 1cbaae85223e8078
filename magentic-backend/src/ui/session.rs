//! Per-browser session state
//!
//! Each session owns its interaction log and a run guard that allows a single
//! run at a time. Sessions are keyed by the `session_id` cookie.

use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex as AsyncMutex, MutexGuard as AsyncMutexGuard};
use uuid::Uuid;

use crate::interactions::InteractionLog;

pub const SESSION_COOKIE: &str = "session_id";
/// Sessions untouched for this long are dropped on the next sweep
pub const DEFAULT_IDLE_TTL_SECS: u64 = 3600;

pub struct SessionContext {
    interactions: Mutex<InteractionLog>,
    run_guard: AsyncMutex<()>,
    last_used: Mutex<Instant>,
}

impl Default for SessionContext {
    fn default() -> Self {
        Self {
            interactions: Mutex::new(InteractionLog::new()),
            run_guard: AsyncMutex::new(()),
            last_used: Mutex::new(Instant::now()),
        }
    }
}

impl SessionContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn interactions(&self) -> &Mutex<InteractionLog> {
        &self.interactions
    }

    /// Claim the session for one run; `None` while another run holds it
    pub fn try_begin_run(&self) -> Option<AsyncMutexGuard<'_, ()>> {
        self.run_guard.try_lock().ok()
    }

    fn touch(&self) {
        *self.last_used.lock() = Instant::now();
    }

    fn idle_for(&self) -> Duration {
        self.last_used.lock().elapsed()
    }
}

/// Sessions keyed by cookie value.
///
/// Entries are only created when a run is submitted; idle ones are swept out
/// whenever a new session is added.
pub struct SessionStore {
    sessions: DashMap<String, Arc<SessionContext>>,
    idle_ttl: Duration,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::with_idle_ttl(Duration::from_secs(DEFAULT_IDLE_TTL_SECS))
    }
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_idle_ttl(idle_ttl: Duration) -> Self {
        Self {
            sessions: DashMap::new(),
            idle_ttl,
        }
    }

    pub fn new_session_id() -> String {
        Uuid::new_v4().to_string()
    }

    pub fn get(&self, session_id: &str) -> Option<Arc<SessionContext>> {
        let session = self.sessions.get(session_id).map(|entry| Arc::clone(entry.value()))?;
        session.touch();
        Some(session)
    }

    pub fn get_or_create(&self, session_id: &str) -> Arc<SessionContext> {
        if let Some(session) = self.get(session_id) {
            return session;
        }

        self.sweep_idle();
        self.sessions
            .entry(session_id.to_string())
            .or_insert_with(|| {
                log::debug!("[SESSION] New session {}", session_id);
                Arc::new(SessionContext::new())
            })
            .clone()
    }

    /// Drop sessions idle past the TTL. A session still held by a request
    /// (including one with a run in flight) is kept.
    pub fn sweep_idle(&self) -> usize {
        let before = self.sessions.len();
        self.sessions
            .retain(|_, session| Arc::strong_count(session) > 1 || session.idle_for() < self.idle_ttl);
        let removed = before.saturating_sub(self.sessions.len());
        if removed > 0 {
            log::debug!("[SESSION] Swept {} idle sessions", removed);
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
