//! Query-session protocol state.
//!
//! Each connected client owns one session. A session runs at most one query
//! at a time: a query arriving while another is in flight is dropped.
//!
//! ```text
//! NONE ──► PENDING ──► SEARCHING_LOCAL ──► [SEARCHING_INTERNET] ──► SUCCESS | ERROR
//!  ▲                                                                     │
//!  └──────────────────────── (next query) ◄──────────────────────────────┘
//! ```
//!
//! Closing a session only removes its bookkeeping. Work already started runs
//! to completion and its updates are discarded.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::debug;

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QueryState {
    #[default]
    None,
    SearchingLocal,
    SearchingInternet,
    Pending,
    Success,
    Error,
}

impl QueryState {
    /// Whether a new query may start.
    pub fn is_idle(self) -> bool {
        matches!(self, QueryState::None | QueryState::Success | QueryState::Error)
    }
}

/// State and latest result of one client's session.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QuerySession {
    pub state: QueryState,
    pub result: serde_json::Value,
}

/// Frame sent by a client.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ClientFrame {
    pub query: String,
}

/// Frame sent to a client after every state change.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ServerFrame {
    pub state: QueryState,
    pub result: serde_json::Value,
}

impl ServerFrame {
    pub fn new(state: QueryState, result: serde_json::Value) -> Self {
        Self { state, result }
    }

    /// Terminal frames end a query.
    pub fn is_terminal(&self) -> bool {
        matches!(self.state, QueryState::Success | QueryState::Error)
    }
}

impl From<&QuerySession> for ServerFrame {
    fn from(session: &QuerySession) -> Self {
        Self::new(session.state, session.result.clone())
    }
}

pub type SessionId = u64;

/// Bookkeeping for every open session.
#[derive(Default)]
pub struct SessionRegistry {
    next_id: AtomicU64,
    sessions: Mutex<HashMap<SessionId, QuerySession>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn sessions(&self) -> MutexGuard<'_, HashMap<SessionId, QuerySession>> {
        // Critical sections never leave the map half-updated.
        self.sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Opens an idle session.
    pub fn open(&self) -> SessionId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.sessions().insert(id, QuerySession::default());
        debug!("Opened session {}", id);
        id
    }

    /// Moves an idle session to `PENDING`.
    ///
    /// Returns false, leaving the session untouched, if it is busy or closed.
    pub fn try_begin(&self, id: SessionId) -> bool {
        let mut sessions = self.sessions();
        match sessions.get_mut(&id) {
            Some(session) if session.state.is_idle() => {
                session.state = QueryState::Pending;
                session.result = serde_json::Value::Null;
                true
            }
            Some(_) => {
                debug!("Session {} busy, dropping query", id);
                false
            }
            None => false,
        }
    }

    /// Records an intermediate state. Returns false if the session is closed.
    pub fn update(&self, id: SessionId, state: QueryState, result: serde_json::Value) -> bool {
        match self.sessions().get_mut(&id) {
            Some(session) => {
                session.state = state;
                session.result = result;
                true
            }
            None => false,
        }
    }

    /// Records the end of a query as `SUCCESS` or `ERROR`.
    ///
    /// Returns the terminal session as written, or `None` if the session is
    /// closed. The session is idle from here on, so a later read may already
    /// see the next query.
    pub fn finish(
        &self,
        id: SessionId,
        outcome: Result<serde_json::Value, String>,
    ) -> Option<QuerySession> {
        let (state, result) = match outcome {
            Ok(result) => (QueryState::Success, result),
            Err(message) => (QueryState::Error, serde_json::Value::String(message)),
        };
        let mut sessions = self.sessions();
        let session = sessions.get_mut(&id)?;
        session.state = state;
        session.result = result;
        Some(session.clone())
    }

    pub fn get(&self, id: SessionId) -> Option<QuerySession> {
        self.sessions().get(&id).cloned()
    }

    /// Removes a session's bookkeeping.
    pub fn close(&self, id: SessionId) -> Option<QuerySession> {
        let removed = self.sessions().remove(&id);
        if removed.is_some() {
            debug!("Closed session {}", id);
        }
        removed
    }

    /// Number of open sessions.
    pub fn len(&self) -> usize {
        self.sessions().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
