//! Logical crawl sessions
//!
//! A session is allocated per URL task and keyed by a UUID so concurrent
//! tasks never collide. Sessions idle past the timeout expire on their next
//! maintenance; closed sessions are evicted.

use chrono::{DateTime, Local};
use dashmap::DashMap;
use log::{debug, info, warn};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::time::Duration;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct SessionRecord {
    pub created_at: DateTime<Local>,
    pub last_active: DateTime<Local>,
    pub closed_at: Option<DateTime<Local>>,
    pub cookies: HashMap<String, String>,
    pub auth: Map<String, Value>,
    pub state: Map<String, Value>,
    pub is_active: bool,
}

impl SessionRecord {
    fn new() -> Self {
        let now = Local::now();
        Self {
            created_at: now,
            last_active: now,
            closed_at: None,
            cookies: HashMap::new(),
            auth: Map::new(),
            state: Map::new(),
            is_active: true,
        }
    }
}

/// Partial update merged into a session by [`SessionManager::maintain_session`].
#[derive(Debug, Clone, Default)]
pub struct SessionUpdate {
    pub cookies: HashMap<String, String>,
    pub auth: Map<String, Value>,
    pub state: Map<String, Value>,
}

#[derive(Debug)]
pub struct SessionManager {
    sessions: DashMap<String, SessionRecord>,
    timeout: Duration,
}

impl SessionManager {
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self {
            sessions: DashMap::new(),
            timeout,
        }
    }

    /// Allocate a fresh session and return its id.
    pub fn create_session(&self) -> String {
        let id = Uuid::new_v4().to_string();
        self.sessions.insert(id.clone(), SessionRecord::new());
        debug!("Created session {id}");
        id
    }

    /// Merge `update` into a live session and refresh its activity stamp.
    ///
    /// Returns `false` when the session is unknown or has expired.
    pub fn maintain_session(&self, session_id: &str, update: SessionUpdate) -> bool {
        let Some(mut session) = self.sessions.get_mut(session_id) else {
            warn!("Session {session_id} not found");
            return false;
        };

        let now = Local::now();
        let idle = (now - session.last_active).to_std().unwrap_or(Duration::ZERO);
        if idle > self.timeout {
            session.is_active = false;
            info!("Session {session_id} expired after {}s idle", idle.as_secs());
            return false;
        }

        session.cookies.extend(update.cookies);
        session.auth.extend(update.auth);
        session.state.extend(update.state);
        session.last_active = now;
        true
    }

    /// Close and evict a session. Unknown ids are logged and ignored.
    pub fn close_session(&self, session_id: &str) -> Option<SessionRecord> {
        let Some((_, mut session)) = self.sessions.remove(session_id) else {
            warn!("Attempted to close unknown session {session_id}");
            return None;
        };
        session.is_active = false;
        session.closed_at = Some(Local::now());
        session.cookies.clear();
        session.auth.clear();
        debug!("Closed session {session_id}");
        Some(session)
    }

    #[must_use]
    pub fn get(&self, session_id: &str) -> Option<SessionRecord> {
        self.sessions.get(session_id).map(|s| s.value().clone())
    }

    #[must_use]
    pub fn active_count(&self) -> usize {
        self.sessions.iter().filter(|s| s.is_active).count()
    }
}
