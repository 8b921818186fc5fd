// src/models/session.rs

//! Transient per-subscriber delivery session state.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use chrono::{DateTime, Utc};

use crate::models::Posting;

/// One subscriber's in-flight delivery run.
///
/// Sessions are rebuildable caches: everything here can be reconstructed
/// from the durable stores, so losing the session map on restart is safe.
#[derive(Debug, Clone)]
pub struct Session {
    /// Owning subscriber
    pub subscriber_id: u64,

    /// Telegram chat id messages are sent to
    pub channel_address: String,

    /// Whether the run is still delivering
    pub is_active: bool,

    /// Undelivered postings, in discovery order
    pub pending: VecDeque<Posting>,

    /// Search filter snapshot taken when the run started
    pub search_filter: String,

    /// When the run started
    pub started_at: DateTime<Utc>,
}

impl Session {
    /// Start a new active session with the given queue.
    pub fn new(
        subscriber_id: u64,
        channel_address: impl Into<String>,
        search_filter: impl Into<String>,
        pending: VecDeque<Posting>,
    ) -> Self {
        Self {
            subscriber_id,
            channel_address: channel_address.into(),
            is_active: true,
            pending,
            search_filter: search_filter.into(),
            started_at: Utc::now(),
        }
    }
}

/// Session map owned by the dispatcher.
///
/// At most one session exists per subscriber. The trait is injectable so
/// tests can observe session state deterministically.
pub trait SessionStore: Send + Sync {
    /// Fetch a snapshot of a subscriber's session.
    fn get(&self, subscriber_id: u64) -> Option<Session>;

    /// Insert or replace a subscriber's session.
    fn put(&self, session: Session);

    /// Remove and return a subscriber's session.
    fn remove(&self, subscriber_id: u64) -> Option<Session>;

    /// Drain every session from the map.
    fn clear(&self) -> Vec<Session>;

    /// Number of currently active sessions.
    fn active_count(&self) -> usize;
}

/// In-memory session map.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    sessions: Mutex<HashMap<u64, Session>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for MemorySessionStore {
    fn get(&self, subscriber_id: u64) -> Option<Session> {
        self.sessions.lock().unwrap().get(&subscriber_id).cloned()
    }

    fn put(&self, session: Session) {
        self.sessions
            .lock()
            .unwrap()
            .insert(session.subscriber_id, session);
    }

    fn remove(&self, subscriber_id: u64) -> Option<Session> {
        self.sessions.lock().unwrap().remove(&subscriber_id)
    }

    fn clear(&self) -> Vec<Session> {
        self.sessions.lock().unwrap().drain().map(|(_, s)| s).collect()
    }

    fn active_count(&self) -> usize {
        self.sessions
            .lock()
            .unwrap()
            .values()
            .filter(|s| s.is_active)
            .count()
    }
}
