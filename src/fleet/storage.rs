//! Session map storage.
//!
//! Pool workers insert concurrently while broadcast workers read, so the map
//! is a `DashMap` behind the [`SessionStorage`] trait.

use std::sync::Arc;

use dashmap::DashMap;

use super::session::Session;
use super::types::SessionInfo;

/// Trait for session storage operations, keyed by host label.
pub trait SessionStorage: Send + Sync {
    /// Insert a session, returning the one it replaced.
    fn insert(&self, label: String, session: Arc<Session>) -> Option<Arc<Session>>;

    fn get(&self, label: &str) -> Option<Arc<Session>>;

    fn remove(&self, label: &str) -> Option<Arc<Session>>;

    /// Every live session, for a broadcast round.
    fn snapshot(&self) -> Vec<Arc<Session>>;

    /// Session metadata sorted by label.
    fn list(&self) -> Vec<SessionInfo>;

    /// Remove and return every session.
    fn drain(&self) -> Vec<Arc<Session>>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// DashMap-based implementation of `SessionStorage`.
#[derive(Default)]
pub struct DashMapSessionStorage {
    sessions: DashMap<String, Arc<Session>>,
}

impl DashMapSessionStorage {
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
        }
    }
}

impl SessionStorage for DashMapSessionStorage {
    fn insert(&self, label: String, session: Arc<Session>) -> Option<Arc<Session>> {
        self.sessions.insert(label, session)
    }

    fn get(&self, label: &str) -> Option<Arc<Session>> {
        self.sessions.get(label).map(|entry| entry.value().clone())
    }

    fn remove(&self, label: &str) -> Option<Arc<Session>> {
        self.sessions.remove(label).map(|(_, session)| session)
    }

    fn snapshot(&self) -> Vec<Arc<Session>> {
        self.sessions
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }

    fn list(&self) -> Vec<SessionInfo> {
        let mut infos: Vec<SessionInfo> = self
            .sessions
            .iter()
            .map(|entry| entry.value().info().clone())
            .collect();
        infos.sort_by(|a, b| a.label.cmp(&b.label));
        infos
    }

    fn drain(&self) -> Vec<Arc<Session>> {
        let labels: Vec<String> = self.sessions.iter().map(|e| e.key().clone()).collect();
        labels
            .into_iter()
            .filter_map(|label| self.remove(&label))
            .collect()
    }

    fn len(&self) -> usize {
        self.sessions.len()
    }
}
