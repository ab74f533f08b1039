//! Who is online.
//!
//! The registry is the only shared state on the server. Every handler task
//! gets a clone of the same [`Registry`]; clones share the underlying maps.
//! No map guard is ever held across an `.await` or while writing to a socket:
//! readers copy what they need out and release the shard lock first.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use thiserror::Error;

use crate::session::{Outbound, Session, SessionId};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("username {0} is already taken")]
    Duplicate(String),
    #[error("session already logged in as {0}")]
    AlreadyAuthenticated(String),
    #[error("no such session {0}")]
    UnknownSession(SessionId),
}

#[derive(Clone, Default)]
pub struct Registry {
    sessions: Arc<DashMap<SessionId, Session>>,
    names: Arc<DashMap<String, SessionId>>,
    next_id: Arc<AtomicU64>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, peer: SocketAddr, outbound: Outbound) -> SessionId {
        let id = SessionId(self.next_id.fetch_add(1, Ordering::Relaxed) + 1);

        self.sessions.insert(
            id,
            Session {
                id,
                peer,
                outbound,
                username: None,
            },
        );

        id
    }

    /// Bind `username` to the session if no live session holds it.
    ///
    /// The name index entry is claimed first, so two sessions racing for the
    /// same name cannot both succeed.
    pub fn authenticate(&self, id: SessionId, username: &str) -> Result<(), AuthError> {
        match self.sessions.get(&id) {
            None => return Err(AuthError::UnknownSession(id)),
            Some(session) => {
                if let Some(name) = &session.username {
                    return Err(AuthError::AlreadyAuthenticated(name.clone()));
                }
            }
        }

        match self.names.entry(username.to_string()) {
            Entry::Occupied(_) => return Err(AuthError::Duplicate(username.to_string())),
            Entry::Vacant(slot) => {
                slot.insert(id);
            }
        }

        match self.sessions.get_mut(&id) {
            Some(mut session) => {
                session.username = Some(username.to_string());
                Ok(())
            }
            None => {
                // Removed between the two steps; give the name back.
                self.names.remove_if(username, |_, owner| *owner == id);
                Err(AuthError::UnknownSession(id))
            }
        }
    }

    /// Remove the session, returning its last state.
    ///
    /// Only the first call for an id returns `Some`, which is what keeps the
    /// leave notice to exactly one per session.
    pub fn remove(&self, id: SessionId) -> Option<Session> {
        let (_, session) = self.sessions.remove(&id)?;

        if let Some(name) = &session.username {
            self.names.remove_if(name, |_, owner| *owner == id);
        }

        Some(session)
    }

    /// Authenticated usernames, sorted.
    pub fn snapshot(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .sessions
            .iter()
            .filter_map(|entry| entry.value().username.clone())
            .collect();

        names.sort();
        names
    }

    /// Every authenticated session except `exclude`, copied out.
    pub fn recipients(&self, exclude: SessionId) -> Vec<(SessionId, Outbound)> {
        self.sessions
            .iter()
            .filter(|entry| *entry.key() != exclude && entry.value().is_authenticated())
            .map(|entry| (*entry.key(), entry.value().outbound.clone()))
            .collect()
    }

    /// Registered sessions, logged in or not.
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }
}
