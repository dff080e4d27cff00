use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::models::ConversationKey;

pub mod events;
pub mod handlers;

use events::WsOutboundEvent;

/// Identifies one live websocket connection. A user with the app open
/// on two devices holds two session ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(Uuid);

impl SessionId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

struct SessionEntry {
    user_id: Uuid,
    tx: mpsc::Sender<WsOutboundEvent>,
    joined: HashSet<ConversationKey>,
}

#[derive(Default)]
struct Inner {
    sessions: HashMap<SessionId, SessionEntry>,
    by_user: HashMap<Uuid, HashSet<SessionId>>,
    groups: HashMap<ConversationKey, HashSet<SessionId>>,
}

/// Process-local map of live sessions and conversation broadcast
/// groups. All state here dies with the process; clients recover via
/// message history on reconnect.
///
/// Outbound buffers are bounded: a session that cannot drain `buffer`
/// pending events is dropped from the registry instead of stalling
/// fan-out for everyone else. Dropping the sender closes the session's
/// receive loop, which closes the socket.
#[derive(Clone)]
pub struct SessionRegistry {
    buffer: usize,
    inner: Arc<RwLock<Inner>>,
}

impl SessionRegistry {
    pub fn new(buffer: usize) -> Self {
        Self {
            buffer,
            inner: Arc::new(RwLock::new(Inner::default())),
        }
    }

    /// Bind a new authenticated session to `user_id`. Returns the
    /// session id and the receiving half of its outbound queue.
    pub async fn register(&self, user_id: Uuid) -> (SessionId, mpsc::Receiver<WsOutboundEvent>) {
        let (tx, rx) = mpsc::channel(self.buffer);
        let session = SessionId::new();
        let mut guard = self.inner.write().await;
        guard.sessions.insert(
            session,
            SessionEntry {
                user_id,
                tx,
                joined: HashSet::new(),
            },
        );
        guard.by_user.entry(user_id).or_default().insert(session);
        (session, rx)
    }

    /// Release the session's user binding and every group membership.
    /// Terminal; the id is never reused.
    pub async fn unregister(&self, session: SessionId) {
        let mut guard = self.inner.write().await;
        remove_session(&mut guard, session);
    }

    /// Add the session to conversation `key`'s broadcast group.
    /// Idempotent; joining twice is a no-op.
    pub async fn join(&self, session: SessionId, key: &ConversationKey) {
        let mut guard = self.inner.write().await;
        let inner = &mut *guard;
        if let Some(entry) = inner.sessions.get_mut(&session) {
            entry.joined.insert(key.clone());
            inner.groups.entry(key.clone()).or_default().insert(session);
        }
    }

    /// Remove membership in `key` only; other joined groups are kept.
    pub async fn leave(&self, session: SessionId, key: &ConversationKey) {
        let mut guard = self.inner.write().await;
        if let Some(entry) = guard.sessions.get_mut(&session) {
            entry.joined.remove(key);
        }
        if let Some(members) = guard.groups.get_mut(key) {
            members.remove(&session);
            if members.is_empty() {
                guard.groups.remove(key);
            }
        }
    }

    /// Deliver `event` to every live session bound to `user_id`.
    /// Zero live sessions is a silent no-op, not an error. Returns the
    /// number of sessions the event was queued for.
    pub async fn route(&self, user_id: Uuid, event: &WsOutboundEvent) -> usize {
        let mut dead = Vec::new();
        let delivered = {
            let guard = self.inner.read().await;
            let Some(sessions) = guard.by_user.get(&user_id) else {
                return 0;
            };
            let mut delivered = 0;
            for session in sessions {
                if let Some(entry) = guard.sessions.get(session) {
                    if try_deliver(entry, *session, event) {
                        delivered += 1;
                    } else {
                        dead.push(*session);
                    }
                }
            }
            delivered
        };
        self.reap(dead).await;
        delivered
    }

    /// Deliver `event` to every session currently joined to `key`'s
    /// broadcast group, except `exclude` (the originating session).
    pub async fn broadcast(
        &self,
        key: &ConversationKey,
        event: &WsOutboundEvent,
        exclude: Option<SessionId>,
    ) -> usize {
        let mut dead = Vec::new();
        let delivered = {
            let guard = self.inner.read().await;
            let Some(members) = guard.groups.get(key) else {
                return 0;
            };
            let mut delivered = 0;
            for session in members {
                if exclude == Some(*session) {
                    continue;
                }
                if let Some(entry) = guard.sessions.get(session) {
                    if try_deliver(entry, *session, event) {
                        delivered += 1;
                    } else {
                        dead.push(*session);
                    }
                }
            }
            delivered
        };
        self.reap(dead).await;
        delivered
    }

    /// Live session count for a user. Test and introspection helper.
    pub async fn session_count(&self, user_id: Uuid) -> usize {
        let guard = self.inner.read().await;
        guard.by_user.get(&user_id).map_or(0, HashSet::len)
    }

    pub async fn is_joined(&self, session: SessionId, key: &ConversationKey) -> bool {
        let guard = self.inner.read().await;
        guard
            .groups
            .get(key)
            .is_some_and(|members| members.contains(&session))
    }

    async fn reap(&self, dead: Vec<SessionId>) {
        if dead.is_empty() {
            return;
        }
        let mut guard = self.inner.write().await;
        for session in dead {
            remove_session(&mut guard, session);
        }
    }
}

/// Queue the event without waiting. A full buffer means the peer is
/// not draining; the session is reported dead and disconnected rather
/// than allowed to backpressure the router.
fn try_deliver(entry: &SessionEntry, session: SessionId, event: &WsOutboundEvent) -> bool {
    match entry.tx.try_send(event.clone()) {
        Ok(()) => true,
        Err(TrySendError::Full(_)) => {
            tracing::warn!(
                user_id = %entry.user_id,
                session = ?session,
                "session outbound buffer full, disconnecting"
            );
            crate::metrics::DELIVERY_FAILURES.inc();
            false
        }
        Err(TrySendError::Closed(_)) => {
            crate::metrics::DELIVERY_FAILURES.inc();
            false
        }
    }
}

fn remove_session(inner: &mut Inner, session: SessionId) {
    let Some(entry) = inner.sessions.remove(&session) else {
        return;
    };
    if let Some(sessions) = inner.by_user.get_mut(&entry.user_id) {
        sessions.remove(&session);
        if sessions.is_empty() {
            inner.by_user.remove(&entry.user_id);
        }
    }
    for key in entry.joined {
        if let Some(members) = inner.groups.get_mut(&key) {
            members.remove(&session);
            if members.is_empty() {
                inner.groups.remove(&key);
            }
        }
    }
}
