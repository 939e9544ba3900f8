//! Live session bookkeeping and broadcast fan-out.
//!
//! Every registered session owns a bounded outgoing queue. The registry keeps
//! the only [`mpsc::Sender`] for each queue, so removing a session closes its
//! queue. Enqueueing happens under the read lock and removal under the write
//! lock, which means a broadcast can never push into a queue that has already
//! been closed.

use std::{
    collections::HashMap,
    fmt,
    sync::atomic::{AtomicU64, Ordering},
};

use thiserror::Error;
use tokio::sync::{
    RwLock,
    mpsc::{self, error::TrySendError},
};
use tracing::debug;

use crate::notice;

/// Outgoing messages buffered per session before new ones are dropped.
pub const DEFAULT_QUEUE_CAPACITY: usize = 10;

/// Opaque handle for one accepted connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("connection {0} is already registered")]
    AlreadyRegistered(ConnectionId),
}

struct Session {
    username: String,
    outgoing: mpsc::Sender<String>,
}

/// What a connection task gets back from [`Registry::add`].
///
/// `outgoing` is drained by the session's send loop. It yields `None` once the
/// session has been removed and everything queued before that was delivered.
#[derive(Debug)]
pub struct SessionHandle {
    pub id: ConnectionId,
    pub username: String,
    pub outgoing: mpsc::Receiver<String>,
}

/// Outcome of one broadcast. Dropped counts recipients whose queue was full
/// or whose send loop had already stopped.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Delivery {
    pub delivered: usize,
    pub dropped: usize,
}

pub struct Registry {
    sessions: RwLock<HashMap<ConnectionId, Session>>,
    next_id: AtomicU64,
    queue_capacity: usize,
}

impl Registry {
    pub fn new() -> Self {
        Self::with_queue_capacity(DEFAULT_QUEUE_CAPACITY)
    }

    /// `mpsc` channels cannot have zero capacity, so zero is raised to one.
    pub fn with_queue_capacity(queue_capacity: usize) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            queue_capacity: queue_capacity.max(1),
        }
    }

    pub fn queue_capacity(&self) -> usize {
        self.queue_capacity
    }

    pub fn next_connection_id(&self) -> ConnectionId {
        ConnectionId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Registers a session and hands back the receiving end of its queue.
    ///
    /// When other members are present, the new queue starts with a single
    /// roster line naming them. Usernames are not required to be unique.
    pub async fn add(
        &self,
        id: ConnectionId,
        username: impl Into<String>,
    ) -> Result<SessionHandle, RegistryError> {
        let username = username.into();
        let mut sessions = self.sessions.write().await;

        if sessions.contains_key(&id) {
            return Err(RegistryError::AlreadyRegistered(id));
        }

        let (outgoing, receiver) = mpsc::channel(self.queue_capacity);

        let mut members: Vec<(ConnectionId, &str)> = sessions
            .iter()
            .map(|(member_id, session)| (*member_id, session.username.as_str()))
            .collect();
        members.sort_unstable_by_key(|(member_id, _)| *member_id);
        if let Some(roster) = notice::roster(members) {
            // A fresh queue always has room for one line.
            let _ = outgoing.try_send(roster);
        }

        sessions.insert(
            id,
            Session {
                username: username.clone(),
                outgoing,
            },
        );

        Ok(SessionHandle {
            id,
            username,
            outgoing: receiver,
        })
    }

    /// Deregisters a session, closing its queue. Returns the username if the
    /// session was present; removing an unknown id does nothing.
    pub async fn remove(&self, id: ConnectionId) -> Option<String> {
        let mut sessions = self.sessions.write().await;
        sessions.remove(&id).map(|session| session.username)
    }

    /// Offers `message` to every session except `sender` without waiting.
    ///
    /// A recipient whose queue is full misses the message. Nothing is
    /// reported back to the sender beyond the returned tally.
    pub async fn broadcast(&self, message: &str, sender: Option<ConnectionId>) -> Delivery {
        let sessions = self.sessions.read().await;
        let mut delivery = Delivery::default();

        for (id, session) in sessions.iter() {
            if Some(*id) == sender {
                continue;
            }

            match session.outgoing.try_send(message.to_string()) {
                Ok(()) => delivery.delivered += 1,
                Err(TrySendError::Full(_)) => {
                    debug!(%id, "outgoing queue full; dropping message");
                    delivery.dropped += 1;
                }
                Err(TrySendError::Closed(_)) => {
                    debug!(%id, "send loop already stopped; dropping message");
                    delivery.dropped += 1;
                }
            }
        }

        delivery
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    pub async fn contains(&self, id: ConnectionId) -> bool {
        self.sessions.read().await.contains_key(&id)
    }

    /// Usernames of live sessions, ordered by connection id.
    pub async fn usernames(&self) -> Vec<String> {
        let sessions = self.sessions.read().await;
        let mut members: Vec<(ConnectionId, String)> = sessions
            .iter()
            .map(|(id, session)| (*id, session.username.clone()))
            .collect();
        members.sort_unstable_by_key(|(id, _)| *id);
        members.into_iter().map(|(_, username)| username).collect()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}
