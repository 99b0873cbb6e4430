//! Process-wide session registry.
//!
//! One mutex guards the whole table, and the guard is held for the duration
//! of each event handler (and never across an await). That coarse discipline
//! is what makes fan-out ordering work: a store write and its broadcast
//! happen in one critical section, so subscribers observe MESSAGE_NEW in
//! store-id order.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::Notify;
use tracing::warn;

use norichat_types::events::UserRef;

/// Opaque, process-unique connection handle. Stable while the socket is open.
pub type ConnId = u64;

/// Ceiling on pending outbound payload per session. A peer that cannot keep
/// up past this point gets disconnected instead of growing the queue.
pub const MAX_QUEUED_BYTES: usize = 64 * 1024;

/// In-memory record for one live WebSocket connection.
pub struct Session {
    pub user_id: i64,
    pub username: String,
    pub authed: bool,
    pub subscribed_channels: HashSet<i64>,
    pub voice_channels: HashSet<i64>,
    queue: VecDeque<String>,
    queued_bytes: usize,
    closing: bool,
    notify: Arc<Notify>,
}

impl Session {
    fn new(notify: Arc<Notify>) -> Self {
        Self {
            user_id: 0,
            username: String::new(),
            authed: false,
            subscribed_channels: HashSet::new(),
            voice_channels: HashSet::new(),
            queue: VecDeque::new(),
            queued_bytes: 0,
            closing: false,
            notify,
        }
    }
}

/// What the writer task should do next.
#[derive(Debug, PartialEq, Eq)]
pub enum Outbound {
    /// Send this text frame.
    Payload(String),
    /// Nothing pending; park until notified.
    Idle,
    /// The session is gone or over its queue ceiling; close the socket.
    Closed,
}

/// Snapshot of a session handed back by `remove`, so presence can be
/// emitted *after* the registry no longer contains it.
pub struct RemovedSession {
    pub user_id: i64,
    pub username: String,
    pub authed: bool,
    pub voice_channels: HashSet<i64>,
}

#[derive(Clone, Default)]
pub struct Registry {
    inner: Arc<Mutex<RegistryState>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the registry for one event handler. Callers must not hold
    /// the guard across an await point.
    pub fn lock(&self) -> MutexGuard<'_, RegistryState> {
        self.inner.lock().expect("registry lock poisoned")
    }
}

#[derive(Default)]
pub struct RegistryState {
    sessions: HashMap<ConnId, Session>,
    next_conn_id: ConnId,
}

impl RegistryState {
    /// Register a new connection. Returns its handle and the notify used to
    /// wake its writer task.
    pub fn insert(&mut self) -> (ConnId, Arc<Notify>) {
        self.next_conn_id += 1;
        let conn_id = self.next_conn_id;
        let notify = Arc::new(Notify::new());
        self.sessions.insert(conn_id, Session::new(notify.clone()));
        (conn_id, notify)
    }

    /// Drop a session. The caller emits USER_OFFLINE afterwards; by then the
    /// session is no longer in the table, so it cannot receive the event.
    pub fn remove(&mut self, conn_id: ConnId) -> Option<RemovedSession> {
        let session = self.sessions.remove(&conn_id)?;
        session.notify.notify_one();
        Some(RemovedSession {
            user_id: session.user_id,
            username: session.username,
            authed: session.authed,
            voice_channels: session.voice_channels,
        })
    }

    pub fn session(&self, conn_id: ConnId) -> Option<&Session> {
        self.sessions.get(&conn_id)
    }

    pub fn session_mut(&mut self, conn_id: ConnId) -> Option<&mut Session> {
        self.sessions.get_mut(&conn_id)
    }

    /// Queue a payload on one session and wake its writer. Enqueuing to a
    /// session that is gone or already closing is a silent no-op; results of
    /// in-flight work for a dead connection are discarded here.
    pub fn enqueue(&mut self, conn_id: ConnId, payload: &str) {
        let Some(session) = self.sessions.get_mut(&conn_id) else {
            return;
        };
        if session.closing {
            return;
        }
        if session.queued_bytes + payload.len() > MAX_QUEUED_BYTES {
            warn!(
                conn_id,
                pending = session.queued_bytes,
                "outbound queue ceiling exceeded, closing session"
            );
            session.closing = true;
            session.queue.clear();
            session.queued_bytes = 0;
            session.notify.notify_one();
            return;
        }
        session.queued_bytes += payload.len();
        session.queue.push_back(payload.to_string());
        session.notify.notify_one();
    }

    /// Pop the next frame for the writer task. FIFO per session.
    pub fn pop_outbound(&mut self, conn_id: ConnId) -> Outbound {
        let Some(session) = self.sessions.get_mut(&conn_id) else {
            return Outbound::Closed;
        };
        if session.closing {
            return Outbound::Closed;
        }
        match session.queue.pop_front() {
            Some(payload) => {
                session.queued_bytes -= payload.len();
                Outbound::Payload(payload)
            }
            None => Outbound::Idle,
        }
    }

    /// Fan a payload out to every authed subscriber of a text channel.
    pub fn broadcast_text(&mut self, channel_id: i64, payload: &str) {
        let targets: Vec<ConnId> = self
            .sessions
            .iter()
            .filter(|(_, s)| s.authed && s.subscribed_channels.contains(&channel_id))
            .map(|(id, _)| *id)
            .collect();
        for conn_id in targets {
            self.enqueue(conn_id, payload);
        }
    }

    /// Fan a payload out to every authed participant of a voice channel,
    /// excluding the sender.
    pub fn broadcast_voice(&mut self, channel_id: i64, payload: &str, exclude: ConnId) {
        let targets: Vec<ConnId> = self
            .sessions
            .iter()
            .filter(|(id, s)| {
                **id != exclude && s.authed && s.voice_channels.contains(&channel_id)
            })
            .map(|(id, _)| *id)
            .collect();
        for conn_id in targets {
            self.enqueue(conn_id, payload);
        }
    }

    /// Fan a payload out to every authed session (presence traffic).
    pub fn broadcast_authed(&mut self, payload: &str, exclude: Option<ConnId>) {
        let targets: Vec<ConnId> = self
            .sessions
            .iter()
            .filter(|(id, s)| s.authed && Some(**id) != exclude)
            .map(|(id, _)| *id)
            .collect();
        for conn_id in targets {
            self.enqueue(conn_id, payload);
        }
    }

    /// Every other authed session, for the AUTH_OK `online` array.
    pub fn online_snapshot(&self, exclude: ConnId) -> Vec<UserRef> {
        let mut online: Vec<UserRef> = self
            .sessions
            .iter()
            .filter(|(id, s)| **id != exclude && s.authed)
            .map(|(_, s)| UserRef {
                user_id: s.user_id,
                username: s.username.clone(),
            })
            .collect();
        online.sort_by_key(|u| u.user_id);
        online
    }

    /// Current participants of a voice channel, excluding one connection.
    pub fn voice_participants(&self, channel_id: i64, exclude: ConnId) -> Vec<UserRef> {
        let mut participants: Vec<UserRef> = self
            .sessions
            .iter()
            .filter(|(id, s)| {
                **id != exclude && s.authed && s.voice_channels.contains(&channel_id)
            })
            .map(|(_, s)| UserRef {
                user_id: s.user_id,
                username: s.username.clone(),
            })
            .collect();
        participants.sort_by_key(|u| u.user_id);
        participants
    }
}
