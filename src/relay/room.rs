//! Shared room state: active sessions and the known-user roster.
//!
//! All mutation goes through `Room` methods while the caller holds the
//! server's single room lock. Outbound delivery never happens in here; the
//! server collects senders and writes after releasing the lock.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::protocol;

/// Unique id assigned to every accepted connection.
pub type SessionId = u64;

/// An encoded frame queued for a session's writer task.
pub type OutboundFrame = Arc<[u8]>;

/// Sender side of a session's bounded outbound queue.
pub type Outbound = mpsc::Sender<OutboundFrame>;

/// A registered connection.
#[derive(Debug)]
pub struct Session {
    pub id: SessionId,
    pub username: String,
    pub peer_addr: SocketAddr,
    pub outbound: Outbound,
    /// Cancelled once the session leaves the room; stops its reader and writer.
    pub closed: CancellationToken,
}

/// Active sessions in join order plus every username ever seen.
#[derive(Debug, Default)]
pub struct Room {
    sessions: Vec<Session>,
    known_users: Vec<String>,
}

impl Room {
    /// Creates a room seeded with previously known users.
    pub fn new<I: IntoIterator<Item = String>>(known_users: I) -> Self {
        let mut room = Self::default();
        for name in known_users {
            room.remember(&name);
        }
        room
    }

    /// Registers a session and records its username.
    pub fn join(&mut self, session: Session) {
        self.remember(&session.username);
        self.sessions.push(session);
    }

    /// Adds a username to the roster; returns false if it was already known.
    pub fn remember(&mut self, username: &str) -> bool {
        if self.known_users.iter().any(|u| u == username) {
            return false;
        }
        self.known_users.push(username.to_string());
        true
    }

    /// Removes a session and cancels its token. Only the first call for a
    /// given id returns it.
    pub fn remove(&mut self, id: SessionId) -> Option<Session> {
        let index = self.sessions.iter().position(|s| s.id == id)?;
        let session = self.sessions.remove(index);
        session.closed.cancel();
        Some(session)
    }

    /// Removes every session, leaving the roster intact.
    pub fn drain(&mut self) -> Vec<Session> {
        let sessions = std::mem::take(&mut self.sessions);
        for session in &sessions {
            session.closed.cancel();
        }
        sessions
    }

    /// True while the session is in the room.
    pub fn contains(&self, id: SessionId) -> bool {
        self.sessions.iter().any(|s| s.id == id)
    }

    /// Number of active sessions.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// True when nobody is connected.
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Usernames of active sessions in join order.
    pub fn connected(&self) -> Vec<String> {
        self.sessions.iter().map(|s| s.username.clone()).collect()
    }

    /// Every username that ever joined, in first-seen order.
    pub fn known_users(&self) -> &[String] {
        &self.known_users
    }

    /// Senders of every session except `exclude`.
    pub fn recipients_except(&self, exclude: Option<SessionId>) -> Vec<(SessionId, Outbound)> {
        self.sessions
            .iter()
            .filter(|s| Some(s.id) != exclude)
            .map(|s| (s.id, s.outbound.clone()))
            .collect()
    }

    /// Senders of every session whose username equals `username`.
    pub fn recipients_named(&self, username: &str) -> Vec<(SessionId, Outbound)> {
        self.sessions
            .iter()
            .filter(|s| s.username == username)
            .map(|s| (s.id, s.outbound.clone()))
            .collect()
    }

    /// Sender of one session.
    pub fn recipient(&self, id: SessionId) -> Option<Outbound> {
        self.sessions
            .iter()
            .find(|s| s.id == id)
            .map(|s| s.outbound.clone())
    }

    /// The roster reply line.
    pub fn roster_line(&self) -> String {
        protocol::roster_line(self.sessions.iter().map(|s| &s.username), &self.known_users)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(id: SessionId, name: &str) -> (Session, mpsc::Receiver<OutboundFrame>) {
        let (tx, rx) = mpsc::channel(8);
        let session = Session {
            id,
            username: name.to_string(),
            peer_addr: SocketAddr::from(([127, 0, 0, 1], 40000 + id as u16)),
            outbound: tx,
            closed: CancellationToken::new(),
        };
        (session, rx)
    }

    #[test]
    fn test_join_records_known_users_once() {
        let mut room = Room::new(vec!["carol".to_string()]);
        let (a, _ra) = session(1, "alice");
        let (b, _rb) = session(2, "alice");
        room.join(a);
        room.join(b);

        assert_eq!(room.len(), 2);
        assert_eq!(room.connected(), vec!["alice", "alice"]);
        assert_eq!(room.known_users(), ["carol", "alice"]);
    }

    #[test]
    fn test_remove_is_idempotent() {
        let mut room = Room::default();
        let (a, _ra) = session(1, "alice");
        let closed = a.closed.clone();
        room.join(a);

        assert!(!closed.is_cancelled());
        assert!(room.remove(1).is_some());
        assert!(closed.is_cancelled());
        assert!(!room.contains(1));
        assert!(room.remove(1).is_none());
        assert!(room.is_empty());
        assert_eq!(room.known_users(), ["alice"]);
    }

    #[test]
    fn test_recipients_except_sender() {
        let mut room = Room::default();
        for (id, name) in [(1, "alice"), (2, "bob"), (3, "carol")] {
            let (s, _r) = session(id, name);
            room.join(s);
        }

        let ids: Vec<_> = room.recipients_except(Some(2)).into_iter().map(|(id, _)| id).collect();
        assert_eq!(ids, vec![1, 3]);
        assert_eq!(room.recipients_except(None).len(), 3);
    }

    #[test]
    fn test_recipients_named_matches_all_duplicates() {
        let mut room = Room::default();
        for (id, name) in [(1, "bob"), (2, "alice"), (3, "bob")] {
            let (s, _r) = session(id, name);
            room.join(s);
        }

        let ids: Vec<_> = room.recipients_named("bob").into_iter().map(|(id, _)| id).collect();
        assert_eq!(ids, vec![1, 3]);
        assert!(room.recipients_named("Bob").is_empty());
    }

    #[test]
    fn test_roster_line_and_drain() {
        let mut room = Room::new(vec!["zed".to_string()]);
        let (a, _ra) = session(1, "alice");
        let (b, _rb) = session(2, "bob");
        room.join(a);
        room.join(b);

        assert_eq!(room.roster_line(), "Connected: alice, bob | Created: zed, alice, bob");

        let drained = room.drain();
        assert_eq!(drained.len(), 2);
        assert!(drained.iter().all(|s| s.closed.is_cancelled()));
        assert_eq!(room.roster_line(), "Connected:  | Created: zed, alice, bob");
    }
}
