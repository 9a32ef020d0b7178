//! mc-domain-proxy/src/registry.rs
//! The live connection registry: every session actively splicing has exactly
//! one record here, queryable by username, IP, or UUID, and kickable by id.

use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use tokio::sync::oneshot;

pub type ConnectionId = u64;

struct Entry {
    record: ConnectionRecord,
    kill_tx: Mutex<Option<oneshot::Sender<()>>>,
}

/// The publicly visible attributes of a live session. Cloned out of the
/// registry so callers can inspect or close sockets without holding any lock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionRecord {
    pub id: ConnectionId,
    pub client_ip: String,
    pub domain: String,
    pub username: Option<String>,
    pub uuid: Option<String>,
    pub upstream_host: String,
    pub upstream_port: u16,
}

#[derive(Default)]
pub struct Registry {
    entries: DashMap<ConnectionId, Entry>,
    next_id: AtomicU64,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    /// Inserts a new record and returns its id. `kill_tx` is consumed by
    /// `kick` to signal the session to close its client socket.
    pub fn insert(
        &self,
        client_ip: String,
        domain: String,
        username: Option<String>,
        uuid: Option<String>,
        upstream_host: String,
        upstream_port: u16,
        kill_tx: oneshot::Sender<()>,
    ) -> ConnectionId {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let record = ConnectionRecord {
            id,
            client_ip,
            domain,
            username,
            uuid,
            upstream_host,
            upstream_port,
        };
        self.entries.insert(
            id,
            Entry {
                record,
                kill_tx: Mutex::new(Some(kill_tx)),
            },
        );
        id
    }

    /// Idempotent: removing an id already removed (e.g. by a concurrent kick)
    /// is a harmless no-op.
    pub fn remove(&self, id: ConnectionId) {
        self.entries.remove(&id);
    }

    pub fn enumerate(&self) -> Vec<ConnectionRecord> {
        self.entries
            .iter()
            .map(|entry| entry.value().record.clone())
            .collect()
    }

    pub fn by_username(&self, username: &str, upstream_port: u16) -> Vec<ConnectionRecord> {
        self.entries
            .iter()
            .filter(|entry| {
                entry.record.upstream_port == upstream_port
                    && entry.record.username.as_deref() == Some(username)
            })
            .map(|entry| entry.record.clone())
            .collect()
    }

    pub fn by_ip(&self, ip: &str, upstream_port: u16) -> Vec<ConnectionRecord> {
        self.entries
            .iter()
            .filter(|entry| {
                entry.record.upstream_port == upstream_port && entry.record.client_ip == ip
            })
            .map(|entry| entry.record.clone())
            .collect()
    }

    pub fn by_uuid(&self, uuid: &str, upstream_port: u16) -> Vec<ConnectionRecord> {
        self.entries
            .iter()
            .filter(|entry| {
                entry.record.upstream_port == upstream_port
                    && entry.record.uuid.as_deref() == Some(uuid)
            })
            .map(|entry| entry.record.clone())
            .collect()
    }

    /// Removes the record and signals the session to close its client
    /// socket. Returns `false` if no such session exists. Once this returns,
    /// no subsequent query will return `id` — actual socket teardown completes
    /// shortly after, asynchronously.
    pub fn kick(&self, id: ConnectionId) -> bool {
        match self.entries.remove(&id) {
            Some((_, entry)) => {
                if let Some(tx) = entry.kill_tx.lock().unwrap().take() {
                    let _ = tx.send(());
                }
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn insert_test_record(registry: &Registry, username: &str, ip: &str, port: u16) -> (ConnectionId, oneshot::Receiver<()>) {
        let (tx, rx) = oneshot::channel();
        let id = registry.insert(
            ip.to_string(),
            "example.com".to_string(),
            Some(username.to_string()),
            Some("00000000000000000000000000000001".to_string()),
            "10.0.0.1".to_string(),
            port,
            tx,
        );
        (id, rx)
    }

    #[test]
    fn insert_then_query_then_remove() {
        let registry = Registry::new();
        let (id, _rx) = insert_test_record(&registry, "alice", "1.2.3.4", 25565);

        assert!(registry.by_username("alice", 25565).iter().any(|r| r.id == id));
        assert!(registry.by_ip("1.2.3.4", 25565).iter().any(|r| r.id == id));

        registry.remove(id);
        assert!(!registry.by_username("alice", 25565).iter().any(|r| r.id == id));
    }

    #[test]
    fn kick_by_username_closes_only_matches() {
        let registry = Registry::new();
        let (alice1, alice1_rx) = insert_test_record(&registry, "alice", "1.1.1.1", 25565);
        let (alice2, alice2_rx) = insert_test_record(&registry, "alice", "1.1.1.2", 25565);
        let (bob, bob_rx) = insert_test_record(&registry, "bob", "1.1.1.3", 25565);

        let matches = registry.by_username("alice", 25565);
        assert_eq!(matches.len(), 2);
        let mut kicked = 0;
        for m in matches {
            if registry.kick(m.id) {
                kicked += 1;
            }
        }
        assert_eq!(kicked, 2);

        assert!(alice1_rx.try_recv().is_ok());
        assert!(alice2_rx.try_recv().is_ok());
        assert!(bob_rx.try_recv().is_err());

        assert!(registry.by_username("alice", 25565).is_empty());
        assert!(registry.by_username("bob", 25565).iter().any(|r| r.id == bob));
        assert_ne!(alice1, alice2);
    }

    #[test]
    fn kick_unknown_id_returns_false() {
        let registry = Registry::new();
        assert!(!registry.kick(9999));
    }
}
