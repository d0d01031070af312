use parking_lot::Mutex;
use std::collections::HashMap;
use std::net::SocketAddr;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// A connection currently being served.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionInfo {
    pub id: Uuid,
    pub client_addr: SocketAddr,
}

struct ConnectionHandle {
    client_addr: SocketAddr,
    token: CancellationToken,
}

/// Tracks live client connections so they can be force-closed.
///
/// The lock is only held for the map operation itself.
#[derive(Default)]
pub struct Registry {
    connections: Mutex<HashMap<Uuid, ConnectionHandle>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a connection. Cancelling the token closes it.
    pub fn register(&self, id: Uuid, client_addr: SocketAddr, token: CancellationToken) {
        self.connections
            .lock()
            .insert(id, ConnectionHandle { client_addr, token });
    }

    /// Stop tracking a connection, returning if it was tracked.
    pub fn deregister(&self, id: Uuid) -> bool {
        self.connections.lock().remove(&id).is_some()
    }

    /// Force-close a single connection.
    pub fn close(&self, id: Uuid) -> bool {
        match self.connections.lock().get(&id) {
            Some(handle) => {
                handle.token.cancel();
                true
            }
            None => false,
        }
    }

    /// Force-close every tracked connection, returning how many were closed.
    ///
    /// Connections deregister themselves once their worker exits.
    pub fn close_all(&self) -> usize {
        let conns = self.connections.lock();
        for handle in conns.values() {
            handle.token.cancel();
        }
        conns.len()
    }

    pub fn connections(&self) -> Vec<ConnectionInfo> {
        self.connections
            .lock()
            .iter()
            .map(|(id, handle)| ConnectionInfo {
                id: *id,
                client_addr: handle.client_addr,
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.connections.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr() -> SocketAddr {
        "127.0.0.1:5432".parse().unwrap()
    }

    #[test]
    fn register_and_close() {
        let registry = Registry::new();
        let a = (Uuid::new_v4(), CancellationToken::new());
        let b = (Uuid::new_v4(), CancellationToken::new());
        registry.register(a.0, addr(), a.1.clone());
        registry.register(b.0, addr(), b.1.clone());
        assert_eq!(2, registry.len());

        assert!(registry.close(a.0));
        assert!(a.1.is_cancelled());
        assert!(!b.1.is_cancelled());
        // Closing doesn't deregister, the worker does that.
        assert_eq!(2, registry.len());

        assert!(registry.deregister(a.0));
        assert!(!registry.deregister(a.0));
        assert!(!registry.close(a.0));

        assert_eq!(1, registry.close_all());
        assert!(b.1.is_cancelled());
    }

    #[test]
    fn snapshot() {
        let registry = Registry::new();
        assert!(registry.is_empty());

        let id = Uuid::new_v4();
        registry.register(id, addr(), CancellationToken::new());
        assert_eq!(
            vec![ConnectionInfo {
                id,
                client_addr: addr()
            }],
            registry.connections()
        );
    }
}
