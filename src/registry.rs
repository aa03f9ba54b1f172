use std::collections::HashMap;
use std::sync::Mutex;

use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::error::{CoreError, CoreResult};

/// Maps connected client ids to the sender half of their socket writer.
/// Registering a duplicate id replaces the previous connection.
#[derive(Default)]
pub struct ConnectionRegistry {
    connections: Mutex<HashMap<String, mpsc::UnboundedSender<String>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, client_id: &str, tx: mpsc::UnboundedSender<String>) -> CoreResult<()> {
        let mut connections = self.lock()?;
        if connections.insert(client_id.to_string(), tx).is_some() {
            debug!(client_id, "replaced existing connection");
        }
        Ok(())
    }

    /// Removes the registration only when `tx` is the sender currently
    /// registered for this client, so a superseded session's teardown
    /// cannot evict its successor. Returns whether a removal happened.
    pub fn disconnect(
        &self,
        client_id: &str,
        tx: &mpsc::UnboundedSender<String>,
    ) -> CoreResult<bool> {
        let mut connections = self.lock()?;
        match connections.get(client_id) {
            Some(current) if current.same_channel(tx) => {
                connections.remove(client_id);
                Ok(true)
            }
            Some(_) => {
                debug!(client_id, "disconnect from superseded session ignored");
                Ok(false)
            }
            None => Ok(false),
        }
    }

    pub fn is_connected(&self, client_id: &str) -> CoreResult<bool> {
        Ok(self.lock()?.contains_key(client_id))
    }

    /// Delivers a payload to a connected client. Returns false when the
    /// client is unknown; a dead channel drops the registration.
    pub fn send(&self, client_id: &str, payload: String) -> CoreResult<bool> {
        let mut connections = self.lock()?;
        match connections.get(client_id) {
            Some(tx) => {
                if tx.send(payload).is_err() {
                    warn!(client_id, "connection channel closed, dropping registration");
                    connections.remove(client_id);
                    return Ok(false);
                }
                Ok(true)
            }
            None => {
                debug!(client_id, "send to unregistered client skipped");
                Ok(false)
            }
        }
    }

    fn lock(
        &self,
    ) -> CoreResult<std::sync::MutexGuard<'_, HashMap<String, mpsc::UnboundedSender<String>>>>
    {
        self.connections
            .lock()
            .map_err(|_| CoreError::Internal("connection registry lock poisoned".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn send_reaches_registered_client() {
        let registry = ConnectionRegistry::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        registry.register("a", tx).unwrap();
        assert!(registry.send("a", "hello".into()).unwrap());
        assert_eq!(rx.try_recv().unwrap(), "hello");
    }

    #[test]
    fn send_to_unknown_client_is_false() {
        let registry = ConnectionRegistry::new();
        assert!(!registry.send("ghost", "hello".into()).unwrap());
    }

    #[test]
    fn dead_channel_is_evicted() {
        let registry = ConnectionRegistry::new();
        let (tx, rx) = mpsc::unbounded_channel();
        registry.register("a", tx).unwrap();
        drop(rx);
        assert!(!registry.send("a", "hello".into()).unwrap());
        assert!(!registry.is_connected("a").unwrap());
    }

    #[test]
    fn reregistration_replaces_sender() {
        let registry = ConnectionRegistry::new();
        let (tx1, mut rx1) = mpsc::unbounded_channel();
        let (tx2, mut rx2) = mpsc::unbounded_channel();
        registry.register("a", tx1).unwrap();
        registry.register("a", tx2).unwrap();
        assert!(registry.send("a", "x".into()).unwrap());
        assert!(rx1.try_recv().is_err());
        assert_eq!(rx2.try_recv().unwrap(), "x");
    }

    #[test]
    fn disconnect_from_superseded_sender_is_ignored() {
        let registry = ConnectionRegistry::new();
        let (tx1, _rx1) = mpsc::unbounded_channel();
        let (tx2, mut rx2) = mpsc::unbounded_channel();
        registry.register("a", tx1.clone()).unwrap();
        registry.register("a", tx2.clone()).unwrap();

        // The replaced session's teardown must not evict the new one.
        assert!(!registry.disconnect("a", &tx1).unwrap());
        assert!(registry.is_connected("a").unwrap());
        assert!(registry.send("a", "still here".into()).unwrap());
        assert_eq!(rx2.try_recv().unwrap(), "still here");

        assert!(registry.disconnect("a", &tx2).unwrap());
        assert!(!registry.is_connected("a").unwrap());
    }
}
