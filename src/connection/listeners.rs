use crate::api::InboundMessage;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc::{self, error::TryRecvError, UnboundedReceiver, UnboundedSender};

pub type ListenerId = u64;

#[derive(Debug, Default)]
struct Registry {
    next_id: ListenerId,
    senders: BTreeMap<ListenerId, UnboundedSender<Arc<InboundMessage>>>,
}

/// Fan-out of decoded frames to every registered listener
///
/// Each listener owns an unbounded channel, so a slow or stalled consumer
/// never blocks the reader. Listeners whose receiver is gone are pruned on
/// the next broadcast.
#[derive(Debug, Clone, Default)]
pub struct ListenerRegistry {
    inner: Arc<Mutex<Registry>>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self) -> Listener {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = {
            let mut registry = self.lock();
            registry.next_id += 1;
            let id = registry.next_id;
            registry.senders.insert(id, tx);
            id
        };
        tracing::debug!(listener = id, "Listener registered");

        Listener {
            id,
            rx,
            registry: self.clone(),
        }
    }

    /// Remove a listener; false if it was already gone
    pub fn unregister(&self, id: ListenerId) -> bool {
        let removed = self.lock().senders.remove(&id).is_some();
        if removed {
            tracing::debug!(listener = id, "Listener unregistered");
        }
        removed
    }

    /// Deliver to every live listener in registration order; returns deliveries
    pub fn broadcast(&self, message: Arc<InboundMessage>) -> usize {
        let mut registry = self.lock();
        let mut dead = Vec::new();
        let mut delivered = 0;

        for (&id, sender) in registry.senders.iter() {
            if sender.send(Arc::clone(&message)).is_ok() {
                delivered += 1;
            } else {
                dead.push(id);
            }
        }
        for id in dead {
            registry.senders.remove(&id);
            tracing::debug!(listener = id, "Pruned closed listener");
        }

        delivered
    }

    pub fn len(&self) -> usize {
        self.lock().senders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, Registry> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Receiving end of one registration; unregisters itself when dropped
#[derive(Debug)]
pub struct Listener {
    id: ListenerId,
    rx: UnboundedReceiver<Arc<InboundMessage>>,
    registry: ListenerRegistry,
}

impl Listener {
    pub fn id(&self) -> ListenerId {
        self.id
    }

    pub async fn recv(&mut self) -> Option<Arc<InboundMessage>> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<Arc<InboundMessage>> {
        match self.rx.try_recv() {
            Ok(message) => Some(message),
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
        }
    }

    /// Stop receiving; safe to call more than once
    pub fn unregister(&self) -> bool {
        self.registry.unregister(self.id)
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        self.registry.unregister(self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_broadcast_reaches_all_in_order() {
        let registry = ListenerRegistry::new();
        let mut a = registry.register();
        let mut b = registry.register();

        registry.broadcast(Arc::new(InboundMessage::Connected));
        registry.broadcast(Arc::new(InboundMessage::Pong));

        for listener in [&mut a, &mut b] {
            assert_eq!(*tokio_test::block_on(listener.recv()).unwrap(), InboundMessage::Connected);
            assert_eq!(*tokio_test::block_on(listener.recv()).unwrap(), InboundMessage::Pong);
        }
    }

    #[test]
    fn test_unregister_is_idempotent() {
        let registry = ListenerRegistry::new();
        let listener = registry.register();
        assert_eq!(registry.len(), 1);

        assert!(listener.unregister());
        assert!(!listener.unregister());
        assert!(!registry.unregister(listener.id()));
        assert!(registry.is_empty());

        // dropping after manual unregister is harmless
        drop(listener);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_dropped_listener_does_not_block_others() {
        let registry = ListenerRegistry::new();
        let gone = registry.register();
        let mut alive = registry.register();
        let gone_id = gone.id();

        // simulate a consumer that vanished without unregistering
        std::mem::forget(gone);

        let delivered = registry.broadcast(Arc::new(InboundMessage::Pong));
        assert_eq!(delivered, 2);
        assert_eq!(alive.try_recv().as_deref(), Some(&InboundMessage::Pong));
        assert!(registry.unregister(gone_id));
    }

    #[test]
    fn test_closed_receiver_is_pruned() {
        let registry = ListenerRegistry::new();
        let mut alive = registry.register();
        let mut closing = registry.register();
        closing.rx.close();

        assert_eq!(registry.broadcast(Arc::new(InboundMessage::Connected)), 1);
        assert_eq!(registry.len(), 1);
        assert!(alive.try_recv().is_some());
        assert!(!closing.unregister());
    }

    #[test]
    fn test_unregister_from_within_handling() {
        let registry = ListenerRegistry::new();
        let mut listener = registry.register();
        registry.broadcast(Arc::new(InboundMessage::Disconnected));

        while let Some(message) = listener.try_recv() {
            if *message == InboundMessage::Disconnected {
                listener.unregister();
            }
        }
        assert_eq!(registry.broadcast(Arc::new(InboundMessage::Pong)), 0);
    }
}
