//! Fan-out notification channels with explicit subscribe/unsubscribe

use crossbeam::channel::{unbounded, Receiver, Sender};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

pub struct Subscription<T> {
    pub id: u64,
    pub receiver: Receiver<T>,
}

pub struct Broadcast<T> {
    subscribers: Mutex<Vec<(u64, Sender<T>)>>,
    next_id: AtomicU64,
}

impl<T: Clone> Broadcast<T> {
    pub fn new() -> Self {
        Self {
            subscribers: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<(u64, Sender<T>)>> {
        // the list stays consistent even if a holder panicked
        match self.subscribers.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn subscribe(&self) -> Subscription<T> {
        let (tx, rx) = unbounded();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.lock().push((id, tx));
        Subscription { id, receiver: rx }
    }

    pub fn unsubscribe(&self, id: u64) -> bool {
        let mut subscribers = self.lock();
        let before = subscribers.len();
        subscribers.retain(|(sid, _)| *sid != id);
        subscribers.len() != before
    }

    /// Deliver to every live subscriber; dropped receivers are pruned
    pub fn publish(&self, value: &T) -> usize {
        let mut subscribers = self.lock();
        subscribers.retain(|(_, tx)| tx.send(value.clone()).is_ok());
        subscribers.len()
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock().len()
    }
}

impl<T: Clone> Default for Broadcast<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publish_reaches_all_subscribers() {
        let channel: Broadcast<u32> = Broadcast::new();
        let a = channel.subscribe();
        let b = channel.subscribe();
        assert_eq!(channel.publish(&7), 2);
        assert_eq!(a.receiver.try_recv().unwrap(), 7);
        assert_eq!(b.receiver.try_recv().unwrap(), 7);
    }

    #[test]
    fn test_unsubscribe_and_prune() {
        let channel: Broadcast<u32> = Broadcast::new();
        let a = channel.subscribe();
        let b = channel.subscribe();
        assert!(channel.unsubscribe(a.id));
        assert!(!channel.unsubscribe(a.id));
        drop(b);
        assert_eq!(channel.publish(&1), 0);
        assert_eq!(channel.subscriber_count(), 0);
        assert!(a.receiver.try_recv().is_err());
    }
}
