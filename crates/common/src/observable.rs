//! Single-slot "latest value" broadcast for thread-based consumers.
//!
//! A subscriber first receives the value current at subscription time,
//! then every later update in order. Nothing is buffered for values set
//! before a subscriber existed.

use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Mutex, MutexGuard, PoisonError};

pub struct Observable<T> {
    inner: Mutex<Inner<T>>,
}

struct Inner<T> {
    value: T,
    subscribers: Vec<Sender<T>>,
}

impl<T: Clone> Observable<T> {
    pub fn new(value: T) -> Self {
        Self {
            inner: Mutex::new(Inner {
                value,
                subscribers: Vec::new(),
            }),
        }
    }

    pub fn get(&self) -> T {
        self.lock().value.clone()
    }

    /// Replaces the value and notifies every live subscriber, even when
    /// the new value equals the old one.
    pub fn set(&self, value: T) {
        let mut inner = self.lock();
        inner.value = value.clone();
        inner.subscribers.retain(|tx| tx.send(value.clone()).is_ok());
    }

    pub fn subscribe(&self) -> Receiver<T> {
        let (tx, rx) = mpsc::channel();
        let mut inner = self.lock();
        // cannot fail: rx is still alive
        let _ = tx.send(inner.value.clone());
        inner.subscribers.push(tx);
        rx
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock().subscribers.len()
    }

    fn lock(&self) -> MutexGuard<'_, Inner<T>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_subscriber_sees_current_value() {
        let obs = Observable::new(false);
        obs.set(true);
        let rx = obs.subscribe();
        assert_eq!(rx.try_recv(), Ok(true));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn updates_arrive_in_order() {
        let obs = Observable::new(0u32);
        let a = obs.subscribe();
        let b = obs.subscribe();
        obs.set(1);
        obs.set(2);
        obs.set(2);

        assert_eq!(a.try_iter().collect::<Vec<_>>(), vec![0, 1, 2, 2]);
        assert_eq!(b.try_iter().collect::<Vec<_>>(), vec![0, 1, 2, 2]);
        assert_eq!(obs.get(), 2);
    }

    #[test]
    fn dropped_subscribers_are_pruned() {
        let obs = Observable::new('x');
        let rx = obs.subscribe();
        let _keep = obs.subscribe();
        drop(rx);
        obs.set('y');
        assert_eq!(obs.subscriber_count(), 1);
    }
}
