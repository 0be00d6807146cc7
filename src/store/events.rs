//! Hot multicast streams.
//!
//! Both store streams (outdated, pending) and the manager's per-key record
//! streams are broadcasters: subscribers receive items published while they
//! are subscribed, delivered in publish order. Store streams carry no
//! history. Per-key streams replay the single most recent item to late
//! subscribers.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, Weak};

use crossbeam::channel::{Receiver, RecvError, RecvTimeoutError, Sender, TryRecvError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StreamError {
    #[error("subscriber limit reached ({max_subscribers})")]
    SubscriberLimitReached { max_subscribers: usize },
    #[error("stream lock poisoned")]
    LockPoisoned,
}

/// How much history a late subscriber receives.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Replay {
    /// Hot only; emissions before subscribe are lost.
    None,
    /// The most recently published item is delivered at subscribe time.
    LastOne,
}

#[derive(Clone)]
pub struct Broadcaster<T> {
    inner: Arc<Mutex<State<T>>>,
}

struct State<T> {
    replay: Replay,
    max_subscribers: usize,
    last: Option<T>,
    next_id: u64,
    subscribers: BTreeMap<u64, Sender<T>>,
}

impl<T: Clone> Broadcaster<T> {
    pub fn new(replay: Replay, max_subscribers: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(State {
                replay,
                max_subscribers,
                last: None,
                next_id: 1,
                subscribers: BTreeMap::new(),
            })),
        }
    }

    pub fn subscribe(&self) -> Result<Subscription<T>, StreamError> {
        let mut state = self.lock_state()?;
        if state.subscribers.len() >= state.max_subscribers {
            return Err(StreamError::SubscriberLimitReached {
                max_subscribers: state.max_subscribers,
            });
        }

        let (sender, receiver) = crossbeam::channel::unbounded();
        if state.replay == Replay::LastOne
            && let Some(last) = &state.last
        {
            // Queued ahead of any later publish; the channel preserves order.
            let _ = sender.send(last.clone());
        }

        let id = state.next_id;
        state.next_id = state.next_id.saturating_add(1);
        state.subscribers.insert(id, sender);

        Ok(Subscription {
            id,
            receiver,
            registry: Arc::downgrade(&self.inner),
        })
    }

    pub fn publish(&self, item: T) -> Result<(), StreamError> {
        let mut state = self.lock_state()?;
        if state.replay == Replay::LastOne {
            state.last = Some(item.clone());
        }

        let mut disconnected = Vec::new();
        for (id, sender) in &state.subscribers {
            if sender.send(item.clone()).is_err() {
                disconnected.push(*id);
            }
        }
        for id in disconnected {
            state.subscribers.remove(&id);
        }
        Ok(())
    }

    pub fn subscriber_count(&self) -> Result<usize, StreamError> {
        let state = self.lock_state()?;
        Ok(state.subscribers.len())
    }

    fn lock_state(&self) -> Result<std::sync::MutexGuard<'_, State<T>>, StreamError> {
        self.inner.lock().map_err(|_| StreamError::LockPoisoned)
    }
}

/// One subscriber's view of a broadcaster. Deregisters itself on drop.
#[derive(Debug)]
pub struct Subscription<T> {
    id: u64,
    receiver: Receiver<T>,
    registry: Weak<Mutex<State<T>>>,
}

impl<T> Subscription<T> {
    pub fn recv(&self) -> Result<T, RecvError> {
        self.receiver.recv()
    }

    pub fn try_recv(&self) -> Result<T, TryRecvError> {
        self.receiver.try_recv()
    }

    pub fn recv_timeout(&self, timeout: std::time::Duration) -> Result<T, RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }

    /// The raw channel end, for select loops.
    pub(crate) fn receiver(&self) -> &Receiver<T> {
        &self.receiver
    }
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade()
            && let Ok(mut state) = registry.lock()
        {
            state.subscribers.remove(&self.id);
        }
    }
}
