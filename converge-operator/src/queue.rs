//! Keyed work queue feeding the controller workers.
//!
//! A key is handed to at most one worker at a time. Adding a key that is
//! being processed marks it dirty; it is queued again when the worker calls
//! [`WorkQueue::done`].

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::Notify;
use tracing::debug;

#[derive(Default)]
struct State {
    queue: VecDeque<String>,
    queued: HashSet<String>,
    processing: HashMap<String, Arc<Notify>>,
    dirty: HashSet<String>,
    /// Latest delayed requeue per key. Older timers find a different token
    /// and drop themselves.
    delayed: HashMap<String, u64>,
    next_token: u64,
    shutting_down: bool,
}

/// A key checked out by a worker.
pub struct Lease {
    pub key: String,
    /// Notified when the key is added again while the lease is held.
    pub superseded: Arc<Notify>,
}

#[derive(Default)]
pub struct WorkQueue {
    state: Mutex<State>,
    ready: Notify,
}

impl WorkQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        // A poisoned queue still holds consistent sets; keep going.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Queue `key` now. Cancels any delayed requeue for it.
    pub fn add(&self, key: &str) {
        let mut state = self.lock();
        if state.delayed.remove(key).is_some() {
            debug!("Delayed requeue of {} superseded", key);
        }
        self.enqueue(&mut state, key);
    }

    /// Queue `key` after `delay`, replacing any earlier delayed requeue.
    pub fn add_after(self: &Arc<Self>, key: &str, delay: Duration) {
        if delay.is_zero() {
            self.add(key);
            return;
        }
        let token = {
            let mut state = self.lock();
            if state.shutting_down {
                return;
            }
            state.next_token += 1;
            let token = state.next_token;
            state.delayed.insert(key.to_string(), token);
            token
        };

        let queue = Arc::clone(self);
        let key = key.to_string();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let mut state = queue.lock();
            if state.delayed.get(&key) == Some(&token) {
                state.delayed.remove(&key);
                queue.enqueue(&mut state, &key);
            }
        });
    }

    fn enqueue(&self, state: &mut State, key: &str) {
        if state.shutting_down {
            return;
        }
        if let Some(superseded) = state.processing.get(key) {
            superseded.notify_one();
            state.dirty.insert(key.to_string());
            return;
        }
        if state.queued.insert(key.to_string()) {
            state.queue.push_back(key.to_string());
            self.ready.notify_one();
        }
    }

    /// Wait for the next key. `None` once the queue is shut down.
    pub async fn next(&self) -> Option<Lease> {
        loop {
            let ready = self.ready.notified();
            {
                let mut state = self.lock();
                if state.shutting_down {
                    return None;
                }
                if let Some(key) = state.queue.pop_front() {
                    state.queued.remove(&key);
                    let superseded = Arc::new(Notify::new());
                    state
                        .processing
                        .insert(key.clone(), Arc::clone(&superseded));
                    if !state.queue.is_empty() {
                        self.ready.notify_one();
                    }
                    return Some(Lease { key, superseded });
                }
            }
            ready.await;
        }
    }

    /// Release a lease. A key added while it was held goes back in the queue.
    pub fn done(&self, lease: &Lease) {
        let mut state = self.lock();
        state.processing.remove(&lease.key);
        if state.dirty.remove(&lease.key) {
            state.delayed.remove(&lease.key);
            self.enqueue(&mut state, &lease.key);
        }
    }

    /// Wake all waiting workers and stop handing out keys.
    pub fn shutdown(&self) {
        self.lock().shutting_down = true;
        self.ready.notify_waiters();
    }

    pub fn len(&self) -> usize {
        self.lock().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
