use crate::error::EventError;
use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

struct Inner<T> {
    items: VecDeque<T>,
    waiting: usize,
    cancelled: Option<String>,
}

/// FIFO with optional sorted insertion, a bounded capacity, and
/// timeout-based blocking removal (§4.11).
pub struct BlockingQueue<T: Ord> {
    inner: Mutex<Inner<T>>,
    cond: Condvar,
    max_len: usize,
    sorted: bool,
}

impl<T: Ord> BlockingQueue<T> {
    pub fn new(max_len: usize, sorted: bool) -> Self {
        Self {
            inner: Mutex::new(Inner {
                items: VecDeque::new(),
                waiting: 0,
                cancelled: None,
            }),
            cond: Condvar::new(),
            max_len,
            sorted,
        }
    }

    /// Hands `x` directly to a parked consumer if one is waiting; otherwise
    /// enqueues, failing [`EventError::QueueFull`] once `maxQueueLength` is
    /// reached (§4.11 `add`).
    pub fn add(&self, x: T) -> Result<(), EventError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.waiting == 0 && inner.items.len() >= self.max_len {
            return Err(EventError::QueueFull);
        }
        if self.sorted {
            let pos = inner.items.partition_point(|existing| existing <= &x);
            inner.items.insert(pos, x);
        } else {
            inner.items.push_back(x);
        }
        self.cond.notify_one();
        Ok(())
    }

    /// Suspends the caller until an element is available, the timeout
    /// elapses, or the queue is cancelled (§4.11 `remove`).
    pub fn remove(&self, timeout: Duration) -> Result<T, EventError> {
        let deadline = Instant::now() + timeout;
        let mut inner = self.inner.lock().unwrap();
        loop {
            if let Some(reason) = inner.cancelled.clone() {
                return Err(EventError::ConnectionClosed(reason));
            }
            if let Some(item) = inner.items.pop_front() {
                return Ok(item);
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(EventError::Timeout);
            }
            inner.waiting += 1;
            let (guard, timeout_result) = self.cond.wait_timeout(inner, deadline - now).unwrap();
            inner = guard;
            inner.waiting -= 1;
            if timeout_result.timed_out() && inner.items.is_empty() && inner.cancelled.is_none() {
                return Err(EventError::Timeout);
            }
        }
    }

    /// Rejects all current and future waiters with `reason` until the
    /// queue is reconstructed (§4.11 `cancelPendingPromises`).
    pub fn cancel_pending_promises(&self, reason: impl Into<String>) {
        let mut inner = self.inner.lock().unwrap();
        inner.cancelled = Some(reason.into());
        self.cond.notify_all();
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
