//! Recycling pools for body buffers and scratch space.
//!
//! Message bodies are read and written at high rates on long-lived connections.
//! Allocating a fresh buffer for every message would dominate the cost of small
//! bodies, so buffers are handed out from a [`Pool`] and returned when the
//! message is reset.
//!
//! # Components
//!
//! - [`Pool`]: a thread-safe free list over any [`Recycle`] value, with an
//!   optional size limit above which released values are discarded
//! - [`BodyBuf`]: the growable byte buffer that backs a materialized body
//! - [`BufferPool`]: the pool of `BodyBuf`s used by messages
//! - [`scratch`]: fixed-size copy buffers used by stream copies
//!
//! Two process-wide body pools exist, one for requests and one for responses,
//! so that the size classes of the two directions do not mix. Messages hold an
//! `Arc` to their pool, which keeps tests and embedders free to inject their own.

mod buffer;
pub mod scratch;

pub use buffer::BodyBuf;

use once_cell::sync::Lazy;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::trace;

/// A value that can be reset and reused from a [`Pool`].
pub trait Recycle: Default {
    /// Clears the value so the next borrower sees a fresh instance.
    fn recycle(&mut self);

    /// The amount of memory retained by the value, compared against the pool limit.
    fn retained_size(&self) -> usize {
        0
    }
}

impl Recycle for BodyBuf {
    fn recycle(&mut self) {
        self.clear();
    }

    fn retained_size(&self) -> usize {
        self.capacity()
    }
}

impl<T: Recycle> Recycle for Box<T> {
    fn recycle(&mut self) {
        (**self).recycle();
    }

    fn retained_size(&self) -> usize {
        (**self).retained_size()
    }
}

const NO_LIMIT: usize = usize::MAX;
const DEFAULT_MAX_IDLE: usize = 1024;

/// A snapshot of pool activity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Values created because the free list was empty.
    pub allocated: u64,
    /// Values handed out from the free list.
    pub reused: u64,
    /// Values returned to the free list.
    pub recycled: u64,
    /// Values dropped on release, because they exceeded the limit or the free list was full.
    pub discarded: u64,
    /// Values currently waiting in the free list.
    pub idle: usize,
}

#[derive(Debug, Default)]
struct Counters {
    allocated: AtomicU64,
    reused: AtomicU64,
    recycled: AtomicU64,
    discarded: AtomicU64,
}

/// A thread-safe free list of reusable values.
#[derive(Debug)]
pub struct Pool<T> {
    name: &'static str,
    free: Mutex<Vec<T>>,
    limit: AtomicUsize,
    max_idle: usize,
    counters: Counters,
}

/// The pool that backs materialized message bodies.
pub type BufferPool = Pool<BodyBuf>;

impl<T: Recycle> Pool<T> {
    pub fn new(name: &'static str) -> Self {
        Self::with_max_idle(name, DEFAULT_MAX_IDLE)
    }

    /// Creates a pool that keeps at most `max_idle` values in its free list.
    pub fn with_max_idle(name: &'static str, max_idle: usize) -> Self {
        Self {
            name,
            free: Mutex::new(Vec::new()),
            limit: AtomicUsize::new(NO_LIMIT),
            max_idle,
            counters: Counters::default(),
        }
    }

    /// Creates a pool that discards released values retaining more than `limit`.
    pub fn with_limit(name: &'static str, limit: usize) -> Self {
        let pool = Self::new(name);
        pool.set_limit(Some(limit));
        pool
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Takes a value from the free list, or creates a fresh one.
    pub fn acquire(&self) -> T {
        let recycled = self.free.lock().unwrap_or_else(PoisonError::into_inner).pop();
        match recycled {
            Some(value) => {
                self.counters.reused.fetch_add(1, Ordering::Relaxed);
                value
            }
            None => {
                self.counters.allocated.fetch_add(1, Ordering::Relaxed);
                T::default()
            }
        }
    }

    /// Returns a value to the pool.
    ///
    /// Values retaining more than the configured limit are dropped instead, so a
    /// single oversized body does not pin its allocation for the process lifetime.
    pub fn release(&self, mut value: T) {
        let size = value.retained_size();
        let limit = self.limit.load(Ordering::Relaxed);
        if size > limit {
            trace!(pool = self.name, size, limit, "discard oversized value");
            self.counters.discarded.fetch_add(1, Ordering::Relaxed);
            return;
        }

        value.recycle();
        let mut free = self.free.lock().unwrap_or_else(PoisonError::into_inner);
        if free.len() >= self.max_idle {
            drop(free);
            self.counters.discarded.fetch_add(1, Ordering::Relaxed);
            return;
        }
        free.push(value);
        self.counters.recycled.fetch_add(1, Ordering::Relaxed);
    }

    /// Sets the retained size above which released values are discarded.
    ///
    /// `None` removes the limit.
    pub fn set_limit(&self, limit: Option<usize>) {
        self.limit.store(limit.unwrap_or(NO_LIMIT), Ordering::Relaxed);
    }

    pub fn limit(&self) -> Option<usize> {
        match self.limit.load(Ordering::Relaxed) {
            NO_LIMIT => None,
            limit => Some(limit),
        }
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            allocated: self.counters.allocated.load(Ordering::Relaxed),
            reused: self.counters.reused.load(Ordering::Relaxed),
            recycled: self.counters.recycled.load(Ordering::Relaxed),
            discarded: self.counters.discarded.load(Ordering::Relaxed),
            idle: self.free.lock().unwrap_or_else(PoisonError::into_inner).len(),
        }
    }
}

static REQUEST_BODY_POOL: Lazy<Arc<BufferPool>> = Lazy::new(|| Arc::new(BufferPool::new("request-body")));
static RESPONSE_BODY_POOL: Lazy<Arc<BufferPool>> = Lazy::new(|| Arc::new(BufferPool::new("response-body")));

/// The process-wide pool used by requests unless another pool is injected.
pub fn request_body_pool() -> Arc<BufferPool> {
    Arc::clone(&REQUEST_BODY_POOL)
}

/// The process-wide pool used by responses unless another pool is injected.
pub fn response_body_pool() -> Arc<BufferPool> {
    Arc::clone(&RESPONSE_BODY_POOL)
}

/// Configures the capacity above which released body buffers are not pooled.
///
/// Applies to the process-wide request and response pools. `None` means no limit.
pub fn set_body_size_pool_limit(request_limit: Option<usize>, response_limit: Option<usize>) {
    REQUEST_BODY_POOL.set_limit(request_limit);
    RESPONSE_BODY_POOL.set_limit(response_limit);
}
