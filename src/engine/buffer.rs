//! Pooled result buffers
//!
//! Byte-valued reads hand their result back in a `PooledBuffer` rented from
//! the engine's `BufferPool`. The buffer is a scoped resource: dropping it
//! returns the allocation to the pool, so callers release it simply by
//! letting it go out of scope once the bytes are decoded.

use std::ops::Deref;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use crossbeam::queue::SegQueue;

/// Default number of idle allocations kept for reuse
const DEFAULT_MAX_IDLE: usize = 1024;

/// Shared pool of byte allocations for read results
///
/// ## Concurrency:
/// - `free`: lock-free MPMC queue
/// - counters: atomics
pub struct BufferPool {
    /// Idle allocations ready for reuse
    free: SegQueue<Vec<u8>>,

    /// Idle allocations beyond this count are freed instead of pooled
    max_idle: usize,

    /// Buffers currently rented out
    outstanding: AtomicUsize,

    /// Total rentals since creation
    rentals: AtomicU64,
}

impl BufferPool {
    pub fn new() -> Self {
        Self::with_max_idle(DEFAULT_MAX_IDLE)
    }

    pub fn with_max_idle(max_idle: usize) -> Self {
        Self {
            free: SegQueue::new(),
            max_idle,
            outstanding: AtomicUsize::new(0),
            rentals: AtomicU64::new(0),
        }
    }

    /// Rent a buffer holding a copy of `bytes`
    pub fn rent_copy(self: &Arc<Self>, bytes: &[u8]) -> PooledBuffer {
        let mut buf = self.free.pop().unwrap_or_default();
        buf.clear();
        buf.extend_from_slice(bytes);

        self.outstanding.fetch_add(1, Ordering::SeqCst);
        self.rentals.fetch_add(1, Ordering::Relaxed);

        PooledBuffer {
            buf,
            pool: Arc::clone(self),
        }
    }

    /// Buffers rented and not yet released
    pub fn outstanding(&self) -> usize {
        self.outstanding.load(Ordering::SeqCst)
    }

    /// Idle allocations waiting for reuse
    pub fn idle(&self) -> usize {
        self.free.len()
    }

    /// Total rentals since creation
    pub fn rentals(&self) -> u64 {
        self.rentals.load(Ordering::Relaxed)
    }

    fn give_back(&self, buf: Vec<u8>) {
        if self.free.len() < self.max_idle {
            self.free.push(buf);
        }
        self.outstanding.fetch_sub(1, Ordering::SeqCst);
    }
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::new()
    }
}

/// Engine-owned result buffer, returned to its pool on drop
pub struct PooledBuffer {
    buf: Vec<u8>,
    pool: Arc<BufferPool>,
}

impl PooledBuffer {
    /// Release the buffer now (same as dropping it)
    pub fn release(self) {}
}

impl Deref for PooledBuffer {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.buf
    }
}

impl AsRef<[u8]> for PooledBuffer {
    fn as_ref(&self) -> &[u8] {
        &self.buf
    }
}

impl std::fmt::Debug for PooledBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledBuffer").field("len", &self.buf.len()).finish()
    }
}

impl Drop for PooledBuffer {
    fn drop(&mut self) {
        self.pool.give_back(std::mem::take(&mut self.buf));
    }
}
