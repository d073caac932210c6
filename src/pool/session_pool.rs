//! Session pool implementation
//!
//! Lock-free MPMC queue of idle sessions with lazy creation.

use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use crossbeam::queue::SegQueue;

use crate::error::{Result, SpanKvError};

/// Creates a new session when the idle queue is empty
pub type SessionFactory<S> = Box<dyn Fn() -> Result<S> + Send + Sync>;

/// Pool of idle sessions
///
/// The pool only grows: sessions are never pruned, so the number alive is
/// the peak concurrency seen so far. Unless `max_sessions` is set that peak
/// is unbounded, and a large burst of concurrent operations pins that many
/// sessions for the pool's lifetime.
///
/// ## Concurrency:
/// - `idle`: lock-free queue, safe for concurrent acquire/release
/// - `created`, `closed`: atomics
pub struct SessionPool<S> {
    idle: SegQueue<S>,
    factory: SessionFactory<S>,

    /// Sessions created so far (monotonic)
    created: AtomicUsize,

    max_sessions: Option<usize>,
    closed: AtomicBool,
}

impl<S> SessionPool<S> {
    /// Create an empty pool
    pub fn new(factory: SessionFactory<S>) -> Self {
        Self::with_limit(factory, None)
    }

    /// Create an empty pool that refuses to create more than `max_sessions`
    pub fn with_limit(factory: SessionFactory<S>, max_sessions: Option<usize>) -> Self {
        Self {
            idle: SegQueue::new(),
            factory,
            created: AtomicUsize::new(0),
            max_sessions,
            closed: AtomicBool::new(false),
        }
    }

    /// Take an idle session, or create one if none is idle
    ///
    /// Creation failures propagate as-is; nothing is retried here.
    pub fn acquire(&self) -> Result<SessionLease<'_, S>> {
        if self.is_closed() {
            return Err(SpanKvError::Disposed);
        }

        if let Some(session) = self.idle.pop() {
            return Ok(SessionLease::new(session, self));
        }

        self.reserve_slot()?;
        match (self.factory)() {
            Ok(session) => {
                tracing::debug!(total = self.created(), "Created pooled session");
                Ok(SessionLease::new(session, self))
            }
            Err(e) => {
                self.created.fetch_sub(1, Ordering::SeqCst);
                tracing::warn!("Session creation failed: {}", e);
                Err(e)
            }
        }
    }

    /// Idle sessions right now. Diagnostic only: stale as soon as it returns.
    pub fn count(&self) -> usize {
        self.idle.len()
    }

    /// Sessions created over the pool's lifetime
    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Close the pool and hand back every idle session
    ///
    /// Later acquires fail with `Disposed`. Sessions still leased are
    /// dropped when their lease ends instead of being queued.
    pub fn close_and_drain(&self) -> Vec<S> {
        self.closed.store(true, Ordering::Release);

        let mut drained = Vec::with_capacity(self.idle.len());
        while let Some(session) = self.idle.pop() {
            drained.push(session);
        }

        tracing::debug!(drained = drained.len(), "Session pool drained");
        drained
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    fn reserve_slot(&self) -> Result<()> {
        match self.max_sessions {
            None => {
                self.created.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
            Some(max) => self
                .created
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| (n < max).then_some(n + 1))
                .map(|_| ())
                .map_err(|_| SpanKvError::SessionLimit(max)),
        }
    }

    fn release(&self, session: S) {
        if self.is_closed() {
            drop(session);
            return;
        }

        self.idle.push(session);

        // Closed between the check and the push: nobody will drain again
        if self.is_closed() {
            while let Some(session) = self.idle.pop() {
                drop(session);
            }
        }
    }
}

/// A session checked out of a `SessionPool`
///
/// Dropping the lease returns the session, whether the operation finished,
/// failed, panicked, or its future was dropped mid-await.
pub struct SessionLease<'a, S> {
    session: Option<S>,
    pool: &'a SessionPool<S>,
}

impl<'a, S> SessionLease<'a, S> {
    fn new(session: S, pool: &'a SessionPool<S>) -> Self {
        Self {
            session: Some(session),
            pool,
        }
    }
}

impl<S> Deref for SessionLease<'_, S> {
    type Target = S;

    fn deref(&self) -> &S {
        // The slot is only emptied in `drop`
        self.session.as_ref().unwrap_or_else(|| unreachable!("lease without session"))
    }
}

impl<S> DerefMut for SessionLease<'_, S> {
    fn deref_mut(&mut self) -> &mut S {
        self.session.as_mut().unwrap_or_else(|| unreachable!("lease without session"))
    }
}

impl<S> Drop for SessionLease<'_, S> {
    fn drop(&mut self) {
        if let Some(session) = self.session.take() {
            self.pool.release(session);
        }
    }
}
