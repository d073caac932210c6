//! Store lifecycle
//!
//! Shared state behind every facade variant: the engine, the session pool,
//! and the `Uninitialized → Ready → Disposed` state machine.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use crate::config::Config;
use crate::engine::{LogStore, LogStoreConfig, Session, SessionFunctions, ValueSerializer};
use crate::error::{Result, SpanKvError};
use crate::pool::{SessionLease, SessionPool};

use super::Strategy;

/// Lifecycle of a store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum LifecycleState {
    /// Engine and pool are being set up
    Uninitialized = 0,

    /// Accepting operations
    Ready = 1,

    /// Sessions and engine released (terminal)
    Disposed = 2,
}

impl LifecycleState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => LifecycleState::Uninitialized,
            1 => LifecycleState::Ready,
            _ => LifecycleState::Disposed,
        }
    }
}

/// Engine + session pool + lifecycle, shared by the three strategies
pub(crate) struct StoreCore<V, F>
where
    V: Send + Sync + 'static,
    F: SessionFunctions<V> + Clone,
{
    strategy: Strategy,
    engine: Arc<LogStore<V>>,
    pool: SessionPool<Session<V, F>>,
    state: AtomicU8,
}

impl<V, F> StoreCore<V, F>
where
    V: Send + Sync + 'static,
    F: SessionFunctions<V> + Clone,
{
    /// Validate `config`, open the engine and an empty pool
    ///
    /// `functions` builds the per-session functions once the engine exists
    /// (byte strategies need its buffer pool).
    pub fn open(
        strategy: Strategy,
        config: &Config,
        serializer: Arc<dyn ValueSerializer<V>>,
        functions: impl FnOnce(&Arc<LogStore<V>>) -> F,
    ) -> Result<Self> {
        let state = AtomicU8::new(LifecycleState::Uninitialized as u8);

        config.validate()?;
        let engine = LogStore::open(LogStoreConfig::from(config), serializer)?;
        let functions = functions(&engine);

        let factory_engine = Arc::clone(&engine);
        let pool = SessionPool::with_limit(
            Box::new(move || factory_engine.new_session(functions.clone())),
            config.max_sessions,
        );

        state.store(LifecycleState::Ready as u8, Ordering::Release);
        tracing::info!(%strategy, capacity = config.capacity, "Store ready");

        Ok(Self {
            strategy,
            engine,
            pool,
            state,
        })
    }

    /// Lease a session for one operation
    pub fn lease(&self) -> Result<SessionLease<'_, Session<V, F>>> {
        if self.state() != LifecycleState::Ready {
            return Err(SpanKvError::Disposed);
        }
        self.pool.acquire()
    }

    pub fn state(&self) -> LifecycleState {
        LifecycleState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn engine(&self) -> &Arc<LogStore<V>> {
        &self.engine
    }

    pub fn pool(&self) -> &SessionPool<Session<V, F>> {
        &self.pool
    }

    /// Drain the pool, dispose each session, then dispose the engine
    ///
    /// Only the first call does anything.
    pub fn shutdown(&self) -> Result<()> {
        let was_ready = self
            .state
            .compare_exchange(
                LifecycleState::Ready as u8,
                LifecycleState::Disposed as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok();
        if !was_ready {
            return Ok(());
        }

        let sessions = self.pool.close_and_drain();
        let disposed = sessions.len();
        for session in sessions {
            session.dispose();
        }

        self.engine.dispose()?;

        tracing::info!(
            strategy = %self.strategy,
            sessions_disposed = disposed,
            sessions_created = self.pool.created(),
            "Store disposed"
        );
        Ok(())
    }
}

impl<V, F> Drop for StoreCore<V, F>
where
    V: Send + Sync + 'static,
    F: SessionFunctions<V> + Clone,
{
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            tracing::warn!(strategy = %self.strategy, "Dispose on drop failed: {}", e);
        }
    }
}
