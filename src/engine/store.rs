//! Log store and sessions
//!
//! `LogStore` owns the index and the hybrid log. All access goes through a
//! `Session`, created with `LogStore::new_session`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::config::{Config, LogSettings};
use crate::error::{Result, SpanKvError};

use super::buffer::BufferPool;
use super::device::{open_device, LogDevice};
use super::functions::SessionFunctions;
use super::log::{HybridLog, LogAddress, Lookup};
use super::serializer::ValueSerializer;
use super::{Key, Status};

/// Engine construction parameters
#[derive(Debug, Clone)]
pub struct LogStoreConfig {
    /// Index entry budget (power of two)
    pub capacity: u64,

    /// Log sizing and device
    pub log: LogSettings,
}

impl LogStoreConfig {
    /// Check the entry budget and log sizing
    pub fn validate(&self) -> Result<()> {
        if self.capacity == 0 || !self.capacity.is_power_of_two() {
            return Err(SpanKvError::Config(format!(
                "capacity must be a power of two, got {}",
                self.capacity
            )));
        }
        self.log.validate()
    }
}

impl From<&Config> for LogStoreConfig {
    fn from(config: &Config) -> Self {
        Self {
            capacity: config.capacity,
            log: config.log.clone(),
        }
    }
}

/// Keyed log store
///
/// ## Concurrency:
/// - `index`: RwLock; an upsert swaps a key's address in one step, so a
///   concurrent read sees either the old or the new record, never a mix
/// - `log`: internal RwLock over its pages
/// - counters: atomics
pub struct LogStore<V> {
    capacity: u64,

    /// Latest record address per key
    index: RwLock<HashMap<Key, LogAddress>>,

    log: HybridLog<V>,

    /// Pool that byte-valued reads rent their result buffers from
    buffers: Arc<BufferPool>,

    next_session_id: AtomicU64,
    open_sessions: AtomicUsize,
    disposed: AtomicBool,
}

impl<V: Send + Sync + 'static> LogStore<V> {
    /// Open a store on the configured device
    pub fn open(config: LogStoreConfig, serializer: Arc<dyn ValueSerializer<V>>) -> Result<Arc<Self>> {
        config.validate()?;
        let device = open_device(&config.log.device)?;
        Self::open_with_device(config, device, serializer)
    }

    /// Open a store on a caller-provided device
    pub fn open_with_device(
        config: LogStoreConfig,
        device: Arc<dyn LogDevice>,
        serializer: Arc<dyn ValueSerializer<V>>,
    ) -> Result<Arc<Self>> {
        config.validate()?;

        // Pre-size for small budgets only; large budgets grow on demand
        let initial = config.capacity.min(1024) as usize;

        tracing::debug!(
            capacity = config.capacity,
            page_size = config.log.page_size(),
            memory_pages = config.log.memory_pages(),
            "Opening log store"
        );

        Ok(Arc::new(Self {
            capacity: config.capacity,
            index: RwLock::new(HashMap::with_capacity(initial)),
            log: HybridLog::new(&config.log, device, serializer),
            buffers: Arc::new(BufferPool::new()),
            next_session_id: AtomicU64::new(1),
            open_sessions: AtomicUsize::new(0),
            disposed: AtomicBool::new(false),
        }))
    }

    /// Start a new session using `functions` for input/output conversion
    pub fn new_session<F: SessionFunctions<V>>(self: &Arc<Self>, functions: F) -> Result<Session<V, F>> {
        self.ensure_open()?;

        let id = self.next_session_id.fetch_add(1, Ordering::Relaxed);
        self.open_sessions.fetch_add(1, Ordering::SeqCst);
        tracing::trace!(session = id, "Session started");

        Ok(Session {
            id,
            store: Arc::clone(self),
            functions,
        })
    }

    /// Shared pool for read result buffers
    pub fn buffer_pool(&self) -> Arc<BufferPool> {
        Arc::clone(&self.buffers)
    }

    /// Close the device and drop all records. Calling it again has no effect.
    pub fn dispose(&self) -> Result<()> {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        let open = self.open_sessions();
        if open > 0 {
            tracing::warn!(open_sessions = open, "Disposing log store with sessions still open");
        }

        self.index.write().clear();
        self.log.close()?;

        tracing::debug!("Log store disposed");
        Ok(())
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    // =========================================================================
    // Accessors (for testing and debugging)
    // =========================================================================

    /// Sessions created and not yet disposed
    pub fn open_sessions(&self) -> usize {
        self.open_sessions.load(Ordering::SeqCst)
    }

    /// Number of distinct keys
    pub fn entry_count(&self) -> usize {
        self.index.read().len()
    }

    /// Index entry budget
    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    /// Log pages written to the device so far
    pub fn pages_flushed(&self) -> u64 {
        self.log.pages_flushed()
    }

    /// Log pages currently held in memory
    pub fn memory_page_count(&self) -> usize {
        self.log.memory_page_count()
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    fn ensure_open(&self) -> Result<()> {
        if self.is_disposed() {
            return Err(SpanKvError::Disposed);
        }
        Ok(())
    }

    fn upsert(&self, key: Key, value: V) -> Result<()> {
        self.ensure_open()?;

        // Held across the append so the budget check and the insert agree
        let mut index = self.index.write();
        if !index.contains_key(&key) && index.len() as u64 >= self.capacity {
            return Err(SpanKvError::CapacityExhausted {
                capacity: self.capacity,
            });
        }

        let address = self.log.append(key, value)?;
        index.insert(key, address);
        Ok(())
    }

    async fn read<T, R>(&self, key: Key, read: R) -> Result<Option<T>>
    where
        T: Send + 'static,
        R: Fn(&V) -> T,
    {
        self.ensure_open()?;

        let address = self.index.read().get(&key).copied();
        let Some(address) = address else {
            // Disposal clears the index after raising the flag
            self.ensure_open()?;
            return Ok(None);
        };

        let span = match self.log.lookup(key, address, &read) {
            Ok(Lookup::Memory(output)) => return Ok(Some(output)),
            Ok(Lookup::Device(span)) => span,
            Err(_) if self.is_disposed() => return Err(SpanKvError::Disposed),
            Err(e) => return Err(e),
        };

        // Pending I/O: the device read runs off this task
        let device = self.log.device();
        let bytes = tokio::task::spawn_blocking(move || device.read_at(span.offset, span.len))
            .await
            .map_err(|e| SpanKvError::Engine(format!("device read task failed: {}", e)))??;

        let value = self.log.decode_record(key, &bytes)?;
        Ok(Some(read(&value)))
    }

    fn session_closed(&self, id: u64) {
        self.open_sessions.fetch_sub(1, Ordering::SeqCst);
        tracing::trace!(session = id, "Session disposed");
    }
}

/// Exclusive handle for issuing operations against a `LogStore`
///
/// Every operation takes `&mut self`: a session can serve only one
/// operation at a time.
pub struct Session<V: Send + Sync + 'static, F> {
    id: u64,
    store: Arc<LogStore<V>>,
    functions: F,
}

impl<V, F> Session<V, F>
where
    V: Send + Sync + 'static,
    F: SessionFunctions<V>,
{
    /// Unique (per store) session id
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Insert or replace the value for `key`
    pub fn upsert(&mut self, key: Key, input: F::Input<'_>) -> Result<()> {
        let value = self.functions.upsert_value(input);
        self.store.upsert(key, value)
    }

    /// Point read. Suspends only when the record has to come from the device,
    /// which requires a Tokio runtime.
    pub async fn read_async(&mut self, key: Key) -> Result<(Status, Option<F::Output>)> {
        let functions = &self.functions;
        let output = self
            .store
            .read(key, |value: &V| functions.read_value(value))
            .await?;

        Ok(match output {
            Some(output) => (Status::Found, Some(output)),
            None => (Status::NotFound, None),
        })
    }

    /// Store this session belongs to
    pub fn store(&self) -> &Arc<LogStore<V>> {
        &self.store
    }

    /// End the session
    pub fn dispose(self) {
        drop(self);
    }
}

impl<V: Send + Sync + 'static, F> Drop for Session<V, F> {
    fn drop(&mut self) {
        self.store.session_closed(self.id);
    }
}
