//! Configuration for SpanKV
//!
//! Centralized configuration with sensible defaults. A store is always built
//! from an explicit `Config`; nothing is read from the environment and no
//! file is created unless `DeviceKind::File` asks for it.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SpanKvError};

/// Smallest page the log accepts (64 bytes)
pub const MIN_PAGE_SIZE_BITS: u8 = 6;

/// Largest page the log accepts (1 GiB)
pub const MAX_PAGE_SIZE_BITS: u8 = 30;

/// Largest in-memory budget the log accepts (1 TiB)
pub const MAX_MEMORY_SIZE_BITS: u8 = 40;

/// Main configuration for a SpanKV store
///
/// Serializable so deployments can keep it next to other settings; missing
/// fields take their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Engine Configuration
    // -------------------------------------------------------------------------
    /// Entry budget of the engine index. Must be a power of two.
    /// Upserting a new key beyond this budget fails with `CapacityExhausted`.
    pub capacity: u64,

    /// Hybrid log sizing and backing device
    ///
    /// The page size also bounds value size for the byte strategies: an
    /// encoded value plus the 16-byte record header must fit one page, or
    /// `upsert` fails with `RecordTooLarge`. Object values occupy a fixed
    /// slot in memory and have no such limit.
    pub log: LogSettings,

    // -------------------------------------------------------------------------
    // Session Pool Configuration
    // -------------------------------------------------------------------------
    /// Optional upper bound on sessions created by one store.
    ///
    /// `None` (the default) means the pool grows without bound: a burst of N
    /// concurrent operations leaves N sessions alive for the store's lifetime.
    pub max_sessions: Option<usize>,
}

/// Sizing of the append-only log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    /// Page size as a power of two (12 → 4 KiB pages)
    pub page_size_bits: u8,

    /// In-memory budget as a power of two (13 → 8 KiB, i.e. two 4 KiB pages).
    /// Pages beyond this budget are flushed to the device.
    pub memory_size_bits: u8,

    /// Where flushed pages go
    pub device: DeviceKind,
}

/// Backing storage for flushed log pages
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceKind {
    /// Keep flushed pages in process memory
    Memory,

    /// Append flushed pages to a log file inside `dir`
    File {
        dir: PathBuf,
        /// Remove the log file when the engine is disposed
        delete_on_close: bool,
    },
}

impl LogSettings {
    /// Check page and memory sizing
    ///
    /// `page_size` and `memory_pages` assume these bounds hold.
    pub fn validate(&self) -> Result<()> {
        let page_bits = self.page_size_bits;
        if !(MIN_PAGE_SIZE_BITS..=MAX_PAGE_SIZE_BITS).contains(&page_bits) {
            return Err(SpanKvError::Config(format!(
                "page_size_bits must be within {}..={}, got {}",
                MIN_PAGE_SIZE_BITS, MAX_PAGE_SIZE_BITS, page_bits
            )));
        }

        // At least two pages: one being filled, one being flushed
        let memory_bits = self.memory_size_bits;
        if memory_bits <= page_bits || memory_bits > MAX_MEMORY_SIZE_BITS {
            return Err(SpanKvError::Config(format!(
                "memory_size_bits must be within {}..={}, got {}",
                page_bits + 1,
                MAX_MEMORY_SIZE_BITS,
                memory_bits
            )));
        }

        Ok(())
    }

    /// Page size in bytes
    pub fn page_size(&self) -> usize {
        1usize << self.page_size_bits
    }

    /// Number of pages kept in memory before the oldest is flushed
    pub fn memory_pages(&self) -> usize {
        1usize << (self.memory_size_bits - self.page_size_bits)
    }
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            page_size_bits: 12,
            memory_size_bits: 13,
            device: DeviceKind::Memory,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            capacity: 1 << 20,
            log: LogSettings::default(),
            max_sessions: None,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Check the configuration before any engine resource is allocated
    pub fn validate(&self) -> Result<()> {
        if self.capacity == 0 || !self.capacity.is_power_of_two() {
            return Err(SpanKvError::Config(format!(
                "capacity must be a power of two, got {}",
                self.capacity
            )));
        }

        self.log.validate()?;

        if self.max_sessions == Some(0) {
            return Err(SpanKvError::Config(
                "max_sessions must be at least 1 when set".to_string(),
            ));
        }

        Ok(())
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the index entry budget (power of two)
    pub fn capacity(mut self, capacity: u64) -> Self {
        self.config.capacity = capacity;
        self
    }

    /// Set the log page size (as a power of two)
    pub fn page_size_bits(mut self, bits: u8) -> Self {
        self.config.log.page_size_bits = bits;
        self
    }

    /// Set the in-memory log budget (as a power of two)
    pub fn memory_size_bits(mut self, bits: u8) -> Self {
        self.config.log.memory_size_bits = bits;
        self
    }

    /// Keep flushed pages in memory
    pub fn memory_device(mut self) -> Self {
        self.config.log.device = DeviceKind::Memory;
        self
    }

    /// Flush pages to a log file inside `dir`
    pub fn file_device(mut self, dir: impl Into<PathBuf>, delete_on_close: bool) -> Self {
        self.config.log.device = DeviceKind::File {
            dir: dir.into(),
            delete_on_close,
        };
        self
    }

    /// Bound the number of sessions a store may create
    pub fn max_sessions(mut self, count: usize) -> Self {
        self.config.max_sessions = Some(count);
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
