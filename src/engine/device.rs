//! Log devices
//!
//! Flushed log pages are appended to a `LogDevice` and read back by offset.
//! Two devices ship with the engine: an in-memory one and an append-only
//! file.

use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::{Mutex, RwLock};

use crate::config::DeviceKind;
use crate::error::{Result, SpanKvError};

/// Append-only byte storage for flushed pages
pub trait LogDevice: Send + Sync + 'static {
    /// Append `data`, returning the offset it was written at
    fn append(&self, data: &[u8]) -> Result<u64>;

    /// Read `len` bytes starting at `offset`
    fn read_at(&self, offset: u64, len: usize) -> Result<Vec<u8>>;

    /// Total bytes appended so far
    fn len(&self) -> u64;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Release the backing storage. Calling it again has no effect.
    fn close(&self) -> Result<()>;
}

/// Build the device a config asks for
pub fn open_device(kind: &DeviceKind) -> Result<Arc<dyn LogDevice>> {
    match kind {
        DeviceKind::Memory => Ok(Arc::new(MemoryDevice::new())),
        DeviceKind::File {
            dir,
            delete_on_close,
        } => Ok(Arc::new(FileDevice::create_in(dir, *delete_on_close)?)),
    }
}

// =============================================================================
// MemoryDevice
// =============================================================================

/// Device that keeps flushed pages in a growable in-memory buffer
#[derive(Default)]
pub struct MemoryDevice {
    data: RwLock<Vec<u8>>,
    closed: AtomicBool,
}

impl MemoryDevice {
    pub fn new() -> Self {
        Self::default()
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(SpanKvError::Disposed);
        }
        Ok(())
    }
}

impl LogDevice for MemoryDevice {
    fn append(&self, data: &[u8]) -> Result<u64> {
        self.ensure_open()?;
        let mut buf = self.data.write();
        let offset = buf.len() as u64;
        buf.extend_from_slice(data);
        Ok(offset)
    }

    fn read_at(&self, offset: u64, len: usize) -> Result<Vec<u8>> {
        self.ensure_open()?;
        let buf = self.data.read();
        let start = offset as usize;
        let end = start
            .checked_add(len)
            .filter(|&end| end <= buf.len())
            .ok_or_else(|| {
                SpanKvError::Corruption(format!(
                    "read of {} bytes at {} past device end {}",
                    len,
                    offset,
                    buf.len()
                ))
            })?;
        Ok(buf[start..end].to_vec())
    }

    fn len(&self) -> u64 {
        self.data.read().len() as u64
    }

    fn close(&self) -> Result<()> {
        if !self.closed.swap(true, Ordering::AcqRel) {
            let mut buf = self.data.write();
            buf.clear();
            buf.shrink_to_fit();
        }
        Ok(())
    }
}

// =============================================================================
// FileDevice
// =============================================================================

/// Device that appends flushed pages to a single log file
pub struct FileDevice {
    path: PathBuf,

    /// File handle; seek + read/write must happen as one step
    file: Mutex<Option<File>>,

    /// Bytes appended so far (end of file)
    tail: AtomicU64,

    delete_on_close: bool,
}

/// Distinguishes log files created by one process
static NEXT_FILE_ID: AtomicU64 = AtomicU64::new(0);

impl FileDevice {
    /// Create a fresh, uniquely named log file inside `dir`
    pub fn create_in(dir: &Path, delete_on_close: bool) -> Result<Self> {
        fs::create_dir_all(dir)?;

        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or_default();
        let name = format!(
            "spankv-{}-{}-{}.log",
            std::process::id(),
            nanos,
            NEXT_FILE_ID.fetch_add(1, Ordering::Relaxed)
        );

        Self::create(dir.join(name), delete_on_close)
    }

    /// Create (or truncate) the log file at `path`
    pub fn create(path: PathBuf, delete_on_close: bool) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)?;

        tracing::debug!("Opened log device {}", path.display());

        Ok(Self {
            path,
            file: Mutex::new(Some(file)),
            tail: AtomicU64::new(0),
            delete_on_close,
        })
    }

    /// Path of the log file
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl LogDevice for FileDevice {
    fn append(&self, data: &[u8]) -> Result<u64> {
        let mut guard = self.file.lock();
        let file = guard.as_mut().ok_or(SpanKvError::Disposed)?;

        let offset = self.tail.load(Ordering::Acquire);
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(data)?;
        self.tail.store(offset + data.len() as u64, Ordering::Release);

        Ok(offset)
    }

    fn read_at(&self, offset: u64, len: usize) -> Result<Vec<u8>> {
        let mut guard = self.file.lock();
        let file = guard.as_mut().ok_or(SpanKvError::Disposed)?;

        let mut buf = vec![0u8; len];
        file.seek(SeekFrom::Start(offset))?;
        file.read_exact(&mut buf)?;
        Ok(buf)
    }

    fn len(&self) -> u64 {
        self.tail.load(Ordering::Acquire)
    }

    fn close(&self) -> Result<()> {
        let Some(file) = self.file.lock().take() else {
            return Ok(());
        };
        drop(file);

        if self.delete_on_close {
            fs::remove_file(&self.path)?;
            tracing::debug!("Removed log device {}", self.path.display());
        }
        Ok(())
    }
}

impl Drop for FileDevice {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::warn!("Failed to close log device {}: {}", self.path.display(), e);
        }
    }
}
