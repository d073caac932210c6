//! Hybrid log
//!
//! Append-only log of `(key, value)` records split into fixed-size pages.
//! The newest pages stay in memory holding values as-is; once the memory
//! budget is exceeded the oldest page is serialized and appended to the
//! device.
//!
//! ## Device Record Format
//! ```text
//! ┌──────────┬──────────┬──────────┬─────────────────┐
//! │ Key (8)  │ Len (4)  │ CRC (4)  │ Payload (Len)   │
//! └──────────┴──────────┴──────────┴─────────────────┘
//! ```
//! CRC32 covers the key bytes and the payload.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::config::LogSettings;
use crate::error::{Result, SpanKvError};

use super::device::LogDevice;
use super::serializer::ValueSerializer;
use super::Key;

/// Key (8) + payload length (4) + CRC32 (4)
pub const RECORD_HEADER_SIZE: usize = 16;

/// Logical address of a record: page number in the high bits, byte offset
/// within the page in the low `page_size_bits`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LogAddress(u64);

impl LogAddress {
    fn new(page: u64, offset: u32, page_bits: u8) -> Self {
        Self((page << page_bits) | offset as u64)
    }

    /// Page number holding the record
    pub fn page(&self, page_bits: u8) -> u64 {
        self.0 >> page_bits
    }

    /// Byte offset of the record within its page
    pub fn offset(&self, page_bits: u8) -> u32 {
        (self.0 & ((1u64 << page_bits) - 1)) as u32
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

/// Where a record can be read from
pub(crate) enum Lookup<T> {
    /// The record was still in memory; `T` was produced from it in place
    Memory(T),

    /// The record lives on the device at this byte range
    Device(DeviceSpan),
}

/// Byte range of one record on the device
#[derive(Debug, Clone, Copy)]
pub(crate) struct DeviceSpan {
    pub offset: u64,
    pub len: usize,
}

struct MemRecord<V> {
    offset: u32,
    key: Key,
    value: V,
}

struct MemPage<V> {
    number: u64,
    used: usize,
    records: Vec<MemRecord<V>>,
}

impl<V> MemPage<V> {
    fn new(number: u64) -> Self {
        Self {
            number,
            used: 0,
            records: Vec::new(),
        }
    }

    fn find(&self, offset: u32) -> Option<&MemRecord<V>> {
        // Records are appended in offset order
        self.records
            .binary_search_by_key(&offset, |r| r.offset)
            .ok()
            .map(|i| &self.records[i])
    }
}

struct LogState<V> {
    /// In-memory pages, oldest first. Never empty.
    pages: VecDeque<MemPage<V>>,

    /// Record locations of flushed pages: page → (slot offset → device span)
    flushed: HashMap<u64, HashMap<u32, DeviceSpan>>,
}

/// Paged append-only log
pub(crate) struct HybridLog<V> {
    page_bits: u8,
    page_size: usize,
    memory_pages: usize,
    state: RwLock<LogState<V>>,
    device: Arc<dyn LogDevice>,
    serializer: Arc<dyn ValueSerializer<V>>,
    pages_flushed: AtomicU64,
}

impl<V: Send + Sync + 'static> HybridLog<V> {
    pub fn new(
        settings: &LogSettings,
        device: Arc<dyn LogDevice>,
        serializer: Arc<dyn ValueSerializer<V>>,
    ) -> Self {
        let mut pages = VecDeque::new();
        pages.push_back(MemPage::new(0));

        Self {
            page_bits: settings.page_size_bits,
            page_size: settings.page_size(),
            memory_pages: settings.memory_pages().max(2),
            state: RwLock::new(LogState {
                pages,
                flushed: HashMap::new(),
            }),
            device,
            serializer,
            pages_flushed: AtomicU64::new(0),
        }
    }

    /// Append a record, flushing the oldest page if the memory budget is
    /// exceeded
    pub fn append(&self, key: Key, value: V) -> Result<LogAddress> {
        let size = RECORD_HEADER_SIZE + self.serializer.inline_size(&value);
        if size > self.page_size {
            return Err(SpanKvError::RecordTooLarge {
                size,
                page_size: self.page_size,
            });
        }

        let mut state = self.state.write();

        let needs_new_page = state
            .pages
            .back()
            .map_or(true, |tail| tail.used + size > self.page_size);
        if needs_new_page {
            let next = state.pages.back().map_or(0, |tail| tail.number + 1);
            state.pages.push_back(MemPage::new(next));

            while state.pages.len() > self.memory_pages {
                self.flush_oldest(&mut state)?;
            }
        }

        let tail = state
            .pages
            .back_mut()
            .ok_or_else(|| SpanKvError::Engine("log has no tail page".to_string()))?;
        let offset = tail.used as u32;
        tail.records.push(MemRecord { offset, key, value });
        tail.used += size;

        Ok(LogAddress::new(tail.number, offset, self.page_bits))
    }

    /// Locate a record. In-memory hits are handed to `read` under the log's
    /// read lock; flushed records come back as a device span.
    pub fn lookup<T>(
        &self,
        key: Key,
        address: LogAddress,
        read: impl FnOnce(&V) -> T,
    ) -> Result<Lookup<T>> {
        let page = address.page(self.page_bits);
        let offset = address.offset(self.page_bits);
        let state = self.state.read();

        if let Some(mem_page) = state.pages.iter().find(|p| p.number == page) {
            let record = mem_page.find(offset).ok_or_else(|| {
                SpanKvError::Corruption(format!("no record at address {}", address.raw()))
            })?;
            if record.key != key {
                return Err(SpanKvError::Corruption(format!(
                    "address {} holds key {}, expected {}",
                    address.raw(),
                    record.key,
                    key
                )));
            }
            return Ok(Lookup::Memory(read(&record.value)));
        }

        state
            .flushed
            .get(&page)
            .and_then(|slots| slots.get(&offset))
            .map(|span| Lookup::Device(*span))
            .ok_or_else(|| {
                SpanKvError::Corruption(format!("address {} not found in log", address.raw()))
            })
    }

    /// Device holding flushed pages
    pub fn device(&self) -> Arc<dyn LogDevice> {
        Arc::clone(&self.device)
    }

    /// Check a device record and rebuild its value
    pub fn decode_record(&self, key: Key, bytes: &[u8]) -> Result<V> {
        let payload = parse_record(key, bytes)?;
        self.serializer.deserialize(payload)
    }

    /// Pages written to the device so far
    pub fn pages_flushed(&self) -> u64 {
        self.pages_flushed.load(Ordering::Relaxed)
    }

    /// Pages currently held in memory
    pub fn memory_page_count(&self) -> usize {
        self.state.read().pages.len()
    }

    /// Drop every page and close the device
    pub fn close(&self) -> Result<()> {
        {
            let mut state = self.state.write();
            state.pages.clear();
            state.pages.push_back(MemPage::new(0));
            state.flushed.clear();
        }
        self.device.close()
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    /// Serialize the oldest in-memory page and append it to the device.
    /// The page only leaves memory once the device write succeeded.
    fn flush_oldest(&self, state: &mut LogState<V>) -> Result<()> {
        let Some(page) = state.pages.front() else {
            return Ok(());
        };

        let mut blob = Vec::with_capacity(self.page_size);
        let mut slots = Vec::with_capacity(page.records.len());
        for record in &page.records {
            let start = blob.len();
            encode_record(record.key, &record.value, self.serializer.as_ref(), &mut blob)?;
            slots.push((record.offset, start, blob.len() - start));
        }

        let base = self.device.append(&blob)?;
        let number = page.number;
        let spans = slots
            .into_iter()
            .map(|(slot, start, len)| {
                (
                    slot,
                    DeviceSpan {
                        offset: base + start as u64,
                        len,
                    },
                )
            })
            .collect();

        state.flushed.insert(number, spans);
        state.pages.pop_front();
        self.pages_flushed.fetch_add(1, Ordering::Relaxed);

        tracing::trace!(page = number, bytes = blob.len(), "Flushed log page to device");
        Ok(())
    }
}

/// Append one device record for `(key, value)` to `out`
fn encode_record<V: 'static>(
    key: Key,
    value: &V,
    serializer: &dyn ValueSerializer<V>,
    out: &mut Vec<u8>,
) -> Result<()> {
    let header_at = out.len();
    out.extend_from_slice(&[0u8; RECORD_HEADER_SIZE]);
    serializer.serialize(value, out)?;

    let payload_len = out.len() - header_at - RECORD_HEADER_SIZE;
    let key_bytes = key.to_le_bytes();

    let mut hasher = crc32fast::Hasher::new();
    hasher.update(&key_bytes);
    hasher.update(&out[header_at + RECORD_HEADER_SIZE..]);
    let crc = hasher.finalize();

    out[header_at..header_at + 8].copy_from_slice(&key_bytes);
    out[header_at + 8..header_at + 12].copy_from_slice(&(payload_len as u32).to_le_bytes());
    out[header_at + 12..header_at + 16].copy_from_slice(&crc.to_le_bytes());
    Ok(())
}

/// Validate a device record and return its payload
fn parse_record(expected_key: Key, bytes: &[u8]) -> Result<&[u8]> {
    if bytes.len() < RECORD_HEADER_SIZE {
        return Err(SpanKvError::Corruption(format!(
            "record shorter than header: {} bytes",
            bytes.len()
        )));
    }

    let mut key_bytes = [0u8; 8];
    key_bytes.copy_from_slice(&bytes[0..8]);
    let mut len_bytes = [0u8; 4];
    len_bytes.copy_from_slice(&bytes[8..12]);
    let mut crc_bytes = [0u8; 4];
    crc_bytes.copy_from_slice(&bytes[12..16]);

    let key = Key::from_le_bytes(key_bytes);
    let len = u32::from_le_bytes(len_bytes) as usize;
    let stored_crc = u32::from_le_bytes(crc_bytes);

    let payload = &bytes[RECORD_HEADER_SIZE..];
    if payload.len() != len {
        return Err(SpanKvError::Corruption(format!(
            "record length mismatch: header says {}, got {}",
            len,
            payload.len()
        )));
    }

    let mut hasher = crc32fast::Hasher::new();
    hasher.update(&key_bytes);
    hasher.update(payload);
    if hasher.finalize() != stored_crc {
        return Err(SpanKvError::Corruption(format!("CRC mismatch for key {}", key)));
    }

    if key != expected_key {
        return Err(SpanKvError::Corruption(format!(
            "record holds key {}, expected {}",
            key, expected_key
        )));
    }

    Ok(payload)
}
