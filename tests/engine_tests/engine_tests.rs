//! Tests for the log store engine
//!
//! These tests verify:
//! - Session upsert/read for in-memory and flushed records
//! - Borrowed spans are copied, not retained
//! - The serializer hook runs at page flush, not at upsert
//! - Pooled result buffers are returned on drop
//! - Capacity and page-size limits
//! - Session accounting and disposal
//! - File-backed devices

#[path = "../common/mod.rs"]
mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use spankv::config::{Config, DeviceKind, LogSettings};
use spankv::engine::{
    LogDevice, LogStore, LogStoreConfig, MemoryDevice, MemoryFunctions, ObjectFunctions,
    RawBytes, SpanByte, SpanByteFunctions, Status, ValueSerializer,
};
use spankv::{Result, SpanKvError};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

/// 256-byte pages, two of them in memory
fn tiny_log() -> LogStoreConfig {
    LogStoreConfig {
        capacity: 1 << 12,
        log: LogSettings {
            page_size_bits: 8,
            memory_size_bits: 9,
            device: DeviceKind::Memory,
        },
    }
}

fn open_bytes_store(config: LogStoreConfig) -> Arc<LogStore<Bytes>> {
    common::init_tracing();
    LogStore::<Bytes>::open(config, Arc::new(RawBytes)).unwrap()
}

/// Serializer for `String` values that counts hook invocations
#[derive(Default)]
struct CountingSerializer {
    serialized: AtomicUsize,
    deserialized: AtomicUsize,
}

impl ValueSerializer<String> for CountingSerializer {
    fn inline_size(&self, _value: &String) -> usize {
        8
    }

    fn serialize(&self, value: &String, buf: &mut Vec<u8>) -> Result<()> {
        self.serialized.fetch_add(1, Ordering::SeqCst);
        buf.extend_from_slice(value.as_bytes());
        Ok(())
    }

    fn deserialize(&self, bytes: &[u8]) -> Result<String> {
        self.deserialized.fetch_add(1, Ordering::SeqCst);
        String::from_utf8(bytes.to_vec()).map_err(|e| SpanKvError::Decode(e.to_string()))
    }
}

// =============================================================================
// Basic Operations Tests
// =============================================================================

#[tokio::test]
async fn test_upsert_then_read_in_memory() {
    let store = open_bytes_store(tiny_log());
    let mut session = store.new_session(MemoryFunctions::new(store.buffer_pool())).unwrap();

    session.upsert(1, b"one".to_vec()).unwrap();
    let (status, output) = session.read_async(1).await.unwrap();

    assert_eq!(status, Status::Found);
    assert_eq!(&*output.unwrap(), b"one");
    assert_eq!(store.pages_flushed(), 0);
}

#[tokio::test]
async fn test_read_missing_key() {
    let store = open_bytes_store(tiny_log());
    let mut session = store.new_session(MemoryFunctions::new(store.buffer_pool())).unwrap();

    let (status, output) = session.read_async(7).await.unwrap();

    assert_eq!(status, Status::NotFound);
    assert!(output.is_none());
}

#[tokio::test]
async fn test_overwrite_returns_latest() {
    let store = open_bytes_store(tiny_log());
    let mut session = store.new_session(MemoryFunctions::new(store.buffer_pool())).unwrap();

    session.upsert(5, b"first".to_vec()).unwrap();
    session.upsert(5, b"second".to_vec()).unwrap();

    let (_, output) = session.read_async(5).await.unwrap();
    assert_eq!(&*output.unwrap(), b"second");
    assert_eq!(store.entry_count(), 1);
}

#[tokio::test]
async fn test_flushed_records_read_from_device() {
    let store = open_bytes_store(tiny_log());
    let mut session = store.new_session(MemoryFunctions::new(store.buffer_pool())).unwrap();

    for key in 0..200i64 {
        session.upsert(key, format!("value-{}", key).into_bytes()).unwrap();
    }

    assert!(store.pages_flushed() > 0);
    assert!(store.memory_page_count() <= 2);

    for key in 0..200i64 {
        let (status, output) = session.read_async(key).await.unwrap();
        assert_eq!(status, Status::Found);
        assert_eq!(&*output.unwrap(), format!("value-{}", key).as_bytes());
    }
}

#[tokio::test]
async fn test_empty_value() {
    let store = open_bytes_store(tiny_log());
    let mut session = store.new_session(MemoryFunctions::new(store.buffer_pool())).unwrap();

    session.upsert(3, Vec::new()).unwrap();
    let (status, output) = session.read_async(3).await.unwrap();

    assert_eq!(status, Status::Found);
    assert!(output.unwrap().is_empty());
}

// =============================================================================
// Borrowed Span Tests
// =============================================================================

#[tokio::test]
async fn test_span_bytes_are_copied() {
    let store = open_bytes_store(tiny_log());
    let mut session = store.new_session(SpanByteFunctions::new(store.buffer_pool())).unwrap();

    let mut buf = b"intact".to_vec();
    session.upsert(11, SpanByte::from_slice(&buf)).unwrap();

    // Scribble over and then free the caller's buffer
    buf.iter_mut().for_each(|b| *b = b'#');
    drop(buf);

    let (status, output) = session.read_async(11).await.unwrap();
    assert_eq!(status, Status::Found);
    assert_eq!(&*output.unwrap(), b"intact");
}

#[tokio::test]
async fn test_span_reused_buffer_across_upserts() {
    let store = open_bytes_store(tiny_log());
    let mut session = store.new_session(SpanByteFunctions::new(store.buffer_pool())).unwrap();

    let mut scratch = Vec::new();
    for key in 0..100i64 {
        scratch.clear();
        scratch.extend_from_slice(format!("v{}", key).as_bytes());
        session.upsert(key, SpanByte::from_slice(&scratch)).unwrap();
    }

    for key in 0..100i64 {
        let (_, output) = session.read_async(key).await.unwrap();
        assert_eq!(&*output.unwrap(), format!("v{}", key).as_bytes());
    }
}

#[test]
fn test_span_accessors() {
    let bytes = [1u8, 2, 3];
    let span = SpanByte::from_slice(&bytes);

    assert_eq!(span.len(), 3);
    assert!(!span.is_empty());
    assert_eq!(span.as_ptr(), bytes.as_ptr());
    assert_eq!(span.as_slice(), &bytes);
}

// =============================================================================
// Serializer Hook Tests
// =============================================================================

#[tokio::test]
async fn test_serializer_hook_runs_at_flush() {
    common::init_tracing();
    let serializer = Arc::new(CountingSerializer::default());
    let hook: Arc<dyn ValueSerializer<String>> = serializer.clone();
    let store = LogStore::open(tiny_log(), hook).unwrap();
    let mut session = store.new_session(ObjectFunctions::<String>::new()).unwrap();

    // 24 bytes per record: ten records stay within the first page
    for key in 0..10i64 {
        session.upsert(key, key.to_string()).unwrap();
    }
    assert_eq!(serializer.serialized.load(Ordering::SeqCst), 0);

    // Read-after-write before any flush is served from memory
    let (status, value) = session.read_async(3).await.unwrap();
    assert_eq!((status, value.as_deref()), (Status::Found, Some("3")));
    assert_eq!(serializer.deserialized.load(Ordering::SeqCst), 0);

    for key in 10..100i64 {
        session.upsert(key, key.to_string()).unwrap();
    }
    assert!(serializer.serialized.load(Ordering::SeqCst) > 0);

    let (status, value) = session.read_async(0).await.unwrap();
    assert_eq!((status, value.as_deref()), (Status::Found, Some("0")));
    assert_eq!(serializer.deserialized.load(Ordering::SeqCst), 1);
}

// =============================================================================
// Buffer Pool Tests
// =============================================================================

#[tokio::test]
async fn test_pooled_buffers_return_on_drop() {
    let store = open_bytes_store(tiny_log());
    let pool = store.buffer_pool();
    let mut session = store.new_session(MemoryFunctions::new(Arc::clone(&pool))).unwrap();

    session.upsert(1, b"abc".to_vec()).unwrap();

    let (_, first) = session.read_async(1).await.unwrap();
    let (_, second) = session.read_async(1).await.unwrap();
    assert_eq!(pool.outstanding(), 2);

    drop(first);
    assert_eq!(pool.outstanding(), 1);

    second.unwrap().release();
    assert_eq!(pool.outstanding(), 0);
    assert_eq!(pool.idle(), 2);
    assert_eq!(pool.rentals(), 2);
}

#[tokio::test]
async fn test_pooled_buffer_reuse_has_exact_length() {
    let store = open_bytes_store(tiny_log());
    let mut session = store.new_session(MemoryFunctions::new(store.buffer_pool())).unwrap();

    session.upsert(1, b"a much longer value".to_vec()).unwrap();
    session.upsert(2, b"short".to_vec()).unwrap();

    drop(session.read_async(1).await.unwrap());
    let (_, output) = session.read_async(2).await.unwrap();

    assert_eq!(&*output.unwrap(), b"short");
}

// =============================================================================
// Limit Tests
// =============================================================================

#[test]
fn test_capacity_exhausted() {
    let mut config = tiny_log();
    config.capacity = 4;
    let store = open_bytes_store(config);
    let mut session = store.new_session(MemoryFunctions::new(store.buffer_pool())).unwrap();

    for key in 0..4i64 {
        session.upsert(key, vec![1]).unwrap();
    }

    let result = session.upsert(4, vec![1]);
    assert!(matches!(result, Err(SpanKvError::CapacityExhausted { capacity: 4 })));

    // Existing keys can still be updated
    session.upsert(0, vec![2]).unwrap();
}

#[test]
fn test_record_too_large() {
    let store = open_bytes_store(tiny_log());
    let mut session = store.new_session(MemoryFunctions::new(store.buffer_pool())).unwrap();

    let result = session.upsert(1, vec![0u8; 300]);

    assert!(matches!(result, Err(SpanKvError::RecordTooLarge { page_size: 256, .. })));
    assert_eq!(store.entry_count(), 0);
}

#[test]
fn test_capacity_must_be_power_of_two() {
    let mut config = tiny_log();
    config.capacity = 1000;

    let result = LogStore::<Bytes>::open(config, Arc::new(RawBytes));
    assert!(matches!(result, Err(SpanKvError::Config(_))));
}

#[test]
fn test_bad_log_sizing_rejected() {
    let sizings = [(12u8, 10u8), (12, 12), (64, 70), (3, 8), (12, 41)];

    for (page_size_bits, memory_size_bits) in sizings {
        let config = LogStoreConfig {
            capacity: 1 << 10,
            log: LogSettings {
                page_size_bits,
                memory_size_bits,
                device: DeviceKind::Memory,
            },
        };

        let result = LogStore::<Bytes>::open(config.clone(), Arc::new(RawBytes));
        assert!(
            matches!(result, Err(SpanKvError::Config(_))),
            "page bits {}, memory bits {}",
            page_size_bits,
            memory_size_bits
        );

        let result = LogStore::<Bytes>::open_with_device(
            config,
            Arc::new(MemoryDevice::new()),
            Arc::new(RawBytes),
        );
        assert!(matches!(result, Err(SpanKvError::Config(_))));
    }
}

#[test]
fn test_bad_sizing_creates_no_log_file() {
    let temp_dir = TempDir::new().unwrap();
    let config = LogStoreConfig {
        capacity: 1 << 10,
        log: LogSettings {
            page_size_bits: 12,
            memory_size_bits: 10,
            device: DeviceKind::File {
                dir: temp_dir.path().to_path_buf(),
                delete_on_close: false,
            },
        },
    };

    let result = LogStore::<Bytes>::open(config, Arc::new(RawBytes));

    assert!(matches!(result, Err(SpanKvError::Config(_))));
    assert_eq!(std::fs::read_dir(temp_dir.path()).unwrap().count(), 0);
}

#[test]
fn test_store_config_from_config() {
    let config = Config::builder().capacity(64).page_size_bits(9).memory_size_bits(11).build();
    let store_config = LogStoreConfig::from(&config);

    assert_eq!(store_config.capacity, 64);
    assert_eq!(store_config.log.page_size(), 512);
    assert_eq!(store_config.log.memory_pages(), 4);
}

// =============================================================================
// Session & Disposal Tests
// =============================================================================

#[test]
fn test_session_accounting() {
    let store = open_bytes_store(tiny_log());
    let functions = MemoryFunctions::new(store.buffer_pool());

    let a = store.new_session(functions.clone()).unwrap();
    let b = store.new_session(functions).unwrap();
    assert_ne!(a.id(), b.id());
    assert_eq!(store.open_sessions(), 2);

    a.dispose();
    assert_eq!(store.open_sessions(), 1);

    drop(b);
    assert_eq!(store.open_sessions(), 0);
}

#[tokio::test]
async fn test_operations_fail_after_dispose() {
    let store = open_bytes_store(tiny_log());
    let mut session = store.new_session(MemoryFunctions::new(store.buffer_pool())).unwrap();
    session.upsert(1, b"x".to_vec()).unwrap();

    store.dispose().unwrap();

    assert!(store.is_disposed());
    assert!(matches!(session.upsert(2, b"y".to_vec()), Err(SpanKvError::Disposed)));
    assert!(matches!(session.read_async(1).await, Err(SpanKvError::Disposed)));
    assert!(matches!(
        store.new_session(MemoryFunctions::new(store.buffer_pool())),
        Err(SpanKvError::Disposed)
    ));

    // Second dispose is a no-op
    store.dispose().unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_many_sessions_concurrently() {
    let store = open_bytes_store(LogStoreConfig {
        capacity: 1 << 12,
        log: LogSettings {
            page_size_bits: 10,
            memory_size_bits: 12,
            device: DeviceKind::Memory,
        },
    });

    let mut handles = Vec::new();
    for worker in 0..8i64 {
        let store = Arc::clone(&store);
        handles.push(tokio::spawn(async move {
            let mut session = store.new_session(MemoryFunctions::new(store.buffer_pool())).unwrap();
            for i in 0..250i64 {
                let key = worker * 1000 + i;
                session.upsert(key, key.to_le_bytes().to_vec()).unwrap();
            }
            for i in 0..250i64 {
                let key = worker * 1000 + i;
                let (status, output) = session.read_async(key).await.unwrap();
                assert_eq!(status, Status::Found);
                assert_eq!(&*output.unwrap(), &key.to_le_bytes());
            }
        }));
    }

    for handle in handles {
        handle.await.unwrap();
    }

    assert_eq!(store.entry_count(), 2000);
    assert_eq!(store.open_sessions(), 0);
    assert_eq!(store.buffer_pool().outstanding(), 0);
}

// =============================================================================
// Device Tests
// =============================================================================

#[test]
fn test_memory_device_append_and_read() {
    let device = MemoryDevice::new();

    assert_eq!(device.append(b"hello").unwrap(), 0);
    assert_eq!(device.append(b"world").unwrap(), 5);
    assert_eq!(device.len(), 10);
    assert_eq!(device.read_at(5, 5).unwrap(), b"world");

    let past_end = device.read_at(8, 5);
    assert!(matches!(past_end, Err(SpanKvError::Corruption(_))));

    device.close().unwrap();
    assert!(matches!(device.append(b"x"), Err(SpanKvError::Disposed)));
}

#[tokio::test]
async fn test_file_device_round_trip_and_delete_on_close() {
    let temp_dir = TempDir::new().unwrap();
    let config = LogStoreConfig {
        capacity: 1 << 12,
        log: LogSettings {
            page_size_bits: 8,
            memory_size_bits: 9,
            device: DeviceKind::File {
                dir: temp_dir.path().to_path_buf(),
                delete_on_close: true,
            },
        },
    };
    let store = open_bytes_store(config);
    let mut session = store.new_session(SpanByteFunctions::new(store.buffer_pool())).unwrap();

    for key in 0..100i64 {
        let value = format!("file-{}", key);
        session.upsert(key, SpanByte::from_slice(value.as_bytes())).unwrap();
    }
    assert!(store.pages_flushed() > 0);
    assert_eq!(std::fs::read_dir(temp_dir.path()).unwrap().count(), 1);

    for key in 0..100i64 {
        let (_, output) = session.read_async(key).await.unwrap();
        assert_eq!(&*output.unwrap(), format!("file-{}", key).as_bytes());
    }

    drop(session);
    store.dispose().unwrap();

    assert_eq!(std::fs::read_dir(temp_dir.path()).unwrap().count(), 0);
}

#[test]
fn test_file_device_kept_when_not_deleting() {
    let temp_dir = TempDir::new().unwrap();
    let device = spankv::engine::FileDevice::create_in(temp_dir.path(), false).unwrap();
    let path = device.path().to_path_buf();

    device.append(b"page bytes").unwrap();
    assert_eq!(device.read_at(5, 5).unwrap(), b"bytes");
    device.close().unwrap();

    assert!(path.exists());
    assert!(matches!(device.read_at(0, 1), Err(SpanKvError::Disposed)));
}
