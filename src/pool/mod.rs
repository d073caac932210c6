//! Session Pool Module
//!
//! Hands out exactly one engine session per in-flight operation.
//!
//! ## Responsibilities
//! - Reuse idle sessions, create new ones lazily through a factory
//! - Return sessions on every exit path (RAII lease)
//! - Drain and close on store disposal
//!
//! ## Ownership
//! A session is moved out of the idle queue on acquire and moved back when
//! its `SessionLease` drops. While leased, nothing else can reach it.

mod session_pool;

pub use session_pool::{SessionFactory, SessionLease, SessionPool};
