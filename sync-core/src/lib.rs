//! # sync-core
//!
//! Pure logic for chatsync (no I/O, instant tests).
//!
//! This crate implements the caching and invalidation rules of the realtime
//! sync layer without any network access, timers or logging, enabling fast
//! unit tests.
//!
//! ## Design Philosophy
//!
//! All modules in this crate are **pure** - they take input and produce output
//! without side effects. Time is an input too: cache operations accept an
//! explicit `Instant` where expiry matters.
//!
//! The actual I/O (subscribing to change streams, publishing presence,
//! sleeping between batches) is performed by `sync-client`, which calls into
//! these modules.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod batch;
pub mod cache;
pub mod invalidation;
pub mod typing;

pub use batch::{chunk_count, chunk_ranges};
pub use cache::{BoundedCache, CacheEntry, CacheStats};
pub use invalidation::plan;
pub use typing::typing_users;
