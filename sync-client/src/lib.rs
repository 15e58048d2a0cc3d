//! # sync-client
//!
//! Realtime sync and caching client for chatsync.
//!
//! This is the library applications use to keep cached query results
//! consistent with the remote datastore and to show who is typing.
//!
//! ## Features
//!
//! - **Bounded caches**: named LRU + TTL caches handed out by a registry
//! - **Compute-through**: [`CacheBridge`] fronts async fetches with a cache
//! - **Batching**: [`BatchExecutor`] throttles bulk async work in chunks
//! - **Invalidation**: [`ChangeStreamSubscriber`] turns row changes into
//!   targeted invalidations
//! - **Presence**: [`PresenceChannel`] tracks typing per conversation
//! - **Transport abstraction**: pluggable change-stream and presence
//!   transports, with mocks for tests
//!
//! ## Example
//!
//! ```ignore
//! use chatsync_client::{CacheRegistry, ChangeStreamSubscriber, QueryCache};
//!
//! let registry = CacheRegistry::from_config(&config.caches);
//! let queries = Arc::new(QueryCache::new(registry.cache("queries")?));
//!
//! let subscriber = ChangeStreamSubscriber::new(stream, user_id, queries.clone());
//! subscriber.start().await?;
//!
//! let conversations = queries
//!     .fetch(InvalidationTarget::conversations(), || api.conversations())
//!     .await?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

mod lock;

pub mod batch;
pub mod bridge;
pub mod config;
pub mod invalidation;
pub mod presence;
pub mod registry;
pub mod shared;
pub mod subscriber;
pub mod transport;

pub use batch::BatchExecutor;
pub use bridge::{CacheBridge, QueryCache};
pub use config::{Config, ConfigError};
pub use invalidation::{ChannelSink, InvalidationSink, RecordingSink};
pub use presence::{PresenceChannel, PresenceIdentity};
pub use registry::{CachePolicy, CacheRegistry, RegistryError};
pub use shared::SharedCache;
pub use subscriber::ChangeStreamSubscriber;
pub use transport::{
    ChangeStream, MockChangeStream, MockPresenceHub, PresenceTransport, TransportError,
};
