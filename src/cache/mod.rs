//! Response cache for upstream API requests
//!
//! Responses are stored one JSON file per request under a cache directory,
//! stamped with the time they were fetched. A request is answered from the
//! cache while its entry is younger than the configured TTL and fetched from
//! upstream otherwise.

pub mod clock;
pub mod freshness;
pub mod key;
pub mod orchestrator;
pub mod store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use freshness::{is_fresh, parse_duration, DurationError, Ttl};
pub use key::{canonical_query, derive_key, CacheKey, Params};
pub use orchestrator::{CacheOrchestrator, Origin, PendingWrite, Served};
pub use store::{default_cache_dir, CacheEntry, CacheError, CacheStore, FsCacheStore, MemoryCacheStore};
