//! Cache pass-through for upstream requests
//!
//! `CacheOrchestrator` serves a request from the store when the entry is
//! fresh, and otherwise fetches from upstream and writes the result back.
//!
//! Requests are not coalesced: two concurrent requests for the same key can
//! both miss, both fetch and both write. The last write wins.

use std::sync::Arc;

use serde_json::Value;
use tokio::task::JoinHandle;

use super::clock::{Clock, SystemClock};
use super::freshness::Ttl;
use super::key::{derive_key, CacheKey, Params};
use super::store::{CacheEntry, CacheError, CacheStore};
use crate::upstream::{Upstream, UpstreamError};

/// Where a served payload came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// A fresh entry in the store
    Cache,
    /// An upstream fetch, because the entry was missing
    Miss,
    /// An upstream fetch, because the entry had expired
    Stale,
}

/// A cache write running in the background
///
/// Dropping the handle does not cancel the write.
#[derive(Debug)]
pub struct PendingWrite {
    key: CacheKey,
    handle: JoinHandle<Result<(), CacheError>>,
}

impl PendingWrite {
    /// The key being written
    pub fn key(&self) -> &CacheKey {
        &self.key
    }

    /// Waits for the write to finish
    pub async fn wait(self) -> Result<(), CacheError> {
        self.handle
            .await
            .map_err(|e| CacheError::Task(e.to_string()))?
    }
}

/// The result of serving a request
#[derive(Debug)]
pub struct Served {
    pub payload: Value,
    pub origin: Origin,
    /// Present when the payload was fetched and is being written to the store
    pub write: Option<PendingWrite>,
}

/// Serves upstream responses through a cache
#[derive(Clone)]
pub struct CacheOrchestrator {
    store: Arc<dyn CacheStore>,
    upstream: Arc<dyn Upstream>,
    ttl: Ttl,
    clock: Arc<dyn Clock>,
}

impl CacheOrchestrator {
    /// Creates an orchestrator that reads the system clock
    pub fn new(store: Arc<dyn CacheStore>, upstream: Arc<dyn Upstream>, ttl: Ttl) -> Self {
        Self {
            store,
            upstream,
            ttl,
            clock: Arc::new(SystemClock),
        }
    }

    /// Uses a custom time source
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn ttl(&self) -> Ttl {
        self.ttl
    }

    /// Serves a request at the current time
    pub async fn serve(&self, endpoint: &str, params: &Params) -> Result<Served, UpstreamError> {
        self.serve_at(endpoint, params, self.clock.now()).await
    }

    /// Serves a request as of `now` (seconds since the epoch)
    ///
    /// Upstream errors are returned as-is and never written to the store.
    /// Store read failures count as a miss; store write failures are logged by
    /// the write task and do not affect the returned payload.
    pub async fn serve_at(
        &self,
        endpoint: &str,
        params: &Params,
        now: i64,
    ) -> Result<Served, UpstreamError> {
        let key = derive_key(endpoint, params);
        tracing::debug!(endpoint, %key, "cache pass");

        let entry = match self.store.get(&key).await {
            Ok(entry) => entry,
            Err(e) => {
                tracing::debug!(%key, error = %e, "cache read failed, treating as miss");
                None
            }
        };

        let origin = match entry {
            Some(entry) if self.ttl.is_fresh(Some(entry.fetched_at), now) => {
                tracing::debug!(%key, fetched_at = entry.fetched_at, "cache hit");
                return Ok(Served {
                    payload: entry.payload,
                    origin: Origin::Cache,
                    write: None,
                });
            }
            Some(entry) => {
                tracing::debug!(%key, fetched_at = entry.fetched_at, ttl = %self.ttl, "cache entry stale");
                Origin::Stale
            }
            None => {
                tracing::debug!(%key, "no cache entry");
                Origin::Miss
            }
        };

        let payload = match self.upstream.fetch(endpoint, params).await {
            Ok(payload) => payload,
            Err(e) => {
                tracing::debug!(endpoint, status = e.status(), error = %e, "upstream request failed");
                return Err(e);
            }
        };

        let entry = CacheEntry {
            fetched_at: now,
            payload: payload.clone(),
        };
        let write = self.spawn_write(key, entry);

        Ok(Served {
            payload,
            origin,
            write: Some(write),
        })
    }

    fn spawn_write(&self, key: CacheKey, entry: CacheEntry) -> PendingWrite {
        let store = Arc::clone(&self.store);
        let task_key = key.clone();

        let handle = tokio::spawn(async move {
            let result = store.put(&task_key, &entry).await;
            match &result {
                Ok(()) => tracing::debug!(key = %task_key, "cache file written"),
                Err(e) => tracing::error!(key = %task_key, error = %e, "unable to write cache file"),
            }
            result
        });

        PendingWrite { key, handle }
    }
}
