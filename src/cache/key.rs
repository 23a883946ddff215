//! Cache key derivation
//!
//! Maps an endpoint and its query parameters to a deterministic,
//! filesystem-safe file name. Parameters are serialized in sorted order so two
//! requests that differ only in parameter order share a cache entry.
//!
//! Collisions are not detected: slugification folds punctuation and case, so
//! e.g. `screen_name=a-b` and `screen_name=a_b` map to the same key.

use std::collections::BTreeMap;
use std::fmt;

use sha2::{Digest, Sha256};
use url::form_urlencoded;

/// Query parameters forwarded to the upstream API
///
/// A `BTreeMap` keeps parameters ordered by name, which is what makes key
/// derivation independent of the order they arrived in.
pub type Params = BTreeMap<String, String>;

/// Suffix appended to every cache file name
const KEY_SUFFIX: &str = ".json";

/// Longest slug kept verbatim; longer ones are cut and tagged with a digest
const MAX_SLUG_LEN: usize = 200;

/// Hex digits of the request digest appended to a cut slug
const DIGEST_LEN: usize = 16;

/// Filesystem-safe identifier for a cached response
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    /// The key as a file name, including the `.json` suffix
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Serializes parameters as a urlencoded query string, sorted by name
pub fn canonical_query(params: &Params) -> String {
    form_urlencoded::Serializer::new(String::new())
        .extend_pairs(params.iter())
        .finish()
}

/// Derives the cache key for an endpoint and its parameters
///
/// The endpoint and canonical query are joined, slugified (lowercase,
/// non-alphanumeric runs collapsed to `-`) and suffixed with `.json`.
///
/// Slugs longer than `MAX_SLUG_LEN` are cut and followed by a SHA-256 digest
/// of the whole request, which keeps the name under the usual 255-byte file
/// name limit.
pub fn derive_key(endpoint: &str, params: &Params) -> CacheKey {
    let query = canonical_query(params);
    let request = if query.is_empty() {
        endpoint.to_string()
    } else {
        format!("{}?{}", endpoint, query)
    };

    let mut name = slug::slugify(&request);
    if name.len() > MAX_SLUG_LEN {
        // slugs are ASCII, so any byte index is a char boundary
        name.truncate(MAX_SLUG_LEN);
        let stem = name.trim_end_matches('-').len();
        name.truncate(stem);
        name.push('-');
        name.push_str(&request_digest(&request));
    }
    if !name.ends_with(KEY_SUFFIX) {
        name.push_str(KEY_SUFFIX);
    }
    CacheKey(name)
}

fn request_digest(request: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(request.as_bytes());
    let digest = hasher.finalize().to_vec();
    hex::encode(&digest[..DIGEST_LEN / 2])
}
