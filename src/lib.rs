//! Twitter Cache Proxy Library
//!
//! A caching pass-through proxy for a small set of Twitter API endpoints.
//! Responses are kept on disk and served until they exceed the configured TTL.

pub mod cache;
pub mod cli;
pub mod server;
pub mod telemetry;
pub mod upstream;
