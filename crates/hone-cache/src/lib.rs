//! Content-addressed job output cache for Hone.
//!
//! Blobs are stored under the SHA-256 of their bytes; a manifest per job
//! cache key lists which blobs a job produced. [`CacheJob`] wraps a job
//! handler so a job whose key has a complete manifest is restored instead of
//! run.

pub mod compression;
pub mod decorator;
pub mod filesystem;
pub mod keys;
pub mod s3;

pub use compression::{compress, decompress};
pub use decorator::CacheJob;
pub use filesystem::FileCache;
pub use keys::{fingerprint, job_cache_key, sanitize_key};
pub use s3::S3Cache;
