//! Caches shared by the Zarr-backed sources.

mod chunk_cache;

pub use chunk_cache::{hash_path, ChunkCache, ChunkKey};
