//! Network-attached cache for game-engine build artifacts.
//!
//! Build machines upload and download per-asset artifacts (binary payload,
//! metadata blob, optional resource blob) keyed by a 32-byte identifier:
//! a 16-byte asset GUID followed by a 16-byte content hash. Artifacts are
//! persisted under a content-addressed directory layout, published with a
//! temp-file-plus-atomic-rename step, and small recent uploads are mirrored
//! in a bounded in-memory tier.

pub mod config;
pub mod error;
pub mod handle;
pub mod id;
pub mod mcache;
pub mod server;
pub mod store;
pub mod wire;

pub use config::Config;
pub use error::CacheError;
pub use id::{AssetId, Variant};
pub use server::CacheServer;
