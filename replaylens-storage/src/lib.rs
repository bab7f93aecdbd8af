//! replaylens storage
//!
//! The [`ArtifactStore`] trait plus an in-memory implementation. The
//! Postgres-backed store lives with the API server.

pub mod codec;
pub mod memory;
pub mod store;

pub use codec::{gunzip, gzip, gzip_json};
pub use memory::InMemoryArtifactStore;
pub use store::{ArtifactKey, ArtifactRecord, ArtifactStore, NewArtifactRecord};
