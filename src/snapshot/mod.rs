//! Version source layer: where observed package versions come from
//!
//! # Modules
//!
//! - [`index`]: Debian `Packages` index parser
//! - [`source`]: `VersionSource` trait and an in-memory implementation
//! - [`store`]: SQLite-backed snapshot store
//! - [`loader`]: Concurrent loading of snapshot trees into the store
//! - [`error`]: Error types for lookups, storage and loading

pub mod error;
pub mod index;
pub mod loader;
pub mod source;
pub mod store;

pub use error::{LoadError, SourceError, StoreError};
pub use source::{PackageRecord, StaticSource, VersionSource};
pub use store::SnapshotStore;
