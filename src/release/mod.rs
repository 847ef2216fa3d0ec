//! Release layer: what the release expects
//!
//! - [`manifest`]: ordered package registry loaded from a release manifest
//! - [`metadata`]: optional status and maintainer metadata per package

pub mod manifest;
pub mod metadata;

pub use manifest::{ManifestError, Registry, debian_name};
pub use metadata::{JsonMetadata, MetadataError, MetadataLookup, PackageMetadata};
