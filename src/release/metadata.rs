//! Package status and maintainer metadata shown next to each package

use std::collections::HashMap;
use std::path::Path;

#[cfg(test)]
use mockall::automock;

use serde::Deserialize;
use thiserror::Error;
use tracing::warn;

use crate::release::manifest::ManifestError;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MetadataError {
    #[error("Malformed metadata for {package}: {reason}")]
    Malformed { package: String, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Maintainer {
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PackageMetadata {
    /// e.g. developed, maintained, unmaintained, end-of-life
    pub status: Option<String>,
    pub status_description: Option<String>,
    pub maintainers: Vec<Maintainer>,
}

/// Pre-fetched metadata lookup used while rendering
#[cfg_attr(test, automock)]
pub trait MetadataLookup {
    /// `Ok(None)` when nothing is known about the package
    fn lookup_metadata(&self, package: &str) -> Result<Option<PackageMetadata>, MetadataError>;
}

/// Metadata loaded from a JSON object keyed by package name
#[derive(Debug, Default)]
pub struct JsonMetadata {
    entries: HashMap<String, Result<PackageMetadata, String>>,
}

impl JsonMetadata {
    pub fn load(path: &Path) -> Result<Self, ManifestError> {
        let content = std::fs::read_to_string(path).map_err(|source| ManifestError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&content)
    }

    /// Parse the whole document; individual entries that do not match the
    /// metadata shape are kept and reported as malformed on lookup
    pub fn from_json(content: &str) -> Result<Self, ManifestError> {
        let raw: HashMap<String, serde_json::Value> = serde_json::from_str(content)?;

        let entries = raw
            .into_iter()
            .map(|(name, value)| {
                let parsed = serde_json::from_value::<PackageMetadata>(value).map_err(|e| {
                    warn!("Malformed metadata for {}: {}", name, e);
                    e.to_string()
                });
                (name, parsed)
            })
            .collect();

        Ok(Self { entries })
    }
}

impl MetadataLookup for JsonMetadata {
    fn lookup_metadata(&self, package: &str) -> Result<Option<PackageMetadata>, MetadataError> {
        match self.entries.get(package) {
            None => Ok(None),
            Some(Ok(metadata)) => Ok(Some(metadata.clone())),
            Some(Err(reason)) => Err(MetadataError::Malformed {
                package: package.to_string(),
                reason: reason.clone(),
            }),
        }
    }
}
