//! Release manifest: the ordered list of packages a release expects
//!
//! Format:
//!
//! ```json
//! {
//!   "release": "groovy",
//!   "packages": [
//!     { "name": "roscpp", "version": "1.9.41", "kind": "source-built" },
//!     { "name": "ros_tutorials", "kind": "prebuilt" }
//!   ]
//! }
//! ```

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;
use tracing::info;

use crate::status::types::{Package, PackageKind};

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("Failed to read manifest {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse manifest: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Package {0} is declared more than once")]
    DuplicatePackage(String),

    #[error("Package entry {0} has an empty name")]
    EmptyName(usize),
}

#[derive(Debug, Deserialize)]
struct ManifestFile {
    #[serde(default)]
    release: Option<String>,
    packages: Vec<ManifestPackage>,
}

#[derive(Debug, Deserialize)]
struct ManifestPackage {
    name: String,
    #[serde(default)]
    version: Option<String>,
    #[serde(default)]
    kind: PackageKind,
}

/// Ordered, duplicate-free list of packages expected by a release
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Registry {
    release: Option<String>,
    packages: Vec<Package>,
}

impl Registry {
    /// Build a registry, rejecting empty and duplicate names
    pub fn new(packages: Vec<Package>) -> Result<Self, ManifestError> {
        let mut seen = HashSet::new();
        for (i, package) in packages.iter().enumerate() {
            if package.name.is_empty() {
                return Err(ManifestError::EmptyName(i));
            }
            if !seen.insert(package.name.as_str()) {
                return Err(ManifestError::DuplicatePackage(package.name.clone()));
            }
        }

        Ok(Self {
            release: None,
            packages,
        })
    }

    pub fn load(path: &Path) -> Result<Self, ManifestError> {
        let content = std::fs::read_to_string(path).map_err(|source| ManifestError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let registry = Self::from_json(&content)?;
        info!(
            "Loaded {} packages from manifest {:?}",
            registry.packages.len(),
            path
        );
        Ok(registry)
    }

    pub fn from_json(content: &str) -> Result<Self, ManifestError> {
        let file: ManifestFile = serde_json::from_str(content)?;

        let packages = file
            .packages
            .into_iter()
            .map(|p| Package {
                name: p.name,
                version: p.version.filter(|v| !v.is_empty()),
                kind: p.kind,
            })
            .collect();

        let mut registry = Self::new(packages)?;
        registry.release = file.release;
        Ok(registry)
    }

    /// Release named by the manifest, if any
    pub fn release(&self) -> Option<&str> {
        self.release.as_deref()
    }

    pub fn list_packages(&self) -> &[Package] {
        &self.packages
    }

    pub fn len(&self) -> usize {
        self.packages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }
}

/// Index name of a release package: prefix plus the name with `_` turned into `-`
pub fn debian_name(prefix: &str, name: &str) -> String {
    format!("{}{}", prefix, name.replace('_', "-"))
}
