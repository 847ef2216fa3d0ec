//! Version source abstraction over per-(channel, platform) index snapshots

use std::collections::{BTreeSet, HashMap};

#[cfg(test)]
use mockall::automock;

use crate::snapshot::error::SourceError;
use crate::snapshot::index::IndexEntry;
use crate::status::types::Platform;

/// What an index knows about one binary package
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageRecord {
    /// Raw binary package version
    pub version: String,
    /// Version of the source package the binary was built from
    pub source_version: String,
}

impl PackageRecord {
    pub fn new(version: &str, source_version: &str) -> Self {
        Self {
            version: version.to_string(),
            source_version: source_version.to_string(),
        }
    }
}

/// Trait for answering "which version of package P is in channel C on platform D"
#[cfg_attr(test, automock)]
pub trait VersionSource: Send + Sync {
    /// Look up a package in the snapshot of one (channel, platform).
    ///
    /// # Returns
    /// * `Ok(Some(record))` - exactly one index entry matches
    /// * `Ok(None)` - the package is not in the snapshot
    /// * `Err(SourceError::Unavailable)` - there is no snapshot for (channel, platform)
    /// * `Err(SourceError::Ambiguous)` - more than one entry matches
    fn lookup(
        &self,
        package: &str,
        channel: &str,
        platform: &Platform,
    ) -> Result<Option<PackageRecord>, SourceError>;

    /// All distinct package names present in any snapshot, sorted
    fn package_names(&self) -> Result<Vec<String>, SourceError>;
}

/// In-memory version source holding already loaded snapshots
#[derive(Debug, Default)]
pub struct StaticSource {
    snapshots: HashMap<(String, Platform), HashMap<String, Vec<PackageRecord>>>,
}

impl StaticSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add (or replace) the snapshot of one (channel, platform)
    pub fn with_snapshot(
        mut self,
        channel: &str,
        platform: Platform,
        entries: Vec<IndexEntry>,
    ) -> Self {
        self.insert_snapshot(channel, platform, entries);
        self
    }

    pub fn insert_snapshot(&mut self, channel: &str, platform: Platform, entries: Vec<IndexEntry>) {
        let mut by_name: HashMap<String, Vec<PackageRecord>> = HashMap::new();
        for entry in entries {
            by_name.entry(entry.package).or_default().push(entry.record);
        }
        self.snapshots.insert((channel.to_string(), platform), by_name);
    }
}

impl VersionSource for StaticSource {
    fn lookup(
        &self,
        package: &str,
        channel: &str,
        platform: &Platform,
    ) -> Result<Option<PackageRecord>, SourceError> {
        let snapshot = self
            .snapshots
            .get(&(channel.to_string(), platform.clone()))
            .ok_or_else(|| SourceError::Unavailable {
                channel: channel.to_string(),
                platform: platform.key(),
            })?;

        match snapshot.get(package).map(Vec::as_slice) {
            None | Some([]) => Ok(None),
            Some([record]) => Ok(Some(record.clone())),
            Some(records) => Err(SourceError::Ambiguous {
                package: package.to_string(),
                channel: channel.to_string(),
                platform: platform.key(),
                candidates: records.len(),
            }),
        }
    }

    fn package_names(&self) -> Result<Vec<String>, SourceError> {
        let names: BTreeSet<&String> = self
            .snapshots
            .values()
            .flat_map(|snapshot| snapshot.keys())
            .collect();
        Ok(names.into_iter().cloned().collect())
    }
}
