//! Matrix builder: registry × version source → reconciliation matrix

use std::collections::{BTreeMap, BTreeSet, HashSet};

use tracing::{info, warn};

use crate::config::StatusConfig;
use crate::release::manifest::{Registry, debian_name};
use crate::snapshot::error::SourceError;
use crate::snapshot::source::{PackageRecord, VersionSource};
use crate::status::normalize::normalize;
use crate::status::types::{Cell, Matrix, PackageKind, Platform, Row};

/// Builds the package × (channel, platform) matrix for one run
#[derive(Debug, Clone)]
pub struct MatrixBuilder {
    channels: Vec<String>,
    platforms: Vec<Platform>,
    release_prefix: String,
    foreign_prefixes: Vec<String>,
    source_architecture: Option<String>,
}

/// Tracks (channel, platform) snapshots found unavailable during one build
#[derive(Default)]
struct UnavailableColumns(HashSet<(String, Platform)>);

impl UnavailableColumns {
    fn contains(&self, channel: &str, platform: &Platform) -> bool {
        self.0.contains(&(channel.to_string(), platform.clone()))
    }

    fn insert(&mut self, channel: &str, platform: &Platform) {
        self.0.insert((channel.to_string(), platform.clone()));
    }
}

impl MatrixBuilder {
    pub fn new(channels: Vec<String>, platforms: Vec<Platform>) -> Self {
        Self {
            channels,
            platforms,
            release_prefix: String::new(),
            foreign_prefixes: Vec::new(),
            source_architecture: None,
        }
    }

    pub fn from_config(config: &StatusConfig) -> Self {
        Self::new(config.channels.clone(), config.platforms())
            .with_release_prefix(&config.release_prefix())
            .with_foreign_prefixes(config.foreign_prefixes.clone())
            .with_source_architecture(config.source_architecture())
    }

    /// Index-name prefix of the active release
    pub fn with_release_prefix(mut self, prefix: &str) -> Self {
        self.release_prefix = prefix.to_string();
        self
    }

    /// Prefixes of other releases; their packages are never synthesized
    pub fn with_foreign_prefixes(mut self, prefixes: Vec<String>) -> Self {
        self.foreign_prefixes = prefixes;
        self
    }

    /// Architecture whose binary records provide the source column.
    /// Without one, the first architecture of each distribution is used.
    pub fn with_source_architecture(mut self, arch: Option<&str>) -> Self {
        self.source_architecture = arch.map(str::to_string);
        self
    }

    /// Build the matrix.
    ///
    /// Registry packages come first in registry order, followed by packages
    /// seen in the snapshots under the release prefix but missing from the
    /// registry, sorted by name. Lookup failures never abort the build; the
    /// affected cells are left absent.
    pub fn build<S: VersionSource + ?Sized>(&self, registry: &Registry, source: &S) -> Matrix {
        let mut unavailable = UnavailableColumns::default();
        let mut rows = Vec::with_capacity(registry.len());

        for package in registry.list_packages() {
            let index_name = debian_name(&self.release_prefix, &package.name);
            rows.push(Row {
                name: package.name.clone(),
                version: package.version.clone(),
                kind: package.kind,
                cells: self.row_cells(source, &index_name, &mut unavailable),
            });
        }

        let undeclared = self.undeclared_packages(registry, source);
        let undeclared_count = undeclared.len();
        for (name, index_name) in undeclared {
            let cells = self.row_cells(source, &index_name, &mut unavailable);
            rows.push(Row {
                name,
                version: infer_version(&cells),
                kind: PackageKind::Unknown,
                cells,
            });
        }

        info!(
            "Built matrix with {} declared and {} undeclared packages over {} columns",
            registry.len(),
            undeclared_count,
            self.channels.len() * self.platforms.len()
        );

        Matrix::new(self.channels.clone(), self.platforms.clone(), rows)
    }

    /// Packages of the active release present in the snapshots but not in the
    /// registry, as name → index name, sorted by name
    fn undeclared_packages<S: VersionSource + ?Sized>(
        &self,
        registry: &Registry,
        source: &S,
    ) -> BTreeMap<String, String> {
        let index_names = source
            .package_names()
            .inspect_err(|e| warn!("Cannot list snapshot packages, skipping undeclared ones: {}", e))
            .unwrap_or_default();

        let declared_names: HashSet<&str> = registry
            .list_packages()
            .iter()
            .map(|p| p.name.as_str())
            .collect();
        let declared_index_names: HashSet<String> = registry
            .list_packages()
            .iter()
            .map(|p| debian_name(&self.release_prefix, &p.name))
            .collect();
        let foreign_prefixes: Vec<&String> = self
            .foreign_prefixes
            .iter()
            .filter(|prefix| **prefix != self.release_prefix)
            .collect();

        index_names
            .into_iter()
            .filter(|index_name| {
                !foreign_prefixes
                    .iter()
                    .any(|prefix| index_name.starts_with(prefix.as_str()))
            })
            .filter(|index_name| !declared_index_names.contains(index_name))
            .filter_map(|index_name| {
                let name = index_name.strip_prefix(&self.release_prefix)?.to_string();
                if name.is_empty() || declared_names.contains(name.as_str()) {
                    return None;
                }
                Some((name, index_name))
            })
            .collect()
    }

    fn row_cells<S: VersionSource + ?Sized>(
        &self,
        source: &S,
        index_name: &str,
        unavailable: &mut UnavailableColumns,
    ) -> Vec<Cell> {
        let mut cells = Vec::with_capacity(self.platforms.len() * self.channels.len());
        for platform in &self.platforms {
            for channel in &self.channels {
                cells.push(self.cell(source, index_name, channel, platform, unavailable));
            }
        }
        cells
    }

    fn cell<S: VersionSource + ?Sized>(
        &self,
        source: &S,
        index_name: &str,
        channel: &str,
        platform: &Platform,
        unavailable: &mut UnavailableColumns,
    ) -> Cell {
        match platform {
            Platform::Binary { .. } => {
                lookup_record(source, index_name, channel, platform, unavailable)
                    .map(|record| normalize(&record.version).to_string())
            }
            Platform::Source { distro } => {
                let binary = self.source_reference_platform(distro)?;
                lookup_record(source, index_name, channel, &binary, unavailable)
                    .map(|record| normalize(&record.source_version).to_string())
            }
        }
    }

    /// Binary platform whose records stand in for the source column of `distro`
    fn source_reference_platform(&self, distro: &str) -> Option<Platform> {
        match &self.source_architecture {
            Some(arch) => Some(Platform::binary(distro, arch)),
            None => self
                .platforms
                .iter()
                .find(|p| !p.is_source() && p.distro() == distro)
                .cloned(),
        }
    }
}

fn lookup_record<S: VersionSource + ?Sized>(
    source: &S,
    index_name: &str,
    channel: &str,
    platform: &Platform,
    unavailable: &mut UnavailableColumns,
) -> Option<PackageRecord> {
    if unavailable.contains(channel, platform) {
        return None;
    }

    match source.lookup(index_name, channel, platform) {
        Ok(record) => record,
        Err(e @ SourceError::Unavailable { .. }) => {
            warn!("{}; treating column as empty", e);
            unavailable.insert(channel, platform);
            None
        }
        Err(e @ SourceError::Ambiguous { .. }) => {
            warn!("{}; treating as absent", e);
            None
        }
        Err(e) => {
            warn!(
                "Lookup failed for {} in {}/{}: {}",
                index_name, channel, platform, e
            );
            None
        }
    }
}

/// Version shared by every present cell, when there is exactly one
pub fn infer_version(cells: &[Cell]) -> Option<String> {
    let unique: BTreeSet<&str> = cells.iter().flatten().map(String::as_str).collect();
    if unique.len() == 1 {
        unique.into_iter().next().map(str::to_string)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::index::IndexEntry;
    use crate::snapshot::source::{MockVersionSource, StaticSource};
    use crate::status::types::{Package, platforms_for};
    use rstest::rstest;

    const PREFIX: &str = "ros-groovy-";

    fn entry(package: &str, version: &str) -> IndexEntry {
        IndexEntry {
            package: package.to_string(),
            record: PackageRecord::new(version, version),
        }
    }

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    fn builder(channels: &[&str], distros: &[&str], arches: &[&str]) -> MatrixBuilder {
        MatrixBuilder::new(
            strings(channels),
            platforms_for(&strings(distros), &strings(arches)),
        )
        .with_release_prefix(PREFIX)
    }

    fn registry(packages: &[(&str, Option<&str>, PackageKind)]) -> Registry {
        Registry::new(
            packages
                .iter()
                .map(|(name, version, kind)| Package::new(name, *version, *kind))
                .collect(),
        )
        .unwrap()
    }

    #[test]
    fn build_has_one_row_per_registry_package_with_full_width() {
        let builder = builder(&["building", "public"], &["quantal", "precise"], &["i386", "amd64"]);
        let registry = registry(&[
            ("alpha", Some("1.0"), PackageKind::SourceBuilt),
            ("beta", None, PackageKind::Prebuilt),
        ]);

        let matrix = builder.build(&registry, &StaticSource::new());

        let names: Vec<&str> = matrix.rows().iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["alpha", "beta"]);
        for row in matrix.rows() {
            assert_eq!(row.cells.len(), 2 * 6);
            assert!(row.cells.iter().all(Option::is_none));
        }
    }

    #[test]
    fn build_normalizes_binary_cells_and_derives_source_cell_from_binary_record() {
        let amd64 = Platform::binary("quantal", "amd64");
        let source = StaticSource::new()
            .with_snapshot(
                "building",
                amd64.clone(),
                vec![IndexEntry {
                    package: "ros-groovy-alpha".to_string(),
                    record: PackageRecord::new("1.0-1build2+0600", "1.0-0quantal"),
                }],
            )
            .with_snapshot("public", amd64, vec![]);
        let builder = builder(&["building", "public"], &["quantal"], &["amd64"]);
        let registry = registry(&[("alpha", Some("1.0"), PackageKind::SourceBuilt)]);

        let matrix = builder.build(&registry, &source);

        assert_eq!(
            matrix.rows()[0].cells,
            vec![
                Some("1.0-0".to_string()),
                None,
                Some("1.0-1".to_string()),
                None
            ]
        );
    }

    #[test]
    fn build_uses_configured_source_architecture() {
        let source = StaticSource::new()
            .with_snapshot(
                "public",
                Platform::binary("quantal", "i386"),
                vec![entry("ros-groovy-alpha", "1.0-1")],
            )
            .with_snapshot(
                "public",
                Platform::binary("quantal", "amd64"),
                vec![entry("ros-groovy-alpha", "1.1-1")],
            );
        let builder = builder(&["public"], &["quantal"], &["i386", "amd64"])
            .with_source_architecture(Some("amd64"));
        let registry = registry(&[("alpha", None, PackageKind::SourceBuilt)]);

        let matrix = builder.build(&registry, &source);

        assert_eq!(matrix.rows()[0].cells[0], Some("1.1-1".to_string()));
    }

    #[test]
    fn build_appends_undeclared_packages_sorted_after_registry() {
        let amd64 = Platform::binary("quantal", "amd64");
        let source = StaticSource::new().with_snapshot(
            "public",
            amd64,
            vec![
                entry("ros-groovy-zeta", "2.0"),
                entry("ros-groovy-alpha", "1.0"),
                entry("ros-groovy-gamma", "3.0"),
                entry("ros-fuerte-old", "0.1"),
                entry("unrelated", "9.9"),
            ],
        );
        let builder = builder(&["public"], &["quantal"], &["amd64"])
            .with_foreign_prefixes(strings(&["ros-fuerte-", PREFIX]));
        let registry = registry(&[("alpha", Some("1.0"), PackageKind::SourceBuilt)]);

        let matrix = builder.build(&registry, &source);

        let rows: Vec<(&str, PackageKind)> = matrix
            .rows()
            .iter()
            .map(|r| (r.name.as_str(), r.kind))
            .collect();
        assert_eq!(
            rows,
            vec![
                ("alpha", PackageKind::SourceBuilt),
                ("gamma", PackageKind::Unknown),
                ("zeta", PackageKind::Unknown),
            ]
        );
    }

    #[test]
    fn build_does_not_synthesize_declared_package_with_underscores() {
        let source = StaticSource::new().with_snapshot(
            "public",
            Platform::binary("quantal", "amd64"),
            vec![entry("ros-groovy-common-msgs", "1.0")],
        );
        let builder = builder(&["public"], &["quantal"], &["amd64"]);
        let registry = registry(&[("common_msgs", Some("1.0"), PackageKind::SourceBuilt)]);

        let matrix = builder.build(&registry, &source);

        assert_eq!(matrix.rows().len(), 1);
        assert_eq!(matrix.rows()[0].cells[1], Some("1.0".to_string()));
    }

    #[test]
    fn build_infers_version_of_undeclared_package_when_all_cells_agree() {
        let mut source = StaticSource::new();
        for channel in ["building", "public"] {
            source.insert_snapshot(
                channel,
                Platform::binary("quantal", "amd64"),
                vec![entry("ros-groovy-extra", "2.0")],
            );
        }
        let builder = builder(&["building", "public"], &["quantal"], &["amd64"]);

        let matrix = builder.build(&Registry::default(), &source);

        let row = matrix.row("extra").unwrap();
        assert_eq!(row.version, Some("2.0".to_string()));
        assert_eq!(row.kind, PackageKind::Unknown);
    }

    #[test]
    fn build_leaves_version_of_undeclared_package_empty_when_cells_differ() {
        let source = StaticSource::new()
            .with_snapshot(
                "building",
                Platform::binary("quantal", "amd64"),
                vec![entry("ros-groovy-extra", "2.1")],
            )
            .with_snapshot(
                "public",
                Platform::binary("quantal", "amd64"),
                vec![entry("ros-groovy-extra", "2.0")],
            );
        let builder = builder(&["building", "public"], &["quantal"], &["amd64"]);

        let matrix = builder.build(&Registry::default(), &source);

        assert_eq!(matrix.row("extra").unwrap().version, None);
    }

    #[test]
    fn build_degrades_unavailable_column_and_queries_it_once() {
        let mut source = MockVersionSource::new();
        source.expect_package_names().returning(|| Ok(vec![]));
        source
            .expect_lookup()
            .withf(|_, channel, _| channel == "public")
            .times(1)
            .returning(|_, channel, platform| {
                Err(SourceError::Unavailable {
                    channel: channel.to_string(),
                    platform: platform.key(),
                })
            });
        source
            .expect_lookup()
            .withf(|_, channel, _| channel == "building")
            .returning(|_, _, _| Ok(Some(PackageRecord::new("1.0-1", "1.0-1"))));
        let builder = builder(&["building", "public"], &["quantal"], &["amd64"]);
        let registry = registry(&[
            ("alpha", Some("1.0"), PackageKind::SourceBuilt),
            ("beta", Some("1.0"), PackageKind::SourceBuilt),
        ]);

        let matrix = builder.build(&registry, &source);

        for row in matrix.rows() {
            assert_eq!(
                row.cells,
                vec![
                    Some("1.0-1".to_string()),
                    None,
                    Some("1.0-1".to_string()),
                    None
                ]
            );
        }
    }

    #[test]
    fn build_treats_ambiguous_lookup_as_absent() {
        let source = StaticSource::new().with_snapshot(
            "public",
            Platform::binary("quantal", "amd64"),
            vec![entry("ros-groovy-alpha", "1.0"), entry("ros-groovy-alpha", "1.1")],
        );
        let builder = builder(&["public"], &["quantal"], &["amd64"]);
        let registry = registry(&[("alpha", Some("1.0"), PackageKind::SourceBuilt)]);

        let matrix = builder.build(&registry, &source);

        assert_eq!(matrix.rows()[0].cells, vec![None, None]);
    }

    #[test]
    fn build_skips_synthesis_when_package_listing_fails() {
        let mut source = MockVersionSource::new();
        source.expect_package_names().returning(|| {
            Err(SourceError::Store(
                crate::snapshot::error::StoreError::LockPoisoned,
            ))
        });
        source.expect_lookup().returning(|_, _, _| Ok(None));
        let builder = builder(&["public"], &["quantal"], &["amd64"]);
        let registry = registry(&[("alpha", None, PackageKind::Prebuilt)]);

        let matrix = builder.build(&registry, &source);

        assert_eq!(matrix.rows().len(), 1);
    }

    #[rstest]
    #[case(&[Some("2.0"), Some("2.0"), None], Some("2.0"))]
    #[case(&[Some("2.0"), Some("2.1")], None)]
    #[case(&[None, None], None)]
    #[case(&[], None)]
    fn infer_version_returns_expected(#[case] cells: &[Option<&str>], #[case] expected: Option<&str>) {
        let cells: Vec<Cell> = cells.iter().map(|c| c.map(str::to_string)).collect();

        assert_eq!(infer_version(&cells), expected.map(str::to_string));
    }
}
