//! Common types for the reconciliation matrix

use std::fmt;

use serde::{Deserialize, Serialize};

/// Text written in place of a version when a cell has no value
pub const ABSENT: &str = "None";

/// How a package reaches the channels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PackageKind {
    /// Built from a source package, so a source entry is expected per distribution
    SourceBuilt,
    /// Shipped as binaries only, no source entry expected
    Prebuilt,
    /// Not declared by the release manifest
    #[default]
    Unknown,
}

impl PackageKind {
    /// Returns the string representation used in the interchange table
    pub fn as_str(&self) -> &'static str {
        match self {
            PackageKind::SourceBuilt => "source-built",
            PackageKind::Prebuilt => "prebuilt",
            PackageKind::Unknown => "unknown",
        }
    }
}

impl std::str::FromStr for PackageKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "source-built" => Ok(PackageKind::SourceBuilt),
            "prebuilt" => Ok(PackageKind::Prebuilt),
            "unknown" => Ok(PackageKind::Unknown),
            _ => Err(()),
        }
    }
}

/// A target platform: a (distribution, architecture) pair or the
/// per-distribution source pseudo-platform
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Platform {
    Source { distro: String },
    Binary { distro: String, arch: String },
}

impl Platform {
    pub fn source(distro: &str) -> Self {
        Platform::Source {
            distro: distro.to_string(),
        }
    }

    pub fn binary(distro: &str, arch: &str) -> Self {
        Platform::Binary {
            distro: distro.to_string(),
            arch: arch.to_string(),
        }
    }

    pub fn distro(&self) -> &str {
        match self {
            Platform::Source { distro } | Platform::Binary { distro, .. } => distro,
        }
    }

    pub fn is_source(&self) -> bool {
        matches!(self, Platform::Source { .. })
    }

    /// Column key used in the interchange table: `<distro>_source` or `<distro>_<arch>`
    pub fn key(&self) -> String {
        match self {
            Platform::Source { distro } => format!("{distro}_source"),
            Platform::Binary { distro, arch } => format!("{distro}_{arch}"),
        }
    }

    /// Parse a column key. The distribution ends at the first underscore,
    /// so architectures like `x86_64` survive.
    pub fn from_key(key: &str) -> Option<Self> {
        let (distro, rest) = key.split_once('_')?;
        if distro.is_empty() || rest.is_empty() {
            return None;
        }
        if rest == "source" {
            Some(Platform::source(distro))
        } else {
            Some(Platform::binary(distro, rest))
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())
    }
}

/// Build the platform list for a set of distributions and architectures.
///
/// Distributions are ordered alphabetically and deduplicated; each gets its
/// source pseudo-platform first, followed by one platform per architecture.
pub fn platforms_for(distributions: &[String], architectures: &[String]) -> Vec<Platform> {
    let mut distros: Vec<&String> = distributions.iter().collect();
    distros.sort();
    distros.dedup();

    let mut platforms = Vec::with_capacity(distros.len() * (architectures.len() + 1));
    for distro in distros {
        platforms.push(Platform::source(distro));
        for arch in architectures {
            platforms.push(Platform::binary(distro, arch));
        }
    }
    platforms
}

/// A package expected by the release
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Package {
    pub name: String,
    pub version: Option<String>,
    pub kind: PackageKind,
}

impl Package {
    pub fn new(name: &str, version: Option<&str>, kind: PackageKind) -> Self {
        Self {
            name: name.to_string(),
            version: version.map(str::to_string),
            kind,
        }
    }
}

/// Normalized version of one (package, channel, platform) cell, `None` when absent
pub type Cell = Option<String>;

/// One package row of the matrix
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    pub name: String,
    /// Declared version, or the inferred common version for synthesized rows
    pub version: Option<String>,
    pub kind: PackageKind,
    /// Platform-major, channel-minor
    pub cells: Vec<Cell>,
}

/// Package × (channel, platform) table of observed versions.
///
/// Every row holds `platforms.len() * channels.len()` cells in the same order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Matrix {
    channels: Vec<String>,
    platforms: Vec<Platform>,
    rows: Vec<Row>,
}

impl Matrix {
    pub(crate) fn new(channels: Vec<String>, platforms: Vec<Platform>, rows: Vec<Row>) -> Self {
        debug_assert!(
            rows.iter()
                .all(|row| row.cells.len() == channels.len() * platforms.len())
        );
        Self {
            channels,
            platforms,
            rows,
        }
    }

    pub fn channels(&self) -> &[String] {
        &self.channels
    }

    pub fn platforms(&self) -> &[Platform] {
        &self.platforms
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn row(&self, name: &str) -> Option<&Row> {
        self.rows.iter().find(|row| row.name == name)
    }

    /// Cells of one platform column, in channel order
    pub fn column<'a>(&self, row: &'a Row, platform: usize) -> &'a [Cell] {
        let width = self.channels.len();
        &row.cells[platform * width..(platform + 1) * width]
    }

    pub(crate) fn sort_rows_by_name(&mut self) {
        self.rows.sort_by(|a, b| a.name.cmp(&b.name));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("quantal_source", Some(Platform::source("quantal")))]
    #[case("quantal_amd64", Some(Platform::binary("quantal", "amd64")))]
    #[case("precise_x86_64", Some(Platform::binary("precise", "x86_64")))]
    #[case("quantal", None)]
    #[case("_amd64", None)]
    #[case("quantal_", None)]
    fn platform_from_key_returns_expected(#[case] key: &str, #[case] expected: Option<Platform>) {
        assert_eq!(Platform::from_key(key), expected);
    }

    #[test]
    fn platforms_for_sorts_distributions_and_inserts_source_once() {
        let platforms = platforms_for(
            &["quantal".to_string(), "precise".to_string()],
            &["i386".to_string(), "amd64".to_string()],
        );

        let keys: Vec<String> = platforms.iter().map(Platform::key).collect();
        assert_eq!(
            keys,
            vec![
                "precise_source",
                "precise_i386",
                "precise_amd64",
                "quantal_source",
                "quantal_i386",
                "quantal_amd64",
            ]
        );
    }

    #[rstest]
    #[case(PackageKind::SourceBuilt)]
    #[case(PackageKind::Prebuilt)]
    #[case(PackageKind::Unknown)]
    fn package_kind_parses_its_own_string(#[case] kind: PackageKind) {
        assert_eq!(kind.as_str().parse::<PackageKind>(), Ok(kind));
    }
}
