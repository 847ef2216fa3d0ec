//! Debian `Packages` index parser
//!
//! An index is a sequence of stanzas separated by blank lines. Only the
//! fields needed for reconciliation are read:
//!
//! ```text
//! Package: ros-groovy-roscpp
//! Version: 1.9.41-0quantal-20130115-1234-+0000
//! Source: ros-groovy-ros-comm (1.9.41-0quantal)
//! Architecture: amd64
//! Description: roscpp
//!  continuation lines are ignored
//! ```

use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use crate::snapshot::source::PackageRecord;

/// Match: `Source: name` or `Source: name (version)`
static SOURCE_FIELD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\S+)(?:\s+\(([^)]+)\))?$").unwrap());

/// One binary package entry of an index
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    pub package: String,
    pub record: PackageRecord,
}

#[derive(Default)]
struct Stanza<'a> {
    package: Option<&'a str>,
    version: Option<&'a str>,
    source: Option<&'a str>,
}

impl Stanza<'_> {
    fn finish(self, line: usize, entries: &mut Vec<IndexEntry>) {
        let (Some(package), Some(version)) = (self.package, self.version) else {
            if self.package.is_some() || self.version.is_some() || self.source.is_some() {
                debug!("Skipping incomplete stanza ending at line {}", line);
            }
            return;
        };

        let source_version = self
            .source
            .and_then(|source| SOURCE_FIELD_RE.captures(source))
            .and_then(|caps| caps.get(2))
            .map(|m| m.as_str())
            .unwrap_or(version);

        entries.push(IndexEntry {
            package: package.to_string(),
            record: PackageRecord::new(version, source_version),
        });
    }
}

/// Parse the content of a `Packages` index
pub fn parse_index(content: &str) -> Vec<IndexEntry> {
    let mut entries = Vec::new();
    let mut stanza = Stanza::default();

    for (line_num, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            std::mem::take(&mut stanza).finish(line_num, &mut entries);
            continue;
        }

        // Continuation of a multi-line field
        if line.starts_with(' ') || line.starts_with('\t') {
            continue;
        }

        let Some((field, value)) = line.split_once(':') else {
            debug!("Ignoring malformed index line {}: {}", line_num + 1, line);
            continue;
        };

        let value = value.trim();
        match field {
            "Package" => stanza.package = Some(value),
            "Version" => stanza.version = Some(value),
            "Source" => stanza.source = Some(value),
            _ => {}
        }
    }
    stanza.finish(content.lines().count(), &mut entries);

    entries
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn parse_index_reads_all_stanzas() {
        let content = "\
Package: ros-groovy-roscpp
Version: 1.9.41-0quantal-20130115-1234-+0000
Source: ros-groovy-ros-comm (1.9.41-0quantal)
Architecture: amd64
Description: roscpp
 a longer description
 over several lines

Package: ros-groovy-catkin
Version: 0.5.63-0quantal
Architecture: all
";

        let entries = parse_index(content);

        assert_eq!(
            entries,
            vec![
                IndexEntry {
                    package: "ros-groovy-roscpp".to_string(),
                    record: PackageRecord::new(
                        "1.9.41-0quantal-20130115-1234-+0000",
                        "1.9.41-0quantal"
                    ),
                },
                IndexEntry {
                    package: "ros-groovy-catkin".to_string(),
                    record: PackageRecord::new("0.5.63-0quantal", "0.5.63-0quantal"),
                },
            ]
        );
    }

    #[rstest]
    #[case("Source: ros-groovy-ros-comm (1.9.41-0quantal)", "1.9.41-0quantal")]
    #[case("Source: ros-groovy-ros-comm", "2.0-1")]
    fn parse_index_takes_source_version_from_source_field(
        #[case] source_line: &str,
        #[case] expected: &str,
    ) {
        let content = format!("Package: ros-groovy-roscpp\nVersion: 2.0-1\n{source_line}\n");

        let entries = parse_index(&content);

        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].record.source_version, expected);
    }

    #[test]
    fn parse_index_skips_stanzas_without_version() {
        let content = "Package: broken\nArchitecture: amd64\n\nPackage: ok\nVersion: 1.0\n";

        let entries = parse_index(content);

        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].package, "ok");
    }

    #[test]
    fn parse_index_keeps_duplicate_packages() {
        let content = "Package: a\nVersion: 1.0\n\nPackage: a\nVersion: 1.1\n";

        let entries = parse_index(content);

        assert_eq!(entries.len(), 2);
    }

    #[test]
    fn parse_index_returns_empty_for_empty_content() {
        assert!(parse_index("").is_empty());
        assert!(parse_index("\n\n\n").is_empty());
    }
}
