//! Version string normalization
//!
//! Packaging metadata (distribution tags, build timestamps, rebuild suffixes)
//! is stripped so that versions from different channels compare equal when
//! they were built from the same upstream release.

use std::sync::LazyLock;

use regex::Regex;

/// First run of digits, dots and hyphens that ends in a digit
static VERSION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[0-9.\-]+[0-9]").expect("valid version regex"));

/// Strip trailing packaging junk from a version string.
///
/// Returns the input unchanged when it contains nothing version-like,
/// which includes the empty string and the absence marker.
pub fn normalize(version: &str) -> &str {
    VERSION_RE
        .find(version)
        .map(|m| m.as_str())
        .unwrap_or(version)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::types::ABSENT;
    use rstest::rstest;

    #[rstest]
    #[case("", "")]
    #[case(ABSENT, ABSENT)]
    #[case("1.9.9-0quantal-20121115-0529-+0000", "1.9.9-0")]
    #[case("1.9.9-foo", "1.9.9")]
    #[case("1.0-1build2+0600", "1.0-1")]
    #[case("0.4.2-0precise", "0.4.2-0")]
    #[case("1:2.3-1", "2.3-1")]
    #[case("v", "v")]
    #[case("7", "7")]
    fn normalize_returns_expected(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(normalize(input), expected);
    }

    #[rstest]
    #[case("")]
    #[case("None")]
    #[case("1.9.9-0quantal-20121115-0529-+0000")]
    #[case("abc-1.2.3.")]
    #[case("--1..2--")]
    #[case("1.0~rc1-2")]
    fn normalize_is_idempotent(#[case] input: &str) {
        let once = normalize(input);
        assert_eq!(normalize(once), once);
    }
}
