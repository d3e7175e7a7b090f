//! npm semver range handling.
//!
//! `semver::VersionReq` covers the standard operators; npm ranges need a
//! normalization pass first for OR alternatives (`^1.0.0 || ^2.0.0`), hyphen
//! ranges (`1.0.0 - 2.0.0`), x-ranges (`1.x`, `*`) and space-separated AND
//! comparators (`>=1.2.0 <2.0.0`).

use semver::{Version, VersionReq};
use tracing::warn;

/// A parsed npm version range: one or more OR-ed `VersionReq` alternatives.
#[derive(Debug, Clone)]
pub struct RangeMatcher {
    reqs: Vec<VersionReq>,
}

impl RangeMatcher {
    /// Parse an npm range expression.
    ///
    /// OR alternatives are split on `||`; an alternative that fails to parse
    /// is dropped as long as at least one parses.
    pub fn parse(range: &str) -> Result<Self, semver::Error> {
        let mut reqs = Vec::new();
        let mut first_err = None;

        for alt in range.split("||") {
            match parse_single(alt.trim()) {
                Ok(req) => reqs.push(req),
                Err(e) => {
                    if first_err.is_none() {
                        first_err = Some(e);
                    }
                }
            }
        }

        match (reqs.is_empty(), first_err) {
            (false, _) => Ok(Self { reqs }),
            (true, Some(e)) => Err(e),
            // Unreachable in practice: split always yields one alternative,
            // and every failed alternative records an error.
            (true, None) => Err(VersionReq::parse("not-a-range").unwrap_err()),
        }
    }

    /// Like [`RangeMatcher::parse`], but degrades to `None` with a warning.
    /// A range nobody can parse matches no versions; that is a diagnostic
    /// outcome, never a crash.
    #[must_use]
    pub fn lenient(range: &str) -> Option<Self> {
        match Self::parse(range) {
            Ok(matcher) => Some(matcher),
            Err(e) => {
                warn!("unparseable version range '{range}': {e}");
                None
            }
        }
    }

    /// Does `version` satisfy any alternative of this range?
    #[must_use]
    pub fn matches(&self, version: &Version) -> bool {
        self.reqs.iter().any(|req| req.matches(version))
    }
}

/// The published versions of a package plus the extremes of the project's
/// declared range for it. Computed once per package name and cached for the
/// run; the first caller's range wins the cache entry.
#[derive(Debug, Clone)]
pub struct VersionInfo {
    /// All published versions, ascending. Unparseable entries are dropped.
    pub versions: Vec<Version>,
    /// Lowest published version satisfying the declared range.
    pub minimum: Option<Version>,
    /// Highest published version satisfying the declared range.
    pub maximum: Option<Version>,
}

impl VersionInfo {
    /// Build from a raw published-version list and a declared range.
    ///
    /// Either extreme may be `None` when nothing satisfies the range; that
    /// only becomes visible if the package is later referenced as a peer
    /// target needing a concrete minimum.
    #[must_use]
    pub fn from_published<S: AsRef<str>>(published: &[S], range: &str) -> Self {
        let mut versions: Vec<Version> = published
            .iter()
            .filter_map(|s| Version::parse(s.as_ref().trim()).ok())
            .collect();
        versions.sort();

        let (minimum, maximum) = match RangeMatcher::lenient(range) {
            Some(matcher) => (
                versions.iter().find(|v| matcher.matches(v)).cloned(),
                versions.iter().rev().find(|v| matcher.matches(v)).cloned(),
            ),
            None => (None, None),
        };

        Self {
            versions,
            minimum,
            maximum,
        }
    }

    /// Could any published version satisfy `matcher`?
    #[must_use]
    pub fn any_satisfies(&self, matcher: &RangeMatcher) -> bool {
        self.versions.iter().any(|v| matcher.matches(v))
    }
}

/// Does a concrete version string satisfy an npm range? Lenient on both
/// sides: anything unparseable fails the check.
#[must_use]
pub fn version_satisfies(version: &str, range: &str) -> bool {
    let Ok(version) = Version::parse(version.trim()) else {
        warn!("unparseable version '{version}'");
        return false;
    };
    RangeMatcher::lenient(range).is_some_and(|m| m.matches(&version))
}

/// Parse one OR alternative, normalizing npm syntax first.
fn parse_single(alt: &str) -> Result<VersionReq, semver::Error> {
    if let Some((low, high)) = split_hyphen_range(alt) {
        return VersionReq::parse(&format!(">={low}, <={high}"));
    }

    if let Some(converted) = convert_x_range(alt) {
        return VersionReq::parse(&converted);
    }

    VersionReq::parse(&join_and_comparators(alt))
}

/// `"1.0.0 - 2.0.0"` -> `("1.0.0", "2.0.0")`. The separator must be a
/// spaced hyphen; hyphens inside prerelease tags don't count.
fn split_hyphen_range(range: &str) -> Option<(&str, &str)> {
    let (low, high) = range.split_once(" - ")?;
    let (low, high) = (low.trim(), high.trim());
    (!low.is_empty() && !high.is_empty()).then_some((low, high))
}

/// Convert an x-range (`*`, `1.x`, `1.2.x`) into comparator form. A bare
/// `major.minor` counts too: npm reads `1.2` as `1.2.x`. Returns `None`
/// when the input isn't an x-range.
fn convert_x_range(range: &str) -> Option<String> {
    if matches!(range, "" | "*" | "x" | "X") {
        return Some(">=0.0.0".to_string());
    }

    let wild = |part: &str| matches!(part, "*" | "x" | "X");
    let parts: Vec<&str> = range.split('.').collect();

    match parts.as_slice() {
        [major, minor] | [major, minor, _] if wild(minor) => {
            let m: u64 = major.parse().ok()?;
            Some(format!(">={m}.0.0, <{}.0.0", m.checked_add(1)?))
        }
        [major, minor, patch] if wild(patch) => minor_bounded(major, minor),
        [major, minor] => minor_bounded(major, minor),
        _ => None,
    }
}

/// `>=M.N.0, <M.(N+1).0` for numeric major/minor parts.
fn minor_bounded(major: &str, minor: &str) -> Option<String> {
    let m: u64 = major.parse().ok()?;
    let n: u64 = minor.parse().ok()?;
    Some(format!(">={m}.{n}.0, <{m}.{}.0", n.checked_add(1)?))
}

/// npm allows spaces between comparators to mean AND (`>= 2.1.2 < 3.0.0`);
/// `semver` wants commas (`>=2.1.2, <3.0.0`). Operators separated from their
/// version by whitespace are glued back on.
fn join_and_comparators(range: &str) -> String {
    // Already comma-separated: semver syntax, pass through.
    if range.contains(',') {
        return range.trim().to_string();
    }

    let mut comparators: Vec<String> = Vec::new();
    let mut pending_op: Option<String> = None;

    for token in range.split_whitespace() {
        let has_version = token.chars().any(|c| c.is_ascii_digit());
        match (has_version, pending_op.take()) {
            (true, Some(op)) => comparators.push(format!("{op}{token}")),
            (true, None) => comparators.push(token.to_string()),
            (false, Some(op)) => pending_op = Some(op + token),
            (false, None) => pending_op = Some(token.to_string()),
        }
    }
    if let Some(op) = pending_op {
        comparators.push(op);
    }

    comparators.join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(published: &[&str], range: &str) -> VersionInfo {
        VersionInfo::from_published(published, range)
    }

    fn ver(s: &str) -> Version {
        Version::parse(s).unwrap()
    }

    #[test]
    fn test_caret_range_extremes() {
        let info = info(&["1.0.0", "1.5.0", "2.0.0", "2.5.0"], "^1.0.0");
        assert_eq!(info.minimum, Some(ver("1.0.0")));
        assert_eq!(info.maximum, Some(ver("1.5.0")));
    }

    #[test]
    fn test_tilde_range_extremes() {
        let info = info(&["1.0.0", "1.0.5", "1.1.0", "2.0.0"], "~1.0.0");
        assert_eq!(info.minimum, Some(ver("1.0.0")));
        assert_eq!(info.maximum, Some(ver("1.0.5")));
    }

    #[test]
    fn test_versions_sorted_ascending() {
        let info = info(&["2.0.0", "1.0.0", "10.0.0"], "*");
        assert_eq!(info.versions, vec![ver("1.0.0"), ver("2.0.0"), ver("10.0.0")]);
        assert_eq!(info.maximum, Some(ver("10.0.0")));
    }

    #[test]
    fn test_nothing_satisfies_range() {
        let info = info(&["1.0.0", "2.0.0"], "^3.0.0");
        assert_eq!(info.minimum, None);
        assert_eq!(info.maximum, None);
        assert_eq!(info.versions.len(), 2);
    }

    #[test]
    fn test_unparseable_range_matches_nothing() {
        let info = info(&["1.0.0"], "not-a-range!!!");
        assert_eq!(info.minimum, None);
        assert_eq!(info.maximum, None);
    }

    #[test]
    fn test_unparseable_versions_dropped() {
        let info = info(&["1.0.0", "garbage", "2.0.0"], "*");
        assert_eq!(info.versions.len(), 2);
    }

    #[test]
    fn test_or_range_picks_both_sides() {
        let matcher = RangeMatcher::parse("^1.0.0 || ^2.0.0").unwrap();
        assert!(matcher.matches(&ver("1.5.0")));
        assert!(matcher.matches(&ver("2.5.0")));
        assert!(!matcher.matches(&ver("3.0.0")));
    }

    #[test]
    fn test_or_range_without_spaces() {
        let matcher = RangeMatcher::parse("^14.0.0||^15.0.0").unwrap();
        assert!(matcher.matches(&ver("15.2.0")));
    }

    #[test]
    fn test_or_range_invalid_alternative_dropped() {
        let matcher = RangeMatcher::parse("garbage-range || ^2.0.0").unwrap();
        assert!(matcher.matches(&ver("2.1.0")));
        assert!(!matcher.matches(&ver("1.0.0")));
    }

    #[test]
    fn test_hyphen_range() {
        let info = info(&["0.9.0", "1.0.0", "1.5.0", "2.0.0", "3.0.0"], "1.0.0 - 2.0.0");
        assert_eq!(info.minimum, Some(ver("1.0.0")));
        assert_eq!(info.maximum, Some(ver("2.0.0")));
    }

    #[test]
    fn test_x_range_minor() {
        let matcher = RangeMatcher::parse("1.x").unwrap();
        assert!(matcher.matches(&ver("1.9.0")));
        assert!(!matcher.matches(&ver("2.0.0")));
    }

    #[test]
    fn test_x_range_patch() {
        let matcher = RangeMatcher::parse("1.2.x").unwrap();
        assert!(matcher.matches(&ver("1.2.9")));
        assert!(!matcher.matches(&ver("1.3.0")));
    }

    #[test]
    fn test_partial_major_minor_is_patch_range() {
        let matcher = RangeMatcher::parse("1.2").unwrap();
        assert!(matcher.matches(&ver("1.2.0")));
        assert!(matcher.matches(&ver("1.2.9")));
        assert!(!matcher.matches(&ver("1.3.0")));
    }

    #[test]
    fn test_huge_component_ranges_do_not_panic() {
        // Components at u64::MAX can't be bumped to an upper bound; the
        // range must degrade quietly rather than overflow.
        for range in [
            format!("{}.x", u64::MAX),
            format!("1.{}.x", u64::MAX),
            format!("1.{}", u64::MAX),
        ] {
            let matched = RangeMatcher::lenient(&range).is_some_and(|m| m.matches(&ver("1.0.0")));
            assert!(!matched, "'{range}' must not match 1.0.0");
        }
    }

    #[test]
    fn test_star_matches_everything_released() {
        let matcher = RangeMatcher::parse("*").unwrap();
        assert!(matcher.matches(&ver("0.0.1")));
        assert!(matcher.matches(&ver("99.0.0")));
    }

    #[test]
    fn test_space_separated_and_comparators() {
        let matcher = RangeMatcher::parse(">= 2.1.2 < 3.0.0").unwrap();
        assert!(matcher.matches(&ver("2.5.0")));
        assert!(matcher.matches(&ver("2.1.2")));
        assert!(!matcher.matches(&ver("3.0.0")));
    }

    #[test]
    fn test_and_comparators_without_spaces_around_ops() {
        let matcher = RangeMatcher::parse(">=2.1.2 <3.0.0").unwrap();
        assert!(matcher.matches(&ver("2.9.9")));
        assert!(!matcher.matches(&ver("2.1.1")));
    }

    #[test]
    fn test_caret_excludes_prerelease() {
        let info = info(&["1.0.0", "2.0.0-alpha.1", "2.0.0"], "^2.0.0");
        assert_eq!(info.minimum, Some(ver("2.0.0")));
    }

    #[test]
    fn test_any_satisfies() {
        let info = info(&["1.0.0", "2.0.0", "3.0.0"], "^1.0.0");
        let matcher = RangeMatcher::parse("^3.0.0").unwrap();
        assert!(info.any_satisfies(&matcher));
        assert!(!info.any_satisfies(&RangeMatcher::parse("^4.0.0").unwrap()));
    }

    #[test]
    fn test_version_satisfies() {
        assert!(version_satisfies("2.1.0", "^2.0.0"));
        assert!(!version_satisfies("1.9.0", "^2.0.0"));
        assert!(!version_satisfies("garbage", "^2.0.0"));
        assert!(!version_satisfies("2.1.0", "garbage"));
    }

    #[test]
    fn test_empty_range_means_any() {
        let matcher = RangeMatcher::parse("").unwrap();
        assert!(matcher.matches(&ver("0.1.0")));
    }
}
