//! # Version Grammar and Ordering
//!
//! Centralizes the version-string grammar accepted across config documents
//! and the semver comparator used wherever "highest" or a min/max bound is
//! involved. Ordering always goes through [`semver::Version`] so pre-release
//! precedence is correct; strings that cannot be parsed leniently are simply
//! excluded from "highest" selection instead of being compared textually.

use crate::schemas::tool_descriptor::VersionConstraints;
use semver::Version;
use std::cmp::Ordering;

/// Names accepted wherever a version may appear, resolved specially rather
/// than looked up in the registry verbatim.
pub const RESERVED_NAMES: [&str; 5] = ["latest", "stable", "main", "master", "system"];

/// The pseudo-version that routes dispatch to whatever is on PATH.
pub const SYSTEM_VERSION: &str = "system";

pub fn is_reserved(version: &str) -> bool {
    RESERVED_NAMES.contains(&version)
}

/// Strips a leading `v` when it prefixes a digit ("v1.2.3" -> "1.2.3").
pub fn strip_v_prefix(version: &str) -> &str {
    match version.strip_prefix('v') {
        Some(rest) if rest.starts_with(|c: char| c.is_ascii_digit()) => rest,
        _ => version,
    }
}

fn is_short_form(s: &str) -> bool {
    // "X.Y" with both components all-digit and non-empty.
    let mut parts = s.split('.');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(major), Some(minor), None) => {
            !major.is_empty()
                && !minor.is_empty()
                && major.chars().all(|c| c.is_ascii_digit())
                && minor.chars().all(|c| c.is_ascii_digit())
        }
        _ => false,
    }
}

/// Checks a version string against the accepted grammar:
/// semver `X.Y.Z[-pre][+build]`, `vX.Y.Z...`, short `X.Y`, or one of the
/// reserved names. Returns the reason on rejection.
pub fn validate_version_string(version: &str) -> Result<(), String> {
    if is_reserved(version) {
        return Ok(());
    }
    let stripped = strip_v_prefix(version);
    if Version::parse(stripped).is_ok() || is_short_form(stripped) {
        return Ok(());
    }
    Err(format!(
        "not a recognized version (expected X.Y.Z[-pre][+build], vX.Y.Z, X.Y, or one of {})",
        RESERVED_NAMES.join("/")
    ))
}

/// Parses leniently for ordering purposes: strips the `v` prefix and pads
/// the short `X.Y` form to `X.Y.0`. Reserved names and anything else that
/// fails to parse yield `None`.
pub fn parse_lenient(version: &str) -> Option<Version> {
    let stripped = strip_v_prefix(version);
    if let Ok(v) = Version::parse(stripped) {
        return Some(v);
    }
    if is_short_form(stripped) {
        let mut parts = stripped.split('.');
        let major = parts.next()?.parse().ok()?;
        let minor = parts.next()?.parse().ok()?;
        return Some(Version::new(major, minor, 0));
    }
    None
}

/// Compares two version strings when both parse leniently.
pub fn compare(a: &str, b: &str) -> Option<Ordering> {
    Some(parse_lenient(a)?.cmp(&parse_lenient(b)?))
}

/// Picks the highest version out of `versions`. Pre-releases only win when
/// `include_prerelease` is set (used for `latest`; `stable` excludes them).
/// Unparseable strings never win.
pub fn highest<'a, I>(versions: I, include_prerelease: bool) -> Option<String>
where
    I: IntoIterator<Item = &'a String>,
{
    versions
        .into_iter()
        .filter_map(|s| parse_lenient(s).map(|v| (v, s)))
        .filter(|(v, _)| include_prerelease || v.pre.is_empty())
        .max_by(|(a, _), (b, _)| a.cmp(b))
        .map(|(_, s)| s.clone())
}

/// Applies descriptor-level min/max bounds to a concrete version. Aliases
/// and reserved names are exempt; an unparseable concrete version fails.
pub fn check_constraints(
    version: &str,
    constraints: &VersionConstraints,
) -> Result<(), String> {
    if is_reserved(version) {
        return Ok(());
    }
    let parsed = parse_lenient(version)
        .ok_or_else(|| format!("'{version}' cannot be ordered against version constraints"))?;

    if let Some(min) = &constraints.min_version {
        let min_parsed = parse_lenient(min)
            .ok_or_else(|| format!("descriptor min_version '{min}' is not a valid version"))?;
        if parsed < min_parsed {
            return Err(format!("version {version} is below the minimum {min}"));
        }
    }
    if let Some(max) = &constraints.max_version {
        let max_parsed = parse_lenient(max)
            .ok_or_else(|| format!("descriptor max_version '{max}' is not a valid version"))?;
        if parsed > max_parsed {
            return Err(format!("version {version} is above the maximum {max}"));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grammar_accepts_the_specified_forms() {
        for ok in [
            "1.2.3",
            "v1.2.3",
            "1.2",
            "0.1.0-rc.1",
            "1.2.3-beta.2+build.5",
            "v10.20.30",
            "latest",
            "stable",
            "main",
            "master",
            "system",
        ] {
            assert!(validate_version_string(ok).is_ok(), "rejected {ok}");
        }
    }

    #[test]
    fn grammar_rejects_everything_else() {
        for bad in ["", "1", "1.2.3.4", "one-point-two", "1.2 ", "version-1", "v", "1..2"] {
            assert!(validate_version_string(bad).is_err(), "accepted {bad:?}");
        }
    }

    #[test]
    fn lenient_parse_pads_short_form_and_strips_v() {
        assert_eq!(parse_lenient("1.2").unwrap(), Version::new(1, 2, 0));
        assert_eq!(parse_lenient("v1.29.0").unwrap(), Version::new(1, 29, 0));
        assert!(parse_lenient("latest").is_none());
    }

    #[test]
    fn prerelease_ordering_is_semver_not_lexicographic() {
        // 1.0.0-rc.1 < 1.0.0, and rc.2 < rc.10 (numeric identifier ordering).
        assert_eq!(compare("1.0.0-rc.1", "1.0.0"), Some(Ordering::Less));
        assert_eq!(compare("1.0.0-rc.2", "1.0.0-rc.10"), Some(Ordering::Less));
        // Lexicographic comparison would get this one wrong.
        assert_eq!(compare("1.9.0", "1.10.0"), Some(Ordering::Less));
    }

    #[test]
    fn highest_respects_prerelease_flag() {
        let versions: Vec<String> = ["1.2.0", "1.10.0", "2.0.0-rc.1", "garbage"]
            .iter()
            .map(|s| s.to_string())
            .collect();

        assert_eq!(highest(&versions, true), Some("2.0.0-rc.1".to_string()));
        assert_eq!(highest(&versions, false), Some("1.10.0".to_string()));
        assert_eq!(highest(&Vec::<String>::new(), true), None);
    }

    #[test]
    fn constraints_are_inclusive_bounds() {
        let constraints = VersionConstraints {
            min_version: Some("1.2.0".to_string()),
            max_version: Some("1.9.0".to_string()),
        };
        assert!(check_constraints("1.2.0", &constraints).is_ok());
        assert!(check_constraints("1.9.0", &constraints).is_ok());
        assert!(check_constraints("1.1.9", &constraints).is_err());
        assert!(check_constraints("1.10.0", &constraints).is_err());
        // Aliases are exempt from constraint checks.
        assert!(check_constraints("latest", &constraints).is_ok());
    }
}
