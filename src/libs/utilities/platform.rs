// Platform detection and release-asset matching. This is how vman picks the
// right download out of a GitHub release's asset list: normalize the local
// OS/architecture, then fuzzy-match asset filenames using the common naming
// synonyms release pipelines actually produce.

use crate::log_debug;
use colored::Colorize;

/// Detects the current operating system as a normalized string
/// ("linux", "macos", "windows").
pub fn detect_os() -> String {
    normalize_os(std::env::consts::OS)
}

/// Detects the current CPU architecture as a normalized string
/// ("x86_64", "arm64", "386").
pub fn detect_arch() -> String {
    normalize_arch(std::env::consts::ARCH)
}

/// Maps OS name variants onto the canonical form.
pub fn normalize_os(os: &str) -> String {
    match os.to_lowercase().as_str() {
        "macos" | "darwin" | "osx" | "apple-darwin" => "macos".to_string(),
        "windows" | "win32" | "win64" => "windows".to_string(),
        other => other.to_string(),
    }
}

/// Maps architecture name variants onto the canonical form.
pub fn normalize_arch(arch: &str) -> String {
    match arch.to_lowercase().as_str() {
        "aarch64" | "arm64" => "arm64".to_string(),
        "amd64" | "x86_64" | "x64" => "x86_64".to_string(),
        "386" | "i386" | "x86" => "386".to_string(),
        other => other.to_string(),
    }
}

/// All names an asset might use for a canonical OS.
pub fn os_synonyms(os: &str) -> Vec<&'static str> {
    match normalize_os(os).as_str() {
        "macos" => vec!["macos", "darwin", "osx"],
        "windows" => vec!["windows", "win32", "win64"],
        "linux" => vec!["linux"],
        _ => vec![],
    }
}

/// All names an asset might use for a canonical architecture.
pub fn arch_synonyms(arch: &str) -> Vec<&'static str> {
    match normalize_arch(arch).as_str() {
        "arm64" => vec!["arm64", "aarch64"],
        "x86_64" => vec!["amd64", "x86_64", "x64"],
        "386" => vec!["386", "i386", "x86"],
        _ => vec![],
    }
}

/// Substitutes `{os}`, `{arch}` and `{version}` placeholders in a URL or
/// asset-pattern template.
pub fn substitute_placeholders(template: &str, os: &str, arch: &str, version: &str) -> String {
    template
        .replace("{os}", os)
        .replace("{arch}", arch)
        .replace("{version}", version)
}

/// Names that are never the binary we want, whatever the platform match
/// says: checksums, signatures, source tarballs, debug builds.
fn is_non_binary_asset(name_lower: &str) -> bool {
    name_lower.contains("checksum")
        || name_lower.contains("sha256")
        || name_lower.contains(".sbom")
        || name_lower.contains("src")
        || name_lower.contains("source")
        || name_lower.contains("debug")
        || name_lower.ends_with(".sig")
        || name_lower.ends_with(".asc")
        || name_lower.ends_with(".pem")
        || name_lower.ends_with(".txt")
}

/// Whether an asset filename matches the given OS and architecture, with
/// synonym expansion on both axes.
pub fn asset_matches_platform(filename: &str, os: &str, arch: &str) -> bool {
    let name = filename.to_lowercase();
    if is_non_binary_asset(&name) {
        log_debug!("[Platform] Asset '{}' excluded as a non-binary artifact.", filename.dimmed());
        return false;
    }
    let os_hit = os_synonyms(os).iter().any(|s| name.contains(s));
    let arch_hit = arch_synonyms(arch).iter().any(|s| name.contains(s));
    os_hit && arch_hit
}

/// Weaker fallback: OS matches and no architecture marker contradicts.
/// Release pages that build a single artifact per OS often omit the
/// architecture entirely.
pub fn asset_matches_os_only(filename: &str, os: &str) -> bool {
    let name = filename.to_lowercase();
    if is_non_binary_asset(&name) {
        return false;
    }
    os_synonyms(os).iter().any(|s| name.contains(s))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalization_covers_the_synonym_sets() {
        assert_eq!(normalize_os("Darwin"), "macos");
        assert_eq!(normalize_os("osx"), "macos");
        assert_eq!(normalize_arch("AARCH64"), "arm64");
        assert_eq!(normalize_arch("amd64"), "x86_64");
        assert_eq!(normalize_arch("i386"), "386");
    }

    #[test]
    fn exact_platform_match_expands_synonyms() {
        assert!(asset_matches_platform("tool_1.0_darwin_aarch64.tar.gz", "macos", "arm64"));
        assert!(asset_matches_platform("tool-linux-amd64.tar.gz", "linux", "x86_64"));
        assert!(!asset_matches_platform("tool-linux-amd64.tar.gz", "linux", "arm64"));
        assert!(!asset_matches_platform("tool-windows-x64.zip", "linux", "x86_64"));
    }

    #[test]
    fn checksums_and_signatures_never_match() {
        assert!(!asset_matches_platform("tool-linux-amd64.tar.gz.sha256", "linux", "x86_64"));
        assert!(!asset_matches_platform("checksums.txt", "linux", "x86_64"));
        assert!(!asset_matches_os_only("tool-linux-amd64.tar.gz.asc", "linux"));
    }

    #[test]
    fn os_only_fallback_ignores_arch() {
        assert!(asset_matches_os_only("tool-macos.tar.gz", "macos"));
        assert!(!asset_matches_os_only("tool-macos.tar.gz", "linux"));
    }

    #[test]
    fn placeholder_substitution() {
        let url = substitute_placeholders(
            "https://dl.k8s.io/release/v{version}/bin/{os}/{arch}/kubectl",
            "linux",
            "x86_64",
            "1.29.0",
        );
        assert_eq!(url, "https://dl.k8s.io/release/v1.29.0/bin/linux/x86_64/kubectl");
    }
}
