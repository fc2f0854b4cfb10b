// Small path conveniences shared across the crate.

use std::path::PathBuf;

/// Resolves a user-supplied path: `~` and environment variables are
/// expanded, so inputs like `~/bin/kubectl` or `$HOME/downloads/tool` work
/// the way the shell user expects.
pub fn expand_user_path(path: &str) -> PathBuf {
    match shellexpand::full(path) {
        Ok(expanded) => PathBuf::from(expanded.into_owned()),
        // On a missing variable, fall back to plain tilde expansion so the
        // error surfaces at the file operation with the literal path visible.
        Err(_) => PathBuf::from(shellexpand::tilde(path).into_owned()),
    }
}

/// The basename of argv[0], with any `.exe` suffix stripped. This is how a
/// shim learns which tool it is standing in for.
pub fn invocation_name(argv0: &str) -> String {
    let base = std::path::Path::new(argv0)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(argv0);
    base.strip_suffix(".exe").unwrap_or(base).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tilde_expansion_produces_an_absolute_path() {
        if dirs::home_dir().is_some() {
            let p = expand_user_path("~/downloads/tool");
            assert!(p.is_absolute());
            assert!(p.ends_with("downloads/tool"));
        }
    }

    #[test]
    fn invocation_name_strips_directory_and_exe_suffix() {
        assert_eq!(invocation_name("/tree/shims/kubectl"), "kubectl");
        assert_eq!(invocation_name("kubectl.exe"), "kubectl");
        assert_eq!(invocation_name("rg"), "rg");
    }
}
