//! Bundling configuration.

use std::path::PathBuf;

/// Default package-manager prefix searched for libraries.
pub const DEFAULT_PREFIX: &str = "/opt/homebrew";

/// Default name of the executable inside `Contents/MacOS`.
pub const DEFAULT_EXECUTABLE: &str = "gs";

/// Search path added to the executable so `@rpath/` references resolve
/// into `Contents/Frameworks`.
pub const DEFAULT_RPATH: &str = "@executable_path/../Frameworks";

/// Settings for one bundling run.
///
/// The prefix is a value rather than a constant so tests (and users with a
/// non-standard Homebrew install) can point the tool at another tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleConfig {
    /// Package-manager installation root, e.g. `/opt/homebrew`.
    pub prefix: PathBuf,
    /// File name of the executable in `Contents/MacOS`.
    pub executable_name: String,
    /// Search path added to the executable.
    pub rpath: String,
    /// Program used to list dependencies.
    pub otool: PathBuf,
    /// Program used to rewrite install names.
    pub install_name_tool: PathBuf,
    /// Program used for ad-hoc signing.
    pub codesign: PathBuf,
}

impl Default for BundleConfig {
    fn default() -> Self {
        Self {
            prefix: PathBuf::from(DEFAULT_PREFIX),
            executable_name: DEFAULT_EXECUTABLE.to_string(),
            rpath: DEFAULT_RPATH.to_string(),
            otool: PathBuf::from("otool"),
            install_name_tool: PathBuf::from("install_name_tool"),
            codesign: PathBuf::from("/usr/bin/codesign"),
        }
    }
}

impl BundleConfig {
    /// Default configuration rooted at another prefix.
    pub fn with_prefix(prefix: impl Into<PathBuf>) -> Self {
        Self {
            prefix: prefix.into(),
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_target_homebrew_gs() {
        let config = BundleConfig::default();
        assert_eq!(config.prefix, PathBuf::from("/opt/homebrew"));
        assert_eq!(config.executable_name, "gs");
        assert_eq!(config.rpath, "@executable_path/../Frameworks");
    }

    #[test]
    fn test_with_prefix_keeps_other_defaults() {
        let config = BundleConfig::with_prefix("/usr/local");
        assert_eq!(config.prefix, PathBuf::from("/usr/local"));
        assert_eq!(config.codesign, PathBuf::from("/usr/bin/codesign"));
    }
}
