//! App bundle layout and library searching inside the prefix.

use std::fs;
use std::path::{Path, PathBuf};

/// Locations inside a `.app` bundle that the tool reads and writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleLayout {
    /// `Contents/MacOS/<executable>`
    pub executable: PathBuf,
    /// `Contents/Frameworks`
    pub frameworks: PathBuf,
}

impl BundleLayout {
    pub fn new(app: &Path, executable_name: &str) -> Self {
        let contents = app.join("Contents");
        Self {
            executable: contents.join("MacOS").join(executable_name),
            frameworks: contents.join("Frameworks"),
        }
    }

    /// Where a library with this file name lives in the bundle.
    pub fn library(&self, basename: &str) -> PathBuf {
        self.frameworks.join(basename)
    }

    /// Whether `path` sits directly in `Contents/Frameworks`.
    pub fn is_bundled(&self, path: &Path) -> bool {
        path.parent() == Some(self.frameworks.as_path())
    }
}

/// Find a library by file name in the package-manager prefix.
///
/// Searches `<prefix>/lib` first, then `<prefix>/opt/*/lib` one level deep.
/// An unreadable `opt` directory is the same as not finding anything.
///
/// Returns `None` if the library is not found in any search path.
#[must_use = "found library path should be used"]
pub fn find_library(prefix: &Path, lib_name: &str) -> Option<PathBuf> {
    let direct = prefix.join("lib").join(lib_name);
    if direct.exists() {
        return Some(direct);
    }

    let entries = fs::read_dir(prefix.join("opt")).ok()?;
    let mut formulae: Vec<PathBuf> = entries.filter_map(|e| e.ok()).map(|e| e.path()).collect();
    formulae.sort();

    formulae
        .into_iter()
        .map(|formula| formula.join("lib").join(lib_name))
        .find(|candidate| candidate.exists())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_mock_library(path: &Path) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, "mock dylib\n").unwrap();
    }

    #[test]
    fn test_bundle_layout() {
        let layout = BundleLayout::new(Path::new("/Apps/Helper.app"), "gs");
        assert_eq!(
            layout.executable,
            PathBuf::from("/Apps/Helper.app/Contents/MacOS/gs")
        );
        assert_eq!(
            layout.library("libz.dylib"),
            PathBuf::from("/Apps/Helper.app/Contents/Frameworks/libz.dylib")
        );
        assert!(layout.is_bundled(&layout.library("libz.dylib")));
        assert!(!layout.is_bundled(&layout.executable));
    }

    #[test]
    fn test_find_library_prefers_lib() {
        let temp = TempDir::new().unwrap();
        let prefix = temp.path();
        let lib_path = prefix.join("lib/libtiff.6.dylib");
        create_mock_library(&lib_path);
        create_mock_library(&prefix.join("opt/libtiff/lib/libtiff.6.dylib"));

        assert_eq!(find_library(prefix, "libtiff.6.dylib"), Some(lib_path));
    }

    #[test]
    fn test_find_library_in_opt() {
        let temp = TempDir::new().unwrap();
        let prefix = temp.path();
        fs::create_dir_all(prefix.join("lib")).unwrap();
        let lib_path = prefix.join("opt/webp/lib/libsharpyuv.0.dylib");
        create_mock_library(&lib_path);

        assert_eq!(find_library(prefix, "libsharpyuv.0.dylib"), Some(lib_path));
    }

    #[test]
    fn test_find_library_is_not_recursive() {
        let temp = TempDir::new().unwrap();
        let prefix = temp.path();
        create_mock_library(&prefix.join("opt/webp/lib/nested/libdeep.dylib"));
        create_mock_library(&prefix.join("Cellar/webp/1.4.0/lib/libdeep.dylib"));

        assert!(find_library(prefix, "libdeep.dylib").is_none());
    }

    #[test]
    fn test_find_library_missing_prefix() {
        let temp = TempDir::new().unwrap();
        assert!(find_library(&temp.path().join("nowhere"), "libz.dylib").is_none());
    }
}
