//! Mach-O dependency analysis on top of `otool -L`.

use std::collections::{BTreeSet, HashSet, VecDeque};
use std::path::{Path, PathBuf};

use crate::tools::Toolchain;

/// Marker every shared library reference we care about contains.
pub const DYLIB_EXTENSION: &str = ".dylib";

/// Prefix of references resolved through the loader's search paths.
pub const RPATH_PREFIX: &str = "@rpath/";

/// Parse `otool -L` output into dependency references.
///
/// Example otool output:
/// ```text
/// /opt/homebrew/bin/gs:
///         /opt/homebrew/opt/libpng/lib/libpng16.16.dylib (compatibility version 61.0.0, current version 61.0.0)
///         /usr/lib/libSystem.B.dylib (compatibility version 1.0.0, current version 1345.100.2)
/// ```
///
/// The first line names the inspected file and is skipped. For a dylib the
/// first reference is its own install name.
pub fn parse_otool_output(output: &str) -> Vec<String> {
    output
        .lines()
        .skip(1)
        .filter_map(|line| line.split_whitespace().next())
        .map(str::to_string)
        .collect()
}

/// True if `reference` is a dylib under the package-manager `prefix`.
pub fn is_external_library(reference: &str, prefix: &Path) -> bool {
    Path::new(reference).starts_with(prefix) && reference.contains(DYLIB_EXTENSION)
}

/// True if `reference` is an `@rpath/...dylib` reference.
pub fn is_rpath_library(reference: &str) -> bool {
    reference.starts_with(RPATH_PREFIX) && reference.ends_with(DYLIB_EXTENSION)
}

/// File name component of a reference, if it has one.
pub fn library_basename(reference: &str) -> Option<&str> {
    Path::new(reference).file_name().and_then(|name| name.to_str())
}

/// The `@rpath/` form of a library file name.
pub fn rpath_reference(basename: &str) -> String {
    format!("{}{}", RPATH_PREFIX, basename)
}

/// Collect every prefix dylib transitively required by `binary_path`.
///
/// Breadth-first over the reported references. Each path is inspected at
/// most once, so cycles terminate. Files that cannot be inspected are
/// skipped and contribute nothing.
pub fn collect_external_closure(
    tools: &dyn Toolchain,
    prefix: &Path,
    binary_path: &Path,
) -> BTreeSet<String> {
    let mut external = BTreeSet::new();
    let mut queue = VecDeque::from([binary_path.to_path_buf()]);
    let mut seen: HashSet<PathBuf> = HashSet::new();

    while let Some(path) = queue.pop_front() {
        if !seen.insert(path.clone()) {
            continue;
        }

        let deps = match tools.dependencies(&path) {
            Ok(deps) => deps,
            Err(e) => {
                tracing::debug!("skipping {}: {:#}", path.display(), e);
                continue;
            }
        };

        for dep in deps {
            if !is_external_library(&dep, prefix) {
                continue;
            }
            let dep_path = PathBuf::from(&dep);
            if !seen.contains(&dep_path) {
                queue.push_back(dep_path);
            }
            external.insert(dep);
        }
    }

    external
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_otool_output() {
        let output = "/opt/homebrew/bin/gs:
\t/opt/homebrew/opt/libpng/lib/libpng16.16.dylib (compatibility version 61.0.0, current version 61.0.0)
\t@rpath/libz.1.dylib (compatibility version 1.0.0, current version 1.3.1)

\t/usr/lib/libSystem.B.dylib (compatibility version 1.0.0, current version 1345.100.2)
";
        assert_eq!(
            parse_otool_output(output),
            vec![
                "/opt/homebrew/opt/libpng/lib/libpng16.16.dylib",
                "@rpath/libz.1.dylib",
                "/usr/lib/libSystem.B.dylib",
            ]
        );
    }

    #[test]
    fn test_parse_otool_header_only() {
        assert!(parse_otool_output("/tmp/notes.txt: is not an object file\n").is_empty());
    }

    #[test]
    fn test_is_external_library() {
        let prefix = Path::new("/opt/homebrew");
        assert!(is_external_library("/opt/homebrew/lib/libz.1.dylib", prefix));
        assert!(is_external_library(
            "/opt/homebrew/Cellar/jbig2dec/0.20/lib/libjbig2dec.0.dylib",
            prefix
        ));
        assert!(!is_external_library("/usr/lib/libSystem.B.dylib", prefix));
        assert!(!is_external_library("/opt/homebrew/lib/libz.a", prefix));
        assert!(!is_external_library("/opt/homebrew2/lib/libz.dylib", prefix));
        assert!(!is_external_library("@rpath/libz.1.dylib", prefix));
    }

    #[test]
    fn test_is_rpath_library() {
        assert!(is_rpath_library("@rpath/libpng16.16.dylib"));
        assert!(!is_rpath_library("@rpath/Foo.framework/Foo"));
        assert!(!is_rpath_library("@loader_path/libz.dylib"));
        assert!(!is_rpath_library("/opt/homebrew/lib/libz.dylib"));
    }

    #[test]
    fn test_classifiers_are_exclusive() {
        let prefix = Path::new("/opt/homebrew");
        for reference in [
            "/opt/homebrew/lib/libtiff.6.dylib",
            "@rpath/libtiff.6.dylib",
            "/System/Library/Frameworks/CoreFoundation.framework/Versions/A/CoreFoundation",
        ] {
            assert!(!(is_external_library(reference, prefix) && is_rpath_library(reference)));
        }
    }

    #[test]
    fn test_rpath_reference_uses_basename() {
        let base = library_basename("/opt/homebrew/lib/libpng16.dylib").unwrap();
        assert_eq!(rpath_reference(base), "@rpath/libpng16.dylib");
        assert_eq!(library_basename("@rpath/libz.dylib"), Some("libz.dylib"));
    }
}
