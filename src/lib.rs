//! Mach-O dylib bundling for macOS app bundles.
//!
//! Uses `otool -L` and `install_name_tool` to copy every Homebrew dylib an
//! executable needs into `Contents/Frameworks` and rewrite the references
//! to `@rpath/<name>`, so the app never loads from the Homebrew prefix.

mod analyze;
mod bundle;
mod config;
mod copy;
mod paths;
mod relocate;
mod tools;

pub use analyze::{
    collect_external_closure, is_external_library, is_rpath_library, library_basename,
    parse_otool_output, rpath_reference,
};
pub use bundle::{bundle_app, BundleReport, ReferenceChange};
pub use config::{BundleConfig, DEFAULT_EXECUTABLE, DEFAULT_PREFIX, DEFAULT_RPATH};
pub use copy::{
    apply_sharpyuv_alias, copy_library_if_changed, create_symlink_if_missing, make_executable,
    CopyStatus, SHARPYUV_ALIAS, SHARPYUV_VERSIONED,
};
pub use paths::{find_library, BundleLayout};
pub use relocate::Relocator;
pub use tools::{ToolOutcome, Toolchain, XcodeTools};
