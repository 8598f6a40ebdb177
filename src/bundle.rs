//! End-to-end bundling of one executable into a `.app`.

use anyhow::{bail, Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

use crate::analyze::collect_external_closure;
use crate::config::BundleConfig;
use crate::copy::{apply_sharpyuv_alias, copy_executable, SHARPYUV_ALIAS, SHARPYUV_VERSIONED};
use crate::paths::BundleLayout;
use crate::relocate::Relocator;
use crate::tools::{ToolOutcome, Toolchain};

/// One `install_name_tool -change` attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceChange {
    pub binary: PathBuf,
    pub old: String,
    pub new: String,
    pub outcome: ToolOutcome,
}

/// Everything a bundling run did, including tolerated failures.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BundleReport {
    /// Closure libraries newly copied into `Contents/Frameworks`.
    pub copied: Vec<PathBuf>,
    /// Closure libraries already present with the same size.
    pub unchanged: Vec<PathBuf>,
    /// Libraries pulled in while resolving `@rpath` references.
    pub resolved: Vec<PathBuf>,
    /// References that could not be located in the prefix.
    pub unresolved: Vec<String>,
    /// Binaries that could not be inspected.
    pub uninspectable: Vec<PathBuf>,
    pub rpath: Option<ToolOutcome>,
    pub ids: Vec<(PathBuf, ToolOutcome)>,
    pub changes: Vec<ReferenceChange>,
    pub symlink_created: bool,
    pub signatures: Vec<(PathBuf, ToolOutcome)>,
}

impl BundleReport {
    /// Number of tool invocations that did not succeed.
    pub fn failures(&self) -> usize {
        let ids = self.ids.iter().filter(|(_, o)| !o.is_success()).count();
        let changes = self.changes.iter().filter(|c| !c.outcome.is_success()).count();
        let signatures = self.signatures.iter().filter(|(_, o)| !o.is_success()).count();
        let rpath = usize::from(self.rpath.as_ref().is_some_and(|o| !o.is_success()));
        ids + changes + signatures + rpath
    }
}

/// Make `app`'s executable self-contained with respect to `config.prefix`.
///
/// When `executable_src` is given it is copied to `Contents/MacOS` first.
///
/// # Errors
///
/// Returns an error if:
/// - `executable_src` is given but does not exist
/// - the executable is not in the bundle after setup
/// - creating directories or copying files into the bundle fails
///
/// Tool failures (otool, install_name_tool, codesign) are recorded in the
/// returned report instead.
pub fn bundle_app(
    config: &BundleConfig,
    tools: &dyn Toolchain,
    app: &Path,
    executable_src: Option<&Path>,
) -> Result<BundleReport> {
    let layout = BundleLayout::new(app, &config.executable_name);
    prepare_bundle(&layout, executable_src)?;

    let closure = collect_external_closure(tools, &config.prefix, &layout.executable);
    tracing::debug!("{} prefix libraries in closure", closure.len());

    let mut relocator = Relocator::new(tools, &config.prefix, &layout);
    let bundled = relocator.relocate_closure(&closure, &config.rpath)?;

    let scan = std::iter::once(layout.executable.clone())
        .chain(bundled)
        .collect();
    relocator.resolve_rpath_libraries(scan)?;

    if apply_sharpyuv_alias(&layout.frameworks)? {
        tracing::info!(
            "SYMLINK {} -> {}",
            layout.library(SHARPYUV_ALIAS).display(),
            SHARPYUV_VERSIONED
        );
        relocator.report_mut().symlink_created = true;
    }

    relocator.sign_touched();
    tracing::info!("DONE");

    Ok(relocator.into_report())
}

/// Create the bundle directories and put the executable in place.
fn prepare_bundle(layout: &BundleLayout, executable_src: Option<&Path>) -> Result<()> {
    if let Some(parent) = layout.executable.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    fs::create_dir_all(&layout.frameworks)
        .with_context(|| format!("Failed to create {}", layout.frameworks.display()))?;

    if let Some(src) = executable_src {
        if !src.exists() {
            bail!("gs-src not found: {}", src.display());
        }
        tracing::info!("COPY_GS {} -> {}", src.display(), layout.executable.display());
        copy_executable(src, &layout.executable)?;
    }

    if !layout.executable.exists() {
        bail!("gs not found in app: {}", layout.executable.display());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_counts_failures() {
        let failed = ToolOutcome::Failed {
            status: Some(1),
            stderr: "error".to_string(),
        };
        let report = BundleReport {
            rpath: Some(failed.clone()),
            ids: vec![(PathBuf::from("a.dylib"), ToolOutcome::Succeeded)],
            signatures: vec![
                (PathBuf::from("gs"), failed),
                (
                    PathBuf::from("b.dylib"),
                    ToolOutcome::NotRun {
                        reason: "missing".to_string(),
                    },
                ),
            ],
            ..BundleReport::default()
        };
        assert_eq!(report.failures(), 3);
    }
}
