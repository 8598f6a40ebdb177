//! Copying prefix dylibs into the bundle and rewriting install names.
//!
//! Relocation runs in two phases. [`Relocator::relocate_closure`] handles
//! the libraries found by the closure walk: copy, add the rpath, set ids and
//! rewrite references. Once rewritten, `otool -L` only shows `@rpath/name`
//! for those references, so [`Relocator::resolve_rpath_libraries`] scans the
//! bundle again and pulls in anything still missing by file name.

use anyhow::Result;
use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};
use std::path::{Path, PathBuf};

use crate::analyze::{is_external_library, is_rpath_library, library_basename, rpath_reference};
use crate::bundle::{BundleReport, ReferenceChange};
use crate::copy::{copy_executable, copy_library_if_changed, CopyStatus};
use crate::paths::{find_library, BundleLayout};
use crate::tools::Toolchain;

/// Rewrites one bundle in place and records what happened.
pub struct Relocator<'a> {
    tools: &'a dyn Toolchain,
    prefix: &'a Path,
    layout: &'a BundleLayout,
    report: BundleReport,
    /// Bundled libraries whose contents or metadata changed this run.
    touched: BTreeSet<PathBuf>,
}

impl<'a> Relocator<'a> {
    pub fn new(tools: &'a dyn Toolchain, prefix: &'a Path, layout: &'a BundleLayout) -> Self {
        Self {
            tools,
            prefix,
            layout,
            report: BundleReport::default(),
            touched: BTreeSet::new(),
        }
    }

    /// Copy every library in `closure` into the bundle and point the
    /// executable and the copies at each other through `@rpath`.
    ///
    /// Returns the bundled paths, one per distinct file name.
    pub fn relocate_closure(
        &mut self,
        closure: &BTreeSet<String>,
        rpath: &str,
    ) -> Result<BTreeSet<PathBuf>> {
        let mut replacements = BTreeMap::new();
        let mut bundled = BTreeSet::new();

        for src in closure {
            let Some(base) = library_basename(src) else {
                continue;
            };
            if !Path::new(src).exists() {
                tracing::debug!("{} is referenced but missing from the prefix", src);
                self.note_unresolved(src);
                continue;
            }
            let dest = self.layout.library(base);
            match copy_library_if_changed(Path::new(src), &dest)? {
                CopyStatus::Copied => {
                    tracing::info!("COPY {} -> {}", src, dest.display());
                    self.report.copied.push(dest.clone());
                }
                CopyStatus::Unchanged => {
                    tracing::debug!("SKIP {} (same size in bundle)", dest.display());
                    self.report.unchanged.push(dest.clone());
                }
            }
            replacements.insert(src.clone(), rpath_reference(base));
            bundled.insert(dest);
        }

        let layout = self.layout;
        let executable = &layout.executable;
        tracing::info!("ADD_RPATH {} {}", executable.display(), rpath);
        let outcome = self.tools.add_rpath(executable, rpath);
        if !outcome.is_success() {
            tracing::warn!("add_rpath failed for {}: {}", executable.display(), outcome);
        }
        self.report.rpath = Some(outcome);

        for dest in &bundled {
            self.assign_rpath_id(dest);
        }

        self.rewrite_references(executable, &replacements);
        for dest in &bundled {
            self.rewrite_references(dest, &replacements);
        }

        Ok(bundled)
    }

    /// Set a bundled library's install name to `@rpath/<file name>`.
    fn assign_rpath_id(&mut self, library: &Path) {
        let Some(base) = library.file_name().and_then(|n| n.to_str()) else {
            return;
        };
        let id = rpath_reference(base);
        tracing::info!("ID {} -> {}", library.display(), id);
        let outcome = self.tools.set_id(library, &id);
        if !outcome.is_success() {
            tracing::warn!("setting id of {} failed: {}", library.display(), outcome);
        }
        self.report.ids.push((library.to_path_buf(), outcome));
        self.touched.insert(library.to_path_buf());
    }

    /// Replace every reference in `binary` that has an entry in
    /// `replacements`. References not declared by `binary` are untouched.
    pub fn rewrite_references(&mut self, binary: &Path, replacements: &BTreeMap<String, String>) {
        let deps = match self.tools.dependencies(binary) {
            Ok(deps) => deps,
            Err(e) => {
                tracing::warn!("cannot inspect {}, leaving references: {:#}", binary.display(), e);
                self.report.uninspectable.push(binary.to_path_buf());
                return;
            }
        };

        for dep in deps {
            if let Some(new) = replacements.get(&dep) {
                self.change_reference(binary, &dep, new);
            }
        }
    }

    fn change_reference(&mut self, binary: &Path, old: &str, new: &str) {
        tracing::info!("CHANGE {} {} -> {}", binary.display(), old, new);
        let outcome = self.tools.change_reference(binary, old, new);
        if !outcome.is_success() {
            tracing::warn!("changing {} in {} failed: {}", old, binary.display(), outcome);
        }
        self.report.changes.push(ReferenceChange {
            binary: binary.to_path_buf(),
            old: old.to_string(),
            new: new.to_string(),
            outcome,
        });
    }

    /// Scan `scan` and everything added along the way until every
    /// `@rpath/*.dylib` reference that can be found in the prefix is present
    /// in `Contents/Frameworks`.
    ///
    /// Each binary is inspected once. Newly copied libraries get an `@rpath`
    /// id, and any prefix reference left on a scanned binary is bundled and
    /// rewritten as well. Libraries that cannot be located are skipped.
    pub fn resolve_rpath_libraries(&mut self, scan: Vec<PathBuf>) -> Result<()> {
        let mut queue: VecDeque<PathBuf> = scan.into();
        let mut seen = HashSet::new();

        while let Some(binary) = queue.pop_front() {
            if !seen.insert(binary.clone()) {
                continue;
            }

            let deps = match self.tools.dependencies(&binary) {
                Ok(deps) => deps,
                Err(e) => {
                    tracing::debug!("skipping {}: {:#}", binary.display(), e);
                    self.report.uninspectable.push(binary.clone());
                    continue;
                }
            };

            for dep in deps {
                if is_rpath_library(&dep) {
                    if let Some(added) = self.bundle_by_name(&dep)? {
                        queue.push_back(added);
                    }
                } else if is_external_library(&dep, self.prefix) {
                    if let Some(added) = self.bundle_external(&binary, &dep)? {
                        queue.push_back(added);
                    }
                }
            }
        }

        Ok(())
    }

    /// Bring in the target of an `@rpath/` reference if it is missing.
    fn bundle_by_name(&mut self, reference: &str) -> Result<Option<PathBuf>> {
        let Some(base) = library_basename(reference) else {
            return Ok(None);
        };
        let want = self.layout.library(base);
        if want.exists() {
            return Ok(None);
        }
        let Some(src) = find_library(self.prefix, base) else {
            tracing::debug!("{} not found under {}", base, self.prefix.display());
            self.note_unresolved(reference);
            return Ok(None);
        };

        tracing::info!("COPY_RPATH {} -> {}", src.display(), want.display());
        copy_executable(&src, &want)?;
        self.report.resolved.push(want.clone());
        self.assign_rpath_id(&want);
        Ok(Some(want))
    }

    /// Handle a prefix reference that survived the first phase, typically
    /// one declared by a library the resolver just copied.
    fn bundle_external(&mut self, binary: &Path, reference: &str) -> Result<Option<PathBuf>> {
        let Some(base) = library_basename(reference) else {
            return Ok(None);
        };
        let want = self.layout.library(base);
        let mut added = None;

        if binary == want {
            // The library's own install name; already reassigned on copy.
            return Ok(None);
        }

        if !want.exists() {
            let src = Path::new(reference);
            if !src.exists() {
                tracing::debug!("{} referenced by {} does not exist", reference, binary.display());
                self.note_unresolved(reference);
                return Ok(None);
            }
            tracing::info!("COPY_RPATH {} -> {}", reference, want.display());
            copy_executable(src, &want)?;
            self.report.resolved.push(want.clone());
            self.assign_rpath_id(&want);
            added = Some(want);
        }

        self.change_reference(binary, reference, &rpath_reference(base));
        if self.layout.is_bundled(binary) {
            self.touched.insert(binary.to_path_buf());
        }
        Ok(added)
    }

    fn note_unresolved(&mut self, reference: &str) {
        if !self.report.unresolved.iter().any(|r| r == reference) {
            self.report.unresolved.push(reference.to_string());
        }
    }

    /// Ad-hoc sign the executable and every bundled library touched so far.
    pub fn sign_touched(&mut self) {
        let targets = std::iter::once(self.layout.executable.clone())
            .chain(self.touched.iter().cloned())
            .collect::<Vec<_>>();

        for target in targets {
            if !target.exists() {
                continue;
            }
            let outcome = self.tools.sign(&target);
            if outcome.is_success() {
                tracing::info!("CODESIGN {}", target.display());
            } else {
                tracing::warn!("codesign failed for {}: {}", target.display(), outcome);
            }
            self.report.signatures.push((target, outcome));
        }
    }

    pub fn report_mut(&mut self) -> &mut BundleReport {
        &mut self.report
    }

    pub fn into_report(self) -> BundleReport {
        self.report
    }
}
