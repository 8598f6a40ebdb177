//! External Mach-O tools: otool, install_name_tool and codesign.
//!
//! Everything that touches Mach-O metadata goes through [`Toolchain`] so the
//! traversal logic never parses binaries itself and tests can swap in a fake.

use anyhow::{bail, Context, Result};
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::analyze::parse_otool_output;
use crate::config::BundleConfig;

/// Result of a best-effort tool invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolOutcome {
    /// The tool ran and exited successfully.
    Succeeded,
    /// The tool ran but reported failure.
    Failed { status: Option<i32>, stderr: String },
    /// The tool could not be started at all.
    NotRun { reason: String },
}

impl ToolOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ToolOutcome::Succeeded)
    }

    /// Run a prepared command and classify what happened.
    pub fn from_command(cmd: &mut Command) -> Self {
        match cmd.output() {
            Ok(output) if output.status.success() => ToolOutcome::Succeeded,
            Ok(output) => ToolOutcome::Failed {
                status: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            },
            Err(e) => ToolOutcome::NotRun {
                reason: format!("{}: {}", cmd.get_program().to_string_lossy(), e),
            },
        }
    }
}

impl fmt::Display for ToolOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ToolOutcome::Succeeded => write!(f, "ok"),
            ToolOutcome::Failed {
                status: Some(code),
                stderr,
            } => write!(f, "exit status {}: {}", code, stderr),
            ToolOutcome::Failed { status: None, stderr } => {
                write!(f, "terminated by signal: {}", stderr)
            }
            ToolOutcome::NotRun { reason } => write!(f, "could not run: {}", reason),
        }
    }
}

/// Inspection and patching operations on Mach-O files.
pub trait Toolchain {
    /// Ordered dependency references declared by `binary`.
    ///
    /// An error means the file could not be inspected; callers treat that
    /// binary as having no dependencies.
    fn dependencies(&self, binary: &Path) -> Result<Vec<String>>;

    /// Set a library's own install name.
    fn set_id(&self, binary: &Path, id: &str) -> ToolOutcome;

    /// Replace the dependency reference `old` with `new`. A reference the
    /// binary does not declare is left alone.
    fn change_reference(&self, binary: &Path, old: &str, new: &str) -> ToolOutcome;

    /// Append a runtime search path.
    fn add_rpath(&self, binary: &Path, rpath: &str) -> ToolOutcome;

    /// Apply an ad-hoc signature without a timestamp.
    fn sign(&self, binary: &Path) -> ToolOutcome;
}

/// [`Toolchain`] backed by the Xcode command line tools.
#[derive(Debug, Clone)]
pub struct XcodeTools {
    otool: PathBuf,
    install_name_tool: PathBuf,
    codesign: PathBuf,
}

impl XcodeTools {
    pub fn new(config: &BundleConfig) -> Self {
        Self {
            otool: config.otool.clone(),
            install_name_tool: config.install_name_tool.clone(),
            codesign: config.codesign.clone(),
        }
    }

    fn install_name_tool(&self) -> Command {
        Command::new(&self.install_name_tool)
    }
}

impl Toolchain for XcodeTools {
    fn dependencies(&self, binary: &Path) -> Result<Vec<String>> {
        if !binary.exists() {
            bail!("File does not exist: {}", binary.display());
        }

        let output = Command::new(&self.otool)
            .arg("-L")
            .arg(binary)
            .output()
            .context("otool command not found - install the Xcode command line tools")?;

        if !output.status.success() {
            bail!(
                "otool failed on {}: {}",
                binary.display(),
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        Ok(parse_otool_output(&String::from_utf8_lossy(&output.stdout)))
    }

    fn set_id(&self, binary: &Path, id: &str) -> ToolOutcome {
        ToolOutcome::from_command(self.install_name_tool().arg("-id").arg(id).arg(binary))
    }

    fn change_reference(&self, binary: &Path, old: &str, new: &str) -> ToolOutcome {
        ToolOutcome::from_command(
            self.install_name_tool()
                .arg("-change")
                .arg(old)
                .arg(new)
                .arg(binary),
        )
    }

    fn add_rpath(&self, binary: &Path, rpath: &str) -> ToolOutcome {
        ToolOutcome::from_command(
            self.install_name_tool()
                .arg("-add_rpath")
                .arg(rpath)
                .arg(binary),
        )
    }

    fn sign(&self, binary: &Path) -> ToolOutcome {
        ToolOutcome::from_command(
            Command::new(&self.codesign)
                .args(["--force", "--sign", "-", "--timestamp=none"])
                .arg(binary),
        )
    }
}
