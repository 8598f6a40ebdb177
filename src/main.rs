use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use dylib_bundle::{bundle_app, BundleConfig, XcodeTools, DEFAULT_EXECUTABLE, DEFAULT_PREFIX};

/// Bundle an executable and its Homebrew dylibs into a macOS .app so it
/// runs without access to the Homebrew prefix.
#[derive(Debug, Parser)]
#[command(name = "dylib-bundle", version, about)]
struct Cli {
    /// Path to the .app bundle
    app: PathBuf,

    /// Copy this executable into Contents/MacOS before bundling
    #[arg(long = "gs-src", value_name = "PATH")]
    gs_src: Option<PathBuf>,

    /// Package-manager prefix to pull libraries from
    #[arg(long, env = "DYLIB_BUNDLE_PREFIX", default_value = DEFAULT_PREFIX)]
    prefix: PathBuf,

    /// Executable name inside Contents/MacOS
    #[arg(long = "exe-name", default_value = DEFAULT_EXECUTABLE)]
    exe_name: String,
}

impl Cli {
    /// Resolve every path against the working directory. `otool` reports
    /// absolute paths, so a relative prefix would match nothing.
    fn into_config(self) -> Result<(BundleConfig, PathBuf, Option<PathBuf>)> {
        let prefix = std::path::absolute(&self.prefix)
            .with_context(|| format!("Invalid prefix: {}", self.prefix.display()))?;
        let app = std::path::absolute(&self.app)
            .with_context(|| format!("Invalid app path: {}", self.app.display()))?;
        let gs_src = self
            .gs_src
            .as_deref()
            .map(std::path::absolute)
            .transpose()
            .context("Invalid --gs-src path")?;

        let config = BundleConfig {
            prefix,
            executable_name: self.exe_name,
            ..BundleConfig::default()
        };
        Ok((config, app, gs_src))
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stdout)
        .with_target(false)
        .without_time()
        .init();

    let (config, app, gs_src) = Cli::parse().into_config()?;

    let tools = XcodeTools::new(&config);
    let report = bundle_app(&config, &tools, &app, gs_src.as_deref())?;

    let failures = report.failures();
    if failures > 0 {
        tracing::warn!("{} tool invocations failed; re-sign the bundle manually if needed", failures);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relative_paths_are_absolutized() {
        let cli = Cli::try_parse_from([
            "dylib-bundle",
            "Helper.app",
            "--prefix",
            "homebrew",
            "--gs-src",
            "bin/gs",
        ])
        .unwrap();
        let (config, app, gs_src) = cli.into_config().unwrap();

        let cwd = std::env::current_dir().unwrap();
        assert_eq!(config.prefix, cwd.join("homebrew"));
        assert_eq!(app, cwd.join("Helper.app"));
        assert_eq!(gs_src, Some(cwd.join("bin/gs")));
        assert_eq!(config.executable_name, "gs");
    }

    #[test]
    fn test_absolute_prefix_kept() {
        let cli = Cli::try_parse_from([
            "dylib-bundle",
            "/Applications/Helper.app",
            "--prefix",
            "/usr/local",
            "--exe-name",
            "gswin",
        ])
        .unwrap();
        let (config, app, gs_src) = cli.into_config().unwrap();

        assert_eq!(config.prefix, PathBuf::from("/usr/local"));
        assert_eq!(app, PathBuf::from("/Applications/Helper.app"));
        assert_eq!(gs_src, None);
        assert_eq!(config.executable_name, "gswin");
    }
}
