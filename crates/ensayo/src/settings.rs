//! Project settings loaded from `ensayo.yaml`.
//!
//! Every field has a default, so an absent or partial file is fine. Paths are
//! resolved against [`ProjectSettings::root`], which itself is resolved
//! against the directory holding the settings file.

use crate::command::CommandSpec;
use crate::options::{BrowserFamily, EngineKind};
use crate::result::EnsayoResult;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default settings file name
pub const SETTINGS_FILE: &str = "ensayo.yaml";

/// Everything the session needs beyond the invocation flags
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectSettings {
    /// Project root
    pub root: PathBuf,
    /// Test dependency installation
    pub install: CommandSpec,
    /// Clean and build commands
    pub build: BuildSettings,
    /// Static server
    pub server: ServerSettings,
    /// Browser engine defaults
    pub engine: EngineSettings,
    /// Test discovery and execution
    pub tests: TestSettings,
    /// Watch mode
    pub watch: WatchSettings,
    /// Report output
    pub report: ReportSettings,
}

impl Default for ProjectSettings {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            install: CommandSpec::new("npm")
                .args(["install", "--no-audit", "--no-fund"])
                .cwd("tests/e2e"),
            build: BuildSettings::default(),
            server: ServerSettings::default(),
            engine: EngineSettings::default(),
            tests: TestSettings::default(),
            watch: WatchSettings::default(),
            report: ReportSettings::default(),
        }
    }
}

impl ProjectSettings {
    /// Parse settings from YAML text
    pub fn from_yaml(yaml: &str) -> EnsayoResult<Self> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml_ng::from_str(yaml)?)
    }

    /// Load a settings file; `root` is resolved against the file's directory
    pub fn load(path: &Path) -> EnsayoResult<Self> {
        let text = std::fs::read_to_string(path)?;
        let mut settings = Self::from_yaml(&text)?;
        let base = path.parent().unwrap_or_else(|| Path::new("."));
        settings.root = base.join(&settings.root);
        tracing::debug!(path = %path.display(), root = %settings.root.display(), "loaded settings");
        Ok(settings)
    }

    /// Load `ensayo.yaml` from `dir`, falling back to defaults rooted there
    pub fn discover(dir: &Path) -> EnsayoResult<Self> {
        let path = dir.join(SETTINGS_FILE);
        if path.is_file() {
            Self::load(&path)
        } else {
            tracing::debug!(dir = %dir.display(), "no settings file, using defaults");
            Ok(Self {
                root: dir.to_path_buf(),
                ..Self::default()
            })
        }
    }

    /// Directory the static server serves
    #[must_use]
    pub fn serve_dir(&self) -> PathBuf {
        let dir = if self.server.compiled {
            &self.server.compiled_dir
        } else {
            &self.server.source_dir
        };
        self.root.join(dir)
    }

    /// Retries per test for the current environment
    #[must_use]
    pub fn retries(&self, ci: bool) -> u32 {
        if ci {
            self.tests.ci_retries
        } else {
            0
        }
    }
}

/// Clean and build commands
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildSettings {
    /// Removes previous build output
    pub clean: CommandSpec,
    /// Builds the project; `{config}` is replaced by the variant
    pub build: CommandSpec,
}

impl Default for BuildSettings {
    fn default() -> Self {
        Self {
            clean: CommandSpec::new("npm").args(["run", "clean"]),
            build: CommandSpec::new("npm").args(["run", "build", "--", "--config={config}"]),
        }
    }
}

/// Static server settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// Bind host
    pub host: String,
    /// Bind port; 0 picks a free port
    pub port: u16,
    /// Build output directory
    pub compiled_dir: PathBuf,
    /// Source directory, served when `compiled` is false
    pub source_dir: PathBuf,
    /// Serve build output rather than sources
    pub compiled: bool,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8123,
            compiled_dir: PathBuf::from("dist"),
            source_dir: PathBuf::from("."),
            compiled: true,
        }
    }
}

/// Engine defaults
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Engine when `--engine` is not given
    pub default: EngineKind,
    /// Browsers when `--browsers` is not given
    pub browsers: Vec<BrowserFamily>,
    /// Viewport width
    pub viewport_width: u32,
    /// Viewport height
    pub viewport_height: u32,
    /// Chromium executable for the CDP engine
    pub chromium_path: Option<PathBuf>,
    /// Keep the Chromium sandbox enabled
    pub sandbox: bool,
    /// Node.js binary for the Playwright engine
    pub node: String,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            default: EngineKind::Cdp,
            browsers: vec![BrowserFamily::Chromium],
            viewport_width: 1280,
            viewport_height: 720,
            chromium_path: None,
            sandbox: true,
            node: "node".to_string(),
        }
    }
}

/// Test discovery and execution settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TestSettings {
    /// Default discovery patterns, relative to the root
    pub patterns: Vec<String>,
    /// Tests slower than this are flagged
    pub slow_ms: u64,
    /// Per-attempt timeout
    pub timeout_ms: u64,
    /// Retries applied in CI only
    pub ci_retries: u32,
}

impl Default for TestSettings {
    fn default() -> Self {
        Self {
            patterns: vec!["tests/e2e/**/*.e2e.yaml".to_string()],
            slow_ms: 2000,
            timeout_ms: 30_000,
            ci_retries: 2,
        }
    }
}

impl TestSettings {
    /// Slow threshold
    #[must_use]
    pub const fn slow(&self) -> Duration {
        Duration::from_millis(self.slow_ms)
    }

    /// Per-attempt timeout
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Watch mode settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchSettings {
    /// Per-file debounce
    pub debounce_ms: u64,
    /// Paths never re-run
    pub ignore: Vec<String>,
}

impl Default for WatchSettings {
    fn default() -> Self {
        Self {
            debounce_ms: 300,
            ignore: vec![
                "**/node_modules/**".to_string(),
                "**/target/**".to_string(),
                "**/.git/**".to_string(),
            ],
        }
    }
}

/// Report output settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportSettings {
    /// Write a JUnit XML report here (relative to the root)
    pub junit: Option<PathBuf>,
}

/// Whether the process runs under continuous integration.
///
/// Reads the `CI` environment variable.
#[must_use]
pub fn is_ci() -> bool {
    ci_from_value(std::env::var("CI").ok().as_deref())
}

fn ci_from_value(value: Option<&str>) -> bool {
    match value {
        None => false,
        Some(v) => {
            let v = v.trim();
            !(v.is_empty() || v == "0" || v.eq_ignore_ascii_case("false"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod defaults_tests {
        use super::*;

        #[test]
        fn test_defaults() {
            let settings = ProjectSettings::default();
            assert_eq!(settings.server.host, "127.0.0.1");
            assert_eq!(settings.server.port, 8123);
            assert_eq!(settings.tests.patterns, vec!["tests/e2e/**/*.e2e.yaml"]);
            assert_eq!(settings.engine.default, EngineKind::Cdp);
            assert_eq!(settings.install.cwd.as_deref(), Some(Path::new("tests/e2e")));
        }

        #[test]
        fn test_retries_only_in_ci() {
            let settings = ProjectSettings::default();
            assert_eq!(settings.retries(false), 0);
            assert_eq!(settings.retries(true), 2);
        }

        #[test]
        fn test_serve_dir() {
            let mut settings = ProjectSettings::default();
            settings.root = PathBuf::from("/srv/app");
            assert_eq!(settings.serve_dir(), Path::new("/srv/app/dist"));
            settings.server.compiled = false;
            assert_eq!(settings.serve_dir(), Path::new("/srv/app/."));
        }
    }

    mod yaml_tests {
        use super::*;

        #[test]
        fn test_empty_is_default() {
            assert_eq!(ProjectSettings::from_yaml("").unwrap(), ProjectSettings::default());
        }

        #[test]
        fn test_partial_override() {
            let yaml = r"
server:
  port: 0
tests:
  patterns: [specs/*.yaml, more/**/*.yaml]
engine:
  default: playwright
  browsers: [firefox, webkit]
";
            let settings = ProjectSettings::from_yaml(yaml).unwrap();
            assert_eq!(settings.server.port, 0);
            assert_eq!(settings.server.host, "127.0.0.1");
            assert_eq!(settings.tests.patterns.len(), 2);
            assert_eq!(settings.tests.slow_ms, 2000);
            assert_eq!(settings.engine.default, EngineKind::Playwright);
            assert_eq!(
                settings.engine.browsers,
                vec![BrowserFamily::Firefox, BrowserFamily::Webkit]
            );
        }

        #[test]
        fn test_invalid_yaml() {
            assert!(ProjectSettings::from_yaml("server: [").is_err());
        }

        #[test]
        fn test_unknown_engine_rejected() {
            assert!(ProjectSettings::from_yaml("engine:\n  default: selenium\n").is_err());
        }
    }

    mod file_tests {
        use super::*;

        #[test]
        fn test_load_resolves_root() {
            let dir = tempfile::tempdir().unwrap();
            std::fs::write(dir.path().join(SETTINGS_FILE), "root: app\n").unwrap();
            let settings = ProjectSettings::discover(dir.path()).unwrap();
            assert_eq!(settings.root, dir.path().join("app"));
        }

        #[test]
        fn test_discover_without_file() {
            let dir = tempfile::tempdir().unwrap();
            let settings = ProjectSettings::discover(dir.path()).unwrap();
            assert_eq!(settings.root, dir.path());
            assert_eq!(settings.tests, TestSettings::default());
        }
    }

    #[test]
    fn test_ci_detection() {
        assert!(!ci_from_value(None));
        assert!(!ci_from_value(Some("")));
        assert!(!ci_from_value(Some("false")));
        assert!(!ci_from_value(Some("0")));
        assert!(ci_from_value(Some("true")));
        assert!(ci_from_value(Some("1")));
    }
}
