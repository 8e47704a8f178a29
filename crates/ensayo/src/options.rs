//! Invocation options for a test session.
//!
//! `Options` is produced once (by the CLI or through [`OptionsBuilder`]) and
//! never mutated afterwards. Everything downstream reads it by reference.

use crate::reporter::ReporterKind;
use crate::result::{EnsayoError, EnsayoResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Browser families a session can target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BrowserFamily {
    /// Chromium / Chrome
    Chromium,
    /// Firefox
    Firefox,
    /// WebKit / Safari
    Webkit,
}

impl BrowserFamily {
    /// All families in a stable order
    pub const ALL: [Self; 3] = [Self::Chromium, Self::Firefox, Self::Webkit];

    /// Lowercase name as used on the command line
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Chromium => "chromium",
            Self::Firefox => "firefox",
            Self::Webkit => "webkit",
        }
    }
}

impl fmt::Display for BrowserFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BrowserFamily {
    type Err = EnsayoError;

    fn from_str(s: &str) -> EnsayoResult<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "chromium" | "chrome" => Ok(Self::Chromium),
            "firefox" => Ok(Self::Firefox),
            "webkit" | "safari" => Ok(Self::Webkit),
            other => Err(EnsayoError::config(format!(
                "unknown browser `{other}` (expected chromium, firefox or webkit)"
            ))),
        }
    }
}

/// Automation engine used to drive browsers
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineKind {
    /// Chrome DevTools Protocol, Chromium only
    #[default]
    Cdp,
    /// Playwright driven through Node.js
    Playwright,
}

impl EngineKind {
    /// Lowercase name as used on the command line
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Cdp => "cdp",
            Self::Playwright => "playwright",
        }
    }

    /// Browser families this engine can drive
    #[must_use]
    pub const fn supported_browsers(self) -> &'static [BrowserFamily] {
        match self {
            Self::Cdp => &[BrowserFamily::Chromium],
            Self::Playwright => &BrowserFamily::ALL,
        }
    }
}

impl fmt::Display for EngineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EngineKind {
    type Err = EnsayoError;

    fn from_str(s: &str) -> EnsayoResult<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cdp" | "devtools" => Ok(Self::Cdp),
            "playwright" | "pw" => Ok(Self::Playwright),
            other => Err(EnsayoError::config(format!(
                "unknown engine `{other}` (expected cdp or playwright)"
            ))),
        }
    }
}

/// Parsed invocation options
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Options {
    /// Restrict the run to one browser family
    pub browsers: Option<BrowserFamily>,
    /// Engine override; settings decide when absent
    pub engine: Option<EngineKind>,
    /// Run without a visible browser window
    pub headless: bool,
    /// Build variant passed to the build step
    pub config: String,
    /// Skip clean and build
    pub nobuild: bool,
    /// Glob overriding the default test patterns
    pub files: Option<String>,
    /// List test names instead of the CI report
    pub testnames: bool,
    /// Keep running and re-test files as they change
    pub watch: bool,
    /// Verbose logging, including per-request server logs
    pub debug: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            browsers: None,
            engine: None,
            headless: false,
            config: "prod".to_string(),
            nobuild: false,
            files: None,
            testnames: false,
            watch: false,
            debug: false,
        }
    }
}

impl Options {
    /// Start building options from defaults
    #[must_use]
    pub fn builder() -> OptionsBuilder {
        OptionsBuilder::default()
    }

    /// Reporter for one-shot runs
    #[must_use]
    pub const fn reporter(&self) -> ReporterKind {
        if self.testnames {
            ReporterKind::Names
        } else {
            ReporterKind::Ci
        }
    }

    /// Reporter for per-file runs in watch mode.
    ///
    /// Chosen from `testnames` alone; the `watch` flag never changes it.
    #[must_use]
    pub const fn watch_reporter(&self) -> ReporterKind {
        self.reporter()
    }
}

/// Builder for [`Options`]
#[derive(Debug, Default)]
pub struct OptionsBuilder {
    options: Options,
}

impl OptionsBuilder {
    /// Restrict to one browser family
    #[must_use]
    pub const fn browsers(mut self, browser: BrowserFamily) -> Self {
        self.options.browsers = Some(browser);
        self
    }

    /// Select the engine
    #[must_use]
    pub const fn engine(mut self, engine: EngineKind) -> Self {
        self.options.engine = Some(engine);
        self
    }

    /// Headless mode
    #[must_use]
    pub const fn headless(mut self, headless: bool) -> Self {
        self.options.headless = headless;
        self
    }

    /// Build variant
    #[must_use]
    pub fn config(mut self, variant: impl Into<String>) -> Self {
        self.options.config = variant.into();
        self
    }

    /// Skip the build step
    #[must_use]
    pub const fn nobuild(mut self, nobuild: bool) -> Self {
        self.options.nobuild = nobuild;
        self
    }

    /// Override test file discovery
    #[must_use]
    pub fn files(mut self, pattern: impl Into<String>) -> Self {
        self.options.files = Some(pattern.into());
        self
    }

    /// Name-listing reporter
    #[must_use]
    pub const fn testnames(mut self, testnames: bool) -> Self {
        self.options.testnames = testnames;
        self
    }

    /// Watch mode
    #[must_use]
    pub const fn watch(mut self, watch: bool) -> Self {
        self.options.watch = watch;
        self
    }

    /// Verbose logging
    #[must_use]
    pub const fn debug(mut self, debug: bool) -> Self {
        self.options.debug = debug;
        self
    }

    /// Finish building
    #[must_use]
    pub fn build(self) -> Options {
        self.options
    }
}
