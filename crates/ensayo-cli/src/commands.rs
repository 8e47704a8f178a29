//! CLI argument definitions using clap

use clap::{Parser, ValueEnum};
use ensayo::{BrowserFamily, EngineKind, EnsayoError, Options};
use std::path::PathBuf;

/// Ensayo: install, build, serve and run end-to-end browser tests
#[derive(Parser, Debug)]
#[command(name = "ensayo")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Only run in this browser family (chromium, firefox, webkit)
    #[arg(long, value_parser = parse_browser)]
    pub browsers: Option<BrowserFamily>,

    /// Browser engine (cdp, playwright); defaults to the settings file
    #[arg(long, value_parser = parse_engine)]
    pub engine: Option<EngineKind>,

    /// Run browsers without a window
    #[arg(long)]
    pub headless: bool,

    /// Build variant passed to the build command
    #[arg(long, default_value = "prod")]
    pub config: String,

    /// Skip the clean and build steps
    #[arg(long)]
    pub nobuild: bool,

    /// Glob selecting test files, replacing the default patterns
    #[arg(long)]
    pub files: Option<String>,

    /// Print test names only
    #[arg(long)]
    pub testnames: bool,

    /// Re-run test files as they change
    #[arg(long)]
    pub watch: bool,

    /// Debug logging, including per-request server logs
    #[arg(long)]
    pub debug: bool,

    /// Settings file (defaults to ensayo.yaml in the root)
    #[arg(long, env = "ENSAYO_SETTINGS")]
    pub settings: Option<PathBuf>,

    /// Project root
    #[arg(long, default_value = ".")]
    pub root: PathBuf,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,
}

/// How log lines are rendered on stderr
#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable lines
    #[default]
    Text,
    /// One JSON object per line
    Json,
}

impl Cli {
    /// Session options from the flags
    #[must_use]
    pub fn options(&self) -> Options {
        let mut builder = Options::builder()
            .headless(self.headless)
            .config(self.config.clone())
            .nobuild(self.nobuild)
            .testnames(self.testnames)
            .watch(self.watch)
            .debug(self.debug);
        if let Some(browser) = self.browsers {
            builder = builder.browsers(browser);
        }
        if let Some(engine) = self.engine {
            builder = builder.engine(engine);
        }
        if let Some(files) = &self.files {
            builder = builder.files(files.clone());
        }
        builder.build()
    }
}

fn parse_browser(s: &str) -> Result<BrowserFamily, String> {
    s.parse().map_err(|e: EnsayoError| e.to_string())
}

fn parse_engine(s: &str) -> Result<EngineKind, String> {
    s.parse().map_err(|e: EnsayoError| e.to_string())
}
