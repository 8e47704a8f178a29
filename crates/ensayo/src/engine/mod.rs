//! Browser automation engines.
//!
//! The session resolves an [`EngineConfig`] once from the invocation options
//! and project settings and hands it to the runner. Nothing here reads global
//! state.

#[cfg(feature = "cdp")]
pub mod cdp;
pub mod playwright;

use crate::options::{BrowserFamily, EngineKind, Options};
use crate::result::{EnsayoError, EnsayoResult};
use crate::settings::ProjectSettings;
use crate::testfile::TestCase;
use async_trait::async_trait;
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Explicit engine configuration for one session
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EngineConfig {
    /// Engine driving the browsers
    pub kind: EngineKind,
    /// Browsers every test runs on
    pub browsers: Vec<BrowserFamily>,
    /// Run without a visible window
    pub headless: bool,
    /// Viewport width
    pub viewport_width: u32,
    /// Viewport height
    pub viewport_height: u32,
    /// Chromium executable (CDP)
    pub chromium_path: Option<PathBuf>,
    /// Keep the Chromium sandbox
    pub sandbox: bool,
    /// Node.js binary (Playwright)
    pub node: String,
    /// Directories searched for the `playwright` package
    pub module_paths: Vec<PathBuf>,
}

impl EngineConfig {
    /// Resolve from flags and settings.
    ///
    /// `--browsers` narrows the run to one family; otherwise the settings list
    /// is used. Every selected browser must be drivable by the engine.
    pub fn from_options(options: &Options, settings: &ProjectSettings) -> EnsayoResult<Self> {
        let kind = options.engine.unwrap_or(settings.engine.default);
        let browsers = match options.browsers {
            Some(browser) => vec![browser],
            None => settings.engine.browsers.clone(),
        };
        if browsers.is_empty() {
            return Err(EnsayoError::config("no browsers selected"));
        }
        if let Some(bad) = browsers
            .iter()
            .find(|b| !kind.supported_browsers().contains(b))
        {
            return Err(EnsayoError::UnsupportedBrowser {
                engine: kind.to_string(),
                browser: bad.to_string(),
            });
        }

        let mut module_paths = Vec::new();
        if let Some(cwd) = &settings.install.cwd {
            module_paths.push(settings.root.join(cwd).join("node_modules"));
        }
        module_paths.push(settings.root.join("node_modules"));

        Ok(Self {
            kind,
            browsers,
            headless: options.headless,
            viewport_width: settings.engine.viewport_width,
            viewport_height: settings.engine.viewport_height,
            chromium_path: settings.engine.chromium_path.clone(),
            sandbox: settings.engine.sandbox,
            node: settings.engine.node.clone(),
            module_paths,
        })
    }
}

/// Drives one browser through the steps of a test case
#[async_trait]
pub trait Engine: Send + Sync + fmt::Debug {
    /// Which engine this is
    fn kind(&self) -> EngineKind;

    /// Run every step of `case` on `browser`; the first failing step fails it
    async fn run_case(
        &self,
        browser: BrowserFamily,
        base_url: &str,
        case: &TestCase,
    ) -> EnsayoResult<()>;

    /// Release browsers and helper processes
    async fn shutdown(&self) -> EnsayoResult<()> {
        Ok(())
    }
}

/// Creates engines for a runner
pub trait EngineFactory: Send + Sync + fmt::Debug {
    /// Build an engine for `config`
    fn create(&self, config: &EngineConfig) -> EnsayoResult<Arc<dyn Engine>>;
}

/// Factory for the built-in engines
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultEngineFactory;

impl EngineFactory for DefaultEngineFactory {
    fn create(&self, config: &EngineConfig) -> EnsayoResult<Arc<dyn Engine>> {
        match config.kind {
            #[cfg(feature = "cdp")]
            EngineKind::Cdp => Ok(Arc::new(cdp::CdpEngine::new(config.clone()))),
            #[cfg(not(feature = "cdp"))]
            EngineKind::Cdp => Err(EnsayoError::config(
                "the cdp engine is not available in this build; use --engine=playwright",
            )),
            EngineKind::Playwright => {
                Ok(Arc::new(playwright::PlaywrightEngine::new(config.clone())))
            }
        }
    }
}

/// JavaScript expression: is the first match of `selector` rendered
#[must_use]
pub fn visibility_script(selector: &str) -> String {
    let sel = js_string(selector);
    format!(
        "(() => {{ const el = document.querySelector({sel}); if (!el) return false; \
         const r = el.getBoundingClientRect(); const s = window.getComputedStyle(el); \
         return r.width > 0 && r.height > 0 && s.visibility !== 'hidden' && s.display !== 'none'; }})()"
    )
}

/// Quote `s` as a JavaScript string literal
#[must_use]
pub fn js_string(s: &str) -> String {
    // JSON strings are valid JS string literals.
    serde_json::Value::String(s.to_string()).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    mod engine_config_tests {
        use super::*;

        #[test]
        fn test_defaults_from_settings() {
            let config =
                EngineConfig::from_options(&Options::default(), &ProjectSettings::default())
                    .unwrap();
            assert_eq!(config.kind, EngineKind::Cdp);
            assert_eq!(config.browsers, vec![BrowserFamily::Chromium]);
            assert!(!config.headless);
            assert_eq!(config.module_paths.len(), 2);
        }

        #[test]
        fn test_flags_override() {
            let options = Options::builder()
                .engine(EngineKind::Playwright)
                .browsers(BrowserFamily::Webkit)
                .headless(true)
                .build();
            let config = EngineConfig::from_options(&options, &ProjectSettings::default()).unwrap();
            assert_eq!(config.kind, EngineKind::Playwright);
            assert_eq!(config.browsers, vec![BrowserFamily::Webkit]);
            assert!(config.headless);
        }

        #[test]
        fn test_cdp_rejects_firefox() {
            let options = Options::builder().browsers(BrowserFamily::Firefox).build();
            let err = EngineConfig::from_options(&options, &ProjectSettings::default()).unwrap_err();
            assert!(matches!(err, EnsayoError::UnsupportedBrowser { .. }));
        }

        #[test]
        fn test_settings_browsers_checked() {
            let mut settings = ProjectSettings::default();
            settings.engine.browsers = vec![BrowserFamily::Chromium, BrowserFamily::Webkit];
            assert!(EngineConfig::from_options(&Options::default(), &settings).is_err());
            settings.engine.default = EngineKind::Playwright;
            let config = EngineConfig::from_options(&Options::default(), &settings).unwrap();
            assert_eq!(config.browsers.len(), 2);
        }

        #[test]
        fn test_empty_browsers() {
            let mut settings = ProjectSettings::default();
            settings.engine.browsers.clear();
            assert!(EngineConfig::from_options(&Options::default(), &settings).is_err());
        }
    }

    #[test]
    fn test_factory_builds_playwright() {
        let options = Options::builder().engine(EngineKind::Playwright).build();
        let config = EngineConfig::from_options(&options, &ProjectSettings::default()).unwrap();
        let engine = DefaultEngineFactory.create(&config).unwrap();
        assert_eq!(engine.kind(), EngineKind::Playwright);
    }

    #[test]
    fn test_js_string_escapes() {
        assert_eq!(js_string(r#"a"b"#), r#""a\"b""#);
        assert!(visibility_script("#x").contains(r##"document.querySelector("#x")"##));
    }
}
