//! Chromium over the DevTools protocol (chromiumoxide).
//!
//! One browser per engine, launched on first use and reused; every test case
//! gets a fresh page.

use super::{visibility_script, Engine, EngineConfig};
use crate::options::{BrowserFamily, EngineKind};
use crate::result::{EnsayoError, EnsayoResult};
use crate::testfile::{check_text, resolve_url, Step, TestCase};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::page::Page;
use futures::future::BoxFuture;
use futures::StreamExt;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

const POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug)]
struct Launched {
    browser: Browser,
    handler: JoinHandle<()>,
}

/// CDP engine
#[derive(Debug)]
pub struct CdpEngine {
    config: EngineConfig,
    inner: Mutex<Option<Launched>>,
}

impl CdpEngine {
    /// Engine for `config`; the browser starts on the first test
    #[must_use]
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(None),
        }
    }

    async fn launch(config: &EngineConfig) -> EnsayoResult<Launched> {
        let mut builder =
            BrowserConfig::builder().window_size(config.viewport_width, config.viewport_height);

        // chromiumoxide launches headless unless asked for a window
        if !config.headless {
            builder = builder.with_head();
        }
        if !config.sandbox {
            builder = builder.no_sandbox();
        }
        if let Some(ref path) = config.chromium_path {
            builder = builder.chrome_executable(path);
        }

        let cdp_config = builder
            .build()
            .map_err(|message| EnsayoError::BrowserLaunch { message })?;

        let (browser, mut handler) =
            Browser::launch(cdp_config)
                .await
                .map_err(|e| EnsayoError::BrowserLaunch {
                    message: e.to_string(),
                })?;

        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        tracing::info!(headless = config.headless, "launched chromium");
        Ok(Launched { browser, handler })
    }

    async fn new_page(&self) -> EnsayoResult<Page> {
        let mut guard = self.inner.lock().await;
        if guard.is_none() {
            *guard = Some(Self::launch(&self.config).await?);
        }
        match guard.as_ref() {
            Some(launched) => launched
                .browser
                .new_page("about:blank")
                .await
                .map_err(|e| EnsayoError::BrowserLaunch {
                    message: format!("failed to open page: {e}"),
                }),
            None => Err(EnsayoError::BrowserLaunch {
                message: "browser is not running".to_string(),
            }),
        }
    }
}

async fn run_step(page: &Page, base_url: &str, step: &Step) -> Result<(), String> {
    match step {
        Step::Navigate { url } => {
            page.goto(resolve_url(base_url, url))
                .await
                .map_err(|e| e.to_string())?;
        }
        Step::Click { selector } => {
            page.find_element(selector.as_str())
                .await
                .map_err(|e| e.to_string())?
                .click()
                .await
                .map_err(|e| e.to_string())?;
        }
        Step::Fill { selector, value } => {
            let element = page
                .find_element(selector.as_str())
                .await
                .map_err(|e| e.to_string())?;
            element
                .call_js_fn("function() { this.value = ''; }", false)
                .await
                .map_err(|e| e.to_string())?;
            element
                .click()
                .await
                .map_err(|e| e.to_string())?
                .type_str(value)
                .await
                .map_err(|e| e.to_string())?;
        }
        Step::Press { key, selector } => {
            let target = selector.as_deref().unwrap_or("body");
            page.find_element(target)
                .await
                .map_err(|e| e.to_string())?
                .press_key(key)
                .await
                .map_err(|e| e.to_string())?;
        }
        Step::WaitFor {
            selector,
            timeout_ms,
        } => {
            let deadline = Instant::now() + Duration::from_millis(*timeout_ms);
            loop {
                if page.find_element(selector.as_str()).await.is_ok() {
                    break;
                }
                if Instant::now() >= deadline {
                    return Err(format!("{selector} did not appear within {timeout_ms}ms"));
                }
                tokio::time::sleep(POLL_INTERVAL).await;
            }
        }
        Step::AssertVisible { selector } => {
            let visible: bool = page
                .evaluate(visibility_script(selector))
                .await
                .map_err(|e| e.to_string())?
                .into_value()
                .map_err(|e| e.to_string())?;
            if !visible {
                return Err(format!("{selector} is not visible"));
            }
        }
        Step::AssertText {
            selector,
            equals,
            contains,
        } => {
            let text = page
                .find_element(selector.as_str())
                .await
                .map_err(|e| e.to_string())?
                .inner_text()
                .await
                .map_err(|e| e.to_string())?
                .unwrap_or_default();
            check_text(&text, equals.as_deref(), contains.as_deref())?;
        }
        Step::AssertCount { selector, count } => {
            let found = page
                .find_elements(selector.as_str())
                .await
                .map(|els| els.len())
                .unwrap_or(0);
            if found != *count {
                return Err(format!("expected {count} × {selector}, found {found}"));
            }
        }
        Step::Evaluate { script, expected } => {
            let result = page
                .evaluate(script.as_str())
                .await
                .map_err(|e| e.to_string())?;
            if let Some(expected) = expected {
                let actual = result.value().cloned().unwrap_or(serde_json::Value::Null);
                if &actual != expected {
                    return Err(format!("expected {expected}, got {actual}"));
                }
            }
        }
        Step::Sleep { ms } => tokio::time::sleep(Duration::from_millis(*ms)).await,
    }
    Ok(())
}

/// Closes its page when dropped, so a case cut off by its timeout does not
/// leave the tab open in the shared browser
struct PageGuard<T: Send + 'static> {
    page: Option<T>,
    close: fn(T) -> BoxFuture<'static, ()>,
}

impl<T: Send + 'static> PageGuard<T> {
    fn new(page: T, close: fn(T) -> BoxFuture<'static, ()>) -> Self {
        Self {
            page: Some(page),
            close,
        }
    }

    async fn close(mut self) {
        if let Some(page) = self.page.take() {
            (self.close)(page).await;
        }
    }
}

impl<T: Send + 'static> Drop for PageGuard<T> {
    fn drop(&mut self) {
        let Some(page) = self.page.take() else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn((self.close)(page));
            }
            Err(_) => tracing::debug!("no runtime to close abandoned page"),
        }
    }
}

fn close_page(page: Page) -> BoxFuture<'static, ()> {
    Box::pin(async move {
        if let Err(e) = page.close().await {
            tracing::debug!(error = %e, "page close failed");
        }
    })
}

#[async_trait]
impl Engine for CdpEngine {
    fn kind(&self) -> EngineKind {
        EngineKind::Cdp
    }

    async fn run_case(
        &self,
        browser: BrowserFamily,
        base_url: &str,
        case: &TestCase,
    ) -> EnsayoResult<()> {
        if browser != BrowserFamily::Chromium {
            return Err(EnsayoError::UnsupportedBrowser {
                engine: EngineKind::Cdp.to_string(),
                browser: browser.to_string(),
            });
        }

        let page = self.new_page().await?;
        let guard = PageGuard::new(page.clone(), close_page);
        let mut outcome = Ok(());
        for (index, step) in case.steps.iter().enumerate() {
            tracing::debug!(test = %case.name, index, action = step.action(), "step");
            if let Err(message) = run_step(&page, base_url, step).await {
                outcome = Err(EnsayoError::step_failed(index, step.action(), message));
                break;
            }
        }

        guard.close().await;
        outcome
    }

    async fn shutdown(&self) -> EnsayoResult<()> {
        let Some(mut launched) = self.inner.lock().await.take() else {
            return Ok(());
        };
        if let Err(e) = launched.browser.close().await {
            tracing::warn!(error = %e, "failed to close chromium");
        }
        let _ = launched.browser.wait().await;
        launched.handler.abort();
        tracing::debug!("chromium closed");
        Ok(())
    }
}
