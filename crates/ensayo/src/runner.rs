//! Test runner: files × cases × browsers, with retries and timeouts.

use crate::cache::ModuleCache;
use crate::engine::{Engine, EngineConfig};
use crate::options::BrowserFamily;
use crate::outcome::{RunOutcome, TestRecord, TestStatus};
use crate::reporter::Reporter;
use crate::result::{EnsayoError, EnsayoResult};
use crate::testfile::{suite_name, TestCase};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Runner settings for one run
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Engine and browser selection
    pub engine: EngineConfig,
    /// Server URL tests navigate against
    pub base_url: String,
    /// Tests slower than this are flagged
    pub slow: Duration,
    /// Default per-attempt timeout
    pub timeout: Duration,
    /// Extra attempts after a failure
    pub retries: u32,
}

/// Runs test files through an engine and reports as it goes
pub struct TestRunner {
    config: RunnerConfig,
    engine: Arc<dyn Engine>,
    reporter: Box<dyn Reporter>,
    cache: ModuleCache,
}

impl fmt::Debug for TestRunner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestRunner")
            .field("config", &self.config)
            .field("engine", &self.engine)
            .field("reporter", &self.reporter)
            .finish_non_exhaustive()
    }
}

impl TestRunner {
    /// Create a runner
    #[must_use]
    pub fn new(
        config: RunnerConfig,
        engine: Arc<dyn Engine>,
        reporter: Box<dyn Reporter>,
        cache: ModuleCache,
    ) -> Self {
        Self {
            config,
            engine,
            reporter,
            cache,
        }
    }

    /// Run `files` to completion and shut the engine down.
    ///
    /// Test failures land in the outcome; only a reporter error (such as an
    /// unwritable JUnit path) is returned as `Err`.
    pub async fn run(&self, files: &[PathBuf]) -> EnsayoResult<RunOutcome> {
        let start = Instant::now();
        self.reporter.run_started(files.len());
        let mut records = Vec::new();

        for file in files {
            match self.cache.load(file) {
                Ok(module) => {
                    let suite = module.file.suite.clone();
                    self.reporter.suite_started(&suite, file);
                    for case in &module.file.tests {
                        for &browser in &self.config.engine.browsers {
                            let record = if case.skip {
                                self.skipped(file, &suite, browser, case)
                            } else {
                                self.run_case(file, &suite, browser, case).await
                            };
                            self.reporter.test_finished(&record);
                            records.push(record);
                        }
                    }
                }
                Err(e) => {
                    tracing::error!(file = %file.display(), error = %e, "cannot load test file");
                    let record = self.load_failure(file, &e);
                    self.reporter.test_finished(&record);
                    records.push(record);
                }
            }
        }

        if let Err(e) = self.engine.shutdown().await {
            tracing::warn!(error = %e, "engine shutdown failed");
        }

        let outcome = RunOutcome {
            records,
            duration: start.elapsed(),
        };
        tracing::info!(
            passed = outcome.passed(),
            failed = outcome.failed(),
            skipped = outcome.skipped(),
            retried = outcome.retried(),
            "run finished"
        );
        self.reporter.run_finished(&outcome)?;
        Ok(outcome)
    }

    async fn attempt(&self, browser: BrowserFamily, case: &TestCase) -> EnsayoResult<()> {
        let timeout = case.timeout(self.config.timeout);
        let run = self.engine.run_case(browser, &self.config.base_url, case);
        match tokio::time::timeout(timeout, run).await {
            Ok(result) => result,
            Err(_) => Err(EnsayoError::Timeout {
                ms: timeout.as_millis() as u64,
            }),
        }
    }

    async fn run_case(
        &self,
        file: &Path,
        suite: &str,
        browser: BrowserFamily,
        case: &TestCase,
    ) -> TestRecord {
        let max_attempts = self.config.retries + 1;
        let mut attempts = 0;
        loop {
            attempts += 1;
            let started = Instant::now();
            let result = self.attempt(browser, case).await;
            let duration = started.elapsed();

            let (status, error) = match result {
                Ok(()) => (TestStatus::Passed, None),
                Err(e) if attempts < max_attempts => {
                    tracing::debug!(test = %case.name, attempts, error = %e, "retrying");
                    self.reporter.test_retrying(&case.name, attempts, &e.to_string());
                    continue;
                }
                Err(e) => (TestStatus::Failed, Some(e.to_string())),
            };

            return TestRecord {
                file: file.to_path_buf(),
                suite: suite.to_string(),
                title: case.name.clone(),
                browser,
                status,
                attempts,
                duration,
                slow: status.is_passed() && duration > self.config.slow,
                error,
            };
        }
    }

    fn skipped(
        &self,
        file: &Path,
        suite: &str,
        browser: BrowserFamily,
        case: &TestCase,
    ) -> TestRecord {
        TestRecord {
            file: file.to_path_buf(),
            suite: suite.to_string(),
            title: case.name.clone(),
            browser,
            status: TestStatus::Skipped,
            attempts: 0,
            duration: Duration::ZERO,
            slow: false,
            error: None,
        }
    }

    fn load_failure(&self, file: &Path, error: &EnsayoError) -> TestRecord {
        TestRecord {
            file: file.to_path_buf(),
            suite: suite_name(file),
            title: "load test file".to_string(),
            browser: self
                .config
                .engine
                .browsers
                .first()
                .copied()
                .unwrap_or(BrowserFamily::Chromium),
            status: TestStatus::Failed,
            attempts: 1,
            duration: Duration::ZERO,
            slow: false,
            error: Some(error.to_string()),
        }
    }
}
