//! The test session: install, build, serve, then run once or watch.
//!
//! ```text
//! install ─► (clean ─► build)? ─► server ─┬─ one-shot: resolve ─► invalidate ─► run ─► stop server
//!                                         └─ watch:    subscribe ─► per change: invalidate ─► run file
//! ```
//!
//! Every external collaborator is injected, so the sequencing can be
//! exercised without processes, sockets or browsers.

use crate::cache::ModuleCache;
use crate::command::{ProcessRunner, SystemProcessRunner};
use crate::discovery::{effective_patterns, resolve_test_files};
use crate::engine::{DefaultEngineFactory, EngineConfig, EngineFactory};
use crate::events::{EventBus, SessionEvent};
use crate::options::Options;
use crate::outcome::RunOutcome;
use crate::reporter::{make_reporter, Reporter, ReporterKind};
use crate::result::EnsayoResult;
use crate::runner::{RunnerConfig, TestRunner};
use crate::server::{RunningServer, ServerConfig, ServerLauncher, StaticServerLauncher};
use crate::settings::{is_ci, ProjectSettings};
use crate::toolchain::Toolchain;
use crate::watch::{FileChange, FileWatcher, WatchConfig, WatchStats};
use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::task::JoinSet;

/// Builds the reporter for a run
pub type ReporterFactory = Arc<dyn Fn(ReporterKind) -> Box<dyn Reporter> + Send + Sync>;

/// How a session ended
#[derive(Debug)]
pub enum SessionOutcome {
    /// One-shot run finished; the server is already stopped
    Completed(RunOutcome),
    /// Watch mode is running until the subscription is stopped
    Watching(WatchSubscription),
}

impl SessionOutcome {
    /// The finished run, if this was one-shot
    #[must_use]
    pub const fn run(&self) -> Option<&RunOutcome> {
        match self {
            Self::Completed(outcome) => Some(outcome),
            Self::Watching(_) => None,
        }
    }
}

/// One end-to-end test session
pub struct Session {
    options: Options,
    settings: ProjectSettings,
    ci: bool,
    processes: Arc<dyn ProcessRunner>,
    launcher: Arc<dyn ServerLauncher>,
    engines: Arc<dyn EngineFactory>,
    reporters: ReporterFactory,
    cache: ModuleCache,
    events: EventBus,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("options", &self.options)
            .field("root", &self.settings.root)
            .field("ci", &self.ci)
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Session with the real process runner, static server and engines
    #[must_use]
    pub fn new(options: Options, settings: ProjectSettings) -> Self {
        let junit = settings.report.junit.as_ref().map(|p| settings.root.join(p));
        let reporters: ReporterFactory = Arc::new(move |kind| make_reporter(kind, junit.clone()));
        Self {
            processes: Arc::new(SystemProcessRunner::new(settings.root.clone())),
            launcher: Arc::new(StaticServerLauncher),
            engines: Arc::new(DefaultEngineFactory),
            reporters,
            cache: ModuleCache::new(),
            events: EventBus::new(),
            ci: is_ci(),
            options,
            settings,
        }
    }

    /// Replace the process runner
    #[must_use]
    pub fn with_process_runner(mut self, runner: Arc<dyn ProcessRunner>) -> Self {
        self.processes = runner;
        self
    }

    /// Replace the server launcher
    #[must_use]
    pub fn with_server_launcher(mut self, launcher: Arc<dyn ServerLauncher>) -> Self {
        self.launcher = launcher;
        self
    }

    /// Replace the engine factory
    #[must_use]
    pub fn with_engine_factory(mut self, engines: Arc<dyn EngineFactory>) -> Self {
        self.engines = engines;
        self
    }

    /// Replace how reporters are built
    #[must_use]
    pub fn with_reporters(mut self, reporters: ReporterFactory) -> Self {
        self.reporters = reporters;
        self
    }

    /// Override CI detection
    #[must_use]
    pub const fn with_ci(mut self, ci: bool) -> Self {
        self.ci = ci;
        self
    }

    /// Lifecycle events
    #[must_use]
    pub const fn events(&self) -> &EventBus {
        &self.events
    }

    /// The module cache test files are loaded through
    #[must_use]
    pub const fn cache(&self) -> &ModuleCache {
        &self.cache
    }

    /// Run the session.
    ///
    /// Install, build and server failures are returned as errors. Test
    /// failures are not; they are counted in the returned outcome.
    pub async fn run(self) -> EnsayoResult<SessionOutcome> {
        let toolchain = Toolchain::from_settings(Arc::clone(&self.processes), &self.settings);

        toolchain.install().await?;
        self.events.emit(SessionEvent::DependenciesInstalled);

        let engine = EngineConfig::from_options(&self.options, &self.settings)?;
        tracing::debug!(engine = %engine.kind, browsers = ?engine.browsers, headless = engine.headless, "engine configured");

        if self.options.nobuild {
            tracing::info!("skipping build");
        } else {
            let variant = self.options.config.clone();
            self.events.emit(SessionEvent::BuildStarted {
                variant: variant.clone(),
            });
            toolchain.rebuild(&variant).await?;
            self.events.emit(SessionEvent::BuildFinished { variant });
        }

        let server_config = ServerConfig::from_settings(&self.settings, self.options.debug);
        let server = self.launcher.start(&server_config).await?;
        let base_url = server.base_url();
        self.events.emit(SessionEvent::ServerStarted {
            url: base_url.clone(),
        });

        let runner_config = RunnerConfig {
            engine,
            base_url,
            slow: self.settings.tests.slow(),
            timeout: self.settings.tests.timeout(),
            retries: self.settings.retries(self.ci),
        };

        if self.options.watch {
            self.watch(runner_config, server).await
        } else {
            self.run_once(runner_config, server).await
        }
    }

    async fn run_once(
        &self,
        config: RunnerConfig,
        server: Box<dyn RunningServer>,
    ) -> EnsayoResult<SessionOutcome> {
        let result = self.run_files(config).await;
        stop_server(server, &self.events).await?;
        Ok(SessionOutcome::Completed(result?))
    }

    async fn run_files(&self, config: RunnerConfig) -> EnsayoResult<RunOutcome> {
        let files = resolve_test_files(
            &self.settings.root,
            self.options.files.as_deref(),
            &self.settings.tests.patterns,
        )?;
        if files.is_empty() {
            tracing::warn!("no test files matched");
        }
        for file in &files {
            self.cache.invalidate(file);
        }
        self.events.emit(SessionEvent::TestsStarted {
            files: files.clone(),
        });

        let engine = self.engines.create(&config.engine)?;
        let reporter = (self.reporters)(self.options.reporter());
        let runner = TestRunner::new(config, engine, reporter, self.cache.clone());
        let outcome = runner.run(&files).await?;

        self.events.emit(SessionEvent::TestsFinished {
            passed: outcome.passed(),
            failed: outcome.failed(),
        });
        Ok(outcome)
    }

    async fn watch(
        self,
        config: RunnerConfig,
        server: Box<dyn RunningServer>,
    ) -> EnsayoResult<SessionOutcome> {
        let patterns = effective_patterns(
            self.options.files.as_deref(),
            &self.settings.tests.patterns,
        );
        let mut watch_config = WatchConfig::new(&self.settings.root)
            .with_debounce(self.settings.watch.debounce_ms);
        watch_config.patterns = patterns;
        watch_config.ignore_patterns = self.settings.watch.ignore.clone();

        let context = Arc::new(WatchContext {
            config,
            engines: self.engines,
            reporters: self.reporters,
            reporter: self.options.watch_reporter(),
            cache: self.cache,
            events: self.events.clone(),
            runs: Mutex::new(JoinSet::new()),
        });

        let handler_context = Arc::clone(&context);
        let watcher = match FileWatcher::start(&watch_config, move |change| {
            handler_context.on_change(change);
        }) {
            Ok(watcher) => watcher,
            Err(e) => {
                stop_server(server, &self.events).await?;
                return Err(e);
            }
        };

        Ok(SessionOutcome::Watching(WatchSubscription {
            watcher,
            server: Some(server),
            context,
            events: self.events,
            patterns: watch_config.patterns,
        }))
    }
}

async fn stop_server(server: Box<dyn RunningServer>, events: &EventBus) -> EnsayoResult<()> {
    server.stop().await?;
    events.emit(SessionEvent::ServerStopped);
    Ok(())
}

/// Everything a per-file watch run needs
struct WatchContext {
    config: RunnerConfig,
    engines: Arc<dyn EngineFactory>,
    reporters: ReporterFactory,
    reporter: ReporterKind,
    cache: ModuleCache,
    events: EventBus,
    /// In-flight re-runs, owned so stopping can cancel them
    runs: Mutex<JoinSet<()>>,
}

impl WatchContext {
    fn on_change(self: &Arc<Self>, change: FileChange) {
        self.cache.invalidate(&change.path);
        self.events.emit(SessionEvent::FileChanged {
            path: change.path.clone(),
        });

        let context = Arc::clone(self);
        let mut runs = self.runs.lock().unwrap_or_else(PoisonError::into_inner);
        while runs.try_join_next().is_some() {}
        runs.spawn(async move {
            let path = change.path;
            match context.run_file(path.clone()).await {
                Ok(outcome) if outcome.all_passed() => {
                    tracing::info!(file = %path.display(), passed = outcome.passed(), "re-run passed");
                }
                Ok(outcome) => {
                    tracing::warn!(file = %path.display(), failed = outcome.failed(), "re-run failed");
                }
                Err(e) => tracing::error!(file = %path.display(), error = %e, "re-run errored"),
            }
        });
    }

    /// Abort every in-flight re-run and wait for them to unwind
    async fn cancel_runs(&self) {
        let mut runs = std::mem::take(
            &mut *self.runs.lock().unwrap_or_else(PoisonError::into_inner),
        );
        if !runs.is_empty() {
            tracing::info!(count = runs.len(), "cancelling in-flight re-runs");
        }
        runs.abort_all();
        while runs.join_next().await.is_some() {}
    }

    async fn run_file(&self, path: PathBuf) -> EnsayoResult<RunOutcome> {
        let files = vec![path];
        self.events.emit(SessionEvent::TestsStarted {
            files: files.clone(),
        });
        let engine = self.engines.create(&self.config.engine)?;
        let runner = TestRunner::new(
            self.config.clone(),
            engine,
            (self.reporters)(self.reporter),
            self.cache.clone(),
        );
        let outcome = runner.run(&files).await?;
        self.events.emit(SessionEvent::TestsFinished {
            passed: outcome.passed(),
            failed: outcome.failed(),
        });
        Ok(outcome)
    }
}

/// A live watch: owns the watcher and the server until stopped
pub struct WatchSubscription {
    watcher: FileWatcher,
    server: Option<Box<dyn RunningServer>>,
    context: Arc<WatchContext>,
    events: EventBus,
    patterns: Vec<String>,
}

impl fmt::Debug for WatchSubscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatchSubscription")
            .field("watcher", &self.watcher)
            .field("patterns", &self.patterns)
            .field("server", &self.server.is_some())
            .finish()
    }
}

impl WatchSubscription {
    /// Patterns being watched
    #[must_use]
    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    /// Base URL of the server, while it runs
    #[must_use]
    pub fn base_url(&self) -> Option<String> {
        self.server.as_ref().map(|s| s.base_url())
    }

    /// Still watching
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.watcher.is_running()
    }

    /// Watch statistics
    #[must_use]
    pub fn stats(&self) -> WatchStats {
        self.watcher.stats()
    }

    /// Stop watching, cancel in-flight re-runs, then stop the server;
    /// calling twice is a no-op
    pub async fn stop(&mut self) -> EnsayoResult<()> {
        if self.watcher.is_running() {
            self.watcher.stop().await;
            self.events.emit(SessionEvent::WatchStopped);
        }
        self.context.cancel_runs().await;
        if let Some(server) = self.server.take() {
            stop_server(server, &self.events).await?;
        }
        Ok(())
    }
}
