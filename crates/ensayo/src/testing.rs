//! In-memory collaborators for exercising the runner and session.

use crate::command::{CommandSpec, ProcessRunner};
use crate::engine::{Engine, EngineConfig, EngineFactory};
use crate::options::{BrowserFamily, EngineKind};
use crate::result::{EnsayoError, EnsayoResult};
use crate::server::{RunningServer, ServerConfig, ServerLauncher};
use crate::testfile::TestCase;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Ordered log shared by every fake
#[derive(Debug, Clone, Default)]
pub struct Journal(Arc<Mutex<Vec<String>>>);

impl Journal {
    pub fn push(&self, entry: impl Into<String>) {
        self.0.lock().unwrap().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    pub fn position(&self, entry: &str) -> Option<usize> {
        self.entries().iter().position(|e| e == entry)
    }

    pub fn first_with_prefix(&self, prefix: &str) -> Option<usize> {
        self.entries().iter().position(|e| e.starts_with(prefix))
    }

    pub fn count(&self, entry: &str) -> usize {
        self.entries().iter().filter(|e| *e == entry).count()
    }
}

/// Engine whose behaviour is scripted per test name
#[derive(Debug, Default)]
pub struct FakeEngine {
    fail_first: HashMap<String, usize>,
    hang: HashSet<String>,
    delay: HashMap<String, Duration>,
    attempts: Mutex<HashMap<String, usize>>,
    calls: Mutex<Vec<(String, BrowserFamily)>>,
    shutdowns: AtomicUsize,
    journal: Option<Journal>,
}

impl FakeEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_journal(mut self, journal: Journal) -> Self {
        self.journal = Some(journal);
        self
    }

    /// Fail the first `n` attempts of `name`
    pub fn fail_first(mut self, name: &str, n: usize) -> Self {
        self.fail_first.insert(name.to_string(), n);
        self
    }

    /// Fail every attempt of `name`
    pub fn always_fail(self, name: &str) -> Self {
        self.fail_first(name, usize::MAX)
    }

    pub fn hang(mut self, name: &str) -> Self {
        self.hang.insert(name.to_string());
        self
    }

    pub fn delay(mut self, name: &str, by: Duration) -> Self {
        self.delay.insert(name.to_string(), by);
        self
    }

    pub fn calls(&self) -> Vec<(String, BrowserFamily)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn shutdowns(&self) -> usize {
        self.shutdowns.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Engine for FakeEngine {
    fn kind(&self) -> EngineKind {
        EngineKind::Playwright
    }

    async fn run_case(
        &self,
        browser: BrowserFamily,
        _base_url: &str,
        case: &TestCase,
    ) -> EnsayoResult<()> {
        self.calls.lock().unwrap().push((case.name.clone(), browser));
        if let Some(journal) = &self.journal {
            journal.push(format!("test:{}", case.name));
        }
        if self.hang.contains(&case.name) {
            std::future::pending::<()>().await;
        }
        if let Some(by) = self.delay.get(&case.name) {
            tokio::time::sleep(*by).await;
        }

        let attempt = {
            let mut attempts = self.attempts.lock().unwrap();
            let n = attempts.entry(case.name.clone()).or_insert(0);
            *n += 1;
            *n
        };
        match self.fail_first.get(&case.name) {
            Some(&n) if attempt <= n => Err(EnsayoError::step_failed(0, "click", "scripted failure")),
            _ => Ok(()),
        }
    }

    async fn shutdown(&self) -> EnsayoResult<()> {
        self.shutdowns.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Hands out one shared [`FakeEngine`]
#[derive(Debug)]
pub struct FakeEngineFactory {
    pub engine: Arc<FakeEngine>,
    pub configs: Mutex<Vec<EngineConfig>>,
    journal: Journal,
}

impl FakeEngineFactory {
    pub fn new(engine: FakeEngine, journal: Journal) -> Self {
        Self {
            engine: Arc::new(engine.with_journal(journal.clone())),
            configs: Mutex::new(Vec::new()),
            journal,
        }
    }
}

impl EngineFactory for FakeEngineFactory {
    fn create(&self, config: &EngineConfig) -> EnsayoResult<Arc<dyn Engine>> {
        self.journal.push("engine:create");
        self.configs.lock().unwrap().push(config.clone());
        Ok(self.engine.clone())
    }
}

/// Records commands instead of running them
#[derive(Debug, Default)]
pub struct RecordingRunner {
    journal: Journal,
    fail: HashMap<String, i32>,
}

impl RecordingRunner {
    pub fn new(journal: Journal) -> Self {
        Self {
            journal,
            fail: HashMap::new(),
        }
    }

    /// Make `step` exit with `code`
    pub fn failing(mut self, step: &str, code: i32) -> Self {
        self.fail.insert(step.to_string(), code);
        self
    }
}

#[async_trait]
impl ProcessRunner for RecordingRunner {
    async fn run(&self, step: &str, spec: &CommandSpec) -> EnsayoResult<()> {
        self.journal.push(format!("{step}:{spec}"));
        match self.fail.get(step) {
            Some(&code) => Err(EnsayoError::CommandFailed {
                step: step.to_string(),
                code,
            }),
            None => Ok(()),
        }
    }
}

/// Server that only journals its lifecycle
#[derive(Debug, Default)]
pub struct FakeLauncher {
    journal: Journal,
    pub fail: bool,
}

impl FakeLauncher {
    pub fn new(journal: Journal) -> Self {
        Self {
            journal,
            fail: false,
        }
    }
}

#[async_trait]
impl ServerLauncher for FakeLauncher {
    async fn start(&self, config: &ServerConfig) -> EnsayoResult<Box<dyn RunningServer>> {
        if self.fail {
            return Err(EnsayoError::ServerStart {
                addr: config.bind_addr(),
                message: "address in use".to_string(),
            });
        }
        self.journal.push("server:start");
        Ok(Box::new(FakeServer {
            journal: self.journal.clone(),
        }))
    }
}

#[derive(Debug)]
struct FakeServer {
    journal: Journal,
}

#[async_trait]
impl RunningServer for FakeServer {
    fn base_url(&self) -> String {
        "http://fake.test".to_string()
    }

    async fn stop(self: Box<Self>) -> EnsayoResult<()> {
        self.journal.push("server:stop");
        Ok(())
    }
}
