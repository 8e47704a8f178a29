//! External commands (dependency install, clean, build).
//!
//! Commands are described by a [`CommandSpec`] and executed through the
//! [`ProcessRunner`] seam so the session can be exercised without spawning
//! anything.

use crate::result::{EnsayoError, EnsayoResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Instant;

/// Placeholder replaced with the build variant
pub const VARIANT_PLACEHOLDER: &str = "{config}";

/// A command line to run as one session step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSpec {
    /// Executable name or path
    pub program: String,
    /// Arguments
    #[serde(default)]
    pub args: Vec<String>,
    /// Working directory, relative to the project root
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwd: Option<PathBuf>,
    /// Extra environment variables
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
}

impl CommandSpec {
    /// Create a command with no arguments
    #[must_use]
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            env: BTreeMap::new(),
        }
    }

    /// Append arguments
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set the working directory
    #[must_use]
    pub fn cwd(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    /// Set an environment variable
    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Copy of this command with `{config}` replaced by `variant`
    #[must_use]
    pub fn with_variant(&self, variant: &str) -> Self {
        let sub = |s: &String| s.replace(VARIANT_PLACEHOLDER, variant);
        Self {
            program: self.program.clone(),
            args: self.args.iter().map(sub).collect(),
            cwd: self.cwd.clone(),
            env: self.env.iter().map(|(k, v)| (k.clone(), sub(v))).collect(),
        }
    }

    /// Directory the command runs in
    #[must_use]
    pub fn working_dir(&self, root: &Path) -> PathBuf {
        match &self.cwd {
            Some(dir) => root.join(dir),
            None => root.to_path_buf(),
        }
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            if arg.contains(' ') {
                write!(f, " \"{arg}\"")?;
            } else {
                write!(f, " {arg}")?;
            }
        }
        Ok(())
    }
}

/// Runs external commands to completion
#[async_trait]
pub trait ProcessRunner: Send + Sync + fmt::Debug {
    /// Run `spec` for the named step, failing on a non-zero exit
    async fn run(&self, step: &str, spec: &CommandSpec) -> EnsayoResult<()>;
}

/// Spawns real child processes with inherited stdio
#[derive(Debug, Clone)]
pub struct SystemProcessRunner {
    root: PathBuf,
}

impl SystemProcessRunner {
    /// Runner resolving working directories against `root`
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl ProcessRunner for SystemProcessRunner {
    async fn run(&self, step: &str, spec: &CommandSpec) -> EnsayoResult<()> {
        let start = Instant::now();
        let dir = spec.working_dir(&self.root);
        tracing::info!(step, command = %spec, dir = %dir.display(), "running");

        let mut cmd = tokio::process::Command::new(&spec.program);
        cmd.args(&spec.args)
            .envs(&spec.env)
            .current_dir(&dir)
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit());

        let status = cmd.status().await.map_err(|source| EnsayoError::CommandSpawn {
            step: step.to_string(),
            program: spec.program.clone(),
            source,
        })?;

        let elapsed = start.elapsed();
        if status.success() {
            tracing::info!(step, elapsed_ms = elapsed.as_millis() as u64, "finished");
            Ok(())
        } else {
            let code = status.code().unwrap_or_else(|| signal_code(status));
            tracing::error!(step, code, "command failed");
            Err(EnsayoError::CommandFailed {
                step: step.to_string(),
                code,
            })
        }
    }
}

/// Shell convention for a child killed by a signal: 128 + signal number
#[cfg(unix)]
fn signal_code(status: std::process::ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;
    status.signal().map_or(2, |signal| 128 + signal)
}

#[cfg(not(unix))]
fn signal_code(_status: std::process::ExitStatus) -> i32 {
    2
}

#[cfg(test)]
mod tests {
    use super::*;

    mod command_spec_tests {
        use super::*;

        #[test]
        fn test_variant_substitution() {
            let spec = CommandSpec::new("npm")
                .args(["run", "build", "--", "--config={config}"])
                .env("BUILD_VARIANT", "{config}");
            let built = spec.with_variant("canary");
            assert_eq!(built.args[3], "--config=canary");
            assert_eq!(built.env["BUILD_VARIANT"], "canary");
            // original untouched
            assert_eq!(spec.args[3], "--config={config}");
        }

        #[test]
        fn test_display_quotes_spaces() {
            let spec = CommandSpec::new("sh").args(["-c", "exit 3"]);
            assert_eq!(spec.to_string(), "sh -c \"exit 3\"");
        }

        #[test]
        fn test_working_dir() {
            let root = Path::new("/project");
            assert_eq!(CommandSpec::new("npm").working_dir(root), root);
            assert_eq!(
                CommandSpec::new("npm").cwd("tests/e2e").working_dir(root),
                Path::new("/project/tests/e2e")
            );
        }

        #[test]
        fn test_deserialize_minimal() {
            let spec: CommandSpec = serde_yaml_ng::from_str("program: make").unwrap();
            assert_eq!(spec, CommandSpec::new("make"));
        }
    }

    #[cfg(unix)]
    mod system_runner_tests {
        use super::*;

        #[tokio::test]
        async fn test_success() {
            let dir = tempfile::tempdir().unwrap();
            let runner = SystemProcessRunner::new(dir.path());
            runner.run("install", &CommandSpec::new("true")).await.unwrap();
        }

        #[tokio::test]
        async fn test_failure_carries_exit_code() {
            let dir = tempfile::tempdir().unwrap();
            let runner = SystemProcessRunner::new(dir.path());
            let spec = CommandSpec::new("sh").args(["-c", "exit 4"]);
            let err = runner.run("build", &spec).await.unwrap_err();
            assert!(matches!(err, EnsayoError::CommandFailed { code: 4, .. }));
            assert_eq!(err.exit_code(), 4);
        }

        #[tokio::test]
        async fn test_missing_program() {
            let dir = tempfile::tempdir().unwrap();
            let runner = SystemProcessRunner::new(dir.path());
            let err = runner
                .run("install", &CommandSpec::new("definitely-not-a-real-binary-xyz"))
                .await
                .unwrap_err();
            assert!(matches!(err, EnsayoError::CommandSpawn { .. }));
        }

        #[tokio::test]
        async fn test_runs_in_cwd() {
            let dir = tempfile::tempdir().unwrap();
            std::fs::create_dir(dir.path().join("sub")).unwrap();
            std::fs::write(dir.path().join("sub/marker"), "x").unwrap();
            let runner = SystemProcessRunner::new(dir.path());
            let spec = CommandSpec::new("test").args(["-f", "marker"]).cwd("sub");
            runner.run("install", &spec).await.unwrap();
        }

        #[tokio::test]
        async fn test_killed_child_maps_to_signal_code() {
            let dir = tempfile::tempdir().unwrap();
            let runner = SystemProcessRunner::new(dir.path());
            let spec = CommandSpec::new("sh").args(["-c", "kill -9 $$"]);
            let err = runner.run("build", &spec).await.unwrap_err();
            assert!(matches!(err, EnsayoError::CommandFailed { code: 137, .. }));
            assert_ne!(err.exit_code(), 1);
        }
    }
}
