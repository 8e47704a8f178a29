//! Install, clean and build steps of the project under test.

use crate::command::{CommandSpec, ProcessRunner};
use crate::result::EnsayoResult;
use crate::settings::ProjectSettings;
use std::sync::Arc;

/// The project's external toolchain commands
#[derive(Debug, Clone)]
pub struct Toolchain {
    runner: Arc<dyn ProcessRunner>,
    install: CommandSpec,
    clean: CommandSpec,
    build: CommandSpec,
}

impl Toolchain {
    /// Toolchain using the commands from `settings`
    #[must_use]
    pub fn from_settings(runner: Arc<dyn ProcessRunner>, settings: &ProjectSettings) -> Self {
        Self {
            runner,
            install: settings.install.clone(),
            clean: settings.build.clean.clone(),
            build: settings.build.build.clone(),
        }
    }

    /// Install test dependencies
    pub async fn install(&self) -> EnsayoResult<()> {
        self.runner.run("install", &self.install).await
    }

    /// Remove previous build output
    pub async fn clean(&self) -> EnsayoResult<()> {
        self.runner.run("clean", &self.clean).await
    }

    /// Build `variant`
    pub async fn build(&self, variant: &str) -> EnsayoResult<()> {
        self.runner
            .run("build", &self.build.with_variant(variant))
            .await
    }

    /// Clean, then build `variant`; stops at the first failure
    pub async fn rebuild(&self, variant: &str) -> EnsayoResult<()> {
        self.clean().await?;
        self.build(variant).await
    }
}
