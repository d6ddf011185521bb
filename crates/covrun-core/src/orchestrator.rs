//! Top-level run: resolve dependencies once, select a strategy, run the
//! chosen pipeline.

use std::sync::Arc;

use tracing::{debug, info};

use crate::config::PipelineConfig;
use crate::deps::{DependencyResolver, DependencySet};
use crate::error::Result;
use crate::pipeline::{Pipeline, PipelineContext, PipelineOutcome};
use crate::reporter::Reporter;
use crate::strategy::StrategySelector;
use crate::tooling::Toolchain;

/// Owns the collaborators for a run.
pub struct Orchestrator {
    tools: Toolchain,
    reporter: Arc<dyn Reporter>,
    dependencies: DependencySet,
}

impl Orchestrator {
    pub fn new(tools: Toolchain, reporter: Arc<dyn Reporter>) -> Self {
        Self {
            tools,
            reporter,
            dependencies: DependencySet::default(),
        }
    }

    /// Replace the required tool set.
    pub fn with_dependencies(mut self, dependencies: DependencySet) -> Self {
        self.dependencies = dependencies;
        self
    }

    /// Execute one pipeline run with `config`.
    pub async fn run(&self, config: &PipelineConfig) -> Result<PipelineOutcome> {
        debug!(config = ?config, "Effective configuration");

        let installed = DependencyResolver::resolve(
            &self.dependencies,
            config.allow_install,
            self.tools.deps.as_ref(),
            self.reporter.as_ref(),
        )
        .await?;
        if !installed.is_empty() {
            info!(packages = ?installed, "Installed missing packages");
        }

        let strategy = StrategySelector::select(&config.project_root, config.mode)?;
        let pipeline = Pipeline::for_strategy(strategy);
        info!(strategy = strategy.name(), root = %config.project_root.display(), "Selected pipeline");

        let ctx = PipelineContext::new(config, &self.tools, self.reporter.as_ref());
        pipeline.run(&ctx).await
    }
}
