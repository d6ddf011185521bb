//! Pipeline variants and the bookkeeping they share.

pub mod descriptor;
pub mod simple;

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

use crate::advisory::Advice;
use crate::config::PipelineConfig;
use crate::coverage::{CoverageCollector, CoverageReport};
use crate::error::Result;
use crate::presenter::Presentation;
use crate::reporter::Reporter;
use crate::strategy::Strategy;
use crate::tooling::{BuildStep, ToolOutput, Toolchain};

pub use descriptor::{configure_defines, DescriptorPipeline};
pub use simple::{SimpleBuildPipeline, INSTRUMENTATION_MARKER};

/// Outcome of the test stage.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct TestRunSummary {
    /// Tests discovered before running, when the harness can list them.
    pub total: Option<usize>,

    /// Whether the harness exited successfully.
    pub passed: bool,
}

/// One external invocation made by a pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StageRecord {
    pub name: String,
    pub exit_code: i32,
    pub duration_ms: u64,
}

/// Everything a finished run produced.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PipelineOutcome {
    pub strategy: Strategy,
    pub stages: Vec<StageRecord>,
    pub tests: Option<TestRunSummary>,
    pub coverage: Option<CoverageReport>,
    pub advice: Vec<Advice>,
    pub warnings: Vec<String>,
    /// Transient files removed after the run.
    pub cleaned: Vec<std::path::PathBuf>,
    pub presentation: Option<Presentation>,
}

impl PipelineOutcome {
    pub fn new(strategy: Strategy) -> Self {
        Self {
            strategy,
            stages: Vec::new(),
            tests: None,
            coverage: None,
            advice: Vec::new(),
            warnings: Vec::new(),
            cleaned: Vec::new(),
            presentation: None,
        }
    }

    /// Whether tests ran and passed.
    pub fn tests_passed(&self) -> bool {
        self.tests.map(|t| t.passed).unwrap_or(false)
    }
}

/// Shared inputs for a pipeline run.
pub struct PipelineContext<'a> {
    pub config: &'a PipelineConfig,
    pub tools: &'a Toolchain,
    pub reporter: &'a dyn Reporter,
}

impl<'a> PipelineContext<'a> {
    pub fn new(config: &'a PipelineConfig, tools: &'a Toolchain, reporter: &'a dyn Reporter) -> Self {
        Self {
            config,
            tools,
            reporter,
        }
    }

    pub fn collector(&self) -> CoverageCollector<'a> {
        CoverageCollector::new(self.tools.coverage.as_ref(), self.reporter)
    }
}

/// Builds up a [`PipelineOutcome`] while stages execute.
pub(crate) struct PipelineRun<'c, 'a> {
    ctx: &'c PipelineContext<'a>,
    outcome: PipelineOutcome,
}

impl<'c, 'a> PipelineRun<'c, 'a> {
    pub(crate) fn new(ctx: &'c PipelineContext<'a>, strategy: Strategy) -> Self {
        Self {
            ctx,
            outcome: PipelineOutcome::new(strategy),
        }
    }

    pub(crate) fn stage(&self, name: &str) {
        self.ctx.reporter.stage(name);
    }

    pub(crate) fn warn(&mut self, message: impl Into<String>) {
        let message = message.into();
        self.ctx.reporter.warn(&message);
        self.outcome.warnings.push(message);
    }

    /// Run a build step and record it, whatever its exit code.
    pub(crate) async fn invoke(&mut self, step: BuildStep) -> Result<ToolOutput> {
        self.ctx.reporter.command(&step.invocation().command_line());
        let output = self.ctx.tools.build.invoke(&step).await?;
        self.outcome.stages.push(StageRecord {
            name: step.name().to_string(),
            exit_code: output.exit_code,
            duration_ms: output.duration_ms,
        });
        Ok(output)
    }

    /// Run a build step that must succeed.
    pub(crate) async fn require(&mut self, step: BuildStep) -> Result<ToolOutput> {
        let name = step.name();
        self.invoke(step).await?.ensure_success(name)
    }

    pub(crate) fn outcome_mut(&mut self) -> &mut PipelineOutcome {
        &mut self.outcome
    }

    pub(crate) fn finish(self) -> PipelineOutcome {
        self.outcome
    }
}

/// Parse `Total Tests: N` from `ctest -N` output. Missing means zero.
pub fn parse_total_tests(listing: &str) -> usize {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"Total Tests:\s*(\d+)").expect("valid regex"));
    re.captures(listing)
        .and_then(|caps| caps[1].parse().ok())
        .unwrap_or(0)
}

/// The pipeline chosen for a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pipeline {
    Descriptor(DescriptorPipeline),
    SimpleBuild(SimpleBuildPipeline),
}

impl Pipeline {
    pub fn for_strategy(strategy: Strategy) -> Self {
        match strategy {
            Strategy::Descriptor => Pipeline::Descriptor(DescriptorPipeline),
            Strategy::SimpleBuild => Pipeline::SimpleBuild(SimpleBuildPipeline),
        }
    }

    pub fn strategy(&self) -> Strategy {
        match self {
            Pipeline::Descriptor(_) => Strategy::Descriptor,
            Pipeline::SimpleBuild(_) => Strategy::SimpleBuild,
        }
    }

    pub async fn run(&self, ctx: &PipelineContext<'_>) -> Result<PipelineOutcome> {
        match self {
            Pipeline::Descriptor(p) => p.run(ctx).await,
            Pipeline::SimpleBuild(p) => p.run(ctx).await,
        }
    }
}
