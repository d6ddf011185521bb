//! Makefile pipeline: make → make test → capture → render → present →
//! cleanup.
//!
//! covrun cannot inject flags into an arbitrary Makefile, so the build file
//! must already compile with `--coverage`.

use super::{PipelineContext, PipelineOutcome, PipelineRun, TestRunSummary};
use crate::error::{CovrunError, Result};
use crate::presenter::ReportPresenter;
use crate::strategy::{ProjectLayout, Strategy};
use crate::tooling::BuildStep;

/// Flag the build file must mention.
pub const INSTRUMENTATION_MARKER: &str = "--coverage";

/// Target that runs the project's tests.
pub const TEST_TARGET: &str = "test";

/// Pipeline for projects with only a `Makefile`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SimpleBuildPipeline;

impl SimpleBuildPipeline {
    pub async fn run(&self, ctx: &PipelineContext<'_>) -> Result<PipelineOutcome> {
        let config = ctx.config;
        let root = &config.project_root;

        let build_file = ProjectLayout::probe(root)
            .build_file
            .ok_or_else(|| CovrunError::BuildFileNotFound { root: root.clone() })?;

        if config.coverage {
            let bytes = tokio::fs::read(&build_file).await?;
            if !String::from_utf8_lossy(&bytes).contains(INSTRUMENTATION_MARKER) {
                return Err(CovrunError::MissingInstrumentation { path: build_file });
            }
        }

        ctx.reporter.info("Building with Makefile");
        let mut run = PipelineRun::new(ctx, Strategy::SimpleBuild);
        let result = Self::stages(&mut run, ctx).await;

        // Runs even when a stage failed, so a broken run does not leave
        // instrumentation output in the source tree.
        if config.coverage {
            run.stage("cleanup");
            let cleaned = ReportPresenter::cleanup(root, ctx.reporter).await;
            run.outcome_mut().cleaned = cleaned;
        }

        result?;
        ctx.reporter.info("Makefile build finished");
        Ok(run.finish())
    }

    async fn stages(run: &mut PipelineRun<'_, '_>, ctx: &PipelineContext<'_>) -> Result<()> {
        let config = ctx.config;
        let root = &config.project_root;

        run.stage("build");
        run.require(BuildStep::Make {
            project_root: root.clone(),
            target: None,
        })
        .await?;

        run.stage("test");
        let output = run
            .invoke(BuildStep::Make {
                project_root: root.clone(),
                target: Some(TEST_TARGET.to_string()),
            })
            .await?;
        if !output.passed() {
            run.warn(format!(
                "make {TEST_TARGET} failed (exit code {}); collecting coverage anyway",
                output.exit_code
            ));
        }
        run.outcome_mut().tests = Some(TestRunSummary {
            total: None,
            passed: output.passed(),
        });

        if !config.coverage {
            ctx.reporter.info("Coverage disabled, skipping report");
            return Ok(());
        }

        run.stage("coverage");
        let collector = ctx.collector();
        collector.capture(root, root).await?;

        ctx.reporter.info("Generating HTML report");
        let report = collector.render(root).await?;

        run.stage("report");
        let presentation = ReportPresenter::present(
            &report.entry,
            config.open_report,
            ctx.tools.viewer.as_ref(),
            ctx.reporter,
        );

        let outcome = run.outcome_mut();
        outcome.coverage = Some(report);
        outcome.presentation = Some(presentation);
        Ok(())
    }
}
