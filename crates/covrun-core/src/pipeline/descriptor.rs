//! CMake pipeline: clean → advisory → configure → build → test → coverage →
//! report.

use std::path::Path;

use tracing::debug;

use super::{parse_total_tests, PipelineContext, PipelineOutcome, PipelineRun, TestRunSummary};
use crate::advisory::{declares_coverage_toggle, AdvisoryChecker};
use crate::config::PipelineConfig;
use crate::error::Result;
use crate::presenter::ReportPresenter;
use crate::strategy::Strategy;
use crate::tooling::BuildStep;

/// Compiler and linker overrides used when the project has no coverage
/// option of its own.
pub const INSTRUMENTATION_DEFINES: &[&str] = &[
    "-DCMAKE_CXX_FLAGS_DEBUG=-O0 -g --coverage",
    "-DCMAKE_C_FLAGS_DEBUG=-O0 -g --coverage",
    "-DCMAKE_EXE_LINKER_FLAGS_DEBUG=--coverage",
    "-DCMAKE_SHARED_LINKER_FLAGS_DEBUG=--coverage",
];

/// Switch passed when the project declares `option(ENABLE_COVERAGE ...)`.
pub const COVERAGE_SWITCH: &str = "-DENABLE_COVERAGE=ON";

/// Extra `-D` arguments for the configure step.
///
/// A project that wires coverage itself only gets its toggle switched on;
/// its own flags are left alone. Otherwise the instrumentation flags are
/// injected directly.
pub fn configure_defines(config: &PipelineConfig, descriptor: &str) -> Vec<String> {
    if !config.coverage {
        return Vec::new();
    }
    if declares_coverage_toggle(descriptor) {
        vec![COVERAGE_SWITCH.to_string()]
    } else {
        INSTRUMENTATION_DEFINES.iter().map(|d| d.to_string()).collect()
    }
}

/// Pipeline for projects with a `CMakeLists.txt`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DescriptorPipeline;

impl DescriptorPipeline {
    pub async fn run(&self, ctx: &PipelineContext<'_>) -> Result<PipelineOutcome> {
        let config = ctx.config;
        let mut run = PipelineRun::new(ctx, Strategy::Descriptor);

        if config.clean_first && config.build_dir.exists() {
            run.stage("clean");
            ctx.reporter.info(&format!(
                "Removing build directory: {}",
                config.build_dir.display()
            ));
            tokio::fs::remove_dir_all(&config.build_dir).await?;
        }
        tokio::fs::create_dir_all(&config.build_dir).await?;

        // Only coverage runs need the descriptor text.
        let descriptor = if config.coverage {
            Self::read_descriptor(&mut run, &config.descriptor_path()).await
        } else {
            None
        };
        if let Some(text) = &descriptor {
            Self::advise(&mut run, text, config);
        }

        run.stage("configure");
        run.require(BuildStep::Configure {
            source: config.project_root.clone(),
            build_dir: config.build_dir.clone(),
            variant: config.variant,
            defines: configure_defines(config, descriptor.as_deref().unwrap_or_default()),
        })
        .await?;

        run.stage("build");
        run.require(BuildStep::Build {
            build_dir: config.build_dir.clone(),
            jobs: config.jobs,
        })
        .await?;

        run.stage("test");
        let tests = Self::test(&mut run, &config.build_dir).await?;
        run.outcome_mut().tests = Some(tests);

        if !config.coverage {
            ctx.reporter.info("Coverage disabled, skipping report");
            return Ok(run.finish());
        }

        run.stage("coverage");
        let report = ctx
            .collector()
            .collect(&config.build_dir, Path::new("."), &config.exclusion_masks)
            .await?;

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

        ctx.reporter.info("Done");
        Ok(run.finish())
    }

    /// Descriptor text with invalid UTF-8 replaced. An unreadable file is a
    /// warning and skips the advisory check.
    async fn read_descriptor(run: &mut PipelineRun<'_, '_>, path: &Path) -> Option<String> {
        match tokio::fs::read(path).await {
            Ok(bytes) => Some(String::from_utf8_lossy(&bytes).into_owned()),
            Err(err) => {
                run.warn(format!(
                    "Could not read {}: {err}; skipping CMakeLists.txt checks",
                    path.display()
                ));
                None
            }
        }
    }

    fn advise(run: &mut PipelineRun<'_, '_>, descriptor: &str, config: &PipelineConfig) {
        let advice = AdvisoryChecker::check(descriptor, &config.test_target);
        if !advice.is_empty() {
            run.warn("Possible problems in CMakeLists.txt:");
            for item in &advice {
                run.warn(format!(" - {}", item.tip.replace('\n', "\n   ")));
            }
        }
        if config.auto_fix {
            run.warn("CMakeLists.txt auto-fix is not implemented; no changes were made");
        }
        run.outcome_mut().advice = advice;
    }

    /// List tests, then run them. Neither an empty suite nor failing tests
    /// stop the pipeline: partial coverage is still worth reporting.
    async fn test(run: &mut PipelineRun<'_, '_>, build_dir: &Path) -> Result<TestRunSummary> {
        let listing = run
            .invoke(BuildStep::ListTests {
                build_dir: build_dir.to_path_buf(),
            })
            .await?;
        let text = format!("{}{}", listing.stdout, listing.stderr);
        debug!(listing = %text.trim(), "ctest -N");
        let total = parse_total_tests(&text);

        if total == 0 {
            run.warn("CTest found no tests. The coverage report will be empty.");
            return Ok(TestRunSummary {
                total: Some(0),
                passed: false,
            });
        }

        let output = run
            .invoke(BuildStep::RunTests {
                build_dir: build_dir.to_path_buf(),
            })
            .await?;
        if !output.passed() {
            run.warn(format!(
                "Tests failed (exit code {}); collecting coverage anyway",
                output.exit_code
            ));
        }

        Ok(TestRunSummary {
            total: Some(total),
            passed: output.passed(),
        })
    }
}
