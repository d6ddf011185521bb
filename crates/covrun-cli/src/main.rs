//! covrun - build, test and coverage runner for C/C++ projects
//!
//! Builds a CMake project (or a plain Makefile project), runs its tests,
//! collects lcov coverage and renders an HTML report.
//!
//! ```text
//! covrun                      # CMake project in the current directory
//! covrun --build-with-make    # Makefile project
//! covrun --remove '*/third_party/*' --no-open
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use covrun_core::{
    BuildMode, BuildVariant, CovrunError, Orchestrator, PipelineConfig, PipelineOutcome,
    Toolchain, TracingReporter,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, Level};

#[derive(Parser, Debug)]
#[command(name = "covrun")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Build, test and collect coverage for C/C++ projects", long_about = None)]
struct Cli {
    /// Build with the project's Makefile even if CMakeLists.txt exists
    #[arg(long, env = "COVRUN_BUILD_WITH_MAKE")]
    build_with_make: bool,

    /// Project root containing CMakeLists.txt or Makefile
    #[arg(long, env = "COVRUN_PROJECT_DIR", default_value = ".")]
    project_dir: PathBuf,

    /// CMake build directory
    #[arg(long, env = "COVRUN_BUILD_DIR", default_value = "build")]
    build_dir: PathBuf,

    /// CMake build type
    #[arg(long, env = "COVRUN_BUILD_TYPE", default_value = "Debug")]
    build_type: BuildVariant,

    /// Do not install missing tools
    #[arg(long, env = "COVRUN_NO_INSTALL")]
    no_install: bool,

    /// Keep the existing build directory
    #[arg(long, env = "COVRUN_NO_CLEAN")]
    no_clean: bool,

    /// Do not open the report when finished
    #[arg(long, env = "COVRUN_NO_OPEN")]
    no_open: bool,

    /// Build and test without coverage instrumentation
    #[arg(long, env = "COVRUN_NO_COVERAGE")]
    no_coverage: bool,

    /// Parallel build jobs (default: available CPUs, at least 2)
    #[arg(short, long, env = "COVRUN_JOBS")]
    jobs: Option<usize>,

    /// Extra path glob to exclude from coverage (repeatable)
    #[arg(long = "remove", value_name = "MASK", env = "COVRUN_REMOVE")]
    remove: Vec<String>,

    /// Try to fix CMakeLists.txt automatically (not implemented yet)
    #[arg(long, env = "COVRUN_FIX_CMAKE")]
    fix_cmake: bool,

    /// Test name used in CMakeLists.txt suggestions
    #[arg(long, env = "COVRUN_TEST_TARGET", default_value = covrun_core::config::DEFAULT_TEST_TARGET)]
    test_target: String,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Emit JSON-formatted log lines and a JSON summary
    #[arg(long)]
    json: bool,
}

impl Cli {
    /// Settings for the run. Relative paths stay relative until
    /// [`PipelineConfig::absolutize`] is applied.
    fn pipeline_config(&self) -> PipelineConfig {
        let mut config = PipelineConfig::new(&self.project_dir)
            .with_build_dir(&self.build_dir)
            .with_variant(self.build_type)
            .with_coverage(!self.no_coverage)
            .with_extra_masks(self.remove.iter().cloned())
            .with_allow_install(!self.no_install)
            .with_clean_first(!self.no_clean)
            .with_open_report(!self.no_open)
            .with_auto_fix(self.fix_cmake)
            .with_test_target(&self.test_target);

        if let Some(jobs) = self.jobs {
            config = config.with_jobs(jobs);
        }
        if self.build_with_make {
            config = config.with_mode(BuildMode::SimpleBuild);
        }
        config
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    covrun_core::init_tracing(cli.json, level);

    if let Err(err) = run(&cli).await {
        error!("{err:#}");
        std::process::exit(exit_code(&err));
    }
}

async fn run(cli: &Cli) -> Result<()> {
    let cwd = std::env::current_dir().context("Failed to read current directory")?;
    let config = cli.pipeline_config().absolutize(&cwd);

    let orchestrator = Orchestrator::new(Toolchain::host(), Arc::new(TracingReporter));
    let outcome = orchestrator.run(&config).await?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    } else {
        print_summary(&outcome);
    }
    Ok(())
}

fn print_summary(outcome: &PipelineOutcome) {
    println!("Pipeline:  {}", outcome.strategy.name());
    if let Some(tests) = outcome.tests {
        let status = if tests.passed { "passed" } else { "failed" };
        match tests.total {
            Some(total) => println!("Tests:     {total} ({status})"),
            None => println!("Tests:     {status}"),
        }
    }
    if let Some(report) = &outcome.coverage {
        println!("Report:    {}", report.entry.display());
    }
    if !outcome.warnings.is_empty() {
        println!("Warnings:  {}", outcome.warnings.len());
    }
}

/// Process exit status for a failed run.
fn exit_code(err: &anyhow::Error) -> i32 {
    err.downcast_ref::<CovrunError>()
        .map(CovrunError::exit_code)
        .unwrap_or(1)
}
