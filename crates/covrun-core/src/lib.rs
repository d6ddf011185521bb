//! covrun core - build, test and coverage orchestration
//!
//! Drives a native C/C++ project through:
//! - Dependency bootstrap (cmake, g++, make, lcov via apt-get)
//! - A CMake pipeline (configure, build, ctest) or a Makefile pipeline
//! - lcov capture with exclusion filters and a genhtml report
//!
//! External programs sit behind the capability traits in [`tooling`] so the
//! pipelines can be exercised against [`fakes`].

pub mod advisory;
pub mod config;
pub mod coverage;
pub mod deps;
pub mod error;
pub mod fakes;
pub mod orchestrator;
pub mod pipeline;
pub mod presenter;
pub mod reporter;
pub mod strategy;
pub mod telemetry;
pub mod tooling;

// Re-export key types
pub use advisory::{Advice, AdviceKind, AdvisoryChecker};
pub use config::{BuildMode, BuildVariant, PipelineConfig};
pub use coverage::{CoverageCollector, CoverageReport};
pub use deps::{DependencyResolver, DependencySet};
pub use error::{CovrunError, Result};
pub use orchestrator::Orchestrator;
pub use pipeline::{
    DescriptorPipeline, Pipeline, PipelineContext, PipelineOutcome, SimpleBuildPipeline,
    StageRecord, TestRunSummary,
};
pub use presenter::{Presentation, ReportPresenter};
pub use reporter::{Reporter, TracingReporter};
pub use strategy::{Strategy, StrategySelector};
pub use telemetry::init_tracing;
pub use tooling::{
    BuildDriver, BuildStep, CoverageOp, CoverageTool, DependencyChecker, HostTools, PackageOp,
    ReportViewer, ToolOutput, Toolchain,
};
