//! Coverage capture, exclusion filtering and HTML rendering.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::reporter::Reporter;
use crate::tooling::{CoverageOp, CoverageTool, ToolOutput};

/// Raw aggregated coverage data file, relative to the working directory.
pub const RAW_ARTIFACT: &str = "coverage.info";

/// HTML report directory, relative to the working directory.
pub const HTML_DIR: &str = "coverage_html";

/// Entry file inside [`HTML_DIR`].
pub const ENTRY_FILE: &str = "index.html";

/// Where a run's coverage outputs live.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CoverageReport {
    /// Raw capture artifact.
    pub artifact: PathBuf,

    /// Rendered HTML directory.
    pub html_dir: PathBuf,

    /// Report entry point.
    pub entry: PathBuf,

    /// Exclusion passes applied to the artifact.
    pub filter_passes: usize,
}

impl CoverageReport {
    /// Standard layout under `workdir`.
    pub fn at(workdir: &Path) -> Self {
        let html_dir = workdir.join(HTML_DIR);
        Self {
            artifact: workdir.join(RAW_ARTIFACT),
            entry: html_dir.join(ENTRY_FILE),
            html_dir,
            filter_passes: 0,
        }
    }

    pub fn entry_exists(&self) -> bool {
        self.entry.is_file()
    }
}

/// Drives a [`CoverageTool`] through capture → filter × N → render.
///
/// Any non-zero tool exit aborts the sequence.
pub struct CoverageCollector<'a> {
    tool: &'a dyn CoverageTool,
    reporter: &'a dyn Reporter,
}

impl<'a> CoverageCollector<'a> {
    pub fn new(tool: &'a dyn CoverageTool, reporter: &'a dyn Reporter) -> Self {
        Self { tool, reporter }
    }

    async fn invoke(&self, op: CoverageOp) -> Result<ToolOutput> {
        self.reporter.command(&op.invocation().command_line());
        self.tool.invoke(&op).await?.ensure_success(op.name())
    }

    /// Capture all instrumentation output under `directory` into the raw
    /// artifact in `workdir`.
    pub async fn capture(&self, workdir: &Path, directory: &Path) -> Result<PathBuf> {
        self.invoke(CoverageOp::Capture {
            cwd: workdir.to_path_buf(),
            directory: directory.to_path_buf(),
            artifact: RAW_ARTIFACT.to_string(),
        })
        .await?;
        Ok(workdir.join(RAW_ARTIFACT))
    }

    /// Apply each mask in order. Every pass rewrites the artifact in place,
    /// so pass `n` reads what pass `n - 1` wrote.
    pub async fn filter(&self, workdir: &Path, masks: &[String]) -> Result<usize> {
        for mask in masks {
            self.invoke(CoverageOp::Remove {
                cwd: workdir.to_path_buf(),
                artifact: RAW_ARTIFACT.to_string(),
                mask: mask.clone(),
            })
            .await?;
        }
        Ok(masks.len())
    }

    /// Replace any existing HTML directory with a fresh rendering.
    pub async fn render(&self, workdir: &Path) -> Result<CoverageReport> {
        let report = CoverageReport::at(workdir);
        if report.html_dir.exists() {
            tokio::fs::remove_dir_all(&report.html_dir).await?;
        }
        self.invoke(CoverageOp::Render {
            cwd: workdir.to_path_buf(),
            artifact: RAW_ARTIFACT.to_string(),
            html_dir: HTML_DIR.to_string(),
        })
        .await?;
        Ok(report)
    }

    /// Full sequence: capture, filter with `masks`, render.
    pub async fn collect(
        &self,
        workdir: &Path,
        directory: &Path,
        masks: &[String],
    ) -> Result<CoverageReport> {
        self.capture(workdir, directory).await?;
        let filter_passes = self.filter(workdir, masks).await?;
        let mut report = self.render(workdir).await?;
        report.filter_passes = filter_passes;
        Ok(report)
    }
}
