//! Report presentation and transient artifact cleanup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::coverage::RAW_ARTIFACT;
use crate::reporter::Reporter;
use crate::tooling::ReportViewer;

/// Artifacts gcov instrumentation leaves next to the objects, plus the raw
/// capture. Removed from the project root after a simple build.
pub const TRANSIENT_PATTERNS: &[&str] = &["*.gcda", "*.gcno", RAW_ARTIFACT];

/// What happened when presenting the report.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Presentation {
    /// Handed to the viewer.
    Opened,
    /// Only the location was printed.
    LocationShown,
    /// Entry file does not exist.
    Missing,
}

pub struct ReportPresenter;

impl ReportPresenter {
    /// Print the report location and open it if requested.
    ///
    /// A missing entry file or an unavailable viewer is a warning, never an
    /// error.
    pub fn present(
        entry: &Path,
        open_requested: bool,
        viewer: &dyn ReportViewer,
        reporter: &dyn Reporter,
    ) -> Presentation {
        reporter.info(&format!("Coverage report: {}", entry.display()));

        if !entry.is_file() {
            reporter.warn(&format!("Report file not found: {}", entry.display()));
            return Presentation::Missing;
        }

        if !open_requested {
            return Presentation::LocationShown;
        }

        reporter.info("Opening report in viewer");
        match viewer.open(entry) {
            Ok(()) => Presentation::Opened,
            Err(err) => {
                reporter.warn(&format!(
                    "{err}. Open the report manually: {}",
                    entry.display()
                ));
                Presentation::LocationShown
            }
        }
    }

    /// Delete transient coverage files directly under `root`.
    ///
    /// Returns the removed paths. Failures are reported and skipped.
    pub async fn cleanup(root: &Path, reporter: &dyn Reporter) -> Vec<PathBuf> {
        reporter.info("Removing transient coverage files");
        let mut removed = Vec::new();

        for pattern in TRANSIENT_PATTERNS {
            let escaped = glob::Pattern::escape(&root.display().to_string());
            let full = format!("{escaped}/{pattern}");
            let entries = match glob::glob(&full) {
                Ok(entries) => entries,
                Err(err) => {
                    reporter.warn(&format!("Invalid cleanup pattern {full}: {err}"));
                    continue;
                }
            };

            for entry in entries {
                let path = match entry {
                    Ok(path) if path.is_file() => path,
                    Ok(_) => continue,
                    Err(err) => {
                        reporter.warn(&format!("Could not read {}: {err}", err.path().display()));
                        continue;
                    }
                };
                match tokio::fs::remove_file(&path).await {
                    Ok(()) => removed.push(path),
                    Err(err) => reporter.warn(&format!(
                        "Could not remove transient file {}: {err}",
                        path.display()
                    )),
                }
            }
        }

        removed
    }
}
