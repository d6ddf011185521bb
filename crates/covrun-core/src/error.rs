//! Error taxonomy for covrun.
//!
//! Only fatal conditions are errors. Test failures and best-effort cleanup
//! problems are surfaced as warnings through the [`Reporter`](crate::Reporter)
//! and never reach this type.

use std::path::PathBuf;

use thiserror::Error;

/// Fatal errors that abort a pipeline run.
#[derive(Debug, Error)]
pub enum CovrunError {
    // -- environment -------------------------------------------------------
    /// Required tools are missing and installation was not allowed.
    #[error(
        "missing required tools: {}. Install them manually (apt-get install {}) or run without --no-install",
        .tools.join(", "),
        .tools.join(" ")
    )]
    MissingTools { tools: Vec<String> },

    /// No supported package manager is available to install missing tools.
    #[error("apt-get not found; install the dependencies manually: {}", .tools.join(", "))]
    NoPackageManager { tools: Vec<String> },

    /// The package manager failed while installing a package.
    #[error("failed to install package {package} (exit code {exit_code})")]
    InstallFailed { package: String, exit_code: i32 },

    // -- project shape -----------------------------------------------------
    /// Neither a descriptor file nor a build file exists at the project root.
    #[error("no recognized build descriptor found in {} (expected CMakeLists.txt or Makefile)", .root.display())]
    NoBuildDescriptor { root: PathBuf },

    /// Simple-Build mode was forced but no build file exists.
    #[error("Makefile not found in {}", .root.display())]
    BuildFileNotFound { root: PathBuf },

    /// The build file does not declare coverage instrumentation.
    #[error("{} has no coverage flags (--coverage); add them to the compiler and linker flags", .path.display())]
    MissingInstrumentation { path: PathBuf },

    // -- stage execution ---------------------------------------------------
    /// An external tool exited with a non-zero status.
    #[error("stage '{stage}' failed with exit code {exit_code}")]
    StageFailed { stage: String, exit_code: i32 },

    /// An external tool could not be started at all.
    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    // -- best effort -------------------------------------------------------
    /// No report viewer on `PATH`. Callers downgrade this to a warning.
    #[error("{program} not found")]
    NoViewer { program: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl CovrunError {
    /// Process exit status for this error.
    ///
    /// Failing external tools propagate their own exit code; everything else
    /// (including tools killed by a signal, reported as -1) maps to 1.
    pub fn exit_code(&self) -> i32 {
        match self {
            CovrunError::StageFailed { exit_code, .. }
            | CovrunError::InstallFailed { exit_code, .. }
                if *exit_code > 0 =>
            {
                *exit_code
            }
            _ => 1,
        }
    }
}

/// Result type for covrun operations.
pub type Result<T> = std::result::Result<T, CovrunError>;
