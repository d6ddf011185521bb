//! Pipeline configuration.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Exclusion masks applied to every descriptor-build coverage run.
pub const DEFAULT_EXCLUSION_MASKS: &[&str] = &["/usr/*", "*/tests/*", "*/CMakeFiles/*"];

/// Test target name used in remediation hints when none is given.
pub const DEFAULT_TEST_TARGET: &str = "MyTests";

/// CMake build variant.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum BuildVariant {
    #[default]
    Debug,
    Release,
}

impl BuildVariant {
    pub fn as_str(&self) -> &'static str {
        match self {
            BuildVariant::Debug => "Debug",
            BuildVariant::Release => "Release",
        }
    }
}

impl fmt::Display for BuildVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BuildVariant {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "Debug" => Ok(BuildVariant::Debug),
            "Release" => Ok(BuildVariant::Release),
            other => Err(format!(
                "invalid build type '{other}' (expected Debug or Release)"
            )),
        }
    }
}

/// Which pipeline the user asked for.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BuildMode {
    /// Let the strategy selector inspect the project root.
    #[default]
    Auto,
    /// Ignore any descriptor file and build through the Makefile.
    SimpleBuild,
}

/// Effective settings for one run.
///
/// Built once (usually from CLI arguments) and then only read.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PipelineConfig {
    /// Project root holding `CMakeLists.txt` or `Makefile`.
    pub project_root: PathBuf,

    /// CMake build output directory.
    pub build_dir: PathBuf,

    pub variant: BuildVariant,

    /// Whether instrumentation and coverage collection are enabled.
    pub coverage: bool,

    /// Parallel jobs passed to the build driver.
    pub jobs: usize,

    /// Path globs stripped from the coverage artifact, in order.
    pub exclusion_masks: Vec<String>,

    /// Install missing tools through the package manager.
    pub allow_install: bool,

    /// Remove the build directory before configuring.
    pub clean_first: bool,

    /// Open the HTML report when it exists.
    pub open_report: bool,

    pub mode: BuildMode,

    /// Reserved: descriptor auto-fix is accepted but not implemented.
    pub auto_fix: bool,

    /// Test target name used in advisory tips.
    pub test_target: String,
}

impl PipelineConfig {
    /// Create a configuration with default settings for `project_root`.
    pub fn new(project_root: impl Into<PathBuf>) -> Self {
        let project_root = project_root.into();
        let build_dir = project_root.join("build");
        Self {
            project_root,
            build_dir,
            variant: BuildVariant::Debug,
            coverage: true,
            jobs: default_jobs(),
            exclusion_masks: DEFAULT_EXCLUSION_MASKS
                .iter()
                .map(|m| m.to_string())
                .collect(),
            allow_install: true,
            clean_first: true,
            open_report: true,
            mode: BuildMode::Auto,
            auto_fix: false,
            test_target: DEFAULT_TEST_TARGET.to_string(),
        }
    }

    pub fn with_build_dir(mut self, build_dir: impl Into<PathBuf>) -> Self {
        self.build_dir = build_dir.into();
        self
    }

    pub fn with_variant(mut self, variant: BuildVariant) -> Self {
        self.variant = variant;
        self
    }

    pub fn with_coverage(mut self, enabled: bool) -> Self {
        self.coverage = enabled;
        self
    }

    /// Set the job count; zero is clamped to one.
    pub fn with_jobs(mut self, jobs: usize) -> Self {
        self.jobs = jobs.max(1);
        self
    }

    /// Append exclusion masks after the ones already configured.
    pub fn with_extra_masks<I, S>(mut self, masks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exclusion_masks.extend(masks.into_iter().map(Into::into));
        self
    }

    /// Replace the exclusion masks entirely.
    pub fn with_masks<I, S>(mut self, masks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exclusion_masks = masks.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_allow_install(mut self, allow: bool) -> Self {
        self.allow_install = allow;
        self
    }

    pub fn with_clean_first(mut self, clean: bool) -> Self {
        self.clean_first = clean;
        self
    }

    pub fn with_open_report(mut self, open: bool) -> Self {
        self.open_report = open;
        self
    }

    pub fn with_mode(mut self, mode: BuildMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_auto_fix(mut self, auto_fix: bool) -> Self {
        self.auto_fix = auto_fix;
        self
    }

    pub fn with_test_target(mut self, target: impl Into<String>) -> Self {
        self.test_target = target.into();
        self
    }

    /// Resolve relative project and build paths against `cwd`.
    pub fn absolutize(mut self, cwd: &Path) -> Self {
        if self.project_root.is_relative() {
            self.project_root = cwd.join(&self.project_root);
        }
        if self.build_dir.is_relative() {
            self.build_dir = cwd.join(&self.build_dir);
        }
        self
    }

    /// Path of the CMake descriptor file.
    pub fn descriptor_path(&self) -> PathBuf {
        self.project_root.join(crate::strategy::DESCRIPTOR_FILE)
    }
}

/// Available parallelism, but never fewer than two jobs.
pub fn default_jobs() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(2)
        .max(2)
}
