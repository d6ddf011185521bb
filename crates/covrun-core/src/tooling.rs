//! External tool capabilities.
//!
//! Every opaque program covrun drives sits behind one of four traits:
//! [`DependencyChecker`], [`BuildDriver`], [`CoverageTool`] and
//! [`ReportViewer`]. Each takes a typed request whose command-line contract
//! lives in its `invocation()` method, so fakes can stand in for the real
//! programs in tests. [`HostTools`] implements all four by spawning
//! processes through [`ProcessRunner`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Instant;
use tokio::process::Command;
use tracing::debug;

use crate::config::BuildVariant;
use crate::error::{CovrunError, Result};

// ---------------------------------------------------------------------------
// Invocation + output
// ---------------------------------------------------------------------------

/// How a child's stdout/stderr are handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Stream straight to the terminal.
    Inherit,
    /// Collect into [`ToolOutput`].
    Capture,
    /// Drop it.
    Discard,
}

/// A single external command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub output: OutputMode,
}

impl Invocation {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            output: OutputMode::Inherit,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    pub fn output(mut self, mode: OutputMode) -> Self {
        self.output = mode;
        self
    }

    /// Run under `sudo` when `escalate` is set.
    pub fn privileged(self, escalate: bool) -> Self {
        if !escalate {
            return self;
        }
        let mut args = Vec::with_capacity(self.args.len() + 1);
        args.push(self.program);
        args.extend(self.args);
        Self {
            program: "sudo".to_string(),
            args,
            cwd: self.cwd,
            output: self.output,
        }
    }

    /// Shell-like rendering used in logs: `program args   # cwd=dir`.
    pub fn command_line(&self) -> String {
        let mut line = self.program.clone();
        for arg in &self.args {
            line.push(' ');
            line.push_str(arg);
        }
        if let Some(cwd) = &self.cwd {
            line.push_str(&format!("   # cwd={}", cwd.display()));
        }
        line
    }
}

/// Result of running an external command.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ToolOutput {
    /// Exit code (0 = success, -1 = terminated by signal).
    pub exit_code: i32,

    /// Captured stdout (empty unless captured).
    pub stdout: String,

    /// Captured stderr (empty unless captured).
    pub stderr: String,

    /// Duration in milliseconds.
    pub duration_ms: u64,
}

impl ToolOutput {
    /// Successful output with no captured text.
    pub fn ok() -> Self {
        Self::default()
    }

    pub fn with_exit_code(exit_code: i32) -> Self {
        Self {
            exit_code,
            ..Self::default()
        }
    }

    pub fn passed(&self) -> bool {
        self.exit_code == 0
    }

    /// Fail with [`CovrunError::StageFailed`] unless the tool exited 0.
    pub fn ensure_success(self, stage: &str) -> Result<Self> {
        if self.passed() {
            Ok(self)
        } else {
            Err(CovrunError::StageFailed {
                stage: stage.to_string(),
                exit_code: self.exit_code,
            })
        }
    }
}

// ---------------------------------------------------------------------------
// Process runner
// ---------------------------------------------------------------------------

/// Spawns an [`Invocation`] and waits for it to finish.
pub struct ProcessRunner;

impl ProcessRunner {
    /// Execute the command and return its output.
    ///
    /// There is no timeout: a hung tool hangs the run.
    pub async fn execute(invocation: &Invocation) -> Result<ToolOutput> {
        let start = Instant::now();

        let mut command = Command::new(&invocation.program);
        command.args(&invocation.args);
        if let Some(cwd) = &invocation.cwd {
            command.current_dir(cwd);
        }
        let (stdout, stderr) = match invocation.output {
            OutputMode::Inherit => (Stdio::inherit(), Stdio::inherit()),
            OutputMode::Capture => (Stdio::piped(), Stdio::piped()),
            OutputMode::Discard => (Stdio::null(), Stdio::null()),
        };
        command.stdin(Stdio::null()).stdout(stdout).stderr(stderr);

        let output = command
            .spawn()
            .map_err(|source| CovrunError::Spawn {
                program: invocation.program.clone(),
                source,
            })?
            .wait_with_output()
            .await?;

        let duration_ms = start.elapsed().as_millis() as u64;
        let exit_code = output.status.code().unwrap_or(-1);
        debug!(program = %invocation.program, exit_code, duration_ms, "Command finished");

        Ok(ToolOutput {
            exit_code,
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            duration_ms,
        })
    }
}

// ---------------------------------------------------------------------------
// Dependency checker
// ---------------------------------------------------------------------------

/// Package manager operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PackageOp {
    /// `dpkg -s <package>`: is the package already installed?
    Probe { package: String },
    /// `apt-get update -qq`
    UpdateIndex,
    /// `apt-get install -y <package>`
    Install { package: String },
}

impl PackageOp {
    pub fn name(&self) -> &'static str {
        match self {
            PackageOp::Probe { .. } => "package_probe",
            PackageOp::UpdateIndex => "package_update",
            PackageOp::Install { .. } => "package_install",
        }
    }

    pub fn invocation(&self, escalate: bool) -> Invocation {
        match self {
            PackageOp::Probe { package } => Invocation::new("dpkg")
                .args(["-s", package.as_str()])
                .output(OutputMode::Discard),
            PackageOp::UpdateIndex => Invocation::new("apt-get")
                .args(["update", "-qq"])
                .privileged(escalate),
            PackageOp::Install { package } => Invocation::new("apt-get")
                .args(["install", "-y", package.as_str()])
                .privileged(escalate),
        }
    }
}

/// Looks up tools on `PATH` and drives the package manager.
#[async_trait]
pub trait DependencyChecker: Send + Sync {
    /// Full path of `tool` if it is on `PATH`.
    fn locate(&self, tool: &str) -> Option<PathBuf>;

    async fn invoke(&self, op: &PackageOp) -> Result<ToolOutput>;
}

// ---------------------------------------------------------------------------
// Build driver
// ---------------------------------------------------------------------------

/// Build, configure and test steps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildStep {
    /// `cmake -S <source> -B <build_dir> -DCMAKE_BUILD_TYPE=<variant> <defines...>`
    Configure {
        source: PathBuf,
        build_dir: PathBuf,
        variant: BuildVariant,
        defines: Vec<String>,
    },
    /// `cmake --build <build_dir> -j <jobs>`
    Build { build_dir: PathBuf, jobs: usize },
    /// `ctest -N` (captured, used to count tests)
    ListTests { build_dir: PathBuf },
    /// `ctest --output-on-failure`
    RunTests { build_dir: PathBuf },
    /// `make [target]` in the project root
    Make {
        project_root: PathBuf,
        target: Option<String>,
    },
}

impl BuildStep {
    /// Stage name used in logs and errors.
    pub fn name(&self) -> &'static str {
        match self {
            BuildStep::Configure { .. } => "configure",
            BuildStep::Build { .. } => "build",
            BuildStep::ListTests { .. } => "list_tests",
            BuildStep::RunTests { .. } => "test",
            BuildStep::Make { target: None, .. } => "make",
            BuildStep::Make { target: Some(_), .. } => "make_target",
        }
    }

    pub fn invocation(&self) -> Invocation {
        match self {
            BuildStep::Configure {
                source,
                build_dir,
                variant,
                defines,
            } => Invocation::new("cmake")
                .arg("-S")
                .arg(source.display().to_string())
                .arg("-B")
                .arg(build_dir.display().to_string())
                .arg(format!("-DCMAKE_BUILD_TYPE={variant}"))
                .args(defines.iter().cloned()),
            BuildStep::Build { build_dir, jobs } => Invocation::new("cmake")
                .arg("--build")
                .arg(build_dir.display().to_string())
                .arg("-j")
                .arg(jobs.to_string()),
            BuildStep::ListTests { build_dir } => Invocation::new("ctest")
                .arg("-N")
                .current_dir(build_dir)
                .output(OutputMode::Capture),
            BuildStep::RunTests { build_dir } => Invocation::new("ctest")
                .arg("--output-on-failure")
                .current_dir(build_dir),
            BuildStep::Make {
                project_root,
                target,
            } => Invocation::new("make")
                .args(target.iter().cloned())
                .current_dir(project_root),
        }
    }
}

/// Runs the build graph generator, build driver and test harness.
#[async_trait]
pub trait BuildDriver: Send + Sync {
    async fn invoke(&self, step: &BuildStep) -> Result<ToolOutput>;
}

// ---------------------------------------------------------------------------
// Coverage tool
// ---------------------------------------------------------------------------

/// lcov / genhtml operations. Paths are relative to `cwd` where the tools
/// accept them that way.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoverageOp {
    /// `lcov --directory <directory> --capture --output-file <artifact>`
    Capture {
        cwd: PathBuf,
        directory: PathBuf,
        artifact: String,
    },
    /// `lcov --remove <artifact> <mask> --output-file <artifact>`
    Remove {
        cwd: PathBuf,
        artifact: String,
        mask: String,
    },
    /// `genhtml <artifact> --output-directory <html_dir>`
    Render {
        cwd: PathBuf,
        artifact: String,
        html_dir: String,
    },
}

impl CoverageOp {
    pub fn name(&self) -> &'static str {
        match self {
            CoverageOp::Capture { .. } => "coverage_capture",
            CoverageOp::Remove { .. } => "coverage_filter",
            CoverageOp::Render { .. } => "coverage_render",
        }
    }

    pub fn cwd(&self) -> &Path {
        match self {
            CoverageOp::Capture { cwd, .. }
            | CoverageOp::Remove { cwd, .. }
            | CoverageOp::Render { cwd, .. } => cwd,
        }
    }

    pub fn invocation(&self) -> Invocation {
        match self {
            CoverageOp::Capture {
                cwd,
                directory,
                artifact,
            } => Invocation::new("lcov")
                .arg("--directory")
                .arg(directory.display().to_string())
                .args(["--capture", "--output-file", artifact.as_str()])
                .current_dir(cwd),
            CoverageOp::Remove {
                cwd,
                artifact,
                mask,
            } => Invocation::new("lcov")
                .args(["--remove", artifact.as_str(), mask.as_str()])
                .args(["--output-file", artifact.as_str()])
                .current_dir(cwd),
            CoverageOp::Render {
                cwd,
                artifact,
                html_dir,
            } => Invocation::new("genhtml")
                .arg(artifact.as_str())
                .args(["--output-directory", html_dir.as_str()])
                .current_dir(cwd),
        }
    }
}

/// Captures, filters and renders coverage data.
#[async_trait]
pub trait CoverageTool: Send + Sync {
    async fn invoke(&self, op: &CoverageOp) -> Result<ToolOutput>;
}

// ---------------------------------------------------------------------------
// Report viewer
// ---------------------------------------------------------------------------

/// Hands a report file to a viewer. Does not wait for the viewer to exit.
pub trait ReportViewer: Send + Sync {
    fn open(&self, entry: &Path) -> Result<()>;
}

// ---------------------------------------------------------------------------
// Toolchain bundle
// ---------------------------------------------------------------------------

/// The four capabilities a pipeline needs, shared behind `Arc`s.
#[derive(Clone)]
pub struct Toolchain {
    pub deps: Arc<dyn DependencyChecker>,
    pub build: Arc<dyn BuildDriver>,
    pub coverage: Arc<dyn CoverageTool>,
    pub viewer: Arc<dyn ReportViewer>,
}

impl Toolchain {
    /// Real tools on the host.
    pub fn host() -> Self {
        Self::from_shared(Arc::new(HostTools::new()))
    }

    /// Use one value for every capability.
    pub fn from_shared<T>(tools: Arc<T>) -> Self
    where
        T: DependencyChecker + BuildDriver + CoverageTool + ReportViewer + 'static,
    {
        Self {
            deps: tools.clone(),
            build: tools.clone(),
            coverage: tools.clone(),
            viewer: tools,
        }
    }
}

impl std::fmt::Debug for Toolchain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Toolchain").finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Host implementation
// ---------------------------------------------------------------------------

/// Viewer program for the current platform.
pub fn platform_viewer() -> &'static str {
    if cfg!(target_os = "macos") {
        "open"
    } else {
        "xdg-open"
    }
}

/// Real tools on the host, spawned as child processes.
#[derive(Debug, Clone)]
pub struct HostTools {
    /// Prefix package manager commands with `sudo`.
    escalate: bool,
    viewer: String,
}

impl HostTools {
    /// Use `sudo` for package installs when it is available.
    pub fn new() -> Self {
        Self {
            escalate: which::which("sudo").is_ok(),
            viewer: platform_viewer().to_string(),
        }
    }

    pub fn with_viewer(mut self, viewer: impl Into<String>) -> Self {
        self.viewer = viewer.into();
        self
    }
}

impl Default for HostTools {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DependencyChecker for HostTools {
    fn locate(&self, tool: &str) -> Option<PathBuf> {
        which::which(tool).ok()
    }

    async fn invoke(&self, op: &PackageOp) -> Result<ToolOutput> {
        ProcessRunner::execute(&op.invocation(self.escalate)).await
    }
}

#[async_trait]
impl BuildDriver for HostTools {
    async fn invoke(&self, step: &BuildStep) -> Result<ToolOutput> {
        ProcessRunner::execute(&step.invocation()).await
    }
}

#[async_trait]
impl CoverageTool for HostTools {
    async fn invoke(&self, op: &CoverageOp) -> Result<ToolOutput> {
        ProcessRunner::execute(&op.invocation()).await
    }
}

impl ReportViewer for HostTools {
    fn open(&self, entry: &Path) -> Result<()> {
        let viewer = which::which(&self.viewer).map_err(|_| CovrunError::NoViewer {
            program: self.viewer.clone(),
        })?;
        std::process::Command::new(viewer)
            .arg(entry)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|source| CovrunError::Spawn {
                program: self.viewer.clone(),
                source,
            })?;
        Ok(())
    }
}
