//! In-memory fakes for the tool capabilities and the reporter.
//!
//! `RecordingTools` implements all four capability traits, journals every
//! invocation and imitates the filesystem effects of the real tools closely
//! enough for pipeline tests: cmake creates the build directory, make drops
//! `.gcno`/`.gcda` files, lcov writes and filters a tracefile, genhtml
//! writes `index.html`.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::{CovrunError, Result};
use crate::reporter::Reporter;
use crate::tooling::{
    BuildDriver, BuildStep, CoverageOp, CoverageTool, DependencyChecker, Invocation, PackageOp,
    ReportViewer, ToolOutput,
};

// ---------------------------------------------------------------------------
// Tracefile helpers
// ---------------------------------------------------------------------------

/// Source files listed in a tracefile, in order.
pub fn tracefile_sources(text: &str) -> Vec<String> {
    text.lines()
        .filter_map(|line| line.strip_prefix("SF:"))
        .map(str::to_string)
        .collect()
}

fn render_tracefile(sources: &[String]) -> String {
    let mut out = String::new();
    for source in sources {
        out.push_str("TN:\n");
        out.push_str(&format!("SF:{source}\n"));
        out.push_str("DA:1,1\n");
        out.push_str("end_of_record\n");
    }
    out
}

// ---------------------------------------------------------------------------
// RecordingTools
// ---------------------------------------------------------------------------

/// Scriptable stand-in for the host toolchain.
#[derive(Debug)]
pub struct RecordingTools {
    journal: Mutex<Vec<Invocation>>,
    missing: Mutex<HashSet<String>>,
    installed_packages: HashSet<String>,
    package_manager: bool,
    failures: HashMap<String, i32>,
    test_count: usize,
    sources: Vec<String>,
    viewer: bool,
    opened: Mutex<Vec<PathBuf>>,
    filter_history: Mutex<Vec<(usize, usize)>>,
}

impl Default for RecordingTools {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingTools {
    /// Every tool present, every step succeeding, two registered tests.
    pub fn new() -> Self {
        Self {
            journal: Mutex::new(Vec::new()),
            missing: Mutex::new(HashSet::new()),
            installed_packages: HashSet::new(),
            package_manager: true,
            failures: HashMap::new(),
            test_count: 2,
            sources: vec![
                "/usr/include/c++/13/bits/basic_string.h".to_string(),
                "/work/project/src/math_class.cpp".to_string(),
                "/work/project/tests/test_class.cpp".to_string(),
            ],
            viewer: true,
            opened: Mutex::new(Vec::new()),
            filter_history: Mutex::new(Vec::new()),
        }
    }

    /// Tools `locate` will not find until they are installed.
    pub fn with_missing<I, S>(self, tools: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.missing
            .lock()
            .unwrap()
            .extend(tools.into_iter().map(Into::into));
        self
    }

    /// Packages `dpkg -s` reports as installed.
    pub fn with_installed_packages<I, S>(mut self, packages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.installed_packages
            .extend(packages.into_iter().map(Into::into));
        self
    }

    pub fn without_package_manager(mut self) -> Self {
        self.package_manager = false;
        self
    }

    /// Make the step or op called `name` exit with `exit_code`.
    pub fn failing(mut self, name: &str, exit_code: i32) -> Self {
        self.failures.insert(name.to_string(), exit_code);
        self
    }

    /// Number of tests `ctest -N` reports.
    pub fn with_test_count(mut self, count: usize) -> Self {
        self.test_count = count;
        self
    }

    /// Source files the capture step records.
    pub fn with_sources<I, S>(mut self, sources: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.sources = sources.into_iter().map(Into::into).collect();
        self
    }

    pub fn without_viewer(mut self) -> Self {
        self.viewer = false;
        self
    }

    /// Every invocation, in call order.
    pub fn invocations(&self) -> Vec<Invocation> {
        self.journal.lock().unwrap().clone()
    }

    /// Rendered command lines, in call order.
    pub fn commands(&self) -> Vec<String> {
        self.invocations()
            .iter()
            .map(Invocation::command_line)
            .collect()
    }

    /// Invocations of one program.
    pub fn calls_to(&self, program: &str) -> Vec<Invocation> {
        self.invocations()
            .into_iter()
            .filter(|inv| inv.program == program || inv.args.first().map(String::as_str) == Some(program))
            .collect()
    }

    /// Files handed to the viewer.
    pub fn opened(&self) -> Vec<PathBuf> {
        self.opened.lock().unwrap().clone()
    }

    /// `(records before, records after)` for each filter pass.
    pub fn filter_history(&self) -> Vec<(usize, usize)> {
        self.filter_history.lock().unwrap().clone()
    }

    fn record(&self, invocation: Invocation) {
        self.journal.lock().unwrap().push(invocation);
    }

    fn scripted(&self, name: &str) -> ToolOutput {
        ToolOutput::with_exit_code(self.failures.get(name).copied().unwrap_or(0))
    }

    fn touch(path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, b"")?;
        Ok(())
    }
}

#[async_trait]
impl DependencyChecker for RecordingTools {
    fn locate(&self, tool: &str) -> Option<PathBuf> {
        if tool == crate::deps::PACKAGE_MANAGER && !self.package_manager {
            return None;
        }
        if self.missing.lock().unwrap().contains(tool) {
            return None;
        }
        Some(PathBuf::from("/usr/bin").join(tool))
    }

    async fn invoke(&self, op: &PackageOp) -> Result<ToolOutput> {
        self.record(op.invocation(false));
        match op {
            PackageOp::Probe { package } => {
                if self.installed_packages.contains(package) {
                    Ok(ToolOutput::ok())
                } else {
                    Ok(ToolOutput::with_exit_code(1))
                }
            }
            PackageOp::UpdateIndex => Ok(self.scripted(op.name())),
            PackageOp::Install { package } => {
                let output = self.scripted(op.name());
                if output.passed() {
                    self.missing.lock().unwrap().remove(package);
                }
                Ok(output)
            }
        }
    }
}

#[async_trait]
impl BuildDriver for RecordingTools {
    async fn invoke(&self, step: &BuildStep) -> Result<ToolOutput> {
        self.record(step.invocation());
        let mut output = self.scripted(step.name());
        if !output.passed() {
            return Ok(output);
        }
        match step {
            BuildStep::Configure { build_dir, .. } => std::fs::create_dir_all(build_dir)?,
            BuildStep::ListTests { .. } => {
                output.stdout = format!(
                    "Test project\n\nTotal Tests: {}\n",
                    self.test_count
                );
            }
            BuildStep::Make {
                project_root,
                target: None,
            } => Self::touch(&project_root.join("math_class.gcno"))?,
            BuildStep::Make {
                project_root,
                target: Some(_),
            } => Self::touch(&project_root.join("math_class.gcda"))?,
            BuildStep::Build { .. } | BuildStep::RunTests { .. } => {}
        }
        Ok(output)
    }
}

#[async_trait]
impl CoverageTool for RecordingTools {
    async fn invoke(&self, op: &CoverageOp) -> Result<ToolOutput> {
        self.record(op.invocation());
        let output = self.scripted(op.name());
        if !output.passed() {
            return Ok(output);
        }
        match op {
            CoverageOp::Capture { cwd, artifact, .. } => {
                std::fs::write(cwd.join(artifact), render_tracefile(&self.sources))?;
            }
            CoverageOp::Remove {
                cwd,
                artifact,
                mask,
            } => {
                let path = cwd.join(artifact);
                let Ok(text) = std::fs::read_to_string(&path) else {
                    return Ok(ToolOutput::with_exit_code(1));
                };
                let pattern = glob::Pattern::new(mask).map_err(|e| {
                    CovrunError::Io(std::io::Error::new(std::io::ErrorKind::InvalidInput, e))
                })?;
                let before = tracefile_sources(&text);
                let after: Vec<String> = before
                    .iter()
                    .filter(|source| !pattern.matches(source))
                    .cloned()
                    .collect();
                self.filter_history
                    .lock()
                    .unwrap()
                    .push((before.len(), after.len()));
                std::fs::write(&path, render_tracefile(&after))?;
            }
            CoverageOp::Render {
                cwd,
                artifact,
                html_dir,
            } => {
                let Ok(text) = std::fs::read_to_string(cwd.join(artifact)) else {
                    return Ok(ToolOutput::with_exit_code(1));
                };
                let dir = cwd.join(html_dir);
                std::fs::create_dir_all(&dir)?;
                let rows: String = tracefile_sources(&text)
                    .iter()
                    .map(|source| format!("<tr><td>{source}</td></tr>\n"))
                    .collect();
                std::fs::write(
                    dir.join(crate::coverage::ENTRY_FILE),
                    format!("<html><body><table>\n{rows}</table></body></html>\n"),
                )?;
            }
        }
        Ok(output)
    }
}

impl ReportViewer for RecordingTools {
    fn open(&self, entry: &Path) -> Result<()> {
        if !self.viewer {
            return Err(CovrunError::NoViewer {
                program: crate::tooling::platform_viewer().to_string(),
            });
        }
        self.opened.lock().unwrap().push(entry.to_path_buf());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MemoryReporter
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Channel {
    Stage,
    Info,
    Warn,
    Command,
}

/// Reporter that keeps every line in memory.
#[derive(Debug, Default)]
pub struct MemoryReporter {
    lines: Mutex<Vec<(Channel, String)>>,
}

impl MemoryReporter {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, channel: Channel, line: &str) {
        self.lines.lock().unwrap().push((channel, line.to_string()));
    }

    fn channel(&self, channel: Channel) -> Vec<String> {
        self.lines
            .lock()
            .unwrap()
            .iter()
            .filter(|(c, _)| *c == channel)
            .map(|(_, line)| line.clone())
            .collect()
    }

    pub fn stages(&self) -> Vec<String> {
        self.channel(Channel::Stage)
    }

    pub fn infos(&self) -> Vec<String> {
        self.channel(Channel::Info)
    }

    pub fn warnings(&self) -> Vec<String> {
        self.channel(Channel::Warn)
    }

    pub fn commands(&self) -> Vec<String> {
        self.channel(Channel::Command)
    }
}

impl Reporter for MemoryReporter {
    fn stage(&self, name: &str) {
        self.push(Channel::Stage, name);
    }

    fn info(&self, message: &str) {
        self.push(Channel::Info, message);
    }

    fn warn(&self, message: &str) {
        self.push(Channel::Warn, message);
    }

    fn command(&self, line: &str) {
        self.push(Channel::Command, line);
    }
}
