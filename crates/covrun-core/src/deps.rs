//! Required tool detection and installation.

use serde::{Deserialize, Serialize};

use crate::error::{CovrunError, Result};
use crate::reporter::Reporter;
use crate::tooling::{DependencyChecker, PackageOp};

/// Package manager used to install missing tools.
pub const PACKAGE_MANAGER: &str = "apt-get";

/// Tools every run needs: build graph generator, compiler, build driver and
/// coverage capture tool. `ctest` ships with cmake and `genhtml` with lcov.
pub const DEFAULT_TOOLS: &[&str] = &["cmake", "g++", "make", "lcov"];

/// Ordered, duplicate-free set of required tool names.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DependencySet {
    tools: Vec<String>,
}

impl DependencySet {
    pub fn new<I, S>(tools: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut set = Self { tools: Vec::new() };
        for tool in tools {
            set.insert(tool);
        }
        set
    }

    /// Add a tool unless it is already present.
    pub fn insert(&mut self, tool: impl Into<String>) {
        let tool = tool.into();
        if !self.tools.contains(&tool) {
            self.tools.push(tool);
        }
    }

    pub fn tools(&self) -> &[String] {
        &self.tools
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Package providing `tool`. All default tools are packaged under their
    /// own name on Debian-based systems.
    pub fn package_for(tool: &str) -> &str {
        match tool {
            "ctest" => "cmake",
            "genhtml" => "lcov",
            other => other,
        }
    }
}

impl Default for DependencySet {
    fn default() -> Self {
        Self::new(DEFAULT_TOOLS.iter().copied())
    }
}

/// Makes sure every tool in a [`DependencySet`] is available.
pub struct DependencyResolver;

impl DependencyResolver {
    /// Verify the set and install missing tools if `allow_install`.
    ///
    /// Returns the packages that were actually installed. An empty set, or
    /// one with nothing missing, performs no package manager calls.
    pub async fn resolve(
        set: &DependencySet,
        allow_install: bool,
        checker: &dyn DependencyChecker,
        reporter: &dyn Reporter,
    ) -> Result<Vec<String>> {
        let missing: Vec<String> = set
            .tools()
            .iter()
            .filter(|tool| checker.locate(tool).is_none())
            .cloned()
            .collect();

        if missing.is_empty() {
            return Ok(Vec::new());
        }

        if !allow_install {
            return Err(CovrunError::MissingTools { tools: missing });
        }

        if checker.locate(PACKAGE_MANAGER).is_none() {
            return Err(CovrunError::NoPackageManager { tools: missing });
        }

        reporter.warn(&format!("Missing tools: {}", missing.join(", ")));

        let mut packages: Vec<String> = Vec::new();
        for tool in &missing {
            let package = DependencySet::package_for(tool).to_string();
            if !packages.contains(&package) {
                packages.push(package);
            }
        }

        let update = PackageOp::UpdateIndex;
        reporter.command(&update.invocation(false).command_line());
        let output = checker.invoke(&update).await?;
        if !output.passed() {
            return Err(CovrunError::InstallFailed {
                package: "<package index>".to_string(),
                exit_code: output.exit_code,
            });
        }

        let mut installed = Vec::new();
        for package in packages {
            let probe = PackageOp::Probe {
                package: package.clone(),
            };
            if checker.invoke(&probe).await?.passed() {
                reporter.info(&format!("Package {package} is already installed"));
                continue;
            }

            reporter.info(&format!("Installing package: {package} (requires sudo)"));
            let install = PackageOp::Install {
                package: package.clone(),
            };
            reporter.command(&install.invocation(false).command_line());
            let output = checker.invoke(&install).await?;
            if !output.passed() {
                return Err(CovrunError::InstallFailed {
                    package,
                    exit_code: output.exit_code,
                });
            }
            installed.push(package);
        }

        Ok(installed)
    }
}
