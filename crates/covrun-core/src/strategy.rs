//! Choosing between the descriptor (CMake) and simple (Makefile) pipelines.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::config::BuildMode;
use crate::error::{CovrunError, Result};

/// Declarative project description consumed by cmake.
pub const DESCRIPTOR_FILE: &str = "CMakeLists.txt";

/// Accepted build file names, in lookup order.
pub const BUILD_FILES: &[&str] = &["Makefile", "makefile"];

/// The pipeline a run will use.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    Descriptor,
    SimpleBuild,
}

impl Strategy {
    pub fn name(&self) -> &'static str {
        match self {
            Strategy::Descriptor => "descriptor",
            Strategy::SimpleBuild => "simple_build",
        }
    }
}

/// What the project root contains.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectLayout {
    pub descriptor: Option<PathBuf>,
    pub build_file: Option<PathBuf>,
}

impl ProjectLayout {
    pub fn probe(root: &Path) -> Self {
        let descriptor = Some(root.join(DESCRIPTOR_FILE)).filter(|p| p.is_file());
        let build_file = BUILD_FILES
            .iter()
            .map(|name| root.join(name))
            .find(|p| p.is_file());
        Self {
            descriptor,
            build_file,
        }
    }
}

/// Picks exactly one [`Strategy`] for a project root.
pub struct StrategySelector;

impl StrategySelector {
    /// Priority: forced simple build, then descriptor, then build file.
    pub fn select(root: &Path, mode: BuildMode) -> Result<Strategy> {
        Self::select_from(&ProjectLayout::probe(root), root, mode)
    }

    pub fn select_from(layout: &ProjectLayout, root: &Path, mode: BuildMode) -> Result<Strategy> {
        if mode == BuildMode::SimpleBuild {
            return match layout.build_file {
                Some(_) => Ok(Strategy::SimpleBuild),
                None => Err(CovrunError::BuildFileNotFound {
                    root: root.to_path_buf(),
                }),
            };
        }
        if layout.descriptor.is_some() {
            return Ok(Strategy::Descriptor);
        }
        if layout.build_file.is_some() {
            return Ok(Strategy::SimpleBuild);
        }
        Err(CovrunError::NoBuildDescriptor {
            root: root.to_path_buf(),
        })
    }
}
