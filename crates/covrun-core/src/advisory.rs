//! Read-only checks on `CMakeLists.txt` that suggest missing test and
//! coverage wiring.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// Which recommended piece is missing.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AdviceKind {
    EnableTesting,
    RegisterTest,
    CoverageOption,
}

/// A remediation tip.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Advice {
    pub kind: AdviceKind,
    pub tip: String,
}

fn enable_testing_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?m)^\s*enable_testing\s*\(\s*\)\s*$").expect("valid regex"))
}

fn add_test_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?m)^\s*add_test\s*\(").expect("valid regex"))
}

fn coverage_option_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"option\s*\(\s*ENABLE_COVERAGE\b").expect("valid regex"))
}

pub fn has_enable_testing(text: &str) -> bool {
    enable_testing_re().is_match(text)
}

pub fn has_add_test(text: &str) -> bool {
    add_test_re().is_match(text)
}

pub fn has_coverage_option(text: &str) -> bool {
    coverage_option_re().is_match(text)
}

/// All three instrumentation flags appear somewhere in the text.
pub fn has_coverage_flags(text: &str) -> bool {
    text.contains("--coverage") && text.contains("-O0") && text.contains("-g")
}

/// Loose check used by configure: any `option(` plus an `ENABLE_COVERAGE`
/// mention means the project wires coverage itself.
pub fn declares_coverage_toggle(text: &str) -> bool {
    text.contains("option(") && text.contains("ENABLE_COVERAGE")
}

/// Inspect descriptor text and list what is missing.
pub struct AdvisoryChecker;

impl AdvisoryChecker {
    pub fn check(text: &str, test_target: &str) -> Vec<Advice> {
        let mut advice = Vec::new();

        if !has_enable_testing(text) {
            advice.push(Advice {
                kind: AdviceKind::EnableTesting,
                tip: "Add to CMakeLists.txt:  enable_testing()".to_string(),
            });
        }

        if !has_add_test(text) {
            advice.push(Advice {
                kind: AdviceKind::RegisterTest,
                tip: format!(
                    "Register tests with CTest, for example:\n  add_test(NAME {test_target} COMMAND <test binary or script>)"
                ),
            });
        }

        if !has_coverage_option(text) || !has_coverage_flags(text) {
            advice.push(Advice {
                kind: AdviceKind::CoverageOption,
                tip: concat!(
                    "Add coverage support (GCC), for example:\n",
                    "  option(ENABLE_COVERAGE \"Enable code coverage (GCC)\" OFF)\n",
                    "  if(ENABLE_COVERAGE AND CMAKE_CXX_COMPILER_ID STREQUAL \"GNU\")\n",
                    "    set(CMAKE_CXX_FLAGS_DEBUG \"${CMAKE_CXX_FLAGS_DEBUG} -O0 -g --coverage\")\n",
                    "    set(CMAKE_EXE_LINKER_FLAGS_DEBUG \"${CMAKE_EXE_LINKER_FLAGS_DEBUG} --coverage\")\n",
                    "    set(CMAKE_SHARED_LINKER_FLAGS_DEBUG \"${CMAKE_SHARED_LINKER_FLAGS_DEBUG} --coverage\")\n",
                    "  endif()"
                )
                .to_string(),
            });
        }

        advice
    }
}
