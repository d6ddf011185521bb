//! Integration tests for the pipelines, driven through the orchestrator with
//! recording fakes in place of cmake/make/lcov.

use covrun_core::fakes::{MemoryReporter, RecordingTools};
use covrun_core::{
    BuildMode, CovrunError, DependencySet, Orchestrator, PipelineConfig, PipelineOutcome,
    Presentation, Strategy, Toolchain,
};
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

const PLAIN_CMAKE: &str = r#"cmake_minimum_required(VERSION 3.14)
project(demo CXX)
enable_testing()
add_executable(tests tests/test_func.cpp src/math.cpp)
add_test(NAME MyTests COMMAND tests)
"#;

const COVERAGE_CMAKE: &str = r#"cmake_minimum_required(VERSION 3.14)
project(demo CXX)
option(ENABLE_COVERAGE "Enable code coverage (GCC)" OFF)
if(ENABLE_COVERAGE)
  set(CMAKE_CXX_FLAGS_DEBUG "${CMAKE_CXX_FLAGS_DEBUG} -O0 -g --coverage")
endif()
enable_testing()
add_test(NAME MyTests COMMAND tests)
"#;

const INSTRUMENTED_MAKEFILE: &str = "CXXFLAGS = -O0 -g --coverage\nLDFLAGS = --coverage\n\nall: app\n\ntest: app\n\t./run_tests\n";

const PLAIN_MAKEFILE: &str = "CXXFLAGS = -O2\n\nall: app\n";

struct Harness {
    dir: TempDir,
    tools: Arc<RecordingTools>,
    reporter: Arc<MemoryReporter>,
}

impl Harness {
    fn new(files: &[(&str, &str)], tools: RecordingTools) -> Self {
        let dir = tempfile::tempdir().unwrap();
        for (name, content) in files {
            std::fs::write(dir.path().join(name), content).unwrap();
        }
        Self {
            dir,
            tools: Arc::new(tools),
            reporter: Arc::new(MemoryReporter::new()),
        }
    }

    fn write_bytes(&self, name: &str, bytes: &[u8]) {
        std::fs::write(self.root().join(name), bytes).unwrap();
    }

    fn root(&self) -> &Path {
        self.dir.path()
    }

    fn config(&self) -> PipelineConfig {
        PipelineConfig::new(self.root()).with_jobs(4)
    }

    async fn run(&self, config: &PipelineConfig) -> covrun_core::Result<PipelineOutcome> {
        let orchestrator = Orchestrator::new(
            Toolchain::from_shared(self.tools.clone()),
            self.reporter.clone(),
        );
        orchestrator.run(config).await
    }

    fn commands_for(&self, program: &str) -> Vec<Vec<String>> {
        self.tools
            .calls_to(program)
            .into_iter()
            .map(|inv| inv.args)
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Strategy selection
// ---------------------------------------------------------------------------

/// Test: descriptor pipeline wins when both files exist
#[tokio::test]
async fn test_descriptor_chosen_when_both_files_exist() {
    let h = Harness::new(
        &[("CMakeLists.txt", PLAIN_CMAKE), ("Makefile", INSTRUMENTED_MAKEFILE)],
        RecordingTools::new(),
    );

    let outcome = h.run(&h.config()).await.expect("pipeline failed");

    assert_eq!(outcome.strategy, Strategy::Descriptor);
    assert!(h.commands_for("make").is_empty(), "make must not run");
    assert!(!h.commands_for("cmake").is_empty());
}

/// Test: forcing simple build ignores the descriptor
#[tokio::test]
async fn test_forced_simple_build_ignores_descriptor() {
    let h = Harness::new(
        &[("CMakeLists.txt", PLAIN_CMAKE), ("Makefile", INSTRUMENTED_MAKEFILE)],
        RecordingTools::new(),
    );
    let config = h.config().with_mode(BuildMode::SimpleBuild);

    let outcome = h.run(&config).await.expect("pipeline failed");

    assert_eq!(outcome.strategy, Strategy::SimpleBuild);
    assert!(h.commands_for("cmake").is_empty());
}

/// Test: empty project root is a fatal shape error before any build
#[tokio::test]
async fn test_no_descriptor_is_fatal() {
    let h = Harness::new(&[], RecordingTools::new());

    let err = h.run(&h.config()).await.unwrap_err();

    assert!(matches!(err, CovrunError::NoBuildDescriptor { .. }));
    assert!(err.to_string().contains("no recognized build descriptor found"));
    assert!(h.tools.invocations().is_empty());
}

// ---------------------------------------------------------------------------
// Descriptor pipeline
// ---------------------------------------------------------------------------

/// Test: full descriptor run produces an opened report
#[tokio::test]
async fn test_descriptor_pipeline_happy_path() {
    let h = Harness::new(&[("CMakeLists.txt", PLAIN_CMAKE)], RecordingTools::new());
    let config = h.config();

    let outcome = h.run(&config).await.expect("pipeline failed");

    let stage_names: Vec<_> = outcome.stages.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(stage_names, vec!["configure", "build", "list_tests", "test"]);

    let tests = outcome.tests.expect("tests should have run");
    assert_eq!(tests.total, Some(2));
    assert!(tests.passed);

    let report = outcome.coverage.expect("coverage report");
    assert_eq!(report.filter_passes, 3);
    assert!(report.entry.is_file());
    assert_eq!(report.entry, config.build_dir.join("coverage_html/index.html"));
    assert_eq!(outcome.presentation, Some(Presentation::Opened));
    assert_eq!(h.tools.opened(), vec![report.entry.clone()]);

    // The raw artifact is left in the build directory for inspection.
    assert!(report.artifact.is_file());

    let build = &h.commands_for("cmake")[1];
    assert_eq!(build[0], "--build");
    assert_eq!(build[3], "4");
}

/// Test: project without a coverage option gets explicit instrumentation flags
#[tokio::test]
async fn test_configure_injects_flags_without_coverage_option() {
    let h = Harness::new(&[("CMakeLists.txt", PLAIN_CMAKE)], RecordingTools::new());

    h.run(&h.config()).await.expect("pipeline failed");

    let configure = &h.commands_for("cmake")[0];
    assert!(configure.contains(&"-DCMAKE_BUILD_TYPE=Debug".to_string()));
    assert!(configure.contains(&"-DCMAKE_CXX_FLAGS_DEBUG=-O0 -g --coverage".to_string()));
    assert!(configure.contains(&"-DCMAKE_EXE_LINKER_FLAGS_DEBUG=--coverage".to_string()));
    assert!(!configure.contains(&"-DENABLE_COVERAGE=ON".to_string()));
}

/// Test: project with its own coverage option only gets the toggle
#[tokio::test]
async fn test_configure_uses_toggle_with_coverage_option() {
    let h = Harness::new(&[("CMakeLists.txt", COVERAGE_CMAKE)], RecordingTools::new());

    h.run(&h.config()).await.expect("pipeline failed");

    let configure = &h.commands_for("cmake")[0];
    assert!(configure.contains(&"-DENABLE_COVERAGE=ON".to_string()));
    assert!(!configure.iter().any(|a| a.starts_with("-DCMAKE_CXX_FLAGS_DEBUG")));
}

/// Test: N masks produce N sequential passes over the same artifact
#[tokio::test]
async fn test_exclusion_masks_applied_in_order() {
    let h = Harness::new(&[("CMakeLists.txt", PLAIN_CMAKE)], RecordingTools::new());
    let config = h.config().with_masks(["/usr/*", "*/tests/*"]);

    let outcome = h.run(&config).await.expect("pipeline failed");

    let removes: Vec<_> = h
        .commands_for("lcov")
        .into_iter()
        .filter(|args| args[0] == "--remove")
        .collect();
    assert_eq!(removes.len(), 2);
    assert_eq!(removes[0][2], "/usr/*");
    assert_eq!(removes[1][2], "*/tests/*");
    for args in &removes {
        assert_eq!(args[1], "coverage.info", "pass reads the shared artifact");
        assert_eq!(args[4], "coverage.info", "pass overwrites the shared artifact");
    }

    // Each pass sees what the previous one wrote.
    let history = h.tools.filter_history();
    assert_eq!(history, vec![(3, 2), (2, 1)]);
    assert_eq!(outcome.coverage.unwrap().filter_passes, 2);

    // Capture precedes filtering, filtering precedes rendering.
    let programs: Vec<String> = h
        .tools
        .invocations()
        .into_iter()
        .filter(|inv| inv.program == "lcov" || inv.program == "genhtml")
        .map(|inv| format!("{} {}", inv.program, inv.args[0]))
        .collect();
    assert_eq!(
        programs,
        vec![
            "lcov --directory",
            "lcov --remove",
            "lcov --remove",
            "genhtml coverage.info"
        ]
    );
}

/// Test: zero discovered tests warns and still collects coverage
#[tokio::test]
async fn test_zero_tests_is_not_fatal() {
    let h = Harness::new(
        &[("CMakeLists.txt", PLAIN_CMAKE)],
        RecordingTools::new().with_test_count(0),
    );

    let outcome = h.run(&h.config()).await.expect("pipeline failed");

    assert_eq!(outcome.tests.unwrap().total, Some(0));
    assert!(
        !h.commands_for("ctest")
            .iter()
            .any(|args| args[0] == "--output-on-failure"),
        "tests must not run when none are registered"
    );
    assert!(h
        .reporter
        .warnings()
        .iter()
        .any(|w| w.contains("will be empty")));
    assert!(!h.commands_for("lcov").is_empty(), "coverage capture must still run");
    assert!(outcome.coverage.is_some());
}

/// Test: failing tests are recorded but coverage still runs
#[tokio::test]
async fn test_failing_tests_do_not_abort() {
    let h = Harness::new(
        &[("CMakeLists.txt", PLAIN_CMAKE)],
        RecordingTools::new().failing("test", 8),
    );

    let outcome = h.run(&h.config()).await.expect("pipeline failed");

    assert!(!outcome.tests_passed());
    assert!(outcome.coverage.is_some());
    assert!(outcome.warnings.iter().any(|w| w.contains("exit code 8")));
}

/// Test: build failure aborts before coverage and propagates the exit code
#[tokio::test]
async fn test_build_failure_is_fatal() {
    let h = Harness::new(
        &[("CMakeLists.txt", PLAIN_CMAKE)],
        RecordingTools::new().failing("build", 2),
    );

    let err = h.run(&h.config()).await.unwrap_err();

    assert!(matches!(err, CovrunError::StageFailed { ref stage, exit_code: 2 } if stage == "build"));
    assert_eq!(err.exit_code(), 2);
    assert!(h.commands_for("ctest").is_empty());
    assert!(h.commands_for("lcov").is_empty());
}

/// Test: a failing filter pass aborts before rendering
#[tokio::test]
async fn test_filter_failure_aborts_render() {
    let h = Harness::new(
        &[("CMakeLists.txt", PLAIN_CMAKE)],
        RecordingTools::new().failing("coverage_filter", 1),
    );

    let err = h.run(&h.config()).await.unwrap_err();

    assert!(matches!(err, CovrunError::StageFailed { .. }));
    assert_eq!(h.tools.calls_to("genhtml").len(), 0);
    let removes = h
        .commands_for("lcov")
        .into_iter()
        .filter(|args| args[0] == "--remove")
        .count();
    assert_eq!(removes, 1, "remaining passes must not run");
}

/// Test: filtering away every record still renders a report
#[tokio::test]
async fn test_render_succeeds_on_empty_artifact() {
    let h = Harness::new(&[("CMakeLists.txt", PLAIN_CMAKE)], RecordingTools::new());
    let config = h.config().with_masks(["*"]);

    let outcome = h.run(&config).await.expect("pipeline failed");

    assert_eq!(h.tools.filter_history(), vec![(3, 0)]);
    let report = outcome.coverage.unwrap();
    assert!(report.html_dir.is_dir());
    assert!(report.entry.is_file());
}

/// Test: stale build directory is removed unless cleaning is disabled
#[tokio::test]
async fn test_clean_stage() {
    let h = Harness::new(&[("CMakeLists.txt", PLAIN_CMAKE)], RecordingTools::new());
    let stale = h.root().join("build/stale.o");
    std::fs::create_dir_all(stale.parent().unwrap()).unwrap();
    std::fs::write(&stale, "old").unwrap();

    h.run(&h.config().with_clean_first(false))
        .await
        .expect("pipeline failed");
    assert!(stale.exists(), "--no-clean keeps the build directory");

    h.run(&h.config()).await.expect("pipeline failed");
    assert!(!stale.exists(), "clean removes the build directory");
}

/// Test: disabling coverage skips instrumentation and collection
#[tokio::test]
async fn test_coverage_disabled() {
    let h = Harness::new(&[("CMakeLists.txt", PLAIN_CMAKE)], RecordingTools::new());
    let config = h.config().with_coverage(false).with_variant(covrun_core::BuildVariant::Release);

    let outcome = h.run(&config).await.expect("pipeline failed");

    let configure = &h.commands_for("cmake")[0];
    assert_eq!(configure.len(), 5);
    assert_eq!(configure[4], "-DCMAKE_BUILD_TYPE=Release");
    assert!(h.commands_for("lcov").is_empty());
    assert!(outcome.coverage.is_none());
    assert!(outcome.tests_passed());
}

/// Test: advisory tips are warnings and do not block the run
#[tokio::test]
async fn test_advisory_tips_are_informational() {
    let h = Harness::new(&[("CMakeLists.txt", "project(demo)\n")], RecordingTools::new());
    let config = h.config().with_test_target("UnitTests").with_auto_fix(true);

    let outcome = h.run(&config).await.expect("pipeline failed");

    assert_eq!(outcome.advice.len(), 3);
    assert!(h
        .reporter
        .warnings()
        .iter()
        .any(|w| w.contains("add_test(NAME UnitTests")));
    assert!(h
        .reporter
        .warnings()
        .iter()
        .any(|w| w.contains("auto-fix is not implemented")));
    assert_eq!(
        std::fs::read_to_string(h.root().join("CMakeLists.txt")).unwrap(),
        "project(demo)\n",
        "descriptor must not be modified"
    );
}

/// Test: a descriptor that is not valid UTF-8 does not block a plain build
#[tokio::test]
async fn test_non_utf8_descriptor_without_coverage() {
    let h = Harness::new(&[], RecordingTools::new());
    h.write_bytes("CMakeLists.txt", b"# caf\xe9\nproject(demo CXX)\nenable_testing()\n");

    let outcome = h
        .run(&h.config().with_coverage(false))
        .await
        .expect("pipeline failed");

    assert_eq!(outcome.strategy, Strategy::Descriptor);
    assert_eq!(h.commands_for("cmake").len(), 2);
    assert!(outcome.advice.is_empty(), "no checks without coverage");
    assert!(outcome.tests_passed());
}

/// Test: a descriptor with invalid UTF-8 is still checked and configured
#[tokio::test]
async fn test_non_utf8_descriptor_with_coverage() {
    let h = Harness::new(&[], RecordingTools::new());
    h.write_bytes(
        "CMakeLists.txt",
        b"# caf\xe9\noption(ENABLE_COVERAGE \"cov\" OFF)\nenable_testing()\nadd_test(NAME MyTests COMMAND t)\n",
    );

    let outcome = h.run(&h.config()).await.expect("pipeline failed");

    let configure = &h.commands_for("cmake")[0];
    assert!(configure.contains(&"-DENABLE_COVERAGE=ON".to_string()));
    assert!(outcome
        .advice
        .iter()
        .all(|a| a.kind == covrun_core::AdviceKind::CoverageOption));
    assert!(outcome.coverage.is_some());
}

/// Test: Makefile with a non-UTF-8 byte is still checked for instrumentation
#[tokio::test]
async fn test_non_utf8_makefile() {
    let h = Harness::new(&[], RecordingTools::new());
    h.write_bytes("Makefile", b"# caf\xe9\nCXXFLAGS = --coverage\nall: app\n");

    let outcome = h.run(&h.config()).await.expect("pipeline failed");

    assert_eq!(outcome.strategy, Strategy::SimpleBuild);
    assert!(outcome.coverage.is_some());
}

/// Test: not opening the report still reports its location
#[tokio::test]
async fn test_no_open() {
    let h = Harness::new(&[("CMakeLists.txt", PLAIN_CMAKE)], RecordingTools::new());

    let outcome = h
        .run(&h.config().with_open_report(false))
        .await
        .expect("pipeline failed");

    assert_eq!(outcome.presentation, Some(Presentation::LocationShown));
    assert!(h.tools.opened().is_empty());
}

// ---------------------------------------------------------------------------
// Simple-build pipeline
// ---------------------------------------------------------------------------

/// Test: Makefile project builds, tests, reports and cleans up
#[tokio::test]
async fn test_simple_build_happy_path() {
    let h = Harness::new(&[("Makefile", INSTRUMENTED_MAKEFILE)], RecordingTools::new());

    let outcome = h.run(&h.config()).await.expect("pipeline failed");

    assert_eq!(outcome.strategy, Strategy::SimpleBuild);
    assert_eq!(h.commands_for("make"), vec![Vec::<String>::new(), vec!["test".to_string()]]);
    assert!(outcome.tests_passed());

    let capture = &h.commands_for("lcov")[0];
    assert_eq!(capture[1], h.root().display().to_string());
    assert_eq!(
        h.commands_for("lcov")
            .iter()
            .filter(|args| args[0] == "--remove")
            .count(),
        0
    );

    let report = outcome.coverage.unwrap();
    assert!(report.entry.is_file());
    assert!(std::fs::read_dir(&report.html_dir).unwrap().next().is_some());

    assert!(!h.root().join("coverage.info").exists());
    assert!(!h.root().join("math_class.gcno").exists());
    assert!(!h.root().join("math_class.gcda").exists());
    assert_eq!(outcome.cleaned.len(), 3);
    assert!(h.root().join("Makefile").exists());
}

/// Test: lowercase makefile is accepted
#[tokio::test]
async fn test_simple_build_lowercase_makefile() {
    let h = Harness::new(&[("makefile", INSTRUMENTED_MAKEFILE)], RecordingTools::new());

    let outcome = h.run(&h.config()).await.expect("pipeline failed");

    assert_eq!(outcome.strategy, Strategy::SimpleBuild);
}

/// Test: Makefile without instrumentation stops before make runs
#[tokio::test]
async fn test_simple_build_requires_instrumentation() {
    let h = Harness::new(&[("Makefile", PLAIN_MAKEFILE)], RecordingTools::new());

    let err = h.run(&h.config()).await.unwrap_err();

    assert!(matches!(err, CovrunError::MissingInstrumentation { .. }));
    assert!(h.commands_for("make").is_empty());
}

/// Test: failing make test is a warning, not an error
#[tokio::test]
async fn test_simple_build_test_failure_not_fatal() {
    let h = Harness::new(
        &[("Makefile", INSTRUMENTED_MAKEFILE)],
        RecordingTools::new().failing("make_target", 2),
    );

    let outcome = h.run(&h.config()).await.expect("pipeline failed");

    assert!(!outcome.tests_passed());
    assert!(outcome.coverage.is_some());
    assert!(!h.root().join("coverage.info").exists());
}

/// Test: cleanup still runs when coverage capture fails
#[tokio::test]
async fn test_simple_build_cleans_up_after_failure() {
    let h = Harness::new(
        &[("Makefile", INSTRUMENTED_MAKEFILE)],
        RecordingTools::new().failing("coverage_capture", 1),
    );

    let err = h.run(&h.config()).await.unwrap_err();

    assert!(matches!(err, CovrunError::StageFailed { .. }));
    assert!(!h.root().join("math_class.gcno").exists());
    assert!(!h.root().join("math_class.gcda").exists());
    assert!(h.tools.calls_to("genhtml").is_empty());
}

/// Test: failing make is fatal
#[tokio::test]
async fn test_simple_build_make_failure_is_fatal() {
    let h = Harness::new(
        &[("Makefile", INSTRUMENTED_MAKEFILE)],
        RecordingTools::new().failing("make", 2),
    );

    let err = h.run(&h.config()).await.unwrap_err();

    assert_eq!(err.exit_code(), 2);
    assert_eq!(h.commands_for("make").len(), 1);
    assert!(h.commands_for("lcov").is_empty());
}

/// Test: missing viewer only warns
#[tokio::test]
async fn test_simple_build_without_viewer() {
    let h = Harness::new(
        &[("Makefile", INSTRUMENTED_MAKEFILE)],
        RecordingTools::new().without_viewer(),
    );

    let outcome = h.run(&h.config()).await.expect("pipeline failed");

    assert_eq!(outcome.presentation, Some(Presentation::LocationShown));
    assert!(h
        .reporter
        .warnings()
        .iter()
        .any(|w| w.contains("Open the report manually")));
}

// ---------------------------------------------------------------------------
// Dependencies through the orchestrator
// ---------------------------------------------------------------------------

/// Test: missing tools with installation disabled fail before any build
#[tokio::test]
async fn test_missing_tools_without_install() {
    let h = Harness::new(
        &[("CMakeLists.txt", PLAIN_CMAKE)],
        RecordingTools::new().with_missing(["lcov", "cmake"]),
    );

    let err = h
        .run(&h.config().with_allow_install(false))
        .await
        .unwrap_err();

    match err {
        CovrunError::MissingTools { tools } => assert_eq!(tools, vec!["cmake", "lcov"]),
        other => panic!("unexpected error: {other}"),
    }
    assert!(h.tools.invocations().is_empty());
}

/// Test: custom dependency set is honoured
#[tokio::test]
async fn test_custom_dependency_set() {
    let h = Harness::new(
        &[("Makefile", INSTRUMENTED_MAKEFILE)],
        RecordingTools::new().with_missing(["cmake"]),
    );
    let orchestrator = Orchestrator::new(
        Toolchain::from_shared(h.tools.clone()),
        h.reporter.clone(),
    )
    .with_dependencies(DependencySet::new(["make", "lcov"]));

    let outcome = orchestrator
        .run(&h.config().with_allow_install(false))
        .await
        .expect("cmake is not required here");

    assert_eq!(outcome.strategy, Strategy::SimpleBuild);
}
