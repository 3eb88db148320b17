//! Logging emitted by the coordinator while trees run.

mod common;

use common::log_capture::TestLogCapture;
use stagehand::core::{CounterRegistry, MergeKey, Test, TestResult, TestSuite, Traced};
use stagehand::test_utils::{EventLog, FailingFixture, RecordingFixture, passing_case};
use stagehand::{wrap, wrap_keyed};

#[test]
fn shared_fixture_logs_one_setup_and_one_teardown() {
    let capture = TestLogCapture::start();
    let log = EventLog::new();
    let registry = CounterRegistry::new();

    let mut suite = TestSuite::new("all")
        .with(wrap_keyed(
            passing_case("a", &log),
            MergeKey::named("config"),
            RecordingFixture::new("config", &log),
            &registry,
        ))
        .with(wrap_keyed(
            passing_case("b", &log),
            MergeKey::named("config"),
            RecordingFixture::new("config", &log),
            &registry,
        ));
    suite.rearrange();
    suite.run(&mut TestResult::new());

    assert_eq!(capture.count("Setting up fixture"), 1);
    assert_eq!(capture.count("Tearing down fixture"), 1);
    capture.assert_no_errors();
}

#[test]
fn teardown_failure_is_logged_as_warning() {
    let capture = TestLogCapture::start();
    let log = EventLog::new();

    let registry = CounterRegistry::new();

    let mut node = wrap(
        passing_case("a", &log),
        FailingFixture::teardown("db", &log),
        &registry,
    );
    let mut result = TestResult::new();
    node.run(&mut result);

    assert_eq!(result.error_count(), 1);
    capture.assert_logged_at_level(tracing::Level::WARN, "Fixture teardown failed");
}

#[test]
fn traced_subtree_reports_counts() {
    let capture = TestLogCapture::start();
    let log = EventLog::new();

    let mut tree = Traced::new(
        TestSuite::new("suite")
            .with(passing_case("a", &log))
            .with(passing_case("b", &log)),
    );
    tree.run(&mut TestResult::new());

    let finished = capture.matching("Subtree finished");
    assert_eq!(finished.len(), 1);
    assert_eq!(finished[0].field("tests"), Some("2"));
    assert_eq!(finished[0].field("problems"), Some("0"));
}
