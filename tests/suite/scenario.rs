//! Full scenario runs against the mock server

use std::time::Duration;

use lsp_conform_harness::report::{EXIT_ABORTED, EXIT_FAILED, EXIT_PASSED};
use lsp_conform_harness::{RunStatus, ScenarioConfig, Step, StepOutcome, TransportError};
use lsp_conform_protocol::params::methods;
use serde_json::json;

use crate::common::{MockBehavior, run_scenario, run_scenario_with};

const TIMEOUT: Duration = Duration::from_secs(5);

fn outcome<'a>(report: &'a lsp_conform_harness::Report, step: Step) -> &'a StepOutcome {
    report
        .outcome(step)
        .unwrap_or_else(|| panic!("no outcome recorded for {step}"))
}

#[tokio::test]
async fn conforming_server_passes_every_protocol_step() {
    let run = run_scenario(MockBehavior::default(), TIMEOUT).await;

    assert_eq!(run.report.status(), RunStatus::Passed);
    assert_eq!(run.report.exit_code(false), EXIT_PASSED);
    assert_eq!(run.report.results().len(), 8);
    assert_eq!(
        outcome(&run.report, Step::AwaitDiagnostics),
        &StepOutcome::Pass("Diagnostics: 1".into())
    );
    assert_eq!(
        outcome(&run.report, Step::AwaitCompletion),
        &StepOutcome::Pass("Items: 3".into())
    );

    assert_eq!(
        run.log.methods,
        vec![
            methods::INITIALIZE,
            methods::INITIALIZED,
            methods::DID_OPEN,
            methods::DID_CHANGE,
            methods::COMPLETION,
            methods::HOVER,
            methods::SHUTDOWN,
            methods::EXIT,
        ]
    );
    assert_eq!(run.log.request_ids, vec![json!(1), json!(2), json!(3), json!(4)]);
}

#[tokio::test]
async fn console_output_uses_tags() {
    let run = run_scenario(MockBehavior::default(), TIMEOUT).await;

    let first: Vec<_> = run.console.lines().take(2).collect();
    assert_eq!(first, vec!["[TEST] initialize", "[PASS] Initialized"]);
    assert!(run.console.contains("[PASS] Items: 3"));
    assert!(run.console.contains("[INFO] Hover result: {\"contents\":\"answer: int\"}"));
    assert!(!run.console.contains("[FAIL]"));
}

#[tokio::test]
async fn documents_carry_versions_and_texts() {
    let run = run_scenario(MockBehavior::default(), TIMEOUT).await;
    let defaults = ScenarioConfig::default();

    let open = run.log.params_of(methods::DID_OPEN).unwrap();
    assert_eq!(open["textDocument"]["version"], 1);
    assert_eq!(open["textDocument"]["text"], defaults.invalid_text.as_str());
    assert_eq!(open["textDocument"]["languageId"], "plaintext");

    let change = run.log.params_of(methods::DID_CHANGE).unwrap();
    assert_eq!(change["textDocument"]["version"], 2);
    assert_eq!(change["contentChanges"][0]["text"], defaults.valid_text.as_str());

    let init = run.log.params_of(methods::INITIALIZE).unwrap();
    assert_eq!(init["capabilities"], json!({}));
    assert!(init["rootUri"].as_str().unwrap().starts_with("file://"));

    let completion = run.log.params_of(methods::COMPLETION).unwrap();
    assert_eq!(completion["position"], json!({ "line": 1, "character": 3 }));
    let hover = run.log.params_of(methods::HOVER).unwrap();
    assert_eq!(hover["position"], json!({ "line": 0, "character": 6 }));
}

#[tokio::test]
async fn missing_diagnostics_fail_without_stopping_the_run() {
    let behavior = MockBehavior {
        noise_after_open: 5,
        diagnostics: None,
        ..MockBehavior::default()
    };
    let run = run_scenario(behavior, TIMEOUT).await;

    assert_eq!(
        outcome(&run.report, Step::AwaitDiagnostics),
        &StepOutcome::Fail("No diagnostics within 5 frames".into())
    );
    assert!(outcome(&run.report, Step::ChangeValid).is_pass());
    assert!(outcome(&run.report, Step::Shutdown).is_pass());
    assert_eq!(run.report.status(), RunStatus::Failed);
    assert_eq!(run.report.exit_code(false), EXIT_FAILED);
    assert_eq!(run.report.exit_code(true), EXIT_PASSED);
}

#[tokio::test]
async fn diagnostics_after_noise_within_limit_pass() {
    let behavior = MockBehavior {
        noise_after_open: 4,
        ..MockBehavior::default()
    };
    let run = run_scenario(behavior, TIMEOUT).await;
    assert!(outcome(&run.report, Step::AwaitDiagnostics).is_pass());
}

#[tokio::test]
async fn startup_log_messages_do_not_use_diagnostics_budget() {
    let behavior = MockBehavior {
        noise_before_initialize: 5,
        ..MockBehavior::default()
    };
    let run = run_scenario(behavior, TIMEOUT).await;

    assert_eq!(
        outcome(&run.report, Step::AwaitDiagnostics),
        &StepOutcome::Pass("Diagnostics: 1".into())
    );
    assert_eq!(run.report.status(), RunStatus::Passed);
}

#[tokio::test]
async fn startup_and_post_open_noise_share_no_budget() {
    let behavior = MockBehavior {
        noise_before_initialize: 3,
        noise_after_open: 4,
        ..MockBehavior::default()
    };
    let run = run_scenario(behavior, TIMEOUT).await;
    assert!(outcome(&run.report, Step::AwaitDiagnostics).is_pass());
}

#[tokio::test]
async fn empty_diagnostics_do_not_count() {
    let behavior = MockBehavior {
        diagnostics: Some(Vec::new()),
        ..MockBehavior::default()
    };
    let config = ScenarioConfig {
        diagnostics_frame_limit: 1,
        ..ScenarioConfig::default()
    };
    let run = run_scenario_with(behavior, config, TIMEOUT).await;
    assert!(!outcome(&run.report, Step::AwaitDiagnostics).is_pass());
    assert!(outcome(&run.report, Step::AwaitCompletion).is_pass());
}

#[tokio::test]
async fn silent_server_times_out_diagnostics_non_fatally() {
    let behavior = MockBehavior {
        diagnostics: None,
        ..MockBehavior::default()
    };
    let run = run_scenario(behavior, Duration::from_millis(200)).await;

    let diagnostics = outcome(&run.report, Step::AwaitDiagnostics);
    assert!(!diagnostics.is_pass());
    assert!(diagnostics.detail().contains("timed out"));
    assert!(run.report.aborted().is_none());
    assert!(outcome(&run.report, Step::Hover).is_pass());
}

#[tokio::test]
async fn closed_output_after_initialize_aborts() {
    let behavior = MockBehavior {
        close_after_initialize: true,
        ..MockBehavior::default()
    };
    let run = run_scenario(behavior, TIMEOUT).await;

    assert!(outcome(&run.report, Step::Init).is_pass());
    assert_eq!(run.report.status(), RunStatus::Aborted);
    assert_eq!(run.report.exit_code(true), EXIT_ABORTED);
    assert!(matches!(
        run.report.aborted(),
        Some(TransportError::Closed | TransportError::Write(_))
    ));
    assert!(run.report.outcome(Step::AwaitCompletion).is_none());
    assert!(run.console.contains("[FAIL] fatal:"));
}

#[tokio::test]
async fn empty_completion_list_passes() {
    let behavior = MockBehavior {
        completion: json!([]),
        ..MockBehavior::default()
    };
    let run = run_scenario(behavior, TIMEOUT).await;
    assert_eq!(
        outcome(&run.report, Step::AwaitCompletion),
        &StepOutcome::Pass("Items: 0".into())
    );
}

#[tokio::test]
async fn completion_list_object_passes() {
    let behavior = MockBehavior {
        completion: json!({ "isIncomplete": true, "items": [{ "label": "answer" }] }),
        ..MockBehavior::default()
    };
    let run = run_scenario(behavior, TIMEOUT).await;
    assert_eq!(
        outcome(&run.report, Step::AwaitCompletion),
        &StepOutcome::Pass("Items: 1".into())
    );
}

#[tokio::test]
async fn null_completion_fails() {
    let behavior = MockBehavior {
        completion: serde_json::Value::Null,
        ..MockBehavior::default()
    };
    let run = run_scenario(behavior, TIMEOUT).await;
    assert!(!outcome(&run.report, Step::AwaitCompletion).is_pass());
    assert!(outcome(&run.report, Step::Hover).is_pass());
}

#[tokio::test]
async fn completion_error_fails() {
    let behavior = MockBehavior {
        completion_error: true,
        ..MockBehavior::default()
    };
    let run = run_scenario(behavior, TIMEOUT).await;
    let completion = outcome(&run.report, Step::AwaitCompletion);
    assert!(!completion.is_pass());
    assert!(completion.detail().contains("-32601"));
}

#[tokio::test]
async fn initialize_error_fails_init_only() {
    let behavior = MockBehavior {
        initialize_error: true,
        ..MockBehavior::default()
    };
    let run = run_scenario(behavior, TIMEOUT).await;
    assert!(!outcome(&run.report, Step::Init).is_pass());
    assert!(outcome(&run.report, Step::InitializedAck).is_pass());
    assert_eq!(run.report.failed(), 1);
}

#[tokio::test]
async fn empty_initialize_result_fails() {
    let behavior = MockBehavior {
        initialize_result: json!({}),
        ..MockBehavior::default()
    };
    let run = run_scenario(behavior, TIMEOUT).await;
    assert!(!outcome(&run.report, Step::Init).is_pass());
}

#[tokio::test]
async fn null_hover_still_passes() {
    let behavior = MockBehavior {
        hover: serde_json::Value::Null,
        ..MockBehavior::default()
    };
    let run = run_scenario(behavior, TIMEOUT).await;
    assert!(outcome(&run.report, Step::Hover).is_pass());
    assert!(run.console.contains("[INFO] Hover result: null"));
}

#[tokio::test]
async fn server_requests_are_refused_and_skipped() {
    let behavior = MockBehavior {
        server_request_after_initialized: true,
        ..MockBehavior::default()
    };
    let run = run_scenario(behavior, TIMEOUT).await;

    assert_eq!(run.report.status(), RunStatus::Passed);
    assert_eq!(run.log.replies.len(), 1);
    let reply = &run.log.replies[0];
    assert_eq!(reply["id"], "cfg-1");
    assert_eq!(reply["error"]["code"], -32601);
}
