//! The fixed conformance scenario.
//!
//! Steps run strictly in order and each one blocks until it has an outcome:
//!
//! ```text
//! Init -> InitializedAck -> OpenInvalid -> AwaitDiagnostics -> ChangeValid
//!      -> AwaitCompletion -> Hover -> Shutdown -> Terminal
//! ```
//!
//! A step that sees an unexpected answer records a failure and the run goes
//! on. Only a [`TransportError`] stops the sequence.

use std::fmt;
use std::io::Write;
use std::path::Path;
use std::time::Duration;

use lsp_conform_protocol::params::{self, PathToUriError, methods};
use lsp_conform_protocol::{Incoming, Position, PublishDiagnosticsParams, Response};
use serde_json::Value;

use crate::config::ScenarioConfig;
use crate::report::{Report, Reporter, StepOutcome};
use crate::session::Session;
use crate::supervisor::ServerProcess;
use crate::transport::TransportError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Step {
    Init,
    InitializedAck,
    OpenInvalid,
    AwaitDiagnostics,
    ChangeValid,
    AwaitCompletion,
    Hover,
    Shutdown,
    Terminal,
}

impl Step {
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Step::Init => "initialize",
            Step::InitializedAck => "initialized notification",
            Step::OpenInvalid => "open document with invalid syntax",
            Step::AwaitDiagnostics => "diagnostics for invalid document",
            Step::ChangeValid => "change document to valid syntax",
            Step::AwaitCompletion => "completion",
            Step::Hover => "hover",
            Step::Shutdown => "shutdown and exit",
            Step::Terminal => "server termination",
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Resolved scenario inputs: URIs computed, everything ready to send.
#[derive(Debug, Clone)]
pub struct Scenario {
    pub process_id: u32,
    pub root_uri: String,
    pub document_uri: String,
    pub language_id: String,
    pub invalid_text: String,
    pub valid_text: String,
    pub completion_position: Position,
    pub hover_position: Position,
    pub diagnostics_frame_limit: usize,
}

impl Scenario {
    /// `root` must be absolute.
    pub fn from_config(config: &ScenarioConfig, root: &Path) -> Result<Self, PathToUriError> {
        let root_uri = params::path_to_file_uri(root)?;
        let document_uri = params::path_to_file_uri(&root.join(&config.file_name))?;
        Ok(Self {
            process_id: std::process::id(),
            root_uri: root_uri.to_string(),
            document_uri: document_uri.to_string(),
            language_id: config.language_id.clone(),
            invalid_text: config.invalid_text.clone(),
            valid_text: config.valid_text.clone(),
            completion_position: config.completion_position,
            hover_position: config.hover_position,
            diagnostics_frame_limit: config.diagnostics_frame_limit,
        })
    }
}

pub struct ScenarioRunner {
    scenario: Scenario,
}

impl ScenarioRunner {
    #[must_use]
    pub fn new(scenario: Scenario) -> Self {
        Self { scenario }
    }

    /// Run every protocol step up to and including `Shutdown`.
    ///
    /// A fatal transport error is printed and stored in the report; results
    /// of the steps before it are kept.
    pub async fn run<W: Write>(&self, session: &mut Session, reporter: &mut Reporter<W>) -> Report {
        let mut report = Report::new();
        if let Err(e) = self.steps(session, reporter, &mut report).await {
            tracing::warn!("Scenario aborted: {e}");
            reporter.fatal(&e);
            report.abort(e);
        }
        report
    }

    async fn steps<W: Write>(
        &self,
        session: &mut Session,
        reporter: &mut Reporter<W>,
        report: &mut Report,
    ) -> Result<(), TransportError> {
        let s = &self.scenario;

        reporter.test(Step::Init);
        let response = session
            .request(
                methods::INITIALIZE,
                Some(params::initialize_params(s.process_id, &s.root_uri)),
            )
            .await?;
        conclude(report, reporter, Step::Init, init_outcome(&response));

        reporter.test(Step::InitializedAck);
        session
            .issue_notification(methods::INITIALIZED, Some(serde_json::json!({})))
            .await?;
        conclude(
            report,
            reporter,
            Step::InitializedAck,
            StepOutcome::Pass("Sent initialized".to_string()),
        );

        reporter.test(Step::OpenInvalid);
        // Only frames that arrive after didOpen count toward the diagnostics limit.
        let discarded = session.discard_inbound();
        if discarded > 0 {
            tracing::debug!(discarded, "Discarded frames received before didOpen");
        }
        session
            .issue_notification(
                methods::DID_OPEN,
                Some(params::did_open_params(
                    &s.document_uri,
                    &s.language_id,
                    1,
                    &s.invalid_text,
                )),
            )
            .await?;
        conclude(
            report,
            reporter,
            Step::OpenInvalid,
            StepOutcome::Pass(format!("Opened {}", s.document_uri)),
        );

        reporter.test(Step::AwaitDiagnostics);
        let outcome = self.await_diagnostics(session).await?;
        conclude(report, reporter, Step::AwaitDiagnostics, outcome);

        reporter.test(Step::ChangeValid);
        session
            .issue_notification(
                methods::DID_CHANGE,
                Some(params::did_change_params(&s.document_uri, 2, &s.valid_text)),
            )
            .await?;
        let completion_id = session
            .issue_request(
                methods::COMPLETION,
                Some(params::text_document_position_params(
                    &s.document_uri,
                    s.completion_position,
                )),
            )
            .await?;
        conclude(
            report,
            reporter,
            Step::ChangeValid,
            StepOutcome::Pass("Changed document, requested completion".to_string()),
        );

        reporter.test(Step::AwaitCompletion);
        let response = session.await_response(completion_id).await?;
        conclude(
            report,
            reporter,
            Step::AwaitCompletion,
            completion_outcome(&response),
        );

        reporter.test(Step::Hover);
        let response = session
            .request(
                methods::HOVER,
                Some(params::text_document_position_params(
                    &s.document_uri,
                    s.hover_position,
                )),
            )
            .await?;
        let raw = response
            .result()
            .or(response.error())
            .map_or_else(|| "null".to_string(), Value::to_string);
        reporter.info(&format!("Hover result: {raw}"));
        conclude(
            report,
            reporter,
            Step::Hover,
            StepOutcome::Pass("Hover responded".to_string()),
        );

        reporter.test(Step::Shutdown);
        session.request(methods::SHUTDOWN, None).await?;
        session.issue_notification(methods::EXIT, None).await?;
        conclude(
            report,
            reporter,
            Step::Shutdown,
            StepOutcome::Pass("Shutdown acknowledged, exit sent".to_string()),
        );

        Ok(())
    }

    /// Scan up to the frame limit for a non-empty diagnostics publication.
    async fn await_diagnostics(
        &self,
        session: &mut Session,
    ) -> Result<StepOutcome, TransportError> {
        let limit = self.scenario.diagnostics_frame_limit;
        for _ in 0..limit {
            let incoming = match session.next_inbound().await {
                Ok(incoming) => incoming,
                Err(e) if e.is_timeout() => {
                    return Ok(StepOutcome::Fail(format!("No diagnostics: {e}")));
                }
                Err(e) => return Err(e),
            };

            if incoming.method() != Some(methods::PUBLISH_DIAGNOSTICS) {
                tracing::trace!(method = ?incoming.method(), "Skipping inbound frame");
                continue;
            }
            match diagnostics_count(&incoming) {
                Some(count) if count > 0 => {
                    return Ok(StepOutcome::Pass(format!("Diagnostics: {count}")));
                }
                _ => tracing::debug!("Empty or malformed diagnostics publication"),
            }
        }
        Ok(StepOutcome::Fail(format!("No diagnostics within {limit} frames")))
    }

    /// Terminal step: give the server `grace` to exit, then kill it.
    ///
    /// Recorded only when the protocol steps completed; after an abort the
    /// server is still reaped.
    pub async fn terminate<W: Write>(
        &self,
        process: ServerProcess,
        grace: Duration,
        report: &mut Report,
        reporter: &mut Reporter<W>,
    ) {
        if report.aborted().is_some() {
            let termination = process.shutdown(grace).await;
            tracing::info!("After abort: {termination}");
            return;
        }

        reporter.test(Step::Terminal);
        let termination = process.shutdown(grace).await;
        conclude(
            report,
            reporter,
            Step::Terminal,
            StepOutcome::Pass(capitalize(&termination.to_string())),
        );
    }
}

fn conclude<W: Write>(
    report: &mut Report,
    reporter: &mut Reporter<W>,
    step: Step,
    outcome: StepOutcome,
) {
    reporter.outcome(&outcome);
    report.record(step, outcome);
}

fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// `null`, `{}` and `[]` count as empty.
fn is_non_empty(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Object(map) => !map.is_empty(),
        Value::Array(items) => !items.is_empty(),
        _ => true,
    }
}

fn init_outcome(response: &Response) -> StepOutcome {
    if let Some(message) = response.error_message() {
        return StepOutcome::Fail(format!("initialize returned an error: {message}"));
    }
    match response.result() {
        Some(result) if is_non_empty(result) => StepOutcome::Pass("Initialized".to_string()),
        _ => StepOutcome::Fail("initialize returned an empty result".to_string()),
    }
}

/// Item count of a completion result: a bare array or a `CompletionList`.
fn completion_items(result: &Value) -> Option<usize> {
    match result {
        Value::Array(items) => Some(items.len()),
        Value::Object(list) => list.get("items").and_then(Value::as_array).map(Vec::len),
        _ => None,
    }
}

fn completion_outcome(response: &Response) -> StepOutcome {
    if let Some(message) = response.error_message() {
        return StepOutcome::Fail(format!("completion returned an error: {message}"));
    }
    match response.result() {
        None | Some(Value::Null) => StepOutcome::Fail("completion returned null".to_string()),
        Some(result) => match completion_items(result) {
            Some(count) => StepOutcome::Pass(format!("Items: {count}")),
            None => StepOutcome::Fail(format!("unexpected completion result: {result}")),
        },
    }
}

fn diagnostics_count(incoming: &Incoming) -> Option<usize> {
    let params = incoming.params()?.clone();
    serde_json::from_value::<PublishDiagnosticsParams>(params)
        .ok()
        .map(|p| p.diagnostics.len())
}
