//! Step outcomes and console reporting.

use std::fmt;
use std::io::{self, Write};

use crate::scenario::Step;
use crate::transport::TransportError;

/// Exit code when every step passed.
pub const EXIT_PASSED: u8 = 0;
/// Exit code when at least one non-fatal step failed.
pub const EXIT_FAILED: u8 = 1;
/// Exit code for a fatal abort or a startup failure.
pub const EXIT_ABORTED: u8 = 2;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    Pass(String),
    Fail(String),
}

impl StepOutcome {
    #[must_use]
    pub fn is_pass(&self) -> bool {
        matches!(self, Self::Pass(_))
    }

    #[must_use]
    pub fn detail(&self) -> &str {
        match self {
            Self::Pass(detail) | Self::Fail(detail) => detail,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepResult {
    pub step: Step,
    pub outcome: StepOutcome,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Passed,
    Failed,
    Aborted,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Passed => "all steps passed",
            Self::Failed => "some steps failed",
            Self::Aborted => "aborted",
        })
    }
}

/// Results of one scenario run, in step order.
///
/// A fatal transport error ends the run early; results recorded before the
/// abort are kept.
#[derive(Debug, Default)]
pub struct Report {
    results: Vec<StepResult>,
    abort: Option<TransportError>,
}

impl Report {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, step: Step, outcome: StepOutcome) {
        self.results.push(StepResult { step, outcome });
    }

    pub fn abort(&mut self, error: TransportError) {
        self.abort = Some(error);
    }

    #[must_use]
    pub fn results(&self) -> &[StepResult] {
        &self.results
    }

    #[must_use]
    pub fn outcome(&self, step: Step) -> Option<&StepOutcome> {
        self.results
            .iter()
            .find(|r| r.step == step)
            .map(|r| &r.outcome)
    }

    #[must_use]
    pub fn passed(&self) -> usize {
        self.results.iter().filter(|r| r.outcome.is_pass()).count()
    }

    #[must_use]
    pub fn failed(&self) -> usize {
        self.results.len() - self.passed()
    }

    #[must_use]
    pub fn aborted(&self) -> Option<&TransportError> {
        self.abort.as_ref()
    }

    #[must_use]
    pub fn status(&self) -> RunStatus {
        if self.abort.is_some() {
            RunStatus::Aborted
        } else if self.failed() > 0 {
            RunStatus::Failed
        } else {
            RunStatus::Passed
        }
    }

    /// Process exit code. `allow_failures` downgrades non-fatal step failures
    /// to success; an abort is never downgraded.
    #[must_use]
    pub fn exit_code(&self, allow_failures: bool) -> u8 {
        match self.status() {
            RunStatus::Passed => EXIT_PASSED,
            RunStatus::Failed if allow_failures => EXIT_PASSED,
            RunStatus::Failed => EXIT_FAILED,
            RunStatus::Aborted => EXIT_ABORTED,
        }
    }
}

/// Console output in the `[TEST]` / `[PASS]` / `[FAIL]` / `[DONE]` format.
///
/// Write errors on the console are ignored; a closed stdout must not change
/// the outcome of a run.
pub struct Reporter<W> {
    out: W,
}

impl Reporter<io::Stdout> {
    #[must_use]
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write> Reporter<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    fn line(&mut self, tag: &str, text: &str) {
        let _ = writeln!(self.out, "[{tag}] {text}");
        let _ = self.out.flush();
    }

    pub fn test(&mut self, step: Step) {
        self.line("TEST", step.label());
    }

    pub fn outcome(&mut self, outcome: &StepOutcome) {
        match outcome {
            StepOutcome::Pass(detail) => self.line("PASS", detail),
            StepOutcome::Fail(reason) => self.line("FAIL", reason),
        }
    }

    pub fn info(&mut self, text: &str) {
        self.line("INFO", text);
    }

    pub fn fatal(&mut self, error: &TransportError) {
        self.line("FAIL", &format!("fatal: {error}"));
    }

    pub fn done(&mut self, report: &Report) {
        let text = format!(
            "{} ({} passed, {} failed)",
            report.status(),
            report.passed(),
            report.failed()
        );
        self.line("DONE", &text);
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}
