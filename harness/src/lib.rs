//! LSP conformance harness.
//!
//! Drives one language server through a fixed scenario and reports per-step
//! outcomes.
//!
//! ```text
//! ScenarioRunner -> Session -> Transport -> FrameWriter -> server stdin
//! server stdout -> FrameReader -> Transport reader task
//!                                   |-> pending response slots (by id)
//!                                   '-> inbound queue -> ScenarioRunner
//! ```

pub mod config;
pub mod report;
pub mod scenario;
pub mod session;
pub mod supervisor;
pub mod transport;

pub use config::{ConfigError, HarnessConfig, ScenarioConfig, ServerConfig, TimeoutConfig};
pub use report::{Report, Reporter, RunStatus, StepOutcome, StepResult};
pub use scenario::{Scenario, ScenarioRunner, Step};
pub use session::Session;
pub use supervisor::{ServerIo, ServerProcess, Termination};
pub use transport::{Transport, TransportError};
