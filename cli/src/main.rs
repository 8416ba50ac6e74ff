//! lsp-conform - Binary entry point.
//!
//! ```text
//! main() -> load config -> ServerProcess::spawn -> Transport -> Session
//!        -> ScenarioRunner::run -> terminate -> [DONE] -> exit code
//! ```
//!
//! Exit codes: 0 when every step passed, 1 when a step failed (0 with
//! `--allow-failures`), 2 on a fatal abort or a startup error.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result, bail};
use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use lsp_conform_harness::report::EXIT_ABORTED;
use lsp_conform_harness::{
    HarnessConfig, Reporter, Scenario, ScenarioRunner, ServerConfig, ServerProcess, Session,
    Transport,
};

#[derive(Parser, Debug)]
#[command(name = "lsp-conform", version)]
#[command(about = "Drive a language server through a fixed LSP conformance scenario")]
struct Cli {
    /// Server executable (overrides `[server] command` from the config)
    server: Option<String>,

    /// Server arguments, replacing the default `lsp` subcommand
    #[arg(last = true)]
    args: Vec<String>,

    /// Config file (default: ~/.lsp-conform/config.toml if present)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Workspace root sent as `rootUri` (default: current directory)
    #[arg(long, value_name = "DIR")]
    root: Option<PathBuf>,

    /// Response timeout in seconds; 0 waits forever
    #[arg(long, value_name = "SECS")]
    timeout: Option<u64>,

    /// Exit 0 even when non-fatal steps fail
    #[arg(long)]
    allow_failures: bool,
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("warn"))
        .unwrap_or_default();

    // stdout carries the report; logs go to stderr.
    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_ansi(false)
                .with_writer(std::io::stderr),
        )
        .with(env_filter)
        .init();
}

/// The CLI server wins over the config file. Trailing CLI args replace the
/// configured ones.
fn server_config(cli: &Cli, configured: Option<ServerConfig>) -> Result<ServerConfig> {
    let args = (!cli.args.is_empty()).then(|| cli.args.clone());
    match (&cli.server, configured) {
        (Some(command), _) => Ok(ServerConfig::new(command.clone(), args)),
        (None, Some(mut server)) => {
            if let Some(args) = args {
                server.args = args;
            }
            Ok(server)
        }
        (None, None) => bail!("no server given: pass <SERVER> or set [server] command"),
    }
}

fn workspace_root(cli_root: Option<&Path>, config: &HarnessConfig) -> Result<PathBuf> {
    let root = match cli_root {
        Some(root) => root.to_path_buf(),
        None => match config.scenario.root_dir() {
            Some(root) => root,
            None => std::env::current_dir().context("reading current directory")?,
        },
    };
    std::fs::canonicalize(&root)
        .with_context(|| format!("workspace root {} is not accessible", root.display()))
}

async fn run(cli: Cli) -> Result<u8> {
    let mut config = HarnessConfig::load(cli.config.as_deref())?;
    if let Some(secs) = cli.timeout {
        config.timeouts.response_secs = secs;
    }

    let server = server_config(&cli, config.server.take())?;
    let root = workspace_root(cli.root.as_deref(), &config)?;
    let scenario = Scenario::from_config(&config.scenario, &root)?;
    tracing::debug!(root = %root.display(), document = %scenario.document_uri, "Scenario resolved");

    let (process, io) = ServerProcess::spawn(&server, Some(&root))?;
    let transport = Transport::spawn(io.stdout, io.stdin);
    let mut session = Session::new(transport, config.timeouts.response_timeout());
    let runner = ScenarioRunner::new(scenario);
    let mut reporter = Reporter::stdout();

    let mut report = runner.run(&mut session, &mut reporter).await;
    // Closes the server's stdin.
    drop(session);
    runner
        .terminate(process, config.timeouts.grace(), &mut report, &mut reporter)
        .await;

    reporter.done(&report);
    Ok(report.exit_code(cli.allow_failures))
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    match run(cli).await {
        Ok(code) => ExitCode::from(code),
        Err(err) => {
            tracing::error!("{err:#}");
            eprintln!("lsp-conform: {err:#}");
            ExitCode::from(EXIT_ABORTED)
        }
    }
}
