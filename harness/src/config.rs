use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use lsp_conform_protocol::Position;
use serde::Deserialize;

/// Default subcommand passed to the server when no arguments are configured.
pub const DEFAULT_SERVER_ARG: &str = "lsp";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config at {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config at {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

impl ConfigError {
    pub fn path(&self) -> &PathBuf {
        match self {
            ConfigError::Read { path, .. } | ConfigError::Parse { path, .. } => path,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct HarnessConfig {
    pub server: Option<ServerConfig>,
    #[serde(default)]
    pub scenario: ScenarioConfig,
    #[serde(default)]
    pub timeouts: TimeoutConfig,
}

/// Server executable and its arguments.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ServerConfig {
    pub command: String,
    #[serde(default = "default_server_args")]
    pub args: Vec<String>,
}

fn default_server_args() -> Vec<String> {
    vec![DEFAULT_SERVER_ARG.to_string()]
}

impl ServerConfig {
    /// `args` of `None` means the default `lsp` subcommand.
    pub fn new(command: impl Into<String>, args: Option<Vec<String>>) -> Self {
        Self {
            command: command.into(),
            args: args.unwrap_or_else(default_server_args),
        }
    }

    /// Command with `${VAR}` references expanded.
    #[must_use]
    pub fn expanded_command(&self) -> String {
        expand_env_vars(&self.command)
    }
}

/// Inputs of the fixed scenario: the document and the positions it queries.
///
/// The defaults describe a tiny assignment language: the invalid text has no
/// identifier or value, the valid text defines `answer` and leaves a partial
/// `ans` on the next line for completion.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ScenarioConfig {
    /// Workspace root; `${VAR}` references are expanded.
    pub root: Option<String>,
    pub language_id: String,
    /// Document file name, joined onto the workspace root.
    pub file_name: String,
    pub invalid_text: String,
    pub valid_text: String,
    pub completion_position: Position,
    pub hover_position: Position,
    /// Inbound frames read while waiting for diagnostics.
    pub diagnostics_frame_limit: usize,
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self {
            root: None,
            language_id: "plaintext".to_string(),
            file_name: "conformance.txt".to_string(),
            invalid_text: "let = ;\n".to_string(),
            valid_text: "let answer = 42\nans\n".to_string(),
            completion_position: Position::new(1, 3),
            hover_position: Position::new(0, 6),
            diagnostics_frame_limit: 5,
        }
    }
}

impl ScenarioConfig {
    #[must_use]
    pub fn root_dir(&self) -> Option<PathBuf> {
        self.root
            .as_deref()
            .map(expand_env_vars)
            .filter(|root| !root.is_empty())
            .map(PathBuf::from)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Bound on every response and inbound read; 0 waits forever.
    pub response_secs: u64,
    /// Delay after `exit` before the server is killed.
    pub grace_millis: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            response_secs: 30,
            grace_millis: 500,
        }
    }
}

impl TimeoutConfig {
    #[must_use]
    pub fn response_timeout(&self) -> Option<Duration> {
        (self.response_secs > 0).then(|| Duration::from_secs(self.response_secs))
    }

    #[must_use]
    pub fn grace(&self) -> Duration {
        Duration::from_millis(self.grace_millis)
    }
}

/// Expand `${VAR}` references; unset variables become empty.
pub fn expand_env_vars(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut rest = value;

    while let Some(open) = rest.find("${") {
        let after = &rest[open + 2..];
        let Some(close) = after.find('}') else {
            break;
        };
        out.push_str(&rest[..open]);
        let var = &after[..close];
        if !var.is_empty() {
            out.push_str(&env::var(var).unwrap_or_default());
        }
        rest = &after[close + 1..];
    }

    out.push_str(rest);
    out
}

impl HarnessConfig {
    /// Load the config.
    ///
    /// An explicit path must exist. Without one, `~/.lsp-conform/config.toml`
    /// is used when present and defaults otherwise.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let path = match explicit {
            Some(path) => path.to_path_buf(),
            None => match config_path() {
                Some(path) if path.exists() => path,
                _ => return Ok(Self::default()),
            },
        };

        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(err) => {
                tracing::warn!("Failed to read config at {:?}: {}", path, err);
                return Err(ConfigError::Read { path, source: err });
            }
        };

        let config = Self::parse(&content, &path)?;
        tracing::debug!(path = %path.display(), "Loaded config");
        Ok(config)
    }

    pub fn parse(content: &str, path: &Path) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|err| {
            tracing::warn!("Failed to parse config at {:?}: {}", path, err);
            ConfigError::Parse {
                path: path.to_path_buf(),
                source: err,
            }
        })
    }
}

#[must_use]
pub fn config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".lsp-conform").join("config.toml"))
}
