//! Parameter payloads for the LSP methods the harness drives.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Method names used by the conformance scenario.
pub mod methods {
    pub const INITIALIZE: &str = "initialize";
    pub const INITIALIZED: &str = "initialized";
    pub const DID_OPEN: &str = "textDocument/didOpen";
    pub const DID_CHANGE: &str = "textDocument/didChange";
    pub const PUBLISH_DIAGNOSTICS: &str = "textDocument/publishDiagnostics";
    pub const COMPLETION: &str = "textDocument/completion";
    pub const HOVER: &str = "textDocument/hover";
    pub const SHUTDOWN: &str = "shutdown";
    pub const EXIT: &str = "exit";
}

#[derive(Debug, thiserror::Error)]
#[error("cannot convert path to file URI: {}", path.display())]
pub struct PathToUriError {
    path: PathBuf,
}

/// Zero-based line/character position in a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Position {
    pub line: u32,
    pub character: u32,
}

impl Position {
    #[must_use]
    pub const fn new(line: u32, character: u32) -> Self {
        Self { line, character }
    }
}

/// `initialize` params with an empty client capability set.
#[must_use]
pub fn initialize_params(process_id: u32, root_uri: &str) -> Value {
    serde_json::json!({
        "processId": process_id,
        "rootUri": root_uri,
        "capabilities": {},
        "clientInfo": {
            "name": "lsp-conform",
            "version": env!("CARGO_PKG_VERSION")
        }
    })
}

#[must_use]
pub fn did_open_params(uri: &str, language_id: &str, version: i32, text: &str) -> Value {
    serde_json::json!({
        "textDocument": {
            "uri": uri,
            "languageId": language_id,
            "version": version,
            "text": text
        }
    })
}

/// Full-document replacement (no range in the content change).
#[must_use]
pub fn did_change_params(uri: &str, version: i32, text: &str) -> Value {
    serde_json::json!({
        "textDocument": {
            "uri": uri,
            "version": version
        },
        "contentChanges": [{
            "text": text
        }]
    })
}

/// Params shared by `textDocument/completion` and `textDocument/hover`.
#[must_use]
pub fn text_document_position_params(uri: &str, position: Position) -> Value {
    serde_json::json!({
        "textDocument": { "uri": uri },
        "position": position
    })
}

/// `textDocument/publishDiagnostics` payload. Diagnostics stay opaque: the
/// harness only counts them.
#[derive(Debug, Deserialize)]
pub struct PublishDiagnosticsParams {
    pub uri: String,
    pub diagnostics: Vec<Value>,
}

pub fn path_to_file_uri(path: &Path) -> Result<url::Url, PathToUriError> {
    url::Url::from_file_path(path).map_err(|()| PathToUriError {
        path: path.to_path_buf(),
    })
}
