//! Wire-level building blocks for talking to a language server.
//!
//! - [`message`]: the JSON-RPC message model (requests, notifications,
//!   responses) and the tolerant classification of decoded frames.
//! - [`codec`]: `Content-Length` framing over async byte streams.
//! - [`params`]: parameter builders for the LSP methods the harness drives.
//!
//! Nothing here spawns processes or owns tasks; see `lsp-conform-harness`.

pub mod codec;
pub mod message;
pub mod params;

pub use codec::{
    EncodeError, FrameError, FrameReader, FrameWriter, MAX_FRAME_BYTES, WriteError, encode,
};
pub use message::{
    Incoming, JSONRPC_VERSION, METHOD_NOT_FOUND, Message, MessageError, Notification, RawMessage,
    Request, RequestId, Response,
};
pub use params::{Position, PublishDiagnosticsParams};
