//! `Content-Length` framing for JSON-RPC bodies.
//!
//! A frame is `Content-Length: N\r\n\r\n` followed by exactly N bytes of
//! UTF-8 JSON.
//! [`encode`] turns a validated [`Message`] into one frame; [`FrameReader`]
//! and [`FrameWriter`] move frames over async byte streams.

use std::io;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};

use crate::message::{Message, MessageError, RawMessage};

/// Largest body accepted from a server (4 MiB).
pub const MAX_FRAME_BYTES: usize = 4 * 1024 * 1024;

const CONTENT_LENGTH: &str = "Content-Length";

/// Malformed or incomplete wire data. There is no way to resynchronize a
/// byte stream after any of these.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("reading frame: {0}")]
    Io(#[from] io::Error),
    #[error("unexpected EOF while reading headers")]
    EofInHeaders,
    #[error("unexpected EOF in frame body: declared {declared} bytes")]
    EofInBody { declared: usize },
    #[error("malformed header line {0:?}")]
    MalformedHeader(String),
    #[error("missing Content-Length header")]
    MissingContentLength,
    #[error("invalid Content-Length value {0:?}")]
    InvalidContentLength(String),
    #[error("Content-Length {len} exceeds maximum {max}", max = MAX_FRAME_BYTES)]
    FrameTooLarge { len: usize },
    #[error("parsing JSON-RPC frame: {0}")]
    Parse(#[source] serde_json::Error),
    #[error("JSON-RPC frame is not an object")]
    NotAnObject,
}

impl FrameError {
    /// Whether the frame arrived intact but its body was not a JSON-RPC object.
    #[must_use]
    pub fn is_parse_error(&self) -> bool {
        matches!(self, FrameError::Parse(_) | FrameError::NotAnObject)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EncodeError {
    #[error("refusing to frame invalid message: {0}")]
    Invalid(#[from] MessageError),
    #[error("serializing JSON-RPC message: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Encode one message as a complete frame (header + body).
pub fn encode(message: &Message) -> Result<Vec<u8>, EncodeError> {
    message.validate()?;
    let body = serde_json::to_vec(message)?;
    let mut frame = format!("{CONTENT_LENGTH}: {}\r\n\r\n", body.len()).into_bytes();
    frame.extend_from_slice(&body);
    Ok(frame)
}

/// Decodes frames from a server's output stream.
pub struct FrameReader<R> {
    reader: BufReader<R>,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader: BufReader::new(reader),
        }
    }

    /// Read the next frame and split it into its JSON-RPC members.
    ///
    /// Returns `Ok(None)` on EOF between frames (clean shutdown).
    pub async fn read_message(&mut self) -> Result<Option<RawMessage>, FrameError> {
        match self.read_frame().await? {
            Some(value) => RawMessage::from_value(value)
                .map(Some)
                .ok_or(FrameError::NotAnObject),
            None => Ok(None),
        }
    }

    /// Next frame body as untyped JSON; `Ok(None)` at a clean end of stream.
    pub async fn read_frame(&mut self) -> Result<Option<serde_json::Value>, FrameError> {
        let Some(content_length) = self.read_headers().await? else {
            return Ok(None);
        };

        if content_length > MAX_FRAME_BYTES {
            return Err(FrameError::FrameTooLarge {
                len: content_length,
            });
        }

        let mut body = vec![0u8; content_length];
        if let Err(e) = self.reader.read_exact(&mut body).await {
            return Err(if e.kind() == io::ErrorKind::UnexpectedEof {
                FrameError::EofInBody {
                    declared: content_length,
                }
            } else {
                FrameError::Io(e)
            });
        }

        serde_json::from_slice(&body)
            .map(Some)
            .map_err(FrameError::Parse)
    }

    /// Consume one header block up to its blank line. `None` means the
    /// stream ended before the block started.
    async fn read_headers(&mut self) -> Result<Option<usize>, FrameError> {
        let mut content_length: Option<usize> = None;
        let mut line = String::new();
        let mut started = false;

        loop {
            line.clear();
            let bytes_read = self.reader.read_line(&mut line).await?;

            if bytes_read == 0 {
                if !started {
                    return Ok(None);
                }
                return Err(FrameError::EofInHeaders);
            }
            started = true;

            let trimmed = line.trim();
            if trimmed.is_empty() {
                break;
            }

            let Some((key, value)) = trimmed.split_once(':') else {
                return Err(FrameError::MalformedHeader(trimmed.to_string()));
            };
            // Parsed case-insensitively; other headers (Content-Type) are ignored.
            if key.trim().eq_ignore_ascii_case(CONTENT_LENGTH) {
                let value = value.trim();
                let len = value
                    .parse()
                    .map_err(|_| FrameError::InvalidContentLength(value.to_string()))?;
                content_length = Some(len);
            }
        }

        content_length
            .map(Some)
            .ok_or(FrameError::MissingContentLength)
    }
}

/// Writes pre-encoded frames to an async writer.
pub struct FrameWriter<W> {
    writer: W,
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Write one complete frame and flush.
    pub async fn write_frame(&mut self, frame: &[u8]) -> io::Result<()> {
        self.writer.write_all(frame).await?;
        self.writer.flush().await
    }

    /// Encode and write a message.
    pub async fn write_message(&mut self, message: &Message) -> Result<(), WriteError> {
        let frame = encode(message)?;
        self.write_frame(&frame).await?;
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum WriteError {
    #[error(transparent)]
    Encode(#[from] EncodeError),
    #[error("writing frame: {0}")]
    Io(#[from] io::Error),
}
