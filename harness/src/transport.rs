//! Transport channel — owns the server's byte streams.
//!
//! Two background tasks do the I/O:
//!
//! - the writer task owns the [`FrameWriter`] and writes queued frames in
//!   order, acknowledging each write so failures reach the sender;
//! - the reader task owns the [`FrameReader`] and routes every decoded frame:
//!   responses to the pending slot registered for their id, everything else
//!   to the inbound queue. Server-to-client requests are answered with
//!   `-32601` on the spot so servers that wait on them keep going.
//!
//! The first read failure (EOF, framing, parse) is recorded once. From then on
//! every pending slot is dropped and every call fails with that error.

use std::collections::HashMap;
use std::io;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use lsp_conform_protocol::{
    EncodeError, FrameError, FrameReader, FrameWriter, Incoming, Message, MessageError, RequestId,
    Response, encode,
};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio::task::JoinHandle;

const WRITER_CHANNEL_CAPACITY: usize = 64;

/// Fatal transport failure. Clonable so the recorded reader failure can be
/// handed to every caller that runs into it.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    #[error("server closed its output stream")]
    Closed,
    #[error("reading from server: {0}")]
    Read(#[source] Arc<io::Error>),
    #[error("framing error from server: {0}")]
    Framing(#[source] Arc<FrameError>),
    #[error("unparseable frame from server: {0}")]
    Parse(#[source] Arc<FrameError>),
    #[error("writing to server: {0}")]
    Write(#[source] Arc<io::Error>),
    #[error("encoding message: {0}")]
    Encode(#[source] Arc<EncodeError>),
    #[error("invalid outgoing message: {0}")]
    InvalidMessage(#[from] MessageError),
    #[error("no pending request with id {0}")]
    UnknownRequest(RequestId),
    #[error("timed out after {waited:?} waiting for {what}")]
    Timeout { waited: Duration, what: String },
    #[error("writer task exited")]
    WriterGone,
}

impl TransportError {
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, TransportError::Timeout { .. })
    }
}

impl From<FrameError> for TransportError {
    fn from(err: FrameError) -> Self {
        match err {
            FrameError::Io(e) => TransportError::Read(Arc::new(e)),
            e if e.is_parse_error() => TransportError::Parse(Arc::new(e)),
            e => TransportError::Framing(Arc::new(e)),
        }
    }
}

impl From<EncodeError> for TransportError {
    fn from(err: EncodeError) -> Self {
        TransportError::Encode(Arc::new(err))
    }
}

struct Outgoing {
    frame: Vec<u8>,
    ack: Option<oneshot::Sender<io::Result<()>>>,
}

type PendingMap = HashMap<RequestId, oneshot::Sender<Response>>;

struct Shared {
    pending: Mutex<PendingMap>,
    failure: OnceLock<TransportError>,
}

impl Shared {
    fn failure(&self) -> Option<TransportError> {
        self.failure.get().cloned()
    }

    /// Record the first failure and drop every pending slot.
    async fn fail(&self, err: TransportError) {
        let _ = self.failure.set(err);
        self.pending.lock().await.clear();
    }
}

pub struct Transport {
    writer_tx: mpsc::Sender<Outgoing>,
    inbound_rx: mpsc::UnboundedReceiver<Incoming>,
    shared: Arc<Shared>,
    reader_handle: JoinHandle<()>,
    writer_handle: JoinHandle<()>,
}

impl Transport {
    /// Start the reader and writer tasks over a connected stream pair.
    pub fn spawn<R, W>(reader: R, writer: W) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let shared = Arc::new(Shared {
            pending: Mutex::new(HashMap::new()),
            failure: OnceLock::new(),
        });

        let (writer_tx, writer_rx) = mpsc::channel::<Outgoing>(WRITER_CHANNEL_CAPACITY);
        let writer_handle = tokio::spawn(run_writer(writer, writer_rx));

        // Unbounded: the reader must never block on a scenario that is busy
        // awaiting a response, or the response would never be routed.
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let reader_handle = tokio::spawn(run_reader(
            reader,
            shared.clone(),
            inbound_tx,
            writer_tx.clone(),
        ));

        Self {
            writer_tx,
            inbound_rx,
            shared,
            reader_handle,
            writer_handle,
        }
    }

    /// The recorded reader failure, if the inbound side is dead.
    #[must_use]
    pub fn failure(&self) -> Option<TransportError> {
        self.shared.failure()
    }

    /// Write one complete frame, waiting until it is flushed.
    pub async fn send(&self, frame: Vec<u8>) -> Result<(), TransportError> {
        if let Some(err) = self.shared.failure() {
            return Err(err);
        }
        let (ack_tx, ack_rx) = oneshot::channel();
        self.writer_tx
            .send(Outgoing {
                frame,
                ack: Some(ack_tx),
            })
            .await
            .map_err(|_| TransportError::WriterGone)?;
        match ack_rx.await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(TransportError::Write(Arc::new(e))),
            Err(_) => Err(TransportError::WriterGone),
        }
    }

    pub async fn send_message(&self, message: &Message) -> Result<(), TransportError> {
        let frame = encode(message)?;
        self.send(frame).await
    }

    /// Install the response slot for `id`. Must happen before the request is
    /// written so a fast reply cannot overtake it.
    pub async fn register(
        &self,
        id: RequestId,
    ) -> Result<oneshot::Receiver<Response>, TransportError> {
        let mut pending = self.shared.pending.lock().await;
        // Checked under the lock: the reader records the failure before it
        // clears the table, so a slot inserted here is either cleared or served.
        if let Some(err) = self.shared.failure() {
            return Err(err);
        }
        let (tx, rx) = oneshot::channel();
        pending.insert(id, tx);
        Ok(rx)
    }

    pub async fn unregister(&self, id: RequestId) {
        self.shared.pending.lock().await.remove(&id);
    }

    /// Next server-pushed frame (notification, server request, or unsolicited
    /// response). `None` waits forever.
    pub async fn receive(&mut self, timeout: Option<Duration>) -> Result<Incoming, TransportError> {
        let next = match timeout {
            Some(waited) => tokio::time::timeout(waited, self.inbound_rx.recv())
                .await
                .map_err(|_| TransportError::Timeout {
                    waited,
                    what: String::from("a server message"),
                })?,
            None => self.inbound_rx.recv().await,
        };
        // The queue closes only when the reader task has exited.
        next.ok_or_else(|| self.shared.failure().unwrap_or(TransportError::Closed))
    }

    /// Drop every frame already queued without waiting for more. Returns how
    /// many were dropped.
    pub fn drain(&mut self) -> usize {
        let mut dropped = 0;
        while let Ok(incoming) = self.inbound_rx.try_recv() {
            tracing::trace!(method = ?incoming.method(), "Dropping queued inbound frame");
            dropped += 1;
        }
        dropped
    }
}

impl Drop for Transport {
    fn drop(&mut self) {
        self.reader_handle.abort();
        self.writer_handle.abort();
    }
}

async fn run_writer<W>(writer: W, mut writer_rx: mpsc::Receiver<Outgoing>)
where
    W: AsyncWrite + Unpin,
{
    let mut writer = FrameWriter::new(writer);
    while let Some(outgoing) = writer_rx.recv().await {
        let result = writer.write_frame(&outgoing.frame).await;
        let failed = result.is_err();
        if let Err(e) = &result {
            tracing::warn!("LSP write error: {e}");
        }
        if let Some(ack) = outgoing.ack {
            let _ = ack.send(result);
        }
        if failed {
            break;
        }
    }
}

async fn run_reader<R>(
    reader: R,
    shared: Arc<Shared>,
    inbound_tx: mpsc::UnboundedSender<Incoming>,
    writer_tx: mpsc::Sender<Outgoing>,
) where
    R: AsyncRead + Unpin,
{
    let mut reader = FrameReader::new(reader);
    loop {
        match reader.read_message().await {
            Ok(Some(raw)) => {
                dispatch_frame(raw.classify(), &shared, &inbound_tx, &writer_tx).await;
            }
            Ok(None) => {
                tracing::info!("LSP server closed stdout");
                shared.fail(TransportError::Closed).await;
                break;
            }
            Err(e) => {
                tracing::warn!("LSP reader error: {e}");
                shared.fail(e.into()).await;
                break;
            }
        }
    }
}

async fn dispatch_frame(
    incoming: Incoming,
    shared: &Shared,
    inbound_tx: &mpsc::UnboundedSender<Incoming>,
    writer_tx: &mpsc::Sender<Outgoing>,
) {
    match incoming {
        Incoming::Response(response) => {
            let slot = match response.request_id() {
                Some(id) => shared.pending.lock().await.remove(&id),
                None => None,
            };
            match slot {
                Some(tx) => {
                    tracing::debug!(id = %response.id(), "LSP response routed");
                    let _ = tx.send(response);
                }
                None => {
                    tracing::debug!(id = %response.id(), "Unsolicited LSP response");
                    let _ = inbound_tx.send(Incoming::Response(response));
                }
            }
        }
        Incoming::ServerRequest {
            ref id, ref method, ..
        } => {
            tracing::debug!("LSP server sent request: {method}, replying method not found");
            let reply = Message::Response(Response::method_not_found(id.clone(), method));
            match encode(&reply) {
                Ok(frame) => {
                    let _ = writer_tx.send(Outgoing { frame, ack: None }).await;
                }
                Err(e) => tracing::warn!("Failed to encode reply to {method}: {e}"),
            }
            let _ = inbound_tx.send(incoming);
        }
        Incoming::Notification { ref method, .. } => {
            tracing::debug!("LSP notification: {method}");
            let _ = inbound_tx.send(incoming);
        }
        Incoming::Unclassified(_) => {
            tracing::trace!("Ignoring unclassifiable JSON-RPC frame");
        }
    }
}
