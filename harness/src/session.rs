//! Protocol session: request ids, issuing, and response correlation.

use std::collections::HashMap;
use std::num::NonZeroU64;
use std::time::Duration;

use lsp_conform_protocol::{Incoming, Notification, Request, RequestId, Response};
use serde_json::Value;
use tokio::sync::oneshot;

use crate::transport::{Transport, TransportError};

/// One conversation with one server.
///
/// Ids are allocated from a counter owned by the session, so they are unique
/// and strictly increasing from 1. Every issued request gets its own response
/// slot; responses may arrive in any order.
pub struct Session {
    transport: Transport,
    next_id: NonZeroU64,
    awaiting: HashMap<RequestId, (String, oneshot::Receiver<Response>)>,
    timeout: Option<Duration>,
}

impl Session {
    /// `timeout` bounds every wait for a response or inbound frame; `None`
    /// waits forever.
    #[must_use]
    pub fn new(transport: Transport, timeout: Option<Duration>) -> Self {
        Self {
            transport,
            next_id: NonZeroU64::MIN,
            awaiting: HashMap::new(),
            timeout,
        }
    }

    fn allocate_id(&mut self) -> RequestId {
        let id = self.next_id;
        self.next_id = id.saturating_add(1);
        RequestId::new(id)
    }

    /// Send a request and return its id for [`Session::await_response`].
    pub async fn issue_request(
        &mut self,
        method: &str,
        params: Option<Value>,
    ) -> Result<RequestId, TransportError> {
        let id = self.allocate_id();
        let request = Request::new(id, method, params)?;

        let slot = self.transport.register(id).await?;
        if let Err(e) = self.transport.send_message(&request.into()).await {
            // Don't leak the pending entry.
            self.transport.unregister(id).await;
            return Err(e);
        }
        tracing::debug!(%id, method, "LSP request sent");

        self.awaiting.insert(id, (method.to_string(), slot));
        Ok(id)
    }

    pub async fn issue_notification(
        &mut self,
        method: &str,
        params: Option<Value>,
    ) -> Result<(), TransportError> {
        let notification = Notification::new(method, params)?;
        self.transport.send_message(&notification.into()).await?;
        tracing::debug!(method, "LSP notification sent");
        Ok(())
    }

    /// Wait for the response to a previously issued request.
    pub async fn await_response(&mut self, id: RequestId) -> Result<Response, TransportError> {
        let (method, slot) = self
            .awaiting
            .remove(&id)
            .ok_or(TransportError::UnknownRequest(id))?;

        let received = match self.timeout {
            Some(waited) => match tokio::time::timeout(waited, slot).await {
                Ok(received) => received,
                Err(_) => {
                    // Timeout: remove the pending entry so a late reply is
                    // treated as unsolicited.
                    self.transport.unregister(id).await;
                    return Err(TransportError::Timeout {
                        waited,
                        what: format!("response to {method} (id {id})"),
                    });
                }
            },
            None => slot.await,
        };

        // A dropped slot means the reader task died.
        received.map_err(|_| self.transport.failure().unwrap_or(TransportError::Closed))
    }

    /// Issue a request and wait for its response.
    pub async fn request(
        &mut self,
        method: &str,
        params: Option<Value>,
    ) -> Result<Response, TransportError> {
        let id = self.issue_request(method, params).await?;
        self.await_response(id).await
    }

    /// Next server-pushed frame.
    pub async fn next_inbound(&mut self) -> Result<Incoming, TransportError> {
        self.transport.receive(self.timeout).await
    }

    /// Forget server-pushed frames received so far.
    pub fn discard_inbound(&mut self) -> usize {
        self.transport.drain()
    }
}
