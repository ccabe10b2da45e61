//! Queue-backed `ClientTransport` for one WebSocket.
//!
//! Producers push into a bounded mpsc queue and never await the socket.
//! A dedicated writer task drains the queue in order. A full queue means
//! the consumer is too slow and is reported as a delivery failure.

use async_trait::async_trait;
use axum::extract::ws::Message;
use futures_util::{Sink, SinkExt};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::domain::error::DeliveryError;
use crate::ports::transport::ClientTransport;

/// Outbound side of an accepted WebSocket.
pub struct WsTransport {
    tx: mpsc::Sender<Message>,
    close_tx: watch::Sender<bool>,
}

impl WsTransport {
    /// Create a transport and its writer task over `sink`.
    ///
    /// The writer exits when the socket fails, the transport is closed, or
    /// every sender is dropped.
    pub fn spawn<S>(sink: S, buffer: usize) -> (Self, watch::Receiver<bool>, JoinHandle<()>)
    where
        S: Sink<Message> + Unpin + Send + 'static,
        S::Error: std::fmt::Display,
    {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        let (close_tx, close_rx) = watch::channel(false);
        let writer = tokio::spawn(run_writer(sink, rx, close_tx.subscribe()));
        (Self { tx, close_tx }, close_rx, writer)
    }

    /// Whether `close` has been called.
    pub fn is_closed(&self) -> bool {
        *self.close_tx.borrow()
    }
}

#[async_trait]
impl ClientTransport for WsTransport {
    async fn send(&self, payload: &str) -> Result<(), DeliveryError> {
        if self.is_closed() {
            return Err(DeliveryError::Closed);
        }
        self.tx
            .try_send(Message::Text(payload.to_string()))
            .map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => DeliveryError::QueueFull,
                mpsc::error::TrySendError::Closed(_) => DeliveryError::Closed,
            })
    }

    async fn close(&self) -> Result<(), DeliveryError> {
        if self.close_tx.send_replace(true) {
            return Err(DeliveryError::Closed);
        }
        Ok(())
    }
}

async fn run_writer<S>(
    mut sink: S,
    mut rx: mpsc::Receiver<Message>,
    mut close_rx: watch::Receiver<bool>,
) where
    S: Sink<Message> + Unpin + Send,
    S::Error: std::fmt::Display,
{
    loop {
        tokio::select! {
            biased;
            changed = close_rx.changed() => {
                if changed.is_err() || *close_rx.borrow() {
                    break;
                }
            }
            msg = rx.recv() => {
                let Some(msg) = msg else { break };
                if let Err(e) = sink.send(msg).await {
                    debug!(error = %e, "WebSocket write failed, writer exiting");
                    return;
                }
            }
        }
    }
    if let Err(e) = sink.send(Message::Close(None)).await {
        debug!(error = %e, "Ignoring close frame write error");
    }
}
