//! Ordered output path: one writer task per connection.
//!
//! Every write, drain and close request travels through the same unbounded
//! channel, so the writer task observes them in call order. A drain ack is
//! only sent once every byte queued before it has been written and flushed.

use bytes::Bytes;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use crate::error::{Result, TerminalError};

/// A request for the writer task.
#[derive(Debug)]
pub(crate) enum OutputFrame {
    /// Bytes to write.
    Data(Bytes),
    /// Flush, then acknowledge.
    Drain(oneshot::Sender<()>),
    /// Flush, shut the writer down, acknowledge, and exit.
    Close(oneshot::Sender<()>),
}

/// Sending side of a connection's output path.
#[derive(Debug)]
pub(crate) struct Output {
    tx: mpsc::UnboundedSender<OutputFrame>,
    closed: CancellationToken,
}

impl Output {
    /// Spawns the writer task for `writer`.
    ///
    /// `closed` is cancelled when the task exits for any reason.
    pub(crate) fn spawn<W>(writer: W, closed: CancellationToken) -> Self
    where
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(write_loop(writer, rx, closed.clone()));
        Self { tx, closed }
    }

    /// Queues bytes for the writer task.
    pub(crate) fn send(&self, bytes: Bytes) -> Result<()> {
        if self.closed.is_cancelled() {
            return Err(TerminalError::closed("session closed"));
        }
        self.tx
            .send(OutputFrame::Data(bytes))
            .map_err(|_| TerminalError::closed("writer stopped"))
    }

    /// Waits until everything queued so far has been flushed.
    pub(crate) async fn drain(&self) -> Result<()> {
        if self.closed.is_cancelled() {
            return Err(TerminalError::closed("session closed"));
        }
        let (ack_tx, ack_rx) = oneshot::channel();
        self.tx
            .send(OutputFrame::Drain(ack_tx))
            .map_err(|_| TerminalError::closed("writer stopped"))?;
        ack_rx
            .await
            .map_err(|_| TerminalError::closed("writer stopped before drain completed"))
    }

    /// Asks the writer task to flush and shut down.
    ///
    /// Returns a receiver that resolves once the writer has shut down, or
    /// `None` if the output was already closed.
    pub(crate) fn close(&self) -> Option<oneshot::Receiver<()>> {
        if self.closed.is_cancelled() {
            return None;
        }
        let (ack_tx, ack_rx) = oneshot::channel();
        let sent = self.tx.send(OutputFrame::Close(ack_tx)).is_ok();
        self.closed.cancel();
        sent.then_some(ack_rx)
    }
}

async fn write_loop<W>(
    mut writer: W,
    mut rx: mpsc::UnboundedReceiver<OutputFrame>,
    closed: CancellationToken,
) where
    W: AsyncWrite + Unpin,
{
    while let Some(frame) = rx.recv().await {
        match frame {
            OutputFrame::Data(bytes) => {
                if let Err(e) = writer.write_all(&bytes).await {
                    tracing::debug!(error = %e, "Terminal write failed");
                    break;
                }
            }
            OutputFrame::Drain(ack) => {
                if let Err(e) = writer.flush().await {
                    tracing::debug!(error = %e, "Terminal flush failed");
                    break;
                }
                let _ = ack.send(());
            }
            OutputFrame::Close(ack) => {
                let _ = writer.flush().await;
                let _ = writer.shutdown().await;
                let _ = ack.send(());
                break;
            }
        }
    }
    closed.cancel();
}
