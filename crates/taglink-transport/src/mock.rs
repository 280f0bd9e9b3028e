//! In-memory transport for development and testing.
//!
//! Simulates the duplex channel with a pair of mpsc queues: the
//! [`MockTransport`] side goes to the engine, the [`MockTransportHandle`]
//! side stays with the test, which uses it to capture what the engine sent
//! and to play the reader's part.

use bytes::Bytes;
use taglink_core::{Error, Result};
use tokio::sync::mpsc;
use tracing::trace;

use crate::traits::{Transport, TransportEvent};

/// Queue depth for both directions.
const CHANNEL_CAPACITY: usize = 64;

/// MTU reported by the mock link.
const MOCK_MTU: usize = 247;

/// Mock duplex channel given to the engine.
///
/// # Examples
///
/// ```
/// use taglink_transport::{MockTransport, Transport, TransportEvent};
///
/// #[tokio::main]
/// async fn main() -> taglink_core::Result<()> {
///     let (mut transport, inbound, mut handle) = MockTransport::new();
///
///     // Engine side sends bytes; the handle captures them
///     transport.send(&[0x01, 0x02]).await?;
///     assert_eq!(handle.next_sent().await.unwrap().as_ref(), &[0x01, 0x02]);
///
///     // The handle injects inbound traffic
///     handle.inject(&[0x03]).await;
///     drop(inbound);
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct MockTransport {
    outbound_tx: mpsc::Sender<Bytes>,
}

impl MockTransport {
    /// Create a mock channel.
    ///
    /// Returns the transport for the engine, the inbound event receiver the
    /// engine consumes, and the handle for the test side.
    pub fn new() -> (
        Self,
        mpsc::Receiver<TransportEvent>,
        MockTransportHandle,
    ) {
        let (outbound_tx, outbound_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (inbound_tx, inbound_rx) = mpsc::channel(CHANNEL_CAPACITY);

        let transport = Self { outbound_tx };
        let handle = MockTransportHandle {
            sent_rx: outbound_rx,
            inbound_tx,
        };
        (transport, inbound_rx, handle)
    }
}

impl Transport for MockTransport {
    async fn send(&mut self, bytes: &[u8]) -> Result<()> {
        trace!(len = bytes.len(), "mock transport send");
        self.outbound_tx
            .send(Bytes::copy_from_slice(bytes))
            .await
            .map_err(|_| Error::ChannelClosed)
    }

    fn mtu(&self) -> usize {
        MOCK_MTU
    }
}

/// Test-side control of a [`MockTransport`].
#[derive(Debug)]
pub struct MockTransportHandle {
    sent_rx: mpsc::Receiver<Bytes>,
    inbound_tx: mpsc::Sender<TransportEvent>,
}

impl MockTransportHandle {
    /// Wait for the next chunk the engine sent.
    ///
    /// Returns `None` once the transport has been dropped and all captured
    /// chunks are consumed.
    pub async fn next_sent(&mut self) -> Option<Bytes> {
        self.sent_rx.recv().await
    }

    /// Take the next sent chunk if one is already captured.
    pub fn try_next_sent(&mut self) -> Option<Bytes> {
        self.sent_rx.try_recv().ok()
    }

    /// Inject inbound bytes, as if received from the reader.
    pub async fn inject(&mut self, bytes: &[u8]) {
        let _ = self
            .inbound_tx
            .send(TransportEvent::Data(Bytes::copy_from_slice(bytes)))
            .await;
    }

    /// Signal an unsolicited transport disconnect.
    pub async fn disconnect(&mut self) {
        let _ = self.inbound_tx.send(TransportEvent::Disconnected).await;
    }
}
