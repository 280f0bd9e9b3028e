use std::future::Future;

use bytes::Bytes;
use taglink_core::Result;

/// Inbound traffic from the duplex channel.
///
/// Everything crossing this boundary is owned data; the transport and the
/// engine never share mutable state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// A chunk of received bytes. Chunk boundaries carry no meaning: a
    /// chunk may hold part of a frame, one frame, or several.
    Data(Bytes),

    /// The channel was lost. Fatal to the current session.
    Disconnected,
}

/// Duplex byte channel to the reader hardware.
///
/// Implementations wrap whatever radio or link the host provides. Inbound
/// bytes are delivered separately, through the `mpsc::Receiver<TransportEvent>`
/// handed to the engine alongside the transport.
///
/// The send future is declared `Send` explicitly so the engine can run
/// inside a spawned task; implementations still just write `async fn send`.
pub trait Transport: Send {
    /// Send bytes to the reader.
    ///
    /// Fire-and-forget: the host guarantees ordering, and delivery failure
    /// surfaces as a transport error.
    ///
    /// # Errors
    ///
    /// Returns an error if the channel is closed or the link rejects the
    /// write.
    fn send(&mut self, bytes: &[u8]) -> impl Future<Output = Result<()>> + Send;

    /// Maximum transmission unit of the underlying link, in bytes.
    ///
    /// Used only for diagnostics and logging; framing never depends on it.
    fn mtu(&self) -> usize;
}
