//! Message-passing boundary between the engine and its host.
//!
//! The engine core stays synchronous and single-threaded; this module is
//! the one place that spawns. Intents travel over an mpsc queue with a
//! oneshot responder each, events come back over a second queue, and all
//! data crossing either queue is owned. Intents are processed strictly one
//! at a time, so no two command sequences can ever interleave.

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::debug;

use taglink_core::{Error, ReaderMode, ReaderSettings, Result};
use taglink_transport::{Transport, TransportEvent};

use crate::{
    config::EngineConfig,
    engine::{CancelSlot, ReaderEngine, cancel_current},
    events::EngineEvent,
};

/// Queue depth for outward events.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Queue depth for host intents.
const INTENT_CHANNEL_CAPACITY: usize = 16;

/// Host intents, each carrying its reply channel.
enum Intent {
    Connect(oneshot::Sender<Result<()>>),
    Disconnect(oneshot::Sender<Result<()>>),
    SetMode(
        ReaderMode,
        Option<ReaderSettings>,
        oneshot::Sender<Result<()>>,
    ),
    SetSettings(ReaderSettings, oneshot::Sender<Result<()>>),
    StartScanning(oneshot::Sender<Result<()>>),
    StopScanning(oneshot::Sender<Result<()>>),
    Shutdown,
}

/// Host-side handle to a spawned engine.
///
/// Dropping the handle closes the intent queue and stops the engine task.
pub struct EngineHandle {
    intents: mpsc::Sender<Intent>,
    cancel_slot: CancelSlot,
    task: JoinHandle<()>,
}

impl EngineHandle {
    /// Spawn an engine task over the given transport.
    ///
    /// Returns the handle and the outward event stream.
    pub fn spawn<T: Transport + Sync + 'static>(
        transport: T,
        inbound: mpsc::Receiver<TransportEvent>,
        config: EngineConfig,
    ) -> (Self, mpsc::Receiver<EngineEvent>) {
        let (events_tx, events_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let (intents_tx, intents_rx) = mpsc::channel(INTENT_CHANNEL_CAPACITY);

        let engine = ReaderEngine::new(transport, events_tx, config);
        let cancel_slot = engine.cancel_slot();
        let task = tokio::spawn(run_loop(engine, inbound, intents_rx));

        (
            Self {
                intents: intents_tx,
                cancel_slot,
                task,
            },
            events_rx,
        )
    }

    pub async fn connect(&self) -> Result<()> {
        self.request(Intent::Connect).await
    }

    pub async fn disconnect(&self) -> Result<()> {
        self.request(Intent::Disconnect).await
    }

    pub async fn set_mode(&self, mode: ReaderMode, settings: Option<ReaderSettings>) -> Result<()> {
        self.request(|reply| Intent::SetMode(mode, settings, reply))
            .await
    }

    pub async fn set_settings(&self, settings: ReaderSettings) -> Result<()> {
        self.request(|reply| Intent::SetSettings(settings, reply))
            .await
    }

    pub async fn start_scanning(&self) -> Result<()> {
        self.request(Intent::StartScanning).await
    }

    pub async fn stop_scanning(&self) -> Result<()> {
        self.request(Intent::StopScanning).await
    }

    /// Cancel the in-flight command sequence, if any.
    ///
    /// The owning intent resolves with a cancellation error and the engine
    /// drives itself to a recoverable state.
    pub fn cancel_sequence(&self) {
        cancel_current(&self.cancel_slot);
    }

    /// Stop the engine task and wait for it to finish.
    pub async fn shutdown(self) {
        let _ = self.intents.send(Intent::Shutdown).await;
        let _ = self.task.await;
    }

    async fn request(
        &self,
        make: impl FnOnce(oneshot::Sender<Result<()>>) -> Intent,
    ) -> Result<()> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.intents
            .send(make(reply_tx))
            .await
            .map_err(|_| Error::ChannelClosed)?;
        reply_rx.await.map_err(|_| Error::ChannelClosed)?
    }
}

async fn run_loop<T: Transport>(
    mut engine: ReaderEngine<T>,
    mut inbound: mpsc::Receiver<TransportEvent>,
    mut intents: mpsc::Receiver<Intent>,
) {
    loop {
        tokio::select! {
            maybe_intent = intents.recv() => {
                match maybe_intent {
                    None | Some(Intent::Shutdown) => break,
                    Some(intent) => dispatch(&mut engine, intent, &mut inbound).await,
                }
            }
            maybe_event = inbound.recv() => {
                match maybe_event {
                    Some(TransportEvent::Data(bytes)) => engine.ingest(&bytes).await,
                    Some(TransportEvent::Disconnected) => engine.transport_lost().await,
                    None => {
                        engine.transport_lost().await;
                        break;
                    }
                }
            }
        }
    }
    debug!("engine loop stopped");
}

async fn dispatch<T: Transport>(
    engine: &mut ReaderEngine<T>,
    intent: Intent,
    inbound: &mut mpsc::Receiver<TransportEvent>,
) {
    match intent {
        Intent::Connect(reply) => {
            let _ = reply.send(engine.connect(inbound).await);
        }
        Intent::Disconnect(reply) => {
            let _ = reply.send(engine.disconnect(inbound).await);
        }
        Intent::SetMode(mode, settings, reply) => {
            let _ = reply.send(engine.set_mode(mode, settings, inbound).await);
        }
        Intent::SetSettings(settings, reply) => {
            let _ = reply.send(engine.set_settings(settings, inbound).await);
        }
        Intent::StartScanning(reply) => {
            let _ = reply.send(engine.start_scanning(inbound).await);
        }
        Intent::StopScanning(reply) => {
            let _ = reply.send(engine.stop_scanning(inbound).await);
        }
        // Handled by the run loop before dispatch
        Intent::Shutdown => {}
    }
}
