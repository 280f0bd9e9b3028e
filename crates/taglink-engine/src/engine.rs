//! The reader engine: connection lifecycle, mode transitions, and the
//! inbound notification path.
//!
//! The engine is single-threaded and synchronous except for the sequencer's
//! bounded response waits. Inbound frames are routed in arrival order; a
//! frame completing reassembly is handled before the next chunk of bytes is
//! consumed, which preserves causal order between commands and their
//! responses.
//!
//! Session ownership is explicit: `connect` creates the session, every
//! disconnect path destroys it, and a second `connect` while a session is
//! live fails fast with a protocol-state error.

use std::sync::{Arc, Mutex, PoisonError};

use chrono::Utc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

use taglink_core::{ConnectionState, Error, ReaderMode, ReaderSettings, Result};
use taglink_protocol::{EventCode, Frame, FrameAssembler, InventoryParser};
use taglink_transport::{Transport, TransportEvent};

use crate::{
    config::EngineConfig,
    events::EngineEvent,
    locate::LocateSmoother,
    router::{self, HandlerKind},
    sequencer::{CommandSequencer, SequenceError, SequenceReport},
    sequences::{self, Command},
    session::ReaderSession,
};

/// Slot holding the cancellation token of the in-flight sequence.
///
/// The handle cancels through this slot; the engine installs a fresh token
/// at the start of every sequence so cancellation never outlives the
/// sequence it targeted.
pub(crate) type CancelSlot = Arc<Mutex<CancellationToken>>;

fn set_token(slot: &CancelSlot, token: CancellationToken) {
    *slot.lock().unwrap_or_else(PoisonError::into_inner) = token;
}

pub(crate) fn cancel_current(slot: &CancelSlot) {
    slot.lock()
        .unwrap_or_else(PoisonError::into_inner)
        .cancel();
}

/// The protocol engine for one reader.
///
/// Intents come in through the async methods; typed [`EngineEvent`]s go out
/// through the channel supplied at construction. Methods that run command
/// sequences borrow the inbound transport stream so responses can be
/// awaited while other notifications keep their arrival order.
pub struct ReaderEngine<T: Transport> {
    transport: T,
    events: mpsc::Sender<EngineEvent>,
    config: EngineConfig,
    assembler: FrameAssembler,
    parser: InventoryParser,
    smoother: LocateSmoother,
    session: Option<ReaderSession>,
    next_seq: u8,
    frames_since_health: u32,
    cancel_slot: CancelSlot,
}

impl<T: Transport> ReaderEngine<T> {
    pub fn new(transport: T, events: mpsc::Sender<EngineEvent>, config: EngineConfig) -> Self {
        debug!(mtu = transport.mtu(), "creating reader engine");
        Self {
            assembler: FrameAssembler::with_timeout(config.fragment_timeout),
            parser: InventoryParser::with_capacity(config.scratch_capacity),
            smoother: LocateSmoother::new(config.rssi_history_depth, config.locate_emit_interval),
            transport,
            events,
            config,
            session: None,
            next_seq: 0,
            frames_since_health: 0,
            cancel_slot: Arc::new(Mutex::new(CancellationToken::new())),
        }
    }

    /// Shared slot the handle uses to cancel the in-flight sequence.
    pub(crate) fn cancel_slot(&self) -> CancelSlot {
        Arc::clone(&self.cancel_slot)
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        self.session
            .as_ref()
            .map_or(ConnectionState::Disconnected, |s| s.state())
    }

    /// Current mode; `None` while not connected.
    pub fn mode(&self) -> Option<ReaderMode> {
        self.session.as_ref().and_then(|s| s.mode())
    }

    pub fn is_scanning(&self) -> bool {
        self.session.as_ref().is_some_and(|s| s.is_scanning())
    }

    /// Identifier of the live session, if any.
    pub fn session_id(&self) -> Option<Uuid> {
        self.session.as_ref().map(|s| s.id())
    }

    /// Establish a session: `Disconnected -> Connecting -> Connected`.
    ///
    /// # Errors
    /// - `Error::SessionActive` if a session already exists
    /// - the failing command's error if the connect sequence fails; the
    ///   engine is back in `Disconnected` when that happens
    pub async fn connect(
        &mut self,
        inbound: &mut mpsc::Receiver<TransportEvent>,
    ) -> Result<()> {
        if self.session.is_some() {
            return Err(Error::SessionActive);
        }

        let mut session = ReaderSession::new(ReaderSettings::default());
        session.set_state(ConnectionState::Connecting)?;
        info!(session = %session.id(), "connecting");
        self.session = Some(session);
        self.emit(EngineEvent::StateChanged {
            state: ConnectionState::Connecting,
        })
        .await;

        match self.run_sequence(inbound, &sequences::connect_sequence()).await {
            Ok(_) => {
                if let Some(session) = self.session.as_mut() {
                    session.set_state(ConnectionState::Connected)?;
                    session.set_mode(ReaderMode::Idle)?;
                    info!(session = %session.id(), "connected");
                }
                self.emit(EngineEvent::StateChanged {
                    state: ConnectionState::Connected,
                })
                .await;
                self.emit(EngineEvent::ModeChanged {
                    mode: ReaderMode::Idle,
                })
                .await;
                Ok(())
            }
            Err(error) => {
                warn!(error = %error, "connect sequence failed");
                // A failed connect always lands back in Disconnected
                let fatal = error.is_fatal();
                self.teardown_session().await;
                if fatal {
                    self.emit(EngineEvent::TransportDisconnected).await;
                }
                Err(error.into_error())
            }
        }
    }

    /// Tear the session down on request.
    ///
    /// If scanning is active it is stopped first on a best-effort basis;
    /// the state is forced to `Disconnected` whether or not that stop
    /// succeeded.
    pub async fn disconnect(
        &mut self,
        inbound: &mut mpsc::Receiver<TransportEvent>,
    ) -> Result<()> {
        let Some(session) = &self.session else {
            return Err(Error::NoSession);
        };

        let stop = session
            .mode()
            .filter(|_| session.is_scanning())
            .and_then(sequences::stop_scan_command);

        if let Some(command) = stop {
            info!("stopping active scan before disconnect");
            if let Err(error) = self.run_sequence(inbound, &[command]).await {
                warn!(error = %error, "best-effort stop-scan failed, disconnecting anyway");
            }
        }

        self.teardown_session().await;
        Ok(())
    }

    /// Change the operating mode, always via the idle waypoint.
    ///
    /// On a mid-transition failure the mode is recorded as `Idle` rather
    /// than silently keeping the old mode, so the engine's view never
    /// disagrees with hardware that is part-way reconfigured.
    pub async fn set_mode(
        &mut self,
        mode: ReaderMode,
        settings: Option<ReaderSettings>,
        inbound: &mut mpsc::Receiver<TransportEvent>,
    ) -> Result<()> {
        let session = self.session.as_mut().ok_or(Error::NoSession)?;
        if !session.state().is_connected() {
            return Err(Error::NotConnected);
        }
        if let Some(new) = settings {
            new.validate()?;
            session.set_settings(new);
        }
        let commands = sequences::transition_sequence(mode, session.settings())?;

        match self.run_sequence(inbound, &commands).await {
            Ok(_) => {
                if let Some(session) = self.session.as_mut() {
                    session.set_mode(mode)?;
                }
                self.smoother.reset();
                info!(%mode, "mode changed");
                self.emit(EngineEvent::ModeChanged { mode }).await;
                Ok(())
            }
            Err(error) => {
                warn!(%mode, error = %error, "mode transition failed");
                if error.is_fatal() {
                    return Err(self.fail_sequence(error).await);
                }
                // The idle step may or may not have completed; Idle is the
                // only honest answer either way.
                if let Some(session) = self.session.as_mut() {
                    session.set_mode(ReaderMode::Idle)?;
                }
                self.smoother.reset();
                self.emit(EngineEvent::ModeChanged {
                    mode: ReaderMode::Idle,
                })
                .await;
                Err(error.into_error())
            }
        }
    }

    /// Update settings, reapplying the current mode's configuration when a
    /// non-idle mode is active.
    pub async fn set_settings(
        &mut self,
        settings: ReaderSettings,
        inbound: &mut mpsc::Receiver<TransportEvent>,
    ) -> Result<()> {
        settings.validate()?;
        let session = self.session.as_mut().ok_or(Error::NoSession)?;
        let active_mode = session.mode().filter(|m| *m != ReaderMode::Idle);
        session.set_settings(settings);

        match active_mode {
            // Reconfiguration goes through the same idle-first transition
            Some(mode) => self.set_mode(mode, None, inbound).await,
            None => Ok(()),
        }
    }

    /// Start the current mode's scan stream.
    pub async fn start_scanning(
        &mut self,
        inbound: &mut mpsc::Receiver<TransportEvent>,
    ) -> Result<()> {
        let session = self.session.as_ref().ok_or(Error::NoSession)?;
        if !session.state().is_connected() {
            return Err(Error::NotConnected);
        }
        if session.is_scanning() {
            debug!("scan already active");
            return Ok(());
        }
        let mode = session.mode().ok_or(Error::NotConnected)?;
        let command = sequences::start_scan_command(mode)
            .ok_or_else(|| Error::Config(format!("{mode} mode does not scan")))?;

        match self.run_sequence(inbound, &[command]).await {
            Ok(_) => {
                if let Some(session) = self.session.as_mut() {
                    session.set_scanning(true);
                }
                info!(%mode, "scanning started");
                Ok(())
            }
            Err(error) => Err(self.fail_sequence(error).await),
        }
    }

    /// Stop the current mode's scan stream.
    pub async fn stop_scanning(
        &mut self,
        inbound: &mut mpsc::Receiver<TransportEvent>,
    ) -> Result<()> {
        let session = self.session.as_ref().ok_or(Error::NoSession)?;
        if !session.is_scanning() {
            debug!("no scan active");
            return Ok(());
        }
        let mode = session.mode().ok_or(Error::NotConnected)?;
        let command = sequences::stop_scan_command(mode)
            .ok_or_else(|| Error::Config(format!("{mode} mode does not scan")))?;

        match self.run_sequence(inbound, &[command]).await {
            Ok(_) => {
                if let Some(session) = self.session.as_mut() {
                    session.set_scanning(false);
                }
                info!(%mode, "scanning stopped");
                Ok(())
            }
            Err(error) => Err(self.fail_sequence(error).await),
        }
    }

    /// Feed raw transport bytes outside of a sequence.
    pub async fn ingest(&mut self, bytes: &[u8]) {
        for result in self.assembler.ingest(bytes) {
            match result {
                Ok(frame) => self.route_frame(frame).await,
                // Frame-level errors drop the single frame and move on
                Err(error) => debug!(error = %error, "dropping invalid frame"),
            }
        }
    }

    /// Handle an unsolicited transport disconnect.
    ///
    /// Unlike a requested disconnect this also emits
    /// [`EngineEvent::TransportDisconnected`], telling the owning
    /// coordinator to tear down and recreate the whole session.
    pub async fn transport_lost(&mut self) {
        if self.session.is_none() {
            trace!("transport disconnect with no session, ignoring");
            return;
        }
        warn!("transport disconnected unexpectedly");
        self.teardown_session().await;
        self.emit(EngineEvent::TransportDisconnected).await;
    }

    async fn run_sequence(
        &mut self,
        inbound: &mut mpsc::Receiver<TransportEvent>,
        commands: &[Command],
    ) -> std::result::Result<SequenceReport, SequenceError> {
        let cancel = CancellationToken::new();
        set_token(&self.cancel_slot, cancel.clone());

        let mut sequencer = CommandSequencer::new(
            &mut self.transport,
            inbound,
            &mut self.assembler,
            &mut self.next_seq,
            &self.config,
            cancel,
        );
        let result = sequencer.run(commands).await;

        // Notifications that arrived during the sequence are routed now, in
        // arrival order.
        for frame in sequencer.into_deferred() {
            self.route_frame(frame).await;
        }
        result
    }

    /// Common failure path for sequences: fatal errors end the session.
    async fn fail_sequence(&mut self, error: SequenceError) -> Error {
        if error.is_fatal() {
            self.teardown_session().await;
            self.emit(EngineEvent::TransportDisconnected).await;
        }
        error.into_error()
    }

    async fn teardown_session(&mut self) {
        if let Some(mut session) = self.session.take() {
            session.force_disconnected();
            info!(session = %session.id(), "session destroyed");
        }
        self.smoother.reset();
        self.assembler.clear();
        self.frames_since_health = 0;
        self.emit(EngineEvent::StateChanged {
            state: ConnectionState::Disconnected,
        })
        .await;
    }

    async fn route_frame(&mut self, frame: Frame) {
        let Ok(code) = EventCode::from_u16(frame.event_code) else {
            trace!(code = frame.event_code, "unregistered event code, ignoring");
            return;
        };
        if !frame.is_notification() {
            trace!(%code, "stray non-notification frame, ignoring");
            return;
        }
        let mode = self
            .session
            .as_ref()
            .filter(|s| s.state().is_connected())
            .and_then(|s| s.mode());
        let Some(mode) = mode else {
            trace!(%code, "notification with no active mode, ignoring");
            return;
        };
        let Some(handler) = router::select_handler(code, mode) else {
            trace!(%code, %mode, "no handler registered, ignoring");
            return;
        };

        match handler {
            HandlerKind::InventoryReport => {
                match self.parser.parse(frame.payload(), frame.reserve) {
                    Ok(tags) if !tags.is_empty() => {
                        self.emit(EngineEvent::TagRead {
                            tags,
                            timestamp: Utc::now(),
                        })
                        .await;
                    }
                    Ok(_) => {}
                    Err(error) => self.emit_parse_error(error, &frame).await,
                }
                self.health_tick().await;
            }
            HandlerKind::LocateReport => {
                match self.parser.parse(frame.payload(), frame.reserve) {
                    Ok(tags) => {
                        let update = LocateSmoother::strongest(&tags)
                            .and_then(|strongest| self.smoother.observe(strongest));
                        if let Some(update) = update {
                            self.emit(EngineEvent::LocateUpdate(update)).await;
                        }
                    }
                    Err(error) => self.emit_parse_error(error, &frame).await,
                }
                self.health_tick().await;
            }
            HandlerKind::BarcodeScan => match router::decode_barcode(frame.payload()) {
                Ok(data) => {
                    self.emit(EngineEvent::BarcodeScanned {
                        data,
                        timestamp: Utc::now(),
                    })
                    .await;
                }
                Err(error) => self.emit_parse_error(error, &frame).await,
            },
            HandlerKind::Trigger => match router::decode_trigger(frame.payload()) {
                Ok(pressed) => {
                    self.emit(EngineEvent::TriggerChanged { pressed }).await;
                }
                Err(error) => self.emit_parse_error(error, &frame).await,
            },
            HandlerKind::Battery => match router::decode_battery(frame.payload()) {
                Ok(percent) => {
                    self.emit(EngineEvent::BatteryLevel { percent }).await;
                }
                Err(error) => self.emit_parse_error(error, &frame).await,
            },
        }
    }

    /// Periodic scratch-buffer health check, paced by parsed frames.
    async fn health_tick(&mut self) {
        self.frames_since_health += 1;
        if self.frames_since_health < self.config.health_check_frames {
            return;
        }
        self.frames_since_health = 0;

        let health = self.parser.health_check();
        let utilization = health.utilization_percent();
        if utilization > self.config.pressure_threshold_percent {
            warn!(
                utilization,
                used = health.used,
                capacity = health.capacity,
                "parser scratch buffer under pressure"
            );
            self.emit(EngineEvent::BufferWarning {
                utilization_percent: utilization,
                used: health.used,
                capacity: health.capacity,
            })
            .await;
        }
    }

    async fn emit_parse_error(&self, error: Error, frame: &Frame) {
        warn!(error = %error, frame = %frame, "payload parse error");
        self.emit(EngineEvent::ParseError {
            message: error.to_string(),
            event_code: frame.event_code,
            sequence: frame.reserve,
        })
        .await;
    }

    async fn emit(&self, event: EngineEvent) {
        if self.events.send(event).await.is_err() {
            trace!("event receiver dropped");
        }
    }
}
