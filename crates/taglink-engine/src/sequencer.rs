//! Ordered command execution with response matching.
//!
//! The sequencer owns the one place the engine logically blocks: after each
//! command goes out, it waits (bounded) for the reader's response before
//! advancing. No second command is ever in flight, so command/response
//! pairing needs no locks, only the sequence byte.
//!
//! Notifications that arrive while a response is pending are deferred in
//! arrival order and handed back to the engine for routing once the
//! sequence settles.

use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use taglink_core::{Error, constants::STATUS_OK};
use taglink_protocol::{Frame, FrameAssembler, FrameBuilder};
use taglink_transport::{Transport, TransportEvent};

use crate::{config::EngineConfig, sequences::Command};

/// Outcome counters for a completed sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SequenceReport {
    /// Total send attempts, retries included.
    pub commands_sent: u32,
}

/// Why a sequence stopped early.
#[derive(Debug, Error)]
pub enum SequenceError {
    /// A command exhausted its attempts; the sequence aborted here.
    #[error("command {index} ({event}) failed: {source}")]
    CommandFailed {
        index: usize,
        event: &'static str,
        #[source]
        source: Error,
    },

    /// The sequence was cancelled before this command completed.
    #[error("sequence cancelled at command {index}")]
    Cancelled { index: usize },
}

impl SequenceError {
    /// Returns `true` when the underlying failure ends the session.
    pub fn is_fatal(&self) -> bool {
        matches!(self, SequenceError::CommandFailed { source, .. } if source.is_fatal())
    }

    /// Collapse into the engine-level error surfaced to the caller.
    pub fn into_error(self) -> Error {
        match self {
            SequenceError::CommandFailed { source, .. } => source,
            SequenceError::Cancelled { .. } => Error::SequenceCancelled,
        }
    }
}

/// Executes one [`Command`] list against the transport.
///
/// Borrows the engine's transport, inbound stream, and frame assembler for
/// the duration of the sequence; [`into_deferred`](Self::into_deferred)
/// releases them and returns the notifications collected along the way.
pub struct CommandSequencer<'a, T: Transport> {
    transport: &'a mut T,
    inbound: &'a mut mpsc::Receiver<TransportEvent>,
    assembler: &'a mut FrameAssembler,
    next_seq: &'a mut u8,
    config: &'a EngineConfig,
    cancel: CancellationToken,
    deferred: Vec<Frame>,
    sent: u32,
}

impl<'a, T: Transport> CommandSequencer<'a, T> {
    pub fn new(
        transport: &'a mut T,
        inbound: &'a mut mpsc::Receiver<TransportEvent>,
        assembler: &'a mut FrameAssembler,
        next_seq: &'a mut u8,
        config: &'a EngineConfig,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            transport,
            inbound,
            assembler,
            next_seq,
            config,
            cancel,
            deferred: Vec::new(),
            sent: 0,
        }
    }

    /// Run the commands strictly in order.
    ///
    /// A flagged command is retried up to the configured budget; an
    /// unflagged failure aborts the whole sequence, reporting which command
    /// failed.
    pub async fn run(
        &mut self,
        commands: &[Command],
    ) -> std::result::Result<SequenceReport, SequenceError> {
        for (index, command) in commands.iter().enumerate() {
            if self.cancel.is_cancelled() {
                return Err(SequenceError::Cancelled { index });
            }
            self.run_command(index, command).await?;
        }
        Ok(SequenceReport {
            commands_sent: self.sent,
        })
    }

    /// Notifications received while waiting for responses, arrival order.
    pub fn into_deferred(self) -> Vec<Frame> {
        self.deferred
    }

    async fn run_command(
        &mut self,
        index: usize,
        command: &Command,
    ) -> std::result::Result<(), SequenceError> {
        let failed = |source: Error| SequenceError::CommandFailed {
            index,
            event: command.event.name(),
            source,
        };

        let mut attempts: u32 = 0;
        loop {
            attempts += 1;
            let seq = self.bump_seq();
            let frame = FrameBuilder::command(command.event)
                .sequence(seq)
                .payload(command.payload.clone())
                .build()
                .map_err(failed)?;

            debug!(
                event = command.event.name(),
                seq,
                attempt = attempts,
                "sending command"
            );
            self.sent += 1;
            self.transport.send(&frame.encode()).await.map_err(failed)?;

            match self.await_response(command, seq).await {
                Ok(()) => return Ok(()),
                Err(Error::SequenceCancelled) => {
                    return Err(SequenceError::Cancelled { index });
                }
                Err(source) if source.is_fatal() => return Err(failed(source)),
                Err(source)
                    if command.retry_on_error
                        && attempts <= self.config.command_retries as u32 =>
                {
                    warn!(
                        event = command.event.name(),
                        error = %source,
                        attempt = attempts,
                        "command failed, retrying"
                    );
                }
                Err(source) => return Err(failed(source)),
            }
        }
    }

    /// Block (bounded) until the matching response arrives.
    ///
    /// A response matches on direction, event code, and echoed sequence
    /// byte. Everything else completing during the wait is deferred; frame
    /// decode errors are logged and dropped per the frame-error policy.
    async fn await_response(&mut self, command: &Command, seq: u8) -> Result<(), Error> {
        let cancel = self.cancel.clone();
        let expected_code = command.event.to_u16();

        let wait = async {
            loop {
                let event = tokio::select! {
                    _ = cancel.cancelled() => return Err(Error::SequenceCancelled),
                    event = self.inbound.recv() => event,
                };

                let bytes = match event {
                    None => return Err(Error::ChannelClosed),
                    Some(TransportEvent::Disconnected) => {
                        return Err(Error::Transport(
                            "connection lost while awaiting response".to_string(),
                        ));
                    }
                    Some(TransportEvent::Data(bytes)) => bytes,
                };

                for result in self.assembler.ingest(&bytes) {
                    let frame = match result {
                        Ok(frame) => frame,
                        Err(e) => {
                            warn!(error = %e, "dropping invalid frame during sequence");
                            continue;
                        }
                    };

                    if frame.is_response()
                        && frame.event_code == expected_code
                        && frame.reserve == seq
                    {
                        return match frame.status() {
                            Some(STATUS_OK) => Ok(()),
                            Some(status) => Err(Error::CommandRejected {
                                event: command.event.name(),
                                status,
                            }),
                            None => Err(Error::InvalidPayload {
                                event: command.event.name(),
                                reason: "response missing status byte".to_string(),
                            }),
                        };
                    }
                    self.deferred.push(frame);
                }
            }
        };

        match tokio::time::timeout(self.config.response_timeout, wait).await {
            Ok(result) => result,
            Err(_) => Err(Error::ResponseTimeout {
                event: command.event.name(),
                timeout_ms: self.config.response_timeout.as_millis() as u64,
            }),
        }
    }

    fn bump_seq(&mut self) -> u8 {
        *self.next_seq = self.next_seq.wrapping_add(1);
        *self.next_seq
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use taglink_protocol::{EventCode, status_response};
    use taglink_transport::{MockTransport, MockTransportHandle};

    struct Rig {
        transport: MockTransport,
        inbound: mpsc::Receiver<TransportEvent>,
        handle: MockTransportHandle,
        assembler: FrameAssembler,
        next_seq: u8,
        config: EngineConfig,
    }

    impl Rig {
        fn new() -> Self {
            let (transport, inbound, handle) = MockTransport::new();
            Self {
                transport,
                inbound,
                handle,
                assembler: FrameAssembler::new(),
                next_seq: 0,
                config: EngineConfig::default(),
            }
        }
    }

    /// Reader side: answer each captured command with the given statuses,
    /// one per send, then stop.
    fn respond_with(mut handle: MockTransportHandle, statuses: Vec<u8>) {
        tokio::spawn(async move {
            for status in statuses {
                let sent = handle.next_sent().await.unwrap();
                let frame = Frame::decode(&sent).unwrap();
                let code = EventCode::from_u16(frame.event_code).unwrap();
                let response = status_response(code, frame.reserve, status);
                handle.inject(&response.encode()).await;
            }
        });
    }

    #[tokio::test]
    async fn test_sequence_completes_in_order() {
        let mut rig = Rig::new();
        respond_with(rig.handle, vec![STATUS_OK, STATUS_OK]);

        let commands = vec![
            Command::new(EventCode::SetIdle),
            Command::new(EventCode::GetBattery),
        ];

        let mut sequencer = CommandSequencer::new(
            &mut rig.transport,
            &mut rig.inbound,
            &mut rig.assembler,
            &mut rig.next_seq,
            &rig.config,
            CancellationToken::new(),
        );

        let report = sequencer.run(&commands).await.unwrap();
        assert_eq!(report.commands_sent, 2);
        assert!(sequencer.into_deferred().is_empty());
    }

    #[tokio::test]
    async fn test_retry_flagged_command_succeeds_on_second_send() {
        let mut rig = Rig::new();
        // First attempt rejected, retry accepted
        respond_with(rig.handle, vec![0x05, STATUS_OK]);

        // SetIdle is flagged retry-on-error in the registry
        let commands = vec![Command::new(EventCode::SetIdle)];

        let mut sequencer = CommandSequencer::new(
            &mut rig.transport,
            &mut rig.inbound,
            &mut rig.assembler,
            &mut rig.next_seq,
            &rig.config,
            CancellationToken::new(),
        );

        let report = sequencer.run(&commands).await.unwrap();
        assert_eq!(report.commands_sent, 2);
    }

    #[tokio::test]
    async fn test_unflagged_command_aborts_sequence() {
        let mut rig = Rig::new();
        respond_with(rig.handle, vec![0x05]);

        // StartInventory is not retryable
        let commands = vec![
            Command::new(EventCode::StartInventory),
            Command::new(EventCode::GetBattery),
        ];

        let mut sequencer = CommandSequencer::new(
            &mut rig.transport,
            &mut rig.inbound,
            &mut rig.assembler,
            &mut rig.next_seq,
            &rig.config,
            CancellationToken::new(),
        );

        let error = sequencer.run(&commands).await.unwrap_err();
        match error {
            SequenceError::CommandFailed { index, event, source } => {
                assert_eq!(index, 0);
                assert_eq!(event, "start-inventory");
                assert!(matches!(source, Error::CommandRejected { status: 0x05, .. }));
            }
            other => panic!("expected CommandFailed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_retry_budget_is_bounded() {
        let mut rig = Rig::new();
        // Always reject: 1 initial + 2 retries = 3 sends, then abort
        respond_with(rig.handle, vec![0x05, 0x05, 0x05, 0x05]);

        let commands = vec![Command::new(EventCode::SetIdle)];

        let mut sequencer = CommandSequencer::new(
            &mut rig.transport,
            &mut rig.inbound,
            &mut rig.assembler,
            &mut rig.next_seq,
            &rig.config,
            CancellationToken::new(),
        );

        let error = sequencer.run(&commands).await.unwrap_err();
        assert!(matches!(error, SequenceError::CommandFailed { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_response_times_out() {
        let mut rig = Rig::new();
        // No responder: the command goes unanswered

        let commands = vec![Command::new(EventCode::StartInventory)];

        let mut sequencer = CommandSequencer::new(
            &mut rig.transport,
            &mut rig.inbound,
            &mut rig.assembler,
            &mut rig.next_seq,
            &rig.config,
            CancellationToken::new(),
        );

        let error = sequencer.run(&commands).await.unwrap_err();
        match error {
            SequenceError::CommandFailed { source, .. } => {
                assert!(matches!(source, Error::ResponseTimeout { .. }));
            }
            other => panic!("expected timeout, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_notifications_during_wait_are_deferred() {
        let mut rig = Rig::new();

        let keepalive = FrameBuilder::notification(EventCode::KeepAlive)
            .sequence(9)
            .build()
            .unwrap();

        // Reader interleaves a notification before the response
        let mut handle = rig.handle;
        tokio::spawn(async move {
            let sent = handle.next_sent().await.unwrap();
            let frame = Frame::decode(&sent).unwrap();
            handle.inject(&keepalive.encode()).await;
            let response =
                status_response(EventCode::SetIdle, frame.reserve, STATUS_OK);
            handle.inject(&response.encode()).await;
        });

        let commands = vec![Command::new(EventCode::SetIdle)];

        let mut sequencer = CommandSequencer::new(
            &mut rig.transport,
            &mut rig.inbound,
            &mut rig.assembler,
            &mut rig.next_seq,
            &rig.config,
            CancellationToken::new(),
        );

        sequencer.run(&commands).await.unwrap();

        let deferred = sequencer.into_deferred();
        assert_eq!(deferred.len(), 1);
        assert_eq!(deferred[0].event_code, EventCode::KeepAlive.to_u16());
    }

    #[tokio::test]
    async fn test_pre_cancelled_sequence_does_not_send() {
        let mut rig = Rig::new();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let commands = vec![Command::new(EventCode::SetIdle)];

        let mut sequencer = CommandSequencer::new(
            &mut rig.transport,
            &mut rig.inbound,
            &mut rig.assembler,
            &mut rig.next_seq,
            &rig.config,
            cancel,
        );

        let error = sequencer.run(&commands).await.unwrap_err();
        assert!(matches!(error, SequenceError::Cancelled { index: 0 }));
        assert!(rig.handle.try_next_sent().is_none());
    }

    #[tokio::test]
    async fn test_cancellation_during_wait() {
        let mut rig = Rig::new();
        let cancel = CancellationToken::new();

        // Cancel once the command hits the wire, never respond
        let canceller = cancel.clone();
        let mut handle = rig.handle;
        tokio::spawn(async move {
            let _ = handle.next_sent().await.unwrap();
            canceller.cancel();
            // Keep the handle alive so the transport stays open
            let _ = handle.next_sent().await;
        });

        let commands = vec![Command::new(EventCode::SetIdle)];

        let mut sequencer = CommandSequencer::new(
            &mut rig.transport,
            &mut rig.inbound,
            &mut rig.assembler,
            &mut rig.next_seq,
            &rig.config,
            cancel,
        );

        let error = sequencer.run(&commands).await.unwrap_err();
        assert!(matches!(error, SequenceError::Cancelled { index: 0 }));
    }

    #[tokio::test]
    async fn test_transport_disconnect_is_fatal() {
        let mut rig = Rig::new();

        let mut handle = rig.handle;
        tokio::spawn(async move {
            let _ = handle.next_sent().await.unwrap();
            handle.disconnect().await;
            let _ = handle.next_sent().await;
        });

        // Even a retryable command must not retry across a dead transport
        let commands = vec![Command::new(EventCode::SetIdle)];

        let mut sequencer = CommandSequencer::new(
            &mut rig.transport,
            &mut rig.inbound,
            &mut rig.assembler,
            &mut rig.next_seq,
            &rig.config,
            CancellationToken::new(),
        );

        let error = sequencer.run(&commands).await.unwrap_err();
        assert!(error.is_fatal());
    }

    #[tokio::test]
    async fn test_stale_response_is_not_matched() {
        let mut rig = Rig::new();

        let mut handle = rig.handle;
        tokio::spawn(async move {
            let sent = handle.next_sent().await.unwrap();
            let frame = Frame::decode(&sent).unwrap();
            // Response with the wrong sequence byte first, then the real one
            let stale =
                status_response(EventCode::SetIdle, frame.reserve.wrapping_add(100), STATUS_OK);
            handle.inject(&stale.encode()).await;
            let real = status_response(EventCode::SetIdle, frame.reserve, STATUS_OK);
            handle.inject(&real.encode()).await;
        });

        let commands = vec![Command::new(EventCode::SetIdle)];

        let mut sequencer = CommandSequencer::new(
            &mut rig.transport,
            &mut rig.inbound,
            &mut rig.assembler,
            &mut rig.next_seq,
            &rig.config,
            CancellationToken::new(),
        );

        let report = sequencer.run(&commands).await.unwrap();
        assert_eq!(report.commands_sent, 1);

        // The stale response was deferred, not consumed
        assert_eq!(sequencer.into_deferred().len(), 1);
    }
}
