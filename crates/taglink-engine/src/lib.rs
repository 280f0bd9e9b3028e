//! taglink-engine: the reader protocol engine.
//!
//! Turns an unreliable, fragment-prone byte stream from a wireless
//! transport into typed application events, and turns high-level intents
//! into correctly sequenced reader command frames.
//!
//! Data flows inward as `raw bytes -> framer -> frame -> router -> typed
//! event`, and outward as `intent -> command sequence -> frame builder ->
//! transport`. The engine core is single-threaded; the only place execution
//! logically blocks is the sequencer's bounded wait for a command response.
//!
//! Hosts either drive a [`ReaderEngine`] directly from their own task, or
//! spawn it behind an [`EngineHandle`] and communicate purely through the
//! intent/event queues.

pub mod config;
pub mod engine;
pub mod events;
pub mod handle;
pub mod locate;
pub mod router;
pub mod sequencer;
pub mod sequences;
pub mod session;

pub use config::EngineConfig;
pub use engine::ReaderEngine;
pub use events::EngineEvent;
pub use handle::EngineHandle;
pub use locate::{LocateSmoother, LocateUpdate};
pub use router::{HandlerKind, select_handler};
pub use sequencer::{CommandSequencer, SequenceError, SequenceReport};
pub use sequences::{
    Command, connect_sequence, idle_sequence, mode_config, start_scan_command, stop_scan_command,
    transition_sequence,
};
pub use session::{ReaderSession, StateChange};
