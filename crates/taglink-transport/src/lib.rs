//! Transport adapter boundary for the taglink engine.
//!
//! The engine treats its wireless link as an opaque duplex byte channel:
//! bytes go out through [`Transport::send`], bytes and disconnect signals
//! come in as a stream of [`TransportEvent`]s. The host guarantees ordering
//! in both directions; the engine makes no MTU assumptions and reassembles
//! frames regardless of fragment size. The MTU is exposed for diagnostics
//! only.
//!
//! The trait declares its send future as `Send`-bounded RPITIT (Edition
//! 2024), so implementations write plain `async fn` bodies and the engine
//! can still be moved into a spawned task. Implementations are used through
//! generics rather than trait objects.
//!
//! [`MockTransport`] provides an in-memory implementation for development
//! and tests, following the device/handle pair pattern: the transport side
//! goes to the engine, the handle side stays with the test to capture
//! outbound bytes and inject inbound traffic.

pub mod mock;
pub mod traits;

pub use mock::{MockTransport, MockTransportHandle};
pub use traits::{Transport, TransportEvent};
