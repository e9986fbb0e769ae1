//! Transport collaborator contract.
//!
//! The transport owns the companion process and the raw byte framing; this
//! crate only consumes it. Outbound, sending is fire-and-forget. Inbound,
//! the transport delivers whole frames and a termination signal through
//! the event channel handed to [`NativeTransport::launch`]; the client
//! re-dispatches those events onto its own task before touching any state.
//!
//! Frames may arrive in any order relative to the requests that caused
//! them; nothing in this contract implies ordering.

use thiserror::Error;
use tokio::sync::mpsc;

/// Errors from the transport collaborator
#[derive(Debug, Error)]
pub enum TransportError {
    /// The companion process could not be launched
    #[error("Failed to launch the companion process: {0}")]
    LaunchFailed(String),

    /// Send was called without a live process
    #[error("The transport is not connected")]
    NotConnected,

    /// Writing a frame to the companion process failed
    #[error("Writing to the companion process failed: {0}")]
    SendFailed(String),
}

/// Inbound signals from the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// A whole message frame arrived
    Message(Vec<u8>),
    /// The companion process exited or the channel broke
    Terminated,
}

/// Sender half the transport uses to deliver inbound events
pub type TransportEvents = mpsc::UnboundedSender<TransportEvent>;

/// A launchable byte channel to the companion process.
pub trait NativeTransport: Send {
    /// Start the companion process and begin delivering events.
    ///
    /// Launching an already-launched transport restarts it.
    fn launch(&mut self, events: TransportEvents) -> Result<(), TransportError>;

    /// Kill the companion process. Idempotent; no events are delivered
    /// after termination returns.
    fn terminate(&mut self);

    /// Queue one frame for delivery. Fire-and-forget; delivery failures
    /// beyond the local write surface as [`TransportEvent::Terminated`].
    fn send(&mut self, bytes: Vec<u8>) -> Result<(), TransportError>;
}
