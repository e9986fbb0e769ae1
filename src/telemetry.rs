//! Fire-and-forget failure reporting.
//!
//! The client reports notable failures as discrete events; what happens to
//! them (metrics pipeline, debug pixels, nothing) is up to the host
//! application. Reporting must never block and has no return channel.

/// Reportable events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TelemetryEvent {
    /// The companion transport failed to launch
    TransportLaunchFailed,
    /// The persisted shared key could not be installed
    SharedKeyInjectionFailed,
    /// The user rejected the handshake
    HandshakeRejected,
    /// The wrapped shared key failed to decrypt
    DecryptionOfSharedKeyFailed,
    /// Persisting the shared key failed
    StoringOfSharedKeyFailed,
    /// A response failed MAC verification
    HmacMismatch,
    /// A response failed to decrypt
    DecryptionFailed,
    /// An inbound message could not be parsed
    ParsingFailed,
    /// A status response had no single active vault
    NoActiveVault,
    /// A command could not be built or sent
    SendingFailed,
    /// Credential retrieval failed
    CredentialRetrievalFailed,
    /// Credential creation failed
    CredentialCreationFailed,
    /// Credential update failed
    CredentialUpdateFailed,
    /// A status response item was missing mandatory fields
    StatusParsingFailed,
    /// The companion app could not decrypt our command
    RespondedCannotDecrypt,
    /// The companion app reported an unclassified error string
    RespondedWithUnknownError,
    /// No status response arrived within the response timeout
    NotResponding,
}

/// Fire-and-forget event sink.
pub trait Telemetry: Send + Sync {
    /// Report one event. Must not block.
    fn report(&self, event: TelemetryEvent);
}

/// Sink that discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopTelemetry;

impl Telemetry for NoopTelemetry {
    fn report(&self, _event: TelemetryEvent) {}
}
