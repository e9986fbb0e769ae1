//! Error types for the vaultlink client.
//!
//! Collaborator-level failures (crypto, transport, key storage) keep their
//! own error enums and are chained into [`VaultError`] via `#[source]`, so
//! debugging tools can display the complete error context.

use thiserror::Error;

use crate::crypto::CryptoError;
use crate::storage::StorageError;
use crate::transport::TransportError;

/// Errors surfaced by the vaultlink client.
///
/// Operation completions receive these; many of them also have a
/// counterpart in [`crate::client::StatusErrorKind`] when the failure is
/// better communicated as a connection-state transition.
#[derive(Error, Debug)]
pub enum VaultError {
    /// Launching the companion transport process failed.
    #[error("Launching the companion transport failed: {0}")]
    TransportLaunchFailed(#[source] TransportError),

    /// The persisted shared key could not be installed into the session cipher.
    #[error("Installing the persisted shared key failed")]
    SharedKeyInjectionFailed,

    /// Unwrapping the negotiated shared key with the handshake private key failed.
    #[error("Decryption of the negotiated shared key failed")]
    DecryptionOfSharedKeyFailed,

    /// Persisting the negotiated shared key failed.
    #[error("Storing the shared key failed: {0}")]
    StoringOfSharedKeyFailed(#[source] StorageError),

    /// The user rejected the handshake inside the companion app.
    #[error("Handshake rejected by the companion app")]
    HandshakeRejected,

    /// A response payload failed MAC verification.
    #[error("Response payload failed HMAC verification")]
    HmacMismatch,

    /// A response payload failed to decrypt.
    #[error("Decryption of a response payload failed")]
    DecryptionFailed,

    /// An inbound message could not be parsed.
    #[error("Parsing failed: {0}")]
    ParsingFailed(String),

    /// A status response did not contain exactly one active vault.
    #[error("No active vault in status response")]
    NoActiveVault,

    /// A command could not be built or handed to the transport.
    #[error("Sending of a message failed")]
    SendingFailed,

    /// The companion app reported a credential retrieval failure.
    #[error("Credential retrieval failed")]
    CredentialRetrievalFailed,

    /// The companion app did not acknowledge a credential creation.
    #[error("Credential creation failed")]
    CredentialCreationFailed,

    /// The companion app did not acknowledge a credential update.
    #[error("Credential update failed")]
    CredentialUpdateFailed,

    /// A status response item was missing mandatory fields.
    #[error("Status response parsing failed")]
    StatusParsingFailed,

    /// The companion app reported an error string this client does not classify.
    #[error("Unclassified protocol error: {0}")]
    UnclassifiedProtocolError(String),

    /// The connection was torn down while the request was outstanding.
    #[error("Connection to the companion app was lost")]
    Disconnected,

    /// Cryptographic operation failed.
    #[error("Crypto error: {0}")]
    Crypto(#[source] CryptoError),

    /// Configuration error.
    #[error("Config error: {0}")]
    Config(String),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for vaultlink operations
pub type Result<T> = std::result::Result<T, VaultError>;

impl From<CryptoError> for VaultError {
    fn from(err: CryptoError) -> Self {
        VaultError::Crypto(err)
    }
}

impl From<toml::de::Error> for VaultError {
    fn from(err: toml::de::Error) -> Self {
        VaultError::Config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crypto_error_source_chain() {
        use std::error::Error;

        use crate::crypto::CipherError;

        let crypto_err = CryptoError::Cipher(CipherError::MacMismatch);
        let err: VaultError = crypto_err.into();

        assert!(matches!(err, VaultError::Crypto(_)));
        // The cipher error stays reachable through the source chain
        assert!(err.source().and_then(|e| e.source()).is_some());
    }

    #[test]
    fn test_json_error_conversion() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: VaultError = json_err.into();
        assert!(matches!(err, VaultError::Json(_)));
    }
}
