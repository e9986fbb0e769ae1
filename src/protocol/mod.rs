//! Wire protocol for the native-messaging channel.
//!
//! The channel carries JSON envelopes in both directions. Requests come in
//! two forms; responses mirror them, plus a reserved command tag for
//! unsolicited connection signals.
//!
//! # Message Flow
//!
//! ```text
//! Client                                  Companion app
//!    |                                        |
//!    |---- handshake (publicKey) ------------>|  One-time key exchange
//!    |<--- {sharedKey, status} ---------------|  Wrapped shared key
//!    |                                        |
//!    |==== encryptedCommand (status) ========>|  Encrypted exchange
//!    |<=== encryptedPayload (vaults) =========|
//!    |                                        |
//!    |<--- connected / disconnected ----------|  Unsolicited, no messageId
//! ```
//!
//! # Envelope Forms
//!
//! | Form               | Fields                                          |
//! |--------------------|-------------------------------------------------|
//! | Handshake request  | `messageId`, `version`, `command`, `payload`    |
//! | Encrypted request  | `messageId`, `version`, `encryptedCommand`      |
//! | Correlated response| `messageId`, `payload` or `encryptedPayload`    |
//! | Unsolicited        | `command` only (`connected` / `disconnected`)   |
//!
//! The encrypted command string is `2.<ivBase64>|<dataBase64>|<macBase64>`;
//! the `2.` prefix names the cipher suite (AES-256-CBC + HMAC-SHA256) and
//! is fixed for this protocol version.
//!
//! Correlation is by `messageId` alone; the channel gives no ordering
//! guarantee across distinct ids.

mod command;
mod envelope;

pub use command::{
    CommandPayload, EncryptedCommand, InnerResponse, PayloadItem, ResponsePayload,
};
pub use envelope::{
    BlobError, EncryptedBlob, EncryptedPayloadFields, HandshakePayload, MessageId,
    RequestEnvelope, ResponseEnvelope, VaultCommand,
};

/// Protocol version carried in every request envelope
pub const PROTOCOL_VERSION: u32 = 1;

/// Cipher-suite prefix of the encrypted command string
pub const CIPHER_VERSION: &str = "2";

/// Explicit success marker on handshake and write responses
pub const SUCCESS_STATUS: &str = "success";

/// Error string reporting a locked vault.
///
/// The companion app signals a locked vault through this exact string
/// rather than a structured field; it is part of the wire contract.
pub const ERROR_LOCKED: &str = "locked";

/// Error string reporting that the companion app could not decrypt our
/// command (shared-key desynchronization)
pub const ERROR_CANNOT_DECRYPT: &str = "cannot-decrypt";
