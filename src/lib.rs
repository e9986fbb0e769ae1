//! # VaultLink - Native-Messaging Credential Vault Client
//!
//! Client library connecting a host application to a credential-vault
//! companion process over a local native-messaging channel, with an
//! encrypted session negotiated through a one-time handshake.
//!
//! ## Features
//!
//! - **Connection supervision**: availability probing, retry with backoff,
//!   and a single authoritative [`Status`] state machine
//! - **Encrypted sessions**: RSA-OAEP handshake key exchange, then
//!   AES-256-CBC + HMAC-SHA256 protected commands
//! - **Request correlation**: message-id matching over an unordered
//!   channel with an exactly-once completion guarantee
//! - **Credential operations**: status query, retrieval, creation, update
//!
//! ## Architecture
//!
//! ```text
//! Host application                              Companion process
//!    |                                                 |
//!    |  VaultManager (handle)                          |
//!    |      |                                          |
//!    |      v            events                        |
//!    |  Supervisor task <------- transport forwarder <-+
//!    |   |    |    |                                   |
//!    |   |    |    +-- Correlator (pending requests)   |
//!    |   |    +------- SessionCrypto (key material)    |
//!    |   +------------ Status (watch channel)          |
//!    |                                                 |
//!    +--> NativeTransport::send ----------------------->
//! ```
//!
//! All mutable state lives in one supervisor task; commands, inbound
//! frames, and timer ticks are serialized through a single event channel.
//!
//! ## Connection State Machine
//!
//! ```text
//! Disabled ──init──> availability gates ──────> MissingHandshake
//!                     │        │                      │ send_handshake()
//!                     │        │ (key persisted)      v
//!                     │        └─────> Connecting   WaitingForHandshakeApproval
//!                     │                    │            │
//!              NotInstalled /              │ connected  │ approved
//!              NotRunning / ...            v            v
//!                     ^            WaitingForStatusResponse
//!                     │ retry              │ one active vault
//!                     └──────── Error      v
//!                                      Connected(vault)
//! ```
//!
//! Every availability or transport failure schedules a retry; the two
//! exceptions are `Disabled` (requires explicit re-enable) and
//! `HandshakeNotApproved` (requires an explicit new handshake).
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use vaultlink::{Config, FileKeyStore, NoopTelemetry, VaultManager};
//!
//! let manager = VaultManager::spawn(
//!     Config::from_env(),
//!     Box::new(my_transport),      // NativeTransport impl
//!     Box::new(my_probe),          // VaultAppProbe impl
//!     Box::new(FileKeyStore::new("/path/to/shared.key")),
//!     Arc::new(NoopTelemetry),
//! );
//!
//! manager.init_communication();
//!
//! // Observe connection state
//! let mut status = manager.status();
//! while status.changed().await.is_ok() {
//!     println!("status: {:?}", *status.borrow());
//! }
//!
//! // Fetch credentials once connected
//! let credentials = manager.retrieve_credentials("example.com").await?;
//! ```
//!
//! ## Modules
//!
//! - [`client`]: the [`VaultManager`] surface and status state machine
//! - [`protocol`]: wire envelopes and inner command payloads
//! - [`crypto`]: handshake key pair and payload cipher
//! - [`correlator`]: pending-request table
//! - [`transport`], [`storage`], [`availability`], [`telemetry`]:
//!   collaborator contracts
//! - [`config`]: intervals and identity
//! - [`error`]: error types and result alias

pub mod availability;
pub mod client;
pub mod config;
pub mod correlator;
pub mod credential;
pub mod crypto;
pub mod error;
pub mod protocol;
pub mod storage;
pub mod telemetry;
pub mod transport;

// Re-exports for convenience
pub use availability::{InstallationState, VaultAppProbe};
pub use client::{LockState, Status, StatusErrorKind, Vault, VaultManager};
pub use config::Config;
pub use credential::Credential;
pub use crypto::SessionCrypto;
pub use error::{Result, VaultError};
pub use protocol::PROTOCOL_VERSION;
pub use storage::{FileKeyStore, InMemoryKeyStore, SharedKeyStore, StorageError};
pub use telemetry::{NoopTelemetry, Telemetry, TelemetryEvent};
pub use transport::{NativeTransport, TransportError, TransportEvent, TransportEvents};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
