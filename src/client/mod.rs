//! The public client surface.
//!
//! [`VaultManager`] is a cheap, cloneable handle over the supervisor task.
//! Commands are fire-and-forget at the transport layer; operations that
//! have results await them through oneshot completions, and connection
//! state is observed through a watch channel rather than polled.
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use vaultlink::{Config, NoopTelemetry, VaultManager};
//!
//! let manager = VaultManager::spawn(
//!     Config::default(),
//!     Box::new(transport),
//!     Box::new(probe),
//!     Box::new(key_store),
//!     Arc::new(NoopTelemetry),
//! );
//!
//! manager.init_communication();
//! let mut status = manager.status();
//! // ... status.changed().await drives the UI
//! let credentials = manager.retrieve_credentials("example.com").await?;
//! ```

mod status;
mod supervisor;
mod timer;

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, watch};

pub use status::{LockState, Status, StatusErrorKind, Vault};

use supervisor::{Command, Event, Supervisor};

use crate::availability::VaultAppProbe;
use crate::config::Config;
use crate::credential::Credential;
use crate::error::{Result, VaultError};
use crate::storage::SharedKeyStore;
use crate::telemetry::Telemetry;
use crate::transport::NativeTransport;

/// Handle to a running vault client.
///
/// All clones talk to the same supervisor task; the task stops when the
/// last handle is dropped.
#[derive(Clone)]
pub struct VaultManager {
    commands: mpsc::UnboundedSender<Event>,
    status_rx: watch::Receiver<Status>,
}

impl VaultManager {
    /// Spawn the supervisor task over the given collaborators.
    ///
    /// Must be called from within a tokio runtime. The configuration is
    /// validated first (interval clamping). The client starts disabled;
    /// call [`init_communication`](Self::init_communication) to begin
    /// connecting.
    pub fn spawn(
        config: Config,
        transport: Box<dyn NativeTransport>,
        probe: Box<dyn VaultAppProbe>,
        store: Box<dyn SharedKeyStore>,
        telemetry: Arc<dyn Telemetry>,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(Status::Disabled);

        let supervisor = Supervisor::new(
            config.validated(),
            status_tx,
            events_tx.clone(),
            transport,
            probe,
            store,
            telemetry,
        );
        tokio::spawn(supervisor.run(events_rx));

        Self {
            commands: events_tx,
            status_rx,
        }
    }

    /// Enable the integration and start connecting
    pub fn init_communication(&self) {
        self.send(Command::InitCommunication);
    }

    /// Hard reset: cancel all timers, fail pending requests, terminate the
    /// transport, erase the persisted shared key, and wipe in-memory key
    /// material. Requires [`init_communication`](Self::init_communication)
    /// to start again.
    pub fn cancel_communication(&self) {
        self.send(Command::CancelCommunication);
    }

    /// Start the one-time handshake establishing the shared key.
    ///
    /// Meaningful while the status is
    /// [`Status::MissingHandshake`] or [`Status::HandshakeNotApproved`];
    /// the outcome arrives through the status channel.
    pub fn send_handshake(&self) {
        self.send(Command::SendHandshake);
    }

    /// Re-query the vault status when connected or in an error state
    pub fn refresh_status(&self) {
        self.send(Command::RefreshStatusIfNeeded);
    }

    /// Retrieve the credentials matching a domain.
    ///
    /// Items missing mandatory fields are dropped individually; the rest
    /// come back as a partial result.
    pub async fn retrieve_credentials(&self, domain: impl Into<String>) -> Result<Vec<Credential>> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::RetrieveCredentials {
            domain: domain.into(),
            reply,
        });
        rx.await.map_err(|_| VaultError::Disconnected)?
    }

    /// Create a credential in the vault.
    ///
    /// Fails unless the vault reports an explicit success marker.
    pub async fn create_credential(&self, credential: Credential) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::CreateCredential { credential, reply });
        rx.await.map_err(|_| VaultError::Disconnected)?
    }

    /// Update an existing credential.
    ///
    /// The credential's `credential_id` must be set; that contract is the
    /// caller's, not checked here.
    pub async fn update_credential(&self, credential: Credential) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::UpdateCredential { credential, reply });
        rx.await.map_err(|_| VaultError::Disconnected)?
    }

    /// Subscribe to status changes
    pub fn status(&self) -> watch::Receiver<Status> {
        self.status_rx.clone()
    }

    /// The current status snapshot
    pub fn current_status(&self) -> Status {
        self.status_rx.borrow().clone()
    }

    fn send(&self, command: Command) {
        // A closed channel means the supervisor is gone, which only
        // happens when every handle is dropped; ignoring the error here
        // matches fire-and-forget semantics.
        let _ = self.commands.send(Event::Command(command));
    }
}

impl std::fmt::Debug for VaultManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VaultManager")
            .field("status", &*self.status_rx.borrow())
            .finish_non_exhaustive()
    }
}
