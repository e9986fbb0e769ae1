//! Connection supervisor: the single owner of all mutable client state.
//!
//! The supervisor is one tokio task holding the status state machine, the
//! pending-request table, the session key material, and the transport.
//! Every input reaches it through one event channel: public commands from
//! the [`VaultManager`](super::VaultManager) handle, inbound transport
//! events (re-dispatched by a forwarder task), and timer ticks. Events are
//! handled strictly sequentially, so no state is ever touched from two
//! contexts.
//!
//! Teardown order matters: timers first, then the pending-request table,
//! then the transport, then key material. Draining the table before the
//! transport dies means a late-arriving response can never revive a
//! canceled request.

use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use super::status::{LockState, Status, StatusErrorKind, Vault};
use super::timer::CancellableTimer;
use crate::availability::{InstallationState, VaultAppProbe};
use crate::config::Config;
use crate::correlator::{Correlator, PendingRequest};
use crate::credential::Credential;
use crate::crypto::{CipherError, CryptoError, SessionCrypto};
use crate::error::VaultError;
use crate::protocol::{
    CommandPayload, EncryptedBlob, EncryptedCommand, EncryptedPayloadFields, InnerResponse,
    MessageId, PayloadItem, RequestEnvelope, ResponseEnvelope, ResponsePayload, VaultCommand,
    ERROR_CANNOT_DECRYPT, ERROR_LOCKED, PROTOCOL_VERSION, SUCCESS_STATUS,
};
use crate::storage::SharedKeyStore;
use crate::telemetry::{Telemetry, TelemetryEvent};
use crate::transport::{NativeTransport, TransportError, TransportEvent};

/// Public operations, as they arrive from the handle.
pub(crate) enum Command {
    InitCommunication,
    CancelCommunication,
    SendHandshake,
    RefreshStatusIfNeeded,
    RetrieveCredentials {
        domain: String,
        reply: oneshot::Sender<Result<Vec<Credential>, VaultError>>,
    },
    CreateCredential {
        credential: Credential,
        reply: oneshot::Sender<Result<(), VaultError>>,
    },
    UpdateCredential {
        credential: Credential,
        reply: oneshot::Sender<Result<(), VaultError>>,
    },
}

/// Everything the supervisor task reacts to.
pub(crate) enum Event {
    Command(Command),
    Transport(TransportEvent),
    RetryConnection,
    RefreshStatus,
    ResponseDeadline,
}

pub(crate) struct Supervisor {
    config: Config,
    enabled: bool,
    status_tx: watch::Sender<Status>,
    events_tx: mpsc::UnboundedSender<Event>,
    crypto: SessionCrypto,
    correlator: Correlator,
    transport: Box<dyn NativeTransport>,
    probe: Box<dyn VaultAppProbe>,
    store: Box<dyn SharedKeyStore>,
    telemetry: Arc<dyn Telemetry>,
    retry_timer: CancellableTimer,
    refresh_timer: CancellableTimer,
    response_timer: CancellableTimer,
    forwarder: Option<JoinHandle<()>>,
}

impl Supervisor {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        config: Config,
        status_tx: watch::Sender<Status>,
        events_tx: mpsc::UnboundedSender<Event>,
        transport: Box<dyn NativeTransport>,
        probe: Box<dyn VaultAppProbe>,
        store: Box<dyn SharedKeyStore>,
        telemetry: Arc<dyn Telemetry>,
    ) -> Self {
        Self {
            config,
            enabled: false,
            status_tx,
            events_tx,
            crypto: SessionCrypto::new(),
            correlator: Correlator::new(),
            transport,
            probe,
            store,
            telemetry,
            retry_timer: CancellableTimer::new(),
            refresh_timer: CancellableTimer::new(),
            response_timer: CancellableTimer::new(),
            forwarder: None,
        }
    }

    /// Drive the event loop until every handle is dropped.
    pub(crate) async fn run(mut self, mut events: mpsc::UnboundedReceiver<Event>) {
        while let Some(event) = events.recv().await {
            self.handle_event(event);
        }
        debug!("supervisor stopped");
    }

    fn handle_event(&mut self, event: Event) {
        match event {
            Event::Command(command) => self.handle_command(command),
            Event::Transport(TransportEvent::Message(bytes)) => self.handle_message(&bytes),
            Event::Transport(TransportEvent::Terminated) => self.handle_disconnect(),
            Event::RetryConnection => self.connect(),
            Event::RefreshStatus => self.send_status_command(),
            Event::ResponseDeadline => self.handle_response_deadline(),
        }
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::InitCommunication => {
                self.enabled = true;
                self.connect();
            }
            Command::CancelCommunication => self.cancel_communication(),
            Command::SendHandshake => self.send_handshake(),
            Command::RefreshStatusIfNeeded => self.refresh_status_if_needed(),
            Command::RetrieveCredentials { domain, reply } => {
                let payload = CommandPayload {
                    uri: Some(domain.clone()),
                    ..CommandPayload::default()
                };
                self.send_encrypted_command(
                    VaultCommand::CredentialRetrieval,
                    Some(payload),
                    PendingRequest::Retrieval { domain, reply },
                );
            }
            Command::CreateCredential { credential, reply } => {
                let payload = CommandPayload {
                    uri: Some(credential.domain.clone()),
                    user_id: Some(credential.account_id.clone()),
                    user_name: credential.username.clone(),
                    password: credential.secret.clone(),
                    name: Some(credential.display_name.clone()),
                    credential_id: None,
                };
                self.send_encrypted_command(
                    VaultCommand::CredentialCreate,
                    Some(payload),
                    PendingRequest::Create { reply },
                );
            }
            Command::UpdateCredential { credential, reply } => {
                let payload = CommandPayload {
                    uri: Some(credential.domain.clone()),
                    user_id: Some(credential.account_id.clone()),
                    user_name: credential.username.clone(),
                    password: credential.secret.clone(),
                    name: Some(credential.display_name.clone()),
                    credential_id: credential.credential_id.clone(),
                };
                self.send_encrypted_command(
                    VaultCommand::CredentialUpdate,
                    Some(payload),
                    PendingRequest::Update { reply },
                );
            }
        }
    }

    // === Connection lifecycle ===

    /// One connection pass: walk the availability gates, then launch the
    /// transport. Every gate failure schedules a retry and leaves the
    /// corresponding status for observers.
    fn connect(&mut self) {
        if !self.enabled {
            return;
        }

        match self.probe.installation_state() {
            InstallationState::NotInstalled => {
                self.set_status(Status::NotInstalled);
                self.schedule_retry();
                return;
            }
            InstallationState::IncompatibleVersion => {
                self.set_status(Status::IncompatibleVersion);
                self.schedule_retry();
                return;
            }
            InstallationState::Installed => {}
        }

        if !self.probe.is_running() {
            self.set_status(Status::NotRunning);
            self.schedule_retry();
            return;
        }

        if !self.probe.is_container_access_approved() {
            self.set_status(Status::ContainerAccessNotApproved);
            self.schedule_retry();
            return;
        }

        if !self.probe.is_integration_approved() {
            self.set_status(Status::IntegrationNotApproved);
            self.schedule_retry();
            return;
        }

        // With a persisted key the handshake is skipped entirely;
        // without one the user has to trigger it explicitly.
        if matches!(self.store.retrieve(), Ok(Some(_))) {
            self.set_status(Status::Connecting);
        } else {
            self.set_status(Status::MissingHandshake);
        }

        if let Err(err) = self.launch_transport() {
            error!(error = %err, "launching the companion transport failed");
            self.telemetry.report(TelemetryEvent::TransportLaunchFailed);
            self.set_status(Status::Error {
                kind: StatusErrorKind::TransportLaunchFailed,
            });
            self.schedule_retry();
        }
    }

    /// Launch the transport with a fresh forwarder that re-dispatches its
    /// events onto this task.
    fn launch_transport(&mut self) -> Result<(), TransportError> {
        self.abort_forwarder();

        let (tx, mut rx) = mpsc::unbounded_channel();
        let events = self.events_tx.clone();
        self.forwarder = Some(tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                if events.send(Event::Transport(event)).is_err() {
                    break;
                }
            }
        }));

        self.transport.launch(tx)
    }

    fn abort_forwarder(&mut self) {
        if let Some(forwarder) = self.forwarder.take() {
            forwarder.abort();
        }
    }

    /// The companion app's end of the channel came up.
    fn handle_companion_connected(&mut self) {
        if !self.enabled {
            return;
        }

        let shared_key = match self.store.retrieve() {
            Ok(key) => key,
            Err(err) => {
                warn!(error = %err, "retrieving the persisted shared key failed");
                self.telemetry.report(TelemetryEvent::SharedKeyInjectionFailed);
                self.set_status(Status::Error {
                    kind: StatusErrorKind::SharedKeyInjectionFailed,
                });
                self.schedule_retry();
                return;
            }
        };

        let Some(key) = shared_key else {
            // No key yet: the handshake is in the user's hands.
            return;
        };

        if !self.crypto.install_shared_key(&key) {
            self.telemetry.report(TelemetryEvent::SharedKeyInjectionFailed);
            self.set_status(Status::Error {
                kind: StatusErrorKind::SharedKeyInjectionFailed,
            });
            self.schedule_retry();
            return;
        }

        self.set_status(Status::WaitingForStatusResponse);
        self.arm_response_deadline();
        self.send_status_command();
    }

    /// The companion app went away, or the transport died.
    fn handle_disconnect(&mut self) {
        self.correlator.fail_all(|| VaultError::Disconnected);
        self.abort_forwarder();
        self.transport.terminate();

        let disabled = *self.status_tx.borrow() == Status::Disabled;
        if !disabled {
            self.set_status(Status::NotRunning);
        }
        self.schedule_retry();
    }

    /// Hard reset: stop everything and wipe key material everywhere.
    fn cancel_communication(&mut self) {
        self.enabled = false;

        self.retry_timer.cancel();
        self.refresh_timer.cancel();
        self.response_timer.cancel();

        // Drain pending requests before the transport goes down so a late
        // response cannot revive a canceled request.
        self.correlator.fail_all(|| VaultError::Disconnected);
        self.abort_forwarder();
        self.transport.terminate();

        if let Err(err) = self.store.erase() {
            warn!(error = %err, "erasing the persisted shared key failed");
        }
        self.crypto.clear_keys();

        self.set_status(Status::Disabled);
    }

    fn refresh_status_if_needed(&mut self) {
        let current = self.status_tx.borrow().clone();
        if matches!(current, Status::Connected { .. } | Status::Error { .. }) {
            self.send_status_command();
        }
    }

    fn handle_response_deadline(&mut self) {
        if *self.status_tx.borrow() == Status::WaitingForStatusResponse {
            warn!("companion app did not answer the status query in time");
            self.telemetry.report(TelemetryEvent::NotResponding);
        }
    }

    // === Inbound messages ===

    fn handle_message(&mut self, bytes: &[u8]) {
        let envelope = match ResponseEnvelope::from_bytes(bytes) {
            Ok(envelope) => envelope,
            Err(err) => {
                warn!(error = %err, "dropping unparseable message");
                self.telemetry.report(TelemetryEvent::ParsingFailed);
                return;
            }
        };

        if envelope.version.is_some_and(|v| v != PROTOCOL_VERSION) {
            warn!(version = ?envelope.version, "dropping message with an unsupported version");
            self.telemetry.report(TelemetryEvent::ParsingFailed);
            return;
        }

        // Unsolicited connection signals are processed immediately,
        // regardless of any correlated traffic.
        match envelope.command {
            Some(VaultCommand::Connected) => {
                self.handle_companion_connected();
                return;
            }
            Some(VaultCommand::Disconnected) => {
                self.handle_disconnect();
                return;
            }
            _ => {}
        }

        let Some(message_id) = envelope.message_id.clone() else {
            warn!("dropping message without a message id");
            return;
        };

        // An unknown id is not an error: the companion app may re-send,
        // or we already cleaned the request up.
        let Some(pending) = self.correlator.resolve(&message_id) else {
            warn!(message_id = %message_id, "unknown message id, ignoring the message");
            return;
        };

        self.handle_correlated(pending, &envelope);
    }

    fn handle_correlated(&mut self, pending: PendingRequest, envelope: &ResponseEnvelope) {
        if let Some(ResponsePayload::Item(item)) = &envelope.payload {
            if matches!(pending, PendingRequest::Handshake) && item.status.is_some() {
                self.handle_handshake_response(item);
                return;
            }

            if let Some(error) = item.error.clone() {
                self.handle_protocol_error(&error);
                self.fail_with_operation_error(pending);
                return;
            }
        }

        if let Some(encrypted) = &envelope.encrypted_payload {
            self.handle_encrypted_response(pending, encrypted);
            return;
        }

        warn!("unrecognized correlated message, failing the request");
        self.telemetry.report(TelemetryEvent::ParsingFailed);
        pending.fail(VaultError::ParsingFailed(
            "unrecognized response form".to_string(),
        ));
    }

    fn handle_handshake_response(&mut self, item: &PayloadItem) {
        if item.status.as_deref() != Some(SUCCESS_STATUS) {
            // Rejected handshakes are never auto-retried; a fresh attempt
            // takes an explicit user action.
            warn!("handshake rejected in the companion app");
            self.telemetry.report(TelemetryEvent::HandshakeRejected);
            self.crypto.clear_keys();
            if let Err(err) = self.store.erase() {
                warn!(error = %err, "erasing the persisted shared key failed");
            }
            self.set_status(Status::HandshakeNotApproved);
            return;
        }

        let Some(wrapped) = item.shared_key.as_deref() else {
            warn!("approved handshake response is missing the wrapped shared key");
            self.telemetry.report(TelemetryEvent::ParsingFailed);
            self.set_status(Status::Error {
                kind: StatusErrorKind::ParsingFailed,
            });
            return;
        };

        let Some(shared_key) = self.crypto.decrypt_negotiated_key(wrapped) else {
            self.telemetry
                .report(TelemetryEvent::DecryptionOfSharedKeyFailed);
            self.set_status(Status::Error {
                kind: StatusErrorKind::DecryptionOfSharedKeyFailed,
            });
            self.cancel_connection_and_schedule_retry();
            return;
        };

        // Persist only after the response verified; the stored key is what
        // lets future sessions skip the handshake.
        if let Err(err) = self.store.save(shared_key.as_bytes()) {
            error!(error = %err, "persisting the shared key failed");
            self.telemetry
                .report(TelemetryEvent::StoringOfSharedKeyFailed);
            self.set_status(Status::Error {
                kind: StatusErrorKind::StoringOfSharedKeyFailed,
            });
            self.schedule_retry();
            return;
        }

        if !self.crypto.install_shared_key(shared_key.as_bytes()) {
            self.telemetry
                .report(TelemetryEvent::SharedKeyInjectionFailed);
            self.set_status(Status::Error {
                kind: StatusErrorKind::SharedKeyInjectionFailed,
            });
            self.schedule_retry();
            return;
        }
        self.crypto.discard_handshake_keys();

        self.set_status(Status::WaitingForStatusResponse);
        self.arm_response_deadline();
        self.send_status_command();
    }

    fn handle_encrypted_response(
        &mut self,
        pending: PendingRequest,
        encrypted: &EncryptedPayloadFields,
    ) {
        let decoded = (|| {
            let data = BASE64.decode(encrypted.data.as_deref()?).ok()?;
            let iv = BASE64.decode(encrypted.iv.as_deref()?).ok()?;
            let mac = BASE64.decode(encrypted.mac.as_deref()?).ok()?;
            Some((data, iv, mac))
        })();
        let Some((data, iv, mac)) = decoded else {
            self.telemetry.report(TelemetryEvent::ParsingFailed);
            self.set_status(Status::Error {
                kind: StatusErrorKind::ParsingFailed,
            });
            pending.fail(VaultError::ParsingFailed(
                "malformed encrypted payload".to_string(),
            ));
            return;
        };

        let plaintext = match self.crypto.decrypt_payload(&data, &iv, &mac) {
            Ok(plaintext) => plaintext,
            Err(CryptoError::Cipher(CipherError::MacMismatch)) => {
                error!("response payload failed HMAC verification");
                self.telemetry.report(TelemetryEvent::HmacMismatch);
                self.set_status(Status::Error {
                    kind: StatusErrorKind::HmacMismatch,
                });
                pending.fail(VaultError::HmacMismatch);
                return;
            }
            Err(err) => {
                error!(error = %err, "decrypting a response payload failed");
                self.telemetry.report(TelemetryEvent::DecryptionFailed);
                self.set_status(Status::Error {
                    kind: StatusErrorKind::DecryptionFailed,
                });
                pending.fail(VaultError::DecryptionFailed);
                return;
            }
        };

        let inner = match InnerResponse::from_bytes(&plaintext) {
            Ok(inner) => inner,
            Err(err) => {
                warn!(error = %err, "decrypted payload failed to parse");
                self.telemetry.report(TelemetryEvent::ParsingFailed);
                self.set_status(Status::Error {
                    kind: StatusErrorKind::ParsingFailed,
                });
                pending.fail(VaultError::ParsingFailed(err.to_string()));
                return;
            }
        };

        self.dispatch_response(pending, inner);
    }

    fn dispatch_response(&mut self, pending: PendingRequest, inner: InnerResponse) {
        // Error strings can answer any command; the state transition (or
        // telemetry) happens first, then the operation fails.
        if let Some(ResponsePayload::Item(item)) = &inner.payload {
            if let Some(error) = item.error.clone() {
                self.handle_protocol_error(&error);
                self.fail_with_operation_error(pending);
                return;
            }
        }

        match (inner.command, pending) {
            (VaultCommand::Status, PendingRequest::Status) => match inner.payload {
                Some(ResponsePayload::Array(items)) => self.handle_status_response(&items),
                _ => {
                    self.telemetry.report(TelemetryEvent::StatusParsingFailed);
                    self.set_status(Status::Error {
                        kind: StatusErrorKind::StatusParsingFailed,
                    });
                }
            },
            (
                VaultCommand::CredentialRetrieval,
                PendingRequest::Retrieval { domain, reply },
            ) => match inner.payload {
                Some(ResponsePayload::Array(items)) => {
                    // Incomplete items degrade to a partial result rather
                    // than failing the whole batch.
                    let credentials: Vec<Credential> = items
                        .iter()
                        .filter_map(|item| Credential::from_payload_item(item, &domain))
                        .collect();
                    if credentials.len() < items.len() {
                        warn!(
                            dropped = items.len() - credentials.len(),
                            "dropped credential items with missing mandatory fields"
                        );
                    }
                    let _ = reply.send(Ok(credentials));
                }
                Some(ResponsePayload::Item(_)) => {
                    warn!("unexpected single-item credential retrieval response");
                    self.telemetry
                        .report(TelemetryEvent::CredentialRetrievalFailed);
                    let _ = reply.send(Err(VaultError::CredentialRetrievalFailed));
                }
                None => {
                    self.telemetry
                        .report(TelemetryEvent::CredentialRetrievalFailed);
                    let _ = reply.send(Err(VaultError::CredentialRetrievalFailed));
                }
            },
            (VaultCommand::CredentialCreate, PendingRequest::Create { reply }) => {
                self.complete_write(
                    reply,
                    inner.payload,
                    TelemetryEvent::CredentialCreationFailed,
                    VaultError::CredentialCreationFailed,
                );
            }
            (VaultCommand::CredentialUpdate, PendingRequest::Update { reply }) => {
                self.complete_write(
                    reply,
                    inner.payload,
                    TelemetryEvent::CredentialUpdateFailed,
                    VaultError::CredentialUpdateFailed,
                );
            }
            (command, pending) => {
                warn!(?command, ?pending, "response kind does not match the pending request");
                self.telemetry.report(TelemetryEvent::ParsingFailed);
                pending.fail(VaultError::ParsingFailed(
                    "response kind mismatch".to_string(),
                ));
            }
        }
    }

    /// Creation and update share one contract: anything but the explicit
    /// success marker is a failure.
    fn complete_write(
        &self,
        reply: oneshot::Sender<Result<(), VaultError>>,
        payload: Option<ResponsePayload>,
        failure_event: TelemetryEvent,
        failure: VaultError,
    ) {
        let succeeded = matches!(
            &payload,
            Some(ResponsePayload::Item(item)) if item.status.as_deref() == Some(SUCCESS_STATUS)
        );

        if succeeded {
            let _ = reply.send(Ok(()));
        } else {
            self.telemetry.report(failure_event);
            let _ = reply.send(Err(failure));
        }
    }

    fn handle_status_response(&mut self, items: &[PayloadItem]) {
        let mut active = items.iter().filter(|item| item.active.unwrap_or(false));
        let (first, extra) = (active.next(), active.next());

        // Exactly one active vault; zero or several is a protocol error,
        // not something to resolve by picking one.
        let Some(item) = first else {
            self.telemetry.report(TelemetryEvent::NoActiveVault);
            self.set_status(Status::Error {
                kind: StatusErrorKind::NoActiveVault,
            });
            return;
        };
        if extra.is_some() {
            warn!("status response flags more than one active vault");
            self.telemetry.report(TelemetryEvent::NoActiveVault);
            self.set_status(Status::Error {
                kind: StatusErrorKind::NoActiveVault,
            });
            return;
        }

        let (Some(id), Some(email), Some(state)) =
            (item.id.clone(), item.email.clone(), item.status.as_deref())
        else {
            self.telemetry.report(TelemetryEvent::StatusParsingFailed);
            self.set_status(Status::Error {
                kind: StatusErrorKind::StatusParsingFailed,
            });
            return;
        };
        let Some(lock_state) = LockState::parse(state) else {
            self.telemetry.report(TelemetryEvent::StatusParsingFailed);
            self.set_status(Status::Error {
                kind: StatusErrorKind::StatusParsingFailed,
            });
            return;
        };

        self.set_status(Status::Connected {
            vault: Vault {
                id,
                email,
                lock_state,
                active: true,
            },
        });
    }

    /// Error strings reported by the companion app inside a response.
    fn handle_protocol_error(&mut self, error: &str) {
        match error {
            ERROR_LOCKED => {
                // The vault relocked underneath us. If connected, flip the
                // snapshot (which starts the unlock poller); otherwise ask
                // for a fresh status.
                let current = self.status_tx.borrow().clone();
                if let Status::Connected { vault } = current {
                    self.set_status(Status::Connected {
                        vault: vault.locked(),
                    });
                } else {
                    self.send_status_command();
                }
            }
            ERROR_CANNOT_DECRYPT => {
                // Shared-key desynchronization. Reported, but recovery
                // takes an explicit re-handshake, not a silent key wipe.
                error!("companion app could not decrypt our command");
                self.telemetry
                    .report(TelemetryEvent::RespondedCannotDecrypt);
            }
            other => {
                error!(error = other, "companion app reported an unclassified error");
                self.telemetry
                    .report(TelemetryEvent::RespondedWithUnknownError);
            }
        }
    }

    fn fail_with_operation_error(&self, pending: PendingRequest) {
        match pending {
            PendingRequest::Handshake | PendingRequest::Status => {}
            PendingRequest::Retrieval { reply, .. } => {
                self.telemetry
                    .report(TelemetryEvent::CredentialRetrievalFailed);
                let _ = reply.send(Err(VaultError::CredentialRetrievalFailed));
            }
            PendingRequest::Create { reply } => {
                self.telemetry
                    .report(TelemetryEvent::CredentialCreationFailed);
                let _ = reply.send(Err(VaultError::CredentialCreationFailed));
            }
            PendingRequest::Update { reply } => {
                self.telemetry
                    .report(TelemetryEvent::CredentialUpdateFailed);
                let _ = reply.send(Err(VaultError::CredentialUpdateFailed));
            }
        }
    }

    // === Outbound messages ===

    fn send_handshake(&mut self) {
        let public_key = match self.crypto.generate_handshake_key_pair() {
            Ok(public_key) => public_key,
            Err(err) => {
                error!(error = %err, "generating the handshake key pair failed");
                self.telemetry.report(TelemetryEvent::SendingFailed);
                self.set_status(Status::Error {
                    kind: StatusErrorKind::SendingFailed,
                });
                return;
            }
        };

        let message_id = self.correlator.next_id();
        let envelope = RequestEnvelope::handshake(
            message_id.clone(),
            public_key,
            self.config.application_name.clone(),
        );
        let bytes = match envelope.to_bytes() {
            Ok(bytes) => bytes,
            Err(err) => {
                error!(error = %err, "building the handshake request failed");
                self.telemetry.report(TelemetryEvent::SendingFailed);
                self.set_status(Status::Error {
                    kind: StatusErrorKind::SendingFailed,
                });
                return;
            }
        };

        self.correlator
            .register(message_id.clone(), PendingRequest::Handshake);
        if let Err(err) = self.transport.send(bytes) {
            warn!(error = %err, "sending the handshake failed");
            self.telemetry.report(TelemetryEvent::SendingFailed);
            let _ = self.correlator.resolve(&message_id);
            self.set_status(Status::Error {
                kind: StatusErrorKind::SendingFailed,
            });
            return;
        }

        self.set_status(Status::WaitingForHandshakeApproval);
    }

    fn send_status_command(&mut self) {
        self.send_encrypted_command(VaultCommand::Status, None, PendingRequest::Status);
    }

    fn send_encrypted_command(
        &mut self,
        command: VaultCommand,
        payload: Option<CommandPayload>,
        pending: PendingRequest,
    ) {
        let message_id = self.correlator.next_id();
        let bytes = match self.build_encrypted_request(&message_id, command, payload) {
            Ok(bytes) => bytes,
            Err(err) => {
                error!(error = %err, ?command, "building an encrypted command failed");
                self.telemetry.report(TelemetryEvent::SendingFailed);
                pending.fail(VaultError::SendingFailed);
                self.set_status(Status::Error {
                    kind: StatusErrorKind::SendingFailed,
                });
                return;
            }
        };

        // Register before sending so a fast response always correlates.
        self.correlator.register(message_id.clone(), pending);
        if let Err(err) = self.transport.send(bytes) {
            warn!(error = %err, "handing a command to the transport failed");
            self.telemetry.report(TelemetryEvent::SendingFailed);
            if let Some(pending) = self.correlator.resolve(&message_id) {
                pending.fail(VaultError::SendingFailed);
            }
            self.set_status(Status::Error {
                kind: StatusErrorKind::SendingFailed,
            });
        }
    }

    fn build_encrypted_request(
        &self,
        message_id: &MessageId,
        command: VaultCommand,
        payload: Option<CommandPayload>,
    ) -> Result<Vec<u8>, VaultError> {
        let plaintext = EncryptedCommand::new(command, payload).to_bytes()?;
        let sealed = self.crypto.encrypt_payload(&plaintext)?;
        let blob = EncryptedBlob {
            iv: sealed.iv.to_vec(),
            data: sealed.data,
            mac: sealed.mac.to_vec(),
        };

        Ok(RequestEnvelope::encrypted_command(message_id.clone(), blob.encode()).to_bytes()?)
    }

    // === Timers and status ===

    fn schedule_retry(&mut self) {
        if !self.enabled || self.retry_timer.is_armed() {
            return;
        }
        self.retry_timer.schedule_once(
            self.config.retry_interval(),
            self.events_tx.clone(),
            Event::RetryConnection,
        );
    }

    fn schedule_status_refresh(&mut self) {
        if self.refresh_timer.is_armed() {
            return;
        }
        self.refresh_timer.schedule_repeating(
            self.config.status_refresh_interval(),
            self.events_tx.clone(),
            || Event::RefreshStatus,
        );
    }

    fn arm_response_deadline(&mut self) {
        self.response_timer.schedule_once(
            self.config.response_timeout(),
            self.events_tx.clone(),
            Event::ResponseDeadline,
        );
    }

    fn cancel_connection_and_schedule_retry(&mut self) {
        self.correlator.fail_all(|| VaultError::Disconnected);
        self.abort_forwarder();
        self.transport.terminate();
        self.schedule_retry();
    }

    fn set_status(&mut self, status: Status) {
        let changed = *self.status_tx.borrow() != status;
        if changed {
            debug!(?status, "status changed");
        }

        // A locked vault keeps the refresh poller alive until it unlocks
        // or the connection drops; any transition clears the response
        // deadline.
        match &status {
            Status::Connected { vault } if vault.is_locked() => self.schedule_status_refresh(),
            _ => self.refresh_timer.cancel(),
        }
        self.response_timer.cancel();

        self.status_tx.send_replace(status);
    }
}
