//! Request/response correlation.
//!
//! The channel gives no ordering guarantee, so every outstanding request is
//! tracked by its message id until the matching response arrives or the
//! session is torn down. The table is the single owner of all completion
//! callbacks, which makes the exactly-once invariant checkable here in
//! isolation: a callback is consumed by [`Correlator::resolve`] or by
//! [`Correlator::fail_all`], never both, and never twice.

use std::collections::HashMap;
use std::fmt;

use tokio::sync::oneshot;

use crate::credential::Credential;
use crate::error::VaultError;
use crate::protocol::MessageId;

/// An outstanding request.
///
/// `Handshake` and `Status` carry no callback; they exist so that every id
/// this client issued is recognizable and ids stay unique among
/// outstanding requests.
pub enum PendingRequest {
    /// Handshake request awaiting the wrapped shared key
    Handshake,
    /// Status query; the result lands in the status state machine
    Status,
    /// Credential retrieval for a domain
    Retrieval {
        /// Domain the credentials were requested for
        domain: String,
        /// Completion callback
        reply: oneshot::Sender<Result<Vec<Credential>, VaultError>>,
    },
    /// Credential creation
    Create {
        /// Completion callback
        reply: oneshot::Sender<Result<(), VaultError>>,
    },
    /// Credential update
    Update {
        /// Completion callback
        reply: oneshot::Sender<Result<(), VaultError>>,
    },
}

impl PendingRequest {
    /// Resolve this request with a failure.
    ///
    /// Consumes the request; a dropped receiver is fine (the caller gave
    /// up waiting), so send errors are ignored.
    pub fn fail(self, error: VaultError) {
        match self {
            PendingRequest::Handshake | PendingRequest::Status => {}
            PendingRequest::Retrieval { reply, .. } => {
                let _ = reply.send(Err(error));
            }
            PendingRequest::Create { reply } | PendingRequest::Update { reply } => {
                let _ = reply.send(Err(error));
            }
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            PendingRequest::Handshake => "handshake",
            PendingRequest::Status => "status",
            PendingRequest::Retrieval { .. } => "retrieval",
            PendingRequest::Create { .. } => "create",
            PendingRequest::Update { .. } => "update",
        }
    }
}

impl fmt::Debug for PendingRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PendingRequest::{}", self.kind())
    }
}

/// Table of outstanding requests keyed by message id.
#[derive(Debug, Default)]
pub struct Correlator {
    pending: HashMap<MessageId, PendingRequest>,
}

impl Correlator {
    /// Create an empty correlator
    pub fn new() -> Self {
        Self::default()
    }

    /// Produce an id unique among currently-outstanding requests
    pub fn next_id(&self) -> MessageId {
        loop {
            let id = MessageId::random();
            if !self.pending.contains_key(&id) {
                return id;
            }
        }
    }

    /// Store a pending request under its id
    pub fn register(&mut self, id: MessageId, request: PendingRequest) {
        self.pending.insert(id, request);
    }

    /// Remove and return the request for an id.
    ///
    /// `None` means the id is unknown (stale, already resolved, or never
    /// ours); the caller logs and discards the message rather than
    /// treating it as fatal.
    pub fn resolve(&mut self, id: &MessageId) -> Option<PendingRequest> {
        self.pending.remove(id)
    }

    /// Fail every outstanding request, draining the table.
    ///
    /// Each callback fires exactly once total across the correlator's
    /// lifetime; entries without callbacks are simply dropped.
    pub fn fail_all(&mut self, error: impl Fn() -> VaultError) {
        for (_, request) in self.pending.drain() {
            request.fail(error());
        }
    }

    /// Number of outstanding requests
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Whether the table is empty
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
