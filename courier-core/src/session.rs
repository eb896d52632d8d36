//! Session controller: drives the protocol flows over the dispatcher,
//! peer registry and key material.
//!
//! Every flow builds a typed request, performs exactly one exchange, checks
//! for a server-reported error before interpreting the payload, and applies
//! its effect. Precondition failures (missing keys, unknown names, double
//! registration) are caught before any transport activity.

use crate::dispatch::{Connector, Dispatcher, ExchangeError};
use crate::identity::{LocalIdentity, PeerId, PeerName, MAX_NAME_LEN};
use crate::keys::{self, KeyError, SymmetricKey};
use crate::protocol::{
    AwaitingMessageRecord, DirectoryRecord, MessageKind, Request, ResponsePayload,
};
use crate::registry::{PeerRegistry, RegistryError};
use crate::wire;

/// Client-side state violation: the flow cannot proceed as asked.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("already registered")]
    AlreadyRegistered,
    #[error("empty names are not supported")]
    EmptyName,
    #[error("name too long ({0} bytes, max {MAX_NAME_LEN})")]
    NameTooLong(usize),
    #[error("no public key stored for \"{0}\"; fetch it first")]
    NoPublicKey(String),
    #[error("no symmetric key stored for \"{0}\"; exchange one first")]
    NoSymmetricKey(String),
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    State(#[from] StateError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Key(#[from] KeyError),
    #[error(transparent)]
    Exchange(#[from] ExchangeError),
    #[error("server responded with an error")]
    Server,
    #[error("server responded with unexpected {got} (expected {expected})")]
    UnexpectedResponse {
        expected: &'static str,
        got: &'static str,
    },
    #[error("unknown message type {0}")]
    UnknownMessageKind(u8),
}

/// One queued message pulled from the server, reported independently of the
/// rest of its batch.
#[derive(Debug)]
pub struct PulledMessage {
    pub sender: PeerId,
    pub sender_name: PeerName,
    pub message_id: u32,
    pub body: Result<MessageBody, SessionError>,
}

#[derive(Debug, PartialEq, Eq)]
pub enum MessageBody {
    /// The sender asked for a symmetric key; informational only.
    KeyRequest,
    /// The sender delivered a symmetric key; it is now stored for them.
    KeyStored,
    /// Decrypted message text.
    Text(String),
}

/// Orchestrates the protocol flows. Owns the local identity, the peer
/// registry and the dispatcher; mutated only by the single thread driving it.
pub struct SessionController<C: Connector> {
    identity: LocalIdentity,
    registry: PeerRegistry,
    dispatcher: Dispatcher<C>,
}

impl<C: Connector> SessionController<C> {
    pub fn new(identity: LocalIdentity, connector: C) -> Self {
        Self {
            identity,
            registry: PeerRegistry::new(),
            dispatcher: Dispatcher::new(connector),
        }
    }

    pub fn identity(&self) -> &LocalIdentity {
        &self.identity
    }

    pub fn registry(&self) -> &PeerRegistry {
        &self.registry
    }

    /// Register with the directory server. Allowed exactly once; on success
    /// the assigned ID is recorded and returned for the host to persist.
    pub fn register(&mut self, name: &str) -> Result<PeerId, SessionError> {
        if self.identity.is_registered() {
            return Err(StateError::AlreadyRegistered.into());
        }
        if name.is_empty() {
            return Err(StateError::EmptyName.into());
        }
        if name.len() > MAX_NAME_LEN {
            return Err(StateError::NameTooLong(name.len()).into());
        }
        let public_key = self.identity.keypair().public_key_slot()?;
        let request = Request::Signup {
            name: PeerName::new(name),
            public_key,
        };
        match self.send(&request)? {
            ResponsePayload::ServerError => Err(SessionError::Server),
            ResponsePayload::SignupSuccess { client_id } => {
                self.identity
                    .complete_registration(client_id, PeerName::new(name));
                Ok(client_id)
            }
            other => Err(unexpected("signup success", &other)),
        }
    }

    /// Fetch the directory listing and fold it into the registry. Existing
    /// key state survives a refresh.
    pub fn list_peers(&mut self) -> Result<Vec<DirectoryRecord>, SessionError> {
        match self.send(&Request::ListUsers)? {
            ResponsePayload::ServerError => Err(SessionError::Server),
            ResponsePayload::PeerList(records) => {
                for record in &records {
                    self.registry
                        .upsert_from_directory(record.id, record.name.clone());
                }
                Ok(records)
            }
            other => Err(unexpected("peer list", &other)),
        }
    }

    /// Fetch a peer's public key and store it on that peer.
    pub fn fetch_public_key(&mut self, name: &str) -> Result<(), SessionError> {
        let target = self.registry.find_by_name(name)?;
        match self.send(&Request::UserPublicKey { target })? {
            ResponsePayload::ServerError => Err(SessionError::Server),
            ResponsePayload::PeerPublicKey {
                client_id,
                public_key,
            } => {
                if client_id != target {
                    tracing::debug!(%client_id, %target, "public key response echoed a different id");
                }
                self.registry.set_public_key(target, public_key)?;
                Ok(())
            }
            other => Err(unexpected("peer public key", &other)),
        }
    }

    /// Generate a fresh symmetric key for a peer, store it locally, and send
    /// it wrapped under the peer's public key. Requires the public key.
    pub fn exchange_symmetric_key(&mut self, name: &str) -> Result<(), SessionError> {
        let target = self.registry.find_by_name(name)?;
        let peer_public = self
            .registry
            .get(target)
            .and_then(|p| p.public_key().copied())
            .ok_or_else(|| StateError::NoPublicKey(name.to_string()))?;
        let key = SymmetricKey::generate();
        let wrapped = keys::wrap_symmetric_key(&peer_public, &key)?;
        // Stored before sending, as the original client did: a key the server
        // failed to deliver is still the one we will retry with.
        self.registry.set_symmetric_key(target, key)?;
        let request = Request::MessageUser {
            target,
            kind: MessageKind::SymmetricKeyResponse,
            content: wrapped,
        };
        self.expect_message_sent(&request).map(|_| ())
    }

    /// Encrypt and send a text message. Requires the peer's public key and
    /// symmetric key; both preconditions are checked before any exchange.
    pub fn send_text(&mut self, name: &str, text: &str) -> Result<u32, SessionError> {
        let target = self.registry.find_by_name(name)?;
        if !self.registry.can_receive_symmetric_key(target) {
            return Err(StateError::NoPublicKey(name.to_string()).into());
        }
        let key = self
            .registry
            .get(target)
            .and_then(|p| p.symmetric_key().copied())
            .ok_or_else(|| StateError::NoSymmetricKey(name.to_string()))?;
        let request = Request::MessageUser {
            target,
            kind: MessageKind::Regular,
            content: key.encrypt_message(text.as_bytes()),
        };
        self.expect_message_sent(&request)
    }

    /// Ask a peer to send us a symmetric key. No local key preconditions.
    pub fn request_symmetric_key(&mut self, name: &str) -> Result<(), SessionError> {
        let target = self.registry.find_by_name(name)?;
        let request = Request::MessageUser {
            target,
            kind: MessageKind::SymmetricKeyRequest,
            content: Vec::new(),
        };
        self.expect_message_sent(&request).map(|_| ())
    }

    /// Pull the queued message batch. Records from unknown senders are
    /// skipped; every other record is reported independently, so one
    /// undecipherable message never hides the rest of the batch.
    pub fn pull_messages(&mut self) -> Result<Vec<PulledMessage>, SessionError> {
        let records = match self.send(&Request::QueuedMessages)? {
            ResponsePayload::ServerError => return Err(SessionError::Server),
            ResponsePayload::AwaitingMessages(records) => records,
            other => return Err(unexpected("awaiting messages", &other)),
        };
        let mut pulled = Vec::with_capacity(records.len());
        for record in records {
            let Some(sender_name) = self.registry.get(record.sender).map(|p| p.name().clone())
            else {
                tracing::debug!(sender = %record.sender, "skipping message from unknown sender");
                continue;
            };
            let body = self.read_record(&record, &sender_name);
            pulled.push(PulledMessage {
                sender: record.sender,
                sender_name,
                message_id: record.message_id,
                body,
            });
        }
        Ok(pulled)
    }

    fn read_record(
        &mut self,
        record: &AwaitingMessageRecord,
        sender_name: &PeerName,
    ) -> Result<MessageBody, SessionError> {
        match MessageKind::from_u8(record.kind) {
            None => Err(SessionError::UnknownMessageKind(record.kind)),
            Some(MessageKind::SymmetricKeyRequest) => Ok(MessageBody::KeyRequest),
            Some(MessageKind::SymmetricKeyResponse) => {
                let key = self
                    .identity
                    .keypair()
                    .unwrap_symmetric_key(&record.content)?;
                self.registry.set_symmetric_key(record.sender, key)?;
                Ok(MessageBody::KeyStored)
            }
            Some(MessageKind::Regular) => {
                // A regular message without a stored key is a protocol
                // violation by the server; reported, not skipped.
                let key = self
                    .registry
                    .get(record.sender)
                    .and_then(|p| p.symmetric_key().copied())
                    .ok_or_else(|| StateError::NoSymmetricKey(sender_name.to_string()))?;
                Ok(MessageBody::Text(key.decrypt_message(&record.content)?))
            }
        }
    }

    fn send(&mut self, request: &Request) -> Result<ResponsePayload, SessionError> {
        let frame =
            wire::encode_request(self.identity.id(), request).map_err(ExchangeError::from)?;
        Ok(self.dispatcher.exchange(&frame)?)
    }

    fn expect_message_sent(&mut self, request: &Request) -> Result<u32, SessionError> {
        match self.send(request)? {
            ResponsePayload::ServerError => Err(SessionError::Server),
            ResponsePayload::MessageSent { message_id, .. } => Ok(message_id),
            other => Err(unexpected("message sent", &other)),
        }
    }
}

fn unexpected(expected: &'static str, got: &ResponsePayload) -> SessionError {
    SessionError::UnexpectedResponse {
        expected,
        got: got.kind_name(),
    }
}
