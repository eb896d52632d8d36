//! Courier wire protocol: request/response codes, fixed field sizes, typed
//! request and response payloads. Framing lives in the wire module.

use crate::identity::{PeerId, PeerName};

/// Version byte sent in every request header.
pub const CLIENT_VERSION: u8 = 1;

pub const PEER_ID_LEN: usize = 16;
pub const NAME_SLOT_LEN: usize = 255;
pub const PUBLIC_KEY_LEN: usize = 160;
pub const SYMMETRIC_KEY_LEN: usize = 16;

/// Request header: client_id(16) + version(1) + code(2) + payload_len(4).
pub const REQUEST_HEADER_LEN: usize = PEER_ID_LEN + 1 + 2 + 4;
/// Response header: server_version(1) + code(2) + payload_len(4).
pub const RESPONSE_HEADER_LEN: usize = 7;

/// Directory listing record: client_id(16) + name slot(255).
pub const DIRECTORY_RECORD_LEN: usize = PEER_ID_LEN + NAME_SLOT_LEN;
/// Public-key response payload: client_id(16) + public key slot(160).
pub const PUBLIC_KEY_PAYLOAD_LEN: usize = PEER_ID_LEN + PUBLIC_KEY_LEN;
/// Message-sent response payload: client_id(16) + message_id(4).
pub const MESSAGE_SENT_PAYLOAD_LEN: usize = PEER_ID_LEN + 4;
/// Fixed prefix of a queued-message record: sender(16) + message_id(4) +
/// type(1) + content_len(4). Content follows.
pub const MESSAGE_RECORD_HEADER_LEN: usize = PEER_ID_LEN + 4 + 1 + 4;

// Request codes.
pub const SIGNUP_REQUEST: u16 = 1000;
pub const USER_LIST_REQUEST: u16 = 1001;
pub const USER_PUBLIC_KEY_REQUEST: u16 = 1002;
pub const MESSAGE_USER_REQUEST: u16 = 1003;
pub const QUEUED_MESSAGES_REQUEST: u16 = 1004;

// Response codes.
pub const SIGNUP_SUCCESS_RESPONSE: u16 = 2000;
pub const USER_LIST_RESPONSE: u16 = 2001;
pub const USER_PUBLIC_KEY_RESPONSE: u16 = 2002;
pub const MESSAGE_SENT_RESPONSE: u16 = 2003;
pub const QUEUED_MESSAGES_RESPONSE: u16 = 2004;
pub const SERVER_ERROR_RESPONSE: u16 = 9000;

/// Tag distinguishing keyed-message payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageKind {
    SymmetricKeyRequest = 1,
    SymmetricKeyResponse = 2,
    Regular = 3,
}

impl MessageKind {
    pub fn from_u8(tag: u8) -> Option<Self> {
        match tag {
            1 => Some(MessageKind::SymmetricKeyRequest),
            2 => Some(MessageKind::SymmetricKeyResponse),
            3 => Some(MessageKind::Regular),
            _ => None,
        }
    }
}

/// Typed request. `code()` and `payload()` feed the wire encoder.
#[derive(Debug, Clone)]
pub enum Request {
    Signup {
        name: PeerName,
        public_key: [u8; PUBLIC_KEY_LEN],
    },
    ListUsers,
    UserPublicKey {
        target: PeerId,
    },
    MessageUser {
        target: PeerId,
        kind: MessageKind,
        content: Vec<u8>,
    },
    QueuedMessages,
}

impl Request {
    pub fn code(&self) -> u16 {
        match self {
            Request::Signup { .. } => SIGNUP_REQUEST,
            Request::ListUsers => USER_LIST_REQUEST,
            Request::UserPublicKey { .. } => USER_PUBLIC_KEY_REQUEST,
            Request::MessageUser { .. } => MESSAGE_USER_REQUEST,
            Request::QueuedMessages => QUEUED_MESSAGES_REQUEST,
        }
    }

    /// Serialize the payload portion of the request (header excluded).
    pub fn payload(&self) -> Vec<u8> {
        match self {
            Request::Signup { name, public_key } => {
                let mut out = Vec::with_capacity(NAME_SLOT_LEN + PUBLIC_KEY_LEN);
                out.extend_from_slice(&name.to_wire());
                out.extend_from_slice(public_key);
                out
            }
            Request::ListUsers | Request::QueuedMessages => Vec::new(),
            Request::UserPublicKey { target } => target.as_bytes().to_vec(),
            Request::MessageUser {
                target,
                kind,
                content,
            } => {
                let mut out = Vec::with_capacity(PEER_ID_LEN + 1 + 4 + content.len());
                out.extend_from_slice(target.as_bytes());
                out.push(*kind as u8);
                out.extend_from_slice(&(content.len() as u32).to_le_bytes());
                out.extend_from_slice(content);
                out
            }
        }
    }
}

/// One entry of a directory listing response.
#[derive(Debug, Clone)]
pub struct DirectoryRecord {
    pub id: PeerId,
    pub name: PeerName,
}

/// One queued message as it appears on the wire. The kind tag is kept raw:
/// unknown tags are a per-record condition for the session layer, not a
/// decode failure.
#[derive(Debug, Clone)]
pub struct AwaitingMessageRecord {
    pub sender: PeerId,
    pub message_id: u32,
    pub kind: u8,
    pub content: Vec<u8>,
}

/// Decoded response payload, one variant per response code. Unknown codes
/// decode as `ServerError`: the code space belongs to the server.
#[derive(Debug)]
pub enum ResponsePayload {
    SignupSuccess {
        client_id: PeerId,
    },
    PeerList(Vec<DirectoryRecord>),
    PeerPublicKey {
        client_id: PeerId,
        public_key: [u8; PUBLIC_KEY_LEN],
    },
    MessageSent {
        client_id: PeerId,
        message_id: u32,
    },
    AwaitingMessages(Vec<AwaitingMessageRecord>),
    ServerError,
}

impl ResponsePayload {
    /// Short name used in "unexpected response" diagnostics.
    pub fn kind_name(&self) -> &'static str {
        match self {
            ResponsePayload::SignupSuccess { .. } => "signup success",
            ResponsePayload::PeerList(_) => "peer list",
            ResponsePayload::PeerPublicKey { .. } => "peer public key",
            ResponsePayload::MessageSent { .. } => "message sent",
            ResponsePayload::AwaitingMessages(_) => "awaiting messages",
            ResponsePayload::ServerError => "server error",
        }
    }
}
