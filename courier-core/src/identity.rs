//! Client identity: peer IDs, bounded peer names, local registration state.

use std::fmt;

use crate::keys::Keypair;
use crate::protocol::NAME_SLOT_LEN;

/// Longest name the protocol can carry: the 255-byte wire slot keeps one byte
/// for the terminator.
pub const MAX_NAME_LEN: usize = NAME_SLOT_LEN - 1;

/// Opaque 16-byte peer identifier, assigned by the directory server.
/// The all-zero ID is reserved for the not-yet-registered client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PeerId([u8; 16]);

impl PeerId {
    pub const LEN: usize = 16;

    /// ID of a client that has not registered yet.
    pub const ZERO: PeerId = PeerId([0u8; 16]);

    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        PeerId(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 16]
    }

    /// Lowercase hex form, as persisted in the identity file.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse the 32-hex-digit persisted form.
    pub fn from_hex(s: &str) -> Result<Self, IdentityError> {
        let raw = hex::decode(s.trim()).map_err(|_| IdentityError::BadId)?;
        let bytes: [u8; 16] = raw.try_into().map_err(|_| IdentityError::BadId)?;
        Ok(PeerId(bytes))
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Peer display name. Bounded to [`MAX_NAME_LEN`] bytes; longer input is
/// truncated, not rejected, matching the fixed-capacity wire slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerName(String);

impl PeerName {
    /// Build a name, truncating to the wire capacity on a char boundary.
    pub fn new(name: &str) -> Self {
        if name.len() <= MAX_NAME_LEN {
            return PeerName(name.to_string());
        }
        let mut end = MAX_NAME_LEN;
        while !name.is_char_boundary(end) {
            end -= 1;
        }
        PeerName(name[..end].to_string())
    }

    /// Decode a zero-padded 255-byte wire slot: bytes up to the first NUL.
    pub fn from_wire(slot: &[u8; NAME_SLOT_LEN]) -> Self {
        let len = slot.iter().position(|&b| b == 0).unwrap_or(slot.len());
        PeerName::new(&String::from_utf8_lossy(&slot[..len]))
    }

    /// Encode into the fixed 255-byte slot, zero-padded.
    pub fn to_wire(&self) -> [u8; NAME_SLOT_LEN] {
        let mut slot = [0u8; NAME_SLOT_LEN];
        slot[..self.0.len()].copy_from_slice(self.0.as_bytes());
        slot
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for PeerName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    #[error("client id must be 32 hex digits")]
    BadId,
}

/// The local client's identity. The ID stays zero until the server assigns
/// one at signup; registration is a one-way transition.
pub struct LocalIdentity {
    own_id: PeerId,
    own_name: PeerName,
    keypair: Keypair,
    registered: bool,
}

impl LocalIdentity {
    /// Fresh identity: not registered, zero ID, empty name.
    pub fn unregistered(keypair: Keypair) -> Self {
        Self {
            own_id: PeerId::ZERO,
            own_name: PeerName::new(""),
            keypair,
            registered: false,
        }
    }

    /// Identity restored from the persisted file of a registered client.
    pub fn restored(own_id: PeerId, own_name: PeerName, keypair: Keypair) -> Self {
        Self {
            own_id,
            own_name,
            keypair,
            registered: true,
        }
    }

    pub fn id(&self) -> PeerId {
        self.own_id
    }

    pub fn name(&self) -> &PeerName {
        &self.own_name
    }

    pub fn keypair(&self) -> &Keypair {
        &self.keypair
    }

    pub fn is_registered(&self) -> bool {
        self.registered
    }

    /// Record the server-assigned ID after a successful signup.
    pub fn complete_registration(&mut self, assigned: PeerId, name: PeerName) {
        self.own_id = assigned;
        self.own_name = name;
        self.registered = true;
    }
}
