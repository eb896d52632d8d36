//! Peer registry: directory of known peers and their per-peer key state.
//!
//! Backed by a Vec so iteration (and therefore name lookup) follows insertion
//! order. The server does not guarantee unique names; `find_by_name` returns
//! the first match by policy.

use crate::identity::{PeerId, PeerName};
use crate::keys::SymmetricKey;
use crate::protocol::PUBLIC_KEY_LEN;

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("no peer named \"{0}\"")]
    NotFound(String),
    #[error("unknown peer {0}")]
    UnknownPeer(PeerId),
}

/// A known peer. Key material is all-or-nothing: each key is either absent
/// or present at its exact fixed size.
#[derive(Debug, Clone)]
pub struct Peer {
    id: PeerId,
    name: PeerName,
    public_key: Option<[u8; PUBLIC_KEY_LEN]>,
    symmetric_key: Option<SymmetricKey>,
}

impl Peer {
    pub fn id(&self) -> PeerId {
        self.id
    }

    pub fn name(&self) -> &PeerName {
        &self.name
    }

    pub fn public_key(&self) -> Option<&[u8; PUBLIC_KEY_LEN]> {
        self.public_key.as_ref()
    }

    pub fn symmetric_key(&self) -> Option<&SymmetricKey> {
        self.symmetric_key.as_ref()
    }
}

/// In-memory peer directory, keyed by [`PeerId`]. Peers are never removed
/// during a session.
#[derive(Debug, Default)]
pub struct PeerRegistry {
    peers: Vec<Peer>,
}

impl PeerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a peer learned from a directory listing, or refresh its name.
    /// A refresh never resets key state already learned for the peer.
    pub fn upsert_from_directory(&mut self, id: PeerId, name: PeerName) {
        match self.peers.iter_mut().find(|p| p.id == id) {
            Some(peer) => peer.name = name,
            None => self.peers.push(Peer {
                id,
                name,
                public_key: None,
                symmetric_key: None,
            }),
        }
    }

    pub fn get(&self, id: PeerId) -> Option<&Peer> {
        self.peers.iter().find(|p| p.id == id)
    }

    /// First peer with this exact name, in insertion order. Names are not
    /// unique server-side; first-match is documented policy.
    pub fn find_by_name(&self, name: &str) -> Result<PeerId, RegistryError> {
        self.peers
            .iter()
            .find(|p| p.name.as_str() == name)
            .map(|p| p.id)
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))
    }

    pub fn set_public_key(
        &mut self,
        id: PeerId,
        key: [u8; PUBLIC_KEY_LEN],
    ) -> Result<(), RegistryError> {
        let peer = self
            .peers
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or(RegistryError::UnknownPeer(id))?;
        peer.public_key = Some(key);
        Ok(())
    }

    pub fn set_symmetric_key(&mut self, id: PeerId, key: SymmetricKey) -> Result<(), RegistryError> {
        let peer = self
            .peers
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or(RegistryError::UnknownPeer(id))?;
        peer.symmetric_key = Some(key);
        Ok(())
    }

    /// A symmetric key can only be sent to a peer whose public key is known.
    pub fn can_receive_symmetric_key(&self, id: PeerId) -> bool {
        self.get(id).is_some_and(|p| p.public_key.is_some())
    }

    pub fn can_encrypt_to(&self, id: PeerId) -> bool {
        self.get(id).is_some_and(|p| p.symmetric_key.is_some())
    }

    pub fn can_decrypt_from(&self, id: PeerId) -> bool {
        self.can_encrypt_to(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Peer> {
        self.peers.iter()
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }
}
