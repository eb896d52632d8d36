//! Key exchange adapter: RSA-1024 identity keypair and per-peer AES-128-CBC
//! message keys, exposed to the rest of the crate as fixed-size byte arrays.
//!
//! OAEP uses SHA-1 and CBC uses a zero IV with PKCS7 padding; both are fixed
//! by the wire protocol, which predates this implementation.

use aes::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use rand::rngs::OsRng;
use rand::RngCore;
use rsa::pkcs1::{
    DecodeRsaPrivateKey, DecodeRsaPublicKey, EncodeRsaPrivateKey, EncodeRsaPublicKey,
};
use rsa::{Oaep, RsaPrivateKey, RsaPublicKey};
use sha1::Sha1;

use crate::protocol::{PUBLIC_KEY_LEN, SYMMETRIC_KEY_LEN};

/// RSA modulus size for the identity keypair.
pub const RSA_BITS: usize = 1024;

const ZERO_IV: [u8; 16] = [0u8; 16];

type Aes128CbcEnc = cbc::Encryptor<aes::Aes128>;
type Aes128CbcDec = cbc::Decryptor<aes::Aes128>;

#[derive(Debug, thiserror::Error)]
pub enum KeyError {
    #[error("rsa operation failed: {0}")]
    Rsa(#[from] rsa::Error),
    #[error("bad key encoding: {0}")]
    Encoding(String),
    #[error("recovered symmetric key has unexpected length {0}")]
    UnexpectedLength(usize),
    #[error("message decryption failed")]
    DecryptFailed,
    #[error("public key does not fit its wire slot")]
    OversizedPublicKey,
    #[error("malformed public key slot")]
    BadPublicKeySlot,
}

/// The local RSA identity keypair.
#[derive(Clone)]
pub struct Keypair {
    private: RsaPrivateKey,
    public: RsaPublicKey,
}

impl Keypair {
    /// Generate a fresh keypair. Used on first run, before any identity file
    /// exists.
    pub fn generate() -> Result<Self, KeyError> {
        let private = RsaPrivateKey::new(&mut OsRng, RSA_BITS)?;
        let public = private.to_public_key();
        Ok(Self { private, public })
    }

    /// Decode the persisted form: base64 over PKCS#1 DER. Whitespace (line
    /// breaks from older encoders) is tolerated.
    pub fn from_encoded(encoded: &str) -> Result<Self, KeyError> {
        let cleaned: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();
        let der = BASE64
            .decode(cleaned.as_bytes())
            .map_err(|e| KeyError::Encoding(e.to_string()))?;
        let private =
            RsaPrivateKey::from_pkcs1_der(&der).map_err(|e| KeyError::Encoding(e.to_string()))?;
        let public = private.to_public_key();
        Ok(Self { private, public })
    }

    /// Opaque encoded private key for the identity file.
    pub fn encoded_private(&self) -> Result<String, KeyError> {
        let der = self
            .private
            .to_pkcs1_der()
            .map_err(|e| KeyError::Encoding(e.to_string()))?;
        Ok(BASE64.encode(der.as_bytes()))
    }

    /// DER public key padded into the fixed 160-byte wire slot.
    pub fn public_key_slot(&self) -> Result<[u8; PUBLIC_KEY_LEN], KeyError> {
        let der = self
            .public
            .to_pkcs1_der()
            .map_err(|e| KeyError::Encoding(e.to_string()))?;
        let bytes = der.as_bytes();
        if bytes.len() > PUBLIC_KEY_LEN {
            return Err(KeyError::OversizedPublicKey);
        }
        let mut slot = [0u8; PUBLIC_KEY_LEN];
        slot[..bytes.len()].copy_from_slice(bytes);
        Ok(slot)
    }

    /// Recover a peer's symmetric key from an OAEP-wrapped ciphertext.
    /// The recovered plaintext must be exactly 16 bytes; anything else is a
    /// protocol violation, not a usable key.
    pub fn unwrap_symmetric_key(&self, ciphertext: &[u8]) -> Result<SymmetricKey, KeyError> {
        let plain = self
            .private
            .decrypt(Oaep::new::<Sha1>(), ciphertext)
            .map_err(|_| KeyError::DecryptFailed)?;
        if plain.len() != SYMMETRIC_KEY_LEN {
            return Err(KeyError::UnexpectedLength(plain.len()));
        }
        let mut key = [0u8; SYMMETRIC_KEY_LEN];
        key.copy_from_slice(&plain);
        Ok(SymmetricKey(key))
    }
}

/// OAEP-wrap a symmetric key under a peer's public key slot. Output length
/// is the peer's modulus size.
pub fn wrap_symmetric_key(
    peer_public_slot: &[u8; PUBLIC_KEY_LEN],
    key: &SymmetricKey,
) -> Result<Vec<u8>, KeyError> {
    let der = trim_der(peer_public_slot)?;
    let public =
        RsaPublicKey::from_pkcs1_der(der).map_err(|e| KeyError::Encoding(e.to_string()))?;
    Ok(public.encrypt(&mut OsRng, Oaep::new::<Sha1>(), key.as_bytes())?)
}

/// The DER document inside a zero-padded slot. DER is self-delimiting, so
/// the outer SEQUENCE header gives the real length.
fn trim_der(slot: &[u8]) -> Result<&[u8], KeyError> {
    if slot.len() < 2 || slot[0] != 0x30 {
        return Err(KeyError::BadPublicKeySlot);
    }
    let len = match slot[1] {
        n @ 0x00..=0x7f => 2 + n as usize,
        0x81 => {
            if slot.len() < 3 {
                return Err(KeyError::BadPublicKeySlot);
            }
            3 + slot[2] as usize
        }
        0x82 => {
            if slot.len() < 4 {
                return Err(KeyError::BadPublicKeySlot);
            }
            4 + u16::from_be_bytes([slot[2], slot[3]]) as usize
        }
        _ => return Err(KeyError::BadPublicKeySlot),
    };
    if len > slot.len() {
        return Err(KeyError::BadPublicKeySlot);
    }
    Ok(&slot[..len])
}

/// 16-byte AES message key shared with one peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SymmetricKey([u8; SYMMETRIC_KEY_LEN]);

impl SymmetricKey {
    /// Cryptographically random fresh key.
    pub fn generate() -> Self {
        let mut key = [0u8; SYMMETRIC_KEY_LEN];
        OsRng.fill_bytes(&mut key);
        SymmetricKey(key)
    }

    pub fn from_bytes(bytes: [u8; SYMMETRIC_KEY_LEN]) -> Self {
        SymmetricKey(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; SYMMETRIC_KEY_LEN] {
        &self.0
    }

    /// AES-128-CBC encrypt with PKCS7 padding.
    pub fn encrypt_message(&self, plaintext: &[u8]) -> Vec<u8> {
        Aes128CbcEnc::new(&self.0.into(), &ZERO_IV.into())
            .encrypt_padded_vec_mut::<Pkcs7>(plaintext)
    }

    /// Decrypt and interpret as UTF-8 text. Padding or encoding failures are
    /// reported as [`KeyError::DecryptFailed`].
    pub fn decrypt_message(&self, ciphertext: &[u8]) -> Result<String, KeyError> {
        if ciphertext.is_empty() || ciphertext.len() % 16 != 0 {
            return Err(KeyError::DecryptFailed);
        }
        let plain = Aes128CbcDec::new(&self.0.into(), &ZERO_IV.into())
            .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
            .map_err(|_| KeyError::DecryptFailed)?;
        String::from_utf8(plain).map_err(|_| KeyError::DecryptFailed)
    }
}
