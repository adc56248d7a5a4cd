//! Curve25519 keypairs used for end-to-end encryption between a first-party
//! minter and a third-party discharger.
//!
//! This is a different primitive from [`super::key::MacaroonKey`]: that one
//! is a symmetric HMAC root secret, these are asymmetric Curve25519 keys
//! used to seal third-party caveat payloads. Key agreement uses X25519
//! (`x25519-dalek`); the agreed secret keys an XChaCha20-Poly1305 AEAD, the
//! 24-byte-nonce construction that actually matches a NaCl/libsodium box
//! (plain ChaCha20-Poly1305 only takes a 12-byte nonce, which is why this
//! crate carries `chacha20poly1305`'s XChaCha20Poly1305 variant rather than
//! the base cipher).

use chacha20poly1305::aead::Aead;
use chacha20poly1305::{KeyInit, XChaCha20Poly1305, XNonce};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use x25519_dalek::{PublicKey as X25519Public, StaticSecret};

use crate::error::{MacaroonError, Result};

pub const NACL_NONCE_BYTES: usize = 24;

/// A Curve25519 public key, serialized as raw bytes (base64 in JSON).
#[derive(Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicKey(#[serde(with = "key_bytes")] pub [u8; 32]);

impl PublicKey {
    pub fn to_bytes(&self) -> [u8; 32] {
        self.0
    }

    pub fn prefix(&self) -> [u8; 4] {
        let mut p = [0u8; 4];
        p.copy_from_slice(&self.0[..4]);
        p
    }
}

impl std::fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PublicKey({})", base64::encode(self.0))
    }
}

impl From<[u8; 32]> for PublicKey {
    fn from(b: [u8; 32]) -> Self {
        PublicKey(b)
    }
}

impl From<&X25519Public> for PublicKey {
    fn from(p: &X25519Public) -> Self {
        PublicKey(*p.as_bytes())
    }
}

/// A Curve25519 private key. `Debug` intentionally omits the scalar.
#[derive(Clone)]
pub struct PrivateKey {
    secret: StaticSecret,
    public: PublicKey,
}

impl std::fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrivateKey")
            .field("public", &self.public)
            .finish()
    }
}

impl PrivateKey {
    /// Generate a new random keypair, using a secure random number generator.
    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();
        let mut bytes = [0u8; 32];
        rng.fill_bytes(&mut bytes);
        Self::from_bytes(bytes)
    }

    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        let secret = StaticSecret::from(bytes);
        let public = PublicKey::from(&X25519Public::from(&secret));
        PrivateKey { secret, public }
    }

    pub fn public_key(&self) -> PublicKey {
        self.public
    }

    /// Seal `plaintext` for `recipient` using an X25519-derived shared
    /// secret and XChaCha20-Poly1305, emulating a NaCl box. Returns
    /// `(nonce, ciphertext)`.
    pub fn seal(&self, recipient: &PublicKey, plaintext: &[u8]) -> Result<(Vec<u8>, Vec<u8>)> {
        let cipher = self.box_cipher(recipient);
        let mut nonce_bytes = [0u8; NACL_NONCE_BYTES];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let nonce = XNonce::from_slice(&nonce_bytes);
        let ciphertext = cipher
            .encrypt(nonce, plaintext)
            .map_err(|_| MacaroonError::CryptoError("box seal failed"))?;
        Ok((nonce_bytes.to_vec(), ciphertext))
    }

    /// Open a ciphertext sealed by `sender` for us.
    pub fn open(&self, sender: &PublicKey, nonce: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>> {
        if nonce.len() != NACL_NONCE_BYTES {
            return Err(MacaroonError::CryptoError("bad nonce length"));
        }
        let cipher = self.box_cipher(sender);
        let n = XNonce::from_slice(nonce);
        cipher
            .decrypt(n, ciphertext)
            .map_err(|_| MacaroonError::CryptoError("box open failed"))
    }

    fn box_cipher(&self, other: &PublicKey) -> XChaCha20Poly1305 {
        let their_public = X25519Public::from(other.0);
        let shared = self.secret.diffie_hellman(&their_public);
        XChaCha20Poly1305::new_from_slice(shared.as_bytes()).expect("32-byte key")
    }
}

mod key_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8; 32], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&base64::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<[u8; 32], D::Error> {
        let s = String::deserialize(d)?;
        let v = base64::decode(s).map_err(serde::de::Error::custom)?;
        v.try_into()
            .map_err(|_| serde::de::Error::custom("public key must be 32 bytes"))
    }
}
