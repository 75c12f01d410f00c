//! Passphrase-wrapped threshold backup of the user's secrets.
//!
//! split:     payload --AES-256-CBC(key, iv)--> ciphertext --Shamir(2 of 10)--> shares
//! recombine: shares --interpolate--> ciphertext --decrypt--> payload
//!
//! `key || iv` are the first 48 bytes of SHA-512(passphrase secret).

use aes::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use rand::{CryptoRng, Rng};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha512};
use tracing::{debug, instrument};

use crate::error::{Error, Result};
use crate::pre::PreKeyMaterial;
use crate::shamir;

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

pub const SHARE_COUNT: u8 = 10;
pub const SHARE_THRESHOLD: u8 = 2;

const KEY_LEN: usize = 32;
const IV_LEN: usize = 16;

/// One opaque share. Carries its own threshold and index.
#[derive(Clone, PartialEq, Eq)]
pub struct Share(Vec<u8>);

impl Share {
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Share(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Evaluation point, 1-based. `None` for a truncated share.
    pub fn index(&self) -> Option<u8> {
        self.0.get(1).copied()
    }

    pub fn to_base64(&self) -> String {
        STANDARD.encode(&self.0)
    }

    pub fn from_base64(encoded: &str) -> Result<Self> {
        STANDARD
            .decode(encoded.trim())
            .map(Share)
            .map_err(|e| Error::MalformedEncoding(format!("share: {e}")))
    }
}

impl std::fmt::Debug for Share {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Share")
            .field("index", &self.index())
            .field("len", &self.0.len())
            .finish()
    }
}

impl AsRef<[u8]> for Share {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// The escrowed payload: wallet key plus proxy re-encryption keys.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecretBundle {
    pub wallet_private_key: String,
    pub pre_keys: PreKeyMaterial,
}

impl SecretBundle {
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| Error::MalformedEncoding(e.to_string()))
    }

    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::MalformedEncoding(e.to_string()))
    }
}

fn derive_key_iv(secret: &[u8]) -> ([u8; KEY_LEN], [u8; IV_LEN]) {
    let digest = Sha512::digest(secret);
    let mut key = [0u8; KEY_LEN];
    let mut iv = [0u8; IV_LEN];
    key.copy_from_slice(&digest[..KEY_LEN]);
    iv.copy_from_slice(&digest[KEY_LEN..KEY_LEN + IV_LEN]);
    (key, iv)
}

/// Encrypts `payload` under `secret` and splits the ciphertext into
/// [`SHARE_COUNT`] shares with threshold [`SHARE_THRESHOLD`].
pub fn split<R: Rng + CryptoRng>(secret: &[u8], payload: &str, rng: &mut R) -> Result<Vec<Share>> {
    split_with(secret, payload, SHARE_THRESHOLD, SHARE_COUNT, rng)
}

#[instrument(level = "info", skip_all, fields(threshold = threshold, count = count))]
pub fn split_with<R: Rng + CryptoRng>(
    secret: &[u8],
    payload: &str,
    threshold: u8,
    count: u8,
    rng: &mut R,
) -> Result<Vec<Share>> {
    let (key, iv) = derive_key_iv(secret);
    let ciphertext = Aes256CbcEnc::new(&key.into(), &iv.into())
        .encrypt_padded_vec_mut::<Pkcs7>(payload.as_bytes());

    let shares = shamir::split(&ciphertext, threshold, count, rng)
        .map_err(|e| Error::Config(e.to_string()))?;
    debug!(shares = shares.len(), "secret split");
    Ok(shares.into_iter().map(Share).collect())
}

/// Rebuilds the payload from any threshold-many shares.
///
/// Returns `None` for too few or inconsistent shares, a wrong passphrase, or a
/// plaintext that is not UTF-8.
#[instrument(level = "info", skip_all, fields(provided = shares.len()))]
pub fn recombine(secret: &[u8], shares: &[Share]) -> Option<String> {
    let ciphertext = match shamir::combine(shares) {
        Ok(ct) => ct,
        Err(e) => {
            debug!(error = %e, "share interpolation failed");
            return None;
        }
    };

    let (key, iv) = derive_key_iv(secret);
    let plaintext = match Aes256CbcDec::new(&key.into(), &iv.into())
        .decrypt_padded_vec_mut::<Pkcs7>(&ciphertext)
    {
        Ok(p) => p,
        Err(_) => {
            debug!("share ciphertext did not decrypt");
            return None;
        }
    };

    String::from_utf8(plaintext).ok()
}
