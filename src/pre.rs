//! Proxy re-encryption key management.
//!
//! The PRE primitive itself lives in an external engine; this module owns the
//! key material around it and exposes the operations the handshake and the
//! recovery flow need.

use std::sync::{PoisonError, RwLock, RwLockReadGuard};

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::error::Result;

/// Serializable PRE key pair, as escrowed in a recovery bundle.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreKeyMaterial {
    pub public_key: String,
    pub secret_key: String,
}

impl std::fmt::Debug for PreKeyMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PreKeyMaterial")
            .field("public_key", &self.public_key)
            .field("secret_key", &"<redacted>")
            .finish()
    }
}

/// Who a ciphertext was produced for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CipherOrigin<'a> {
    /// Encrypted directly under our own public key.
    Owned,
    /// Produced by another party; decrypt with their public key in the loop.
    Delegated { proxy_public_key: &'a str },
}

/// Contract of the native proxy re-encryption engine.
pub trait PreEngine: Send + Sync + Sized {
    fn from_material(material: PreKeyMaterial) -> Result<Self>;

    fn export_keys(&self) -> PreKeyMaterial;

    fn public_key(&self) -> String;

    fn encrypt(&self, plaintext: &[u8]) -> Result<String>;

    fn decrypt(&self, cipher: &str, origin: CipherOrigin<'_>) -> Result<Vec<u8>>;

    /// Re-encryption key from us towards `requester_public_key`.
    fn rekey_gen(&self, requester_public_key: &str) -> Result<String>;
}

/// Holds the user's PRE engine and its key material.
///
/// The engine can be swapped through a shared reference, so a recovery flow can
/// install restored keys while the handshake still holds this manager.
#[derive(Debug)]
pub struct KeyManager<E> {
    engine: RwLock<E>,
}

impl<E: PreEngine> KeyManager<E> {
    pub fn new(engine: E) -> Self {
        KeyManager {
            engine: RwLock::new(engine),
        }
    }

    pub fn from_material(material: PreKeyMaterial) -> Result<Self> {
        Ok(Self::new(E::from_material(material)?))
    }

    fn engine(&self) -> RwLockReadGuard<'_, E> {
        self.engine.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn public_key(&self) -> String {
        self.engine().public_key()
    }

    pub fn encrypt(&self, plaintext: &[u8]) -> Result<String> {
        self.engine().encrypt(plaintext)
    }

    pub fn decrypt(&self, cipher: &str, origin: CipherOrigin<'_>) -> Result<Vec<u8>> {
        self.engine().decrypt(cipher, origin)
    }

    #[instrument(level = "debug", skip_all)]
    pub fn rekey(&self, requester_public_key: &str) -> Result<String> {
        debug!("generating re-encryption key");
        self.engine().rekey_gen(requester_public_key)
    }

    /// Key material to place in a recovery bundle.
    pub fn export(&self) -> PreKeyMaterial {
        self.engine().export_keys()
    }

    /// Replaces the current keys with recovered ones. Rejected material leaves
    /// the current keys in place.
    #[instrument(level = "info", skip_all)]
    pub fn restore(&self, material: PreKeyMaterial) -> Result<()> {
        let engine = E::from_material(material)?;
        *self.engine.write().unwrap_or_else(PoisonError::into_inner) = engine;
        debug!("proxy re-encryption keys restored");
        Ok(())
    }
}


#[cfg(test)]
mod tests {
    use super::testing::XorEngine;
    use super::*;

    #[test]
    fn export_restore_round_trip() {
        let alice = KeyManager::new(XorEngine::named("alice"));
        let other = KeyManager::new(XorEngine::named("bob"));

        let cipher = alice.encrypt(b"wallet").unwrap();
        other.restore(alice.export()).unwrap();

        assert_eq!(other.public_key(), "pk-alice");
        assert_eq!(other.decrypt(&cipher, CipherOrigin::Owned).unwrap(), b"wallet");
    }

    #[test]
    fn restore_rejects_foreign_material() {
        let km = KeyManager::new(XorEngine::named("alice"));
        let bogus = PreKeyMaterial {
            public_key: "garbage".into(),
            secret_key: "garbage".into(),
        };
        assert!(km.restore(bogus).is_err());
        assert_eq!(km.public_key(), "pk-alice");
    }

    #[test]
    fn restore_through_shared_handle() {
        let shared = std::sync::Arc::new(KeyManager::new(XorEngine::named("device")));
        let held = std::sync::Arc::clone(&shared);

        shared.restore(XorEngine::named("alice").export_keys()).unwrap();
        assert_eq!(held.public_key(), "pk-alice");
    }

    #[test]
    fn debug_redacts_secret() {
        let material = XorEngine::named("alice").export_keys();
        let shown = format!("{material:?}");
        assert!(shown.contains("pk-alice"));
        assert!(!shown.contains("sk-alice"));
    }

    #[test]
    fn material_serializes_camel_case() {
        let json = serde_json::to_value(XorEngine::named("a").export_keys()).unwrap();
        assert_eq!(json["publicKey"], "pk-a");
        assert_eq!(json["secretKey"], "sk-a");
    }
}
