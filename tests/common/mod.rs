//! Shared fixtures: a toy PRE engine and a scripted in-process authority.
#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use abse_core::authority;
use abse_core::handshake::{AuthorityReply, ClientMessage};
use abse_core::pre::{CipherOrigin, PreEngine, PreKeyMaterial};
use abse_core::transport::{AuthorityEndpoint, InProcessConnector};
use abse_core::{AttributeVector, Error, PublicParameters, Result, SecretKey};
use ark_std::rand::SeedableRng;
use rand::rngs::StdRng;
use sha2::{Digest, Sha256};

/// XOR with a SHA-256 keystream derived from the public key. Plumbing only.
#[derive(Clone, Debug)]
pub struct ToyEngine {
    material: PreKeyMaterial,
}

impl ToyEngine {
    pub fn named(name: &str) -> Self {
        ToyEngine {
            material: PreKeyMaterial {
                public_key: format!("pk-{name}"),
                secret_key: format!("sk-{name}"),
            },
        }
    }
}

fn keystream(public_key: &str, len: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(len);
    let mut counter = 0u32;
    while out.len() < len {
        let mut hasher = Sha256::new();
        hasher.update(public_key.as_bytes());
        hasher.update(counter.to_be_bytes());
        out.extend_from_slice(&hasher.finalize());
        counter += 1;
    }
    out.truncate(len);
    out
}

pub fn seal_for(public_key: &str, plaintext: &[u8]) -> String {
    let ks = keystream(public_key, plaintext.len());
    hex::encode(plaintext.iter().zip(ks).map(|(a, b)| a ^ b).collect::<Vec<_>>())
}

impl PreEngine for ToyEngine {
    fn from_material(material: PreKeyMaterial) -> Result<Self> {
        Ok(ToyEngine { material })
    }

    fn export_keys(&self) -> PreKeyMaterial {
        self.material.clone()
    }

    fn public_key(&self) -> String {
        self.material.public_key.clone()
    }

    fn encrypt(&self, plaintext: &[u8]) -> Result<String> {
        Ok(seal_for(&self.material.public_key, plaintext))
    }

    fn decrypt(&self, cipher: &str, _origin: CipherOrigin<'_>) -> Result<Vec<u8>> {
        let bytes = hex::decode(cipher).map_err(|e| Error::Engine(e.to_string()))?;
        let ks = keystream(&self.material.public_key, bytes.len());
        Ok(bytes.iter().zip(ks).map(|(a, b)| a ^ b).collect())
    }

    fn rekey_gen(&self, requester_public_key: &str) -> Result<String> {
        Ok(format!("{}->{}", self.material.public_key, requester_public_key))
    }
}

pub fn universe() -> Vec<String> {
    ["age", "dept", "role"].iter().map(|s| s.to_string()).collect()
}

/// How the scripted authority behaves on each connection.
#[derive(Clone, Debug, Default)]
pub struct Behaviour {
    /// Answer `auth` with this error.
    pub reject_auth: Option<String>,
    /// Hold every reply back this long.
    pub delay: Option<Duration>,
    /// Expect a different answer to the challenge than the one sent.
    pub wrong_nonce: bool,
    /// Answer `auth` with an error on this many connections before serving normally.
    pub reject_first: usize,
}

pub struct MockAuthority {
    pub pp: PublicParameters,
    pub sk: SecretKey,
    pub y: AttributeVector,
    pub behaviour: Behaviour,
    pub connections: AtomicUsize,
}

impl MockAuthority {
    pub fn new(behaviour: Behaviour) -> Arc<Self> {
        let mut rng = StdRng::seed_from_u64(2024);
        let (pp, msk) = authority::setup(&universe(), &mut rng);
        let y = AttributeVector::new(vec![true, false, true]);
        let sk = authority::issue_key(&msk, &pp, &y, &mut rng);
        Arc::new(MockAuthority {
            pp,
            sk,
            y,
            behaviour,
            connections: AtomicUsize::new(0),
        })
    }

    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    pub fn connector(
        self: &Arc<Self>,
    ) -> InProcessConnector<impl Fn(AuthorityEndpoint) + Send + Sync> {
        let authority = Arc::clone(self);
        InProcessConnector::new(move |endpoint| {
            let seq = authority.connections.fetch_add(1, Ordering::SeqCst);
            tokio::spawn(Arc::clone(&authority).serve(endpoint, seq));
        })
    }

    async fn serve(self: Arc<Self>, mut endpoint: AuthorityEndpoint, seq: usize) {
        let nonce = "challenge-7f3a";

        let Some(ClientMessage::Auth { public_key }) = endpoint.recv().await else {
            endpoint.reply(AuthorityReply::error("expected auth"));
            return;
        };
        self.pause().await;
        if let Some(msg) = &self.behaviour.reject_auth {
            endpoint.reply(AuthorityReply::error(msg.clone()));
            return;
        }
        if seq < self.behaviour.reject_first {
            endpoint.reply(AuthorityReply::error("authority busy"));
            return;
        }
        endpoint.reply(AuthorityReply::challenge(
            seal_for(&public_key, nonce.as_bytes()),
            "pk-authority",
        ));

        let Some(ClientMessage::AuthResponse { decrypted_value }) = endpoint.recv().await else {
            endpoint.reply(AuthorityReply::error("expected auth-res"));
            return;
        };
        self.pause().await;
        if decrypted_value != nonce || self.behaviour.wrong_nonce {
            endpoint.reply(AuthorityReply::error("challenge mismatch"));
            return;
        }
        endpoint.reply(AuthorityReply::key(&self.sk, &self.y));
    }

    async fn pause(&self) {
        if let Some(delay) = self.behaviour.delay {
            tokio::time::sleep(delay).await;
        }
    }
}
