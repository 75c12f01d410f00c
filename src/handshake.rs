//! Challenge-response handshake that obtains the user's search key.
//!
//! ```text
//!   Idle -> Connecting -> AwaitingChallenge -> RespondingToChallenge -> AwaitingKey -> Complete
//!     \________________________________________________________________________/
//!                                   any error -> Failed
//! ```
//!
//! [`Handshake`] is the bare state machine and never touches I/O. [`run_handshake`]
//! drives it over an [`AuthorityTransport`], and [`SearchKeyProtocol`] memoizes the
//! result with a bounded timeout.

use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;
use tracing::{debug, instrument, warn};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::group::{from_hex, to_hex};
use crate::pre::{CipherOrigin, KeyManager, PreEngine};
use crate::transport::TlsConnector;
use crate::types::{AttributeVector, SearchKey, SecretKey};

/// Messages the client emits on the realtime channel.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ClientMessage {
    #[serde(rename = "auth")]
    Auth {
        #[serde(rename = "publicKey")]
        public_key: String,
    },
    #[serde(rename = "auth-res")]
    AuthResponse {
        #[serde(rename = "decryptedValue")]
        decrypted_value: String,
    },
}

/// Hex-encoded G2 components of a [`SecretKey`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretKeyWire {
    pub sk1: String,
    pub sk2: String,
    pub sk3: String,
    pub sky: String,
}

impl SecretKeyWire {
    pub fn encode(sk: &SecretKey) -> Self {
        SecretKeyWire {
            sk1: to_hex(&sk.sk1),
            sk2: to_hex(&sk.sk2),
            sk3: to_hex(&sk.sk3),
            sky: to_hex(&sk.sky),
        }
    }

    pub fn decode(&self) -> Result<SecretKey> {
        Ok(SecretKey {
            sk1: from_hex(&self.sk1)?,
            sk2: from_hex(&self.sk2)?,
            sk3: from_hex(&self.sk3)?,
            sky: from_hex(&self.sky)?,
        })
    }
}

/// Any acknowledgement from the authority. Which fields are set depends on the step.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorityReply {
    #[serde(rename = "errorMsg", default, skip_serializing_if = "Option::is_none")]
    pub error_msg: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cipher: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spk: Option<String>,
    #[serde(rename = "SK", default, skip_serializing_if = "Option::is_none")]
    pub sk: Option<SecretKeyWire>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<Vec<u8>>,
}

impl AuthorityReply {
    pub fn error(msg: impl Into<String>) -> Self {
        AuthorityReply {
            error_msg: Some(msg.into()),
            ..Default::default()
        }
    }

    pub fn challenge(cipher: impl Into<String>, spk: impl Into<String>) -> Self {
        AuthorityReply {
            cipher: Some(cipher.into()),
            spk: Some(spk.into()),
            ..Default::default()
        }
    }

    pub fn key(sk: &SecretKey, y: &AttributeVector) -> Self {
        AuthorityReply {
            sk: Some(SecretKeyWire::encode(sk)),
            y: Some(y.to_wire()),
            ..Default::default()
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HandshakeState {
    Idle,
    Connecting,
    AwaitingChallenge,
    RespondingToChallenge,
    AwaitingKey,
    Complete,
    Failed,
}

impl HandshakeState {
    pub fn is_terminal(self) -> bool {
        matches!(self, HandshakeState::Complete | HandshakeState::Failed)
    }
}

#[derive(Clone, Debug)]
pub enum HandshakeEvent {
    /// The transport connected.
    Connected,
    /// The last outbound message was written.
    Sent,
    Reply(AuthorityReply),
    TransportError(String),
}

impl fmt::Display for HandshakeEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandshakeEvent::Connected => f.write_str("connected"),
            HandshakeEvent::Sent => f.write_str("sent"),
            HandshakeEvent::Reply(_) => f.write_str("reply"),
            HandshakeEvent::TransportError(_) => f.write_str("transport error"),
        }
    }
}

/// What the driver must do next.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Step {
    Wait,
    Send(ClientMessage),
    Done(SearchKey),
}

/// The handshake state machine for one connection attempt.
pub struct Handshake<'a, E> {
    state: HandshakeState,
    keys: &'a KeyManager<E>,
}

impl<'a, E: PreEngine> Handshake<'a, E> {
    pub fn new(keys: &'a KeyManager<E>) -> Self {
        Handshake {
            state: HandshakeState::Idle,
            keys,
        }
    }

    pub fn state(&self) -> HandshakeState {
        self.state
    }

    /// Idle -> Connecting. The caller opens the transport next.
    pub fn start(&mut self) -> Result<()> {
        if self.state != HandshakeState::Idle {
            return Err(self.fail(format!("cannot start from {:?}", self.state)));
        }
        self.transition(HandshakeState::Connecting);
        Ok(())
    }

    pub fn handle(&mut self, event: HandshakeEvent) -> Result<Step> {
        if self.state.is_terminal() {
            return Err(Error::AuthenticationFailed(format!(
                "{event} after handshake reached {:?}",
                self.state
            )));
        }

        match (self.state, event) {
            (_, HandshakeEvent::TransportError(e)) => Err(self.fail(e)),
            (_, HandshakeEvent::Reply(AuthorityReply {
                error_msg: Some(msg),
                ..
            })) => Err(self.fail(msg)),

            (HandshakeState::Connecting, HandshakeEvent::Connected) => {
                self.transition(HandshakeState::AwaitingChallenge);
                Ok(Step::Send(ClientMessage::Auth {
                    public_key: self.keys.public_key(),
                }))
            }
            (HandshakeState::AwaitingChallenge, HandshakeEvent::Sent) => Ok(Step::Wait),
            (HandshakeState::AwaitingChallenge, HandshakeEvent::Reply(reply)) => {
                self.answer_challenge(reply)
            }
            (HandshakeState::RespondingToChallenge, HandshakeEvent::Sent) => {
                self.transition(HandshakeState::AwaitingKey);
                Ok(Step::Wait)
            }
            (HandshakeState::AwaitingKey, HandshakeEvent::Reply(reply)) => self.accept_key(reply),

            (state, event) => Err(self.fail(format!("unexpected {event} while {state:?}"))),
        }
    }

    fn answer_challenge(&mut self, reply: AuthorityReply) -> Result<Step> {
        let (Some(cipher), Some(spk)) = (reply.cipher, reply.spk) else {
            return Err(self.fail("challenge is missing cipher or spk".to_owned()));
        };
        let plain = match self.keys.decrypt(
            &cipher,
            CipherOrigin::Delegated {
                proxy_public_key: &spk,
            },
        ) {
            Ok(plain) => plain,
            Err(e) => return Err(self.fail(format!("challenge decryption failed: {e}"))),
        };
        let Ok(decrypted_value) = String::from_utf8(plain) else {
            return Err(self.fail("challenge decrypted to non-UTF-8 bytes".to_owned()));
        };

        self.transition(HandshakeState::RespondingToChallenge);
        Ok(Step::Send(ClientMessage::AuthResponse { decrypted_value }))
    }

    fn accept_key(&mut self, reply: AuthorityReply) -> Result<Step> {
        let (Some(sk), Some(y)) = (reply.sk, reply.y) else {
            return Err(self.fail("key reply is missing SK or y".to_owned()));
        };
        let sk = match sk.decode() {
            Ok(sk) => sk,
            Err(e) => return Err(self.fail(format!("SK: {e}"))),
        };
        let mut bits = Vec::with_capacity(y.len());
        for b in y {
            match b {
                0 => bits.push(false),
                1 => bits.push(true),
                other => return Err(self.fail(format!("attribute bit {other} is not 0 or 1"))),
            }
        }

        self.transition(HandshakeState::Complete);
        Ok(Step::Done(SearchKey {
            sk,
            y: AttributeVector::new(bits),
        }))
    }

    fn transition(&mut self, next: HandshakeState) {
        debug!(from = ?self.state, to = ?next, "handshake transition");
        self.state = next;
    }

    fn fail(&mut self, reason: String) -> Error {
        warn!(from = ?self.state, %reason, "handshake failed");
        self.state = HandshakeState::Failed;
        Error::AuthenticationFailed(reason)
    }
}

/// One open connection to the authority's realtime channel.
pub trait AuthorityTransport: Send {
    fn send(&mut self, message: ClientMessage) -> impl Future<Output = Result<()>> + Send;

    fn recv(&mut self) -> impl Future<Output = Result<AuthorityReply>> + Send;
}

/// Opens fresh transports.
pub trait Connector: Send + Sync {
    type Transport: AuthorityTransport;

    fn connect(&self) -> impl Future<Output = Result<Self::Transport>> + Send;
}

/// Runs one complete handshake over a new connection.
#[instrument(level = "info", skip_all)]
pub async fn run_handshake<C, E>(connector: &C, keys: &KeyManager<E>) -> Result<SearchKey>
where
    C: Connector,
    E: PreEngine,
{
    let mut handshake = Handshake::new(keys);
    handshake.start()?;

    let mut transport = match connector.connect().await {
        Ok(t) => t,
        Err(e) => return Err(handshake.fail(e.to_string())),
    };

    let mut step = handshake.handle(HandshakeEvent::Connected)?;
    loop {
        let event = match step {
            Step::Done(key) => return Ok(key),
            Step::Send(message) => match transport.send(message).await {
                Ok(()) => HandshakeEvent::Sent,
                Err(e) => HandshakeEvent::TransportError(e.to_string()),
            },
            Step::Wait => match transport.recv().await {
                Ok(reply) => HandshakeEvent::Reply(reply),
                Err(e) => HandshakeEvent::TransportError(e.to_string()),
            },
        };
        step = handshake.handle(event)?;
    }
}

/// Memoized access to the user's search key.
///
/// The first successful handshake wins; concurrent callers wait for the one in
/// flight. A failed or timed-out handshake leaves nothing cached. [`reset`]
/// drops the cached key so the next [`get_key`] logs in again with whatever
/// keys the [`KeyManager`] holds by then.
///
/// [`reset`]: SearchKeyProtocol::reset
/// [`get_key`]: SearchKeyProtocol::get_key
pub struct SearchKeyProtocol<C, E> {
    connector: C,
    keys: Arc<KeyManager<E>>,
    timeout: Duration,
    cache: Mutex<Arc<OnceCell<Arc<SearchKey>>>>,
}

impl<E: PreEngine> SearchKeyProtocol<TlsConnector, E> {
    /// Connects to `authority_socket` over TLS with the configured timeout.
    pub fn from_config(config: &Config, keys: Arc<KeyManager<E>>) -> Result<Self> {
        let connector =
            TlsConnector::new(config.authority_socket.clone(), config.authority_host())?;
        Ok(Self::new(connector, keys, config.handshake_timeout()))
    }
}

impl<C: Connector, E: PreEngine> SearchKeyProtocol<C, E> {
    pub fn new(connector: C, keys: Arc<KeyManager<E>>, timeout: Duration) -> Self {
        SearchKeyProtocol {
            connector,
            keys,
            timeout,
            cache: Mutex::new(Arc::new(OnceCell::new())),
        }
    }

    fn current(&self) -> Arc<OnceCell<Arc<SearchKey>>> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    #[instrument(level = "debug", skip_all)]
    pub async fn get_key(&self) -> Result<Arc<SearchKey>> {
        let cell = self.current();
        if let Some(key) = cell.get() {
            debug!("search key served from cache");
            return Ok(Arc::clone(key));
        }
        let key = cell
            .get_or_try_init(|| async {
                let handshake = run_handshake(&self.connector, self.keys.as_ref());
                match tokio::time::timeout(self.timeout, handshake).await {
                    Ok(result) => result.map(Arc::new),
                    Err(_) => {
                        warn!(timeout = ?self.timeout, "handshake timed out");
                        Err(Error::AuthenticationFailed(format!(
                            "handshake timed out after {:?}",
                            self.timeout
                        )))
                    }
                }
            })
            .await?;
        Ok(Arc::clone(key))
    }

    pub fn cached(&self) -> Option<Arc<SearchKey>> {
        self.current().get().cloned()
    }

    /// Forgets the cached key. A handshake already in flight finishes into the
    /// discarded cell.
    pub fn reset(&self) {
        *self.cache.lock().unwrap_or_else(PoisonError::into_inner) = Arc::new(OnceCell::new());
        debug!("search key cache cleared");
    }

    /// Drops the cached key and runs a fresh handshake.
    #[instrument(level = "info", skip_all)]
    pub async fn relogin(&self) -> Result<Arc<SearchKey>> {
        self.reset();
        self.get_key().await
    }

    /// The key manager whose public key identifies the user to the authority.
    pub fn keys(&self) -> &KeyManager<E> {
        &self.keys
    }
}
