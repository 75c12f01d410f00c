//! Transports for the authority's realtime channel.
//!
//! * [`ChannelTransport`]: in-memory `mpsc` pair, for in-process authorities and tests.
//! * [`StreamTransport`]: one JSON document per line over any async byte stream.
//! * [`TlsConnector`]: [`StreamTransport`] over rustls, verified against webpki roots.
//! * [`InsecureTcpConnector`]: [`StreamTransport`] over bare TCP, for local authorities.

use std::sync::Arc;

use tokio::io::{
    AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader, ReadHalf,
    WriteHalf,
};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_rustls::client::TlsStream;
use tokio_rustls::rustls::crypto::ring;
use tokio_rustls::rustls::pki_types::ServerName;
use tokio_rustls::rustls::{ClientConfig, RootCertStore};
use tracing::debug;

use crate::error::{Error, Result};
use crate::handshake::{AuthorityReply, AuthorityTransport, ClientMessage, Connector};

/// Client half of an in-memory channel.
#[derive(Debug)]
pub struct ChannelTransport {
    outbound: mpsc::UnboundedSender<ClientMessage>,
    inbound: mpsc::UnboundedReceiver<AuthorityReply>,
}

/// Authority half of an in-memory channel.
#[derive(Debug)]
pub struct AuthorityEndpoint {
    inbound: mpsc::UnboundedReceiver<ClientMessage>,
    outbound: mpsc::UnboundedSender<AuthorityReply>,
}

impl AuthorityEndpoint {
    /// Next client message, or `None` once the client hung up.
    pub async fn recv(&mut self) -> Option<ClientMessage> {
        self.inbound.recv().await
    }

    /// Returns false if the client is gone.
    pub fn reply(&self, reply: AuthorityReply) -> bool {
        self.outbound.send(reply).is_ok()
    }
}

pub fn channel_pair() -> (ChannelTransport, AuthorityEndpoint) {
    let (client_tx, authority_rx) = mpsc::unbounded_channel();
    let (authority_tx, client_rx) = mpsc::unbounded_channel();
    (
        ChannelTransport {
            outbound: client_tx,
            inbound: client_rx,
        },
        AuthorityEndpoint {
            inbound: authority_rx,
            outbound: authority_tx,
        },
    )
}

impl AuthorityTransport for ChannelTransport {
    async fn send(&mut self, message: ClientMessage) -> Result<()> {
        self.outbound
            .send(message)
            .map_err(|_| Error::UnreachableAuthority("authority closed the channel".into()))
    }

    async fn recv(&mut self) -> Result<AuthorityReply> {
        self.inbound
            .recv()
            .await
            .ok_or_else(|| Error::UnreachableAuthority("authority closed the channel".into()))
    }
}

/// Connects by creating a fresh channel pair and handing the authority half to `serve`.
pub struct InProcessConnector<F> {
    serve: F,
}

impl<F> InProcessConnector<F>
where
    F: Fn(AuthorityEndpoint) + Send + Sync,
{
    pub fn new(serve: F) -> Self {
        InProcessConnector { serve }
    }
}

impl<F> Connector for InProcessConnector<F>
where
    F: Fn(AuthorityEndpoint) + Send + Sync,
{
    type Transport = ChannelTransport;

    async fn connect(&self) -> Result<ChannelTransport> {
        let (client, authority) = channel_pair();
        (self.serve)(authority);
        Ok(client)
    }
}

/// Longest reply line accepted from the authority, newline included.
const MAX_FRAME_LEN: u64 = 64 * 1024;

/// Newline-delimited JSON over a byte stream.
pub struct StreamTransport<S> {
    reader: BufReader<ReadHalf<S>>,
    writer: WriteHalf<S>,
    line: String,
}

impl<S: AsyncRead + AsyncWrite + Send> StreamTransport<S> {
    pub fn new(stream: S) -> Self {
        let (read, write) = tokio::io::split(stream);
        StreamTransport {
            reader: BufReader::new(read),
            writer: write,
            line: String::new(),
        }
    }
}

impl<S: AsyncRead + AsyncWrite + Send> AuthorityTransport for StreamTransport<S> {
    async fn send(&mut self, message: ClientMessage) -> Result<()> {
        let mut frame = serde_json::to_vec(&message)
            .map_err(|e| Error::AuthenticationFailed(format!("encoding {message:?}: {e}")))?;
        frame.push(b'\n');
        self.writer
            .write_all(&frame)
            .await
            .map_err(|e| Error::UnreachableAuthority(e.to_string()))?;
        self.writer
            .flush()
            .await
            .map_err(|e| Error::UnreachableAuthority(e.to_string()))
    }

    async fn recv(&mut self) -> Result<AuthorityReply> {
        self.line.clear();
        let read = (&mut self.reader)
            .take(MAX_FRAME_LEN)
            .read_line(&mut self.line)
            .await
            .map_err(|e| Error::UnreachableAuthority(e.to_string()))?;
        if read == 0 {
            return Err(Error::UnreachableAuthority("connection closed".into()));
        }
        if read as u64 == MAX_FRAME_LEN && !self.line.ends_with('\n') {
            return Err(Error::MalformedResponse(format!("reply exceeds {MAX_FRAME_LEN} bytes")));
        }
        serde_json::from_str(self.line.trim_end())
            .map_err(|e| Error::MalformedResponse(e.to_string()))
    }
}

/// TLS connector for [`StreamTransport`].
#[derive(Clone)]
pub struct TlsConnector {
    addr: String,
    server_name: ServerName<'static>,
    tls: tokio_rustls::TlsConnector,
}

impl TlsConnector {
    /// Verifies the authority's certificate for `server_name` against the
    /// bundled Mozilla roots.
    pub fn new(addr: impl Into<String>, server_name: &str) -> Result<Self> {
        let mut roots = RootCertStore::empty();
        roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        Self::with_roots(addr, server_name, roots)
    }

    pub fn with_roots(
        addr: impl Into<String>,
        server_name: &str,
        roots: RootCertStore,
    ) -> Result<Self> {
        let config = ClientConfig::builder_with_provider(Arc::new(ring::default_provider()))
            .with_safe_default_protocol_versions()
            .map_err(|e| Error::Config(e.to_string()))?
            .with_root_certificates(roots)
            .with_no_client_auth();
        let server_name = ServerName::try_from(server_name)
            .map(|name| name.to_owned())
            .map_err(|e| Error::Config(format!("server name {server_name:?}: {e}")))?;

        Ok(TlsConnector {
            addr: addr.into(),
            server_name,
            tls: tokio_rustls::TlsConnector::from(Arc::new(config)),
        })
    }
}

impl Connector for TlsConnector {
    type Transport = StreamTransport<TlsStream<TcpStream>>;

    async fn connect(&self) -> Result<Self::Transport> {
        debug!(addr = %self.addr, "connecting to authority over TLS");
        let tcp = TcpStream::connect(&self.addr)
            .await
            .map_err(|e| Error::UnreachableAuthority(format!("{}: {e}", self.addr)))?;
        let stream = self
            .tls
            .connect(self.server_name.clone(), tcp)
            .await
            .map_err(|e| Error::UnreachableAuthority(format!("TLS with {}: {e}", self.addr)))?;
        Ok(StreamTransport::new(stream))
    }
}

/// Bare TCP connector for [`StreamTransport`].
///
/// The search key crosses this channel in the clear. Only for authorities on
/// the same host and for tests.
#[derive(Clone, Debug)]
pub struct InsecureTcpConnector {
    addr: String,
}

impl InsecureTcpConnector {
    pub fn new(addr: impl Into<String>) -> Self {
        InsecureTcpConnector { addr: addr.into() }
    }
}

impl Connector for InsecureTcpConnector {
    type Transport = StreamTransport<TcpStream>;

    async fn connect(&self) -> Result<Self::Transport> {
        debug!(addr = %self.addr, "connecting to authority without TLS");
        let stream = TcpStream::connect(&self.addr)
            .await
            .map_err(|e| Error::UnreachableAuthority(format!("{}: {e}", self.addr)))?;
        Ok(StreamTransport::new(stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn channel_pair_carries_both_directions() {
        let (mut client, mut authority) = channel_pair();

        client
            .send(ClientMessage::Auth {
                public_key: "pk".into(),
            })
            .await
            .unwrap();
        assert_eq!(
            authority.recv().await,
            Some(ClientMessage::Auth {
                public_key: "pk".into()
            })
        );

        assert!(authority.reply(AuthorityReply::error("denied")));
        assert_eq!(client.recv().await.unwrap(), AuthorityReply::error("denied"));
    }

    #[tokio::test]
    async fn dropped_authority_is_unreachable() {
        let (mut client, authority) = channel_pair();
        drop(authority);
        assert!(matches!(client.recv().await, Err(Error::UnreachableAuthority(_))));
    }

    #[tokio::test]
    async fn stream_transport_frames_json_lines() {
        let (client_io, server_io) = tokio::io::duplex(4096);
        let mut client = StreamTransport::new(client_io);
        let (server_read, mut server_write) = tokio::io::split(server_io);
        let mut server_lines = BufReader::new(server_read).lines();

        client
            .send(ClientMessage::AuthResponse {
                decrypted_value: "abc".into(),
            })
            .await
            .unwrap();
        let line = server_lines.next_line().await.unwrap().unwrap();
        assert_eq!(line, r#"{"event":"auth-res","data":{"decryptedValue":"abc"}}"#);

        server_write
            .write_all(b"{\"cipher\":\"00\",\"spk\":\"pk-ta\"}\n")
            .await
            .unwrap();
        assert_eq!(
            client.recv().await.unwrap(),
            AuthorityReply::challenge("00", "pk-ta")
        );

        server_write.write_all(b"not json\n").await.unwrap();
        assert!(matches!(client.recv().await, Err(Error::MalformedResponse(_))));
    }

    #[tokio::test]
    async fn oversized_reply_is_rejected() {
        let (client_io, mut server_io) = tokio::io::duplex(4096);
        let mut client = StreamTransport::new(client_io);
        tokio::spawn(async move {
            let flood = vec![b'a'; MAX_FRAME_LEN as usize + 1024];
            let _ = server_io.write_all(&flood).await;
        });

        match client.recv().await {
            Err(Error::MalformedResponse(msg)) => assert!(msg.contains("exceeds")),
            other => panic!("expected MalformedResponse, got {other:?}"),
        }
    }

    #[test]
    fn tls_connector_rejects_invalid_server_name() {
        assert!(matches!(
            TlsConnector::new("127.0.0.1:1", "not a host name"),
            Err(Error::Config(_))
        ));
    }
}
