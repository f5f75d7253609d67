//! Client construction and calls.
//!
//! # Responsibilities
//! - Resolve the protocol and transport chain from `Options` before any I/O
//! - Open TCP, optionally TLS, optionally HTTP over it
//! - Hand out a `Client` plus a `Closer` that releases the connection once
//! - Encode calls, match replies to their sequence numbers and surface
//!   application exceptions as errors
//!
//! # Design Decisions
//! - TLS without a trust bundle accepts any server certificate, matching
//!   endpoints that present freshly minted self-signed chains; pass
//!   [`ClientBuilder::trust`] to verify against a known root
//! - `Client` and `Closer` share the channel; after `close` every call fails
//!   with `TransportError::Closed`

use std::io;
use std::sync::Arc;
use std::time::Duration;

use rustls::pki_types::{CertificateDer, ServerName};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_rustls::TlsConnector;
use tracing::{debug, info};

use crate::config::{validate_options, Carrier, ConfigError, Options};
use crate::error::Error;
use crate::net::tls;
use crate::pki::TrustBundle;
use crate::protocol::{
    ApplicationErrorKind, ApplicationException, MessageIdentifier, MessageType, ProtocolFactory,
    ProtocolRegistry, Serializable,
};
use crate::transport::{
    BoxedStream, HttpClientTransport, MessageChannel, SocketTransport, Transport,
    TransportError, TransportRegistry,
};

type SharedChannel = Arc<Mutex<Option<MessageChannel>>>;

/// Open a client to `address` configured by `options`.
pub async fn connect(address: &str, options: &Options) -> Result<(Client, Closer), Error> {
    ClientBuilder::new(options.clone()).connect(address).await
}

/// Builder for clients that need more than `Options`.
#[derive(Debug)]
pub struct ClientBuilder {
    options: Options,
    protocols: ProtocolRegistry,
    trust: Option<TrustBundle>,
    server_name: Option<String>,
}

impl ClientBuilder {
    pub fn new(options: Options) -> Self {
        Self {
            options,
            protocols: ProtocolRegistry::standard(),
            trust: None,
            server_name: None,
        }
    }

    /// Use `registry` instead of the standard protocol set.
    pub fn protocols(mut self, registry: ProtocolRegistry) -> Self {
        self.protocols = registry;
        self
    }

    /// Verify the server chain against `bundle`.
    pub fn trust(mut self, bundle: TrustBundle) -> Self {
        self.trust = Some(bundle);
        self
    }

    /// Name to verify the server certificate against. Defaults to the host
    /// part of the address.
    pub fn server_name(mut self, name: impl Into<String>) -> Self {
        self.server_name = Some(name.into());
        self
    }

    pub async fn connect(self, address: &str) -> Result<(Client, Closer), Error> {
        validate_options(&self.options).map_err(ConfigError::Validation)?;
        let protocol = self.protocols.resolve(self.options.protocol)?;
        let chain = TransportRegistry::from_limits(&self.options.limits)
            .chain(self.options.buffered, self.options.framed);

        let tls = if self.options.secure {
            let roots = match &self.trust {
                Some(bundle) => Some(bundle.root_store()?),
                None => None,
            };
            let config = tls::client_config(roots).map_err(TransportError::Tls)?;
            let name = tls::server_name(
                self.server_name
                    .as_deref()
                    .unwrap_or_else(|| tls::host_of(address)),
            )?;
            Some((TlsConnector::from(Arc::new(config)), name))
        } else {
            None
        };

        let connect_timeout = Duration::from_secs(self.options.timeouts.connect_secs);
        let (stream, peer_certificate) =
            tokio::time::timeout(connect_timeout, open_stream(address, tls))
                .await
                .map_err(|_| TransportError::ConnectTimeout {
                    address: address.to_string(),
                    timeout: connect_timeout,
                })??;

        let base: Box<dyn Transport> = match self.options.carrier {
            Carrier::Socket => Box::new(SocketTransport::new(stream)),
            Carrier::Http => Box::new(
                HttpClientTransport::handshake(
                    stream,
                    address,
                    self.options.http_path.clone(),
                    Duration::from_secs(self.options.timeouts.request_secs),
                    self.options.limits.max_message_size,
                )
                .await?,
            ),
        };
        let channel = MessageChannel::new(
            chain.get_transport(base),
            protocol,
            self.options.limits.max_message_size,
        );

        info!(
            address,
            protocol = %self.options.protocol,
            carrier = ?self.options.carrier,
            secure = self.options.secure,
            framed = self.options.framed,
            "Client connected"
        );

        let shared: SharedChannel = Arc::new(Mutex::new(Some(channel)));
        let client = Client {
            channel: Arc::clone(&shared),
            sequence: 0,
            peer_certificate,
        };
        Ok((client, Closer { channel: shared }))
    }
}

async fn open_stream(
    address: &str,
    tls: Option<(TlsConnector, ServerName<'static>)>,
) -> Result<(BoxedStream, Option<CertificateDer<'static>>), TransportError> {
    let tcp = TcpStream::connect(address)
        .await
        .map_err(|source| TransportError::Connect {
            address: address.to_string(),
            source,
        })?;
    let _ = tcp.set_nodelay(true);

    match tls {
        None => Ok((Box::new(tcp), None)),
        Some((connector, name)) => {
            let stream = connector
                .connect(name, tcp)
                .await
                .map_err(|source| TransportError::Handshake { source })?;
            let peer = stream
                .get_ref()
                .1
                .peer_certificates()
                .and_then(|chain| chain.first())
                .map(|cert| cert.clone().into_owned());
            debug!(address, "TLS handshake complete");
            Ok((Box::new(stream), peer))
        }
    }
}

/// Issues calls over one connection.
#[derive(Debug)]
pub struct Client {
    channel: SharedChannel,
    sequence: i32,
    peer_certificate: Option<CertificateDer<'static>>,
}

impl Client {
    /// Leaf certificate the server presented, when connected over TLS.
    pub fn peer_certificate(&self) -> Option<&CertificateDer<'static>> {
        self.peer_certificate.as_ref()
    }

    fn next_sequence(&mut self) -> i32 {
        self.sequence = self.sequence.wrapping_add(1);
        self.sequence
    }

    /// Call `method` with `args` and decode the result struct.
    pub async fn call<A, R>(&mut self, method: &str, args: &A) -> Result<R, Error>
    where
        A: Serializable,
        R: Serializable,
    {
        let sequence = self.next_sequence();
        let mut guard = self.channel.lock().await;
        let channel = guard.as_mut().ok_or(TransportError::Closed)?;

        let request = encode(
            &**channel.protocol(),
            &MessageIdentifier::new(method, MessageType::Call, sequence),
            args,
        )?;
        channel.write_message(&request).await?;

        let reply = channel.read_message().await?.ok_or_else(|| {
            TransportError::Io(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "connection closed before reply",
            ))
        })?;
        decode_reply(&**channel.protocol(), &reply, method, sequence)
    }

    /// Send `method` without waiting for a reply.
    pub async fn oneway<A: Serializable>(&mut self, method: &str, args: &A) -> Result<(), Error> {
        let sequence = self.next_sequence();
        let mut guard = self.channel.lock().await;
        let channel = guard.as_mut().ok_or(TransportError::Closed)?;

        let request = encode(
            &**channel.protocol(),
            &MessageIdentifier::new(method, MessageType::OneWay, sequence),
            args,
        )?;
        channel.write_message(&request).await
    }
}

/// Releases the client's connection.
#[derive(Debug)]
pub struct Closer {
    channel: SharedChannel,
}

impl Closer {
    /// Close the connection. Consuming `self` makes a second close
    /// impossible; calls made afterwards fail with `TransportError::Closed`.
    pub async fn close(self) -> Result<(), Error> {
        let channel = self.channel.lock().await.take();
        if let Some(mut channel) = channel {
            channel.close().await?;
            debug!("Client connection closed");
        }
        Ok(())
    }
}

fn encode<A: Serializable>(
    protocol: &dyn ProtocolFactory,
    ident: &MessageIdentifier,
    args: &A,
) -> Result<Vec<u8>, Error> {
    let mut buf = Vec::new();
    {
        let mut output = protocol.writer(&mut buf);
        output.write_message_begin(ident)?;
        args.write_to_out_protocol(&mut *output)?;
        output.write_message_end()?;
        output.flush()?;
    }
    Ok(buf)
}

fn decode_reply<R: Serializable>(
    protocol: &dyn ProtocolFactory,
    reply: &[u8],
    method: &str,
    sequence: i32,
) -> Result<R, Error> {
    let mut input = protocol.reader(reply)?;
    let ident = input.read_message_begin()?;

    if ident.name != method {
        return Err(ApplicationException::new(
            ApplicationErrorKind::WrongMethodName,
            format!("{method}: wrong method name {}", ident.name),
        )
        .into());
    }
    if ident.sequence_number != sequence {
        return Err(ApplicationException::new(
            ApplicationErrorKind::BadSequenceId,
            format!("{method}: expected sequence {sequence}, got {}", ident.sequence_number),
        )
        .into());
    }

    match ident.message_type {
        MessageType::Exception => {
            let exception = ApplicationException::read_from_in_protocol(&mut *input)?;
            input.read_message_end()?;
            Err(exception.into())
        }
        MessageType::Reply => {
            let result = R::read_from_in_protocol(&mut *input)?;
            input.read_message_end()?;
            Ok(result)
        }
        other => Err(ApplicationException::new(
            ApplicationErrorKind::InvalidMessageType,
            format!("{method}: unexpected message type {other:?}"),
        )
        .into()),
    }
}
