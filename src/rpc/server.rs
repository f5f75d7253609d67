//! Server construction and serve loop.
//!
//! # Responsibilities
//! - Validate options and resolve the protocol before binding
//! - Issue a fresh certificate bundle for every secure server
//! - Bind the listening socket (state `Listening`)
//! - Serve raw-socket connections or hand the socket to the HTTP carrier
//!   (state `Serving`)
//! - Stop on the shutdown signal or a fatal listener error, then drain
//!   (state `Terminated`)
//!
//! # Data Flow
//! ```text
//! accept (semaphore permit)
//!     → optional TLS handshake
//!     → SocketTransport → transport chain → MessageChannel
//!     → dispatch(protocol, processor) → reply written back
//! ```
//!
//! # Design Decisions
//! - One task per connection; a failing connection only ends itself
//! - Transient accept errors are logged and the loop continues
//! - Shutdown closes the listener first, then asks live connections to stop

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use rustls::ServerConfig;
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio_rustls::TlsAcceptor;
use tracing::{debug, error, info, warn};

use crate::config::{validate_options, Carrier, ConfigError, Options};
use crate::error::Error;
use crate::http::{HttpServer, RpcState};
use crate::lifecycle::{shutdown, ServerState, StateTracker};
use crate::net::connection::{ConnectionGuard, ConnectionTracker};
use crate::net::listener::{ConnectionPermit, Listener};
use crate::net::tls;
use crate::observability::metrics;
use crate::pki::{CertificateAuthority, CertificateBundle, TrustBundle};
use crate::protocol::{ProtocolFactory, ProtocolRegistry};
use crate::rpc::processor::{dispatch, Processor};
use crate::transport::{BoxedStream, SocketTransport, TransportError, TransportFactory, TransportRegistry};

/// How long live connections get to finish after shutdown.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Bind `address` and serve until `shutdown` fires.
pub async fn serve(
    address: &str,
    options: &Options,
    processor: Arc<dyn Processor>,
    shutdown: watch::Receiver<bool>,
) -> Result<(), Error> {
    Server::bind(address, options, processor)
        .await?
        .run(shutdown)
        .await
}

/// A bound endpoint, ready to serve.
pub struct Server {
    options: Options,
    protocol: Arc<dyn ProtocolFactory>,
    processor: Arc<dyn Processor>,
    listener: Listener,
    local_addr: SocketAddr,
    bundle: Option<CertificateBundle>,
    tls: Option<Arc<ServerConfig>>,
    state: StateTracker,
}

impl Server {
    /// Bind with the standard protocol set.
    pub async fn bind(
        address: &str,
        options: &Options,
        processor: Arc<dyn Processor>,
    ) -> Result<Self, Error> {
        Self::bind_with(address, options, &ProtocolRegistry::standard(), processor).await
    }

    /// Bind, resolving the protocol from `protocols`.
    pub async fn bind_with(
        address: &str,
        options: &Options,
        protocols: &ProtocolRegistry,
        processor: Arc<dyn Processor>,
    ) -> Result<Self, Error> {
        validate_options(options).map_err(ConfigError::Validation)?;
        let protocol = protocols.resolve(options.protocol)?;
        let state = StateTracker::new();

        let (bundle, tls) = if options.secure {
            let bundle = CertificateAuthority::from_config(&options.certificate)?
                .issue_blocking(&options.certificate)
                .await?;
            let identity = bundle.server_identity();
            let config = match options.carrier {
                Carrier::Socket => tls::server_config(&identity),
                Carrier::Http => tls::https_server_config(&identity),
            }
            .map_err(TransportError::Tls)?;
            (Some(bundle), Some(Arc::new(config)))
        } else {
            (None, None)
        };

        let listener = Listener::bind(address, options.limits.max_connections)
            .await
            .map_err(|e| TransportError::Bind {
                address: address.to_string(),
                source: e.into_io(),
            })?;
        let local_addr = listener.local_addr().map_err(|source| TransportError::Bind {
            address: address.to_string(),
            source,
        })?;
        state.advance(ServerState::Listening);

        info!(
            address = %local_addr,
            protocol = %options.protocol,
            carrier = ?options.carrier,
            secure = options.secure,
            buffered = options.buffered,
            framed = options.framed,
            "Server listening"
        );

        Ok(Self {
            options: options.clone(),
            protocol,
            processor,
            listener,
            local_addr,
            bundle,
            tls,
            state,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Bundle issued for this server, when secure.
    pub fn certificate(&self) -> Option<&CertificateBundle> {
        self.bundle.as_ref()
    }

    /// Root a client can verify this server against, when secure.
    pub fn trust_bundle(&self) -> Option<TrustBundle> {
        self.bundle.as_ref().map(CertificateBundle::trust_bundle)
    }

    /// Watch lifecycle transitions. Take this before calling `run`.
    pub fn state(&self) -> watch::Receiver<ServerState> {
        self.state.subscribe()
    }

    /// Serve until `shutdown` fires or the listener fails.
    pub async fn run(self, shutdown: watch::Receiver<bool>) -> Result<(), Error> {
        match self.options.carrier {
            Carrier::Socket => self.run_socket(shutdown).await,
            Carrier::Http => self.run_http(shutdown).await,
        }
    }

    async fn run_socket(self, mut shutdown: watch::Receiver<bool>) -> Result<(), Error> {
        let Server {
            options,
            protocol,
            processor,
            listener,
            tls,
            state,
            ..
        } = self;

        let context = Arc::new(ConnectionContext {
            acceptor: tls.map(TlsAcceptor::from),
            chain: TransportRegistry::from_limits(&options.limits)
                .chain(options.buffered, options.framed),
            protocol,
            processor,
            max_message_size: options.limits.max_message_size,
            handshake_timeout: Duration::from_secs(options.timeouts.connect_secs),
        });
        let tracker = ConnectionTracker::new();
        state.advance(ServerState::Serving);

        let result = loop {
            tokio::select! {
                _ = shutdown::requested(&mut shutdown) => {
                    info!("Shutdown requested, closing listener");
                    break Ok(());
                }
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer, permit)) => {
                        metrics::record_connection_accepted("socket");
                        let guard = tracker.track();
                        metrics::record_active_connections(tracker.active_count());
                        let context = Arc::clone(&context);
                        tokio::spawn(serve_connection(context, stream, peer, guard, permit));
                    }
                    Err(e) if e.is_transient() => {
                        warn!(error = %e, "Transient accept error");
                    }
                    Err(e) => {
                        error!(error = %e, "Listener failed");
                        break Err(Error::Listener(e.into_io()));
                    }
                }
            }
        };

        drop(listener);
        tracker.stop_all();
        if !tracker.wait_for_idle(DRAIN_TIMEOUT).await {
            warn!(
                remaining = tracker.active_count(),
                "Connections still open after drain timeout"
            );
        }
        state.advance(ServerState::Terminated);
        info!("Server terminated");
        result
    }

    async fn run_http(self, shutdown: watch::Receiver<bool>) -> Result<(), Error> {
        let Server {
            options,
            protocol,
            processor,
            listener,
            tls,
            state,
            ..
        } = self;

        let server = HttpServer::new(
            &options,
            RpcState {
                protocol,
                processor,
                framed: options.framed,
                max_frame_size: options.limits.max_frame_size,
            },
        );
        state.advance(ServerState::Serving);
        let result = server
            .run(listener.into_inner(), tls, shutdown)
            .await
            .map_err(Error::Listener);
        state.advance(ServerState::Terminated);
        info!("Server terminated");
        result
    }
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("local_addr", &self.local_addr)
            .field("protocol", &self.options.protocol)
            .field("carrier", &self.options.carrier)
            .field("secure", &self.options.secure)
            .field("state", &self.state.current())
            .finish()
    }
}

/// Everything a connection task needs, shared across connections.
struct ConnectionContext {
    acceptor: Option<TlsAcceptor>,
    chain: Arc<dyn TransportFactory>,
    protocol: Arc<dyn ProtocolFactory>,
    processor: Arc<dyn Processor>,
    max_message_size: usize,
    handshake_timeout: Duration,
}

async fn serve_connection(
    context: Arc<ConnectionContext>,
    stream: TcpStream,
    peer: SocketAddr,
    mut guard: ConnectionGuard,
    _permit: ConnectionPermit,
) {
    let id = guard.id();
    let kind = context.protocol.kind();

    let raw: BoxedStream = match &context.acceptor {
        None => Box::new(stream),
        Some(acceptor) => {
            match tokio::time::timeout(context.handshake_timeout, acceptor.accept(stream)).await {
                Ok(Ok(tls_stream)) => Box::new(tls_stream),
                Ok(Err(e)) => {
                    warn!(connection = %id, %peer, error = %e, "TLS handshake failed");
                    return;
                }
                Err(_) => {
                    warn!(connection = %id, %peer, "TLS handshake timed out");
                    return;
                }
            }
        }
    };

    let transport = context
        .chain
        .get_transport(Box::new(SocketTransport::new(raw)));
    let mut channel = crate::transport::MessageChannel::new(
        transport,
        Arc::clone(&context.protocol),
        context.max_message_size,
    );
    debug!(connection = %id, %peer, "Serving connection");

    loop {
        let message = tokio::select! {
            _ = guard.stopped() => {
                debug!(connection = %id, "Connection stopped by shutdown");
                break;
            }
            message = channel.read_message() => message,
        };

        let request = match message {
            Ok(Some(request)) => request,
            Ok(None) => {
                debug!(connection = %id, "Peer closed connection");
                break;
            }
            Err(Error::Protocol(e)) => {
                warn!(connection = %id, error = %e, "Malformed message, closing connection");
                metrics::record_protocol_error(kind);
                break;
            }
            Err(e) => {
                warn!(connection = %id, error = %e, "Connection read failed");
                break;
            }
        };

        match dispatch(&*context.protocol, &*context.processor, &request) {
            Ok(reply) => {
                metrics::record_message_processed(kind);
                if reply.is_empty() {
                    continue;
                }
                if let Err(e) = channel.write_message(&reply).await {
                    warn!(connection = %id, error = %e, "Failed to write reply");
                    break;
                }
            }
            Err(e) => {
                warn!(connection = %id, error = %e, "Processor failed, closing connection");
                metrics::record_protocol_error(kind);
                break;
            }
        }
    }

    if let Err(e) = channel.close().await {
        debug!(connection = %id, error = %e, "Error closing connection");
    }
}
