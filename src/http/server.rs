//! HTTP carrier server.
//!
//! # Responsibilities
//! - Create the Axum router with a single `POST` route at the configured path
//! - Wire up middleware (tracing, body limit, request timeout, concurrency
//!   limit)
//! - Decode each request body as one message and answer with the reply bytes
//! - Serve plaintext through `axum::serve`, HTTPS through `axum-server`
//! - Stop accepting and drain when the shutdown signal fires
//!
//! # Design Decisions
//! - With framing enabled, the request body carries one length-prefixed frame
//!   and the reply is framed the same way
//! - Requests that fail to decode get `400 Bad Request` with the error text
//! - `limits.max_connections` bounds in-flight requests through one
//!   semaphore shared by every connection, since hyper owns the accept loop

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Router,
};
use axum_server::tls_rustls::RustlsConfig;
use bytes::BytesMut;
use rustls::ServerConfig;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower::limit::GlobalConcurrencyLimitLayer;
use tower_http::{limit::RequestBodyLimitLayer, timeout::TimeoutLayer, trace::TraceLayer};

use crate::config::Options;
use crate::lifecycle::shutdown;
use crate::observability::metrics;
use crate::protocol::{ProtocolError, ProtocolFactory};
use crate::rpc::processor::{dispatch, Processor};
use crate::transport::framed::{decode_frame, encode_frame};
use crate::transport::http::THRIFT_CONTENT_TYPE;

/// How long in-flight HTTPS requests get to finish after shutdown.
const DRAIN_GRACE: Duration = Duration::from_secs(5);

/// Application state injected into handlers.
#[derive(Clone)]
pub struct RpcState {
    pub protocol: Arc<dyn ProtocolFactory>,
    pub processor: Arc<dyn Processor>,
    pub framed: bool,
    pub max_frame_size: usize,
}

/// HTTP server for the HTTP carrier.
pub struct HttpServer {
    router: Router,
    path: String,
}

impl HttpServer {
    pub fn new(options: &Options, state: RpcState) -> Self {
        let router = Self::build_router(options, state);
        Self {
            router,
            path: options.http_path.clone(),
        }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(options: &Options, state: RpcState) -> Router {
        let body_limit = options.limits.max_message_size;
        Router::new()
            .route(&options.http_path, post(rpc_handler))
            .with_state(state)
            .layer(DefaultBodyLimit::max(body_limit))
            .layer(RequestBodyLimitLayer::new(body_limit))
            .layer(TimeoutLayer::new(Duration::from_secs(
                options.timeouts.request_secs,
            )))
            .layer(GlobalConcurrencyLimitLayer::new(
                options.limits.max_connections,
            ))
            .layer(TraceLayer::new_for_http())
    }

    /// Run the server on `listener` until `shutdown` fires. With `tls`, the
    /// listener is handed to `axum-server` and every connection is HTTPS.
    pub async fn run(
        self,
        listener: TcpListener,
        tls: Option<Arc<ServerConfig>>,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            path = %self.path,
            tls = tls.is_some(),
            "HTTP server starting"
        );

        match tls {
            None => {
                axum::serve(listener, self.router)
                    .with_graceful_shutdown(async move {
                        shutdown::requested(&mut shutdown).await;
                    })
                    .await?;
            }
            Some(config) => {
                let handle = axum_server::Handle::new();
                let stopper = handle.clone();
                tokio::spawn(async move {
                    shutdown::requested(&mut shutdown).await;
                    stopper.graceful_shutdown(Some(DRAIN_GRACE));
                });

                axum_server::from_tcp_rustls(listener.into_std()?, RustlsConfig::from_config(config))
                    .handle(handle)
                    .serve(self.router.into_make_service())
                    .await?;
            }
        }

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Decode one request body and answer with the encoded reply.
async fn rpc_handler(State(state): State<RpcState>, body: Bytes) -> Response {
    let kind = state.protocol.kind();
    match handle_body(&state, body) {
        Ok(reply) => {
            metrics::record_message_processed(kind);
            (
                StatusCode::OK,
                [(header::CONTENT_TYPE, THRIFT_CONTENT_TYPE)],
                reply,
            )
                .into_response()
        }
        Err(e) => {
            tracing::warn!(protocol = %kind, error = %e, "Rejecting HTTP request");
            metrics::record_protocol_error(kind);
            (StatusCode::BAD_REQUEST, e.to_string()).into_response()
        }
    }
}

fn handle_body(state: &RpcState, body: Bytes) -> Result<Vec<u8>, ProtocolError> {
    if !state.framed {
        return dispatch(&*state.protocol, &*state.processor, &body);
    }

    let mut buf = BytesMut::from(&body[..]);
    let request = decode_frame(&mut buf, state.max_frame_size)
        .map_err(|e| ProtocolError::InvalidData(e.to_string()))?
        .ok_or(ProtocolError::UnexpectedEof)?;
    let reply = dispatch(&*state.protocol, &*state.processor, &request)?;
    if reply.is_empty() {
        return Ok(reply);
    }
    let framed = encode_frame(&reply, state.max_frame_size)
        .map_err(|e| ProtocolError::InvalidData(e.to_string()))?;
    Ok(framed.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::binary::BinaryProtocolFactory;
    use crate::protocol::{
        InputProtocol, MessageIdentifier, MessageType, OutputProtocol, Serializable,
    };
    use crate::rpc::processor::{reject_unknown_method, Empty};

    fn state(framed: bool) -> RpcState {
        let processor = |input: &mut dyn InputProtocol,
                         output: &mut dyn OutputProtocol|
         -> Result<(), ProtocolError> {
            let call = input.read_message_begin()?;
            reject_unknown_method(input, output, &call)
        };
        RpcState {
            protocol: Arc::new(BinaryProtocolFactory),
            processor: Arc::new(processor),
            framed,
            max_frame_size: 1024,
        }
    }

    fn call() -> Vec<u8> {
        let mut buf = Vec::new();
        {
            let mut out = BinaryProtocolFactory.writer(&mut buf);
            out.write_message_begin(&MessageIdentifier::new("nope", MessageType::Call, 1))
                .unwrap();
            Empty.write_to_out_protocol(&mut *out).unwrap();
            out.write_message_end().unwrap();
        }
        buf
    }

    #[test]
    fn unframed_bodies_are_dispatched_directly() {
        let reply = handle_body(&state(false), Bytes::from(call())).unwrap();
        assert_eq!(&reply[..4], &[0x80, 0x01, 0x00, 0x03]);
    }

    #[test]
    fn framed_bodies_are_unwrapped_and_rewrapped() {
        let request = encode_frame(&call(), 1024).unwrap().freeze();
        let reply = handle_body(&state(true), request).unwrap();
        let len = u32::from_be_bytes([reply[0], reply[1], reply[2], reply[3]]) as usize;
        assert_eq!(len, reply.len() - 4);
        assert_eq!(&reply[4..8], &[0x80, 0x01, 0x00, 0x03]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn in_flight_requests_respect_the_connection_limit() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        use tower::ServiceExt;

        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let (now, high) = (Arc::clone(&active), Arc::clone(&peak));
        let processor = move |input: &mut dyn InputProtocol,
                              output: &mut dyn OutputProtocol|
              -> Result<(), ProtocolError> {
            let running = now.fetch_add(1, Ordering::SeqCst) + 1;
            high.fetch_max(running, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(50));
            now.fetch_sub(1, Ordering::SeqCst);
            let call = input.read_message_begin()?;
            reject_unknown_method(input, output, &call)
        };

        let mut options = Options::default();
        options.limits.max_connections = 1;
        let router = HttpServer::build_router(
            &options,
            RpcState {
                processor: Arc::new(processor),
                ..state(false)
            },
        );

        let requests: Vec<_> = (0..4)
            .map(|_| {
                let request = axum::http::Request::post(options.http_path.as_str())
                    .body(axum::body::Body::from(call()))
                    .unwrap();
                tokio::spawn(router.clone().oneshot(request))
            })
            .collect();
        for request in requests {
            let response = request.await.unwrap().unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }
        assert_eq!(peak.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn truncated_frames_are_rejected() {
        let result = handle_body(&state(true), Bytes::from_static(&[0, 0, 0, 9, 1]));
        assert!(result.is_err());
    }
}
