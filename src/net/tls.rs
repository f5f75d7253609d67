//! TLS configuration for both carriers.
//!
//! # Responsibilities
//! - Raw-socket server config from the issued leaf
//! - HTTPS server config pinned to TLS 1.3 with a resolver that always
//!   presents the leaf
//! - Client config that either verifies against a trust bundle or, by
//!   default, accepts any server certificate
//!
//! # Design Decisions
//! - Every config uses the aws-lc-rs provider explicitly, so no process-wide
//!   default provider has to be installed
//! - The permissive client verifier still checks handshake signatures; only
//!   chain and name validation are skipped

use std::sync::Arc;

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{verify_tls12_signature, verify_tls13_signature, CryptoProvider};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::server::{ClientHello, ResolvesServerCert};
use rustls::sign::CertifiedKey;
use rustls::{ClientConfig, DigitallySignedStruct, RootCertStore, ServerConfig, SignatureScheme};

use crate::pki::ServerIdentity;
use crate::transport::TransportError;

/// Crypto provider used by every config built here.
pub fn crypto_provider() -> Arc<CryptoProvider> {
    Arc::new(rustls::crypto::aws_lc_rs::default_provider())
}

/// Server config for the raw-socket carrier.
pub fn server_config(identity: &ServerIdentity) -> Result<ServerConfig, rustls::Error> {
    ServerConfig::builder_with_provider(crypto_provider())
        .with_safe_default_protocol_versions()?
        .with_no_client_auth()
        .with_single_cert(identity.cert_chain().to_vec(), identity.private_key())
}

/// Server config for the HTTPS carrier: TLS 1.3 only, fixed certificate.
pub fn https_server_config(identity: &ServerIdentity) -> Result<ServerConfig, rustls::Error> {
    let provider = crypto_provider();
    let resolver = FixedCertResolver::new(identity, &provider)?;

    let mut config = ServerConfig::builder_with_provider(provider)
        .with_protocol_versions(&[&rustls::version::TLS13])?
        .with_no_client_auth()
        .with_cert_resolver(Arc::new(resolver));
    config.alpn_protocols = vec![b"http/1.1".to_vec()];
    Ok(config)
}

/// Presents the same certificate regardless of the client hello.
#[derive(Debug)]
struct FixedCertResolver {
    key: Arc<CertifiedKey>,
}

impl FixedCertResolver {
    fn new(identity: &ServerIdentity, provider: &CryptoProvider) -> Result<Self, rustls::Error> {
        let signing_key = provider
            .key_provider
            .load_private_key(identity.private_key())?;
        Ok(Self {
            key: Arc::new(CertifiedKey::new(identity.cert_chain().to_vec(), signing_key)),
        })
    }
}

impl ResolvesServerCert for FixedCertResolver {
    fn resolve(&self, _client_hello: ClientHello<'_>) -> Option<Arc<CertifiedKey>> {
        Some(Arc::clone(&self.key))
    }
}

/// Client config. With `roots` the server chain and name are verified;
/// without, any certificate is accepted.
pub fn client_config(roots: Option<RootCertStore>) -> Result<ClientConfig, rustls::Error> {
    let provider = crypto_provider();
    let builder = ClientConfig::builder_with_provider(Arc::clone(&provider))
        .with_safe_default_protocol_versions()?;

    let config = match roots {
        Some(roots) => builder.with_root_certificates(roots).with_no_client_auth(),
        None => {
            tracing::warn!("TLS peer verification disabled; server certificate is not checked");
            builder
                .dangerous()
                .with_custom_certificate_verifier(Arc::new(AcceptAnyServerCert { provider }))
                .with_no_client_auth()
        }
    };
    Ok(config)
}

/// Accepts any server certificate but still verifies handshake signatures.
#[derive(Debug)]
struct AcceptAnyServerCert {
    provider: Arc<CryptoProvider>,
}

impl ServerCertVerifier for AcceptAnyServerCert {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls12_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls13_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.provider
            .signature_verification_algorithms
            .supported_schemes()
    }
}

/// TLS server name for a host (DNS name or IP literal).
pub fn server_name(host: &str) -> Result<ServerName<'static>, TransportError> {
    let host = host.trim_start_matches('[').trim_end_matches(']');
    ServerName::try_from(host.to_string())
        .map_err(|_| TransportError::InvalidServerName(host.to_string()))
}

/// Host part of a `host:port` address.
pub fn host_of(address: &str) -> &str {
    match address.rsplit_once(':') {
        Some((host, port)) if port.chars().all(|c| c.is_ascii_digit()) => host,
        _ => address,
    }
}
