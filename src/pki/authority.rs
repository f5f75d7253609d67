//! Ephemeral certificate authority.
//!
//! # Responsibilities
//! - Generate a fresh RSA root key and self-signed CA certificate
//! - Generate a fresh RSA leaf key and certificate signed by that root
//! - Hand out the server-presentation view (leaf + key) and the client-trust
//!   view (root only)
//!
//! # Design Decisions
//! - Nothing is persisted; every call produces new key material
//! - Key generation is CPU bound; async callers run it on a blocking worker
//! - Any failure aborts issuance and is not retried

use std::fmt;
use std::io::BufReader;
use std::time::Instant;

use rand::RngCore;
use rcgen::{
    BasicConstraints, Certificate, CertificateParams, DistinguishedName, DnType,
    ExtendedKeyUsagePurpose, IsCa, KeyPair, KeyUsagePurpose, RsaKeySize, SerialNumber,
    PKCS_RSA_SHA256,
};
use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};
use rustls::RootCertStore;
use thiserror::Error;
use time::{Duration, OffsetDateTime};

use crate::config::schema::CertificateConfig;

/// Hostname included in every leaf certificate's subject alternative names.
pub const LEAF_HOSTNAME: &str = "mockworker";

/// Subject alternative names of every leaf certificate.
pub const LEAF_SUBJECT_ALT_NAMES: [&str; 3] = ["127.0.0.1", "::1", LEAF_HOSTNAME];

/// Validity of issued certificates, in years from issuance.
pub const VALIDITY_YEARS: i32 = 10;

#[derive(Debug, Error)]
pub enum CertificateError {
    /// The requested RSA modulus size cannot be generated.
    #[error("unsupported RSA key size {0}")]
    UnsupportedKeySize(u32),

    /// Key generation or certificate construction failed.
    #[error("certificate generation failed: {0}")]
    Generation(#[from] rcgen::Error),

    /// The validity window could not be computed.
    #[error("certificate validity window overflows")]
    Validity,

    /// PEM input could not be parsed.
    #[error("invalid PEM: {0}")]
    Pem(#[from] std::io::Error),

    /// PEM input held no certificate.
    #[error("no certificate found in PEM input")]
    MissingCertificate,

    /// The root could not be added to a trust store.
    #[error("certificate rejected by trust store: {0}")]
    TrustStore(#[from] rustls::Error),

    /// The blocking issuance task did not complete.
    #[error("certificate issuance task failed: {0}")]
    Task(String),
}

/// Issues root and leaf certificates.
#[derive(Debug, Clone, Copy)]
pub struct CertificateAuthority {
    key_bits: u32,
}

impl CertificateAuthority {
    pub fn new(key_bits: u32) -> Result<Self, CertificateError> {
        rsa_key_size(key_bits)?;
        Ok(Self { key_bits })
    }

    pub fn from_config(config: &CertificateConfig) -> Result<Self, CertificateError> {
        Self::new(config.key_bits)
    }

    pub fn key_bits(&self) -> u32 {
        self.key_bits
    }

    /// Generate a new root and leaf with the given subject.
    pub fn issue_bundle(
        &self,
        organization: &str,
        country: &str,
        province: &str,
        locality: &str,
    ) -> Result<CertificateBundle, CertificateError> {
        let started = Instant::now();
        let key_size = rsa_key_size(self.key_bits)?;
        let subject = subject(organization, country, province, locality);
        let (not_before, not_after) = validity_window(OffsetDateTime::now_utc())?;

        let ca_key = KeyPair::generate_rsa_for(&PKCS_RSA_SHA256, key_size)?;
        let mut ca_params = CertificateParams::default();
        ca_params.distinguished_name = subject.clone();
        ca_params.serial_number = Some(random_serial());
        ca_params.not_before = not_before;
        ca_params.not_after = not_after;
        ca_params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        ca_params.key_usages = vec![KeyUsagePurpose::DigitalSignature, KeyUsagePurpose::KeyCertSign];
        ca_params.extended_key_usages = vec![
            ExtendedKeyUsagePurpose::ClientAuth,
            ExtendedKeyUsagePurpose::ServerAuth,
        ];
        let ca_cert = ca_params.self_signed(&ca_key)?;

        let leaf_key = KeyPair::generate_rsa_for(&PKCS_RSA_SHA256, key_size)?;
        let mut leaf_params = CertificateParams::new(
            LEAF_SUBJECT_ALT_NAMES
                .iter()
                .map(|name| name.to_string())
                .collect::<Vec<_>>(),
        )?;
        leaf_params.distinguished_name = subject;
        leaf_params.serial_number = Some(random_serial());
        leaf_params.not_before = not_before;
        leaf_params.not_after = not_after;
        leaf_params.is_ca = IsCa::ExplicitNoCa;
        leaf_params.key_usages = vec![KeyUsagePurpose::DigitalSignature];
        leaf_params.extended_key_usages = vec![
            ExtendedKeyUsagePurpose::ClientAuth,
            ExtendedKeyUsagePurpose::ServerAuth,
        ];
        leaf_params.use_authority_key_identifier_extension = true;
        let leaf_cert = leaf_params.signed_by(&leaf_key, &ca_cert, &ca_key)?;

        tracing::info!(
            organization,
            key_bits = self.key_bits,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Issued ephemeral certificate authority and leaf"
        );
        crate::observability::metrics::record_certificate_issued();

        Ok(CertificateBundle::assemble(&ca_cert, &leaf_cert, &leaf_key))
    }

    /// Issue with the subject taken from configuration.
    pub fn issue(&self, config: &CertificateConfig) -> Result<CertificateBundle, CertificateError> {
        self.issue_bundle(
            &config.organization,
            &config.country,
            &config.province,
            &config.locality,
        )
    }

    /// Issue on a blocking worker so the async runtime keeps serving.
    pub async fn issue_blocking(
        &self,
        config: &CertificateConfig,
    ) -> Result<CertificateBundle, CertificateError> {
        let authority = *self;
        let config = config.clone();
        tokio::task::spawn_blocking(move || authority.issue(&config))
            .await
            .map_err(|e| CertificateError::Task(e.to_string()))?
    }
}

impl Default for CertificateAuthority {
    fn default() -> Self {
        Self { key_bits: 4096 }
    }
}

fn rsa_key_size(bits: u32) -> Result<RsaKeySize, CertificateError> {
    match bits {
        2048 => Ok(RsaKeySize::_2048),
        3072 => Ok(RsaKeySize::_3072),
        4096 => Ok(RsaKeySize::_4096),
        other => Err(CertificateError::UnsupportedKeySize(other)),
    }
}

fn subject(organization: &str, country: &str, province: &str, locality: &str) -> DistinguishedName {
    let mut name = DistinguishedName::new();
    name.push(DnType::OrganizationName, organization);
    name.push(DnType::CountryName, country);
    name.push(DnType::StateOrProvinceName, province);
    name.push(DnType::LocalityName, locality);
    name
}

/// Positive 128-bit serial with a non-zero leading byte.
fn random_serial_bytes() -> [u8; 16] {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes[0] = (bytes[0] & 0x7f) | 0x01;
    bytes
}

fn random_serial() -> SerialNumber {
    SerialNumber::from_slice(&random_serial_bytes())
}

fn validity_window(
    now: OffsetDateTime,
) -> Result<(OffsetDateTime, OffsetDateTime), CertificateError> {
    // Same calendar date ten years on; Feb 29 falls back to a day count.
    let not_after = match now.replace_year(now.year() + VALIDITY_YEARS) {
        Ok(later) => later,
        Err(_) => now
            .checked_add(Duration::days(3652))
            .ok_or(CertificateError::Validity)?,
    };
    Ok((now, not_after))
}

/// Root and leaf material produced by one issuance.
#[derive(Clone)]
pub struct CertificateBundle {
    ca_cert_pem: String,
    ca_cert_der: CertificateDer<'static>,
    leaf_cert_pem: String,
    leaf_cert_der: CertificateDer<'static>,
    leaf_key_pem: String,
    leaf_key_der: Vec<u8>,
}

impl CertificateBundle {
    fn assemble(ca_cert: &Certificate, leaf_cert: &Certificate, leaf_key: &KeyPair) -> Self {
        Self {
            ca_cert_pem: ca_cert.pem(),
            ca_cert_der: ca_cert.der().clone(),
            leaf_cert_pem: leaf_cert.pem(),
            leaf_cert_der: leaf_cert.der().clone(),
            leaf_key_pem: leaf_key.serialize_pem(),
            leaf_key_der: leaf_key.serialize_der(),
        }
    }

    pub fn ca_cert_pem(&self) -> &str {
        &self.ca_cert_pem
    }

    pub fn ca_cert_der(&self) -> &CertificateDer<'static> {
        &self.ca_cert_der
    }

    pub fn leaf_cert_pem(&self) -> &str {
        &self.leaf_cert_pem
    }

    pub fn leaf_cert_der(&self) -> &CertificateDer<'static> {
        &self.leaf_cert_der
    }

    pub fn leaf_key_pem(&self) -> &str {
        &self.leaf_key_pem
    }

    /// Leaf certificate and key, for presenting to clients.
    pub fn server_identity(&self) -> ServerIdentity {
        ServerIdentity {
            cert_chain: vec![self.leaf_cert_der.clone()],
            key_der: self.leaf_key_der.clone(),
        }
    }

    /// Root certificate only, for verifying the leaf.
    pub fn trust_bundle(&self) -> TrustBundle {
        TrustBundle {
            ca_pem: self.ca_cert_pem.clone(),
            ca_der: self.ca_cert_der.clone(),
        }
    }
}

impl fmt::Debug for CertificateBundle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CertificateBundle")
            .field("ca_cert_der_len", &self.ca_cert_der.len())
            .field("leaf_cert_der_len", &self.leaf_cert_der.len())
            .field("leaf_key", &"<redacted>")
            .finish()
    }
}

/// Server-presentation view: leaf chain and private key.
#[derive(Clone)]
pub struct ServerIdentity {
    cert_chain: Vec<CertificateDer<'static>>,
    key_der: Vec<u8>,
}

impl ServerIdentity {
    pub fn cert_chain(&self) -> &[CertificateDer<'static>] {
        &self.cert_chain
    }

    /// A fresh copy of the private key in the form rustls consumes.
    pub fn private_key(&self) -> PrivateKeyDer<'static> {
        PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(self.key_der.clone()))
    }
}

impl fmt::Debug for ServerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerIdentity")
            .field("chain_len", &self.cert_chain.len())
            .field("key", &"<redacted>")
            .finish()
    }
}

/// Client-trust view: the root certificate.
#[derive(Debug, Clone)]
pub struct TrustBundle {
    ca_pem: String,
    ca_der: CertificateDer<'static>,
}

impl TrustBundle {
    /// Parse the first certificate of a PEM document.
    pub fn from_pem(pem: &str) -> Result<Self, CertificateError> {
        let mut reader = BufReader::new(pem.as_bytes());
        let ca_der = rustls_pemfile::certs(&mut reader)
            .next()
            .ok_or(CertificateError::MissingCertificate)??;
        Ok(Self {
            ca_pem: pem.to_string(),
            ca_der,
        })
    }

    /// Root certificate in PEM form, for handing to other processes.
    pub fn ca_pem(&self) -> &str {
        &self.ca_pem
    }

    pub fn ca_der(&self) -> &CertificateDer<'static> {
        &self.ca_der
    }

    /// Trust store holding only this root.
    pub fn root_store(&self) -> Result<RootCertStore, CertificateError> {
        let mut roots = RootCertStore::empty();
        roots.add(self.ca_der.clone())?;
        Ok(roots)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::Month;

    #[test]
    fn rejects_unsupported_key_sizes() {
        assert!(matches!(
            CertificateAuthority::new(1024),
            Err(CertificateError::UnsupportedKeySize(1024))
        ));
        assert_eq!(CertificateAuthority::new(2048).unwrap().key_bits(), 2048);
    }

    #[test]
    fn validity_spans_ten_years() {
        let now = OffsetDateTime::now_utc();
        let (start, end) = validity_window(now).unwrap();
        assert_eq!(start, now);
        assert_eq!(end.year(), now.year() + 10);

        let leap = time::Date::from_calendar_date(2024, Month::February, 29)
            .unwrap()
            .midnight()
            .assume_utc();
        let (_, end) = validity_window(leap).unwrap();
        assert_eq!(end, leap + Duration::days(3652));
    }

    #[test]
    fn serials_are_positive_and_distinct() {
        let a = random_serial_bytes();
        let b = random_serial_bytes();
        assert_ne!(a, b);
        assert!(a[0] > 0 && a[0] < 0x80);
    }

    #[test]
    fn bundle_views_and_trust_round_trip() {
        let bundle = CertificateAuthority::new(2048)
            .unwrap()
            .issue_bundle("Acme", "US", "CA", "Oakland")
            .unwrap();

        assert!(bundle.ca_cert_pem().starts_with("-----BEGIN CERTIFICATE-----"));
        assert!(bundle.leaf_key_pem().contains("PRIVATE KEY"));
        assert_ne!(bundle.ca_cert_der(), bundle.leaf_cert_der());

        let identity = bundle.server_identity();
        assert_eq!(identity.cert_chain(), &[bundle.leaf_cert_der().clone()]);

        let trust = TrustBundle::from_pem(bundle.ca_cert_pem()).unwrap();
        assert_eq!(trust.ca_der(), bundle.ca_cert_der());
        assert_eq!(trust.root_store().unwrap().len(), 1);

        let debug = format!("{:?}", bundle);
        assert!(debug.contains("<redacted>"));
        assert!(!debug.contains("PRIVATE KEY"));
    }

    #[test]
    fn pem_without_certificate_is_rejected() {
        assert!(matches!(
            TrustBundle::from_pem("not a certificate"),
            Err(CertificateError::MissingCertificate)
        ));
    }
}
