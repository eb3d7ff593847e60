//! Mutual-TLS material for the command service.
//!
//! Both binaries load the same three PEM files: the shared CA
//! certificate, their own certificate, and its private key. The server
//! side builds a TLS 1.3-only rustls configuration that requires and
//! verifies a client certificate; the client side builds the matching
//! tonic transport configuration.

use crate::errors::{SandboxError, SandboxResult};
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::server::WebPkiClientVerifier;
use rustls::{RootCertStore, ServerConfig};
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;
use tonic::transport::{Certificate, ClientTlsConfig, Identity};
use x509_parser::prelude::{FromDer, X509Certificate};

/// PEM material shared by the server and client configurations.
#[derive(Debug)]
pub struct TlsMaterial {
    ca_pem: Vec<u8>,
    cert_pem: Vec<u8>,
    key_pem: Vec<u8>,
}

impl TlsMaterial {
    /// Load the CA certificate, the local certificate, and its key.
    pub fn load(ca: &Path, cert: &Path, key: &Path) -> SandboxResult<Self> {
        Ok(Self {
            ca_pem: read_pem(ca)?,
            cert_pem: read_pem(cert)?,
            key_pem: read_pem(key)?,
        })
    }

    /// TLS 1.3-only server configuration that requires and verifies a
    /// client certificate against the shared CA, with h2 ALPN for gRPC.
    pub fn server_config(&self) -> SandboxResult<Arc<ServerConfig>> {
        let provider = Arc::new(rustls::crypto::ring::default_provider());

        let mut roots = RootCertStore::empty();
        for cert in pem_certs(&self.ca_pem)? {
            roots
                .add(cert)
                .map_err(|e| SandboxError::Config(format!("ca certificate: {e}")))?;
        }

        let verifier = WebPkiClientVerifier::builder_with_provider(Arc::new(roots), provider.clone())
            .build()
            .map_err(|e| SandboxError::Config(format!("client verifier: {e}")))?;

        let mut config = ServerConfig::builder_with_provider(provider)
            .with_protocol_versions(&[&rustls::version::TLS13])
            .map_err(|e| SandboxError::Config(format!("protocol versions: {e}")))?
            .with_client_cert_verifier(verifier)
            .with_single_cert(pem_certs(&self.cert_pem)?, pem_key(&self.key_pem)?)
            .map_err(|e| SandboxError::Config(format!("server certificate: {e}")))?;

        config.alpn_protocols = vec![b"h2".to_vec()];

        Ok(Arc::new(config))
    }

    /// Client-side tonic TLS configuration trusting the shared CA.
    pub fn client_config(&self, domain: &str) -> ClientTlsConfig {
        ClientTlsConfig::new()
            .ca_certificate(Certificate::from_pem(&self.ca_pem))
            .identity(Identity::from_pem(&self.cert_pem, &self.key_pem))
            .domain_name(domain)
    }
}

/// Subject attributes extracted from a peer certificate.
#[derive(Debug, Clone)]
pub struct PeerIdentity {
    /// Serial number, hex-encoded.
    pub serial: String,
    /// Subject organizations (O).
    pub orgs: Vec<String>,
    /// Subject organizational units (OU).
    pub units: Vec<String>,
}

/// Parse the subject organizations and units out of a DER-encoded peer
/// certificate. The transport layer has already verified the chain.
pub fn peer_identity(der: &[u8]) -> SandboxResult<PeerIdentity> {
    let (_, cert) = X509Certificate::from_der(der)
        .map_err(|e| SandboxError::Config(format!("peer certificate: {e}")))?;

    let subject = cert.subject();
    let orgs = subject
        .iter_organization()
        .filter_map(|attr| attr.as_str().ok())
        .map(str::to_string)
        .collect();
    let units = subject
        .iter_organizational_unit()
        .filter_map(|attr| attr.as_str().ok())
        .map(str::to_string)
        .collect();

    Ok(PeerIdentity {
        serial: cert.raw_serial_as_string(),
        orgs,
        units,
    })
}

fn read_pem(path: &Path) -> SandboxResult<Vec<u8>> {
    std::fs::read(path)
        .map_err(|e| SandboxError::Config(format!("failed to read {}: {e}", path.display())))
}

fn pem_certs(pem: &[u8]) -> SandboxResult<Vec<CertificateDer<'static>>> {
    let mut reader = BufReader::new(pem);
    let certs: Result<Vec<_>, _> = rustls_pemfile::certs(&mut reader).collect();
    let certs = certs.map_err(|e| SandboxError::Config(format!("invalid certificate pem: {e}")))?;

    if certs.is_empty() {
        return Err(SandboxError::Config("no certificate in pem".into()));
    }

    Ok(certs)
}

fn pem_key(pem: &[u8]) -> SandboxResult<PrivateKeyDer<'static>> {
    let mut reader = BufReader::new(pem);
    rustls_pemfile::private_key(&mut reader)
        .map_err(|e| SandboxError::Config(format!("invalid key pem: {e}")))?
        .ok_or_else(|| SandboxError::Config("no private key in pem".into()))
}
