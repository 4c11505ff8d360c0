//! Secure upgrade layer
//!
//! Runs a TLS client handshake over an already-established tunnel using
//! rustls. The tunnel is consumed: on failure it is dropped (and thereby
//! closed), there is no fallback to plaintext.

use crate::config::TlsConfig;
use crate::error::SocksError;
use std::io::BufReader;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_rustls::rustls::client::danger::{
    HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier,
};
use tokio_rustls::rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use tokio_rustls::rustls::{ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme};
use tokio_rustls::TlsConnector;

/// TLS stream over a tunnel
pub type TlsStream<S> = tokio_rustls::client::TlsStream<S>;

/// Initiates TLS on established tunnels
#[derive(Clone)]
pub struct SecureUpgrader {
    /// TLS connector
    connector: TlsConnector,
    /// Name override for SNI and certificate verification
    server_name: Option<String>,
}

impl std::fmt::Debug for SecureUpgrader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecureUpgrader")
            .field("server_name", &self.server_name)
            .finish()
    }
}

impl SecureUpgrader {
    /// Create an upgrader with the given verification options
    pub fn new(config: &TlsConfig) -> Result<Self, SocksError> {
        let tls_config = if config.verify_peer {
            ClientConfig::builder()
                .with_root_certificates(root_store(config)?)
                .with_no_client_auth()
        } else {
            // Dangerous: accepts any certificate, for self-signed endpoints
            ClientConfig::builder()
                .dangerous()
                .with_custom_certificate_verifier(Arc::new(NoVerifier))
                .with_no_client_auth()
        };

        Ok(SecureUpgrader {
            connector: TlsConnector::from(Arc::new(tls_config)),
            server_name: config.server_name.clone(),
        })
    }

    /// Perform the TLS handshake over `stream`, verifying against `host`
    pub async fn upgrade<S>(&self, stream: S, host: &str) -> Result<TlsStream<S>, SocksError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let hostname = self.server_name.as_deref().unwrap_or(host);
        let server_name = ServerName::try_from(hostname.to_string()).map_err(|e| {
            SocksError::SecureHandshakeFailed(format!("Invalid hostname {}: {}", hostname, e))
        })?;

        let tls_stream = self
            .connector
            .connect(server_name, stream)
            .await
            .map_err(|e| {
                SocksError::SecureHandshakeFailed(format!("TLS handshake with {} failed: {}", hostname, e))
            })?;

        tracing::debug!("TLS established with {}", hostname);
        Ok(tls_stream)
    }
}

fn root_store(config: &TlsConfig) -> Result<RootCertStore, SocksError> {
    let mut root_store = RootCertStore::empty();

    let native_certs = rustls_native_certs::load_native_certs();
    for cert in native_certs.certs {
        root_store.add(cert).ok();
    }

    if let Some(ref root_path) = config.trusted_root {
        let file = std::fs::File::open(root_path).map_err(|e| {
            SocksError::InvalidConfig(format!("Failed to open certificate file {}: {}", root_path, e))
        })?;
        let mut reader = BufReader::new(file);
        let certs = rustls_pemfile::certs(&mut reader)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| {
                SocksError::InvalidConfig(format!("Failed to parse certificates from {}: {}", root_path, e))
            })?;
        for cert in certs {
            root_store.add(cert).map_err(|e| {
                SocksError::InvalidConfig(format!("Failed to add certificate to store: {}", e))
            })?;
        }
    }

    Ok(root_store)
}

/// Certificate verifier that accepts all certificates
#[derive(Debug)]
struct NoVerifier;

impl ServerCertVerifier for NoVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, tokio_rustls::rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, tokio_rustls::rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, tokio_rustls::rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        vec![
            SignatureScheme::RSA_PKCS1_SHA256,
            SignatureScheme::RSA_PKCS1_SHA384,
            SignatureScheme::RSA_PKCS1_SHA512,
            SignatureScheme::ECDSA_NISTP256_SHA256,
            SignatureScheme::ECDSA_NISTP384_SHA384,
            SignatureScheme::ECDSA_NISTP521_SHA512,
            SignatureScheme::RSA_PSS_SHA256,
            SignatureScheme::RSA_PSS_SHA384,
            SignatureScheme::RSA_PSS_SHA512,
            SignatureScheme::ED25519,
        ]
    }
}
