//! TLS material for the webhook server.
//!
//! The trust store is built once at startup and handed to whatever needs
//! it. The mutation core never sees it.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use rustls::RootCertStore;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::server::{ServerConfig, WebPkiClientVerifier};
use thiserror::Error;
use tracing::{info, warn};

/// Errors building TLS configuration
#[derive(Error, Debug)]
pub enum TlsError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid PEM data in {path}: {source}")]
    Pem {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("no certificates found in {0}")]
    NoCertificates(PathBuf),

    #[error("no private key found in {0}")]
    NoPrivateKey(PathBuf),

    #[error("failed to build client certificate verifier: {0}")]
    Verifier(#[from] rustls::server::VerifierBuilderError),

    #[error("TLS configuration error: {0}")]
    Rustls(#[from] rustls::Error),
}

/// CA certificates trusted for client authentication
#[derive(Clone, Debug)]
pub struct TrustStore {
    roots: Arc<RootCertStore>,
}

impl Default for TrustStore {
    fn default() -> Self {
        Self::empty()
    }
}

impl TrustStore {
    pub fn empty() -> Self {
        Self {
            roots: Arc::new(RootCertStore::empty()),
        }
    }

    /// Load a CA bundle from a PEM file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, TlsError> {
        let path = path.as_ref();
        let pem = std::fs::read(path).map_err(|source| TlsError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let store = Self::from_pem(&pem).map_err(|source| TlsError::Pem {
            path: path.to_path_buf(),
            source,
        })?;
        if store.is_empty() {
            warn!(path = %path.display(), "No CA certificates appended to trust store");
        } else {
            info!(path = %path.display(), certificates = store.len(), "Loaded trust store");
        }
        Ok(store)
    }

    /// Parse PEM encoded CA certificates, skipping ones that are not valid trust anchors
    pub fn from_pem(mut pem: &[u8]) -> Result<Self, std::io::Error> {
        let certs = rustls_pemfile::certs(&mut pem).collect::<Result<Vec<_>, _>>()?;
        let mut roots = RootCertStore::empty();
        let (_added, ignored) = roots.add_parsable_certificates(certs);
        if ignored > 0 {
            warn!(ignored, "Ignored unparsable CA certificates");
        }
        Ok(Self {
            roots: Arc::new(roots),
        })
    }

    pub fn len(&self) -> usize {
        self.roots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    pub fn roots(&self) -> Arc<RootCertStore> {
        self.roots.clone()
    }
}

/// Build the server TLS configuration.
///
/// With a non-empty trust store, client certificates are verified against it
/// when presented; clients without one are still accepted.
pub fn server_config(
    cert_path: impl AsRef<Path>,
    key_path: impl AsRef<Path>,
    trust: &TrustStore,
) -> Result<Arc<ServerConfig>, TlsError> {
    let certs = load_certs(cert_path.as_ref())?;
    let key = load_private_key(key_path.as_ref())?;

    let provider = Arc::new(rustls::crypto::aws_lc_rs::default_provider());
    let builder =
        ServerConfig::builder_with_provider(provider.clone()).with_safe_default_protocol_versions()?;

    let mut config = if trust.is_empty() {
        builder.with_no_client_auth().with_single_cert(certs, key)?
    } else {
        let verifier = WebPkiClientVerifier::builder_with_provider(trust.roots(), provider)
            .allow_unauthenticated()
            .build()?;
        builder
            .with_client_cert_verifier(verifier)
            .with_single_cert(certs, key)?
    };
    config.alpn_protocols = vec![b"h2".to_vec(), b"http/1.1".to_vec()];

    Ok(Arc::new(config))
}

fn read(path: &Path) -> Result<Vec<u8>, TlsError> {
    std::fs::read(path).map_err(|source| TlsError::Read {
        path: path.to_path_buf(),
        source,
    })
}

fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>, TlsError> {
    let pem = read(path)?;
    let certs = rustls_pemfile::certs(&mut pem.as_slice())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|source| TlsError::Pem {
            path: path.to_path_buf(),
            source,
        })?;
    if certs.is_empty() {
        return Err(TlsError::NoCertificates(path.to_path_buf()));
    }
    Ok(certs)
}

fn load_private_key(path: &Path) -> Result<PrivateKeyDer<'static>, TlsError> {
    let pem = read(path)?;
    rustls_pemfile::private_key(&mut pem.as_slice())
        .map_err(|source| TlsError::Pem {
            path: path.to_path_buf(),
            source,
        })?
        .ok_or_else(|| TlsError::NoPrivateKey(path.to_path_buf()))
}
