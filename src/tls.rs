//! TLS engine attached to a listening socket.
//!
//! The server treats the engine as an opaque byte-stream transform: every
//! accepted socket is wrapped before the connection handler sees a byte.
//! Handshake failures surface as connection errors and fire the `failed`
//! lifecycle event.

use crate::errors::ServerError;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use std::{fs::File, io::BufReader, path::Path, sync::Arc};
use tokio_rustls::TlsAcceptor;

/// Server-side TLS configuration built from PEM files.
#[derive(Clone)]
pub struct TlsEngine {
    acceptor: TlsAcceptor,
}

impl TlsEngine {
    /// Loads a certificate chain and private key and builds the acceptor.
    pub fn new(
        cert_path: impl AsRef<Path>,
        key_path: impl AsRef<Path>,
    ) -> Result<Self, ServerError> {
        let certs = load_certs(cert_path.as_ref())?;
        let key = load_private_key(key_path.as_ref())?;

        let config = rustls::ServerConfig::builder()
            .with_no_client_auth()
            .with_single_cert(certs, key)
            .map_err(|e| ServerError::TlsHandshakeFailed(e.to_string()))?;

        Ok(Self {
            acceptor: TlsAcceptor::from(Arc::new(config)),
        })
    }

    /// Wraps a prebuilt rustls configuration.
    pub fn from_config(config: Arc<rustls::ServerConfig>) -> Self {
        Self {
            acceptor: TlsAcceptor::from(config),
        }
    }

    pub(crate) fn acceptor(&self) -> TlsAcceptor {
        self.acceptor.clone()
    }
}

fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>, ServerError> {
    let file = File::open(path)
        .map_err(|e| ServerError::TlsHandshakeFailed(format!("cannot open certificate: {e}")))?;
    let mut reader = BufReader::new(file);

    let certs = rustls_pemfile::certs(&mut reader)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| ServerError::TlsHandshakeFailed(format!("cannot parse certificate: {e}")))?;

    if certs.is_empty() {
        return Err(ServerError::TlsHandshakeFailed(
            "no certificate found".to_string(),
        ));
    }
    Ok(certs)
}

fn load_private_key(path: &Path) -> Result<PrivateKeyDer<'static>, ServerError> {
    let file = File::open(path)
        .map_err(|e| ServerError::TlsHandshakeFailed(format!("cannot open key: {e}")))?;
    let mut reader = BufReader::new(file);

    loop {
        match rustls_pemfile::read_one(&mut reader)
            .map_err(|e| ServerError::TlsHandshakeFailed(format!("cannot parse key: {e}")))?
        {
            Some(rustls_pemfile::Item::Pkcs1Key(key)) => return Ok(PrivateKeyDer::Pkcs1(key)),
            Some(rustls_pemfile::Item::Pkcs8Key(key)) => return Ok(PrivateKeyDer::Pkcs8(key)),
            Some(rustls_pemfile::Item::Sec1Key(key)) => return Ok(PrivateKeyDer::Sec1(key)),
            Some(_) => continue,
            None => break,
        }
    }

    Err(ServerError::TlsHandshakeFailed(
        "no private key found".to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_files_are_reported() {
        let result = TlsEngine::new("/nonexistent/cert.pem", "/nonexistent/key.pem");
        assert!(matches!(result, Err(ServerError::TlsHandshakeFailed(_))));
    }
}
