use std::fs::File;
use std::io::{self, BufReader, ErrorKind};
use std::sync::Arc;

use pgwire::tokio::tokio_rustls::rustls::ServerConfig;
use pgwire::tokio::TlsAcceptor;

/// Build the TLS acceptor from `CALGUARD_TLS_CERT` / `CALGUARD_TLS_KEY`.
/// Neither set means plaintext; only one set is a configuration error.
pub fn load_tls_acceptor(
    cert_path: Option<&str>,
    key_path: Option<&str>,
) -> io::Result<Option<TlsAcceptor>> {
    let (cert_path, key_path) = match (cert_path, key_path) {
        (None, None) => return Ok(None),
        (Some(cert), Some(key)) => (cert, key),
        (Some(_), None) => return Err(half_configured("CALGUARD_TLS_KEY")),
        (None, Some(_)) => return Err(half_configured("CALGUARD_TLS_CERT")),
    };

    let certs: Vec<_> = rustls_pemfile::certs(&mut BufReader::new(open_pem(cert_path)?))
        .collect::<Result<_, _>>()?;
    if certs.is_empty() {
        return Err(io::Error::new(
            ErrorKind::InvalidInput,
            format!("no certificates found in {cert_path}"),
        ));
    }

    let key = rustls_pemfile::private_key(&mut BufReader::new(open_pem(key_path)?))?
        .ok_or_else(|| {
            io::Error::new(ErrorKind::InvalidInput, format!("no private key found in {key_path}"))
        })?;

    let mut config = ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .map_err(|e| io::Error::new(ErrorKind::InvalidInput, e))?;
    config.alpn_protocols = vec![b"postgresql".to_vec()];

    tracing::info!("TLS certificate loaded from {cert_path}");
    Ok(Some(TlsAcceptor::from(Arc::new(config))))
}

fn half_configured(missing: &str) -> io::Error {
    io::Error::new(
        ErrorKind::InvalidInput,
        format!("{missing} is unset: set both CALGUARD_TLS_CERT and CALGUARD_TLS_KEY, or neither"),
    )
}

fn open_pem(path: &str) -> io::Result<File> {
    File::open(path).map_err(|e| io::Error::new(e.kind(), format!("{path}: {e}")))
}
