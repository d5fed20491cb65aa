//! Low-level SMTP stream handling.

use crate::error::{Error, Result};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tokio_rustls::rustls::client::danger::{
    HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier,
};
use tokio_rustls::rustls::{ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme};

/// Any bidirectional byte stream the client can talk SMTP over.
pub trait AsyncStream: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> AsyncStream for T {}

/// TLS settings shared by implicit TLS and STARTTLS.
#[derive(Debug, Clone, Default)]
pub struct TlsOptions {
    /// Skip certificate verification (self-signed relays).
    pub accept_invalid_certs: bool,
    /// Name to verify the certificate against instead of the connect host.
    pub server_name: Option<String>,
}

/// SMTP stream (TCP, TLS, or a caller-supplied stream).
pub enum SmtpStream {
    /// Plain TCP connection.
    Tcp(BufReader<TcpStream>),
    /// TLS-encrypted connection.
    Tls(Box<BufReader<tokio_rustls::client::TlsStream<TcpStream>>>),
    /// Caller-supplied stream, used for tests and tunnels.
    Custom(BufReader<Box<dyn AsyncStream>>),
}

impl fmt::Debug for SmtpStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tcp(_) => f.write_str("SmtpStream::Tcp"),
            Self::Tls(_) => f.write_str("SmtpStream::Tls"),
            Self::Custom(_) => f.write_str("SmtpStream::Custom"),
        }
    }
}

impl SmtpStream {
    /// Wraps an arbitrary stream.
    pub fn from_io(io: impl AsyncStream + 'static) -> Self {
        Self::Custom(BufReader::new(Box::new(io)))
    }

    /// Reads a line from the stream, without the trailing CRLF.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails or the peer closed the connection.
    pub async fn read_line(&mut self) -> Result<String> {
        let mut line = String::new();
        let read = match self {
            Self::Tcp(reader) => reader.read_line(&mut line).await?,
            Self::Tls(reader) => reader.read_line(&mut line).await?,
            Self::Custom(reader) => reader.read_line(&mut line).await?,
        };
        if read == 0 {
            return Err(Error::ConnectionClosed);
        }
        Ok(line.trim_end().to_string())
    }

    /// Writes data to the stream and flushes it.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    pub async fn write_all(&mut self, data: &[u8]) -> Result<()> {
        match self {
            Self::Tcp(reader) => {
                reader.get_mut().write_all(data).await?;
                reader.get_mut().flush().await?;
            }
            Self::Tls(reader) => {
                reader.get_mut().write_all(data).await?;
                reader.get_mut().flush().await?;
            }
            Self::Custom(reader) => {
                reader.get_mut().write_all(data).await?;
                reader.get_mut().flush().await?;
            }
        }
        Ok(())
    }

    /// Upgrades a TCP stream to TLS.
    ///
    /// # Errors
    ///
    /// Returns an error if the stream is not plain TCP or the handshake fails.
    pub async fn upgrade_to_tls(self, hostname: &str, options: &TlsOptions) -> Result<Self> {
        let tcp_stream = match self {
            Self::Tcp(reader) => reader.into_inner(),
            Self::Tls(_) => return Err(Error::Protocol("Already using TLS".into())),
            Self::Custom(_) => {
                return Err(Error::NotSupported("TLS upgrade of a custom stream".into()));
            }
        };

        let tls_stream = handshake(tcp_stream, hostname, options).await?;
        Ok(Self::Tls(Box::new(BufReader::new(tls_stream))))
    }
}

/// Connects to an SMTP server over plain TCP.
///
/// # Errors
///
/// Returns an error if the connection fails or exceeds `timeout`.
pub async fn connect(hostname: &str, port: u16, timeout: Option<Duration>) -> Result<SmtpStream> {
    let stream = tcp_connect(hostname, port, timeout).await?;
    Ok(SmtpStream::Tcp(BufReader::new(stream)))
}

/// Connects to an SMTP server over TLS (implicit TLS, usually port 465).
///
/// # Errors
///
/// Returns an error if the connection or TLS handshake fails.
pub async fn connect_tls(
    hostname: &str,
    port: u16,
    options: &TlsOptions,
    timeout: Option<Duration>,
) -> Result<SmtpStream> {
    let tcp_stream = tcp_connect(hostname, port, timeout).await?;
    let tls_stream = handshake(tcp_stream, hostname, options).await?;
    Ok(SmtpStream::Tls(Box::new(BufReader::new(tls_stream))))
}

async fn tcp_connect(hostname: &str, port: u16, timeout: Option<Duration>) -> Result<TcpStream> {
    let addr = format!("{hostname}:{port}");
    match timeout {
        Some(limit) => tokio::time::timeout(limit, TcpStream::connect(&addr))
            .await
            .map_err(|_| Error::Timeout(limit))?
            .map_err(Into::into),
        None => TcpStream::connect(&addr).await.map_err(Into::into),
    }
}

async fn handshake(
    tcp_stream: TcpStream,
    hostname: &str,
    options: &TlsOptions,
) -> Result<tokio_rustls::client::TlsStream<TcpStream>> {
    let name = options.server_name.as_deref().unwrap_or(hostname);
    let server_name = ServerName::try_from(name.to_string())
        .map_err(|_| Error::Protocol(format!("Invalid hostname: {name}")))?;

    let connector = create_tls_connector(options.accept_invalid_certs);
    Ok(connector.connect(server_name, tcp_stream).await?)
}

fn create_tls_connector(accept_invalid_certs: bool) -> TlsConnector {
    let config = if accept_invalid_certs {
        ClientConfig::builder()
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(NoVerifier))
            .with_no_client_auth()
    } else {
        let root_store = RootCertStore {
            roots: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
        };
        ClientConfig::builder()
            .with_root_certificates(root_store)
            .with_no_client_auth()
    };

    TlsConnector::from(Arc::new(config))
}

/// Accepts any server certificate.
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
    ) -> std::result::Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        vec![
            SignatureScheme::RSA_PKCS1_SHA256,
            SignatureScheme::RSA_PKCS1_SHA384,
            SignatureScheme::RSA_PSS_SHA256,
            SignatureScheme::ECDSA_NISTP256_SHA256,
            SignatureScheme::ECDSA_NISTP384_SHA384,
            SignatureScheme::ED25519,
        ]
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tokio_test::io::Builder;

    #[tokio::test]
    async fn read_line_strips_crlf() {
        let mock = Builder::new().read(b"220 ready\r\n").build();
        let mut stream = SmtpStream::from_io(mock);
        assert_eq!(stream.read_line().await.unwrap(), "220 ready");
    }

    #[tokio::test]
    async fn read_line_reports_closed_connection() {
        let mock = Builder::new().build();
        let mut stream = SmtpStream::from_io(mock);
        assert!(matches!(
            stream.read_line().await,
            Err(Error::ConnectionClosed)
        ));
    }

    #[tokio::test]
    async fn custom_stream_cannot_upgrade() {
        let mock = Builder::new().build();
        let stream = SmtpStream::from_io(mock);
        let result = stream
            .upgrade_to_tls("smtp.example.com", &TlsOptions::default())
            .await;
        assert!(matches!(result, Err(Error::NotSupported(_))));
    }
}
