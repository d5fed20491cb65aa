//! Message delivery seam and its SMTP implementation.

use crate::config::{AuthMethod, Encryption, MailFormat, ServerConfig, TlsConfig};
use crate::error::Result;
use mailmerge_mime::{Attachment, BodyFormat, HeaderAddress, MessageBuilder};
use mailmerge_smtp::connection::{SmtpStream, TlsOptions, connect, connect_tls};
use mailmerge_smtp::{Address, Authenticated, Client, Connected, Mailbox};
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

/// Upper bound on waiting for the QUIT reply when no send timeout is set.
const QUIT_TIMEOUT: Duration = Duration::from_secs(10);

/// Delivery failures.
#[derive(Debug, Error)]
pub enum TransportError {
    /// SMTP failure.
    #[error(transparent)]
    Smtp(#[from] mailmerge_smtp::Error),

    /// The message could not be assembled.
    #[error("cannot build message: {0}")]
    Message(#[from] mailmerge_mime::Error),

    /// The server did not answer in time.
    #[error("timed out after {0:?}")]
    Timeout(Duration),
}

impl TransportError {
    /// Returns true if the session cannot carry further messages.
    #[must_use]
    pub const fn is_connection_lost(&self) -> bool {
        match self {
            Self::Smtp(err) => err.is_connection_lost(),
            Self::Message(_) => false,
            Self::Timeout(_) => true,
        }
    }
}

/// A fully assembled message.
#[derive(Debug, Clone)]
pub struct OutgoingMessage {
    /// Sender.
    pub from: Mailbox,
    /// Recipients.
    pub to: Vec<Mailbox>,
    /// CC recipients.
    pub cc: Vec<Mailbox>,
    /// BCC recipients, envelope only.
    pub bcc: Vec<Mailbox>,
    /// Subject line.
    pub subject: String,
    /// Body format.
    pub format: MailFormat,
    /// Rendered body.
    pub body: String,
    /// Files to attach.
    pub attachments: Vec<Attachment>,
}

impl OutgoingMessage {
    /// Every envelope recipient (to, cc, bcc), each address once.
    #[must_use]
    pub fn envelope_recipients(&self) -> Vec<Address> {
        let mut seen = Vec::new();
        let mut recipients = Vec::new();
        for mailbox in self.to.iter().chain(&self.cc).chain(&self.bcc) {
            let key = mailbox.address.normalized();
            if !seen.contains(&key) {
                seen.push(key);
                recipients.push(mailbox.address.clone());
            }
        }
        recipients
    }

    /// Renders the message as MIME bytes. BCC recipients are left out.
    ///
    /// # Errors
    ///
    /// Returns an error if a header would be malformed.
    pub fn to_mime(&self) -> mailmerge_mime::Result<Vec<u8>> {
        let format = match self.format {
            MailFormat::Html => BodyFormat::Html,
            MailFormat::Plain => BodyFormat::Plain,
        };

        let mut builder = MessageBuilder::new()
            .from(header_address(&self.from))
            .subject(self.subject.as_str())
            .body(format, self.body.as_str());
        for mailbox in &self.to {
            builder = builder.to(header_address(mailbox));
        }
        for mailbox in &self.cc {
            builder = builder.cc(header_address(mailbox));
        }
        for attachment in &self.attachments {
            builder = builder.attach(attachment.clone());
        }
        builder.build()
    }
}

fn header_address(mailbox: &Mailbox) -> HeaderAddress {
    HeaderAddress {
        name: mailbox.name.clone(),
        address: mailbox.address.as_str().to_string(),
    }
}

/// An open delivery session.
pub trait Transport: Send {
    /// Delivers one message.
    fn send(
        &mut self,
        message: &OutgoingMessage,
    ) -> impl Future<Output = std::result::Result<(), TransportError>> + Send;

    /// Ends the session.
    fn close(self) -> impl Future<Output = std::result::Result<(), TransportError>> + Send;
}

/// Opens delivery sessions.
pub trait Connector {
    /// Session type.
    type Transport: Transport;

    /// Opens a session.
    fn connect(
        &self,
    ) -> impl Future<Output = std::result::Result<Self::Transport, TransportError>> + Send;
}

/// Connects to the configured SMTP server.
#[derive(Debug, Clone)]
pub struct SmtpConnector {
    host: String,
    port: u16,
    helo: String,
    encryption: Encryption,
    authentication: AuthMethod,
    username: String,
    password: String,
    tls: TlsOptions,
    connect_timeout: Option<Duration>,
    send_timeout: Option<Duration>,
}

impl SmtpConnector {
    /// Builds a connector from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if a timeout is not a valid duration.
    pub fn new(server: &ServerConfig, tls: &TlsConfig) -> Result<Self> {
        let server_name = tls.server_name.trim();
        Ok(Self {
            host: server.host.clone(),
            port: server.effective_port(),
            helo: server.helo.clone(),
            encryption: server.encryption,
            authentication: server.authentication,
            username: server.username.clone(),
            password: server.password.clone(),
            tls: TlsOptions {
                accept_invalid_certs: tls.insecure_skip_verify,
                server_name: (!server_name.is_empty()).then(|| server_name.to_string()),
            },
            connect_timeout: server.connect_timeout()?,
            send_timeout: server.send_timeout()?,
        })
    }

    /// Greets, upgrades and authenticates over an already open stream.
    ///
    /// # Errors
    ///
    /// Returns an error if the server rejects any step.
    pub async fn handshake(
        &self,
        stream: SmtpStream,
    ) -> std::result::Result<SmtpTransport, TransportError> {
        let client = Client::from_stream(stream).await?.ehlo(&self.helo).await?;
        let client = if self.encryption == Encryption::StartTls {
            client.starttls(&self.host, &self.helo, &self.tls).await?
        } else {
            client
        };

        let session = match self.authentication {
            AuthMethod::None => Session::Anonymous(client),
            AuthMethod::Plain => {
                Session::Authenticated(client.auth_plain(&self.username, &self.password).await?)
            }
            AuthMethod::Login => {
                Session::Authenticated(client.auth_login(&self.username, &self.password).await?)
            }
        };
        debug!(auth = ?self.authentication, "SMTP session ready");

        Ok(SmtpTransport {
            session,
            send_timeout: self.send_timeout,
            broken: false,
        })
    }

    async fn open(&self) -> std::result::Result<SmtpTransport, TransportError> {
        let stream = match self.encryption {
            Encryption::Implicit => connect_tls(&self.host, self.port, &self.tls, None).await?,
            Encryption::None | Encryption::StartTls => connect(&self.host, self.port, None).await?,
        };
        info!(host = %self.host, port = self.port, encryption = ?self.encryption, "connected");
        self.handshake(stream).await
    }
}

impl Connector for SmtpConnector {
    type Transport = SmtpTransport;

    /// Opens the connection and runs the handshake. The connect timeout
    /// covers the whole sequence, greeting and authentication included.
    async fn connect(&self) -> std::result::Result<SmtpTransport, TransportError> {
        match self.connect_timeout {
            Some(limit) => tokio::time::timeout(limit, self.open())
                .await
                .map_err(|_| TransportError::Timeout(limit))?,
            None => self.open().await,
        }
    }
}

#[derive(Debug)]
enum Session {
    Anonymous(Client<Connected>),
    Authenticated(Client<Authenticated>),
}

/// One SMTP connection reused for every message of a run.
#[derive(Debug)]
pub struct SmtpTransport {
    session: Session,
    send_timeout: Option<Duration>,
    /// Set once a send lost the connection; QUIT is not attempted then.
    broken: bool,
}

impl SmtpTransport {
    async fn transmit(
        &mut self,
        from: &Address,
        recipients: &[Address],
        data: &[u8],
    ) -> mailmerge_smtp::Result<()> {
        match &mut self.session {
            Session::Anonymous(client) => client.send_mail(from, recipients, data).await,
            Session::Authenticated(client) => client.send_mail(from, recipients, data).await,
        }
    }
}

impl Transport for SmtpTransport {
    async fn send(&mut self, message: &OutgoingMessage) -> std::result::Result<(), TransportError> {
        let data = message.to_mime()?;
        let recipients = message.envelope_recipients();
        let from = message.from.address.clone();

        let result = match self.send_timeout {
            Some(limit) => tokio::time::timeout(limit, self.transmit(&from, &recipients, &data))
                .await
                .map_err(|_| TransportError::Timeout(limit))
                .and_then(|sent| sent.map_err(TransportError::from)),
            None => self
                .transmit(&from, &recipients, &data)
                .await
                .map_err(TransportError::from),
        };
        if let Err(err) = &result
            && err.is_connection_lost()
        {
            self.broken = true;
        }
        result
    }

    async fn close(self) -> std::result::Result<(), TransportError> {
        if self.broken {
            debug!("session lost, dropping without QUIT");
            return Ok(());
        }

        let limit = self.send_timeout.unwrap_or(QUIT_TIMEOUT);
        let quit = async move {
            match self.session {
                Session::Anonymous(client) => client.quit().await,
                Session::Authenticated(client) => client.quit().await,
            }
        };
        tokio::time::timeout(limit, quit)
            .await
            .map_err(|_| TransportError::Timeout(limit))??;
        debug!("SMTP session closed");
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
    use tokio_test::io::Builder;

    /// A server that answers the greeting and EHLO, then reads without ever
    /// replying.
    fn silent_server() -> SmtpStream {
        let (client, server) = tokio::io::duplex(4096);
        tokio::spawn(async move {
            let (read, mut write) = tokio::io::split(server);
            let mut lines = BufReader::new(read).lines();
            write.write_all(b"220 mx.example.com ESMTP\r\n").await.unwrap();
            lines.next_line().await.unwrap();
            write.write_all(b"250 mx.example.com\r\n").await.unwrap();
            while let Ok(Some(_)) = lines.next_line().await {}
        });
        SmtpStream::from_io(client)
    }

    fn timed_connector(send_timeout: &str) -> SmtpConnector {
        let server = ServerConfig {
            host: "mx.example.com".into(),
            send_timeout: send_timeout.into(),
            ..ServerConfig::default()
        };
        SmtpConnector::new(&server, &TlsConfig::default()).unwrap()
    }

    fn mailbox(s: &str) -> Mailbox {
        Mailbox::new(s).unwrap()
    }

    fn message() -> OutgoingMessage {
        OutgoingMessage {
            from: Mailbox::with_name("Sender", "sender@example.com").unwrap(),
            to: vec![mailbox("a@example.com"), mailbox("b@example.com")],
            cc: vec![mailbox("A@example.com"), mailbox("cc@example.com")],
            bcc: vec![mailbox("hidden@example.com")],
            subject: "Hello".into(),
            format: MailFormat::Plain,
            body: "Hi".into(),
            attachments: Vec::new(),
        }
    }

    fn connector(authentication: AuthMethod) -> SmtpConnector {
        let server = ServerConfig {
            host: "mx.example.com".into(),
            username: "user".into(),
            password: "pass".into(),
            authentication,
            ..ServerConfig::default()
        };
        SmtpConnector::new(&server, &TlsConfig::default()).unwrap()
    }

    #[test]
    fn test_envelope_dedups_and_keeps_bcc() {
        let recipients: Vec<String> = message()
            .envelope_recipients()
            .iter()
            .map(ToString::to_string)
            .collect();
        assert_eq!(
            recipients,
            [
                "a@example.com",
                "b@example.com",
                "cc@example.com",
                "hidden@example.com"
            ]
        );
    }

    #[test]
    fn test_mime_omits_bcc() {
        let text = String::from_utf8(message().to_mime().unwrap()).unwrap();
        assert!(text.contains("From: \"Sender\" <sender@example.com>\r\n"));
        assert!(text.contains("To: a@example.com, b@example.com\r\n"));
        assert!(text.contains("Cc: A@example.com, cc@example.com\r\n"));
        assert!(!text.contains("hidden@example.com"));
    }

    #[test]
    fn test_connection_lost_classification() {
        let rejected = TransportError::Smtp(mailmerge_smtp::Error::smtp_error(550, "no user"));
        let closing = TransportError::Smtp(mailmerge_smtp::Error::smtp_error(421, "bye"));
        assert!(!rejected.is_connection_lost());
        assert!(closing.is_connection_lost());
        assert!(TransportError::Timeout(Duration::from_secs(1)).is_connection_lost());
        assert!(
            TransportError::Smtp(mailmerge_smtp::Error::ConnectionClosed).is_connection_lost()
        );
    }

    #[test]
    fn test_connector_settings() {
        let server = ServerConfig {
            encryption: Encryption::StartTls,
            send_timeout: "2s".into(),
            ..ServerConfig::default()
        };
        let tls = TlsConfig {
            insecure_skip_verify: true,
            server_name: " relay.internal ".into(),
        };
        let connector = SmtpConnector::new(&server, &tls).unwrap();
        assert_eq!(connector.port, 587);
        assert_eq!(connector.send_timeout, Some(Duration::from_secs(2)));
        assert!(connector.tls.accept_invalid_certs);
        assert_eq!(connector.tls.server_name.as_deref(), Some("relay.internal"));

        let bad = ServerConfig {
            connect_timeout: "later".into(),
            ..ServerConfig::default()
        };
        assert!(SmtpConnector::new(&bad, &tls).is_err());
    }

    #[tokio::test]
    async fn test_handshake_with_plain_auth_then_quit() {
        let mock = Builder::new()
            .read(b"220 mx.example.com ESMTP\r\n")
            .write(b"EHLO localhost\r\n")
            .read(b"250-mx.example.com\r\n250 AUTH PLAIN LOGIN\r\n")
            .write(b"AUTH PLAIN AHVzZXIAcGFzcw==\r\n")
            .read(b"235 ok\r\n")
            .write(b"QUIT\r\n")
            .read(b"221 bye\r\n")
            .build();

        let transport = connector(AuthMethod::Plain)
            .handshake(SmtpStream::from_io(mock))
            .await
            .unwrap();
        assert!(matches!(transport.session, Session::Authenticated(_)));
        transport.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_handshake_rejected_credentials() {
        let mock = Builder::new()
            .read(b"220 mx.example.com ESMTP\r\n")
            .write(b"EHLO localhost\r\n")
            .read(b"250 mx.example.com\r\n")
            .write(b"AUTH PLAIN AHVzZXIAcGFzcw==\r\n")
            .read(b"535 authentication failed\r\n")
            .build();

        let err = connector(AuthMethod::Plain)
            .handshake(SmtpStream::from_io(mock))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            TransportError::Smtp(mailmerge_smtp::Error::SmtpError { code: 535, .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_timeout_breaks_session_and_close_returns() {
        let mut transport = timed_connector("1s")
            .handshake(silent_server())
            .await
            .unwrap();

        let err = transport.send(&message()).await.unwrap_err();
        assert!(matches!(err, TransportError::Timeout(limit) if limit == Duration::from_secs(1)));
        assert!(err.is_connection_lost());
        assert!(transport.broken);

        tokio::time::timeout(Duration::from_secs(60), transport.close())
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_quit_without_reply_is_bounded() {
        let transport = timed_connector("").handshake(silent_server()).await.unwrap();

        let result = tokio::time::timeout(Duration::from_secs(60), transport.close())
            .await
            .unwrap();
        assert!(matches!(result, Err(TransportError::Timeout(limit)) if limit == QUIT_TIMEOUT));
    }

    #[tokio::test]
    async fn test_connect_timeout_covers_greeting() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (_socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(30)).await;
        });

        let server = ServerConfig {
            host: "127.0.0.1".into(),
            port,
            connect_timeout: "1s".into(),
            ..ServerConfig::default()
        };
        let connector = SmtpConnector::new(&server, &TlsConfig::default()).unwrap();

        let result = tokio::time::timeout(Duration::from_secs(10), connector.connect())
            .await
            .unwrap();
        assert!(matches!(
            result,
            Err(TransportError::Timeout(limit)) if limit == Duration::from_secs(1)
        ));
    }
}
