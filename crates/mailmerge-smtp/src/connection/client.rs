//! Type-state SMTP client.

use super::{ServerInfo, SmtpStream, TlsOptions};
use crate::command::Command;
use crate::error::{Error, Result};
use crate::parser::{is_last_reply_line, parse_reply};
use crate::types::{Address, AuthMechanism, Extension, Reply, ReplyCode};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use std::collections::HashSet;
use std::marker::PhantomData;
use tracing::{debug, trace};

/// Type-state marker for connected state.
#[derive(Debug)]
pub struct Connected;

/// Type-state marker for authenticated state.
#[derive(Debug)]
pub struct Authenticated;

mod sealed {
    pub trait Sealed {}
    impl Sealed for super::Connected {}
    impl Sealed for super::Authenticated {}
}

/// States in which mail transactions may be run.
pub trait Ready: sealed::Sealed {}

impl Ready for Connected {}
impl Ready for Authenticated {}

/// SMTP client with type-state pattern.
#[derive(Debug)]
pub struct Client<State> {
    stream: SmtpStream,
    server_info: ServerInfo,
    _state: PhantomData<State>,
}

/// Connection trait for all states.
pub trait SmtpConnection {
    /// Returns the server information.
    fn server_info(&self) -> &ServerInfo;
}

impl<S> SmtpConnection for Client<S> {
    fn server_info(&self) -> &ServerInfo {
        &self.server_info
    }
}

impl Client<Connected> {
    /// Creates a client from a stream and reads the server greeting.
    ///
    /// # Errors
    ///
    /// Returns an error if reading the greeting fails or if the server returns an error.
    pub async fn from_stream(mut stream: SmtpStream) -> Result<Self> {
        let greeting = Self::read_reply(&mut stream).await?;
        if greeting.code != ReplyCode::SERVICE_READY {
            return Err(greeting.into_error());
        }

        let hostname = greeting
            .message
            .first()
            .and_then(|msg| msg.split_whitespace().next())
            .unwrap_or("unknown")
            .to_string();
        debug!(%hostname, "SMTP greeting received");

        Ok(Self {
            stream,
            server_info: ServerInfo {
                hostname,
                extensions: HashSet::new(),
            },
            _state: PhantomData,
        })
    }

    /// Sends EHLO and discovers server capabilities.
    ///
    /// # Errors
    ///
    /// Returns an error if the EHLO command fails.
    pub async fn ehlo(mut self, client_hostname: &str) -> Result<Self> {
        self.discover(client_hostname).await?;
        Ok(self)
    }

    /// Upgrades the connection to TLS using STARTTLS and repeats EHLO.
    ///
    /// `host` is the name the certificate is checked against unless
    /// [`TlsOptions::server_name`] overrides it.
    ///
    /// # Errors
    ///
    /// Returns an error if STARTTLS is not supported or if the upgrade fails.
    pub async fn starttls(
        mut self,
        host: &str,
        client_hostname: &str,
        options: &TlsOptions,
    ) -> Result<Self> {
        if !self.server_info.supports_starttls() {
            return Err(Error::NotSupported("STARTTLS".into()));
        }

        let reply = self.send_command(Command::StartTls).await?;
        if !reply.is_success() {
            return Err(reply.into_error());
        }

        self.stream = self.stream.upgrade_to_tls(host, options).await?;
        debug!("connection upgraded to TLS");

        self.discover(client_hostname).await?;
        Ok(self)
    }

    /// Authenticates using the PLAIN mechanism.
    ///
    /// # Errors
    ///
    /// Returns an error if authentication fails.
    pub async fn auth_plain(
        mut self,
        username: &str,
        password: &str,
    ) -> Result<Client<Authenticated>> {
        let credentials = format!("\0{username}\0{password}");
        let cmd = Command::Auth {
            mechanism: AuthMechanism::Plain,
            initial_response: Some(STANDARD.encode(credentials.as_bytes())),
        };

        let reply = self.send_command(cmd).await?;
        if !reply.is_success() {
            return Err(reply.into_error());
        }

        Ok(self.into_authenticated())
    }

    /// Authenticates using the LOGIN mechanism.
    ///
    /// # Errors
    ///
    /// Returns an error if the server does not follow the LOGIN exchange or
    /// rejects the credentials.
    pub async fn auth_login(
        mut self,
        username: &str,
        password: &str,
    ) -> Result<Client<Authenticated>> {
        let cmd = Command::Auth {
            mechanism: AuthMechanism::Login,
            initial_response: None,
        };

        let mut reply = self.send_command(cmd).await?;
        for secret in [username, password] {
            if reply.code != ReplyCode::AUTH_CONTINUE {
                return Err(reply.into_error());
            }
            let answer = Command::AuthResponse(STANDARD.encode(secret.as_bytes()));
            reply = self.send_command(answer).await?;
        }

        if !reply.is_success() {
            return Err(reply.into_error());
        }

        Ok(self.into_authenticated())
    }

    fn into_authenticated(self) -> Client<Authenticated> {
        Client {
            stream: self.stream,
            server_info: self.server_info,
            _state: PhantomData,
        }
    }

    async fn discover(&mut self, client_hostname: &str) -> Result<()> {
        let cmd = Command::Ehlo {
            hostname: client_hostname.to_string(),
        };
        let reply = self.send_command(cmd).await?;
        if !reply.is_success() {
            return Err(reply.into_error());
        }

        // First line is the server's greeting, the rest are extensions.
        self.server_info.extensions = reply
            .message
            .iter()
            .skip(1)
            .map(|line| Extension::parse(line))
            .collect();
        Ok(())
    }
}

impl<S: Ready> Client<S> {
    /// Runs one complete mail transaction: MAIL FROM, RCPT TO for every
    /// recipient, then DATA with the message.
    ///
    /// Message should be RFC 5322 formatted. Line endings are normalized to
    /// CRLF, leading dots are stuffed and the terminating `.` is added.
    ///
    /// When the server rejects a step the transaction is reset with RSET, so
    /// the client stays usable for the next message unless the returned
    /// error reports [`Error::is_connection_lost`].
    ///
    /// # Errors
    ///
    /// Returns an error if any step is rejected or the connection fails.
    pub async fn send_mail(
        &mut self,
        from: &Address,
        recipients: &[Address],
        message: &[u8],
    ) -> Result<()> {
        if recipients.is_empty() {
            return Err(Error::NoRecipients);
        }

        let limit = self.server_info.max_message_size();
        if let Some(max) = limit.filter(|max| *max > 0 && message.len() > *max) {
            debug!(size = message.len(), max, "message exceeds server limit");
            return Err(Error::MessageTooLarge(message.len()));
        }

        match self.transaction(from, recipients, message, limit).await {
            Ok(()) => Ok(()),
            Err(err) if err.is_connection_lost() => Err(err),
            Err(err) => {
                if let Err(reset_err) = self.expect_success(Command::Rset).await {
                    debug!(error = %reset_err, "RSET after failed transaction failed");
                    if reset_err.is_connection_lost() {
                        return Err(reset_err);
                    }
                }
                Err(err)
            }
        }
    }

    async fn transaction(
        &mut self,
        from: &Address,
        recipients: &[Address],
        message: &[u8],
        limit: Option<usize>,
    ) -> Result<()> {
        self.expect_success(Command::MailFrom {
            from: from.clone(),
            size: limit.map(|_| message.len()),
        })
        .await?;

        for to in recipients {
            self.expect_success(Command::RcptTo { to: to.clone() })
                .await?;
        }

        let reply = self.send_command(Command::Data).await?;
        if reply.code != ReplyCode::START_DATA {
            return Err(reply.into_error());
        }

        self.write_data(message).await?;

        let reply = Self::read_reply(&mut self.stream).await?;
        if !reply.is_success() {
            return Err(reply.into_error());
        }
        debug!(recipients = recipients.len(), "message accepted");
        Ok(())
    }

    async fn write_data(&mut self, message: &[u8]) -> Result<()> {
        let mut data = Vec::with_capacity(message.len() + 64);
        let body = message.strip_suffix(b"\n").unwrap_or(message);
        for line in body.split(|&b| b == b'\n') {
            let line = line.strip_suffix(b"\r").unwrap_or(line);
            if line.first() == Some(&b'.') {
                data.push(b'.');
            }
            data.extend_from_slice(line);
            data.extend_from_slice(b"\r\n");
        }
        data.extend_from_slice(b".\r\n");
        self.stream.write_all(&data).await
    }

    async fn expect_success(&mut self, cmd: Command) -> Result<Reply> {
        let reply = self.send_command(cmd).await?;
        if reply.is_success() {
            Ok(reply)
        } else {
            Err(reply.into_error())
        }
    }
}

// Common implementation for all states
impl<S> Client<S> {
    async fn send_command(&mut self, cmd: Command) -> Result<Reply> {
        trace!(command = %cmd.redacted(), "C:");
        self.stream.write_all(&cmd.serialize()).await?;
        Self::read_reply(&mut self.stream).await
    }

    async fn read_reply(stream: &mut SmtpStream) -> Result<Reply> {
        let mut lines = Vec::new();
        loop {
            let line = stream.read_line().await?;
            if line.is_empty() {
                continue;
            }
            trace!(%line, "S:");

            let is_last = is_last_reply_line(&line);
            lines.push(line);

            if is_last {
                break;
            }
        }

        parse_reply(&lines)
    }

    /// Sends QUIT and closes the connection (available in any state).
    ///
    /// # Errors
    ///
    /// Returns an error if the QUIT command fails.
    pub async fn quit(mut self) -> Result<()> {
        let reply = self.send_command(Command::Quit).await?;

        if !reply.is_success() && reply.code != ReplyCode::CLOSING {
            return Err(reply.into_error());
        }

        Ok(())
    }
}
