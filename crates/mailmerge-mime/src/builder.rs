//! Outgoing message assembly.

use crate::content_type::ContentType;
use crate::encoding::{encode_base64_wrapped, encode_quoted_printable, encode_rfc2047};
use crate::error::{Error, Result};
use crate::header::Headers;
use chrono::{DateTime, FixedOffset, Local};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

/// Distinguishes boundaries and message ids generated within one process.
static SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Format of the message body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BodyFormat {
    /// `text/plain`
    #[default]
    Plain,
    /// `text/html`
    Html,
}

impl BodyFormat {
    fn content_type(self) -> ContentType {
        match self {
            Self::Plain => ContentType::text_plain(),
            Self::Html => ContentType::text_html(),
        }
    }
}

/// An address as it appears in From/To/Cc headers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderAddress {
    /// Display name, RFC 2047 encoded on output when not ASCII.
    pub name: Option<String>,
    /// Bare address.
    pub address: String,
}

impl HeaderAddress {
    /// Creates an address with a display name.
    #[must_use]
    pub fn named(name: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            address: address.into(),
        }
    }

    fn render(&self) -> String {
        match self.name.as_deref().filter(|n| !n.trim().is_empty()) {
            Some(name) if name.is_ascii() => {
                let escaped = name.replace('\\', "\\\\").replace('"', "\\\"");
                format!("\"{escaped}\" <{}>", self.address)
            }
            Some(name) => format!("{} <{}>", encode_rfc2047(name, "utf-8"), self.address),
            None => self.address.clone(),
        }
    }
}

impl From<&str> for HeaderAddress {
    fn from(address: &str) -> Self {
        Self {
            name: None,
            address: address.to_string(),
        }
    }
}

impl From<String> for HeaderAddress {
    fn from(address: String) -> Self {
        Self {
            name: None,
            address,
        }
    }
}

/// A file attached to the message.
#[derive(Debug, Clone)]
pub struct Attachment {
    /// File name presented to the recipient.
    pub name: String,
    /// Content type of the data.
    pub content_type: ContentType,
    /// Raw file content.
    pub data: Vec<u8>,
}

impl Attachment {
    /// Creates an attachment from in-memory data.
    #[must_use]
    pub fn new(name: impl Into<String>, content_type: ContentType, data: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            content_type,
            data,
        }
    }

    /// Reads an attachment from disk, naming it after the file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = std::fs::read(path).map_err(|source| Error::Attachment {
            path: PathBuf::from(path),
            source,
        })?;
        let name = path
            .file_name()
            .map_or_else(|| "attachment".to_string(), |n| n.to_string_lossy().into_owned());
        Ok(Self::new(name, ContentType::from_path(path), data))
    }
}

/// Builds RFC 5322 / MIME messages.
#[derive(Debug, Clone, Default)]
pub struct MessageBuilder {
    from: Option<HeaderAddress>,
    to: Vec<HeaderAddress>,
    cc: Vec<HeaderAddress>,
    subject: String,
    format: BodyFormat,
    body: String,
    attachments: Vec<Attachment>,
    date: Option<DateTime<FixedOffset>>,
}

impl MessageBuilder {
    /// Creates an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the sender.
    #[must_use]
    pub fn from(mut self, address: impl Into<HeaderAddress>) -> Self {
        self.from = Some(address.into());
        self
    }

    /// Adds a To recipient.
    #[must_use]
    pub fn to(mut self, address: impl Into<HeaderAddress>) -> Self {
        self.to.push(address.into());
        self
    }

    /// Adds a Cc recipient.
    #[must_use]
    pub fn cc(mut self, address: impl Into<HeaderAddress>) -> Self {
        self.cc.push(address.into());
        self
    }

    /// Sets the subject.
    #[must_use]
    pub fn subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = subject.into();
        self
    }

    /// Sets the body and its format.
    #[must_use]
    pub fn body(mut self, format: BodyFormat, body: impl Into<String>) -> Self {
        self.format = format;
        self.body = body.into();
        self
    }

    /// Adds an attachment.
    #[must_use]
    pub fn attach(mut self, attachment: Attachment) -> Self {
        self.attachments.push(attachment);
        self
    }

    /// Fixes the Date header instead of using the current time.
    #[must_use]
    pub const fn date(mut self, date: DateTime<FixedOffset>) -> Self {
        self.date = Some(date);
        self
    }

    /// Renders the message.
    ///
    /// # Errors
    ///
    /// Returns an error if From or every To recipient is missing, or if a
    /// header value contains a line break.
    pub fn build(self) -> Result<Vec<u8>> {
        let from = self.from.as_ref().ok_or(Error::MissingHeader("From"))?;
        if self.to.is_empty() {
            return Err(Error::MissingHeader("To"));
        }

        let date = self
            .date
            .unwrap_or_else(|| Local::now().fixed_offset());
        let seq = SEQUENCE.fetch_add(1, Ordering::Relaxed);
        let stamp = date.timestamp_nanos_opt().unwrap_or_default();
        let domain = from.address.rsplit_once('@').map_or("localhost", |(_, d)| d);

        let mut headers = Headers::new();
        headers.add("From", from.render())?;
        headers.add("To", join(&self.to))?;
        if !self.cc.is_empty() {
            headers.add("Cc", join(&self.cc))?;
        }
        headers.add("Subject", encode_rfc2047(&self.subject, "utf-8"))?;
        headers.add("Date", date.to_rfc2822())?;
        headers.add("Message-ID", format!("<{stamp:x}.{seq}@{domain}>"))?;
        headers.add("MIME-Version", "1.0")?;

        let mut out = String::new();
        if self.attachments.is_empty() {
            headers.add("Content-Type", self.format.content_type().to_string())?;
            headers.add("Content-Transfer-Encoding", "quoted-printable")?;
            out.push_str(&headers.to_string());
            out.push_str("\r\n");
            out.push_str(&encode_quoted_printable(&self.body));
            return Ok(out.into_bytes());
        }

        let boundary = format!("=_mailmerge_{stamp:x}_{seq}");
        headers.add(
            "Content-Type",
            ContentType::multipart_mixed(&boundary).to_string(),
        )?;
        out.push_str(&headers.to_string());
        out.push_str("\r\nThis is a multi-part message in MIME format.\r\n");

        out.push_str(&format!("\r\n--{boundary}\r\n"));
        out.push_str(&format!(
            "Content-Type: {}\r\nContent-Transfer-Encoding: quoted-printable\r\n\r\n",
            self.format.content_type()
        ));
        out.push_str(&encode_quoted_printable(&self.body));

        for attachment in &self.attachments {
            let name = encode_rfc2047(&attachment.name, "utf-8").replace('"', "'");
            out.push_str(&format!("\r\n--{boundary}\r\n"));
            out.push_str(&format!(
                "Content-Type: {}; name=\"{name}\"\r\n\
                 Content-Transfer-Encoding: base64\r\n\
                 Content-Disposition: attachment; filename=\"{name}\"\r\n\r\n",
                attachment.content_type
            ));
            out.push_str(&encode_base64_wrapped(&attachment.data));
        }
        out.push_str(&format!("\r\n--{boundary}--\r\n"));

        Ok(out.into_bytes())
    }
}

fn join(addresses: &[HeaderAddress]) -> String {
    addresses
        .iter()
        .map(HeaderAddress::render)
        .collect::<Vec<_>>()
        .join(", ")
}
