//! # mailmerge-mime
//!
//! MIME message generation for `mailmerge`.
//!
//! ## Features
//!
//! - **Message building**: plain text or HTML bodies, CC recipients, and
//!   file attachments as `multipart/mixed`
//! - **Encoding**: Base64 (line-wrapped), Quoted-Printable and RFC 2047
//!   header encoding
//! - **Header safety**: header values containing CR or LF are rejected
//!
//! ## Quick Start
//!
//! ```ignore
//! use mailmerge_mime::{Attachment, BodyFormat, MessageBuilder};
//!
//! let bytes = MessageBuilder::new()
//!     .from("sender@example.com")
//!     .to("recipient@example.com")
//!     .subject("Invoice")
//!     .body(BodyFormat::Plain, "Please find the invoice attached.")
//!     .attach(Attachment::from_path("invoice.pdf")?)
//!     .build()?;
//! ```
//!
//! BCC recipients never appear in the generated headers; they only exist in
//! the SMTP envelope.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod builder;
mod content_type;
mod error;
mod header;

pub mod encoding;

pub use builder::{Attachment, BodyFormat, HeaderAddress, MessageBuilder};
pub use content_type::ContentType;
pub use error::{Error, Result};
pub use header::Headers;
