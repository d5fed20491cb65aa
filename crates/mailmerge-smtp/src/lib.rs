//! # mailmerge-smtp
//!
//! The SMTP client that `mailmerge` delivers its rendered messages through.
//!
//! One connection is opened per run and reused for every message, so the
//! client is built around a long-lived session rather than a single
//! transaction:
//!
//! - **Type-state setup**: greeting, EHLO, STARTTLS and AUTH are enforced at
//!   compile time before any mail can be sent
//! - **Reusable transactions**: [`Client::send_mail`] runs MAIL/RCPT/DATA and
//!   leaves the connection usable after a rejected recipient or message
//! - **TLS**: implicit TLS (port 465) and STARTTLS, with an opt-out of
//!   certificate verification for self-signed relays
//! - **Authentication**: PLAIN and LOGIN
//!
//! ## Quick Start
//!
//! ```ignore
//! use mailmerge_smtp::connection::{TlsOptions, connect};
//! use mailmerge_smtp::{Address, Client};
//!
//! #[tokio::main]
//! async fn main() -> mailmerge_smtp::Result<()> {
//!     let tls = TlsOptions::default();
//!     let stream = connect("smtp.example.com", 587, None).await?;
//!     let client = Client::from_stream(stream).await?;
//!     let client = client.ehlo("client.example.com").await?;
//!     let client = client.starttls("smtp.example.com", "client.example.com", &tls).await?;
//!     let mut client = client.auth_plain("user@example.com", "password").await?;
//!
//!     let from = Address::new("sender@example.com")?;
//!     let to = vec![Address::new("recipient@example.com")?];
//!     client
//!         .send_mail(&from, &to, b"Subject: Test\r\n\r\nHello!\r\n")
//!         .await?;
//!
//!     client.quit().await
//! }
//! ```
//!
//! ## Connection States
//!
//! ```text
//! ┌──────────────┐
//! │  Connected   │ ─── auth_plain() / auth_login() ───→ Authenticated
//! └──────────────┘
//!   send_mail()                                         send_mail()
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod command;
pub mod connection;
mod error;
pub mod parser;
pub mod types;

pub use connection::{Authenticated, Client, Connected, Ready, ServerInfo, SmtpConnection};
pub use error::{Error, Result};
pub use types::{Address, AuthMechanism, Extension, Mailbox, Reply, ReplyCode};
