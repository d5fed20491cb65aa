//! # mailmerge-core
//!
//! Send orchestration for `mailmerge`: one personalized message per data
//! row, delivered over a single SMTP session.
//!
//! - **Data**: CSV rows with header detection ([`DataSet`])
//! - **Templates**: Jinja-style bodies rendered per row ([`Templates`])
//! - **Addresses**: tolerant recipient lists (`,`, `;` or `|`)
//! - **Sent ledger**: recipients already mailed are skipped on re-runs,
//!   unless listed in the resend file ([`Ledger`])
//! - **Confirmation**: per-message Yes/No/All/Cancel gate ([`Confirmation`])
//! - **Delivery**: [`Mailer`] drives the run and reports [`Statistics`]
//!
//! ## Quick Start
//!
//! ```ignore
//! use mailmerge_core::{Config, Mailer};
//! use tokio_util::sync::CancellationToken;
//!
//! let config = Config::load("config.json")?;
//! let mut mailer = Mailer::from_config(&config, my_ui)?;
//! let report = mailer.run(&CancellationToken::new()).await;
//! println!("{}", report.stats);
//! report.result?;
//! ```
//!
//! Test mode (the default) sends every message to `testAddress` and never
//! touches the ledger. Send mode delivers to the addresses in `toDataField`.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod address;
pub mod config;
pub mod confirm;
pub mod data;
mod error;
pub mod ledger;
pub mod mailer;
pub mod row;
pub mod stats;
pub mod template;
pub mod transport;
pub mod ui;

pub use address::{AddressError, parse_address_list};
pub use config::{
    AuthMethod, Config, DeliveryConfig, Encryption, MailFormat, ServerConfig, TlsConfig,
};
pub use confirm::{ConfirmState, Confirmation};
pub use data::DataSet;
pub use error::{Error, Result};
pub use ledger::Ledger;
pub use mailer::Mailer;
pub use row::{Row, Value};
pub use stats::{RunReport, Statistics};
pub use template::{Executor, TemplateError, Templates};
pub use transport::{
    Connector, OutgoingMessage, SmtpConnector, SmtpTransport, Transport, TransportError,
};
pub use ui::{Action, Ui};
