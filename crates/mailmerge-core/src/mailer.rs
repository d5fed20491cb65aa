//! Send orchestration.
//!
//! A run walks the data rows in order. Each row is checked for required
//! fields, rendered, resolved to recipients (minus those already sent to),
//! confirmed, and transmitted over one shared session. Row-level problems
//! are counted and logged; template failures, lost connections, user aborts
//! and cancellation end the run.

use crate::address::parse_address_list;
use crate::config::{Config, DeliveryConfig, MailFormat};
use crate::confirm::Confirmation;
use crate::data::DataSet;
use crate::error::{Error, Result};
use crate::ledger::Ledger;
use crate::row::Row;
use crate::stats::{RunReport, Statistics};
use crate::template::{Executor, Templates};
use crate::transport::{Connector, OutgoingMessage, SmtpConnector, Transport};
use crate::ui::{Action, Ui};
use mailmerge_mime::Attachment;
use mailmerge_smtp::Mailbox;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Drives a mail merge run.
pub struct Mailer<C, E, U> {
    delivery: DeliveryConfig,
    format: MailFormat,
    from: Mailbox,
    /// Set in test mode: every message goes here instead.
    test_recipient: Option<Mailbox>,
    cc: Vec<Mailbox>,
    bcc: Vec<Mailbox>,
    interval: Duration,
    rows: Vec<Row>,
    /// Only present in send mode.
    ledger: Option<Ledger>,
    connector: C,
    executor: E,
    ui: U,
}

impl<U: Ui> Mailer<SmtpConnector, Templates, U> {
    /// Builds a mailer from configuration: loads the data file and
    /// templates and prepares the SMTP connector.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or any input cannot
    /// be loaded.
    pub fn from_config(config: &Config, ui: U) -> Result<Self> {
        config.validate()?;
        let delivery = &config.delivery;

        let format = delivery
            .mail_format
            .ok_or_else(|| Error::Config("mail format not specified".into()))?;
        let templates = Templates::from_files(
            format,
            &delivery.template_name,
            delivery.template_files.as_slice(),
        )?;

        let data = if delivery.data_file.trim().is_empty() {
            DataSet::default()
        } else {
            DataSet::load(&delivery.data_file)?
        };

        let connector = SmtpConnector::new(&config.server, &config.tls)?;
        Self::new(config, data.into_rows(), templates, connector, ui)
    }
}

impl<C: Connector, E: Executor, U: Ui> Mailer<C, E, U> {
    /// Builds a mailer from its parts.
    ///
    /// In send mode the sent ledger is loaded here; in test mode it is never
    /// touched.
    ///
    /// # Errors
    ///
    /// Returns an error if the sender, CC/BCC lists or test address do not
    /// parse, or the sent ledger cannot be read.
    pub fn new(
        config: &Config,
        rows: Vec<Row>,
        executor: E,
        connector: C,
        mut ui: U,
    ) -> Result<Self> {
        let delivery = config.delivery.clone();
        let format = delivery
            .mail_format
            .ok_or_else(|| Error::Config("mail format not specified".into()))?;
        let from = single_mailbox("from", &delivery.from)?;
        let cc = address_list("CC", &delivery.cc_list)?;
        let bcc = address_list("BCC", &delivery.bcc_list)?;

        let (ledger, test_recipient) = if delivery.send_mode {
            if delivery.to_data_field.trim().is_empty() {
                return Err(Error::Config(
                    "destination field (toDataField) not specified".into(),
                ));
            }
            let ledger = Ledger::load(&delivery.sent_file, delivery.resend_path())?;
            if config.verbose {
                log_addresses(&mut ui, "Sent addresses", ledger.sent());
                log_addresses(&mut ui, "Resend addresses", ledger.resend());
            }
            (Some(ledger), None)
        } else {
            let test = single_mailbox("test address", &delivery.test_address)?;
            (None, Some(test))
        };

        let interval = delivery.interval();
        debug!(
            rows = rows.len(),
            send_mode = delivery.send_mode,
            ?interval,
            "mailer ready"
        );

        Ok(Self {
            delivery,
            format,
            from,
            test_recipient,
            cc,
            bcc,
            interval,
            rows,
            ledger,
            connector,
            executor,
            ui,
        })
    }

    /// Rows this mailer will process.
    #[must_use]
    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    /// The UI collaborator.
    #[must_use]
    pub const fn ui(&self) -> &U {
        &self.ui
    }

    /// The sent ledger (send mode only).
    #[must_use]
    pub const fn ledger(&self) -> Option<&Ledger> {
        self.ledger.as_ref()
    }

    /// Runs the merge.
    ///
    /// Statistics are returned even when the run stops early; the session and
    /// the ledger file are closed on every path.
    pub async fn run(&mut self, cancel: &CancellationToken) -> RunReport {
        let mut stats = Statistics::new(self.rows.len());
        let result = self.connect_and_deliver(cancel, &mut stats).await;
        match &result {
            Ok(()) => info!(%stats, "run finished"),
            Err(err) => warn!(error = %err, %stats, "run stopped"),
        }
        RunReport { stats, result }
    }

    async fn connect_and_deliver(
        &mut self,
        cancel: &CancellationToken,
        stats: &mut Statistics,
    ) -> Result<()> {
        let mut transport = self.connector.connect().await.map_err(Error::Connect)?;

        let result = self.deliver_rows(&mut transport, cancel, stats).await;

        if let Some(ledger) = self.ledger.as_mut() {
            ledger.close();
        }
        if let Err(err) = transport.close().await {
            debug!(error = %err, "closing session failed");
        }
        result
    }

    async fn deliver_rows(
        &mut self,
        transport: &mut C::Transport,
        cancel: &CancellationToken,
        stats: &mut Statistics,
    ) -> Result<()> {
        if let Some(ledger) = self.ledger.as_mut() {
            ledger.open_for_append()?;
        }
        let mut confirmation = Confirmation::new(self.delivery.skip_confirm_before_send);

        for index in 0..self.rows.len() {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            let number = index + 1;
            let row = self.rows[index].clone();

            if !row.has_fields(self.delivery.required_fields.as_slice()) {
                stats.skipped += 1;
                debug!(row = number, "required field missing");
                self.ui
                    .log(&format!("[WARN] Skip row {number}: {}", row.to_json()));
                continue;
            }

            let mut body = String::new();
            if let Err(source) = self.executor.execute(&mut body, &row) {
                stats.errors += 1;
                self.ui
                    .log(&format!("[WARN] Row {number}: {}", row.to_json()));
                return Err(Error::Render {
                    row: number,
                    source,
                });
            }

            let action = self
                .deliver(transport, &mut confirmation, &row, number, body, stats)
                .await?;
            if action == Action::AbortSend {
                return Err(Error::Aborted);
            }
        }
        Ok(())
    }

    /// Sends one rendered row.
    ///
    /// Returns `Send` when delivered, `DontSend` when declined or when no
    /// recipient is left, `ContinueOnError` after a row-level failure and
    /// `AbortSend` when the user cancelled.
    async fn deliver(
        &mut self,
        transport: &mut C::Transport,
        confirmation: &mut Confirmation,
        row: &Row,
        number: usize,
        body: String,
        stats: &mut Statistics,
    ) -> Result<Action> {
        let send_mode = self.test_recipient.is_none();
        let (to, destination) = match self.test_recipient.clone() {
            Some(test) => {
                let destination = test.address.to_string();
                (vec![test], destination)
            }
            None => match self.resolve_recipients(row, number, stats) {
                Ok(to) if to.is_empty() => {
                    debug!(row = number, "no recipients left");
                    return Ok(Action::DontSend);
                }
                Ok(to) => {
                    let destination = to
                        .iter()
                        .map(ToString::to_string)
                        .collect::<Vec<_>>()
                        .join(",");
                    (to, destination)
                }
                Err(err) => return self.row_failed(stats, err),
            },
        };

        let attachments = match self.load_attachments(row, number) {
            Ok(attachments) => attachments,
            Err(err) => return self.row_failed(stats, err),
        };

        let message = OutgoingMessage {
            from: self.from.clone(),
            to,
            cc: if send_mode { self.cc.clone() } else { Vec::new() },
            bcc: if send_mode { self.bcc.clone() } else { Vec::new() },
            subject: self.subject(row),
            format: self.format,
            body,
            attachments,
        };

        match confirmation
            .confirm(&mut self.ui, &destination)
            .map_err(Error::Confirm)?
        {
            Action::Send | Action::SendAll => {}
            Action::AbortSend => return Ok(Action::AbortSend),
            Action::DontSend | Action::ContinueOnError => {
                self.ui.log("Skip send by user");
                return Ok(Action::DontSend);
            }
        }

        if !self.interval.is_zero() {
            tokio::time::sleep(self.interval).await;
        }

        if let Err(source) = transport.send(&message).await {
            let err = Error::Send {
                row: number,
                destination,
                source,
            };
            return self.row_failed(stats, err);
        }

        if let Some(ledger) = self.ledger.as_mut() {
            for mailbox in &message.to {
                ledger.record_sent(mailbox.address.as_str())?;
            }
        }
        stats.sent_addresses += message.to.len();
        stats.sent_rows += 1;
        info!(row = number, to = %destination, "sent");
        self.ui.log(&format!("Sent email to: {destination}"));
        Ok(Action::Send)
    }

    /// Recipients of a row, minus those already sent to.
    fn resolve_recipients(
        &mut self,
        row: &Row,
        number: usize,
        stats: &mut Statistics,
    ) -> Result<Vec<Mailbox>> {
        let field = &self.delivery.to_data_field;
        let value = row.string_default(field, "");
        if value.trim().is_empty() {
            return Err(Error::DestinationNotFound {
                row: number,
                field: field.clone(),
            });
        }

        let parsed = parse_address_list(&value).map_err(|source| Error::Destination {
            row: number,
            source,
        })?;

        let mut recipients = Vec::with_capacity(parsed.len());
        let mut seen = Vec::with_capacity(parsed.len());
        for mailbox in parsed {
            let normalized = mailbox.address.normalized();
            if seen.contains(&normalized) {
                debug!(row = number, address = %mailbox.address, "duplicate recipient dropped");
                continue;
            }
            seen.push(normalized);
            let already_sent = self.delivery.skip_if_sent
                && self
                    .ledger
                    .as_ref()
                    .is_some_and(|ledger| ledger.is_already_sent(mailbox.address.as_str()));
            if already_sent {
                stats.already_sent += 1;
                self.ui.log(&format!(
                    "Skipping address: {}, email already sent",
                    mailbox.address
                ));
                continue;
            }
            recipients.push(mailbox);
        }
        Ok(recipients)
    }

    fn load_attachments(&self, row: &Row, number: usize) -> Result<Vec<Attachment>> {
        let mut attachments = Vec::new();
        for field in &self.delivery.attachment_fields {
            let path = row.string_default(field, "");
            let path = path.trim();
            if path.is_empty() {
                continue;
            }
            let attachment = Attachment::from_path(path).map_err(|source| Error::Attachment {
                row: number,
                source,
            })?;
            attachments.push(attachment);
        }
        Ok(attachments)
    }

    fn subject(&self, row: &Row) -> String {
        let field = self.delivery.subject_data_field.trim();
        let subject = if field.is_empty() {
            String::new()
        } else {
            row.string_default(field, "")
        };
        if subject.trim().is_empty() {
            self.delivery.default_subject.clone()
        } else {
            subject
        }
    }

    /// Counts a row failure. Continuable errors are logged and absorbed,
    /// anything else ends the run.
    fn row_failed(&mut self, stats: &mut Statistics, err: Error) -> Result<Action> {
        stats.errors += 1;
        if !err.is_continuable() {
            return Err(err);
        }
        warn!(error = %err, "row failed, continuing");
        self.ui.log(&format!("Error when sending email: {err}"));
        Ok(Action::ContinueOnError)
    }
}

fn address_list(field: &'static str, text: &str) -> Result<Vec<Mailbox>> {
    parse_address_list(text).map_err(|source| Error::AddressList { field, source })
}

fn single_mailbox(field: &'static str, text: &str) -> Result<Mailbox> {
    let mut list = address_list(field, text)?;
    match list.len() {
        0 => Err(Error::Config(format!("{field} not specified"))),
        1 => Ok(list.remove(0)),
        n => Err(Error::Config(format!(
            "{field} must be a single address, got {n}"
        ))),
    }
}

fn log_addresses<U: Ui>(ui: &mut U, title: &str, addresses: &[String]) {
    ui.log(&format!("<<{title}>>"));
    for address in addresses {
        ui.log(&format!("  {address}"));
    }
}
