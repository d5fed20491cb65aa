//! Sent and resend address ledger.
//!
//! The sent file records every address a message was delivered to, one per
//! line. Addresses listed in the resend file are delivered again even when
//! they appear in the sent file. Both lists are held sorted so membership is
//! a binary search.

use crate::error::{Error, Result};
use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Sent/resend bookkeeping for one run.
#[derive(Debug)]
pub struct Ledger {
    path: PathBuf,
    sent: Vec<String>,
    resend: Vec<String>,
    writer: Option<BufWriter<File>>,
}

impl Ledger {
    /// Loads the sent file and, if given, the resend file.
    ///
    /// Missing files are treated as empty. A resend file that cannot be read
    /// is logged and ignored.
    ///
    /// # Errors
    ///
    /// Returns an error if the sent file exists but cannot be read.
    pub fn load(sent_path: impl AsRef<Path>, resend_path: Option<&Path>) -> Result<Self> {
        let path = sent_path.as_ref().to_path_buf();
        let sent = read_addresses(&path).map_err(|source| Error::Ledger {
            path: path.clone(),
            source,
        })?;

        let resend = match resend_path {
            Some(resend_path) => read_addresses(resend_path).unwrap_or_else(|err| {
                warn!(path = %resend_path.display(), error = %err, "reading resend list failed");
                Vec::new()
            }),
            None => Vec::new(),
        };

        debug!(
            sent = sent.len(),
            resend = resend.len(),
            path = %path.display(),
            "ledger loaded"
        );

        Ok(Self {
            path,
            sent,
            resend,
            writer: None,
        })
    }

    /// Returns true if a message to `address` should be skipped.
    ///
    /// Addresses on the resend list are never skipped.
    #[must_use]
    pub fn is_already_sent(&self, address: &str) -> bool {
        let address = normalize(address);
        if self.resend.binary_search(&address).is_ok() {
            return false;
        }
        self.sent.binary_search(&address).is_ok()
    }

    /// Opens the sent file for appending, creating it if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened.
    pub fn open_for_append(&mut self) -> Result<()> {
        if self.writer.is_none() {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.path)
                .map_err(|source| self.error(source))?;
            self.writer = Some(BufWriter::new(file));
        }
        Ok(())
    }

    /// Records a delivered address: appends it to the sent file, flushed
    /// immediately, and to the in-memory list. Addresses already listed are
    /// not written again.
    ///
    /// # Errors
    ///
    /// Returns an error if the line cannot be written.
    pub fn record_sent(&mut self, address: &str) -> Result<()> {
        let address = normalize(address);
        let Err(pos) = self.sent.binary_search(&address) else {
            return Ok(());
        };
        self.open_for_append()?;
        if let Some(writer) = self.writer.as_mut() {
            let written = writeln!(writer, "{address}").and_then(|()| writer.flush());
            if let Err(source) = written {
                return Err(self.error(source));
            }
        }

        self.sent.insert(pos, address);
        Ok(())
    }

    /// Closes the sent file. Later calls to [`Ledger::record_sent`] reopen it.
    pub fn close(&mut self) {
        if let Some(mut writer) = self.writer.take()
            && let Err(err) = writer.flush()
        {
            warn!(path = %self.path.display(), error = %err, "flushing sent ledger failed");
        }
    }

    /// Sent addresses, sorted.
    #[must_use]
    pub fn sent(&self) -> &[String] {
        &self.sent
    }

    /// Resend addresses, sorted.
    #[must_use]
    pub fn resend(&self) -> &[String] {
        &self.resend
    }

    /// Path of the sent file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn error(&self, source: io::Error) -> Error {
        Error::Ledger {
            path: self.path.clone(),
            source,
        }
    }
}

fn normalize(address: &str) -> String {
    address.trim().to_lowercase()
}

fn read_addresses(path: &Path) -> io::Result<Vec<String>> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => return Err(err),
    };

    let mut addresses = Vec::new();
    for line in BufReader::new(file).lines() {
        let line = line?;
        if !line.trim().is_empty() {
            addresses.push(normalize(&line));
        }
    }
    addresses.sort();
    Ok(addresses)
}
