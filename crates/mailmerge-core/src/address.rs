//! Recipient list parsing.
//!
//! Spreadsheet cells rarely follow RFC 5322 to the letter, so besides the
//! standard comma separated form, lists separated by `;` or `|` are accepted.

use mailmerge_smtp::Mailbox;
use mailparse::MailAddr;
use thiserror::Error;

/// Alternate separators tried, in order, when standard parsing fails.
const ALTERNATE_SEPARATORS: [char; 2] = [';', '|'];

/// A recipient list that could not be parsed.
#[derive(Debug, Clone, Error)]
#[error("cannot parse address list `{input}`: {reason}")]
pub struct AddressError {
    /// The text as given.
    pub input: String,
    /// Why the first parse attempt failed.
    pub reason: String,
}

/// Parses a free-text recipient list into validated mailboxes.
///
/// Groups are flattened into their members. Empty or blank input yields an
/// empty list.
///
/// # Errors
///
/// Returns the error of the first attempt if neither the text as given nor
/// any separator substitution parses.
pub fn parse_address_list(text: &str) -> Result<Vec<Mailbox>, AddressError> {
    if text.trim().is_empty() {
        return Ok(Vec::new());
    }

    let first = match parse_strict(text) {
        Ok(list) => return Ok(list),
        Err(reason) => reason,
    };

    for sep in ALTERNATE_SEPARATORS {
        if !text.contains(sep) {
            continue;
        }
        let replaced = text.replace(sep, ",");
        if let Ok(list) = parse_strict(&replaced) {
            tracing::trace!(input = text, %sep, "parsed address list with alternate separator");
            return Ok(list);
        }
    }

    Err(AddressError {
        input: text.to_string(),
        reason: first,
    })
}

fn parse_strict(text: &str) -> Result<Vec<Mailbox>, String> {
    let parsed = mailparse::addrparse(text).map_err(|e| e.to_string())?;

    let mut mailboxes = Vec::new();
    for addr in parsed.iter() {
        match addr {
            MailAddr::Single(single) => {
                mailboxes.push(to_mailbox(single.display_name.as_deref(), &single.addr)?);
            }
            MailAddr::Group(group) => {
                for single in &group.addrs {
                    mailboxes.push(to_mailbox(single.display_name.as_deref(), &single.addr)?);
                }
            }
        }
    }

    if mailboxes.is_empty() {
        return Err("no address found".to_string());
    }
    Ok(mailboxes)
}

fn to_mailbox(name: Option<&str>, addr: &str) -> Result<Mailbox, String> {
    let addr = addr.trim();
    match name {
        Some(name) => Mailbox::with_name(name.trim(), addr),
        None => Mailbox::new(addr),
    }
    .map_err(|e| e.to_string())
}
