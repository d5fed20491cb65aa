//! Envelope addresses and header mailboxes.

use crate::error::{Error, Result};

/// Email address for the SMTP envelope (`MAIL FROM` / `RCPT TO`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Address(String);

impl Address {
    /// Creates a new address from a string.
    ///
    /// # Errors
    ///
    /// Returns an error if the address is invalid.
    pub fn new(addr: impl Into<String>) -> Result<Self> {
        let addr = addr.into();
        Self::validate(&addr)?;
        Ok(Self(addr))
    }

    /// Returns the address as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the trimmed, lowercased form used for bookkeeping.
    #[must_use]
    pub fn normalized(&self) -> String {
        self.0.trim().to_lowercase()
    }

    fn validate(addr: &str) -> Result<()> {
        let Some((local, domain)) = addr.split_once('@') else {
            return Err(Error::InvalidAddress(format!("{addr:?} must contain @")));
        };

        if local.is_empty() || domain.is_empty() {
            return Err(Error::InvalidAddress(format!(
                "{addr:?} has an empty local or domain part"
            )));
        }

        if domain.contains('@') {
            return Err(Error::InvalidAddress(format!(
                "{addr:?} must have exactly one @"
            )));
        }

        if addr.chars().any(|c| c.is_whitespace() || c.is_control()) {
            return Err(Error::InvalidAddress(format!("{addr:?} contains whitespace")));
        }

        let domain_ok = if domain.starts_with('[') && domain.ends_with(']') {
            true
        } else {
            domain
                .chars()
                .all(|c| c.is_alphanumeric() || c == '-' || c == '.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !domain.contains("..")
        };
        if !domain_ok {
            return Err(Error::InvalidAddress(format!(
                "{addr:?} has an invalid domain"
            )));
        }

        Ok(())
    }
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Mailbox (optional display name + address).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mailbox {
    /// Display name (optional).
    pub name: Option<String>,
    /// Email address.
    pub address: Address,
}

impl Mailbox {
    /// Creates a new mailbox with just an address.
    ///
    /// # Errors
    ///
    /// Returns an error if the address is invalid.
    pub fn new(address: impl Into<String>) -> Result<Self> {
        Ok(Self {
            name: None,
            address: Address::new(address)?,
        })
    }

    /// Creates a new mailbox with a display name and address.
    ///
    /// An empty display name is treated as absent.
    ///
    /// # Errors
    ///
    /// Returns an error if the address is invalid.
    pub fn with_name(name: impl Into<String>, address: impl Into<String>) -> Result<Self> {
        let name = name.into();
        Ok(Self {
            name: (!name.trim().is_empty()).then_some(name),
            address: Address::new(address)?,
        })
    }
}

/// Formats as a header value: `"Jane Doe" <jane@example.com>` or a bare address.
impl std::fmt::Display for Mailbox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.name {
            Some(name) => {
                let escaped = name.replace('\\', "\\\\").replace('"', "\\\"");
                write!(f, "\"{escaped}\" <{}>", self.address)
            }
            None => write!(f, "{}", self.address),
        }
    }
}
