//! MIME header handling.

use crate::error::{Error, Result};
use std::fmt;

/// Ordered collection of email headers.
///
/// Headers are written in insertion order; lookups are case-insensitive.
#[derive(Debug, Clone, Default)]
pub struct Headers {
    headers: Vec<(String, String)>,
}

impl Headers {
    /// Creates a new empty header collection.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a header value.
    ///
    /// # Errors
    ///
    /// Returns an error if the name or value would break the header block
    /// (CR/LF in either, or a colon or whitespace in the name).
    pub fn add(&mut self, name: impl Into<String>, value: impl Into<String>) -> Result<()> {
        let name = name.into();
        let value = value.into();
        Self::validate(&name, &value)?;
        self.headers.push((canonical_name(&name), value));
        Ok(())
    }

    /// Sets a header value, replacing any existing values.
    ///
    /// # Errors
    ///
    /// Returns an error under the same conditions as [`Headers::add`].
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) -> Result<()> {
        let name = name.into();
        self.remove(&name);
        self.add(name, value)
    }

    /// Gets the first value for a header.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Removes all values for a header.
    pub fn remove(&mut self, name: &str) {
        self.headers.retain(|(n, _)| !n.eq_ignore_ascii_case(name));
    }

    /// Returns an iterator over all headers.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.headers.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    fn validate(name: &str, value: &str) -> Result<()> {
        if name.is_empty()
            || name
                .chars()
                .any(|c| c == ':' || c.is_whitespace() || c.is_control())
        {
            return Err(Error::InvalidHeader(format!("bad header name {name:?}")));
        }
        if value.contains(['\r', '\n']) {
            return Err(Error::InvalidHeader(format!(
                "line break in value of {name}"
            )));
        }
        Ok(())
    }
}

/// Capitalizes each dash-separated word ("content-type" -> "Content-Type").
fn canonical_name(name: &str) -> String {
    name.split('-')
        .map(|part| {
            let mut chars = part.chars();
            chars.next().map_or_else(String::new, |first| {
                first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase()
            })
        })
        .collect::<Vec<_>>()
        .join("-")
}

/// Writes the header block with CRLF line endings, without the blank
/// separator line.
impl fmt::Display for Headers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (name, value) in &self.headers {
            write!(f, "{name}: {value}\r\n")?;
        }
        Ok(())
    }
}
