//! Run configuration.
//!
//! Loaded from JSON or TOML (by file extension) on top of defaults. Field
//! names are camelCase in both formats:
//!
//! ```json
//! {
//!   "server": { "host": "smtp.example.com", "port": 587, "encryption": "STARTTLS",
//!               "authentication": "PLAIN", "username": "me@example.com" },
//!   "delivery": { "from": "Me <me@example.com>", "mailFormat": "HTML",
//!                 "templateFiles": ["letter.html"], "dataFile": "people.csv",
//!                 "toDataField": "email", "testAddress": "me@example.com" }
//! }
//! ```

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

/// Interval used when `intervalBetweenSend` is missing or unparsable.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(1);

/// SMTP authentication method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String")]
pub enum AuthMethod {
    /// No authentication.
    #[default]
    #[serde(rename = "NONE")]
    None,
    /// AUTH PLAIN.
    #[serde(rename = "PLAIN")]
    Plain,
    /// AUTH LOGIN.
    #[serde(rename = "LOGIN")]
    Login,
}

impl TryFrom<String> for AuthMethod {
    type Error = String;

    /// Unknown names mean no authentication. CRAM-MD5 is refused rather
    /// than silently sending unauthenticated.
    fn try_from(s: String) -> std::result::Result<Self, Self::Error> {
        match s.trim().to_ascii_uppercase().as_str() {
            "PLAIN" => Ok(Self::Plain),
            "LOGIN" => Ok(Self::Login),
            "CRAM-MD5" => Err("CRAM-MD5 authentication is not supported".to_string()),
            _ => Ok(Self::None),
        }
    }
}

/// Transport encryption.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String")]
pub enum Encryption {
    /// Plain TCP.
    #[default]
    #[serde(rename = "NONE")]
    None,
    /// TLS from the first byte (usually port 465).
    #[serde(rename = "SSL/TLS")]
    Implicit,
    /// Plain TCP upgraded with STARTTLS (usually port 587).
    #[serde(rename = "STARTTLS")]
    StartTls,
}

impl From<String> for Encryption {
    fn from(s: String) -> Self {
        // "SSL" and "TLS" are the legacy spellings of "SSL/TLS" and "STARTTLS".
        match s.trim().to_ascii_uppercase().as_str() {
            "SSL" | "SSL/TLS" => Self::Implicit,
            "TLS" | "STARTTLS" => Self::StartTls,
            _ => Self::None,
        }
    }
}

impl Encryption {
    /// Conventional port for the mode.
    #[must_use]
    pub const fn default_port(self) -> u16 {
        match self {
            Self::None => 25,
            Self::Implicit => 465,
            Self::StartTls => 587,
        }
    }
}

/// Message body format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String")]
pub enum MailFormat {
    /// `text/html`, template output auto-escaped.
    #[serde(rename = "HTML")]
    Html,
    /// `text/plain`.
    #[serde(rename = "PLAIN")]
    Plain,
}

impl TryFrom<String> for MailFormat {
    type Error = String;

    fn try_from(s: String) -> std::result::Result<Self, Self::Error> {
        match s.trim().to_ascii_uppercase().as_str() {
            "HTML" => Ok(Self::Html),
            "PLAIN" | "TEXT" => Ok(Self::Plain),
            _ => Err(format!("unknown mail format: {s}")),
        }
    }
}

/// SMTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerConfig {
    /// Server hostname.
    pub host: String,
    /// Server port; 0 picks the conventional port for the encryption mode.
    pub port: u16,
    /// Username for authentication.
    pub username: String,
    /// Password for authentication.
    pub password: String,
    /// Name sent with EHLO.
    pub helo: String,
    /// Authentication method.
    pub authentication: AuthMethod,
    /// Encryption mode.
    pub encryption: Encryption,
    /// Connect timeout, e.g. `"10s"`. Empty means none.
    pub connect_timeout: String,
    /// Per-message send timeout, e.g. `"1m"`. Empty means none.
    pub send_timeout: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: 0,
            username: String::new(),
            password: String::new(),
            helo: "localhost".to_string(),
            authentication: AuthMethod::default(),
            encryption: Encryption::default(),
            connect_timeout: String::new(),
            send_timeout: String::new(),
        }
    }
}

impl ServerConfig {
    /// Port to connect to.
    #[must_use]
    pub const fn effective_port(&self) -> u16 {
        if self.port == 0 {
            self.encryption.default_port()
        } else {
            self.port
        }
    }

    /// Parsed connect timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the value is not a duration.
    pub fn connect_timeout(&self) -> Result<Option<Duration>> {
        optional_duration("connectTimeout", &self.connect_timeout)
    }

    /// Parsed send timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the value is not a duration.
    pub fn send_timeout(&self) -> Result<Option<Duration>> {
        optional_duration("sendTimeout", &self.send_timeout)
    }
}

/// What to send, to whom, and how.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DeliveryConfig {
    /// Sender, e.g. `"Jane <jane@example.com>"`.
    pub from: String,
    /// CC recipients for every message.
    pub cc_list: String,
    /// BCC recipients for every message.
    pub bcc_list: String,
    /// Body format.
    pub mail_format: Option<MailFormat>,
    /// Template files.
    pub template_files: Vec<PathBuf>,
    /// Template to render; falls back to the first file.
    pub template_name: String,
    /// CSV file with one row per message.
    pub data_file: String,
    /// Column holding the recipients.
    pub to_data_field: String,
    /// Column holding the subject.
    pub subject_data_field: String,
    /// Subject for rows without one.
    pub default_subject: String,
    /// Send without asking for each message.
    pub skip_confirm_before_send: bool,
    /// Where every message goes when not in send mode.
    pub test_address: String,
    /// Deliver to real recipients.
    pub send_mode: bool,
    /// Sent ledger file.
    pub sent_file: PathBuf,
    /// Skip recipients listed in the sent ledger.
    pub skip_if_sent: bool,
    /// Columns that must be non-empty for a row to be sent.
    pub required_fields: Vec<String>,
    /// Pause before each message, e.g. `"1s"`.
    pub interval_between_send: String,
    /// Addresses to send to again even if already sent.
    pub resend_file: Option<PathBuf>,
    /// Columns holding paths of files to attach.
    pub attachment_fields: Vec<String>,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            from: String::new(),
            cc_list: String::new(),
            bcc_list: String::new(),
            mail_format: None,
            template_files: Vec::new(),
            template_name: "mailmerge".to_string(),
            data_file: String::new(),
            to_data_field: String::new(),
            subject_data_field: String::new(),
            default_subject: "Mail from mailmerge".to_string(),
            skip_confirm_before_send: true,
            test_address: String::new(),
            send_mode: false,
            sent_file: PathBuf::from("sentaddr.txt"),
            skip_if_sent: true,
            required_fields: Vec::new(),
            interval_between_send: "1s".to_string(),
            resend_file: None,
            attachment_fields: Vec::new(),
        }
    }
}

impl DeliveryConfig {
    /// Pause between messages; unparsable values fall back to one second.
    #[must_use]
    pub fn interval(&self) -> Duration {
        match parse_duration(&self.interval_between_send) {
            Ok(interval) => interval,
            Err(reason) => {
                warn!(
                    value = %self.interval_between_send,
                    %reason,
                    "invalid intervalBetweenSend, using {DEFAULT_INTERVAL:?}"
                );
                DEFAULT_INTERVAL
            }
        }
    }

    /// Resend file, if one is configured.
    #[must_use]
    pub fn resend_path(&self) -> Option<&Path> {
        self.resend_file
            .as_deref()
            .filter(|p| !p.as_os_str().is_empty())
    }
}

/// TLS settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TlsConfig {
    /// Accept any server certificate.
    pub insecure_skip_verify: bool,
    /// Name to verify the certificate against instead of the host.
    pub server_name: String,
}

/// Complete configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// SMTP server.
    pub server: ServerConfig,
    /// Delivery settings.
    pub delivery: DeliveryConfig,
    /// TLS settings.
    pub tls: TlsConfig,
    /// Log the ledger contents and per-row details.
    pub verbose: bool,
}

impl Config {
    /// Loads a configuration file. `.toml` files are read as TOML, anything
    /// else as JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| Error::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;

        let is_toml = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("toml"));

        let parse_error = |message: String| Error::ConfigParse {
            path: path.to_path_buf(),
            message,
        };
        let (config, raw): (Self, serde_json::Value) = if is_toml {
            let raw = toml::from_str(&text).map_err(|e| parse_error(e.to_string()))?;
            (toml::from_str(&text).map_err(|e| parse_error(e.to_string()))?, raw)
        } else {
            let raw = serde_json::from_str(&text).map_err(|e| parse_error(e.to_string()))?;
            (serde_json::from_str(&text).map_err(|e| parse_error(e.to_string()))?, raw)
        };

        for setting in unknown_settings(&raw) {
            warn!(path = %path.display(), setting = %setting, "ignoring unsupported setting");
        }
        Ok(config)
    }

    /// Checks the settings a run cannot do without.
    ///
    /// # Errors
    ///
    /// Returns the first problem found.
    pub fn validate(&self) -> Result<()> {
        let d = &self.delivery;
        if self.server.host.trim().is_empty() {
            return Err(Error::Config("server host not specified".into()));
        }
        if d.from.trim().is_empty() {
            return Err(Error::Config("sender (from) not specified".into()));
        }
        if d.mail_format.is_none() {
            return Err(Error::Config("mail format not specified".into()));
        }
        if d.template_files.is_empty() {
            return Err(Error::Config("template file(s) not specified".into()));
        }
        if d.send_mode && d.to_data_field.trim().is_empty() {
            return Err(Error::Config(
                "destination field (toDataField) not specified".into(),
            ));
        }
        if !d.send_mode && d.test_address.trim().is_empty() {
            return Err(Error::Config(
                "test address required when not in send mode".into(),
            ));
        }
        self.server.connect_timeout()?;
        self.server.send_timeout()?;
        Ok(())
    }

    /// Copy with credentials hidden, for display.
    #[must_use]
    pub fn masked(&self) -> Self {
        let mut masked = self.clone();
        masked.server.username = "<username>".to_string();
        masked.server.password = "**********".to_string();
        masked
    }
}

/// Dotted names of settings in `raw` that [`Config`] does not read, such as
/// the client certificate options `tls.certFile`, `tls.keyFile` and
/// `tls.clientAuth`.
#[must_use]
pub fn unknown_settings(raw: &serde_json::Value) -> Vec<String> {
    let Ok(known) = serde_json::to_value(Config::default()) else {
        return Vec::new();
    };
    let mut unknown = Vec::new();
    collect_unknown(&known, raw, "", &mut unknown);
    unknown
}

fn collect_unknown(
    known: &serde_json::Value,
    raw: &serde_json::Value,
    prefix: &str,
    unknown: &mut Vec<String>,
) {
    let (Some(known), Some(raw)) = (known.as_object(), raw.as_object()) else {
        return;
    };
    for (key, value) in raw {
        let name = format!("{prefix}{key}");
        match known.get(key) {
            Some(section) if section.is_object() => {
                collect_unknown(section, value, &format!("{name}."), unknown);
            }
            Some(_) => {}
            None => unknown.push(name),
        }
    }
}

fn optional_duration(name: &str, value: &str) -> Result<Option<Duration>> {
    if value.trim().is_empty() {
        return Ok(None);
    }
    parse_duration(value)
        .map(Some)
        .map_err(|reason| Error::Config(format!("parsing {name} `{value}`: {reason}")))
}

/// Parses durations such as `"300ms"`, `"1.5s"` or `"1h2m3s"`.
///
/// Units are `ns`, `us` (or `µs`), `ms`, `s`, `m` and `h`; a bare `"0"` is
/// zero. Negative durations are rejected.
///
/// # Errors
///
/// Returns a description of the problem if the text is not a duration.
pub fn parse_duration(text: &str) -> std::result::Result<Duration, String> {
    let s = text.trim();
    let s = s.strip_prefix('+').unwrap_or(s);
    if s == "0" {
        return Ok(Duration::ZERO);
    }
    if s.is_empty() {
        return Err("empty duration".into());
    }
    if s.starts_with('-') {
        return Err("negative duration".into());
    }

    let is_number = |c: char| c.is_ascii_digit() || c == '.';
    let mut nanos: u128 = 0;
    let mut rest = s;
    while !rest.is_empty() {
        let number_end = rest.find(|c: char| !is_number(c)).unwrap_or(rest.len());
        let number = &rest[..number_end];
        rest = &rest[number_end..];

        let unit_end = rest.find(is_number).unwrap_or(rest.len());
        let scale: u128 = match &rest[..unit_end] {
            "ns" => 1,
            "us" | "µs" | "μs" => 1_000,
            "ms" => 1_000_000,
            "s" => 1_000_000_000,
            "m" => 60_000_000_000,
            "h" => 3_600_000_000_000,
            "" => return Err("missing unit".into()),
            unit => return Err(format!("unknown unit `{unit}`")),
        };
        rest = &rest[unit_end..];

        nanos = nanos
            .checked_add(scaled(number, scale)?)
            .ok_or("duration out of range")?;
    }

    let nanos = u64::try_from(nanos).map_err(|_| "duration out of range".to_string())?;
    Ok(Duration::from_nanos(nanos))
}

/// `number * scale` for a decimal like `"1.5"`, truncated to whole units.
fn scaled(number: &str, scale: u128) -> std::result::Result<u128, String> {
    let invalid = || format!("invalid number `{number}`");
    let (whole, fraction) = number.split_once('.').unwrap_or((number, ""));
    if whole.is_empty() && fraction.is_empty() {
        return Err(invalid());
    }

    let digits = |part: &str| -> std::result::Result<u128, String> {
        if part.is_empty() {
            Ok(0)
        } else {
            part.parse::<u128>().map_err(|_| invalid())
        }
    };

    let mut value = digits(whole)?.checked_mul(scale).ok_or_else(invalid)?;
    // Digits past nanosecond precision carry no weight.
    let fraction = &fraction[..fraction.len().min(18)];
    if !fraction.is_empty() {
        let denominator = 10_u128.pow(u32::try_from(fraction.len()).map_err(|_| invalid())?);
        value = value
            .checked_add(digits(fraction)? * scale / denominator)
            .ok_or_else(invalid)?;
    }
    Ok(value)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("0").unwrap(), Duration::ZERO);
        assert_eq!(parse_duration("10s").unwrap(), Duration::from_secs(10));
        assert_eq!(parse_duration("500ms").unwrap(), Duration::from_millis(500));
        assert_eq!(parse_duration("1m30s").unwrap(), Duration::from_secs(90));
        assert_eq!(parse_duration("1.5h").unwrap(), Duration::from_secs(5400));
        assert_eq!(parse_duration("2us").unwrap(), Duration::from_micros(2));
    }

    #[test]
    fn test_parse_duration_rejects() {
        assert!(parse_duration("").is_err());
        assert!(parse_duration("10").is_err());
        assert!(parse_duration("-1s").is_err());
        assert!(parse_duration("5 minutes").is_err());
        assert!(parse_duration("s").is_err());
    }

    #[test]
    fn test_parse_duration_overflow_is_an_error() {
        assert!(parse_duration("340282366920938463463374607431768211.999us").is_err());
        assert!(parse_duration("99999999999999999999999999999999999999h").is_err());
        assert!(parse_duration("18446744073709551616ns").is_err());
    }

    #[test]
    fn test_defaults() {
        let config: Config = serde_json::from_str("{}").unwrap();
        assert_eq!(config.server.helo, "localhost");
        assert_eq!(config.delivery.default_subject, "Mail from mailmerge");
        assert_eq!(config.delivery.template_name, "mailmerge");
        assert_eq!(config.delivery.sent_file, PathBuf::from("sentaddr.txt"));
        assert!(config.delivery.skip_if_sent);
        assert!(config.delivery.skip_confirm_before_send);
        assert_eq!(config.delivery.interval(), Duration::from_secs(1));
        assert_eq!(config.server.effective_port(), 25);
    }

    #[test]
    fn test_json_fields() {
        let config: Config = serde_json::from_str(
            r#"{
                "server": {"host": "smtp.example.com", "encryption": "ssl/tls",
                           "authentication": "LOGIN", "sendTimeout": "30s"},
                "delivery": {"from": "me@example.com", "mailFormat": "HTML",
                             "ccList": "boss@example.com", "sendMode": true,
                             "intervalBetweenSend": "soon", "resendFile": ""},
                "tls": {"insecureSkipVerify": true},
                "verbose": true
            }"#,
        )
        .unwrap();
        assert_eq!(config.server.encryption, Encryption::Implicit);
        assert_eq!(config.server.effective_port(), 465);
        assert_eq!(config.server.authentication, AuthMethod::Login);
        assert_eq!(
            config.server.send_timeout().unwrap(),
            Some(Duration::from_secs(30))
        );
        assert_eq!(config.delivery.mail_format, Some(MailFormat::Html));
        assert_eq!(config.delivery.cc_list, "boss@example.com");
        assert_eq!(config.delivery.interval(), DEFAULT_INTERVAL);
        assert_eq!(config.delivery.resend_path(), None);
        assert!(config.tls.insecure_skip_verify);
        assert!(config.verbose);
    }

    #[test]
    fn test_unknown_methods_fall_back_to_none() {
        let config: Config = serde_json::from_str(
            r#"{"server": {"encryption": "QUANTUM", "authentication": "XOAUTH2"}}"#,
        )
        .unwrap();
        assert_eq!(config.server.encryption, Encryption::None);
        assert_eq!(config.server.authentication, AuthMethod::None);
        assert_eq!(Encryption::from("TLS".to_string()), Encryption::StartTls);
    }

    #[test]
    fn test_cram_md5_is_refused() {
        let parsed =
            serde_json::from_str::<Config>(r#"{"server": {"authentication": "cram-md5"}}"#);
        assert!(parsed.unwrap_err().to_string().contains("CRAM-MD5"));
    }

    #[test]
    fn test_unknown_settings_are_listed() {
        let raw = serde_json::json!({
            "server": {"host": "smtp.example.com", "proxy": "socks5://localhost"},
            "delivery": {"from": "me@example.com"},
            "tls": {
                "insecureSkipVerify": true,
                "certFile": "client.pem",
                "keyFile": "client.key",
                "clientAuth": "RequireAnyClientCert"
            },
            "verbose": true,
            "theme": "dark"
        });

        let mut unknown = unknown_settings(&raw);
        unknown.sort();
        assert_eq!(
            unknown,
            [
                "server.proxy",
                "theme",
                "tls.certFile",
                "tls.clientAuth",
                "tls.keyFile"
            ]
        );
        assert!(unknown_settings(&serde_json::json!({"server": {"port": 25}})).is_empty());
    }

    #[test]
    fn test_load_accepts_unknown_settings() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "[server]\nhost = \"smtp.example.com\"\n[tls]\ncertFile = \"client.pem\"\n",
        )
        .unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.server.host, "smtp.example.com");
    }

    #[test]
    fn test_unknown_format_is_rejected() {
        let parsed = serde_json::from_str::<Config>(r#"{"delivery": {"mailFormat": "RTF"}}"#);
        assert!(parsed.unwrap_err().to_string().contains("unknown mail format"));
    }

    #[test]
    fn test_load_toml_and_json() {
        let dir = tempfile::tempdir().unwrap();
        let toml_path = dir.path().join("config.toml");
        std::fs::write(
            &toml_path,
            "verbose = true\n[server]\nhost = \"smtp.example.com\"\nport = 2525\n\
             [delivery]\nfrom = \"me@example.com\"\nmailFormat = \"PLAIN\"\n",
        )
        .unwrap();
        let config = Config::load(&toml_path).unwrap();
        assert_eq!(config.server.effective_port(), 2525);
        assert_eq!(config.delivery.mail_format, Some(MailFormat::Plain));

        let json_path = dir.path().join("config.json");
        std::fs::write(&json_path, "{not json").unwrap();
        assert!(matches!(
            Config::load(&json_path),
            Err(Error::ConfigParse { .. })
        ));
        assert!(matches!(
            Config::load(dir.path().join("missing.json")),
            Err(Error::ConfigRead { .. })
        ));
    }

    #[test]
    fn test_validate() {
        let mut config = Config::default();
        assert!(config.validate().is_err());

        config.server.host = "smtp.example.com".into();
        config.delivery.from = "me@example.com".into();
        config.delivery.mail_format = Some(MailFormat::Plain);
        config.delivery.template_files = vec![PathBuf::from("letter.txt")];
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("test address"));

        config.delivery.test_address = "me@example.com".into();
        config.validate().unwrap();

        config.delivery.send_mode = true;
        assert!(config.validate().is_err());
        config.delivery.to_data_field = "email".into();
        config.validate().unwrap();

        config.server.connect_timeout = "forever".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_masked() {
        let mut config = Config::default();
        config.server.password = "hunter2".into();
        let shown = serde_json::to_string(&config.masked()).unwrap();
        assert!(!shown.contains("hunter2"));
        assert!(shown.contains("\"sendMode\":false"));
    }
}
