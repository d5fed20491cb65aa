//! `mailmerge` - send personalized emails from a template and a data file.
//!
//! Without `--send` every message goes to the configured test address, so a
//! merge can be checked before anyone receives it.

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod console;
mod signal;

use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, bail};
use clap::Parser;
use mailmerge_core::{AuthMethod, Config, Mailer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use console::ConsoleUi;

/// Environment variable consulted for the SMTP password.
const PASSWORD_ENV: &str = "MAILMERGE_PASSWORD";

#[derive(Parser, Debug)]
#[command(name = "mailmerge")]
#[command(about = "Send personalized emails from a template and a data file", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file (JSON, or TOML with a `.toml` extension)
    #[arg(short, long, default_value = "config.json")]
    conf: PathBuf,

    /// Ask before sending each message
    #[arg(long)]
    confirm: bool,

    /// Send to the real recipients instead of the test address
    #[arg(long)]
    send: bool,

    /// Check and print the configuration, then exit without sending
    #[arg(long)]
    testconf: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose {
        "mailmerge=debug,mailmerge_core=debug,mailmerge_smtp=debug"
    } else {
        "warn"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    run(cli).await
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let started = Instant::now();

    let mut config = Config::load(&cli.conf)
        .with_context(|| format!("loading configuration `{}`", cli.conf.display()))?;
    if cli.confirm {
        config.delivery.skip_confirm_before_send = false;
    }
    config.delivery.send_mode |= cli.send;
    config.verbose |= cli.verbose;

    if cli.testconf {
        config.validate().context("invalid configuration")?;
        println!("{}", serde_json::to_string_pretty(&config.masked())?);
        return Ok(());
    }

    let mut console = ConsoleUi::stdio();
    fill_credentials(&mut config, &mut console)?;

    let mut mailer = Mailer::from_config(&config, console).context("preparing the merge")?;
    info!(
        rows = mailer.rows().len(),
        send_mode = config.delivery.send_mode,
        "starting"
    );

    let cancel = signal::shutdown();
    let report = mailer.run(&cancel).await;
    println!("{}", report.stats);
    report.result.context("sending email")?;

    println!("Sending email done, elapsed: {:?}", started.elapsed());
    Ok(())
}

/// Asks for whatever credentials the configuration leaves out.
fn fill_credentials<R: BufRead, W: Write>(
    config: &mut Config,
    console: &mut ConsoleUi<R, W>,
) -> anyhow::Result<()> {
    if config.server.authentication == AuthMethod::None {
        return Ok(());
    }

    if config.server.username.trim().is_empty() {
        let username = console
            .prompt("Username: ")
            .context("reading username")?
            .unwrap_or_default();
        if username.is_empty() {
            bail!("username not specified");
        }
        config.server.username = username;
    }

    if config.server.password.is_empty() {
        config.server.password = match std::env::var(PASSWORD_ENV) {
            Ok(password) if !password.is_empty() => password,
            _ => console
                .prompt("Password: ")
                .context("reading password")?
                .unwrap_or_default(),
        };
    }
    Ok(())
}
