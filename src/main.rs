use clap::Parser;
use mailshot::{MailError, MailerConfig, SmtpMailer};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// Send one HTML email over SMTPS using the SMTP_* environment settings
#[derive(Parser, Debug)]
#[command(name = "mailshot", version)]
struct Args {
    /// Recipient address
    #[arg(long)]
    to: String,

    /// Subject line
    #[arg(long, short)]
    subject: String,

    /// HTML body
    #[arg(long, conflicts_with = "html_file", required_unless_present = "html_file")]
    html: Option<String>,

    /// Read the HTML body from a file
    #[arg(long)]
    html_file: Option<PathBuf>,
}

fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    match run(&args) {
        Ok(()) => {
            tracing::info!("Sent to {}", args.to);
            ExitCode::SUCCESS
        }
        Err(e) if e.is_skipped() => {
            tracing::warn!("Nothing sent: {e}");
            ExitCode::from(2)
        }
        Err(e) => {
            tracing::error!("Failed to send: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> Result<(), MailError> {
    let body = match (&args.html, &args.html_file) {
        (Some(html), _) => html.clone(),
        (None, Some(path)) => std::fs::read_to_string(path).map_err(|e| {
            MailError::InvalidMessage(format!("cannot read {}: {e}", path.display()))
        })?,
        (None, None) => String::new(),
    };

    let config = MailerConfig::from_env()?;
    tracing::debug!("Using {config:?}");

    SmtpMailer::new(config).send(&args.to, &args.subject, &body)
}
