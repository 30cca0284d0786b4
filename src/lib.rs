//! # mailshot
//!
//! mailshot sends a single HTML email over an implicit-TLS ("SMTPS")
//! connection and tells you exactly how the server answered.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use mailshot::{MailerConfig, SmtpMailer};
//!
//! let config = MailerConfig::new("smtp.example.com", 465, "bot@example.com", "app-password");
//! let mailer = SmtpMailer::new(config);
//!
//! mailer.send("user@example.com", "Task assigned", "<p>You have a new task.</p>")?;
//! # Ok::<(), mailshot::MailError>(())
//! ```
//!
//! Notification code that must never fail because of email can use
//! [`SmtpMailer::notify`] instead, which logs the error and returns a
//! [`Delivery`].
//!
//! ## Dialogue
//!
//! Each send opens one connection and walks through:
//!
//! - TLS handshake, verified against the configured host
//! - `220` greeting
//! - `EHLO`
//! - `AUTH LOGIN` with Base64 username and password
//! - `MAIL FROM` (the username) and `RCPT TO`
//! - `DATA`, the message, and the `.` terminator
//! - `QUIT`
//!
//! Any reply outside the expected class ends the dialogue and the connection
//! is closed. Rejections at authentication and at `RCPT TO` have their own
//! error variants; every protocol error keeps the server's reply text.
//!
//! ## Configuration
//!
//! [`MailerConfig::from_env`] reads:
//!
//! | Variable | Required | Description |
//! |----------|----------|-------------|
//! | `SMTP_HOST` | Yes | Server hostname |
//! | `SMTP_PORT` | No | Port (default: 465) |
//! | `SMTP_USERNAME` | Yes | Login, also used as sender |
//! | `SMTP_PASSWORD` | Yes | Password |
//! | `SMTP_TIMEOUT_SECS` | No | Per-operation timeout (default: 10) |
//! | `SMTP_EHLO_DOMAIN` | No | Name sent with `EHLO` (default: host) |
//!
//! A send with host, username or password missing returns
//! [`MailError::Configuration`] without touching the network.
//!
//! ## Notes
//!
//! - Only implicit TLS is supported; there is no STARTTLS upgrade.
//! - One recipient per message, `text/html` only.
//! - No pooling, queuing or retries.
//! - Server replies are capped at 8 KiB, 512 bytes per line.
//! - The timeout bounds connect, the TLS handshake and every read and
//!   write. DNS lookup of the host happens before that and relies on the
//!   system resolver's own timeout.
//! - The HTML body is sent 8-bit with no `Content-Transfer-Encoding` and no
//!   line wrapping. Keep body lines under 998 bytes (RFC 5321 §4.5.3.1.6);
//!   minified HTML on a single long line may be rejected or mangled by
//!   relays.
//! - Non-ASCII subjects are sent as RFC 2047 encoded-words, folded so each
//!   word stays within 75 characters.

mod smtp;

pub use smtp::{
    Connection, Delivery, MailError, MailerConfig, OutboundMessage, ProtocolError, SmtpCommand,
    SmtpLimits, SmtpMailer, SmtpReply, SmtpSession, SmtpState, SmtpStep, TlsStream,
};
pub use smtp::transport::default_tls_config;
