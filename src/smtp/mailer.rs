//! Mailer configuration and the one-shot send operation

use crate::smtp::email::OutboundMessage;
use crate::smtp::error::MailError;
use crate::smtp::session::SmtpSession;
use crate::smtp::transport;

use rustls::ClientConfig;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Connection settings for the submission server
#[derive(Clone, PartialEq, Eq)]
pub struct MailerConfig {
    /// SMTP server hostname, also used as the TLS verification name
    pub host: String,

    /// Implicit TLS port (default: 465)
    pub port: u16,

    /// Login name, also used as the envelope and header sender
    pub username: String,

    pub password: String,

    /// Bound on connect, TLS handshake and every read or write (default: 10s)
    pub timeout: Duration,

    /// Name announced in EHLO. Defaults to `host`.
    pub ehlo_domain: Option<String>,
}

impl MailerConfig {
    pub const DEFAULT_PORT: u16 = 465;
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

    pub fn new(
        host: impl Into<String>,
        port: u16,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            username: username.into(),
            password: password.into(),
            timeout: Self::DEFAULT_TIMEOUT,
            ehlo_domain: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_ehlo_domain(mut self, domain: impl Into<String>) -> Self {
        self.ehlo_domain = Some(domain.into());
        self
    }

    /// Read `SMTP_HOST`, `SMTP_PORT`, `SMTP_USERNAME`, `SMTP_PASSWORD`,
    /// `SMTP_TIMEOUT_SECS` and `SMTP_EHLO_DOMAIN` from the process environment.
    pub fn from_env() -> Result<Self, MailError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from any key/value source.
    ///
    /// Missing host or credentials are not an error here; they are reported
    /// by [`MailerConfig::validate`] when a send is attempted. A port or
    /// timeout that does not parse is.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, MailError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_owned())
                .filter(|v| !v.is_empty())
        };

        let port = match get("SMTP_PORT") {
            Some(port) => port.parse().map_err(|e| MailError::InvalidSetting {
                name: "SMTP_PORT",
                reason: format!("{port:?}: {e}"),
            })?,
            None => Self::DEFAULT_PORT,
        };

        let timeout = match get("SMTP_TIMEOUT_SECS") {
            Some(secs) => Duration::from_secs(secs.parse().map_err(|e| {
                MailError::InvalidSetting {
                    name: "SMTP_TIMEOUT_SECS",
                    reason: format!("{secs:?}: {e}"),
                }
            })?),
            None => Self::DEFAULT_TIMEOUT,
        };

        Ok(Self {
            host: get("SMTP_HOST").unwrap_or_default(),
            port,
            username: get("SMTP_USERNAME").unwrap_or_default(),
            password: get("SMTP_PASSWORD").unwrap_or_default(),
            timeout,
            ehlo_domain: get("SMTP_EHLO_DOMAIN"),
        })
    }

    /// Check that a send can be attempted at all
    pub fn validate(&self) -> Result<(), MailError> {
        let missing: Vec<&'static str> = [
            ("host", &self.host),
            ("username", &self.username),
            ("password", &self.password),
        ]
        .into_iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(name, _)| name)
        .collect();

        if !missing.is_empty() {
            return Err(MailError::Configuration { missing });
        }
        if self.port == 0 {
            return Err(MailError::InvalidSetting {
                name: "port",
                reason: "must not be 0".to_owned(),
            });
        }
        if self.timeout.is_zero() {
            return Err(MailError::InvalidSetting {
                name: "timeout",
                reason: "must be greater than zero".to_owned(),
            });
        }
        Ok(())
    }

    pub fn ehlo_domain(&self) -> &str {
        self.ehlo_domain.as_deref().unwrap_or(&self.host)
    }
}

impl fmt::Debug for MailerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MailerConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("timeout", &self.timeout)
            .field("ehlo_domain", &self.ehlo_domain)
            .finish()
    }
}

/// Outcome of a best-effort [`SmtpMailer::notify`]
#[derive(Debug)]
pub enum Delivery {
    Sent,
    /// SMTP is not configured; nothing was attempted
    Skipped,
    Failed(MailError),
}

/// Sends one HTML email per call over implicit TLS.
///
/// Each call opens its own connection and closes it before returning, so a
/// mailer can be cloned and shared between threads freely.
#[derive(Clone)]
pub struct SmtpMailer {
    config: MailerConfig,
    tls: Arc<ClientConfig>,
}

impl SmtpMailer {
    /// Create a mailer that trusts the Mozilla root certificates
    pub fn new(config: MailerConfig) -> Self {
        Self::with_tls_config(config, transport::default_tls_config())
    }

    /// Create a mailer with a custom TLS client configuration, e.g. one that
    /// trusts a private CA
    pub fn with_tls_config(config: MailerConfig, tls: Arc<ClientConfig>) -> Self {
        Self { config, tls }
    }

    pub fn config(&self) -> &MailerConfig {
        &self.config
    }

    /// Send `html_body` to `to`.
    ///
    /// Returns once the server has accepted the message for relay and the
    /// connection is closed. There are no retries.
    pub fn send(&self, to: &str, subject: &str, html_body: &str) -> Result<(), MailError> {
        self.config.validate()?;
        let message = OutboundMessage::new(to, subject, html_body)?;
        self.send_message(&message)
    }

    pub fn send_message(&self, message: &OutboundMessage) -> Result<(), MailError> {
        let config = &self.config;
        config.validate()?;

        let tcp = transport::connect(&config.host, config.port, config.timeout)?;
        let stream = transport::handshake(tcp, &config.host, Arc::clone(&self.tls))?;
        tracing::info!("Connected to {}:{}", config.host, config.port);

        let mut session = SmtpSession::new(stream);
        let result = session.deliver(
            config.ehlo_domain(),
            &config.username,
            &config.password,
            message,
        );
        if let Err(e) = session.close() {
            tracing::debug!("Error closing connection to {}: {e}", config.host);
        }

        result
    }

    /// Send without failing the caller: errors are logged and returned as
    /// a [`Delivery`] value.
    pub fn notify(&self, to: &str, subject: &str, html_body: &str) -> Delivery {
        match self.send(to, subject, html_body) {
            Ok(()) => Delivery::Sent,
            Err(e) if e.is_skipped() => {
                tracing::info!("Email to {to} skipped: {e}");
                Delivery::Skipped
            }
            Err(e) => {
                tracing::warn!("Email to {to} failed: {e}");
                Delivery::Failed(e)
            }
        }
    }
}

impl fmt::Debug for SmtpMailer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SmtpMailer")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
