//! Error types for the SMTP client

use crate::smtp::commands::SmtpStep;
use crate::smtp::response::SmtpReply;

use std::io;
use thiserror::Error;

/// Everything that can go wrong while sending one message
#[derive(Error, Debug)]
pub enum MailError {
    /// Host, username or password is missing. Callers usually treat this
    /// as "notification skipped" rather than a failure.
    #[error("SMTP is not configured (missing {})", .missing.join(", "))]
    Configuration { missing: Vec<&'static str> },

    #[error("Invalid SMTP setting {name}: {reason}")]
    InvalidSetting { name: &'static str, reason: String },

    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    /// TCP connect or TLS handshake failed
    #[error("Could not connect to {addr}: {reason}")]
    Connection { addr: String, reason: String },

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Read or write failed mid-session, including timeouts
    #[error("I/O error during {step}: {source}")]
    Io {
        step: SmtpStep,
        #[source]
        source: io::Error,
    },
}

impl MailError {
    /// True when the mailer declined to send because it is not configured
    pub fn is_skipped(&self) -> bool {
        matches!(self, MailError::Configuration { .. })
    }

    /// True when an I/O deadline expired
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            MailError::Io { source, .. } if is_timeout_kind(source.kind())
        )
    }

    /// The server reply attached to this error, if any
    pub fn reply(&self) -> Option<&SmtpReply> {
        match self {
            MailError::Protocol(e) => e.reply(),
            _ => None,
        }
    }

    pub(crate) fn io(step: SmtpStep, source: io::Error) -> Self {
        MailError::Io { step, source }
    }
}

/// A reply from the server that ends the session
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Authentication rejected at {step}: {reply}")]
    AuthenticationRejected { step: SmtpStep, reply: SmtpReply },

    #[error("Recipient {recipient} rejected: {reply}")]
    RecipientRejected { recipient: String, reply: SmtpReply },

    #[error("Server rejected {step}: {reply}")]
    Rejected { step: SmtpStep, reply: SmtpReply },

    #[error("Malformed reply during {step}: {line:?}")]
    MalformedReply { step: SmtpStep, line: String },

    #[error("Reply during {step} exceeded {max} bytes")]
    ReplyTooLong { step: SmtpStep, max: usize },
}

impl ProtocolError {
    pub fn reply(&self) -> Option<&SmtpReply> {
        match self {
            ProtocolError::AuthenticationRejected { reply, .. }
            | ProtocolError::RecipientRejected { reply, .. }
            | ProtocolError::Rejected { reply, .. } => Some(reply),
            ProtocolError::MalformedReply { .. } | ProtocolError::ReplyTooLong { .. } => None,
        }
    }

    pub fn step(&self) -> SmtpStep {
        match self {
            ProtocolError::AuthenticationRejected { step, .. }
            | ProtocolError::Rejected { step, .. }
            | ProtocolError::MalformedReply { step, .. }
            | ProtocolError::ReplyTooLong { step, .. } => *step,
            ProtocolError::RecipientRejected { .. } => SmtpStep::RcptTo,
        }
    }
}

pub(crate) fn is_timeout_kind(kind: io::ErrorKind) -> bool {
    matches!(kind, io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock)
}

/// Size limits from RFC 5321 §4.5.3
pub struct SmtpLimits;

impl SmtpLimits {
    /// Maximum length of the local part of an address
    pub const USER_MAX_LENGTH: usize = 64;

    /// Maximum length of a domain name
    pub const DOMAIN_MAX_LENGTH: usize = 255;

    /// Maximum length of a forward-path
    pub const PATH_MAX_LENGTH: usize = 256;

    /// Maximum length of a reply line including CRLF
    pub const REPLY_LINE_MAX_LENGTH: usize = 512;

    /// Upper bound on all lines of one (possibly multi-line) reply
    pub const REPLY_MAX_SIZE: usize = 8 * 1024;
}
