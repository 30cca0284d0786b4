//! SMTP commands sent by the client and the step each one belongs to

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use std::fmt;

/// One round trip of the submission dialogue, in the order they happen
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SmtpStep {
    Connect,
    TlsHandshake,
    Greeting,
    Ehlo,
    AuthLogin,
    AuthUsername,
    AuthPassword,
    MailFrom,
    RcptTo,
    Data,
    MessageBody,
    Quit,
}

/// The reply class a step needs before the dialogue may continue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expect {
    /// 2xx
    Completion,
    /// 3xx
    Intermediate,
}

impl SmtpStep {
    pub fn expected(self) -> Expect {
        match self {
            SmtpStep::AuthLogin | SmtpStep::AuthUsername | SmtpStep::Data => Expect::Intermediate,
            _ => Expect::Completion,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            SmtpStep::Connect => "connect",
            SmtpStep::TlsHandshake => "TLS handshake",
            SmtpStep::Greeting => "greeting",
            SmtpStep::Ehlo => "EHLO",
            SmtpStep::AuthLogin => "AUTH LOGIN",
            SmtpStep::AuthUsername => "AUTH username",
            SmtpStep::AuthPassword => "AUTH password",
            SmtpStep::MailFrom => "MAIL FROM",
            SmtpStep::RcptTo => "RCPT TO",
            SmtpStep::Data => "DATA",
            SmtpStep::MessageBody => "message body",
            SmtpStep::Quit => "QUIT",
        }
    }
}

impl fmt::Display for SmtpStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A single command line written by the client
#[derive(Clone, PartialEq, Eq)]
pub enum SmtpCommand<'a> {
    Ehlo(&'a str),
    AuthLogin,
    /// Base64 credential line answering a 334 prompt
    AuthSecret(&'a str),
    MailFrom(&'a str),
    RcptTo(&'a str),
    Data,
    Quit,
}

impl SmtpCommand<'_> {
    /// Format the command for sending over the wire, CRLF included
    pub fn format(&self) -> String {
        match self {
            SmtpCommand::Ehlo(domain) => format!("EHLO {domain}\r\n"),
            SmtpCommand::AuthLogin => "AUTH LOGIN\r\n".to_owned(),
            SmtpCommand::AuthSecret(secret) => format!("{}\r\n", STANDARD.encode(secret)),
            SmtpCommand::MailFrom(addr) => format!("MAIL FROM:<{addr}>\r\n"),
            SmtpCommand::RcptTo(addr) => format!("RCPT TO:<{addr}>\r\n"),
            SmtpCommand::Data => "DATA\r\n".to_owned(),
            SmtpCommand::Quit => "QUIT\r\n".to_owned(),
        }
    }
}

/// Credentials never show up in logs
impl fmt::Debug for SmtpCommand<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SmtpCommand::AuthSecret(_) => f.write_str("<credentials>"),
            other => f.write_str(other.format().trim_end()),
        }
    }
}
