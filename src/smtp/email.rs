//! Outbound message construction

use crate::smtp::error::{MailError, SmtpLimits};

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::Utc;

/// One HTML email for one recipient.
///
/// Only [`OutboundMessage::new`] builds one, so every message that reaches
/// the wire has a validated recipient and a single-line subject.
///
/// ```compile_fail
/// let message = mailshot::OutboundMessage {
///     to: "user@example.com>\r\nRCPT TO:<other@example.com".to_owned(),
///     subject: "Hi\r\nBcc: other@example.com".to_owned(),
///     html_body: String::new(),
/// };
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    to: String,
    subject: String,
    html_body: String,
}

impl OutboundMessage {
    /// Create a message, validating the recipient.
    ///
    /// Line breaks in the subject are replaced with spaces so that it cannot
    /// inject extra headers.
    pub fn new(to: &str, subject: &str, html_body: &str) -> Result<Self, MailError> {
        let to = to.trim();
        validate_address(to)?;

        Ok(Self {
            to: to.to_owned(),
            subject: sanitize_header(subject),
            html_body: html_body.to_owned(),
        })
    }

    /// The recipient's email address
    pub fn to(&self) -> &str {
        &self.to
    }

    /// Subject line, stripped of CR and LF
    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// HTML body, sent as-is apart from line ending normalization and dot-stuffing
    pub fn html_body(&self) -> &str {
        &self.html_body
    }

    /// Render the DATA payload: headers, blank line, dot-stuffed body and the
    /// terminating `.` line.
    pub fn to_data(&self, from: &str) -> String {
        let mut data = String::with_capacity(self.html_body.len() + 256);

        data.push_str(&format!("From: {from}\r\n"));
        data.push_str(&format!("To: {}\r\n", self.to));
        data.push_str(&format!("Subject: {}\r\n", encode_header(&self.subject)));
        data.push_str(&format!("Date: {}\r\n", Utc::now().to_rfc2822()));
        data.push_str("MIME-Version: 1.0\r\n");
        data.push_str("Content-Type: text/html; charset=utf-8\r\n");
        data.push_str("\r\n");
        data.push_str(&dot_stuff(&self.html_body));
        data.push_str(".\r\n");

        data
    }
}

/// Reject anything that is obviously not a single mailbox
pub fn validate_address(addr: &str) -> Result<(), MailError> {
    if addr.is_empty() {
        return Err(MailError::InvalidMessage("recipient address is empty".to_owned()));
    }
    if addr.len() > SmtpLimits::PATH_MAX_LENGTH {
        return Err(MailError::InvalidMessage(format!(
            "recipient address too long (max {} characters)",
            SmtpLimits::PATH_MAX_LENGTH
        )));
    }
    if addr
        .chars()
        .any(|c| c.is_whitespace() || c.is_control() || matches!(c, '<' | '>' | ',' | ';'))
    {
        return Err(MailError::InvalidMessage(format!(
            "recipient address contains invalid characters: {addr:?}"
        )));
    }

    let (user, domain) = addr
        .rsplit_once('@')
        .ok_or_else(|| MailError::InvalidMessage(format!("recipient address has no domain: {addr}")))?;

    if user.is_empty() || domain.is_empty() || domain.contains('@') {
        return Err(MailError::InvalidMessage(format!(
            "malformed recipient address: {addr}"
        )));
    }
    if user.len() > SmtpLimits::USER_MAX_LENGTH {
        return Err(MailError::InvalidMessage(format!(
            "user name too long (max {} characters)",
            SmtpLimits::USER_MAX_LENGTH
        )));
    }
    if domain.len() > SmtpLimits::DOMAIN_MAX_LENGTH {
        return Err(MailError::InvalidMessage(format!(
            "domain name too long (max {} characters)",
            SmtpLimits::DOMAIN_MAX_LENGTH
        )));
    }

    Ok(())
}

fn sanitize_header(value: &str) -> String {
    value.replace("\r\n", " ").replace(['\r', '\n'], " ")
}

/// Input bytes per encoded-word. 45 bytes become 60 Base64 characters, so a
/// word stays within the 75 character limit of RFC 2047.
const ENCODED_WORD_BYTES: usize = 45;

/// RFC 2047 encoded-words for non-ASCII header values, folded onto
/// continuation lines. Words never split a character.
fn encode_header(value: &str) -> String {
    if value.is_ascii() {
        return value.to_owned();
    }

    let mut words = Vec::new();
    let mut start = 0;
    for (i, c) in value.char_indices() {
        if i + c.len_utf8() - start > ENCODED_WORD_BYTES {
            words.push(encoded_word(&value[start..i]));
            start = i;
        }
    }
    words.push(encoded_word(&value[start..]));
    words.join("\r\n ")
}

fn encoded_word(chunk: &str) -> String {
    format!("=?UTF-8?B?{}?=", STANDARD.encode(chunk))
}

/// Normalize line endings to CRLF and double any leading dot (RFC 5321 §4.5.2)
fn dot_stuff(body: &str) -> String {
    let mut result = String::with_capacity(body.len() + 64);
    let body = body.strip_suffix('\n').unwrap_or(body);

    for line in body.split('\n') {
        let line = line.strip_suffix('\r').unwrap_or(line);
        if line.starts_with('.') {
            result.push('.');
        }
        result.push_str(line);
        result.push_str("\r\n");
    }
    result
}
