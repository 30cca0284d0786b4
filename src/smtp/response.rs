//! SMTP reply parsing

use crate::smtp::commands::{Expect, SmtpStep};
use crate::smtp::error::{MailError, ProtocolError, SmtpLimits};

use std::fmt;
use std::io::{self, BufRead, Read};

/// A complete reply from the server, possibly spanning several lines
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmtpReply {
    /// The three-digit reply code (e.g. 250, 354, 535)
    pub code: u16,
    /// Text of each line with the code and separator removed
    pub lines: Vec<String>,
}

impl SmtpReply {
    pub fn new(code: u16, lines: Vec<String>) -> Self {
        Self { code, lines }
    }

    /// Leading digit of the code
    pub fn class(&self) -> u16 {
        self.code / 100
    }

    /// Check if this is a completion reply (2xx)
    pub fn is_success(&self) -> bool {
        self.class() == 2
    }

    /// Check if this is an intermediate reply (3xx)
    pub fn is_intermediate(&self) -> bool {
        self.class() == 3
    }

    /// Check if this is an error reply (4xx or 5xx)
    pub fn is_error(&self) -> bool {
        matches!(self.class(), 4 | 5)
    }

    pub fn satisfies(&self, expect: Expect) -> bool {
        match expect {
            Expect::Completion => self.is_success(),
            Expect::Intermediate => self.is_intermediate(),
        }
    }

    /// All lines joined with spaces
    pub fn text(&self) -> String {
        self.lines.join(" ")
    }

    /// Read one reply, following `250-` continuation lines until the final
    /// `250 ` line. A line may be at most [`SmtpLimits::REPLY_LINE_MAX_LENGTH`]
    /// bytes and the whole reply at most [`SmtpLimits::REPLY_MAX_SIZE`].
    pub fn read_from<R: BufRead>(reader: &mut R, step: SmtpStep) -> Result<Self, MailError> {
        let mut code = None;
        let mut lines = Vec::new();
        let mut consumed = 0;
        let mut buf = Vec::new();

        loop {
            let remaining = SmtpLimits::REPLY_MAX_SIZE - consumed;
            let limit = remaining.min(SmtpLimits::REPLY_LINE_MAX_LENGTH);
            buf.clear();
            let n = reader
                .by_ref()
                .take(limit as u64)
                .read_until(b'\n', &mut buf)
                .map_err(|e| MailError::io(step, e))?;

            if n == 0 {
                let err = if remaining == 0 {
                    ProtocolError::ReplyTooLong {
                        step,
                        max: SmtpLimits::REPLY_MAX_SIZE,
                    }
                    .into()
                } else {
                    MailError::io(
                        step,
                        io::Error::new(io::ErrorKind::UnexpectedEof, "connection closed by server"),
                    )
                };
                return Err(err);
            }
            consumed += n;

            if buf.last() != Some(&b'\n') {
                if n == limit {
                    let max = if limit == remaining {
                        SmtpLimits::REPLY_MAX_SIZE
                    } else {
                        SmtpLimits::REPLY_LINE_MAX_LENGTH
                    };
                    return Err(ProtocolError::ReplyTooLong { step, max }.into());
                }
                return Err(MailError::io(
                    step,
                    io::Error::new(io::ErrorKind::UnexpectedEof, "connection closed mid-reply"),
                ));
            }

            let line = String::from_utf8_lossy(&buf);
            let line = line.trim_end_matches(['\r', '\n']);
            let (line_code, last, text) = parse_line(line).ok_or_else(|| {
                ProtocolError::MalformedReply {
                    step,
                    line: line.to_owned(),
                }
            })?;

            tracing::debug!("S: {line}");

            match code {
                None => code = Some(line_code),
                Some(first) if first != line_code => {
                    return Err(ProtocolError::MalformedReply {
                        step,
                        line: line.to_owned(),
                    }
                    .into());
                }
                Some(_) => {}
            }
            lines.push(text.to_owned());

            if last {
                let code = code.unwrap_or(line_code);
                return Ok(Self { code, lines });
            }
        }
    }
}

/// Split `250-text` / `250 text` / `250` into (code, is_last, text)
fn parse_line(line: &str) -> Option<(u16, bool, &str)> {
    let bytes = line.as_bytes();
    if bytes.len() < 3 || !bytes[..3].iter().all(u8::is_ascii_digit) {
        return None;
    }
    if !(b'2'..=b'5').contains(&bytes[0]) {
        return None;
    }
    let code = line[..3].parse().ok()?;

    match bytes.get(3) {
        None => Some((code, true, "")),
        Some(b' ') => Some((code, true, &line[4..])),
        Some(b'-') => Some((code, false, &line[4..])),
        Some(_) => None,
    }
}

impl fmt::Display for SmtpReply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code)?;
        let text = self.text();
        if !text.is_empty() {
            write!(f, " {text}")?;
        }
        Ok(())
    }
}
