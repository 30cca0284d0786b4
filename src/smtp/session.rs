//! SMTP client session: the ordered submission dialogue

use crate::smtp::commands::{SmtpCommand, SmtpStep};
use crate::smtp::email::OutboundMessage;
use crate::smtp::error::{MailError, ProtocolError};
use crate::smtp::response::SmtpReply;
use crate::smtp::transport::Connection;

use std::io::{self, BufReader};

/// How far the dialogue has progressed
#[derive(Debug, Clone, PartialEq)]
pub enum SmtpState {
    /// Connected, greeting not read yet
    Connected,
    /// 220 greeting received
    Greeted,
    /// EHLO accepted
    Identified,
    /// AUTH LOGIN accepted, credentials being exchanged
    Authenticating,
    /// 235 received
    Authenticated,
    /// MAIL FROM accepted
    MailReceived,
    /// RCPT TO accepted
    RecipientAccepted,
    /// 354 received, message content being sent
    DataMode,
    /// Message accepted for relay
    Accepted,
    /// QUIT sent
    Finished,
}

/// A single submission over an exclusively owned stream.
///
/// Commands are sent one at a time and every reply is checked before the
/// next command goes out. The session is used for one message and then
/// consumed by [`SmtpSession::close`].
#[derive(Debug)]
pub struct SmtpSession<S: Connection> {
    stream: BufReader<S>,
    state: SmtpState,
    capabilities: Vec<String>,
}

impl<S: Connection> SmtpSession<S> {
    /// Start a session on a freshly connected stream
    pub fn new(stream: S) -> Self {
        Self {
            stream: BufReader::new(stream),
            state: SmtpState::Connected,
            capabilities: Vec::new(),
        }
    }

    pub fn state(&self) -> &SmtpState {
        &self.state
    }

    /// Extension keywords the server advertised in its EHLO reply
    pub fn capabilities(&self) -> &[String] {
        &self.capabilities
    }

    /// Run the whole dialogue: greeting, EHLO, AUTH LOGIN, envelope, DATA.
    ///
    /// `username` is used both for authentication and as the envelope
    /// sender. The first reply outside the expected class stops the
    /// dialogue; nothing further is written in that case. After the
    /// message is accepted QUIT is sent, and its outcome is only logged.
    pub fn deliver(
        &mut self,
        ehlo_domain: &str,
        username: &str,
        password: &str,
        message: &OutboundMessage,
    ) -> Result<(), MailError> {
        self.read_greeting()?;
        self.ehlo(ehlo_domain)?;
        self.authenticate(username, password)?;
        self.mail_from(username)?;
        self.rcpt_to(message.to())?;
        self.data(&message.to_data(username))?;
        self.quit();
        Ok(())
    }

    /// Release the stream. Consumes the session, so this happens once.
    pub fn close(self) -> io::Result<()> {
        self.stream.into_inner().close()
    }

    fn read_greeting(&mut self) -> Result<(), MailError> {
        let reply = SmtpReply::read_from(&mut self.stream, SmtpStep::Greeting)?;
        check(SmtpStep::Greeting, reply)?;
        self.state = SmtpState::Greeted;
        Ok(())
    }

    fn ehlo(&mut self, domain: &str) -> Result<(), MailError> {
        let reply = self.command(SmtpCommand::Ehlo(domain), SmtpStep::Ehlo)?;
        let reply = check(SmtpStep::Ehlo, reply)?;

        // First line is the server's greeting, the rest are extensions
        self.capabilities = reply.lines.into_iter().skip(1).collect();
        self.state = SmtpState::Identified;
        Ok(())
    }

    fn authenticate(&mut self, username: &str, password: &str) -> Result<(), MailError> {
        let reply = self.command(SmtpCommand::AuthLogin, SmtpStep::AuthLogin)?;
        check(SmtpStep::AuthLogin, reply)?;
        self.state = SmtpState::Authenticating;

        let reply = self.command(SmtpCommand::AuthSecret(username), SmtpStep::AuthUsername)?;
        check(SmtpStep::AuthUsername, reply)?;

        let reply = self.command(SmtpCommand::AuthSecret(password), SmtpStep::AuthPassword)?;
        check(SmtpStep::AuthPassword, reply)?;

        tracing::debug!("Authenticated as {username}");
        self.state = SmtpState::Authenticated;
        Ok(())
    }

    fn mail_from(&mut self, from: &str) -> Result<(), MailError> {
        let reply = self.command(SmtpCommand::MailFrom(from), SmtpStep::MailFrom)?;
        check(SmtpStep::MailFrom, reply)?;
        self.state = SmtpState::MailReceived;
        Ok(())
    }

    fn rcpt_to(&mut self, to: &str) -> Result<(), MailError> {
        let reply = self.command(SmtpCommand::RcptTo(to), SmtpStep::RcptTo)?;
        if !reply.is_success() {
            return Err(ProtocolError::RecipientRejected {
                recipient: to.to_owned(),
                reply,
            }
            .into());
        }
        self.state = SmtpState::RecipientAccepted;
        Ok(())
    }

    fn data(&mut self, payload: &str) -> Result<(), MailError> {
        let reply = self.command(SmtpCommand::Data, SmtpStep::Data)?;
        check(SmtpStep::Data, reply)?;
        self.state = SmtpState::DataMode;

        tracing::debug!("C: <{} bytes of message data>", payload.len());
        self.write(SmtpStep::MessageBody, payload.as_bytes())?;
        let reply = SmtpReply::read_from(&mut self.stream, SmtpStep::MessageBody)?;
        let reply = check(SmtpStep::MessageBody, reply)?;

        tracing::info!("Message accepted: {reply}");
        self.state = SmtpState::Accepted;
        Ok(())
    }

    /// The message is already accepted at this point, so a failed QUIT is
    /// not a failed send.
    fn quit(&mut self) {
        match self.command(SmtpCommand::Quit, SmtpStep::Quit) {
            Ok(reply) if reply.is_success() => {}
            Ok(reply) => tracing::warn!("QUIT answered with {reply}"),
            Err(e) => tracing::warn!("QUIT failed: {e}"),
        }
        self.state = SmtpState::Finished;
    }

    /// Write one command and read its reply without judging it
    fn command(&mut self, command: SmtpCommand<'_>, step: SmtpStep) -> Result<SmtpReply, MailError> {
        tracing::debug!("C: {command:?}");
        self.write(step, command.format().as_bytes())?;
        SmtpReply::read_from(&mut self.stream, step)
    }

    fn write(&mut self, step: SmtpStep, bytes: &[u8]) -> Result<(), MailError> {
        let stream = self.stream.get_mut();
        stream
            .write_all(bytes)
            .and_then(|()| stream.flush())
            .map_err(|e| MailError::io(step, e))
    }
}

/// Turn a reply outside the step's expected class into the matching error
fn check(step: SmtpStep, reply: SmtpReply) -> Result<SmtpReply, MailError> {
    if reply.satisfies(step.expected()) {
        return Ok(reply);
    }

    let err = match step {
        SmtpStep::AuthUsername | SmtpStep::AuthPassword => {
            ProtocolError::AuthenticationRejected { step, reply }
        }
        _ => ProtocolError::Rejected { step, reply },
    };
    Err(err.into())
}
