//! SMTP client implementation

pub mod commands;
pub mod email;
pub mod error;
pub mod mailer;
pub mod response;
pub mod session;
pub mod transport;

pub use commands::{SmtpCommand, SmtpStep};
pub use email::OutboundMessage;
pub use error::{MailError, ProtocolError, SmtpLimits};
pub use mailer::{Delivery, MailerConfig, SmtpMailer};
pub use response::SmtpReply;
pub use session::{SmtpSession, SmtpState};
pub use transport::{Connection, TlsStream};
