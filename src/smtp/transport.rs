//! TCP connection and implicit TLS

use crate::smtp::commands::SmtpStep;
use crate::smtp::error::{MailError, is_timeout_kind};

use rustls::pki_types::ServerName;
use rustls::{ClientConfig, ClientConnection, RootCertStore, StreamOwned};
use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::time::Duration;

/// TLS session over an owned TCP socket
pub type TlsStream = StreamOwned<ClientConnection, TcpStream>;

/// A byte stream the session can talk SMTP over and then release
pub trait Connection: Read + Write {
    /// Shut the connection down. The handle is unusable afterwards even
    /// when an error is returned.
    fn close(&mut self) -> io::Result<()>;
}

impl Connection for TcpStream {
    fn close(&mut self) -> io::Result<()> {
        self.shutdown(Shutdown::Both)
    }
}

impl Connection for TlsStream {
    fn close(&mut self) -> io::Result<()> {
        self.conn.send_close_notify();
        let notified = flush_tls(&mut self.conn, &mut self.sock);
        let shutdown = self.sock.shutdown(Shutdown::Both);
        notified.and(shutdown)
    }
}

fn flush_tls(conn: &mut ClientConnection, sock: &mut TcpStream) -> io::Result<()> {
    while conn.wants_write() {
        conn.write_tls(sock)?;
    }
    sock.flush()
}

/// Client configuration trusting the Mozilla root set
pub fn default_tls_config() -> Arc<ClientConfig> {
    let mut root_store = RootCertStore::empty();
    root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

    Arc::new(
        ClientConfig::builder()
            .with_root_certificates(root_store)
            .with_no_client_auth(),
    )
}

/// Open a TCP connection to `host:port`, trying each resolved address in
/// turn. Every later read and write on the socket is bounded by `timeout`.
///
/// Name resolution goes through the system resolver and is not covered by
/// `timeout`; a stalled resolver blocks for as long as the resolver's own
/// configured timeout.
pub fn connect(host: &str, port: u16, timeout: Duration) -> Result<TcpStream, MailError> {
    let addr = format!("{host}:{port}");
    let resolved = addr.to_socket_addrs().map_err(|e| MailError::Connection {
        addr: addr.clone(),
        reason: e.to_string(),
    })?;

    let mut last_error = None;
    for socket_addr in resolved {
        tracing::debug!("Connecting to {socket_addr}");
        match TcpStream::connect_timeout(&socket_addr, timeout) {
            Ok(stream) => {
                configure(&stream, timeout).map_err(|e| MailError::io(SmtpStep::Connect, e))?;
                return Ok(stream);
            }
            Err(e) => last_error = Some(e),
        }
    }

    Err(match last_error {
        Some(e) if is_timeout_kind(e.kind()) => MailError::io(SmtpStep::Connect, e),
        Some(e) => MailError::Connection {
            addr,
            reason: e.to_string(),
        },
        None => MailError::Connection {
            addr,
            reason: "host did not resolve to any address".to_owned(),
        },
    })
}

fn configure(stream: &TcpStream, timeout: Duration) -> io::Result<()> {
    stream.set_read_timeout(Some(timeout))?;
    stream.set_write_timeout(Some(timeout))?;
    stream.set_nodelay(true)
}

/// Run the TLS handshake to completion before any SMTP traffic, verifying
/// the certificate against `host`.
pub fn handshake(
    mut tcp: TcpStream,
    host: &str,
    tls: Arc<ClientConfig>,
) -> Result<TlsStream, MailError> {
    let addr = tcp
        .peer_addr()
        .map(|a| a.to_string())
        .unwrap_or_else(|_| host.to_owned());

    let server_name = ServerName::try_from(host.to_owned()).map_err(|e| MailError::Connection {
        addr: addr.clone(),
        reason: format!("invalid TLS server name {host:?}: {e}"),
    })?;
    let mut conn = ClientConnection::new(tls, server_name).map_err(|e| MailError::Connection {
        addr: addr.clone(),
        reason: format!("TLS setup failed: {e}"),
    })?;

    while conn.is_handshaking() {
        if let Err(e) = conn.complete_io(&mut tcp) {
            if is_timeout_kind(e.kind()) {
                return Err(MailError::io(SmtpStep::TlsHandshake, e));
            }
            return Err(MailError::Connection {
                addr,
                reason: format!("TLS handshake failed: {e}"),
            });
        }
    }

    tracing::debug!(
        "TLS established with {addr} ({:?})",
        conn.protocol_version()
    );
    Ok(StreamOwned::new(conn, tcp))
}
