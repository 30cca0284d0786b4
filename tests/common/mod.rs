//! In-process SMTPS relay for integration tests

#![allow(dead_code)]

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use mailshot::{MailerConfig, SmtpMailer};
use rcgen::{
    BasicConstraints, Certificate, CertificateParams, DnType, ExtendedKeyUsagePurpose, IsCa,
};
use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};
use rustls::{ClientConfig, RootCertStore, ServerConfig, ServerConnection, StreamOwned};
use std::io::{BufRead, BufReader, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, mpsc};
use std::thread;
use std::time::Duration;

pub const USERNAME: &str = "bot@example.com";
pub const PASSWORD: &str = "s3cret";

/// What the relay does once a client connects
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RelayMode {
    /// TLS handshake followed by the scripted dialogue
    Normal,
    /// Accept TCP and never answer
    SilentTcp,
    /// Complete the TLS handshake and never send a greeting
    SilentTls,
}

/// Reply the relay gives at each step
#[derive(Debug, Clone)]
pub struct RelayScript {
    pub mode: RelayMode,
    pub greeting: String,
    pub ehlo: String,
    pub auth_login: String,
    pub username: String,
    pub password: String,
    pub mail_from: String,
    pub rcpt_to: String,
    pub data: String,
    pub message: String,
    pub quit: String,
}

impl Default for RelayScript {
    fn default() -> Self {
        Self {
            mode: RelayMode::Normal,
            greeting: "220 relay.test ESMTP ready".to_owned(),
            ehlo: "250-relay.test Hello\r\n250-AUTH LOGIN PLAIN\r\n250 SIZE 10240000".to_owned(),
            auth_login: "334 VXNlcm5hbWU6".to_owned(),
            username: "334 UGFzc3dvcmQ6".to_owned(),
            password: "235 2.7.0 Authentication successful".to_owned(),
            mail_from: "250 2.1.0 OK".to_owned(),
            rcpt_to: "250 2.1.5 OK".to_owned(),
            data: "354 End data with <CR><LF>.<CR><LF>".to_owned(),
            message: "250 2.0.0 Queued".to_owned(),
            quit: "221 2.0.0 Bye".to_owned(),
        }
    }
}

/// What the relay saw on one connection
#[derive(Debug, Default, Clone)]
pub struct Transcript {
    /// Command lines, credentials excluded
    pub commands: Vec<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Message content with dot-stuffing undone, lines joined with `\n`
    pub data: Option<String>,
    /// The client closed the connection after the last reply
    pub client_closed: bool,
}

impl Transcript {
    pub fn count(&self, verb: &str) -> usize {
        self.commands.iter().filter(|c| c.starts_with(verb)).count()
    }

    pub fn saw(&self, verb: &str) -> bool {
        self.count(verb) > 0
    }
}

pub struct TestRelay {
    pub port: u16,
    pub transcripts: mpsc::Receiver<Transcript>,
    pub ca: CertificateDer<'static>,
    accepted: Arc<AtomicUsize>,
}

impl TestRelay {
    pub fn start(script: RelayScript) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let (ca, server_config) = certificates();
        let (tx, rx) = mpsc::channel();
        let accepted = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&accepted);
        thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(stream) = stream else { break };
                counter.fetch_add(1, Ordering::SeqCst);

                let tx = tx.clone();
                let script = script.clone();
                let server_config = Arc::clone(&server_config);
                thread::spawn(move || {
                    let transcript = handle_client(stream, server_config, &script);
                    let _ = tx.send(transcript);
                });
            }
        });

        Self {
            port,
            transcripts: rx,
            ca,
            accepted,
        }
    }

    /// Connections accepted so far
    pub fn accepted(&self) -> usize {
        self.accepted.load(Ordering::SeqCst)
    }

    pub fn config(&self) -> MailerConfig {
        MailerConfig::new("localhost", self.port, USERNAME, PASSWORD)
            .with_timeout(Duration::from_secs(5))
    }

    /// A mailer that trusts this relay's certificate
    pub fn mailer(&self) -> SmtpMailer {
        self.mailer_with(self.config())
    }

    pub fn mailer_with(&self, config: MailerConfig) -> SmtpMailer {
        SmtpMailer::with_tls_config(config, client_tls(&self.ca))
    }

    pub fn next_transcript(&self) -> Transcript {
        self.transcripts
            .recv_timeout(Duration::from_secs(5))
            .expect("relay did not finish a connection")
    }
}

pub fn client_tls(ca: &CertificateDer<'static>) -> Arc<ClientConfig> {
    let mut roots = RootCertStore::empty();
    roots.add(ca.clone()).unwrap();
    Arc::new(
        ClientConfig::builder()
            .with_root_certificates(roots)
            .with_no_client_auth(),
    )
}

/// A throwaway CA and a `localhost` certificate signed by it
fn certificates() -> (CertificateDer<'static>, Arc<ServerConfig>) {
    let mut ca_params = CertificateParams::new(Vec::<String>::new());
    ca_params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
    ca_params
        .distinguished_name
        .push(DnType::CommonName, "mailshot test CA");
    let ca = Certificate::from_params(ca_params).unwrap();

    let mut leaf_params = CertificateParams::new(vec!["localhost".to_owned()]);
    leaf_params
        .distinguished_name
        .push(DnType::CommonName, "localhost");
    leaf_params.extended_key_usages = vec![ExtendedKeyUsagePurpose::ServerAuth];
    let leaf = Certificate::from_params(leaf_params).unwrap();

    let leaf_der = CertificateDer::from(leaf.serialize_der_with_signer(&ca).unwrap());
    let ca_der = CertificateDer::from(ca.serialize_der().unwrap());
    let key = PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(leaf.serialize_private_key_der()));

    let server_config = ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(vec![leaf_der], key)
        .unwrap();

    (ca_der, Arc::new(server_config))
}

fn handle_client(tcp: TcpStream, config: Arc<ServerConfig>, script: &RelayScript) -> Transcript {
    tcp.set_read_timeout(Some(Duration::from_secs(10))).unwrap();
    let mut transcript = Transcript::default();

    match script.mode {
        RelayMode::SilentTcp => {
            transcript.client_closed = wait_for_close(tcp);
        }
        RelayMode::SilentTls => {
            let conn = ServerConnection::new(config).unwrap();
            transcript.client_closed = wait_for_close(StreamOwned::new(conn, tcp));
        }
        RelayMode::Normal => {
            let conn = ServerConnection::new(config).unwrap();
            let mut stream = BufReader::new(StreamOwned::new(conn, tcp));
            let closed = serve(&mut stream, script, &mut transcript);
            transcript.client_closed = closed;
        }
    }

    transcript
}

/// Block until the peer hangs up; false if the read timeout hit first
fn wait_for_close(mut stream: impl Read) -> bool {
    let mut buf = [0u8; 1024];
    loop {
        match stream.read(&mut buf) {
            Ok(0) => return true,
            Ok(_) => continue,
            Err(e) => {
                return !matches!(
                    e.kind(),
                    std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
                );
            }
        }
    }
}

/// Run the scripted dialogue. Returns whether the client closed the
/// connection once it stopped sending commands.
fn serve<S: Read + Write>(
    stream: &mut BufReader<S>,
    script: &RelayScript,
    transcript: &mut Transcript,
) -> bool {
    if reply(stream, &script.greeting).is_err() {
        return false;
    }

    loop {
        let Some(line) = read_line(stream) else {
            return true;
        };
        transcript.commands.push(line.clone());

        let verb = line
            .split_whitespace()
            .next()
            .unwrap_or_default()
            .to_uppercase();

        let result = match verb.as_str() {
            "EHLO" => reply(stream, &script.ehlo),
            "AUTH" => authenticate(stream, script, transcript),
            "MAIL" => reply(stream, &script.mail_from),
            "RCPT" => reply(stream, &script.rcpt_to),
            "DATA" => receive_data(stream, script, transcript),
            "QUIT" => {
                if reply(stream, &script.quit).is_err() {
                    return false;
                }
                return read_line(stream).is_none();
            }
            _ => reply(stream, "500 Syntax error, command unrecognized"),
        };
        if result.is_err() {
            return false;
        }
    }
}

fn authenticate<S: Read + Write>(
    stream: &mut BufReader<S>,
    script: &RelayScript,
    transcript: &mut Transcript,
) -> std::io::Result<()> {
    reply(stream, &script.auth_login)?;
    if !script.auth_login.starts_with('3') {
        return Ok(());
    }

    let Some(username) = read_line(stream) else {
        return Ok(());
    };
    transcript.username = decode(&username);
    reply(stream, &script.username)?;
    if !script.username.starts_with('3') {
        return Ok(());
    }

    let Some(password) = read_line(stream) else {
        return Ok(());
    };
    transcript.password = decode(&password);
    reply(stream, &script.password)
}

fn receive_data<S: Read + Write>(
    stream: &mut BufReader<S>,
    script: &RelayScript,
    transcript: &mut Transcript,
) -> std::io::Result<()> {
    reply(stream, &script.data)?;
    if !script.data.starts_with('3') {
        return Ok(());
    }

    let mut lines = Vec::new();
    loop {
        let Some(line) = read_line(stream) else {
            return Ok(());
        };
        if line == "." {
            break;
        }
        let line = line.strip_prefix('.').map(str::to_owned).unwrap_or(line);
        lines.push(line);
    }
    transcript.data = Some(lines.join("\n"));

    reply(stream, &script.message)
}

fn decode(line: &str) -> Option<String> {
    let bytes = STANDARD.decode(line.trim()).ok()?;
    String::from_utf8(bytes).ok()
}

fn read_line<S: Read>(stream: &mut BufReader<S>) -> Option<String> {
    let mut buf = Vec::new();
    match stream.read_until(b'\n', &mut buf) {
        Ok(0) | Err(_) => None,
        Ok(_) => {
            let line = String::from_utf8_lossy(&buf);
            Some(line.trim_end_matches(['\r', '\n']).to_owned())
        }
    }
}

fn reply<S: Write>(stream: &mut BufReader<S>, response: &str) -> std::io::Result<()> {
    let stream = stream.get_mut();
    stream.write_all(format!("{response}\r\n").as_bytes())?;
    stream.flush()
}
