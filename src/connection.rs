//! IMAP connection and TLS helpers
//!
//! Provides `connect()`, which dials the server according to the
//! configured [`Security`], and [`ImapConnection`], the authenticated
//! session the pool keeps per user.

use crate::config::{ImapConfig, Security};
use crate::error::{Error, Result};
use crate::pool::Connection;
use async_imap::error::Error as ImapError;
use async_imap::imap_proto::{Response, Status};
use async_imap::types::UnsolicitedResponse;
use async_imap::{Client, Session};
use rustls::pki_types::ServerName;
use std::fmt;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tokio_util::compat::{Compat, TokioAsyncReadCompatExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Any byte stream an IMAP session can run over.
pub trait ImapStream: AsyncRead + AsyncWrite + Unpin + Send + fmt::Debug {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send + fmt::Debug> ImapStream for T {}

/// A connected but not yet authenticated client.
pub type ImapClient = Client<Compat<Box<dyn ImapStream>>>;

/// An authenticated IMAP session over plaintext or TLS.
pub type ImapSession = Session<Compat<Box<dyn ImapStream>>>;

fn tls_connector(config: &ImapConfig) -> Result<TlsConnector> {
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let builder = rustls::ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(|e| Error::Tls(format!("Unsupported TLS configuration: {e}")))?;

    let tls_config = if config.accept_invalid_certs {
        builder
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(DangerousVerifier))
            .with_no_client_auth()
    } else {
        let roots = rustls::RootCertStore {
            roots: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
        };
        builder.with_root_certificates(roots).with_no_client_auth()
    };
    Ok(TlsConnector::from(Arc::new(tls_config)))
}

async fn tls_handshake(
    config: &ImapConfig,
    tcp_stream: TcpStream,
) -> Result<tokio_rustls::client::TlsStream<TcpStream>> {
    let server_name = ServerName::try_from(config.host.clone())
        .map_err(|e| Error::Tls(format!("Invalid server name: {e}")))?;

    tls_connector(config)?
        .connect(server_name, tcp_stream)
        .await
        .map_err(|e| Error::Tls(e.to_string()))
}

/// Dial the IMAP server.
///
/// With [`Security::Tls`] the TLS handshake happens right after the TCP
/// connect. With [`Security::StartTls`] the client issues STARTTLS on the
/// plaintext stream first. [`Security::Insecure`] stays in plaintext.
///
/// # Errors
///
/// Returns an error if the TCP connect, STARTTLS, or TLS handshake fails.
/// The socket is closed on every failure path.
pub async fn connect(config: &ImapConfig) -> Result<ImapClient> {
    let addr = config.address();
    debug!("Connecting to IMAP server at {} ({:?})", addr, config.security);

    let tcp_stream = TcpStream::connect(&addr)
        .await
        .map_err(|e| Error::Imap(format!("Failed to connect to IMAP server {addr}: {e}")))?;

    let stream: Box<dyn ImapStream> = match config.security {
        Security::Tls => Box::new(tls_handshake(config, tcp_stream).await?),
        Security::StartTls => {
            let mut client = Client::new(tcp_stream.compat());
            client
                .run_command_and_check_ok("STARTTLS", None)
                .await
                .map_err(|e| Error::Tls(format!("STARTTLS failed: {e}")))?;

            let inner = client.into_inner().into_inner();
            Box::new(tls_handshake(config, inner).await?)
        }
        Security::Insecure => {
            warn!("Connecting to {} without TLS", addr);
            Box::new(tcp_stream)
        }
    };

    Ok(Client::new(stream.compat()))
}

/// The mailbox currently selected on a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Selected {
    name: String,
    exists: u32,
}

/// An authenticated session to the mail server, owned by one user.
pub struct ImapConnection {
    session: ImapSession,
    selected: Option<Selected>,
    logged_out: CancellationToken,
}

impl ImapConnection {
    /// Authenticate on a freshly dialed client.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Imap`] if the server rejects the credentials. The
    /// unauthenticated client is dropped.
    pub async fn login(client: ImapClient, username: &str, password: &str) -> Result<Self> {
        let session = client
            .login(username, password)
            .await
            .map_err(|(e, _)| Error::Imap(format!("Login failed: {e}")))?;

        info!("Logged in to IMAP server as {}", username);
        Ok(Self::from_session(session))
    }

    #[must_use]
    pub fn from_session(session: ImapSession) -> Self {
        Self {
            session,
            selected: None,
            logged_out: CancellationToken::new(),
        }
    }

    /// The underlying protocol session.
    pub const fn session(&mut self) -> &mut ImapSession {
        &mut self.session
    }

    /// Name of the selected mailbox, if any.
    #[must_use]
    pub fn selected_mailbox(&self) -> Option<&str> {
        self.selected.as_ref().map(|s| s.name.as_str())
    }

    /// Number of messages in the selected mailbox, counting the
    /// EXISTS/EXPUNGE updates the server has pushed since.
    pub fn message_count(&mut self) -> Option<u32> {
        self.apply_unsolicited();
        self.selected.as_ref().map(|s| s.exists)
    }

    /// SELECT `name` unless it already is the selected mailbox.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Imap`] if the SELECT fails; the connection is then
    /// considered to have no mailbox selected.
    pub async fn ensure_selected(&mut self, name: &str) -> Result<()> {
        if self.selected_mailbox() == Some(name) {
            return Ok(());
        }

        // Updates queued for the previous mailbox no longer apply.
        self.selected = None;
        self.apply_unsolicited();

        let result = self.session.select(name).await;
        let mailbox = self.check(result, &format!("Failed to select {name}"))?;

        debug!("Selected {} ({} messages)", name, mailbox.exists);
        self.selected = Some(Selected {
            name: name.to_string(),
            exists: mailbox.exists,
        });
        Ok(())
    }

    /// Whether the server has gone away (BYE, I/O error, EOF) or the
    /// session was logged out.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.logged_out.is_cancelled()
    }

    /// Map the outcome of a protocol command into this crate's errors.
    ///
    /// A failure that means the server is gone fires the logout signal, so
    /// the pool forgets the session. A command that "succeeded" while the
    /// server said BYE is reported as failed, since its results may be cut
    /// short.
    pub(crate) fn check<T>(
        &mut self,
        result: async_imap::error::Result<T>,
        context: &str,
    ) -> Result<T> {
        self.apply_unsolicited();
        match result {
            Err(e) => {
                if matches!(e, ImapError::Io(_) | ImapError::ConnectionLost) {
                    self.connection_lost(&e);
                }
                Err(Error::Imap(format!("{context}: {e}")))
            }
            Ok(_) if self.is_closed() => Err(Error::Imap(format!(
                "{context}: connection closed by server"
            ))),
            Ok(value) => Ok(value),
        }
    }

    /// Drop the selection and fire the logout signal without talking to
    /// the server again.
    pub(crate) fn connection_lost(&mut self, reason: &dyn fmt::Display) {
        if !self.is_closed() {
            warn!("IMAP connection lost: {}", reason);
        }
        self.selected = None;
        self.logged_out.cancel();
    }

    /// Apply an EXISTS or EXPUNGE the server sent alongside a command.
    pub(crate) fn apply_update(&mut self, update: &UnsolicitedResponse) {
        let Some(selected) = self.selected.as_mut() else {
            return;
        };
        match update {
            UnsolicitedResponse::Exists(n) => selected.exists = *n,
            UnsolicitedResponse::Expunge(_) => {
                selected.exists = selected.exists.saturating_sub(1);
            }
            _ => {}
        }
    }

    fn apply_unsolicited(&mut self) {
        while let Ok(response) = self.session.unsolicited_responses.try_recv() {
            if let UnsolicitedResponse::Other(data) = &response {
                if is_bye(data.parsed()) {
                    self.connection_lost(&"server said BYE");
                }
                continue;
            }
            self.apply_update(&response);
        }
    }
}

/// Whether a response is the server's untagged BYE.
pub(crate) const fn is_bye(response: &Response<'_>) -> bool {
    matches!(
        response,
        Response::Data {
            status: Status::Bye,
            ..
        }
    )
}

impl Connection for ImapConnection {
    fn logout_signal(&self) -> CancellationToken {
        self.logged_out.clone()
    }

    async fn logout(&mut self) {
        if let Err(e) = self.session.logout().await {
            warn!("LOGOUT failed: {}", e);
        }
        self.selected = None;
        self.logged_out.cancel();
    }
}

/// Certificate verifier that accepts all certificates
/// (self-signed bridges and test servers).
#[derive(Debug)]
struct DangerousVerifier;

impl rustls::client::danger::ServerCertVerifier for DangerousVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &rustls::pki_types::CertificateDer<'_>,
        _intermediates: &[rustls::pki_types::CertificateDer<'_>],
        _server_name: &rustls::pki_types::ServerName<'_>,
        _ocsp_response: &[u8],
        _now: rustls::pki_types::UnixTime,
    ) -> std::result::Result<rustls::client::danger::ServerCertVerified, rustls::Error> {
        Ok(rustls::client::danger::ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> std::result::Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> std::result::Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        rustls::crypto::ring::default_provider()
            .signature_verification_algorithms
            .supported_schemes()
    }
}
