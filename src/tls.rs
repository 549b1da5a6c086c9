//! Handshake-protected session over a [`ByteChannel`].
//!
//! The session drives a `rustls` client connection by hand: records are
//! pulled from and pushed to the channel with explicit loops, so a channel
//! that moves one byte per call still carries a complete exchange.

use std::io::{self, ErrorKind, Read, Write};
use std::sync::Arc;
use std::time::Duration;

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::CryptoProvider;
use rustls::pki_types::pem::PemObject;
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{ClientConfig, ClientConnection, DigitallySignedStruct, RootCertStore, SignatureScheme};
use tracing::{debug, trace};

use crate::channel::ByteChannel;
use crate::entropy;
use crate::error::TlsError;
use crate::response::RecordRead;

/// Which server certificates the session accepts.
#[derive(Debug, Clone)]
pub enum Trust {
    /// PEM bundle of trust anchors.
    CaPem(Vec<u8>),
    /// Any certificate; handshake signatures are still checked.
    AnyServer,
}

/// Client configuration shared by every cycle.
#[derive(Debug, Clone)]
pub struct TlsContext {
    config: Arc<ClientConfig>,
    server_name: Option<String>,
    entropy_budget: Duration,
}

impl TlsContext {
    pub fn new(trust: &Trust, entropy_budget: Duration) -> Result<Self, TlsError> {
        let provider = Arc::new(rustls::crypto::ring::default_provider());
        let builder = ClientConfig::builder_with_provider(provider.clone())
            .with_safe_default_protocol_versions()
            .map_err(|e| TlsError::ContextInitFailed(e.to_string()))?;

        let config = match trust {
            Trust::CaPem(pem) => {
                let roots = root_store(pem)?;
                builder.with_root_certificates(roots).with_no_client_auth()
            }
            Trust::AnyServer => builder
                .dangerous()
                .with_custom_certificate_verifier(Arc::new(AnyServerCert(provider)))
                .with_no_client_auth(),
        };

        Ok(Self {
            config: Arc::new(config),
            server_name: None,
            entropy_budget,
        })
    }

    /// Verify the server as `name` instead of the endpoint host.
    pub fn with_server_name(mut self, name: Option<String>) -> Self {
        self.server_name = name;
        self
    }

    /// Fresh client state for one connection to `host`.
    pub fn connect(&self, host: &str) -> Result<ClientConnection, TlsError> {
        let name = self.server_name.as_deref().unwrap_or(host);
        let server_name = ServerName::try_from(name.to_string())
            .map_err(|e| TlsError::ContextInitFailed(format!("server name {name:?}: {e}")))?;
        entropy::wait_ready(self.entropy_budget)?;
        ClientConnection::new(self.config.clone(), server_name)
            .map_err(|e| TlsError::ContextInitFailed(e.to_string()))
    }
}

fn root_store(pem: &[u8]) -> Result<RootCertStore, TlsError> {
    let certs = CertificateDer::pem_slice_iter(pem)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| TlsError::ContextInitFailed(format!("bad CA bundle: {e}")))?;
    if certs.is_empty() {
        return Err(TlsError::ContextInitFailed("no CA certificates found".into()));
    }
    let mut roots = RootCertStore::empty();
    for cert in certs {
        roots
            .add(cert)
            .map_err(|e| TlsError::ContextInitFailed(format!("bad CA certificate: {e}")))?;
    }
    Ok(roots)
}

#[derive(Debug)]
struct AnyServerCert(Arc<CryptoProvider>);

impl ServerCertVerifier for AnyServerCert {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls12_signature(
            message,
            cert,
            dss,
            &self.0.signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(
            message,
            cert,
            dss,
            &self.0.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.0.signature_verification_algorithms.supported_schemes()
    }
}

pub struct SecureSession<C: ByteChannel> {
    conn: ClientConnection,
    channel: C,
    established: bool,
}

impl<C: ByteChannel> SecureSession<C> {
    pub fn new(conn: ClientConnection, channel: C) -> Self {
        Self {
            conn,
            channel,
            established: false,
        }
    }

    pub fn is_established(&self) -> bool {
        self.established
    }

    /// Run the full handshake. No application data moves before this
    /// succeeds; after a failure the session stays unusable.
    pub fn establish(&mut self) -> Result<(), TlsError> {
        while self.conn.is_handshaking() {
            self.conn
                .complete_io(&mut self.channel)
                .map_err(TlsError::HandshakeFailed)?;
        }
        self.flush_records().map_err(TlsError::HandshakeFailed)?;
        self.established = true;
        debug!(
            version = ?self.conn.protocol_version(),
            suite = ?self.conn.negotiated_cipher_suite().map(|s| s.suite()),
            "handshake complete"
        );
        Ok(())
    }

    /// Send all of `data`. Returns the full length or an error, never a
    /// partial count.
    pub fn write(&mut self, data: &[u8]) -> Result<usize, TlsError> {
        self.ensure_established(TlsError::WriteFailed)?;
        let mut sent = 0;
        while sent < data.len() {
            let n = self
                .conn
                .writer()
                .write(&data[sent..])
                .map_err(TlsError::WriteFailed)?;
            sent += n;
            self.flush_records().map_err(TlsError::WriteFailed)?;
        }
        trace!(bytes = sent, "session write");
        Ok(sent)
    }

    /// One read: whatever plaintext the next record yields, or 0 once the
    /// peer has closed.
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize, TlsError> {
        self.ensure_established(TlsError::ReadFailed)?;
        loop {
            match self.conn.reader().read(buf) {
                Ok(n) => return Ok(n),
                Err(e) if e.kind() == ErrorKind::WouldBlock => {}
                Err(e) if e.kind() == ErrorKind::UnexpectedEof => {
                    debug!("peer closed without close_notify");
                    return Ok(0);
                }
                Err(e) => return Err(TlsError::ReadFailed(e)),
            }

            let n = self
                .conn
                .read_tls(&mut self.channel)
                .map_err(TlsError::ReadFailed)?;
            trace!(bytes = n, "record bytes in");
            if let Err(e) = self.conn.process_new_packets() {
                // let the peer see our alert
                let _ = self.flush_records();
                return Err(TlsError::ReadFailed(io::Error::new(ErrorKind::InvalidData, e)));
            }
        }
    }

    /// Send close_notify when established, then hand the channel back for
    /// release. Safe on a session that never completed its handshake.
    pub fn shutdown(mut self) -> C {
        if self.established {
            self.conn.send_close_notify();
            if let Err(e) = self.flush_records() {
                debug!(error = %e, "close_notify not delivered");
            }
        }
        self.channel
    }

    fn ensure_established(&self, kind: fn(io::Error) -> TlsError) -> Result<(), TlsError> {
        if self.established {
            Ok(())
        } else {
            Err(kind(io::Error::new(
                ErrorKind::NotConnected,
                "session not established",
            )))
        }
    }

    /// Push every pending record, retrying short channel writes.
    fn flush_records(&mut self) -> io::Result<()> {
        while self.conn.wants_write() {
            match self.conn.write_tls(&mut self.channel) {
                Ok(0) => return Err(ErrorKind::WriteZero.into()),
                Ok(_) => {}
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
        self.channel.flush()
    }
}

impl<C: ByteChannel> RecordRead for SecureSession<C> {
    fn read_record(&mut self, buf: &mut [u8]) -> Result<usize, TlsError> {
        self.read(buf)
    }
}
