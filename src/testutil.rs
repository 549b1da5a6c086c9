//! Loopback TLS peers and channel fakes shared by the module tests.

use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpListener, TcpStream};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};
use rustls::{ServerConfig, ServerConnection, StreamOwned, SupportedProtocolVersion};

use crate::channel::ByteChannel;

pub type ServerStream = StreamOwned<ServerConnection, TcpStream>;

impl ByteChannel for TcpStream {
    fn close(&mut self) {
        let _ = self.shutdown(Shutdown::Both);
    }
}

pub struct Identity {
    pub ca_pem: Vec<u8>,
    cert: CertificateDer<'static>,
    key_der: Vec<u8>,
}

/// Self-signed certificate for `localhost`, usable as its own trust anchor.
pub fn self_signed() -> Identity {
    let certified = rcgen::generate_simple_self_signed(vec!["localhost".into()]).unwrap();
    Identity {
        ca_pem: certified.cert.pem().into_bytes(),
        cert: certified.cert.der().clone(),
        key_der: certified.key_pair.serialize_der(),
    }
}

pub struct TlsServer<T> {
    pub port: u16,
    pub ca_pem: Vec<u8>,
    handle: JoinHandle<T>,
}

impl<T> TlsServer<T> {
    pub fn join(self) -> T {
        self.handle.join().unwrap()
    }
}

/// Accept one connection on 127.0.0.1, run `handler` over the TLS stream,
/// then send close_notify and drop the socket.
pub fn spawn_tls_server<T, F>(handler: F) -> TlsServer<T>
where
    F: FnOnce(&mut ServerStream) -> T + Send + 'static,
    T: Send + 'static,
{
    spawn_tls_server_with(rustls::DEFAULT_VERSIONS, handler)
}

/// As [`spawn_tls_server`], offering only `versions`.
pub fn spawn_tls_server_with<T, F>(
    versions: &[&'static SupportedProtocolVersion],
    handler: F,
) -> TlsServer<T>
where
    F: FnOnce(&mut ServerStream) -> T + Send + 'static,
    T: Send + 'static,
{
    let id = self_signed();
    let key = PrivateKeyDer::from(PrivatePkcs8KeyDer::from(id.key_der));
    let config = ServerConfig::builder_with_provider(Arc::new(
        rustls::crypto::ring::default_provider(),
    ))
    .with_protocol_versions(versions)
    .unwrap()
    .with_no_client_auth()
    .with_single_cert(vec![id.cert], key)
    .unwrap();
    let config = Arc::new(config);

    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    let handle = thread::spawn(move || {
        let (sock, _) = listener.accept().unwrap();
        let conn = ServerConnection::new(config).unwrap();
        let mut stream = StreamOwned::new(conn, sock);
        let out = handler(&mut stream);
        stream.conn.send_close_notify();
        let _ = stream.flush();
        out
    });

    TlsServer {
        port,
        ca_pem: id.ca_pem,
        handle,
    }
}

/// Read one request: headers up to the blank line, then Content-Length bytes.
pub fn read_request(stream: &mut ServerStream) -> Vec<u8> {
    let mut req = Vec::new();
    let mut byte = [0u8; 1];
    while !req.ends_with(b"\r\n\r\n") {
        stream.read_exact(&mut byte).unwrap();
        req.push(byte[0]);
    }
    let head = String::from_utf8_lossy(&req).to_string();
    let len = head
        .lines()
        .find_map(|l| l.strip_prefix("Content-Length: "))
        .map(|v| v.trim().parse::<usize>().unwrap())
        .unwrap_or(0);
    let mut body = vec![0u8; len];
    stream.read_exact(&mut body).unwrap();
    req.extend_from_slice(&body);
    req
}

/// Channel wrapper whose writes move at most one byte.
pub struct OneByteWrites<C> {
    inner: C,
    pub writes: usize,
}

impl<C> OneByteWrites<C> {
    pub fn new(inner: C) -> Self {
        Self { inner, writes: 0 }
    }
}

impl<C: Read> Read for OneByteWrites<C> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }
}

impl<C: Write> Write for OneByteWrites<C> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        self.writes += 1;
        self.inner.write(&buf[..1])
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

impl<C: ByteChannel> ByteChannel for OneByteWrites<C> {
    fn close(&mut self) {
        self.inner.close();
    }
}
