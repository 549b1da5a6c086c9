use std::io::{self, ErrorKind, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};

use tracing::{debug, trace};

use crate::endpoint::{Endpoint, Timeouts};
use crate::error::ConnectionError;

/// Raw byte transport under the secure session.
///
/// `write` may accept fewer bytes than offered and `read` may return fewer
/// than requested; `read` returning 0 means the peer closed.
pub trait ByteChannel: Read + Write {
    /// Release the transport. Idempotent.
    fn close(&mut self);
}

#[derive(Debug)]
pub struct TcpChannel {
    stream: Option<TcpStream>,
    peer: Option<SocketAddr>,
}

impl TcpChannel {
    /// Resolve `endpoint.host` and connect to the first address that accepts.
    pub fn open(endpoint: &Endpoint, timeouts: &Timeouts) -> Result<Self, ConnectionError> {
        let addrs: Vec<SocketAddr> = (endpoint.host.as_str(), endpoint.port)
            .to_socket_addrs()
            .map_err(|source| ConnectionError::ResolutionFailed {
                host: endpoint.host.clone(),
                source,
            })?
            .collect();
        if addrs.is_empty() {
            return Err(ConnectionError::ResolutionFailed {
                host: endpoint.host.clone(),
                source: io::Error::new(ErrorKind::NotFound, "no addresses"),
            });
        }

        let mut last = None;
        for addr in addrs {
            trace!(%addr, "connecting");
            match TcpStream::connect_timeout(&addr, timeouts.connect) {
                Ok(stream) => {
                    configure(&stream, timeouts).map_err(ConnectionError::ChannelCreateFailed)?;
                    debug!(%addr, "channel open");
                    return Ok(Self {
                        stream: Some(stream),
                        peer: Some(addr),
                    });
                }
                Err(e) if is_create_failure(&e) => {
                    return Err(ConnectionError::ChannelCreateFailed(e));
                }
                Err(e) => {
                    debug!(%addr, error = %e, "connect attempt failed");
                    last = Some(ConnectionError::ConnectFailed {
                        addr: addr.to_string(),
                        source: e,
                    });
                }
            }
        }
        // addrs was non-empty, so at least one attempt recorded a failure
        Err(last.unwrap_or_else(|| ConnectionError::ConnectFailed {
            addr: endpoint.authority(),
            source: io::Error::from(ErrorKind::NotConnected),
        }))
    }

    fn stream(&mut self) -> io::Result<&mut TcpStream> {
        self.stream
            .as_mut()
            .ok_or_else(|| io::Error::new(ErrorKind::NotConnected, "channel closed"))
    }
}

fn configure(stream: &TcpStream, timeouts: &Timeouts) -> io::Result<()> {
    stream.set_read_timeout(Some(timeouts.io))?;
    stream.set_write_timeout(Some(timeouts.io))?;
    stream.set_nodelay(true)
}

/// Errors that come from obtaining the socket itself rather than from the
/// remote side refusing or not answering.
fn is_create_failure(e: &io::Error) -> bool {
    matches!(e.kind(), ErrorKind::OutOfMemory | ErrorKind::Unsupported)
}

impl Read for TcpChannel {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.stream()?.read(buf)
    }
}

impl Write for TcpChannel {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.stream()?.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.stream()?.flush()
    }
}

impl ByteChannel for TcpChannel {
    fn close(&mut self) {
        if let Some(stream) = self.stream.take() {
            // peer may already be gone
            let _ = stream.shutdown(Shutdown::Both);
            debug!(peer = ?self.peer, "channel closed");
        }
    }
}

impl Drop for TcpChannel {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;
    use std::thread;

    #[test]
    fn open_send_receive_close() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = thread::spawn(move || {
            let (mut sock, _) = listener.accept().unwrap();
            let mut buf = [0u8; 4];
            sock.read_exact(&mut buf).unwrap();
            sock.write_all(&buf).unwrap();
        });

        let ep = Endpoint::new("127.0.0.1", port, "/");
        let mut ch = TcpChannel::open(&ep, &Timeouts::default()).unwrap();
        assert_eq!(ch.peer.unwrap().port(), port);
        ch.write_all(b"ping").unwrap();
        let mut echo = [0u8; 4];
        ch.read_exact(&mut echo).unwrap();
        assert_eq!(&echo, b"ping");
        server.join().unwrap();

        ch.close();
        ch.close();
        assert!(ch.write(b"x").is_err());
    }

    #[test]
    fn refused_connect_is_connect_failed() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let ep = Endpoint::new("127.0.0.1", port, "/");
        let err = TcpChannel::open(&ep, &Timeouts::default()).unwrap_err();
        assert!(matches!(err, ConnectionError::ConnectFailed { .. }));
    }

    #[test]
    fn refusals_are_not_create_failures() {
        assert!(is_create_failure(&ErrorKind::OutOfMemory.into()));
        assert!(!is_create_failure(&ErrorKind::PermissionDenied.into()));
        assert!(!is_create_failure(&ErrorKind::ConnectionRefused.into()));
    }

    #[test]
    fn unparsable_host_is_resolution_failed() {
        // rejected before any lookup is attempted
        let ep = Endpoint::new("bad\0host", 80, "/");
        let err = TcpChannel::open(&ep, &Timeouts::default()).unwrap_err();
        assert!(matches!(err, ConnectionError::ResolutionFailed { .. }));
    }
}
