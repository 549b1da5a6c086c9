use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("cannot resolve {host}: {source}")]
    ResolutionFailed {
        host: String,
        #[source]
        source: io::Error,
    },
    #[error("cannot create channel: {0}")]
    ChannelCreateFailed(#[source] io::Error),
    #[error("connect to {addr} failed: {source}")]
    ConnectFailed {
        addr: String,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, Error)]
pub enum TlsError {
    #[error("tls context init failed: {0}")]
    ContextInitFailed(String),
    #[error("tls handshake failed: {0}")]
    HandshakeFailed(#[source] io::Error),
    #[error("tls write failed: {0}")]
    WriteFailed(#[source] io::Error),
    #[error("tls read failed: {0}")]
    ReadFailed(#[source] io::Error),
}

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("header terminator not found after {consumed} bytes")]
    HeaderTerminatorNotFound { consumed: usize },
    #[error("response ended before any body byte")]
    ResponseTruncated,
}

#[derive(Debug, Error)]
#[error("cannot allocate {requested} bytes")]
pub struct AllocationError {
    pub requested: usize,
}

/// Failure of one request/response exchange. Terminal for the cycle.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Connection(#[from] ConnectionError),
    #[error(transparent)]
    Tls(#[from] TlsError),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error(transparent)]
    Allocation(#[from] AllocationError),
}

/// Reserve exactly `len` bytes, reporting failure instead of aborting.
pub fn try_buffer(len: usize) -> Result<Vec<u8>, AllocationError> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(len)
        .map_err(|_| AllocationError { requested: len })?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_error_keeps_kind() {
        let err: ClientError = ProtocolError::HeaderTerminatorNotFound { consumed: 7 }.into();
        assert!(matches!(
            err,
            ClientError::Protocol(ProtocolError::HeaderTerminatorNotFound { consumed: 7 })
        ));
        assert_eq!(err.to_string(), "header terminator not found after 7 bytes");
    }

    #[test]
    fn oversized_buffer_is_reported() {
        let err = try_buffer(usize::MAX).unwrap_err();
        assert_eq!(err.requested, usize::MAX);
        assert_eq!(try_buffer(64).unwrap().capacity(), 64);
    }
}
