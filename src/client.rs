use std::fmt;

use tracing::{debug, trace};

use crate::channel::{ByteChannel, TcpChannel};
use crate::endpoint::{Endpoint, Timeouts};
use crate::error::{ClientError, ProtocolError, try_buffer};
use crate::request::Request;
use crate::response::ResponseReader;
use crate::tls::{SecureSession, TlsContext};

/// Where an exchange is. Every failure goes straight to `Closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Idle,
    Connecting,
    Handshaking,
    Sending,
    Receiving,
    Closed,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::Idle => "idle",
            Stage::Connecting => "connecting",
            Stage::Handshaking => "handshaking",
            Stage::Sending => "sending",
            Stage::Receiving => "receiving",
            Stage::Closed => "closed",
        };
        f.write_str(s)
    }
}

/// One POST per call, one connection per POST. Nothing is retried here.
#[derive(Debug, Clone)]
pub struct SecureRequestClient {
    tls: TlsContext,
    timeouts: Timeouts,
}

impl SecureRequestClient {
    pub fn new(tls: TlsContext, timeouts: Timeouts) -> Self {
        Self { tls, timeouts }
    }

    /// Send `body` to `endpoint` and return at most `capacity` body bytes of
    /// the reply. Channel and session are released on every path.
    pub fn post(
        &self,
        endpoint: &Endpoint,
        body: &[u8],
        capacity: usize,
    ) -> Result<Vec<u8>, ClientError> {
        // buffers first, no I/O if they cannot be had
        let request = Request::build(endpoint, body)?;
        trace!(
            header_len = request.header_len(),
            body_len = request.body_len(),
            headers = ?request.headers(),
            "request built"
        );
        let mut reply = try_buffer(capacity)?;
        reply.resize(capacity, 0);

        let mut stage = Stage::Idle;
        let result = self.exchange(endpoint, &request, &mut reply, &mut stage);
        if let Err(e) = &result {
            debug!(%stage, error = %e, "exchange failed");
        }
        trace!(from = %stage, to = %Stage::Closed, "stage");

        let n = result?;
        reply.truncate(n);
        Ok(reply)
    }

    fn exchange(
        &self,
        endpoint: &Endpoint,
        request: &Request,
        reply: &mut [u8],
        stage: &mut Stage,
    ) -> Result<usize, ClientError> {
        advance(stage, Stage::Connecting);
        let mut channel = TcpChannel::open(endpoint, &self.timeouts)?;

        advance(stage, Stage::Handshaking);
        let conn = match self.tls.connect(&endpoint.host) {
            Ok(conn) => conn,
            Err(e) => {
                channel.close();
                return Err(e.into());
            }
        };
        let mut session = SecureSession::new(conn, channel);
        let result = converse(&mut session, request, reply, stage);
        if result.is_err() && !session.is_established() {
            debug!("session released before handshake completed");
        }

        let mut channel = session.shutdown();
        channel.close();
        result
    }
}

/// Handshake, send, receive over an open session.
fn converse<C: ByteChannel>(
    session: &mut SecureSession<C>,
    request: &Request,
    reply: &mut [u8],
    stage: &mut Stage,
) -> Result<usize, ClientError> {
    session.establish()?;

    advance(stage, Stage::Sending);
    session.write(request.as_bytes())?;

    advance(stage, Stage::Receiving);
    let n = ResponseReader::new(session).read_body(reply)?;
    if n == 0 && !reply.is_empty() {
        return Err(ProtocolError::ResponseTruncated.into());
    }
    debug!(bytes = n, "reply body read");
    Ok(n)
}

fn advance(stage: &mut Stage, next: Stage) {
    trace!(from = %stage, to = %next, "stage");
    *stage = next;
}
