use crate::endpoint::Endpoint;
use crate::error::{AllocationError, try_buffer};

pub const USER_AGENT: &str = "Mozilla/4.0 (compatible; MSIE 5.01; Windows NT 5.0)";

/// Headers sent on every request, between Host and Content-Length.
pub const FIXED_HEADERS: [(&str, &str); 4] = [
    ("User-Agent", USER_AGENT),
    ("Cache-Control", "no-cache"),
    ("Accept", "*/*"),
    ("Content-type", "application/json"),
];

/// A serialized `POST` request. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    headers: Vec<(&'static str, String)>,
    bytes: Vec<u8>,
    header_len: usize,
}

impl Request {
    /// Serialize into one buffer reserved for the exact final size.
    pub fn build(endpoint: &Endpoint, body: &[u8]) -> Result<Self, AllocationError> {
        let body_len = body.len();
        let start_line = format!("POST {} HTTP/1.0\r\n", endpoint.path);

        let mut headers: Vec<(&'static str, String)> = Vec::with_capacity(FIXED_HEADERS.len() + 2);
        headers.push(("Host", endpoint.authority()));
        headers.extend(FIXED_HEADERS.iter().map(|&(k, v)| (k, v.to_string())));
        headers.push(("Content-Length", body_len.to_string()));

        // "name: value\r\n" per header, then the blank line
        let header_len = start_line.len()
            + headers
                .iter()
                .map(|(k, v)| k.len() + 2 + v.len() + 2)
                .sum::<usize>()
            + 2;
        let total = header_len + body_len;

        let mut bytes = try_buffer(total)?;
        bytes.extend_from_slice(start_line.as_bytes());
        for (k, v) in &headers {
            bytes.extend_from_slice(k.as_bytes());
            bytes.extend_from_slice(b": ");
            bytes.extend_from_slice(v.as_bytes());
            bytes.extend_from_slice(b"\r\n");
        }
        bytes.extend_from_slice(b"\r\n");
        debug_assert_eq!(bytes.len(), header_len);
        bytes.extend_from_slice(body);
        debug_assert_eq!(bytes.len(), total);

        Ok(Self {
            headers,
            bytes,
            header_len,
        })
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Start line, headers and the blank line.
    pub fn header_len(&self) -> usize {
        self.header_len
    }

    pub fn body_len(&self) -> usize {
        self.bytes.len() - self.header_len
    }

    #[cfg(test)]
    pub fn body(&self) -> &[u8] {
        &self.bytes[self.header_len..]
    }

    /// Header fields in wire order.
    pub fn headers(&self) -> &[(&'static str, String)] {
        &self.headers
    }
}
