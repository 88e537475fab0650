//! Write side of one request/response exchange.

use crate::{
    buffer::ByteBuffer,
    errors::ServerError,
    http::types::{status_reason, HeaderMap, HttpVersion},
};

/// Mutable response under construction by the delegate.
///
/// Body bytes accumulate in a [`ByteBuffer`] until [`end`](Self::end); the
/// connection handler then serialises head and body to the socket in one
/// pass. Status and headers are rejected once the response has ended, and a
/// second `end` is an error rather than a no-op.
#[derive(Debug)]
pub struct ServerResponse {
    status_code: u16,
    headers: HeaderMap,
    body: ByteBuffer,
    version: HttpVersion,
    keep_alive: bool,
    ended: bool,
}

impl ServerResponse {
    pub(crate) fn new(version: HttpVersion, keep_alive: bool) -> Self {
        Self {
            status_code: 200,
            headers: HeaderMap::new(),
            body: ByteBuffer::new(),
            version,
            keep_alive,
            ended: false,
        }
    }

    #[inline]
    pub fn status_code(&self) -> u16 {
        self.status_code
    }

    pub fn set_status(&mut self, code: u16) -> Result<(), ServerError> {
        if self.ended {
            return Err(ServerError::HeadersSent);
        }
        self.status_code = code;
        Ok(())
    }

    #[inline]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Replaces every value of `name`.
    pub fn set_header(&mut self, name: &str, value: &str) -> Result<(), ServerError> {
        if self.ended {
            return Err(ServerError::HeadersSent);
        }
        self.headers.set(name, value);
        Ok(())
    }

    /// Adds one more value for `name`.
    pub fn append_header(&mut self, name: &str, value: &str) -> Result<(), ServerError> {
        if self.ended {
            return Err(ServerError::HeadersSent);
        }
        self.headers.append(name, value);
        Ok(())
    }

    pub fn remove_header(&mut self, name: &str) -> Result<(), ServerError> {
        if self.ended {
            return Err(ServerError::HeadersSent);
        }
        self.headers.remove(name);
        Ok(())
    }

    /// Appends body bytes.
    pub fn write(&mut self, bytes: &[u8]) -> Result<(), ServerError> {
        if self.ended {
            return Err(ServerError::ResponseEnded);
        }
        self.body.append(bytes);
        Ok(())
    }

    pub fn write_str(&mut self, text: &str) -> Result<(), ServerError> {
        self.write(text.as_bytes())
    }

    /// Marks the response complete. Exactly one call is allowed.
    pub fn end(&mut self) -> Result<(), ServerError> {
        if self.ended {
            return Err(ServerError::ResponseEnded);
        }
        self.ended = true;
        Ok(())
    }

    #[inline]
    pub fn ended(&self) -> bool {
        self.ended
    }

    /// Forces `Connection: close` on the serialised response.
    pub(crate) fn set_close(&mut self) {
        self.keep_alive = false;
    }

    pub(crate) fn keep_alive(&self) -> bool {
        self.keep_alive
    }

    /// Serialises status line, headers and body into `out`.
    ///
    /// Identity framing with a computed `Content-Length` unless the delegate
    /// set `Transfer-Encoding: chunked` itself, in which case the buffered
    /// body goes out as one chunk plus the terminating chunk.
    pub(crate) fn serialize(&mut self, out: &mut Vec<u8>) {
        let chunked = self
            .headers
            .get("transfer-encoding")
            .map(|v| v.to_ascii_lowercase().contains("chunked"))
            .unwrap_or(false);

        out.extend_from_slice(self.version.to_string().as_bytes());
        out.extend_from_slice(b" ");
        out.extend_from_slice(self.status_code.to_string().as_bytes());
        out.extend_from_slice(b" ");
        out.extend_from_slice(status_reason(self.status_code).as_bytes());
        out.extend_from_slice(b"\r\n");

        for (name, value) in self.headers.iter() {
            out.extend_from_slice(name.as_bytes());
            out.extend_from_slice(b": ");
            out.extend_from_slice(value.as_bytes());
            out.extend_from_slice(b"\r\n");
        }

        if !self.headers.contains("connection") {
            match (self.version.minor, self.keep_alive) {
                (1, true) => {}
                (1, false) => out.extend_from_slice(b"connection: close\r\n"),
                (_, true) => out.extend_from_slice(b"connection: keep-alive\r\n"),
                (_, false) => out.extend_from_slice(b"connection: close\r\n"),
            }
        }

        if chunked {
            out.extend_from_slice(b"\r\n");
            if self.body.count() > 0 {
                out.extend_from_slice(format!("{:x}\r\n", self.body.count()).as_bytes());
                self.body.fill_into_vec(out);
                out.extend_from_slice(b"\r\n");
            }
            out.extend_from_slice(b"0\r\n\r\n");
        } else {
            if !self.headers.contains("content-length") {
                out.extend_from_slice(
                    format!("content-length: {}\r\n", self.body.count()).as_bytes(),
                );
            }
            out.extend_from_slice(b"\r\n");
            self.body.fill_into_vec(out);
        }
    }
}
