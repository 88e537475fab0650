//! Read-only view of one inbound HTTP message.

use crate::{
    buffer::ByteBuffer,
    errors::ServerError,
    http::{
        parser::HttpParser,
        query::QueryValue,
        types::{HeaderMap, HttpVersion},
    },
};
use std::net::SocketAddr;

/// One parsed inbound request, handed to the delegate together with its
/// [`ServerResponse`](crate::ServerResponse) companion.
///
/// The body is buffered by the time the delegate runs; `read` and friends
/// drain it in FIFO order through the request's [`ByteBuffer`].
#[derive(Debug)]
pub struct ServerRequest {
    method: String,
    url: Vec<u8>,
    path: String,
    query: String,
    http_version: HttpVersion,
    headers: HeaderMap,
    body: ByteBuffer,
    remote: SocketAddr,
}

impl ServerRequest {
    pub(crate) fn from_parser(parser: &mut HttpParser, remote: SocketAddr) -> Self {
        let (method, url, http_version, headers, body) = parser.take_parts();

        let target = String::from_utf8_lossy(&url);
        let (path, query) = match target.split_once('?') {
            Some((path, query)) => (path.to_string(), query.to_string()),
            None => (target.into_owned(), String::new()),
        };

        Self {
            method,
            url,
            path,
            query,
            http_version,
            headers,
            body,
            remote,
        }
    }

    /// Request method as sent by the client (`GET`, `POST`, ...).
    #[inline]
    pub fn method(&self) -> &str {
        &self.method
    }

    /// Raw request target bytes, exactly as they appeared on the wire.
    #[inline]
    pub fn url(&self) -> &[u8] {
        &self.url
    }

    /// Path component of the target, without the query string.
    #[inline]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Raw query string without the leading `?`; empty when absent.
    #[inline]
    pub fn query_string(&self) -> &str {
        &self.query
    }

    /// Parses the query string into a structured tree. Parsing happens on
    /// each call; cache the result if it is needed more than once.
    pub fn query_parameters(&self) -> QueryValue {
        QueryValue::parse(&self.query)
    }

    #[inline]
    pub fn http_version(&self) -> HttpVersion {
        self.http_version
    }

    #[inline]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Address of the connected peer.
    #[inline]
    pub fn remote_address(&self) -> SocketAddr {
        self.remote
    }

    /// Copies up to `dst.len()` body bytes into `dst`; returns the amount
    /// copied, 0 once the body is exhausted.
    pub fn read(&mut self, dst: &mut [u8]) -> usize {
        self.body.fill_into(dst)
    }

    /// Appends the remaining body to `dst`; returns the amount appended.
    pub fn read_all(&mut self, dst: &mut Vec<u8>) -> usize {
        self.body.fill_into_vec(dst)
    }

    /// Remaining body as UTF-8 text.
    pub fn read_string(&mut self) -> Result<String, ServerError> {
        let mut bytes = Vec::with_capacity(self.body.count());
        self.body.fill_into_vec(&mut bytes);
        String::from_utf8(bytes).map_err(|e| ServerError::ParseError(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::parser::ParseStage;

    fn request_from(raw: &[u8]) -> ServerRequest {
        let mut parser = HttpParser::new();
        let stage = parser.feed(raw).expect("parse failed");
        assert_eq!(stage, ParseStage::MessageComplete);
        ServerRequest::from_parser(&mut parser, "127.0.0.1:9999".parse().unwrap())
    }

    #[test]
    fn target_splits_into_path_and_query() {
        let req = request_from(b"GET /api/users?sort=name&limit=5 HTTP/1.1\r\nHost: h\r\n\r\n");

        assert_eq!(req.method(), "GET");
        assert_eq!(req.url(), b"/api/users?sort=name&limit=5");
        assert_eq!(req.path(), "/api/users");
        assert_eq!(req.query_string(), "sort=name&limit=5");
        assert_eq!(req.http_version(), HttpVersion::HTTP_11);
    }

    #[test]
    fn no_query() {
        let req = request_from(b"GET /plain HTTP/1.1\r\n\r\n");
        assert_eq!(req.path(), "/plain");
        assert_eq!(req.query_string(), "");
        assert_eq!(req.query_parameters().len(), 0);
    }

    #[test]
    fn query_parameters_on_demand() {
        let req = request_from(b"GET /s?a=1&b[c]=true HTTP/1.1\r\n\r\n");

        let params = req.query_parameters();
        assert_eq!(params["a"], QueryValue::Int(1));
        assert_eq!(params["b"]["c"], QueryValue::Bool(true));
    }

    #[test]
    fn body_reads_drain_in_order() {
        let mut req =
            request_from(b"POST /b HTTP/1.1\r\nContent-Length: 10\r\n\r\nabcdefghij");

        let mut first = [0u8; 4];
        assert_eq!(req.read(&mut first), 4);
        assert_eq!(&first, b"abcd");

        assert_eq!(req.read_string().unwrap(), "efghij");
        assert_eq!(req.read(&mut first), 0);
    }

    #[test]
    fn empty_body() {
        let mut req = request_from(b"GET /e HTTP/1.1\r\n\r\n");
        let mut out = Vec::new();
        assert_eq!(req.read_all(&mut out), 0);
        assert_eq!(req.read_string().unwrap(), "");
    }
}
