//! Incremental adaptor over the byte-level HTTP parser.
//!
//! The head of each message is parsed by `httparse::Request` and chunk
//! framing by `httparse::parse_chunk_size`; this module only assembles the
//! results (ordered header multimap, method, version, keep-alive verdict)
//! and frames the body. Bytes past a completed message are retained so
//! pipelined requests carry over to the next parse cycle.

use crate::{
    buffer::ByteBuffer,
    errors::ServerError,
    http::types::{HeaderMap, HttpVersion},
};

const MAX_HEADERS: usize = 64;

/// Progress of the in-flight message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ParseStage {
    /// No byte of the current message head has been fully parsed yet.
    Initial,
    /// The head is parsed; body bytes are being framed.
    HeadersComplete,
    /// The whole message has been consumed.
    MessageComplete,
}

#[derive(Debug)]
enum BodyFraming {
    None,
    Length(usize),
    Chunked(ChunkPhase),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChunkPhase {
    Size,
    Data { remaining: u64 },
    DataCrlf,
    Trailer,
}

/// Per-connection incremental parser state.
#[derive(Debug)]
pub(crate) struct HttpParser {
    input: ByteBuffer,
    stage: ParseStage,
    framing: BodyFraming,

    method: String,
    target: Vec<u8>,
    version: HttpVersion,
    headers: HeaderMap,
    keep_alive: bool,
    body: ByteBuffer,
}

impl HttpParser {
    pub(crate) fn new() -> Self {
        Self {
            input: ByteBuffer::new(),
            stage: ParseStage::Initial,
            framing: BodyFraming::None,
            method: String::new(),
            target: Vec::new(),
            version: HttpVersion::default(),
            headers: HeaderMap::new(),
            keep_alive: true,
            body: ByteBuffer::new(),
        }
    }

    /// Appends `bytes` and advances the state machine as far as the input
    /// allows. Returns the stage reached; call with an empty slice to pump
    /// leftovers from a previous message.
    pub(crate) fn feed(&mut self, bytes: &[u8]) -> Result<ParseStage, ServerError> {
        self.input.append(bytes);

        loop {
            match self.stage {
                ParseStage::Initial => {
                    if !self.parse_head()? {
                        return Ok(self.stage);
                    }
                }
                ParseStage::HeadersComplete => {
                    if !self.parse_body()? {
                        return Ok(self.stage);
                    }
                }
                ParseStage::MessageComplete => return Ok(self.stage),
            }
        }
    }

    pub(crate) fn stage(&self) -> ParseStage {
        self.stage
    }

    /// The parser's keep-alive verdict for the completed message.
    pub(crate) fn keep_alive(&self) -> bool {
        self.keep_alive
    }

    /// True when no byte of a new message has arrived: the connection sits
    /// exactly between messages and may close cleanly.
    pub(crate) fn at_message_boundary(&self) -> bool {
        self.stage == ParseStage::Initial && self.input.is_drained()
    }

    /// Moves the parsed head and body out, leaving the parser ready for
    /// [`reset`](HttpParser::reset).
    pub(crate) fn take_parts(&mut self) -> (String, Vec<u8>, HttpVersion, HeaderMap, ByteBuffer) {
        (
            std::mem::take(&mut self.method),
            std::mem::take(&mut self.target),
            self.version,
            std::mem::take(&mut self.headers),
            std::mem::take(&mut self.body),
        )
    }

    /// Prepares for the next message on the same connection. Unconsumed
    /// input (pipelined requests) is kept.
    pub(crate) fn reset(&mut self) {
        self.stage = ParseStage::Initial;
        self.framing = BodyFraming::None;
        self.method.clear();
        self.target.clear();
        self.version = HttpVersion::default();
        self.headers = HeaderMap::new();
        self.keep_alive = true;
        self.body.reset();
        self.input.compact();
    }

    /// Parses the request head. Returns false when more input is needed.
    fn parse_head(&mut self) -> Result<bool, ServerError> {
        let mut storage = [httparse::EMPTY_HEADER; MAX_HEADERS];
        let mut req = httparse::Request::new(&mut storage);

        let head_len = match req.parse(self.input.unread())? {
            httparse::Status::Complete(len) => len,
            httparse::Status::Partial => return Ok(false),
        };

        let method = req
            .method
            .ok_or_else(|| ServerError::ParseError("missing method".into()))?
            .to_string();
        let target = req
            .path
            .ok_or_else(|| ServerError::ParseError("missing request target".into()))?
            .as_bytes()
            .to_vec();
        let minor = req
            .version
            .ok_or_else(|| ServerError::ParseError("missing version".into()))?;

        let mut headers = HeaderMap::new();
        for header in req.headers.iter() {
            headers.append(header.name, &String::from_utf8_lossy(header.value));
        }

        self.method = method;
        self.target = target;
        self.version = HttpVersion { major: 1, minor };
        self.framing = body_framing(&headers)?;
        self.keep_alive = keep_alive_verdict(self.version, &headers);
        self.headers = headers;

        self.input.advance(head_len);
        self.stage = ParseStage::HeadersComplete;
        Ok(true)
    }

    /// Frames body bytes into the body buffer. Returns false when more
    /// input is needed.
    fn parse_body(&mut self) -> Result<bool, ServerError> {
        match self.framing {
            BodyFraming::None => {
                self.stage = ParseStage::MessageComplete;
                Ok(true)
            }
            BodyFraming::Length(remaining) => {
                let available = self.input.unread();
                let n = remaining.min(available.len());
                self.body.append(&available[..n]);
                self.input.advance(n);

                if remaining == n {
                    self.stage = ParseStage::MessageComplete;
                    Ok(true)
                } else {
                    self.framing = BodyFraming::Length(remaining - n);
                    Ok(false)
                }
            }
            BodyFraming::Chunked(phase) => self.parse_chunked(phase),
        }
    }

    fn parse_chunked(&mut self, phase: ChunkPhase) -> Result<bool, ServerError> {
        match phase {
            ChunkPhase::Size => {
                let (consumed, size) = match httparse::parse_chunk_size(self.input.unread()) {
                    Ok(httparse::Status::Complete(parsed)) => parsed,
                    Ok(httparse::Status::Partial) => return Ok(false),
                    Err(_) => return Err(ServerError::ParseError("invalid chunk size".into())),
                };
                self.input.advance(consumed);
                self.framing = BodyFraming::Chunked(if size == 0 {
                    ChunkPhase::Trailer
                } else {
                    ChunkPhase::Data { remaining: size }
                });
                Ok(true)
            }
            ChunkPhase::Data { remaining } => {
                let available = self.input.unread();
                let n = (remaining as usize).min(available.len());
                self.body.append(&available[..n]);
                self.input.advance(n);

                if remaining == n as u64 {
                    self.framing = BodyFraming::Chunked(ChunkPhase::DataCrlf);
                    Ok(true)
                } else {
                    self.framing = BodyFraming::Chunked(ChunkPhase::Data {
                        remaining: remaining - n as u64,
                    });
                    Ok(false)
                }
            }
            ChunkPhase::DataCrlf => {
                let available = self.input.unread();
                if available.len() < 2 {
                    return Ok(false);
                }
                if &available[..2] != b"\r\n" {
                    return Err(ServerError::ParseError("missing chunk terminator".into()));
                }
                self.input.advance(2);
                self.framing = BodyFraming::Chunked(ChunkPhase::Size);
                Ok(true)
            }
            ChunkPhase::Trailer => {
                // Trailer section ends at an empty line; trailer fields are
                // consumed and ignored.
                let available = self.input.unread();
                if available.starts_with(b"\r\n") {
                    self.input.advance(2);
                    self.stage = ParseStage::MessageComplete;
                    return Ok(true);
                }
                match memchr::memchr(b'\n', available) {
                    Some(pos) => {
                        self.input.advance(pos + 1);
                        Ok(true)
                    }
                    None => Ok(false),
                }
            }
        }
    }
}

fn body_framing(headers: &HeaderMap) -> Result<BodyFraming, ServerError> {
    if let Some(encoding) = headers.get("transfer-encoding") {
        if encoding.to_ascii_lowercase().contains("chunked") {
            return Ok(BodyFraming::Chunked(ChunkPhase::Size));
        }
    }

    match headers.get("content-length") {
        Some(value) => {
            let length: usize = value
                .trim()
                .parse()
                .map_err(|_| ServerError::ParseError("invalid content-length".into()))?;
            Ok(if length == 0 {
                BodyFraming::None
            } else {
                BodyFraming::Length(length)
            })
        }
        None => Ok(BodyFraming::None),
    }
}

/// HTTP/1.1 stays open unless `Connection: close`; HTTP/1.0 closes unless
/// `Connection: keep-alive`.
fn keep_alive_verdict(version: HttpVersion, headers: &HeaderMap) -> bool {
    let connection = headers.get("connection").map(str::to_ascii_lowercase);

    match version.minor {
        0 => matches!(connection.as_deref(), Some(v) if v.contains("keep-alive")),
        _ => !matches!(connection.as_deref(), Some(v) if v.contains("close")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed_all(parser: &mut HttpParser, bytes: &[u8]) -> ParseStage {
        parser.feed(bytes).expect("parse failed")
    }

    #[test]
    fn simple_get() {
        let mut parser = HttpParser::new();
        let stage = feed_all(&mut parser, b"GET /path?x=1 HTTP/1.1\r\nHost: a\r\n\r\n");

        assert_eq!(stage, ParseStage::MessageComplete);
        assert!(parser.keep_alive());

        let (method, target, version, headers, body) = parser.take_parts();
        assert_eq!(method, "GET");
        assert_eq!(target, b"/path?x=1");
        assert_eq!(version, HttpVersion::HTTP_11);
        assert_eq!(headers.get("host"), Some("a"));
        assert_eq!(body.count(), 0);
    }

    #[test]
    fn split_anywhere() {
        // Feeding byte by byte must reach the same result as one shot.
        let raw = b"POST /u HTTP/1.1\r\nContent-Length: 5\r\nHost: b\r\n\r\nhello";

        let mut parser = HttpParser::new();
        for byte in raw.iter() {
            parser.feed(std::slice::from_ref(byte)).expect("parse failed");
        }
        assert_eq!(parser.stage(), ParseStage::MessageComplete);

        let (method, _, _, _, mut body) = parser.take_parts();
        assert_eq!(method, "POST");
        let mut out = Vec::new();
        body.fill_into_vec(&mut out);
        assert_eq!(out, b"hello");
    }

    #[test]
    fn header_multimap_order() {
        let mut parser = HttpParser::new();
        feed_all(
            &mut parser,
            b"GET / HTTP/1.1\r\nX-Tag: one\r\nHost: h\r\nX-Tag: two\r\n\r\n",
        );

        let (_, _, _, headers, _) = parser.take_parts();
        assert_eq!(headers.get_all("x-tag"), ["one", "two"]);
        let names: Vec<_> = headers.iter().map(|(n, _)| n).collect();
        assert_eq!(names, ["X-Tag", "X-Tag", "Host"]);
    }

    #[test]
    fn content_length_body() {
        let mut parser = HttpParser::new();
        let stage = feed_all(
            &mut parser,
            b"POST /data HTTP/1.1\r\nContent-Length: 11\r\n\r\nhello ",
        );
        assert_eq!(stage, ParseStage::HeadersComplete);

        let stage = feed_all(&mut parser, b"world");
        assert_eq!(stage, ParseStage::MessageComplete);

        let (.., mut body) = parser.take_parts();
        let mut out = Vec::new();
        body.fill_into_vec(&mut out);
        assert_eq!(out, b"hello world");
    }

    #[test]
    fn chunked_body() {
        let mut parser = HttpParser::new();
        let stage = feed_all(
            &mut parser,
            b"POST /c HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\n\
              5\r\nhello\r\n6\r\n world\r\n0\r\n\r\n",
        );
        assert_eq!(stage, ParseStage::MessageComplete);

        let (.., mut body) = parser.take_parts();
        let mut out = Vec::new();
        body.fill_into_vec(&mut out);
        assert_eq!(out, b"hello world");
    }

    #[test]
    fn chunked_with_trailers() {
        let mut parser = HttpParser::new();
        let stage = feed_all(
            &mut parser,
            b"POST /c HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\n\
              3\r\nabc\r\n0\r\nExpires: never\r\n\r\n",
        );
        assert_eq!(stage, ParseStage::MessageComplete);

        let (.., mut body) = parser.take_parts();
        let mut out = Vec::new();
        body.fill_into_vec(&mut out);
        assert_eq!(out, b"abc");
    }

    #[test]
    fn keep_alive_verdicts() {
        #[rustfmt::skip]
        let cases = [
            (b"GET / HTTP/1.1\r\n\r\n" as &[u8],                          true),
            (b"GET / HTTP/1.1\r\nConnection: close\r\n\r\n",              false),
            (b"GET / HTTP/1.1\r\nConnection: CLOSE\r\n\r\n",              false),
            (b"GET / HTTP/1.1\r\nConnection: keep-alive\r\n\r\n",         true),
            (b"GET / HTTP/1.0\r\n\r\n",                                   false),
            (b"GET / HTTP/1.0\r\nConnection: keep-alive\r\n\r\n",         true),
            (b"GET / HTTP/1.0\r\nConnection: Keep-Alive\r\n\r\n",         true),
        ];

        for (raw, expected) in cases {
            let mut parser = HttpParser::new();
            assert_eq!(feed_all(&mut parser, raw), ParseStage::MessageComplete);
            assert_eq!(
                parser.keep_alive(),
                expected,
                "request: {}",
                String::from_utf8_lossy(raw)
            );
        }
    }

    #[test]
    fn pipelined_requests_carry_over() {
        let mut parser = HttpParser::new();
        let stage = feed_all(
            &mut parser,
            b"GET /first HTTP/1.1\r\nHost: a\r\n\r\nGET /second HTTP/1.1\r\nHost: a\r\n\r\n",
        );
        assert_eq!(stage, ParseStage::MessageComplete);

        let (_, target, ..) = parser.take_parts();
        assert_eq!(target, b"/first");

        parser.reset();
        assert!(!parser.at_message_boundary());

        // The second message completes without any new input.
        let stage = feed_all(&mut parser, b"");
        assert_eq!(stage, ParseStage::MessageComplete);
        let (_, target, ..) = parser.take_parts();
        assert_eq!(target, b"/second");

        parser.reset();
        assert!(parser.at_message_boundary());
    }

    #[test]
    fn malformed_head_is_rejected() {
        let mut parser = HttpParser::new();
        let result = parser.feed(b"NOT AN HTTP MESSAGE\x01\r\n\r\n");
        assert!(matches!(result, Err(ServerError::ParseError(_))));

        let mut parser = HttpParser::new();
        let result = parser.feed(b"POST / HTTP/1.1\r\nContent-Length: abc\r\n\r\n");
        assert!(matches!(result, Err(ServerError::ParseError(_))));
    }

    #[test]
    fn zero_length_body() {
        let mut parser = HttpParser::new();
        let stage = feed_all(&mut parser, b"POST / HTTP/1.1\r\nContent-Length: 0\r\n\r\n");
        assert_eq!(stage, ParseStage::MessageComplete);

        let (.., body) = parser.take_parts();
        assert_eq!(body.count(), 0);
    }
}
