//! Per-connection state machine.
//!
//! One handler owns one accepted socket for its whole life: it reads bytes,
//! drives the parser, invokes the delegate once per completed message,
//! writes the response and either returns to idle (keep-alive) or closes.

use crate::{
    errors::ServerError,
    http::{
        parser::{HttpParser, ParseStage},
        request::ServerRequest,
        response::ServerResponse,
        types::HttpVersion,
    },
    options::ServerOptions,
    server::server::ServerDelegate,
};
use std::{io, net::SocketAddr, sync::Arc, time::Duration};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpStream,
    sync::watch,
};
use tokio_rustls::server::TlsStream;

/// Accepted socket, with or without the TLS transform applied.
pub(crate) enum Stream {
    Plain(TcpStream),
    Tls(Box<TlsStream<TcpStream>>),
}

impl Stream {
    async fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Stream::Plain(s) => s.read(buf).await,
            Stream::Tls(s) => s.read(buf).await,
        }
    }

    async fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        match self {
            Stream::Plain(s) => s.write_all(buf).await,
            Stream::Tls(s) => s.write_all(buf).await,
        }
    }
}

/// Observable position in the connection lifecycle, for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConnState {
    Idle,
    ReadingHeaders,
    ReadingBody,
    HandlerRunning,
    Writing,
    Closing,
}

enum ReadEvent {
    Data(usize),
    StopRequested,
    TimedOut,
}

pub(crate) struct ConnectionHandler<D: ServerDelegate> {
    id: u64,
    stream: Stream,
    remote: SocketAddr,
    parser: HttpParser,
    delegate: Arc<D>,
    idle_timeout: Duration,
    read_buf: Vec<u8>,
    stopping: watch::Receiver<bool>,
    state: ConnState,
}

impl<D: ServerDelegate> ConnectionHandler<D> {
    pub(crate) fn new(
        id: u64,
        stream: Stream,
        remote: SocketAddr,
        delegate: Arc<D>,
        options: &ServerOptions,
        stopping: watch::Receiver<bool>,
    ) -> Self {
        Self {
            id,
            stream,
            remote,
            parser: HttpParser::new(),
            delegate,
            idle_timeout: options.idle_timeout,
            read_buf: vec![0; options.read_buffer_size],
            stopping,
            state: ConnState::Idle,
        }
    }

    /// Serves requests on this socket until the peer closes, an error
    /// occurs, the idle timeout fires, or the server drains.
    pub(crate) async fn run(mut self) -> Result<(), ServerError> {
        loop {
            if !self.read_message().await? {
                return Ok(());
            }

            let keep_alive = self.parser.keep_alive() && !*self.stopping.borrow();
            let mut request = ServerRequest::from_parser(&mut self.parser, self.remote);
            let mut response = ServerResponse::new(request.http_version(), keep_alive);

            self.state = ConnState::HandlerRunning;
            tracing::trace!(connection = self.id, method = request.method(), path = request.path(), "dispatching");

            let mut drop_after_write = !keep_alive;
            let mut response = match self.delegate.handle(&mut request, &mut response).await {
                Ok(()) => {
                    if !response.ended() {
                        response.end()?;
                    }
                    response
                }
                Err(err) => {
                    tracing::error!(connection = self.id, error = %err, "delegate raised");
                    if response.ended() {
                        // Too late for a 500; the exchange is unsalvageable.
                        self.state = ConnState::Closing;
                        return Err(ServerError::DelegateRaised(err.to_string()));
                    }
                    drop_after_write = true;
                    error_response(request.http_version())
                }
            };

            // A stop that arrived while the delegate ran still closes this
            // connection at the end of the exchange.
            if *self.stopping.borrow() && !drop_after_write {
                drop_after_write = true;
                response.set_close();
            }

            self.state = ConnState::Writing;
            let mut wire = Vec::with_capacity(128 + response.headers().len() * 32);
            response.serialize(&mut wire);
            self.stream
                .write_all(&wire)
                .await
                .map_err(ServerError::WriteFailed)?;

            if drop_after_write {
                self.state = ConnState::Closing;
                return Ok(());
            }
            self.parser.reset();
        }
    }

    /// Reads until one message completes. Returns false on a clean close:
    /// peer EOF or server drain, both exactly between messages.
    async fn read_message(&mut self) -> Result<bool, ServerError> {
        self.state = ConnState::Idle;

        // Pipelined leftovers may already hold a full message.
        if self.parser.feed(&[])? == ParseStage::MessageComplete {
            return Ok(true);
        }

        let mut stop_requested = *self.stopping.borrow();
        loop {
            if stop_requested && self.parser.at_message_boundary() {
                self.state = ConnState::Closing;
                return Ok(false);
            }

            let event = if stop_requested {
                tokio::select! {
                    result = self.stream.read(&mut self.read_buf) => {
                        ReadEvent::Data(result.map_err(|_| ServerError::ClientDisconnected)?)
                    }
                    _ = tokio::time::sleep(self.idle_timeout) => ReadEvent::TimedOut,
                }
            } else {
                tokio::select! {
                    result = self.stream.read(&mut self.read_buf) => {
                        ReadEvent::Data(result.map_err(|_| ServerError::ClientDisconnected)?)
                    }
                    _ = self.stopping.changed() => ReadEvent::StopRequested,
                    _ = tokio::time::sleep(self.idle_timeout) => ReadEvent::TimedOut,
                }
            };

            match event {
                ReadEvent::Data(0) => {
                    self.state = ConnState::Closing;
                    return if self.parser.at_message_boundary() {
                        Ok(false)
                    } else {
                        Err(ServerError::ClientDisconnected)
                    };
                }
                ReadEvent::Data(n) => {
                    if self.state == ConnState::Idle {
                        self.state = ConnState::ReadingHeaders;
                    }
                    match self.parser.feed(&self.read_buf[..n])? {
                        ParseStage::MessageComplete => return Ok(true),
                        ParseStage::HeadersComplete => self.state = ConnState::ReadingBody,
                        ParseStage::Initial => {}
                    }
                }
                ReadEvent::StopRequested => stop_requested = true,
                ReadEvent::TimedOut => {
                    self.state = ConnState::Closing;
                    return Err(ServerError::IdleTimeout);
                }
            }
        }
    }
}

/// The response sent when the delegate raises before anything was written.
fn error_response(version: HttpVersion) -> ServerResponse {
    let mut response = ServerResponse::new(version, false);
    let _ = response.set_status(500);
    let _ = response.end();
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_response_shape() {
        let mut response = error_response(HttpVersion::HTTP_11);
        assert!(response.ended());
        assert!(!response.keep_alive());

        let mut wire = Vec::new();
        response.serialize(&mut wire);
        let wire = String::from_utf8(wire).unwrap();
        assert!(wire.starts_with("HTTP/1.1 500 Internal Server Error\r\n"));
        assert!(wire.contains("connection: close\r\n"));
    }
}
