use std::{error, fmt, io};

/// Boxed error type returned by request delegates.
pub type BoxError = Box<dyn error::Error + Send + Sync>;

/// Errors produced by the server core.
///
/// Listener-level errors (`BindFailed`, `TlsHandshakeFailed`) are reported
/// through lifecycle callbacks and returned to the caller of `listen`.
/// Connection-level errors terminate the affected connection only.
#[derive(Debug)]
pub enum ServerError {
    /// Creating or binding the listening socket failed.
    BindFailed(io::Error),
    /// `accept` failed while the server was running.
    AcceptFailed(io::Error),
    /// The TLS engine rejected a configuration or a handshake.
    TlsHandshakeFailed(String),
    /// The peer closed or reset the connection mid-message.
    ClientDisconnected,
    /// The inbound byte stream was not a well-formed HTTP/1.x message.
    ParseError(String),
    /// The application delegate returned an error.
    DelegateRaised(String),
    /// Writing the response to the socket failed.
    WriteFailed(io::Error),
    /// No bytes arrived within the idle timeout.
    IdleTimeout,
    /// Header mutation was attempted after the response head was fixed.
    HeadersSent,
    /// `end` was called on a response that had already ended.
    ResponseEnded,
}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BindFailed(e) => write!(f, "bind failed: {e}"),
            Self::AcceptFailed(e) => write!(f, "accept failed: {e}"),
            Self::TlsHandshakeFailed(msg) => write!(f, "TLS handshake failed: {msg}"),
            Self::ClientDisconnected => write!(f, "client disconnected"),
            Self::ParseError(msg) => write!(f, "parse error: {msg}"),
            Self::DelegateRaised(msg) => write!(f, "delegate error: {msg}"),
            Self::WriteFailed(e) => write!(f, "write failed: {e}"),
            Self::IdleTimeout => write!(f, "idle timeout expired"),
            Self::HeadersSent => write!(f, "headers already sent"),
            Self::ResponseEnded => write!(f, "response already ended"),
        }
    }
}

impl error::Error for ServerError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Self::BindFailed(e) | Self::AcceptFailed(e) | Self::WriteFailed(e) => Some(e),
            _ => None,
        }
    }
}

impl From<httparse::Error> for ServerError {
    fn from(err: httparse::Error) -> Self {
        Self::ParseError(err.to_string())
    }
}
