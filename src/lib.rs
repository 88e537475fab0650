//! wharf - server-side HTTP/1.x networking core
//!
//! A compact library for building HTTP services that want direct control
//! over the connection layer: a listener with lifecycle callbacks, one
//! handler per accepted socket with keep-alive and idle eviction, an
//! incremental parser adaptor, and a structured query-string parser.
//!
//! # Architecture
//!
//! - [`HttpServer`] binds a port, runs the accept loop on a dedicated
//!   thread and dispatches accepted sockets to per-connection handlers on
//!   a worker runtime.
//! - Each connection is owned by one handler for its whole life: bytes
//!   are framed by the parser, the [`ServerDelegate`] runs once per
//!   message, and the connection returns to idle on keep-alive.
//! - [`ListenerGroup::wait_for_listeners`] parks the calling thread until
//!   every server in the process has stopped.
//!
//! # Quick start
//!
//! ```no_run
//! use wharf::{BoxError, HttpServer, ListenerGroup, ServerDelegate, ServerRequest, ServerResponse};
//! use std::sync::Arc;
//!
//! struct Echo;
//!
//! impl ServerDelegate for Echo {
//!     async fn handle(
//!         &self,
//!         request: &mut ServerRequest,
//!         response: &mut ServerResponse,
//!     ) -> Result<(), BoxError> {
//!         let body = request.read_string()?;
//!         response.set_header("content-type", "text/plain")?;
//!         response.write_str(&body)?;
//!         response.end()?;
//!         Ok(())
//!     }
//! }
//!
//! fn main() {
//!     let _server = HttpServer::new()
//!         .on_started(|port| println!("listening on {port}"))
//!         .listen(8080, Arc::new(Echo))
//!         .expect("bind failed");
//!
//!     ListenerGroup::wait_for_listeners();
//! }
//! ```
//!
//! TLS is attached as an opaque engine before `listen`
//! ([`TlsEngine`]), and a thin libcurl-backed client
//! ([`ClientRequest`]) covers the outbound direction.

pub(crate) mod http {
    pub(crate) mod parser;
    pub mod query;
    pub mod request;
    pub mod response;
    pub mod types;
}
pub(crate) mod server {
    pub mod group;
    pub(crate) mod handler;
    pub(crate) mod manager;
    #[allow(clippy::module_inception)]
    pub mod server;
}
pub mod buffer;
pub mod client;
pub mod errors;
pub mod options;
pub mod tls;

pub use crate::{
    buffer::ByteBuffer,
    client::{ClientRequest, ClientRequestOption, ClientResponse},
    errors::{BoxError, ServerError},
    http::{
        query::QueryValue,
        request::ServerRequest,
        response::ServerResponse,
        types::{HeaderMap, HttpVersion},
    },
    options::ServerOptions,
    server::{
        group::ListenerGroup,
        server::{HttpServer, ServerDelegate, ServerHandle, ServerLifecycleDelegate},
    },
};
