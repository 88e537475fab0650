//! HTTP server: listener construction, accept loop, lifecycle callbacks.

use crate::{
    errors::{BoxError, ServerError},
    http::{request::ServerRequest, response::ServerResponse},
    options::ServerOptions,
    server::{group::ListenerGroup, handler::Stream, manager::ConnectionManager},
    tls::TlsEngine,
};
use parking_lot::Mutex;
use socket2::{Domain, Protocol, Socket, Type};
use std::{
    future::Future,
    io,
    net::SocketAddr,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread,
    time::Duration,
};
use tokio::sync::watch;

/// Application request handler.
///
/// One call per completed request message. Calls for the same connection
/// are serialised; calls for different connections run in parallel, so the
/// delegate is shared (`Arc`) and must be `Send + Sync`. Returning an
/// error produces a 500 when nothing has been written yet and drops the
/// connection otherwise.
pub trait ServerDelegate: Send + Sync + 'static {
    fn handle(
        &self,
        request: &mut ServerRequest,
        response: &mut ServerResponse,
    ) -> impl Future<Output = Result<(), BoxError>> + Send;
}

/// Optional observer of server lifecycle events. All methods default to
/// no-ops, so implementors pick the events they care about.
pub trait ServerLifecycleDelegate: Send + Sync {
    fn started(&self, _port: u16) {}
    fn stopped(&self, _port: u16) {}
    fn failed(&self, _port: u16, _error: &ServerError) {}
}

type StartedCallback = Box<dyn Fn(u16) + Send + Sync>;
type StoppedCallback = Box<dyn Fn(u16) + Send + Sync>;
type FailedCallback = Box<dyn Fn(u16, &ServerError) + Send + Sync>;

/// Ordered lists of lifecycle callbacks plus registered trait delegates.
/// Registration happens before `listen`; events fire in registration
/// order, each at most once per server lifecycle.
#[derive(Default)]
pub(crate) struct LifecycleListener {
    started: Vec<StartedCallback>,
    stopped: Vec<StoppedCallback>,
    failed: Vec<FailedCallback>,
    delegates: Vec<Arc<dyn ServerLifecycleDelegate>>,
}

impl LifecycleListener {
    pub(crate) fn fire_started(&self, port: u16) {
        for callback in &self.started {
            callback(port);
        }
        for delegate in &self.delegates {
            delegate.started(port);
        }
    }

    pub(crate) fn fire_stopped(&self, port: u16) {
        for callback in &self.stopped {
            callback(port);
        }
        for delegate in &self.delegates {
            delegate.stopped(port);
        }
    }

    pub(crate) fn fire_failed(&self, port: u16, error: &ServerError) {
        for callback in &self.failed {
            callback(port, error);
        }
        for delegate in &self.delegates {
            delegate.failed(port, error);
        }
    }
}

/// HTTP server under construction. `listen` consumes the builder and
/// returns a [`ServerHandle`] for the running instance.
///
/// # Examples
///
/// ```no_run
/// use wharf::{HttpServer, ServerDelegate, ServerRequest, ServerResponse, BoxError};
/// use std::sync::Arc;
///
/// struct Hello;
///
/// impl ServerDelegate for Hello {
///     async fn handle(
///         &self,
///         _request: &mut ServerRequest,
///         response: &mut ServerResponse,
///     ) -> Result<(), BoxError> {
///         response.write_str("Hello world!")?;
///         response.end()?;
///         Ok(())
///     }
/// }
///
/// let server = HttpServer::new().listen(8080, Arc::new(Hello)).unwrap();
/// wharf::ListenerGroup::wait_for_listeners();
/// # drop(server);
/// ```
#[derive(Default)]
pub struct HttpServer {
    options: ServerOptions,
    tls: Option<TlsEngine>,
    lifecycle: LifecycleListener,
}

impl HttpServer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: ServerOptions) -> Self {
        Self {
            options,
            ..Self::default()
        }
    }

    /// Attaches a TLS engine; every accepted socket is wrapped before any
    /// byte reaches the connection handler.
    pub fn tls(mut self, engine: TlsEngine) -> Self {
        self.tls = Some(engine);
        self
    }

    /// Registers a callback fired once bind+listen has succeeded.
    pub fn on_started(mut self, callback: impl Fn(u16) + Send + Sync + 'static) -> Self {
        self.lifecycle.started.push(Box::new(callback));
        self
    }

    /// Registers a callback fired exactly once after the accept loop exits.
    pub fn on_stopped(mut self, callback: impl Fn(u16) + Send + Sync + 'static) -> Self {
        self.lifecycle.stopped.push(Box::new(callback));
        self
    }

    /// Registers a callback fired before a listen-time error is returned,
    /// and on TLS handshake failures.
    pub fn on_failed(
        mut self,
        callback: impl Fn(u16, &ServerError) + Send + Sync + 'static,
    ) -> Self {
        self.lifecycle.failed.push(Box::new(callback));
        self
    }

    /// Registers a lifecycle delegate; its methods run after the closure
    /// callbacks for each event.
    pub fn lifecycle_delegate(mut self, delegate: Arc<dyn ServerLifecycleDelegate>) -> Self {
        self.lifecycle.delegates.push(delegate);
        self
    }

    /// Binds `port` (0 picks a free port), starts the worker runtime and
    /// the accept loop, and returns a handle to the running server.
    ///
    /// Fires `started` on success. On failure fires `failed` and returns
    /// the error.
    pub fn listen<D: ServerDelegate>(
        self,
        port: u16,
        delegate: Arc<D>,
    ) -> Result<ServerHandle, ServerError> {
        let lifecycle = Arc::new(self.lifecycle);

        let result = Self::start(self.options, self.tls, port, delegate, lifecycle.clone());
        if let Err(err) = &result {
            tracing::error!(port, error = %err, "listen failed");
            lifecycle.fire_failed(port, err);
        }
        result
    }

    fn start<D: ServerDelegate>(
        options: ServerOptions,
        tls: Option<TlsEngine>,
        port: u16,
        delegate: Arc<D>,
        lifecycle: Arc<LifecycleListener>,
    ) -> Result<ServerHandle, ServerError> {
        let std_listener = bind_listener(port, options.backlog).map_err(ServerError::BindFailed)?;

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(options.workers)
            .thread_name("wharf-worker")
            .enable_all()
            .build()
            .map_err(ServerError::BindFailed)?;

        let listener = {
            let _guard = runtime.enter();
            tokio::net::TcpListener::from_std(std_listener).map_err(ServerError::BindFailed)?
        };
        let local_port = listener
            .local_addr()
            .map_err(ServerError::BindFailed)?
            .port();

        let (stop_tx, stop_rx) = watch::channel(false);
        let stopped = Arc::new(AtomicBool::new(false));
        let manager = Arc::new(ConnectionManager::new(options, stop_rx.clone()));

        ListenerGroup::enter();
        lifecycle.fire_started(local_port);
        tracing::debug!(port = local_port, "server listening");

        let accept_thread = {
            let handle = runtime.handle().clone();
            let manager = manager.clone();
            let lifecycle = lifecycle.clone();
            let stopped = stopped.clone();

            thread::Builder::new()
                .name(format!("wharf-accept-{local_port}"))
                .spawn(move || {
                    handle.block_on(accept_loop(
                        listener,
                        manager,
                        delegate,
                        tls,
                        lifecycle.clone(),
                        stopped,
                        stop_rx,
                        local_port,
                    ));
                    lifecycle.fire_stopped(local_port);
                    tracing::debug!(port = local_port, "accept loop exited");
                    ListenerGroup::leave();
                })
        };
        let accept_thread = match accept_thread {
            Ok(thread) => thread,
            Err(e) => {
                ListenerGroup::leave();
                return Err(ServerError::BindFailed(e));
            }
        };

        Ok(ServerHandle {
            port: local_port,
            stopped,
            stop_tx,
            manager,
            runtime: Some(runtime),
            accept_thread: Mutex::new(Some(accept_thread)),
        })
    }
}

/// A running server. Dropping the handle stops the server and shuts the
/// worker runtime down, so hold it (or park on
/// [`ListenerGroup::wait_for_listeners`]) for as long as the server should
/// serve. Intended to live on a non-runtime thread such as `main`.
pub struct ServerHandle {
    port: u16,
    stopped: Arc<AtomicBool>,
    stop_tx: watch::Sender<bool>,
    manager: Arc<ConnectionManager>,
    runtime: Option<tokio::runtime::Runtime>,
    accept_thread: Mutex<Option<thread::JoinHandle<()>>>,
}

impl ServerHandle {
    /// Actual bound port; differs from the requested one when 0 was asked.
    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Connections currently owned by a live handler.
    pub fn active_connections(&self) -> usize {
        self.manager.active_connections()
    }

    /// Stops accepting, closes the listening socket and signals open
    /// connections to close at their next idle point. Idempotent; the
    /// first call blocks until the accept loop has exited (and `stopped`
    /// callbacks have fired).
    pub fn stop(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        let _ = self.stop_tx.send(true);
        if let Some(thread) = self.accept_thread.lock().take() {
            let _ = thread.join();
        }
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        self.stop();
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_timeout(Duration::from_secs(2));
        }
    }
}

fn bind_listener(port: u16, backlog: i32) -> io::Result<std::net::TcpListener> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let socket = Socket::new(Domain::IPV4, Type::STREAM, Some(Protocol::TCP))?;
    socket.set_reuse_address(true)?;
    socket.bind(&addr.into())?;
    socket.listen(backlog)?;
    socket.set_nonblocking(true)?;
    Ok(socket.into())
}

#[allow(clippy::too_many_arguments)]
async fn accept_loop<D: ServerDelegate>(
    listener: tokio::net::TcpListener,
    manager: Arc<ConnectionManager>,
    delegate: Arc<D>,
    tls: Option<TlsEngine>,
    lifecycle: Arc<LifecycleListener>,
    stopped: Arc<AtomicBool>,
    mut stop_rx: watch::Receiver<bool>,
    port: u16,
) {
    loop {
        let accepted = tokio::select! {
            _ = stop_rx.changed() => break,
            result = listener.accept() => result,
        };

        match accepted {
            Ok((stream, remote)) => {
                let _ = stream.set_nodelay(true);
                match &tls {
                    None => manager.handle(Stream::Plain(stream), remote, delegate.clone()),
                    Some(engine) => {
                        let acceptor = engine.acceptor();
                        let manager = manager.clone();
                        let delegate = delegate.clone();
                        let lifecycle = lifecycle.clone();
                        tokio::spawn(async move {
                            match acceptor.accept(stream).await {
                                Ok(tls_stream) => {
                                    manager.handle(Stream::Tls(Box::new(tls_stream)), remote, delegate)
                                }
                                Err(e) => {
                                    let err = ServerError::TlsHandshakeFailed(e.to_string());
                                    tracing::warn!(%remote, error = %err, "handshake rejected");
                                    lifecycle.fire_failed(port, &err);
                                }
                            }
                        });
                    }
                }
            }
            Err(e) if stopped.load(Ordering::SeqCst) => {
                tracing::debug!(port, error = %e, "accept interrupted by shutdown");
                break;
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => continue,
            Err(e) if fd_exhausted(&e) => {
                let err = ServerError::AcceptFailed(e);
                tracing::warn!(port, error = %err, "descriptor limit hit, backing off");
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
            Err(e) => {
                let err = ServerError::AcceptFailed(e);
                tracing::error!(port, error = %err, "accept loop continuing");
            }
        }
    }
}

// EMFILE / ENFILE
fn fd_exhausted(e: &io::Error) -> bool {
    matches!(e.raw_os_error(), Some(23) | Some(24))
}
