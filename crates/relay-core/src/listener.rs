//! Socket listener and accept loop.
//!
//! The listener binds a TCP or Unix endpoint and accepts connections in a
//! background thread, spawning one worker thread per connection. The
//! returned [`ListenerHandle`] exposes the shutdown surface an external
//! process manager drives: [`stop`](ListenerHandle::stop) (graceful — stop
//! accepting, let in-flight workers finish) and
//! [`halt`](ListenerHandle::halt) (immediate). `serve` can also resume a
//! set of already-accepted connections handed over across a restart.

use std::io;
use std::net::{SocketAddr, TcpListener, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use thiserror::Error;
use tracing::{error, info, warn};

use crate::config::ServerConfig;
use crate::worker::{ConnectionStream, ConnectionWorker};

#[cfg(unix)]
use std::fs;
#[cfg(unix)]
use std::os::fd::{AsRawFd, RawFd};
#[cfg(unix)]
use std::os::unix::net::UnixListener;
#[cfg(unix)]
use std::path::{Path, PathBuf};

/// Tracing target for listener activity.
pub(crate) const LISTENER_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::listener");

const ACCEPT_BACKOFF: Duration = Duration::from_millis(25);
const ERROR_BACKOFF: Duration = Duration::from_millis(150);

/// Where the server listens.
#[derive(Debug, Clone)]
pub enum Endpoint {
    /// TCP host and port.
    Tcp {
        /// Host name or address to bind.
        host: String,
        /// Port to bind; 0 asks the OS for a free port.
        port: u16,
    },
    /// Unix domain socket path.
    #[cfg(unix)]
    Unix {
        /// Filesystem path of the socket.
        path: PathBuf,
    },
}

impl Endpoint {
    /// Builds a TCP endpoint.
    pub fn tcp(host: impl Into<String>, port: u16) -> Self {
        Self::Tcp {
            host: host.into(),
            port,
        }
    }

    /// Builds a Unix domain socket endpoint.
    #[cfg(unix)]
    pub fn unix(path: impl Into<PathBuf>) -> Self {
        Self::Unix { path: path.into() }
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Tcp { host, port } => write!(f, "tcp://{host}:{port}"),
            #[cfg(unix)]
            Self::Unix { path } => write!(f, "unix://{}", path.display()),
        }
    }
}

/// Errors surfaced while binding or running the listener.
#[derive(Debug, Error)]
pub enum ListenerError {
    /// Host name did not resolve.
    #[error("failed to resolve TCP address {host}:{port}: {source}")]
    Resolve {
        /// Host that failed to resolve.
        host: String,
        /// Port being bound.
        port: u16,
        /// Underlying resolver error.
        #[source]
        source: io::Error,
    },
    /// Host name resolved to no usable addresses.
    #[error("no TCP addresses resolved for {host}:{port}")]
    ResolveEmpty {
        /// Host that resolved empty.
        host: String,
        /// Port being bound.
        port: u16,
    },
    /// TCP bind failed.
    #[error("failed to bind TCP listener at {addr}: {source}")]
    BindTcp {
        /// Address that failed to bind.
        addr: SocketAddr,
        /// Underlying bind error.
        #[source]
        source: io::Error,
    },
    /// Switching the listener to non-blocking mode failed.
    #[error("failed to enable non-blocking listener: {source}")]
    NonBlocking {
        /// Underlying socket error.
        #[source]
        source: io::Error,
    },
    /// Unix bind failed.
    #[cfg(unix)]
    #[error("failed to bind unix listener at {path}: {source}")]
    BindUnix {
        /// Socket path that failed to bind.
        path: String,
        /// Underlying bind error.
        #[source]
        source: io::Error,
    },
    /// An existing unix socket at the path is still serving.
    #[cfg(unix)]
    #[error("existing unix socket {path} is already in use")]
    UnixInUse {
        /// Socket path already in use.
        path: String,
    },
    /// Removing a stale unix socket failed.
    #[cfg(unix)]
    #[error("failed to remove stale unix socket {path}: {source}")]
    UnixCleanup {
        /// Socket path that could not be removed.
        path: String,
        /// Underlying filesystem error.
        #[source]
        source: io::Error,
    },
    /// The accept-loop thread panicked.
    #[error("listener thread panicked")]
    ThreadPanic,
}

/// Listener bound to an endpoint, ready to serve.
#[derive(Debug)]
pub struct SocketListener {
    endpoint: Endpoint,
    listener: ListenerKind,
}

#[derive(Debug)]
enum ListenerKind {
    Tcp(TcpListener),
    #[cfg(unix)]
    Unix(UnixListener),
}

impl SocketListener {
    /// Binds the endpoint.
    ///
    /// For unix endpoints a stale socket file left by a dead process is
    /// removed; a socket that still accepts connections is an error.
    ///
    /// # Errors
    ///
    /// Returns a [`ListenerError`] describing the resolution or bind
    /// failure.
    pub fn bind(endpoint: &Endpoint) -> Result<Self, ListenerError> {
        let listener = match endpoint {
            Endpoint::Tcp { host, port } => ListenerKind::Tcp(bind_tcp(host, *port)?),
            #[cfg(unix)]
            Endpoint::Unix { path } => ListenerKind::Unix(bind_unix(path)?),
        };
        Ok(Self {
            endpoint: endpoint.clone(),
            listener,
        })
    }

    /// Wraps an already-bound TCP listener, e.g. one inherited across an
    /// exec from an external process manager.
    #[must_use]
    pub fn from_tcp(listener: TcpListener, endpoint: Endpoint) -> Self {
        Self {
            endpoint,
            listener: ListenerKind::Tcp(listener),
        }
    }

    /// The local address, when the endpoint is TCP.
    #[must_use]
    pub fn local_addr(&self) -> Option<SocketAddr> {
        match &self.listener {
            ListenerKind::Tcp(listener) => listener.local_addr().ok(),
            #[cfg(unix)]
            ListenerKind::Unix(_) => None,
        }
    }

    /// Starts serving: dispatches any resumed in-flight connections, then
    /// accepts new ones until stopped.
    ///
    /// # Errors
    ///
    /// Returns [`ListenerError::NonBlocking`] when the accept socket cannot
    /// be switched to non-blocking mode.
    pub fn serve(
        self,
        config: Arc<ServerConfig>,
        resumed: Vec<ConnectionStream>,
    ) -> Result<ListenerHandle, ListenerError> {
        match &self.listener {
            ListenerKind::Tcp(listener) => listener.set_nonblocking(true),
            #[cfg(unix)]
            ListenerKind::Unix(listener) => listener.set_nonblocking(true),
        }
        .map_err(|source| ListenerError::NonBlocking { source })?;

        let shared = Arc::new(ListenerShared {
            shutdown: AtomicBool::new(false),
            halted: AtomicBool::new(false),
            workers: Mutex::new(Vec::new()),
            #[cfg(unix)]
            clients: Mutex::new(Vec::new()),
        });

        #[cfg(unix)]
        let listener_fd = match &self.listener {
            ListenerKind::Tcp(listener) => listener.as_raw_fd(),
            ListenerKind::Unix(listener) => listener.as_raw_fd(),
        };

        for stream in resumed {
            dispatch(&shared, Arc::clone(&config), stream);
        }

        let loop_shared = Arc::clone(&shared);
        let loop_config = Arc::clone(&config);
        let handle = thread::spawn(move || run_accept_loop(self, &loop_shared, &loop_config));

        Ok(ListenerHandle {
            shared,
            accept_thread: Some(handle),
            #[cfg(unix)]
            listener_fd,
        })
    }
}

/// State shared between the handle, the accept loop, and worker wrappers.
struct ListenerShared {
    shutdown: AtomicBool,
    halted: AtomicBool,
    workers: Mutex<Vec<thread::JoinHandle<()>>>,
    #[cfg(unix)]
    clients: Mutex<Vec<RawFd>>,
}

/// Handle to a serving listener.
pub struct ListenerHandle {
    shared: Arc<ListenerShared>,
    accept_thread: Option<thread::JoinHandle<()>>,
    #[cfg(unix)]
    listener_fd: RawFd,
}

/// Cloneable shutdown surface for a serving listener.
///
/// Lets an external signal or process-management layer stop the server while
/// another thread holds the [`ListenerHandle`] for joining.
#[derive(Clone)]
pub struct ListenerControl {
    shared: Arc<ListenerShared>,
}

impl ListenerControl {
    /// Graceful shutdown: stop accepting; in-flight workers finish.
    pub fn stop(&self) {
        self.shared.shutdown.store(true, Ordering::SeqCst);
    }

    /// Immediate shutdown: stop accepting and abandon in-flight workers.
    pub fn halt(&self) {
        self.shared.halted.store(true, Ordering::SeqCst);
        self.shared.shutdown.store(true, Ordering::SeqCst);
    }
}

impl std::fmt::Debug for ListenerControl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerControl").finish_non_exhaustive()
    }
}

impl ListenerHandle {
    /// Returns a cloneable control for stopping this listener.
    #[must_use]
    pub fn control(&self) -> ListenerControl {
        ListenerControl {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Graceful shutdown: stop accepting; in-flight workers finish and are
    /// joined by [`ListenerHandle::join`].
    pub fn stop(&self) {
        self.shared.shutdown.store(true, Ordering::SeqCst);
    }

    /// Immediate shutdown: stop accepting and abandon in-flight workers.
    pub fn halt(&self) {
        self.shared.halted.store(true, Ordering::SeqCst);
        self.shared.shutdown.store(true, Ordering::SeqCst);
    }

    /// Currently-open descriptors (listener first, then in-flight clients),
    /// for an external process manager to hand to a freshly exec'd process.
    #[cfg(unix)]
    #[must_use]
    pub fn descriptors(&self) -> Vec<RawFd> {
        let mut fds = vec![self.listener_fd];
        if let Ok(clients) = self.shared.clients.lock() {
            fds.extend(clients.iter().copied());
        }
        fds
    }

    /// Waits for the accept loop and, unless halted, all in-flight workers.
    ///
    /// # Errors
    ///
    /// Returns [`ListenerError::ThreadPanic`] when the accept-loop thread
    /// panicked.
    pub fn join(mut self) -> Result<(), ListenerError> {
        if let Some(handle) = self.accept_thread.take() {
            handle.join().map_err(|_| ListenerError::ThreadPanic)?;
        }
        if self.shared.halted.load(Ordering::SeqCst) {
            return Ok(());
        }
        let workers = {
            let Ok(mut guard) = self.shared.workers.lock() else {
                return Ok(());
            };
            std::mem::take(&mut *guard)
        };
        for worker in workers {
            // A worker panic already only affected its own connection.
            let _ = worker.join();
        }
        Ok(())
    }
}

impl Drop for ListenerHandle {
    fn drop(&mut self) {
        self.shared.shutdown.store(true, Ordering::SeqCst);
    }
}

/// Spawns a worker thread for one connection and tracks it.
fn dispatch(shared: &Arc<ListenerShared>, config: Arc<ServerConfig>, stream: ConnectionStream) {
    #[cfg(unix)]
    let fd = raw_fd(&stream);
    #[cfg(unix)]
    if let Ok(mut clients) = shared.clients.lock() {
        clients.push(fd);
    }

    let worker_shared = Arc::clone(shared);
    let handle = thread::spawn(move || {
        let worker = ConnectionWorker::new(config);
        if let Err(failure) = worker.handle(stream) {
            error!(target: LISTENER_TARGET, error = %failure, "connection worker failed");
        }
        #[cfg(unix)]
        if let Ok(mut clients) = worker_shared.clients.lock() {
            clients.retain(|client| *client != fd);
        }
        #[cfg(not(unix))]
        let _ = worker_shared;
    });
    if let Ok(mut workers) = shared.workers.lock() {
        workers.retain(|worker| !worker.is_finished());
        workers.push(handle);
    }
}

#[cfg(unix)]
fn raw_fd(stream: &ConnectionStream) -> RawFd {
    match stream {
        ConnectionStream::Tcp(tcp) => tcp.as_raw_fd(),
        ConnectionStream::Unix(unix) => unix.as_raw_fd(),
    }
}

fn run_accept_loop(listener: SocketListener, shared: &Arc<ListenerShared>, config: &Arc<ServerConfig>) {
    info!(
        target: LISTENER_TARGET,
        endpoint = %listener.endpoint,
        "listener active"
    );
    let mut last_error = None::<io::ErrorKind>;
    while !shared.shutdown.load(Ordering::SeqCst) {
        match accept_connection(&listener) {
            Ok(Some(stream)) => {
                last_error = None;
                dispatch(shared, Arc::clone(config), stream);
            }
            Ok(None) => thread::sleep(ACCEPT_BACKOFF),
            Err(accept_error) => {
                let kind = accept_error.kind();
                if last_error != Some(kind) {
                    warn!(
                        target: LISTENER_TARGET,
                        error = %accept_error,
                        "accept error"
                    );
                }
                last_error = Some(kind);
                thread::sleep(ERROR_BACKOFF);
            }
        }
    }

    #[cfg(unix)]
    cleanup_unix_socket(&listener.endpoint);
    info!(target: LISTENER_TARGET, "listener stopped");
}

fn accept_connection(listener: &SocketListener) -> io::Result<Option<ConnectionStream>> {
    match &listener.listener {
        ListenerKind::Tcp(tcp) => match tcp.accept() {
            Ok((stream, _)) => {
                stream.set_nonblocking(false)?;
                Ok(Some(ConnectionStream::Tcp(stream)))
            }
            Err(accept_error) if accept_error.kind() == io::ErrorKind::WouldBlock => Ok(None),
            Err(accept_error) => Err(accept_error),
        },
        #[cfg(unix)]
        ListenerKind::Unix(unix) => match unix.accept() {
            Ok((stream, _)) => {
                stream.set_nonblocking(false)?;
                Ok(Some(ConnectionStream::Unix(stream)))
            }
            Err(accept_error) if accept_error.kind() == io::ErrorKind::WouldBlock => Ok(None),
            Err(accept_error) => Err(accept_error),
        },
    }
}

fn bind_tcp(host: &str, port: u16) -> Result<TcpListener, ListenerError> {
    let mut addrs = (host, port)
        .to_socket_addrs()
        .map_err(|source| ListenerError::Resolve {
            host: host.to_owned(),
            port,
            source,
        })?;
    let addr = addrs
        .find(|addr| matches!(addr, SocketAddr::V4(_) | SocketAddr::V6(_)))
        .ok_or_else(|| ListenerError::ResolveEmpty {
            host: host.to_owned(),
            port,
        })?;
    TcpListener::bind(addr).map_err(|source| ListenerError::BindTcp { addr, source })
}

#[cfg(unix)]
fn bind_unix(path: &Path) -> Result<UnixListener, ListenerError> {
    use std::os::unix::net::UnixStream;

    if path.exists() {
        match UnixStream::connect(path) {
            Ok(_live) => {
                return Err(ListenerError::UnixInUse {
                    path: path.display().to_string(),
                });
            }
            Err(connect_error)
                if connect_error.kind() == io::ErrorKind::ConnectionRefused
                    || connect_error.kind() == io::ErrorKind::NotFound =>
            {
                fs::remove_file(path).map_err(|source| ListenerError::UnixCleanup {
                    path: path.display().to_string(),
                    source,
                })?;
            }
            Err(connect_error) => {
                return Err(ListenerError::BindUnix {
                    path: path.display().to_string(),
                    source: connect_error,
                });
            }
        }
    }

    UnixListener::bind(path).map_err(|source| ListenerError::BindUnix {
        path: path.display().to_string(),
        source,
    })
}

#[cfg(unix)]
fn cleanup_unix_socket(endpoint: &Endpoint) {
    let Endpoint::Unix { path } = endpoint else {
        return;
    };
    if let Err(remove_error) = fs::remove_file(path)
        && remove_error.kind() != io::ErrorKind::NotFound
    {
        warn!(
            target: LISTENER_TARGET,
            error = %remove_error,
            path = %path.display(),
            "failed to remove unix socket file"
        );
    }
}
