//! HTTP exposure of a [`Protocol`].
//!
//! Lifecycle: `Stopped -> Binding -> Listening -> Stopped`. While binding, an
//! "address in use" failure is retried every [`RETRY_INTERVAL`] until the bind
//! succeeds or [`RestServer::close`] cancels the attempt, in which case the
//! pending [`RestServer::listen`] call fails with [`ListenError::Cancelled`].

use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time;
use tracing::{error, info, warn};

use crate::error::ListenError;
use crate::observer::RequestObserver;
use crate::protocol::Protocol;

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const RETRY_INTERVAL: Duration = Duration::from_secs(1);
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

struct Shared {
    protocol: Arc<dyn Protocol>,
    observer: Option<Arc<dyn RequestObserver>>,
}

enum ListenerState {
    Stopped,
    Binding {
        attempt: u64,
        cancel: oneshot::Sender<()>,
    },
    Listening {
        addr: SocketAddr,
        shutdown: oneshot::Sender<()>,
        task: JoinHandle<()>,
    },
}

pub struct RestServer {
    shared: Arc<Shared>,
    state: Mutex<ListenerState>,
    attempts: AtomicU64,
}

impl RestServer {
    /// The server starts stopped; call [`RestServer::listen`] to bind it.
    pub fn new(protocol: Arc<dyn Protocol>) -> Self {
        Self {
            shared: Arc::new(Shared {
                protocol,
                observer: None,
            }),
            state: Mutex::new(ListenerState::Stopped),
            attempts: AtomicU64::new(0),
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn RequestObserver>) -> Self {
        self.shared = Arc::new(Shared {
            protocol: self.shared.protocol.clone(),
            observer: Some(observer),
        });
        self
    }

    pub fn is_listening(&self) -> bool {
        matches!(*self.state.lock(), ListenerState::Listening { .. })
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        match &*self.state.lock() {
            ListenerState::Listening { addr, .. } => Some(*addr),
            _ => None,
        }
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/", post(handle_post))
            .with_state(self.shared.clone())
    }

    /// Bind and start serving. `port` defaults to the protocol's port and
    /// `host` to loopback. Resolves once the socket accepts connections.
    pub async fn listen(
        &self,
        port: Option<u16>,
        host: Option<&str>,
    ) -> Result<SocketAddr, ListenError> {
        let port = port.unwrap_or_else(|| self.shared.protocol.default_port());
        let host = host.unwrap_or(DEFAULT_HOST).to_string();
        let attempt = self.attempts.fetch_add(1, Ordering::Relaxed);
        let (cancel_tx, mut cancel_rx) = oneshot::channel::<()>();
        {
            let mut state = self.state.lock();
            if !matches!(*state, ListenerState::Stopped) {
                return Err(ListenError::AlreadyActive);
            }
            *state = ListenerState::Binding {
                attempt,
                cancel: cancel_tx,
            };
        }
        let _guard = BindingGuard {
            state: &self.state,
            attempt,
        };

        loop {
            let bound = tokio::select! {
                biased;
                _ = &mut cancel_rx => return Err(ListenError::Cancelled),
                bound = TcpListener::bind((host.as_str(), port)) => bound,
            };
            match bound {
                Ok(listener) => return self.start_serving(listener, attempt),
                Err(err) if err.kind() == io::ErrorKind::AddrInUse => {
                    warn!(%host, port, "address in use, retrying in {:?}", RETRY_INTERVAL);
                    tokio::select! {
                        biased;
                        _ = &mut cancel_rx => return Err(ListenError::Cancelled),
                        _ = time::sleep(RETRY_INTERVAL) => {}
                    }
                }
                Err(err) => {
                    warn!(%host, port, error = %err, "bind failed");
                    return Err(ListenError::Bind(err));
                }
            }
        }
    }

    fn start_serving(&self, listener: TcpListener, attempt: u64) -> Result<SocketAddr, ListenError> {
        let addr = listener.local_addr()?;
        let mut state = self.state.lock();
        if !matches!(&*state, ListenerState::Binding { attempt: a, .. } if *a == attempt) {
            return Err(ListenError::Cancelled);
        }

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let app = self.router();
        let task = tokio::spawn(async move {
            let served = axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = shutdown_rx.await;
                })
                .await;
            if let Err(err) = served {
                error!(error = %err, "http listener stopped with error");
            }
        });
        *state = ListenerState::Listening {
            addr,
            shutdown: shutdown_tx,
            task,
        };
        info!(%addr, protocol = self.shared.protocol.name(), "listening");
        Ok(addr)
    }

    /// Stop accepting connections and release the port. A pending retry is
    /// cancelled and its `listen` call fails. Closing a stopped server is a
    /// no-op.
    pub async fn close(&self) {
        let previous = std::mem::replace(&mut *self.state.lock(), ListenerState::Stopped);
        match previous {
            ListenerState::Stopped => {}
            ListenerState::Binding { cancel, .. } => {
                let _ = cancel.send(());
                info!("pending listen attempt cancelled");
            }
            ListenerState::Listening {
                addr,
                shutdown,
                mut task,
            } => {
                let _ = shutdown.send(());
                if time::timeout(SHUTDOWN_GRACE, &mut task).await.is_err() {
                    warn!(%addr, "graceful shutdown timed out, aborting connections");
                    task.abort();
                    let _ = task.await;
                }
                info!(%addr, "listener closed");
            }
        }
    }
}

impl Drop for RestServer {
    fn drop(&mut self) {
        match std::mem::replace(self.state.get_mut(), ListenerState::Stopped) {
            ListenerState::Binding { cancel, .. } => {
                let _ = cancel.send(());
            }
            ListenerState::Listening { shutdown, .. } => {
                let _ = shutdown.send(());
            }
            ListenerState::Stopped => {}
        }
    }
}

/// Resets a `Binding` state left behind when a `listen` future returns early
/// or is dropped.
struct BindingGuard<'a> {
    state: &'a Mutex<ListenerState>,
    attempt: u64,
}

impl Drop for BindingGuard<'_> {
    fn drop(&mut self) {
        let mut state = self.state.lock();
        if matches!(&*state, ListenerState::Binding { attempt, .. } if *attempt == self.attempt) {
            *state = ListenerState::Stopped;
        }
    }
}

async fn handle_post(State(shared): State<Arc<Shared>>, body: Bytes) -> Json<Value> {
    let request: Value = serde_json::from_slice(&body).unwrap_or(Value::Null);
    if let Some(observer) = &shared.observer {
        observer.on_request(&request);
    }
    let response = shared.protocol.handle(request).await;
    if let Some(observer) = &shared.observer {
        observer.on_response(&response);
    }
    Json(response)
}
