use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;

use tokio::net::TcpListener;
use tokio::sync::oneshot;

use dmlink_core::{FunctionCode, Message};

use crate::script::ScriptEngine;
use crate::session;
use crate::{SimOptions, SimStats};

/// State shared by every connection to one simulated host.
pub(crate) struct SimState {
    pub(crate) options: SimOptions,
    stats: Mutex<SimStats>,
    engine: Mutex<ScriptEngine>,
    inserted: Mutex<HashMap<i64, bool>>,
}

/// A poisoned lock only means a connection task panicked; the data is still usable.
fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

impl SimState {
    fn new(options: SimOptions) -> Self {
        let engine = ScriptEngine::new(options.script_functions.clone());
        Self {
            options,
            stats: Mutex::new(SimStats::default()),
            engine: Mutex::new(engine),
            inserted: Mutex::new(HashMap::new()),
        }
    }

    pub(crate) fn record(&self, request: &Message) {
        let mut stats = lock(&self.stats);
        *stats.requests.entry(request.head()).or_default() += 1;
        if request.head() == FunctionCode::ChunkHandshake.code() {
            stats.handshakes += 1;
        } else {
            stats.last_request = Some(request.clone());
        }
    }

    pub(crate) fn run_script(&self, script: String) -> f64 {
        let value = lock(&self.engine).evaluate(&script);
        lock(&self.stats).scripts.push(script);
        value
    }

    pub(crate) fn inserted(&self, camera: i64) -> bool {
        lock(&self.inserted).get(&camera).copied().unwrap_or(true)
    }

    pub(crate) fn set_inserted(&self, camera: i64, inserted: bool) {
        lock(&self.inserted).insert(camera, inserted);
    }

    pub(crate) fn chunk_sent(&self) {
        lock(&self.stats).chunks_sent += 1;
    }

    fn connected(&self) {
        lock(&self.stats).connections += 1;
    }
}

/// A bound, not yet serving, simulated host.
pub struct SimHost {
    listener: TcpListener,
    state: Arc<SimState>,
}

impl SimHost {
    pub async fn bind(addr: SocketAddr, options: SimOptions) -> io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self {
            listener,
            state: Arc::new(SimState::new(options)),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept connections until the task is dropped. Each connection is
    /// served on its own task; connections are independent sessions.
    pub async fn serve(self) -> io::Result<()> {
        loop {
            let (stream, peer) = self.listener.accept().await?;
            tracing::info!(%peer, "client connected");
            self.state.connected();
            let state = self.state.clone();
            tokio::spawn(async move {
                match session::serve_connection(stream, state).await {
                    Ok(()) => tracing::info!(%peer, "client disconnected"),
                    Err(e) => tracing::debug!(%peer, error = %e, "connection ended"),
                }
            });
        }
    }

    /// Bind a loopback port and serve it from a background thread with its
    /// own runtime. The host stops when the handle is dropped.
    pub fn spawn(options: SimOptions) -> io::Result<SimHandle> {
        let listener = std::net::TcpListener::bind("127.0.0.1:0")?;
        listener.set_nonblocking(true)?;
        let port = listener.local_addr()?.port();
        let state = Arc::new(SimState::new(options));
        let (stop_tx, stop_rx) = oneshot::channel::<()>();

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        let thread_state = state.clone();
        let thread = std::thread::Builder::new()
            .name("dmlink-sim".into())
            .spawn(move || {
                runtime.block_on(async move {
                    let listener = match TcpListener::from_std(listener) {
                        Ok(l) => l,
                        Err(e) => {
                            tracing::error!(error = %e, "simulated host failed to start");
                            return;
                        }
                    };
                    let host = SimHost {
                        listener,
                        state: thread_state,
                    };
                    tokio::select! {
                        _ = stop_rx => {}
                        result = host.serve() => {
                            if let Err(e) = result {
                                tracing::error!(error = %e, "simulated host stopped");
                            }
                        }
                    }
                });
            })?;

        Ok(SimHandle {
            port,
            state,
            stop: Some(stop_tx),
            thread: Some(thread),
        })
    }
}

/// A simulated host running on a background thread.
pub struct SimHandle {
    port: u16,
    state: Arc<SimState>,
    stop: Option<oneshot::Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl SimHandle {
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Snapshot of the statistics so far.
    pub fn stats(&self) -> SimStats {
        lock(&self.state.stats).clone()
    }

    /// Snapshot of the script interpreter, notes and filter state included.
    pub fn engine(&self) -> ScriptEngine {
        lock(&self.state.engine).clone()
    }

    pub fn options(&self) -> &SimOptions {
        &self.state.options
    }

    pub fn shutdown(mut self) {
        self.stop_and_join();
    }

    fn stop_and_join(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for SimHandle {
    fn drop(&mut self) {
        self.stop_and_join();
    }
}
