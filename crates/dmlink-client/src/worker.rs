//! Camera worker: owns one [`Client`] on a dedicated thread and serves
//! requests from async code.
//!
//! The client's socket calls block, so they never run on the async runtime.
//! Jobs arrive over an mpsc channel and each answers on its own oneshot.
//! A job that outlives its caller's timeout leaves the connection in an
//! unknown state: the handle marks it poisoned and the worker reconnects
//! before running the next job.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};

use dmlink_core::CameraGeometry;

use crate::chunk::Image;
use crate::client::Client;
use crate::error::ClientError;
use crate::script::ScriptReply;

type Job = Box<dyn FnOnce(&mut Client) + Send>;

pub struct CameraWorker {
    client: Client,
    jobs: mpsc::UnboundedReceiver<Job>,
    poisoned: Arc<AtomicBool>,
}

/// Cloneable handle to a running [`CameraWorker`]. Dropping every handle
/// stops the worker, which then hands its client back through the join handle.
#[derive(Clone)]
pub struct CameraHandle {
    jobs: mpsc::UnboundedSender<Job>,
    poisoned: Arc<AtomicBool>,
}

impl CameraWorker {
    /// Move `client` onto a new thread.
    pub fn spawn(client: Client) -> std::io::Result<(CameraHandle, JoinHandle<Client>)> {
        let (tx, rx) = mpsc::unbounded_channel();
        let poisoned = Arc::new(AtomicBool::new(false));
        let worker = CameraWorker {
            client,
            jobs: rx,
            poisoned: poisoned.clone(),
        };
        let thread = thread::Builder::new()
            .name("dmlink-camera".into())
            .spawn(move || worker.run())?;
        Ok((CameraHandle { jobs: tx, poisoned }, thread))
    }

    fn run(mut self) -> Client {
        while let Some(job) = self.jobs.blocking_recv() {
            if self.poisoned.swap(false, Ordering::SeqCst) {
                tracing::info!("reconnecting after an abandoned request");
                if let Err(e) = self.client.reconnect() {
                    tracing::warn!(error = %e, "reconnect failed");
                    self.poisoned.store(true, Ordering::SeqCst);
                }
            }
            job(&mut self.client);
        }
        tracing::debug!("all camera handles dropped, worker exiting");
        self.client
    }
}

impl CameraHandle {
    /// Run `f` on the worker's client and wait for its result.
    pub async fn call<T, F>(&self, f: F) -> Result<T, ClientError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Client) -> Result<T, ClientError> + Send + 'static,
    {
        let reply = self.submit(f)?;
        reply.await.map_err(|_| ClientError::WorkerGone)?
    }

    /// Like [`call`](Self::call), but give up after `timeout`. The job itself
    /// cannot be interrupted; the connection is replaced before the next one.
    pub async fn call_with_timeout<T, F>(&self, timeout: Duration, f: F) -> Result<T, ClientError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Client) -> Result<T, ClientError> + Send + 'static,
    {
        let reply = self.submit(f)?;
        match tokio::time::timeout(timeout, reply).await {
            Ok(result) => result.map_err(|_| ClientError::WorkerGone)?,
            Err(_) => {
                tracing::warn!(?timeout, "camera request timed out; connection poisoned");
                self.poisoned.store(true, Ordering::SeqCst);
                Err(ClientError::Timeout(timeout))
            }
        }
    }

    fn submit<T, F>(&self, f: F) -> Result<oneshot::Receiver<Result<T, ClientError>>, ClientError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Client) -> Result<T, ClientError> + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let job: Job = Box::new(move |client: &mut Client| {
            // The caller may have timed out and dropped the receiver.
            let _ = tx.send(f(client));
        });
        self.jobs.send(job).map_err(|_| ClientError::WorkerGone)?;
        Ok(rx)
    }

    pub fn is_poisoned(&self) -> bool {
        self.poisoned.load(Ordering::SeqCst)
    }

    pub async fn acquire(&self, geometry: CameraGeometry) -> Result<Image, ClientError> {
        self.call(move |c| c.acquire(&geometry)).await
    }

    pub async fn execute_script(&self, script: impl Into<String>) -> Result<ScriptReply, ClientError> {
        let script = script.into();
        self.call(move |c| c.execute_script(&script)).await
    }

    pub async fn dm_version(&self) -> Result<i64, ClientError> {
        self.call(|c| c.dm_version()).await
    }
}
