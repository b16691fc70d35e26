//! Event reconciliation controller
//!
//! Wires the watch subscription, local cache, work queue, and worker pool
//! together: one watcher task produces notifications, one dispatcher task
//! keeps the cache in sync and feeds the queue, and N workers drain the
//! queue through the Alertmanager handler with bounded, backed-off
//! retries.

use std::future::Future;
use std::sync::Arc;

use k8s_openapi::api::core::v1::Event;
use kube::api::ListParams;
use kube::{Api, Client};
use tokio::sync::{mpsc, watch as watch_channel};
use tracing::{debug, error, info, instrument, warn};

pub mod queue;
pub mod store;
pub mod watch;

pub use queue::{BackoffPolicy, WorkQueue};
pub use store::EventStore;

use crate::error::{Error, Result};
use crate::handlers::alertmanager::AlertManager;
use watch::{dispatch, run_watch};

/// Consecutive delivery failures tolerated before a key is abandoned.
const MAX_RETRIES: u32 = 5;

/// Buffer between the watcher task and the dispatcher.
const NOTIFICATION_BUFFER: usize = 256;

/// Tunables for the reconciliation loop.
#[derive(Debug, Clone)]
pub struct ControllerOptions {
    /// Number of concurrent reconciliation workers
    pub workers: usize,
    /// Backoff applied to failed keys
    pub backoff: BackoffPolicy,
}

impl Default for ControllerOptions {
    fn default() -> Self {
        Self {
            workers: 1,
            backoff: BackoffPolicy::default(),
        }
    }
}

/// The event-to-alert reconciliation controller.
pub struct Controller {
    client: Client,
    handler: Arc<AlertManager>,
    store: Arc<EventStore>,
    queue: Arc<WorkQueue>,
    workers: usize,
}

impl Controller {
    #[must_use]
    pub fn new(client: Client, handler: AlertManager, options: ControllerOptions) -> Self {
        Self {
            client,
            handler: Arc::new(handler),
            store: Arc::new(EventStore::new()),
            queue: Arc::new(WorkQueue::new(options.backoff)),
            workers: options.workers.max(1),
        }
    }

    /// Run the controller until the shutdown future resolves.
    ///
    /// Startup is fail-fast: an unreachable API server surfaces here
    /// before any worker starts. After startup, all errors are isolated
    /// per key and the loop runs until shutdown.
    pub async fn run(self, shutdown: impl Future<Output = ()>) -> Result<()> {
        info!("starting event alerter controller");
        tokio::pin!(shutdown);

        let api: Api<Event> = Api::all(self.client.clone());

        // Probe the API server so an unreachable control plane is a
        // startup error rather than an endless watch retry.
        api.list(&ListParams::default().limit(1)).await?;
        debug!("Kubernetes API server reachable");

        let (tx, rx) = mpsc::channel(NOTIFICATION_BUFFER);
        let (ready_tx, mut ready_rx) = watch_channel::channel(false);

        let watch_task = tokio::spawn(run_watch(api, tx));
        let dispatch_task = tokio::spawn(dispatch(
            rx,
            Arc::clone(&self.store),
            Arc::clone(&self.queue),
            ready_tx,
        ));

        // Workers resolve keys against the cache, so hold them back until
        // the initial full list has been absorbed.
        tokio::select! {
            () = &mut shutdown => {
                info!("shutdown requested before initial sync");
                watch_task.abort();
                dispatch_task.abort();
                return Ok(());
            }
            synced = ready_rx.wait_for(|synced| *synced) => {
                synced.map_err(|_| {
                    Error::InitialSync("event watch ended before the list completed".to_string())
                })?;
            }
        }

        info!(workers = self.workers, "controller synced and ready");

        let mut worker_tasks = Vec::with_capacity(self.workers);
        for worker in 0..self.workers {
            worker_tasks.push(tokio::spawn(run_worker(
                worker,
                Arc::clone(&self.store),
                Arc::clone(&self.queue),
                Arc::clone(&self.handler),
            )));
        }

        shutdown.await;
        info!("shutting down, draining in-flight work");

        self.queue.shut_down();
        watch_task.abort();
        dispatch_task.abort();
        for task in worker_tasks {
            if let Err(err) = task.await {
                error!(error = %err, "worker task join error");
            }
        }

        info!("event alerter controller stopped");
        Ok(())
    }
}

/// Worker loop: dequeue keys until shutdown, classifying each outcome as
/// forget (success), rate-limited retry, or abandonment at the retry
/// ceiling. A handler error never terminates the loop.
#[instrument(skip(store, queue, handler))]
pub async fn run_worker(
    worker: usize,
    store: Arc<EventStore>,
    queue: Arc<WorkQueue>,
    handler: Arc<AlertManager>,
) {
    while let Some(key) = queue.get().await {
        match process_key(&key, &store, &handler).await {
            Ok(()) => queue.forget(&key),
            Err(err) => {
                let requeues = queue.requeues(&key);
                if requeues < MAX_RETRIES {
                    warn!(
                        key = %key,
                        requeues,
                        error = %err,
                        "error processing key, will retry"
                    );
                    queue.add_rate_limited(key.clone());
                } else {
                    // Terminal: surface and abandon, the process keeps going.
                    error!(
                        key = %key,
                        requeues,
                        error = %err,
                        "error processing key, giving up"
                    );
                    queue.forget(&key);
                }
            }
        }
        queue.done(&key);
    }
    debug!("worker stopped");
}

/// Resolve one key against the cache and drive the forward attempt.
/// A cache miss means the event was deleted before processing: done.
async fn process_key(key: &str, store: &EventStore, handler: &AlertManager) -> Result<()> {
    let Some(event) = store.get(key) else {
        debug!(key = %key, "event no longer exists, nothing to forward");
        return Ok(());
    };
    handler.handle(&event).await
}
