//! Event source adapter
//!
//! Wraps the cluster-wide watch on core/v1 Events and normalizes it into
//! explicit [`Notification`] messages consumed by a single dispatcher
//! task. The dispatcher is the only writer of the [`EventStore`] and the
//! only steady-state producer for the [`WorkQueue`].

use std::sync::Arc;

use futures::StreamExt;
use k8s_openapi::api::core::v1::Event;
use kube::runtime::{watcher, WatchStreamExt};
use kube::Api;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use super::queue::WorkQueue;
use super::store::EventStore;

/// A normalized change notification from the watch subscription.
#[derive(Debug)]
pub enum Notification {
    /// Object delivered by the initial full list
    Added(Event),
    /// Object applied by the live watch
    Updated(Event),
    /// Object removed
    Deleted(Event),
    /// Initial full list complete, the cache is in sync
    Synced,
}

/// Reconciliation key for a watched object: `namespace/name`, or bare
/// `name` for unnamespaced objects. `None` when the object carries no
/// name, which cannot be reconciled and is dropped by the dispatcher.
#[must_use]
pub fn object_key(event: &Event) -> Option<String> {
    let name = event.metadata.name.as_deref()?;
    match event.metadata.namespace.as_deref() {
        Some(namespace) if !namespace.is_empty() => Some(format!("{namespace}/{name}")),
        _ => Some(name.to_string()),
    }
}

/// Drive the watch subscription, forwarding normalized notifications.
///
/// The watcher re-lists and re-watches on stream interruption by itself;
/// stream-level errors are logged and the subscription continues. Returns
/// when the dispatcher side of the channel is dropped.
pub async fn run_watch(api: Api<Event>, tx: mpsc::Sender<Notification>) {
    let mut stream = watcher(api, watcher::Config::default()).default_backoff().boxed();

    while let Some(item) = stream.next().await {
        let notification = match item {
            Ok(watcher::Event::Init) => continue,
            Ok(watcher::Event::InitApply(event)) => Notification::Added(event),
            Ok(watcher::Event::InitDone) => Notification::Synced,
            Ok(watcher::Event::Apply(event)) => Notification::Updated(event),
            Ok(watcher::Event::Delete(event)) => Notification::Deleted(event),
            Err(err) => {
                warn!(error = %err, "event watch interrupted, retrying");
                continue;
            }
        };
        if tx.send(notification).await.is_err() {
            // Dispatcher is gone, the controller is shutting down.
            return;
        }
    }
}

/// Consume notifications, keeping the cache in sync and feeding the queue.
///
/// Cache write and queue push are deliberately independent: the cache
/// reflects the latest observation even if the key coalesces with one
/// already queued.
pub async fn dispatch(
    mut rx: mpsc::Receiver<Notification>,
    store: Arc<EventStore>,
    queue: Arc<WorkQueue>,
    ready: watch::Sender<bool>,
) {
    while let Some(notification) = rx.recv().await {
        match notification {
            Notification::Added(event) | Notification::Updated(event) => {
                match object_key(&event) {
                    Some(key) => {
                        store.upsert(&key, event);
                        queue.add(key);
                    }
                    None => warn!("dropping event notification without an object name"),
                }
            }
            Notification::Deleted(event) => match object_key(&event) {
                Some(key) => {
                    debug!(key = %key, "event deleted");
                    store.remove(&key);
                    queue.add(key);
                }
                None => warn!("dropping delete notification without an object name"),
            },
            Notification::Synced => {
                info!(cached = store.len(), "initial event list synced");
                let _ = ready.send(true);
            }
        }
    }
}
