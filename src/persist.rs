// Write-behind persistence worker
//
// Mutations hand full snapshots to a background task and return at once.
// The worker drains whatever is queued, keeps the last write per key and
// applies it. Failures are logged and broadcast; nothing is retried because
// the next mutation writes the full state again.

use crate::backend::KeyValueBackend;
use crate::error::StoreError;
use crate::store::StoreEvent;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, warn};

enum Command {
    /// `None` removes the key
    Write {
        key: &'static str,
        value: Option<String>,
    },
    Flush(oneshot::Sender<()>),
}

/// Handle to the background writer; dropping it lets the worker drain and exit
pub struct WriteBehind {
    tx: mpsc::UnboundedSender<Command>,
}

impl WriteBehind {
    /// Spawn the worker on the current tokio runtime
    pub fn spawn(backend: Arc<dyn KeyValueBackend>, events: broadcast::Sender<StoreEvent>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(run(backend, rx, events));
        Self { tx }
    }

    pub fn set(&self, key: &'static str, value: String) {
        self.send(Command::Write {
            key,
            value: Some(value),
        });
    }

    pub fn remove(&self, key: &'static str) {
        self.send(Command::Write { key, value: None });
    }

    /// Wait until every write queued before this call has been applied
    pub async fn flush(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        self.send(Command::Flush(done_tx));
        let _ = done_rx.await;
    }

    fn send(&self, command: Command) {
        if self.tx.send(command).is_err() {
            warn!("Persistence worker is gone; write dropped");
        }
    }
}

async fn run(
    backend: Arc<dyn KeyValueBackend>,
    mut rx: mpsc::UnboundedReceiver<Command>,
    events: broadcast::Sender<StoreEvent>,
) {
    while let Some(first) = rx.recv().await {
        let mut batch = vec![first];
        while let Ok(next) = rx.try_recv() {
            batch.push(next);
        }

        let mut writes: Vec<(&'static str, Option<String>)> = Vec::new();
        let mut waiters = Vec::new();
        let mut queued = 0usize;

        for command in batch {
            match command {
                Command::Write { key, value } => {
                    queued += 1;
                    match writes.iter_mut().find(|(k, _)| *k == key) {
                        Some(slot) => slot.1 = value,
                        None => writes.push((key, value)),
                    }
                }
                Command::Flush(done) => waiters.push(done),
            }
        }

        if queued > writes.len() {
            debug!(queued, applied = writes.len(), "Coalesced queued writes");
        }

        for (key, value) in writes {
            let result = match value {
                Some(value) => backend.set(key, value).await,
                None => backend.remove(key).await,
            };

            if let Err(e) = result {
                warn!(key, error = ?e, "Persist failed; in-memory state remains authoritative");
                let _ = events.send(StoreEvent::PersistFailed(StoreError::write(&e)));
            }
        }

        for done in waiters {
            let _ = done.send(());
        }
    }

    debug!("Persistence worker stopped");
}
