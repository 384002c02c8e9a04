//! The consumer context: one serialized task owning every registry.
//!
//! Anything that wants to touch a registry (change signals from polling
//! threads, client writes from the protocol layer) submits a
//! [`ConsumerTask`] through a [`ConsumerHandle`]. The [`ConsumerLoop`] drains
//! the queue strictly in order, so diff-and-apply runs for one device are
//! never concurrent with each other or with client writes.

use super::composer::Thing;
use super::value::PropertyValue;
use crate::error::{BridgeError, Result};
use log::{debug, error, info, warn};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

/// Work scheduled onto the consumer context.
#[derive(Debug)]
pub enum ConsumerTask {
    /// Run diff-and-apply for the thing with this key.
    Refresh(usize),
    /// A client wrote a property.
    ClientWrite {
        /// Thing id or slug
        thing: String,
        name: String,
        value: PropertyValue,
        /// Receives the immediate acknowledgment (accepted and forwarded, or rejected)
        ack: Option<oneshot::Sender<Result<()>>>,
    },
}

/// Cloneable, thread-safe submission side of the consumer context.
#[derive(Clone, Debug)]
pub struct ConsumerHandle {
    tx: mpsc::UnboundedSender<ConsumerTask>,
}

impl ConsumerHandle {
    /// Queue a task. Never blocks.
    pub fn submit(&self, task: ConsumerTask) -> Result<()> {
        self.tx.send(task).map_err(|_| BridgeError::ConsumerClosed)
    }

    /// Submit a client write and wait for its acknowledgment.
    pub async fn write(
        &self,
        thing: impl Into<String>,
        name: impl Into<String>,
        value: PropertyValue,
    ) -> Result<()> {
        let (ack, ack_rx) = oneshot::channel();
        self.submit(ConsumerTask::ClientWrite {
            thing: thing.into(),
            name: name.into(),
            value,
            ack: Some(ack),
        })?;
        ack_rx.await.map_err(|_| BridgeError::ConsumerClosed)?
    }
}

/// Receiving side of the consumer context.
pub struct ConsumerLoop {
    rx: mpsc::UnboundedReceiver<ConsumerTask>,
}

/// Create a connected handle/loop pair.
pub fn consumer_channel() -> (ConsumerHandle, ConsumerLoop) {
    let (tx, rx) = mpsc::unbounded_channel();
    (ConsumerHandle { tx }, ConsumerLoop { rx })
}

impl ConsumerLoop {
    /// Run until cancelled or until every handle is dropped.
    ///
    /// Tasks still queued at that point are dropped.
    pub async fn run(mut self, mut things: Vec<Thing>, cancel: CancellationToken) {
        info!("[Bridge] Consumer running for {} thing(s)", things.len());
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("[Bridge] Consumer cancelled");
                    break;
                }
                task = self.rx.recv() => match task {
                    Some(task) => Self::process(&mut things, task),
                    None => {
                        info!("[Bridge] All consumer handles dropped");
                        break;
                    }
                }
            }
        }
    }

    /// Process every task queued right now and return how many ran.
    pub fn drain(&mut self, things: &mut [Thing]) -> usize {
        let mut processed = 0;
        while let Ok(task) = self.rx.try_recv() {
            Self::process(things, task);
            processed += 1;
        }
        processed
    }

    #[cfg(test)]
    pub(crate) fn try_next(&mut self) -> Option<ConsumerTask> {
        self.rx.try_recv().ok()
    }

    fn process(things: &mut [Thing], task: ConsumerTask) {
        match task {
            ConsumerTask::Refresh(key) => {
                let Some(Thing { registry, bridge }) = things.get_mut(key) else {
                    warn!("[Bridge] Refresh for unknown thing key {}", key);
                    return;
                };
                match bridge.diff_and_apply(registry) {
                    Ok(applied) => {
                        debug!("[Bridge] {}: {} update(s)", registry.thing().title, applied)
                    }
                    Err(e) => error!("[Bridge] {}: apply failed: {}", registry.thing().title, e),
                }
            }
            ConsumerTask::ClientWrite {
                thing,
                name,
                value,
                ack,
            } => {
                let result = match things
                    .iter()
                    .find(|t| t.registry.thing().id == thing || t.registry.thing().slug == thing)
                {
                    Some(t) => t.registry.write_requested(&name, value),
                    None => Err(BridgeError::UnknownThing(thing.clone())),
                };
                if let Err(e) = &result {
                    warn!("[Bridge] Rejected write of {} on {}: {}", name, thing, e);
                }
                if let Some(ack) = ack {
                    let _ = ack.send(result);
                }
            }
        }
    }
}
