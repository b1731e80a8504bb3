use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use log::{debug, error, info, warn};
use tokio::{sync::mpsc, time::Instant};
use tokio_util::sync::CancellationToken;

use crate::{
    config::BatcherSettings, error::is_permanent, utils::format_ts, worker::events::BatchEvent,
};

/// Consumer of flushed batches.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn on_batch(&self, batch: &BatchEvent) -> anyhow::Result<()>;
}

/// Merges incoming [`BatchEvent`]s and hands them to an [`EventHandler`]
/// once enough events piled up or the flush timer fires.
pub struct Batcher {
    handler: Arc<dyn EventHandler>,
    receiver: mpsc::Receiver<BatchEvent>,
    batch_size: usize,
    batch_timeout: Duration,
    interval_error: Duration,
    pending: Option<BatchEvent>,
}

impl Batcher {
    pub fn new(
        handler: Arc<dyn EventHandler>,
        settings: &BatcherSettings,
        receiver: mpsc::Receiver<BatchEvent>,
    ) -> Self {
        Self {
            handler,
            receiver,
            batch_size: settings.batch_size.max(1),
            batch_timeout: Duration::from_secs(settings.batch_timeout_secs),
            interval_error: Duration::from_secs(settings.interval_error_secs),
            pending: None,
        }
    }

    pub async fn run(mut self, cancellation_token: CancellationToken) -> anyhow::Result<()> {
        info!(
            "[BATCHER] Started (size {}, timeout {:?})",
            self.batch_size, self.batch_timeout
        );

        let timer = tokio::time::sleep(self.batch_timeout);
        tokio::pin!(timer);

        loop {
            tokio::select! {
                biased;

                _ = cancellation_token.cancelled() => break,

                msg = self.receiver.recv() => match msg {
                    Some(event) => {
                        self.push(event);

                        if self.pending_len() >= self.batch_size {
                            if !self.must_flush(&cancellation_token).await {
                                break;
                            }
                            timer.as_mut().reset(Instant::now() + self.batch_timeout);
                        }
                    },
                    None => {
                        info!("[BATCHER] Emitter channel closed, flushing remaining events");
                        self.must_flush(&cancellation_token).await;
                        break;
                    },
                },

                _ = &mut timer => {
                    if !self.must_flush(&cancellation_token).await {
                        break;
                    }
                    timer.as_mut().reset(Instant::now() + self.batch_timeout);
                }
            }
        }

        if let Some(batch) = &self.pending {
            warn!(
                "[BATCHER] Dropping unflushed batch up to window {} ({} events)",
                format_ts(batch.window.timestamp),
                batch.len()
            );
        }

        info!("[BATCHER] Stopped");
        Ok(())
    }

    fn push(&mut self, event: BatchEvent) {
        match self.pending.as_mut() {
            Some(batch) => batch.merge(event),
            None => self.pending = Some(event),
        }
    }

    fn pending_len(&self) -> usize {
        self.pending.as_ref().map_or(0, BatchEvent::len)
    }

    /// Hand the pending batch to the handler until it is accepted.
    ///
    /// Returns `false` when cancelled; the batch stays pending then.
    async fn must_flush(&mut self, cancellation_token: &CancellationToken) -> bool {
        let Some(batch) = self.pending.as_ref() else {
            return true;
        };

        let ts = format_ts(batch.window.timestamp);

        loop {
            let start = Instant::now();

            let handled = tokio::select! {
                biased;

                _ = cancellation_token.cancelled() => return false,

                res = self.handler.on_batch(batch) => res,
            };

            match handled {
                Ok(()) => {
                    info!(
                        "[BATCHER] Flushed {} trades and {} liquidities up to window {} in {:?}",
                        batch.trades.len(),
                        batch.liquidities.len(),
                        ts,
                        start.elapsed()
                    );
                    self.pending = None;
                    return true;
                },
                Err(e) => {
                    if is_permanent(&e) {
                        error!("[BATCHER] Cannot handle batch up to window {}: {:#}", ts, e);
                    } else {
                        warn!("[BATCHER] Failed to handle batch up to window {}: {:#}", ts, e);
                    }

                    tokio::select! {
                        biased;

                        _ = cancellation_token.cancelled() => return false,

                        _ = tokio::time::sleep(self.interval_error) => {
                            debug!("[BATCHER] Retrying batch up to window {}", ts);
                        }
                    }
                },
            }
        }
    }
}
