use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use alloy::primitives::Address;
use anyhow::{bail, Context};
use futures::future::try_join_all;
use log::{debug, info, warn};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::{
    config::PollerSettings,
    source::{
        fetch_all_liquidities, fetch_all_trades, ActivitySource, BlockNumberSource, Closest,
    },
    utils::format_ts,
    worker::events::{PoolActivity, Snapshot, Window},
};

/// Delay before the next poll once a window was delivered.
const MIN_DELAY: Duration = Duration::from_millis(1);

/// Turns consecutive time windows into [`Snapshot`]s.
///
/// A window is only handed downstream once every pool and both block bounds
/// were fetched; on any failure the same window is retried.
pub struct Poller {
    source: Arc<dyn ActivitySource>,
    blocks: Arc<dyn BlockNumberSource>,
    pools: Vec<Address>,
    sender: mpsc::Sender<Snapshot>,
    interval_error: Duration,
    interval_idle: Duration,
    page_limit: Option<usize>,
    interval: i64,
    next_timestamp: i64,
    last_max_block: Option<u64>,
}

impl Poller {
    /// Resume one window after `checkpoint`, or from the first window the
    /// contract-data service has when nothing was committed yet.
    pub async fn new(
        source: Arc<dyn ActivitySource>,
        blocks: Arc<dyn BlockNumberSource>,
        pools: Vec<Address>,
        checkpoint: Option<i64>,
        settings: &PollerSettings,
        sender: mpsc::Sender<Snapshot>,
    ) -> anyhow::Result<Self> {
        if pools.is_empty() {
            bail!("No pools configured, add pool weights before starting");
        }

        let interval = source
            .snapshot_interval()
            .await
            .context("Failed to query snapshot interval")?;

        if interval <= 0 {
            bail!("Invalid snapshot interval {}", interval);
        }

        let next_timestamp = match checkpoint {
            Some(ts) => ts + interval,
            None => source
                .first_timestamp()
                .await
                .context("Failed to query first timestamp")?,
        };

        Ok(Self {
            source,
            blocks,
            pools,
            sender,
            interval_error: settings.interval_error(),
            interval_idle: settings.interval_idle(),
            page_limit: settings.page_limit,
            interval,
            next_timestamp,
            last_max_block: None,
        })
    }

    pub fn next_timestamp(&self) -> i64 {
        self.next_timestamp
    }

    pub fn interval(&self) -> i64 {
        self.interval
    }

    pub async fn run(mut self, cancellation_token: CancellationToken) -> anyhow::Result<()> {
        info!(
            "[POLLER] Started at {} for {} pools, interval {}s",
            format_ts(self.next_timestamp),
            self.pools.len(),
            self.interval
        );

        let mut delay = Duration::ZERO;

        loop {
            tokio::select! {
                biased;

                _ = cancellation_token.cancelled() => break,

                _ = tokio::time::sleep(delay) => {}
            }

            let start = Instant::now();

            // Dropping the poll future cancels every in-flight request
            let polled = tokio::select! {
                biased;

                _ = cancellation_token.cancelled() => break,

                res = self.poll() => res,
            };

            match polled {
                Ok(Some(snapshot)) => {
                    let window = snapshot.window;

                    tokio::select! {
                        biased;

                        _ = cancellation_token.cancelled() => break,

                        res = self.sender.send(snapshot) => {
                            if res.is_err() {
                                info!("[POLLER] Emitter channel closed");
                                break;
                            }
                        }
                    }

                    info!(
                        "[POLLER] Window {} done, blocks {}..={} in {:?}",
                        format_ts(window.timestamp),
                        window.min_block,
                        window.max_block,
                        start.elapsed()
                    );

                    self.next_timestamp += self.interval;
                    self.last_max_block = Some(window.max_block);
                    delay = MIN_DELAY;
                },
                Ok(None) => {
                    debug!(
                        "[POLLER] Window {} not available yet",
                        format_ts(self.next_timestamp)
                    );
                    delay = self.interval_idle;
                },
                Err(e) => {
                    warn!(
                        "[POLLER] Failed to poll window {}: {:#}",
                        format_ts(self.next_timestamp),
                        e
                    );
                    delay = self.interval_error;
                },
            }
        }

        info!("[POLLER] Stopped at {}", format_ts(self.next_timestamp));
        Ok(())
    }

    /// Fetch the next window, `None` when the service has not reached it yet.
    async fn poll(&self) -> anyhow::Result<Option<Snapshot>> {
        let timestamp = self.next_timestamp;

        let latest = self
            .source
            .latest_timestamp()
            .await
            .context("Failed to poll latest timestamp")?;

        if timestamp > latest {
            return Ok(None);
        }

        let min_block = async {
            match self.last_max_block {
                Some(block) => Ok(block + 1),
                None => self
                    .blocks
                    .block_number_by_time(timestamp - self.interval, Closest::After)
                    .await
                    .context("Failed to query min block number"),
            }
        };

        let max_block = async {
            self.blocks
                .block_number_by_time(timestamp - 1, Closest::Before)
                .await
                .context("Failed to query max block number")
        };

        let pools = try_join_all(
            self.pools
                .iter()
                .map(|&pool| self.poll_pool(pool, timestamp)),
        );

        let (min_block, max_block, pools) = tokio::try_join!(min_block, max_block, pools)?;

        Ok(Some(Snapshot {
            window: Window {
                timestamp,
                interval: self.interval,
                min_block,
                max_block,
            },
            pools,
        }))
    }

    async fn poll_pool(&self, pool: Address, timestamp: i64) -> anyhow::Result<PoolActivity> {
        let (trades, liquidities) = tokio::try_join!(
            fetch_all_trades(self.source.as_ref(), pool, timestamp, self.page_limit),
            fetch_all_liquidities(self.source.as_ref(), pool, timestamp, self.page_limit),
        )
        .with_context(|| format!("Failed to poll pool {}", pool))?;

        debug!(
            "[POLLER] Pool {} at {}: {} trades, {} liquidities",
            pool,
            format_ts(timestamp),
            trades.len(),
            liquidities.len()
        );

        Ok(PoolActivity {
            pool,
            trades,
            liquidities,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{addr, poller_settings, trade, FakeBlocks, FakeSource};

    async fn poller(
        source: &Arc<FakeSource>,
        blocks: &Arc<FakeBlocks>,
        checkpoint: Option<i64>,
    ) -> (Poller, mpsc::Receiver<Snapshot>) {
        let (tx, rx) = mpsc::channel(16);
        let poller = Poller::new(
            source.clone(),
            blocks.clone(),
            vec![addr(50), addr(51)],
            checkpoint,
            &poller_settings(),
            tx,
        )
        .await
        .unwrap();
        (poller, rx)
    }

    #[tokio::test]
    async fn test_start_from_checkpoint_or_first_timestamp() {
        let source = Arc::new(FakeSource::new(3600, 36000));
        let blocks = Arc::new(FakeBlocks::default());

        let (fresh, _rx) = poller(&source, &blocks, None).await;
        assert_eq!(fresh.next_timestamp(), 3600);

        let (resumed, _rx) = poller(&source, &blocks, Some(14400)).await;
        assert_eq!(resumed.next_timestamp(), 18000);
        assert_eq!(resumed.interval(), 3600);
    }

    #[tokio::test]
    async fn test_no_pools_is_a_startup_error() {
        let source = Arc::new(FakeSource::new(3600, 36000));
        let (tx, _rx) = mpsc::channel(1);
        let res = Poller::new(
            source,
            Arc::new(FakeBlocks::default()),
            vec![],
            None,
            &poller_settings(),
            tx,
        )
        .await;
        assert!(res.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_successive_windows_are_contiguous() {
        let source = Arc::new(FakeSource::new(3600, 3 * 3600));
        let blocks = Arc::new(FakeBlocks::default());
        source.set_trades(addr(50), 7200, vec![trade(addr(1), 10, 20)]);

        let (poller, mut rx) = poller(&source, &blocks, None).await;
        let token = CancellationToken::new();
        let handle = tokio::spawn(poller.run(token.clone()));

        let mut windows = Vec::new();
        for _ in 0..3 {
            windows.push(rx.recv().await.unwrap());
        }
        token.cancel();
        handle.await.unwrap().unwrap();

        let timestamps: Vec<_> = windows.iter().map(|s| s.window.timestamp).collect();
        assert_eq!(timestamps, vec![3600, 7200, 10800]);

        for pair in windows.windows(2) {
            assert_eq!(pair[1].window.min_block, pair[0].window.max_block + 1);
        }

        // Only the first window resolves its lower bound through the explorer
        assert_eq!(blocks.calls(Closest::After), 1);
        assert_eq!(windows[1].pools[0].trades.len(), 1);
        assert_eq!(windows[1].pools.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_until_window_is_available() {
        let source = Arc::new(FakeSource::new(3600, 3600));
        let blocks = Arc::new(FakeBlocks::default());

        let (poller, mut rx) = poller(&source, &blocks, Some(3600)).await;
        let token = CancellationToken::new();
        let handle = tokio::spawn(poller.run(token.clone()));

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert!(rx.try_recv().is_err());

        source.set_latest(7200);
        let snapshot = rx.recv().await.unwrap();
        assert_eq!(snapshot.window.timestamp, 7200);

        token.cancel();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_window_is_retried_not_skipped() {
        let source = Arc::new(FakeSource::new(3600, 7200));
        let blocks = Arc::new(FakeBlocks::default());
        source.fail_next(2);

        let (poller, mut rx) = poller(&source, &blocks, None).await;
        let token = CancellationToken::new();
        let handle = tokio::spawn(poller.run(token.clone()));

        assert_eq!(rx.recv().await.unwrap().window.timestamp, 3600);
        assert_eq!(rx.recv().await.unwrap().window.timestamp, 7200);

        token.cancel();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_not_ready_pool_holds_back_the_window() {
        let source = Arc::new(FakeSource::new(3600, 3600));
        let blocks = Arc::new(FakeBlocks::default());
        source.set_not_ready(addr(51), 3600, true);

        let (poller, mut rx) = poller(&source, &blocks, None).await;
        let token = CancellationToken::new();
        let handle = tokio::spawn(poller.run(token.clone()));

        tokio::time::sleep(Duration::from_secs(12)).await;
        assert!(rx.try_recv().is_err());

        source.set_not_ready(addr(51), 3600, false);
        assert_eq!(rx.recv().await.unwrap().window.timestamp, 3600);

        token.cancel();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_interrupts_error_backoff() {
        let source = Arc::new(FakeSource::new(3600, 7200));
        let blocks = Arc::new(FakeBlocks::default());
        source.fail_next(100);

        let (poller, mut rx) = poller(&source, &blocks, None).await;
        let token = CancellationToken::new();
        let handle = tokio::spawn(poller.run(token.clone()));

        // First attempt failed, the poller now waits out the 5s error interval
        tokio::time::sleep(Duration::from_secs(1)).await;

        let cancelled_at = tokio::time::Instant::now();
        token.cancel();
        handle.await.unwrap().unwrap();

        assert!(cancelled_at.elapsed() < Duration::from_secs(1));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_channel_holds_back_next_window() {
        let source = Arc::new(FakeSource::new(3600, 10 * 3600));
        let blocks = Arc::new(FakeBlocks::default());

        let (tx, mut rx) = mpsc::channel(1);
        let poller = Poller::new(
            source.clone(),
            blocks.clone(),
            vec![addr(50)],
            None,
            &poller_settings(),
            tx,
        )
        .await
        .unwrap();

        let token = CancellationToken::new();
        let handle = tokio::spawn(poller.run(token.clone()));

        // 3600 fills the buffer, 7200 is polled and then blocks on send
        tokio::time::sleep(Duration::from_secs(600)).await;
        assert_eq!(blocks.calls(Closest::Before), 2);

        assert_eq!(rx.recv().await.unwrap().window.timestamp, 3600);
        tokio::time::sleep(Duration::from_secs(600)).await;
        assert_eq!(blocks.calls(Closest::Before), 3);

        assert_eq!(rx.recv().await.unwrap().window.timestamp, 7200);
        assert_eq!(rx.recv().await.unwrap().window.timestamp, 10800);

        token.cancel();
        handle.await.unwrap().unwrap();
    }
}
