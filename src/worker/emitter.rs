use std::{collections::HashMap, sync::Arc, time::Duration};

use alloy::primitives::Address;
use anyhow::Context;
use bigdecimal::BigDecimal;
use log::{debug, error, info, warn};
use num_traits::Zero;
use tokio::{sync::mpsc, time::Instant};
use tokio_util::sync::CancellationToken;

use crate::{
    chain::{MetadataCache, PoolInfo, TokenInfo},
    config::EmitterSettings,
    error::{is_permanent, SyncError},
    oracle::PriceOracle,
    utils::{format_ts, u256_to_decimal},
    worker::events::{BatchEvent, LiquidityEvent, Snapshot, TradeEvent, Window},
};

/// Block heights at which a token price is sampled for a window.
///
/// Walks backward from `max_block` with step `max(span / count, 1)` and never
/// goes below `min_block`. `max_block` is always sampled, also for a window
/// whose bounds are inverted because it contains no block.
pub fn sample_heights(min_block: u64, max_block: u64, count: usize) -> Vec<u64> {
    if max_block < min_block || count <= 1 {
        return vec![max_block];
    }

    let span = max_block - min_block + 1;
    let step = (span / count as u64).max(1);

    let mut heights = Vec::with_capacity(count);
    let mut height = max_block;

    for _ in 0..count {
        heights.push(height);
        match height.checked_sub(step) {
            Some(next) if next >= min_block => height = next,
            _ => break,
        }
    }

    heights
}

/// Prices the raw activity of each [`Snapshot`] into a [`BatchEvent`].
pub struct Emitter {
    oracle: PriceOracle,
    metadata: MetadataCache,
    receiver: mpsc::Receiver<Snapshot>,
    sender: mpsc::Sender<BatchEvent>,
    price_sample_count: usize,
    interval_error: Duration,
}

impl Emitter {
    pub fn new(
        oracle: PriceOracle,
        metadata: MetadataCache,
        settings: &EmitterSettings,
        receiver: mpsc::Receiver<Snapshot>,
        sender: mpsc::Sender<BatchEvent>,
    ) -> Self {
        Self {
            oracle,
            metadata,
            receiver,
            sender,
            price_sample_count: settings.price_sample_count.max(1),
            interval_error: Duration::from_secs(settings.interval_error_secs),
        }
    }

    pub async fn run(mut self, cancellation_token: CancellationToken) -> anyhow::Result<()> {
        info!("[EMITTER] Started");

        loop {
            let snapshot = tokio::select! {
                biased;

                _ = cancellation_token.cancelled() => break,

                msg = self.receiver.recv() => match msg {
                    Some(snapshot) => snapshot,
                    None => {
                        info!("[EMITTER] Poller channel closed");
                        break;
                    },
                },
            };

            if !self.must_emit(snapshot, &cancellation_token).await {
                break;
            }
        }

        info!("[EMITTER] Stopped");
        Ok(())
    }

    /// Emit `snapshot`, retrying until it succeeds.
    ///
    /// Returns `false` when the emitter has to stop.
    async fn must_emit(&self, snapshot: Snapshot, cancellation_token: &CancellationToken) -> bool {
        let ts = format_ts(snapshot.window.timestamp);

        loop {
            let start = Instant::now();

            let emitted = tokio::select! {
                biased;

                _ = cancellation_token.cancelled() => return false,

                res = self.emit(&snapshot) => res,
            };

            match emitted {
                Ok(event) => {
                    let (trades, liquidities) = (event.trades.len(), event.liquidities.len());

                    tokio::select! {
                        biased;

                        _ = cancellation_token.cancelled() => return false,

                        res = self.sender.send(event) => {
                            if res.is_err() {
                                info!("[EMITTER] Batcher channel closed");
                                return false;
                            }
                        }
                    }

                    info!(
                        "[EMITTER] Window {} priced: {} trades, {} liquidities in {:?}",
                        ts,
                        trades,
                        liquidities,
                        start.elapsed()
                    );
                    return true;
                },
                Err(e) => {
                    if is_permanent(&e) {
                        error!("[EMITTER] Cannot price window {}: {:#}", ts, e);
                    } else {
                        warn!("[EMITTER] Failed to price window {}: {:#}", ts, e);
                    }

                    tokio::select! {
                        biased;

                        _ = cancellation_token.cancelled() => return false,

                        _ = tokio::time::sleep(self.interval_error) => {
                            debug!("[EMITTER] Retrying window {}", ts);
                        }
                    }
                },
            }
        }
    }

    async fn emit(&self, snapshot: &Snapshot) -> anyhow::Result<BatchEvent> {
        let window = snapshot.window;
        let mut event = BatchEvent::new(window);

        // Prices are sampled once per token and snapshot
        let mut prices: HashMap<Address, BigDecimal> = HashMap::new();

        let interval = BigDecimal::from(window.interval);

        for activity in snapshot.pools.iter().filter(|a| !a.is_empty()) {
            let pool = Arc::new(
                self.metadata
                    .pool(activity.pool)
                    .await
                    .with_context(|| format!("Failed to get info of pool {}", activity.pool))?,
            );

            let price0 = self.price(&mut prices, &window, &pool, &pool.token0).await?;
            let price1 = self.price(&mut prices, &window, &pool, &pool.token1).await?;

            for trade in &activity.trades {
                event.trades.push(TradeEvent {
                    timestamp: window.timestamp,
                    user: trade.user,
                    pool: pool.clone(),
                    usd_value0: u256_to_decimal(trade.token0_volume, pool.token0.decimals)
                        * &price0,
                    usd_value1: u256_to_decimal(trade.token1_volume, pool.token1.decimals)
                        * &price1,
                });
            }

            for liquidity in &activity.liquidities {
                let value0 =
                    u256_to_decimal(liquidity.token0_liquidity_seconds, pool.token0.decimals)
                        * &price0;
                let value1 =
                    u256_to_decimal(liquidity.token1_liquidity_seconds, pool.token1.decimals)
                        * &price1;

                event.liquidities.push(LiquidityEvent {
                    timestamp: window.timestamp,
                    user: liquidity.user,
                    pool: pool.clone(),
                    usd_value0_per_second: value0 / &interval,
                    usd_value1_per_second: value1 / &interval,
                });
            }
        }

        Ok(event)
    }

    async fn price(
        &self,
        prices: &mut HashMap<Address, BigDecimal>,
        window: &Window,
        pool: &PoolInfo,
        token: &TokenInfo,
    ) -> anyhow::Result<BigDecimal> {
        if let Some(price) = prices.get(&token.address) {
            return Ok(price.clone());
        }

        let price = self
            .sample_price(window, pool.address, token.address)
            .await
            .with_context(|| format!("Failed to price {} of pool {}", token.symbol, pool.label()))?;

        debug!(
            "[EMITTER] {} averaged {} over blocks {}..={}",
            token.symbol,
            price.with_prec(12),
            window.min_block,
            window.max_block
        );

        prices.insert(token.address, price.clone());
        Ok(price)
    }

    /// Average of the non-zero USD prices sampled across the window.
    async fn sample_price(
        &self,
        window: &Window,
        pool: Address,
        token: Address,
    ) -> anyhow::Result<BigDecimal> {
        let mut sum = BigDecimal::zero();
        let mut count = 0u64;

        for height in sample_heights(window.min_block, window.max_block, self.price_sample_count) {
            let price = self
                .oracle
                .price_usd(pool, token, Some(height))
                .await
                .with_context(|| format!("Failed to sample price at block {}", height))?;

            // Nothing older is trusted once the pool reads empty
            if price.is_zero() {
                debug!("[EMITTER] Zero price of {} at block {}", token, height);
                break;
            }

            sum += price;
            count += 1;
        }

        if count == 0 {
            return Err(SyncError::NoPriceSamples {
                token,
                min_block: window.min_block,
                max_block: window.max_block,
            }
            .into());
        }

        Ok(sum / BigDecimal::from(count))
    }
}
