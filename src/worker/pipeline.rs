use std::{sync::Arc, time::Duration};

use alloy::primitives::Address;
use anyhow::Context;
use log::{error, info};
use tokio::{sync::mpsc, task::JoinHandle};
use tokio_util::sync::CancellationToken;

use crate::{
    chain::{ChainCaller, MetadataCache, RpcChainCaller},
    config::{BatcherSettings, EmitterSettings, PollerSettings, Settings},
    db::PointsStore,
    oracle::{OracleTokens, PriceOracle},
    source::{ActivitySource, BlockNumberSource, ContractParserClient, ScanApi},
    utils::format_ts,
    worker::{
        aggregator::PointsAggregator, batcher::Batcher, emitter::Emitter, poller::Poller,
    },
};

/// External collaborators of the pipeline.
pub struct PipelineParts {
    pub source: Arc<dyn ActivitySource>,
    pub blocks: Arc<dyn BlockNumberSource>,
    pub chain: Arc<dyn ChainCaller>,
    pub store: Arc<dyn PointsStore>,
    pub tokens: OracleTokens,
}

/// Poller, Emitter and Batcher wired together by bounded channels.
pub struct Pipeline {
    poller: Poller,
    emitter: Emitter,
    batcher: Batcher,
}

impl Pipeline {
    /// Build the pipeline against the configured RPC endpoints.
    pub async fn from_settings(
        settings: &Settings,
        store: Arc<dyn PointsStore>,
    ) -> anyhow::Result<Self> {
        let poller = &settings.poller;

        let source = ContractParserClient::new(&poller.rpc_url, poller.request_timeout())?;
        let blocks = ScanApi::new(
            &poller.scan_url,
            poller.scan_api_key.clone(),
            poller.request_timeout(),
        )?;
        let chain = RpcChainCaller::new(
            &settings.chain.rpc_url,
            Duration::from_secs(settings.chain.call_timeout_secs),
        )?;

        let parts = PipelineParts {
            source: Arc::new(source),
            blocks: Arc::new(blocks),
            chain: Arc::new(chain),
            store,
            tokens: OracleTokens::from(&settings.chain),
        };

        Self::new(parts, &settings.poller, &settings.emitter, &settings.batcher).await
    }

    /// Wire the stages. The synced pools are the ones with a stored weight.
    pub async fn new(
        parts: PipelineParts,
        poller_settings: &PollerSettings,
        emitter_settings: &EmitterSettings,
        batcher_settings: &BatcherSettings,
    ) -> anyhow::Result<Self> {
        let pools: Vec<Address> = parts
            .store
            .get_pool_weights()
            .await
            .context("Failed to load synced pools")?
            .into_iter()
            .map(|w| w.pool)
            .collect();

        let checkpoint = parts
            .store
            .get_checkpoint()
            .await
            .context("Failed to load sync checkpoint")?;

        match checkpoint {
            Some(ts) => info!("Resuming {} pools after window {}", pools.len(), format_ts(ts)),
            None => info!("Starting {} pools from the first window", pools.len()),
        }

        let (snapshot_tx, snapshot_rx) = mpsc::channel(poller_settings.buffer_size.max(1));
        let (event_tx, event_rx) = mpsc::channel(emitter_settings.buffer_size.max(1));

        let metadata = MetadataCache::new(parts.chain.clone());
        let oracle = PriceOracle::new(parts.chain, metadata.clone(), parts.tokens);

        let poller = Poller::new(
            parts.source,
            parts.blocks,
            pools,
            checkpoint,
            poller_settings,
            snapshot_tx,
        )
        .await?;

        let emitter = Emitter::new(
            oracle.clone(),
            metadata,
            emitter_settings,
            snapshot_rx,
            event_tx,
        );

        let aggregator = PointsAggregator::new(parts.store, oracle);
        let batcher = Batcher::new(Arc::new(aggregator), batcher_settings, event_rx);

        Ok(Self {
            poller,
            emitter,
            batcher,
        })
    }

    /// Spawn every stage on the runtime. All of them stop on `cancellation_token`.
    pub fn spawn(self, cancellation_token: &CancellationToken) -> Vec<JoinHandle<()>> {
        let Self {
            poller,
            emitter,
            batcher,
        } = self;

        let poller_token = cancellation_token.child_token();
        let poller_handle = tokio::spawn(async move {
            if let Err(e) = poller.run(poller_token).await {
                error!("[POLLER] Stopped with error: {:#}", e);
            }
        });

        let emitter_token = cancellation_token.child_token();
        let emitter_handle = tokio::spawn(async move {
            if let Err(e) = emitter.run(emitter_token).await {
                error!("[EMITTER] Stopped with error: {:#}", e);
            }
        });

        let batcher_token = cancellation_token.child_token();
        let batcher_handle = tokio::spawn(async move {
            if let Err(e) = batcher.run(batcher_token).await {
                error!("[BATCHER] Stopped with error: {:#}", e);
            }
        });

        vec![poller_handle, emitter_handle, batcher_handle]
    }
}
