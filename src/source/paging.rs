use std::future::Future;

use alloy::primitives::Address;
use anyhow::Context;

use crate::{
    error::SyncError,
    source::{ActivitySource, LiquidityRecord, Page, TradeRecord},
};

/// All trade records of `pool` in the window labelled `timestamp`.
pub async fn fetch_all_trades(
    source: &dyn ActivitySource,
    pool: Address,
    timestamp: i64,
    limit: Option<usize>,
) -> anyhow::Result<Vec<TradeRecord>> {
    collect_pages("trade", pool, timestamp, |offset| {
        source.trade_page(pool, timestamp, offset, limit)
    })
    .await
}

/// All liquidity records of `pool` in the window labelled `timestamp`.
pub async fn fetch_all_liquidities(
    source: &dyn ActivitySource,
    pool: Address,
    timestamp: i64,
    limit: Option<usize>,
) -> anyhow::Result<Vec<LiquidityRecord>> {
    collect_pages("liquidity", pool, timestamp, |offset| {
        source.liquidity_page(pool, timestamp, offset, limit)
    })
    .await
}

/// Walk pages by offset until `total` records are collected.
///
/// A missing page means the window is not ready and fails the whole fetch.
/// Every page must make progress without overshooting `total`.
async fn collect_pages<T, F, Fut>(
    kind: &'static str,
    pool: Address,
    timestamp: i64,
    mut fetch: F,
) -> anyhow::Result<Vec<T>>
where
    F: FnMut(usize) -> Fut,
    Fut: Future<Output = anyhow::Result<Option<Page<T>>>>,
{
    let mut all: Vec<T> = Vec::new();

    loop {
        let offset = all.len();

        let page = fetch(offset)
            .await
            .with_context(|| {
                format!(
                    "Failed to fetch {} data of pool {} at offset {}",
                    kind, pool, offset
                )
            })?
            .ok_or(SyncError::ActivityNotReady {
                kind,
                pool,
                timestamp,
            })?;

        let fetched = offset + page.data.len();
        let stalled = page.data.is_empty() && fetched < page.total;

        if stalled || fetched > page.total {
            return Err(SyncError::PaginationStalled {
                kind,
                pool,
                fetched,
                total: page.total,
            }
            .into());
        }

        all.extend(page.data);

        if all.len() == page.total {
            return Ok(all);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{addr, trade, FakeSource};

    #[tokio::test]
    async fn test_pages_are_concatenated_in_order() {
        let source = FakeSource::new(3600, 3600).with_page_size(2);
        let records: Vec<_> = (1..=5).map(|i| trade(addr(i), i as u64, 0)).collect();
        source.set_trades(addr(9), 3600, records.clone());

        let all = fetch_all_trades(&source, addr(9), 3600, None).await.unwrap();
        assert_eq!(all, records);
        assert_eq!(source.page_calls(), 3);
    }

    #[tokio::test]
    async fn test_empty_window_is_one_call() {
        let source = FakeSource::new(3600, 3600);
        source.set_liquidities(addr(9), 3600, vec![]);

        let all = fetch_all_liquidities(&source, addr(9), 3600, None).await.unwrap();
        assert!(all.is_empty());
        assert_eq!(source.page_calls(), 1);
    }

    #[tokio::test]
    async fn test_missing_page_is_not_ready() {
        let source = FakeSource::new(3600, 3600);
        source.set_not_ready(addr(9), 7200, true);

        let err = fetch_all_trades(&source, addr(9), 7200, None).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<SyncError>(),
            Some(SyncError::ActivityNotReady { kind: "trade", .. })
        ));
    }

    #[tokio::test]
    async fn test_page_without_progress_is_an_error() {
        let page_total = 4;
        let err = collect_pages::<TradeRecord, _, _>("trade", addr(9), 3600, |_| async move {
            Ok(Some(Page {
                total: page_total,
                data: vec![],
            }))
        })
        .await
        .unwrap_err();

        assert!(matches!(
            err.downcast_ref::<SyncError>(),
            Some(SyncError::PaginationStalled { fetched: 0, total: 4, .. })
        ));
    }

    #[tokio::test]
    async fn test_overshooting_page_is_an_error() {
        let err = collect_pages("trade", addr(9), 3600, |_| async move {
            Ok(Some(Page {
                total: 1,
                data: vec![trade(addr(1), 1, 1), trade(addr(2), 1, 1)],
            }))
        })
        .await
        .unwrap_err();

        assert!(matches!(
            err.downcast_ref::<SyncError>(),
            Some(SyncError::PaginationStalled { fetched: 2, total: 1, .. })
        ));
    }
}
