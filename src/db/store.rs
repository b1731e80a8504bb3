use async_trait::async_trait;

use crate::db::models::{PointsCommit, PoolWeight};

/// Durable points state read and written by the pipeline.
#[async_trait]
pub trait PointsStore: Send + Sync {
    /// Timestamp of the last committed window.
    async fn get_checkpoint(&self) -> anyhow::Result<Option<i64>>;

    async fn get_pool_weights(&self) -> anyhow::Result<Vec<PoolWeight>>;

    /// Apply user and pool deltas and advance the checkpoint, all or nothing.
    ///
    /// A commit at or before the stored checkpoint was already applied and
    /// succeeds without changing anything.
    async fn commit_points(&self, commit: &PointsCommit) -> anyhow::Result<()>;
}
