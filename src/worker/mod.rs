//! The ingestion pipeline.
//!
//! ```text
//! Poller --Snapshot--> Emitter --BatchEvent--> Batcher --> PointsAggregator
//! ```

pub mod aggregator;
pub mod batcher;
pub mod emitter;
pub mod events;
pub mod poller;
pub mod pipeline;

pub use aggregator::PointsAggregator;
pub use batcher::{Batcher, EventHandler};
pub use emitter::Emitter;
pub use events::{BatchEvent, LiquidityEvent, PoolActivity, Snapshot, TradeEvent, Window};
pub use pipeline::{Pipeline, PipelineParts};
pub use poller::Poller;
