#[allow(clippy::module_inception)]
mod config;

pub use config::{
    BatcherSettings, ChainSettings, EmitterSettings, PollerSettings, PoolSettings,
    PostgresSettings, Settings,
};
