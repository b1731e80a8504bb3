use std::sync::Arc;

use log::info;

use crate::config::Settings;

pub mod models;
pub mod postgres;
mod store;

pub use postgres::PostgresClient;
pub use store::PointsStore;

/// Database handle shared by the pipeline and the operator commands.
#[derive(Clone)]
pub struct Database {
    pub postgres: Arc<PostgresClient>,
}

impl Database {
    /// Connect and bring the schema up to date.
    pub async fn new(settings: &Settings) -> anyhow::Result<Self> {
        let postgres = PostgresClient::new(settings.postgres.clone()).await?;

        postgres.migrate().await?;

        info!("Database ready");

        Ok(Self {
            postgres: Arc::new(postgres),
        })
    }
}
