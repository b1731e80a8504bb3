use alloy::primitives::Address;
use anyhow::Context;
use bigdecimal::BigDecimal;
use clap::{Parser, Subcommand};
use jemallocator::Jemalloc;
use log::{info, LevelFilter};
use simple_logger::SimpleLogger;
use tokio_util::sync::CancellationToken;

#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

use points::{
    admin::{self, Adjustment},
    db::models::PoolWeight,
    Database, Pipeline, Settings,
};

/// Points ingestion service for AMM pools.
#[derive(Parser)]
#[command(name = "points", version)]
struct Cli {
    /// Log verbosity (off, error, warn, info, debug, trace)
    #[arg(long, global = true, default_value = "info")]
    log_level: LevelFilter,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the ingestion pipeline (default)
    Run,
    /// Manage pool weights
    #[command(subcommand)]
    PoolWeight(PoolWeightCommand),
    /// Inspect and adjust user points
    #[command(subcommand)]
    UserPoints(UserPointsCommand),
}

#[derive(Subcommand)]
enum PoolWeightCommand {
    /// Insert or replace the weights of a pool
    Add {
        #[arg(short, long)]
        pool: Address,
        #[arg(short, long)]
        trade: BigDecimal,
        #[arg(short, long)]
        liquidity: BigDecimal,
    },
    /// Change one or both weights of a pool
    Update {
        #[arg(short, long)]
        pool: Address,
        #[arg(short, long)]
        trade: Option<BigDecimal>,
        #[arg(short, long)]
        liquidity: Option<BigDecimal>,
    },
    /// List all pool weights
    List,
}

#[derive(Subcommand)]
enum UserPointsCommand {
    /// Show the points of a user
    Get {
        #[arg(short, long)]
        user: Address,
    },
    /// Add points to a user
    Increase {
        #[arg(short, long)]
        user: Address,
        #[arg(short, long)]
        trade: Option<BigDecimal>,
        #[arg(short, long)]
        liquidity: Option<BigDecimal>,
    },
    /// Remove points from a user
    Decrease {
        #[arg(short, long)]
        user: Address,
        #[arg(short, long)]
        trade: Option<BigDecimal>,
        #[arg(short, long)]
        liquidity: Option<BigDecimal>,
    },
}

#[tokio::main()]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    SimpleLogger::new()
        .with_level(cli.log_level)
        .init()
        .context("Failed to initialize logger")?;

    let settings =
        Settings::new().context("Failed to load config.yaml. Please ensure it exists and is valid")?;

    let db = Database::new(&settings)
        .await
        .context("Failed to initialize database connection")?;

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => run_pipeline(settings, db).await,
        Command::PoolWeight(cmd) => match cmd {
            PoolWeightCommand::Add {
                pool,
                trade,
                liquidity,
            } => admin::add_pool_weight(&db.postgres, pool, trade, liquidity).await,
            PoolWeightCommand::Update {
                pool,
                trade,
                liquidity,
            } => admin::update_pool_weight(&db.postgres, pool, trade, liquidity).await,
            PoolWeightCommand::List => admin::list_pool_weights(&db.postgres).await,
        },
        Command::UserPoints(cmd) => match cmd {
            UserPointsCommand::Get {
                user,
            } => admin::get_user_points(&db.postgres, user).await,
            UserPointsCommand::Increase {
                user,
                trade,
                liquidity,
            } => {
                admin::adjust_user_points(&db.postgres, user, trade, liquidity, Adjustment::Increase)
                    .await
            },
            UserPointsCommand::Decrease {
                user,
                trade,
                liquidity,
            } => {
                admin::adjust_user_points(&db.postgres, user, trade, liquidity, Adjustment::Decrease)
                    .await
            },
        },
    }
}

async fn run_pipeline(settings: Settings, db: Database) -> anyhow::Result<()> {
    // Configured weights only fill in pools the operator has not set up yet
    let weights: Vec<PoolWeight> = settings.pools.iter().map(PoolWeight::from).collect();
    let seeded = db
        .postgres
        .seed_pool_weights(&weights)
        .await
        .context("Failed to seed pool weights")?;
    if seeded > 0 {
        info!("Seeded weights of {} pools from config", seeded);
    }

    let pipeline = Pipeline::from_settings(&settings, db.postgres.clone())
        .await
        .context("Failed to start the pipeline")?;

    let cancellation_token = CancellationToken::new();
    let handles = pipeline.spawn(&cancellation_token);

    #[cfg(unix)]
    let mut sigterm_stream = {
        use tokio::signal::unix::{signal, SignalKind};
        signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?
    };

    info!("Pipeline running. Press Ctrl+C to stop.");

    #[cfg(unix)]
    {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Received shutdown signal (Ctrl+C), exiting gracefully...");
            },
            _ = sigterm_stream.recv() => {
                info!("Received SIGTERM, exiting gracefully...");
            },
        };
    }

    #[cfg(not(unix))]
    {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Received shutdown signal (Ctrl+C), exiting gracefully...");
            },
        };
    }

    info!("Stopping pipeline...");
    cancellation_token.cancel();

    for handle in handles {
        let _ = handle.await;
    }

    info!("Pipeline stopped");
    Ok(())
}
