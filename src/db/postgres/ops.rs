use std::str::FromStr;

use alloy::primitives::Address;
use anyhow::Context;
use async_trait::async_trait;
use bigdecimal::BigDecimal;
use deadpool_postgres::Transaction;
use log::{debug, error, warn};
use tokio_postgres::{types::ToSql, Row};

use crate::{
    db::{
        models::{PointsCommit, PoolPoints, PoolWeight, PoolWeightView, UserPoints},
        postgres::PostgresClient,
        PointsStore,
    },
    utils::hex_encode,
};

const USER_COLS: usize = 3;
const POOL_COLS: usize = 12;
const BATCH_SIZE: usize = 500;

type Params<'a> = Vec<&'a (dyn ToSql + Sync)>;

/// Sanitize a string for PostgreSQL by removing null bytes (0x00)
/// which are invalid in UTF-8 text columns
fn sanitize_string(s: &str) -> String {
    s.replace('\0', "")
}

fn address_text(address: &Address) -> String {
    hex_encode(address.as_slice())
}

/// `($1, $2::text::numeric, ...), (...)` for `rows` rows of `casts`.
fn values_clause(rows: usize, casts: &[&str]) -> String {
    (0..rows)
        .map(|row| {
            let placeholders: Vec<String> = casts
                .iter()
                .enumerate()
                .map(|(col, cast)| format!("${}{}", row * casts.len() + col + 1, cast))
                .collect();
            format!("({})", placeholders.join(", "))
        })
        .collect::<Vec<_>>()
        .join(", ")
}

fn parse_address(row: &Row, column: &str) -> anyhow::Result<Address> {
    let value: String = row.get(column);
    Address::from_str(&value).with_context(|| format!("Invalid address in {}: {}", column, value))
}

fn parse_decimal(row: &Row, column: &str) -> anyhow::Result<BigDecimal> {
    let value: String = row.get(column);
    BigDecimal::from_str(&value).with_context(|| format!("Invalid decimal in {}: {}", column, value))
}

fn user_points_from_row(row: &Row) -> anyhow::Result<UserPoints> {
    Ok(UserPoints {
        user: parse_address(row, "address")?,
        trade_points: parse_decimal(row, "trade_points")?,
        liquidity_points: parse_decimal(row, "liquidity_points")?,
    })
}

fn pool_weight_from_row(row: &Row) -> anyhow::Result<PoolWeight> {
    Ok(PoolWeight {
        pool: parse_address(row, "pool_address")?,
        trade_weight: parse_decimal(row, "trade_weight")?,
        liquidity_weight: parse_decimal(row, "liquidity_weight")?,
    })
}

// ==================== POINTS COMMIT ====================

async fn upsert_users(tx: &Transaction<'_>, users: &[UserPoints]) -> anyhow::Result<()> {
    for chunk in users.chunks(BATCH_SIZE) {
        let query = format!(
            r#"
            INSERT INTO points.users AS u (address, trade_points, liquidity_points)
            VALUES {}
            ON CONFLICT (address) DO UPDATE SET
                trade_points = u.trade_points + EXCLUDED.trade_points,
                liquidity_points = u.liquidity_points + EXCLUDED.liquidity_points
            "#,
            values_clause(chunk.len(), &["", "::text::numeric", "::text::numeric"])
        );

        let values: Vec<(String, String, String)> = chunk
            .iter()
            .map(|u| {
                (
                    address_text(&u.user),
                    u.trade_points.to_string(),
                    u.liquidity_points.to_string(),
                )
            })
            .collect();

        let mut params: Params = Vec::with_capacity(chunk.len() * USER_COLS);
        for (address, trade, liquidity) in &values {
            params.push(address);
            params.push(trade);
            params.push(liquidity);
        }

        tx.execute(&query, &params).await.map_err(|e| {
            error!("Failed to upsert {} users: {:?}", chunk.len(), e);
            e
        })?;
    }

    Ok(())
}

struct PoolRow {
    address: String,
    token0: (String, String, String, i16),
    token1: (String, String, String, i16),
    tvl: String,
    trade_points: String,
    liquidity_points: String,
}

impl From<&PoolPoints> for PoolRow {
    fn from(points: &PoolPoints) -> Self {
        let pool = &points.pool;
        Self {
            address: address_text(&pool.address),
            token0: (
                address_text(&pool.token0.address),
                sanitize_string(&pool.token0.name),
                sanitize_string(&pool.token0.symbol),
                pool.token0.decimals as i16,
            ),
            token1: (
                address_text(&pool.token1.address),
                sanitize_string(&pool.token1.name),
                sanitize_string(&pool.token1.symbol),
                pool.token1.decimals as i16,
            ),
            tvl: points.tvl.to_string(),
            trade_points: points.trade_points.to_string(),
            liquidity_points: points.liquidity_points.to_string(),
        }
    }
}

async fn upsert_pools(tx: &Transaction<'_>, pools: &[PoolPoints]) -> anyhow::Result<()> {
    const CASTS: [&str; POOL_COLS] = [
        "",
        "",
        "",
        "",
        "",
        "",
        "",
        "",
        "",
        "::text::numeric",
        "::text::numeric",
        "::text::numeric",
    ];

    for chunk in pools.chunks(BATCH_SIZE) {
        let query = format!(
            r#"
            INSERT INTO points.pools AS p (
                address,
                token0_address, token0_name, token0_symbol, token0_decimals,
                token1_address, token1_name, token1_symbol, token1_decimals,
                tvl, trade_points, liquidity_points
            ) VALUES {}
            ON CONFLICT (address) DO UPDATE SET
                token0_address = EXCLUDED.token0_address,
                token0_name = EXCLUDED.token0_name,
                token0_symbol = EXCLUDED.token0_symbol,
                token0_decimals = EXCLUDED.token0_decimals,
                token1_address = EXCLUDED.token1_address,
                token1_name = EXCLUDED.token1_name,
                token1_symbol = EXCLUDED.token1_symbol,
                token1_decimals = EXCLUDED.token1_decimals,
                tvl = EXCLUDED.tvl,
                trade_points = p.trade_points + EXCLUDED.trade_points,
                liquidity_points = p.liquidity_points + EXCLUDED.liquidity_points
            "#,
            values_clause(chunk.len(), &CASTS)
        );

        let rows: Vec<PoolRow> = chunk.iter().map(PoolRow::from).collect();

        let mut params: Params = Vec::with_capacity(chunk.len() * POOL_COLS);
        for row in &rows {
            params.push(&row.address);
            params.push(&row.token0.0);
            params.push(&row.token0.1);
            params.push(&row.token0.2);
            params.push(&row.token0.3);
            params.push(&row.token1.0);
            params.push(&row.token1.1);
            params.push(&row.token1.2);
            params.push(&row.token1.3);
            params.push(&row.tvl);
            params.push(&row.trade_points);
            params.push(&row.liquidity_points);
        }

        tx.execute(&query, &params).await.map_err(|e| {
            error!("Failed to upsert {} pools: {:?}", chunk.len(), e);
            e
        })?;
    }

    Ok(())
}

#[async_trait]
impl PointsStore for PostgresClient {
    async fn get_checkpoint(&self) -> anyhow::Result<Option<i64>> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt("SELECT last_timestamp FROM points.sync_checkpoint WHERE id = 1", &[])
            .await
            .context("Failed to read sync checkpoint")?;

        Ok(row.map(|r| r.get("last_timestamp")))
    }

    async fn get_pool_weights(&self) -> anyhow::Result<Vec<PoolWeight>> {
        let client = self.pool.get().await?;
        let query = r#"
            SELECT
                pool_address,
                trade_weight::text AS trade_weight,
                liquidity_weight::text AS liquidity_weight
            FROM points.pool_weights
            ORDER BY pool_address
        "#;

        let rows = client.query(query, &[]).await.context("Failed to read pool weights")?;
        rows.iter().map(pool_weight_from_row).collect()
    }

    async fn commit_points(&self, commit: &PointsCommit) -> anyhow::Result<()> {
        let mut client = self.pool.get().await?;
        let tx = client.transaction().await.context("Failed to begin points transaction")?;

        // Advancing first locks the checkpoint row until commit, so a batch
        // at or before the stored checkpoint touches nothing
        let advanced = tx
            .execute(
                r#"
                INSERT INTO points.sync_checkpoint AS cp (id, last_timestamp)
                VALUES (1, $1)
                ON CONFLICT (id) DO UPDATE SET last_timestamp = EXCLUDED.last_timestamp
                WHERE cp.last_timestamp < EXCLUDED.last_timestamp
                "#,
                &[&commit.timestamp],
            )
            .await
            .context("Failed to advance sync checkpoint")?;

        if advanced == 0 {
            tx.rollback().await.context("Failed to roll back points transaction")?;
            warn!(
                "Points up to checkpoint {} were already committed, skipping",
                commit.timestamp
            );
            return Ok(());
        }

        upsert_users(&tx, &commit.users).await?;
        upsert_pools(&tx, &commit.pools).await?;

        tx.commit().await.context("Failed to commit points transaction")?;

        debug!(
            "Committed {} users and {} pools at checkpoint {}",
            commit.users.len(),
            commit.pools.len(),
            commit.timestamp
        );

        Ok(())
    }
}

impl PostgresClient {
    // ==================== POOL WEIGHTS ====================

    /// Insert weights for pools that have none yet. Returns the number inserted.
    pub async fn seed_pool_weights(&self, weights: &[PoolWeight]) -> anyhow::Result<u64> {
        if weights.is_empty() {
            return Ok(0);
        }

        let client = self.pool.get().await?;
        let query = format!(
            r#"
            INSERT INTO points.pool_weights (pool_address, trade_weight, liquidity_weight)
            VALUES {}
            ON CONFLICT (pool_address) DO NOTHING
            "#,
            values_clause(weights.len(), &["", "::text::numeric", "::text::numeric"])
        );

        let values: Vec<(String, String, String)> = weights
            .iter()
            .map(|w| {
                (
                    address_text(&w.pool),
                    w.trade_weight.to_string(),
                    w.liquidity_weight.to_string(),
                )
            })
            .collect();

        let mut params: Params = Vec::with_capacity(values.len() * 3);
        for (pool, trade, liquidity) in &values {
            params.push(pool);
            params.push(trade);
            params.push(liquidity);
        }

        client.execute(&query, &params).await.context("Failed to seed pool weights")
    }

    pub async fn upsert_pool_weight(&self, weight: &PoolWeight) -> anyhow::Result<()> {
        let client = self.pool.get().await?;
        let query = r#"
            INSERT INTO points.pool_weights (pool_address, trade_weight, liquidity_weight)
            VALUES ($1, $2::text::numeric, $3::text::numeric)
            ON CONFLICT (pool_address) DO UPDATE SET
                trade_weight = EXCLUDED.trade_weight,
                liquidity_weight = EXCLUDED.liquidity_weight
        "#;

        client
            .execute(
                query,
                &[
                    &address_text(&weight.pool),
                    &weight.trade_weight.to_string(),
                    &weight.liquidity_weight.to_string(),
                ],
            )
            .await
            .with_context(|| format!("Failed to upsert weight of pool {}", weight.pool))?;

        Ok(())
    }

    /// Update the given weights of an existing pool. Returns `false` when the
    /// pool has no weight row.
    pub async fn update_pool_weight(
        &self,
        pool: Address,
        trade_weight: Option<&BigDecimal>,
        liquidity_weight: Option<&BigDecimal>,
    ) -> anyhow::Result<bool> {
        let client = self.pool.get().await?;
        let query = r#"
            UPDATE points.pool_weights SET
                trade_weight = COALESCE($2::text::numeric, trade_weight),
                liquidity_weight = COALESCE($3::text::numeric, liquidity_weight)
            WHERE pool_address = $1
        "#;

        let trade = trade_weight.map(|w| w.to_string());
        let liquidity = liquidity_weight.map(|w| w.to_string());

        let updated = client
            .execute(query, &[&address_text(&pool), &trade, &liquidity])
            .await
            .with_context(|| format!("Failed to update weight of pool {}", pool))?;

        Ok(updated == 1)
    }

    pub async fn list_pool_weights(&self) -> anyhow::Result<Vec<PoolWeightView>> {
        let client = self.pool.get().await?;
        let query = r#"
            SELECT
                w.pool_address,
                w.trade_weight::text AS trade_weight,
                w.liquidity_weight::text AS liquidity_weight,
                p.token0_symbol,
                p.token1_symbol
            FROM points.pool_weights w
            LEFT JOIN points.pools p ON p.address = w.pool_address
            ORDER BY w.pool_address
        "#;

        let rows = client.query(query, &[]).await.context("Failed to list pool weights")?;
        rows.iter()
            .map(|row| {
                Ok(PoolWeightView {
                    weight: pool_weight_from_row(row)?,
                    token0_symbol: row.get("token0_symbol"),
                    token1_symbol: row.get("token1_symbol"),
                })
            })
            .collect()
    }

    // ==================== USERS ====================

    pub async fn get_user_points(&self, user: Address) -> anyhow::Result<Option<UserPoints>> {
        let client = self.pool.get().await?;
        let query = r#"
            SELECT
                address,
                trade_points::text AS trade_points,
                liquidity_points::text AS liquidity_points
            FROM points.users
            WHERE address = $1
        "#;

        let row = client
            .query_opt(query, &[&address_text(&user)])
            .await
            .with_context(|| format!("Failed to get points of user {}", user))?;

        row.as_ref().map(user_points_from_row).transpose()
    }

    /// Add `delta` to a user's points, creating the user when unknown.
    pub async fn increase_user_points(&self, delta: &UserPoints) -> anyhow::Result<UserPoints> {
        let client = self.pool.get().await?;
        let query = r#"
            INSERT INTO points.users AS u (address, trade_points, liquidity_points)
            VALUES ($1, $2::text::numeric, $3::text::numeric)
            ON CONFLICT (address) DO UPDATE SET
                trade_points = u.trade_points + EXCLUDED.trade_points,
                liquidity_points = u.liquidity_points + EXCLUDED.liquidity_points
            RETURNING
                address,
                trade_points::text AS trade_points,
                liquidity_points::text AS liquidity_points
        "#;

        let row = client
            .query_one(
                query,
                &[
                    &address_text(&delta.user),
                    &delta.trade_points.to_string(),
                    &delta.liquidity_points.to_string(),
                ],
            )
            .await
            .with_context(|| format!("Failed to increase points of user {}", delta.user))?;

        user_points_from_row(&row)
    }

    /// Subtract `delta` from a user's points.
    ///
    /// Nothing changes when the user is unknown or either balance would go
    /// negative.
    pub async fn decrease_user_points(&self, delta: &UserPoints) -> anyhow::Result<UserPoints> {
        let client = self.pool.get().await?;
        let query = r#"
            UPDATE points.users SET
                trade_points = trade_points - $2::text::numeric,
                liquidity_points = liquidity_points - $3::text::numeric
            WHERE address = $1
                AND trade_points >= $2::text::numeric
                AND liquidity_points >= $3::text::numeric
            RETURNING
                address,
                trade_points::text AS trade_points,
                liquidity_points::text AS liquidity_points
        "#;

        let row = client
            .query_opt(
                query,
                &[
                    &address_text(&delta.user),
                    &delta.trade_points.to_string(),
                    &delta.liquidity_points.to_string(),
                ],
            )
            .await
            .with_context(|| format!("Failed to decrease points of user {}", delta.user))?;

        match row {
            Some(row) => user_points_from_row(&row),
            None => Err(anyhow::anyhow!(
                "User {} is unknown or has fewer points than requested",
                delta.user
            )),
        }
    }
}
