//! Operator commands: pool weights and manual point adjustments.

use alloy::primitives::Address;
use anyhow::{bail, Context};
use bigdecimal::BigDecimal;
use log::info;
use num_traits::{Signed, Zero};

use crate::db::{
    models::{PoolWeight, UserPoints},
    PostgresClient,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Adjustment {
    Increase,
    Decrease,
}

/// Weights for a new or replaced pool weight row.
pub fn new_pool_weight(
    pool: Address,
    trade_weight: BigDecimal,
    liquidity_weight: BigDecimal,
) -> anyhow::Result<PoolWeight> {
    if trade_weight.is_negative() || liquidity_weight.is_negative() {
        bail!("Pool weights cannot be negative");
    }

    Ok(PoolWeight {
        pool,
        trade_weight,
        liquidity_weight,
    })
}

/// Keep the positive weights of a partial update; at least one must remain.
pub fn weight_update(
    trade_weight: Option<BigDecimal>,
    liquidity_weight: Option<BigDecimal>,
) -> anyhow::Result<(Option<BigDecimal>, Option<BigDecimal>)> {
    let trade_weight = trade_weight.filter(|w| w.is_positive());
    let liquidity_weight = liquidity_weight.filter(|w| w.is_positive());

    if trade_weight.is_none() && liquidity_weight.is_none() {
        bail!("At least one positive --trade or --liquidity is required");
    }

    Ok((trade_weight, liquidity_weight))
}

/// Amounts of a manual adjustment. Missing amounts count as zero.
pub fn points_delta(
    user: Address,
    trade_points: Option<BigDecimal>,
    liquidity_points: Option<BigDecimal>,
) -> anyhow::Result<UserPoints> {
    let delta = UserPoints {
        user,
        trade_points: trade_points.unwrap_or_else(BigDecimal::zero),
        liquidity_points: liquidity_points.unwrap_or_else(BigDecimal::zero),
    };

    if delta.trade_points.is_negative() || delta.liquidity_points.is_negative() {
        bail!("Point amounts cannot be negative, use `decrease` instead");
    }

    if delta.trade_points.is_zero() && delta.liquidity_points.is_zero() {
        bail!("At least one non-zero --trade or --liquidity is required");
    }

    Ok(delta)
}

pub async fn add_pool_weight(
    db: &PostgresClient,
    pool: Address,
    trade_weight: BigDecimal,
    liquidity_weight: BigDecimal,
) -> anyhow::Result<()> {
    let weight = new_pool_weight(pool, trade_weight, liquidity_weight)?;
    db.upsert_pool_weight(&weight).await?;

    info!(
        "Pool {} weights set: trade {}, liquidity {}",
        pool, weight.trade_weight, weight.liquidity_weight
    );
    Ok(())
}

pub async fn update_pool_weight(
    db: &PostgresClient,
    pool: Address,
    trade_weight: Option<BigDecimal>,
    liquidity_weight: Option<BigDecimal>,
) -> anyhow::Result<()> {
    let (trade_weight, liquidity_weight) = weight_update(trade_weight, liquidity_weight)?;

    if !db
        .update_pool_weight(pool, trade_weight.as_ref(), liquidity_weight.as_ref())
        .await?
    {
        bail!("Pool {} has no weights yet, use `pool-weight add`", pool);
    }

    info!("Pool {} weights updated", pool);
    Ok(())
}

pub async fn list_pool_weights(db: &PostgresClient) -> anyhow::Result<()> {
    let weights = db.list_pool_weights().await?;

    if weights.is_empty() {
        info!("No pool weights found");
        return Ok(());
    }

    info!("{} pool weights:", weights.len());
    for (i, view) in weights.iter().enumerate() {
        info!(
            "#{} {} {} trade {} liquidity {}",
            i,
            view.label(),
            view.weight.pool,
            view.weight.trade_weight,
            view.weight.liquidity_weight
        );
    }

    Ok(())
}

pub async fn get_user_points(db: &PostgresClient, user: Address) -> anyhow::Result<()> {
    let points = db
        .get_user_points(user)
        .await?
        .with_context(|| format!("User {} has no points", user))?;

    info!(
        "User {}: trade {}, liquidity {}",
        points.user, points.trade_points, points.liquidity_points
    );
    Ok(())
}

pub async fn adjust_user_points(
    db: &PostgresClient,
    user: Address,
    trade_points: Option<BigDecimal>,
    liquidity_points: Option<BigDecimal>,
    adjustment: Adjustment,
) -> anyhow::Result<()> {
    let delta = points_delta(user, trade_points, liquidity_points)?;

    let points = match adjustment {
        Adjustment::Increase => db.increase_user_points(&delta).await?,
        Adjustment::Decrease => db.decrease_user_points(&delta).await?,
    };

    info!(
        "User {} now has trade {}, liquidity {}",
        points.user, points.trade_points, points.liquidity_points
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn dec(s: &str) -> BigDecimal {
        BigDecimal::from_str(s).unwrap()
    }

    #[test]
    fn test_new_pool_weight_rejects_negative() {
        let pool = Address::with_last_byte(1);
        assert!(new_pool_weight(pool, dec("-1"), dec("1")).is_err());

        let weight = new_pool_weight(pool, dec("0"), dec("1.5")).unwrap();
        assert_eq!(weight.liquidity_weight, dec("1.5"));
    }

    #[test]
    fn test_weight_update_applies_positive_values_only() {
        assert!(weight_update(None, None).is_err());
        assert!(weight_update(Some(dec("0")), Some(dec("-2"))).is_err());

        let (trade, liquidity) = weight_update(Some(dec("3")), Some(dec("0"))).unwrap();
        assert_eq!(trade, Some(dec("3")));
        assert_eq!(liquidity, None);
    }

    #[test]
    fn test_points_delta_requires_a_non_zero_amount() {
        let user = Address::with_last_byte(7);
        assert!(points_delta(user, None, None).is_err());
        assert!(points_delta(user, Some(dec("0")), Some(dec("0"))).is_err());
        assert!(points_delta(user, Some(dec("-5")), None).is_err());

        let delta = points_delta(user, None, Some(dec("12.5"))).unwrap();
        assert!(delta.trade_points.is_zero());
        assert_eq!(delta.liquidity_points, dec("12.5"));
    }
}
