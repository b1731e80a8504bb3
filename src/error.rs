//! Typed errors for the places where callers branch on the failure kind.
//!
//! Everything else in the crate propagates `anyhow::Error` with context, the
//! kinds below are recovered with `downcast_ref` where a stage needs them.

use alloy::primitives::Address;
use thiserror::Error;

/// Failures of the price oracle and its strategies.
#[derive(Debug, Error)]
pub enum PriceError {
    /// No pair or pool routes `base` to `quote`. Consumed by the fallback
    /// chain, never reported as a failure on its own.
    #[error("no route from {base} to {quote}")]
    NotFound { base: Address, quote: Address },

    /// None of the pricing strategies could price `token`.
    #[error("no pricing strategy can price token {token} in pool {pool}")]
    PoolNotFound { pool: Address, token: Address },

    #[error("token {token} is not part of pool {pool}")]
    TokenNotInPool { pool: Address, token: Address },

    /// Chain call failed (timeout, transport, revert). Transient.
    #[error(transparent)]
    Upstream(#[from] anyhow::Error),
}

impl PriceError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, PriceError::NotFound { .. })
    }

    /// No strategy can ever price the token without a configuration change.
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            PriceError::PoolNotFound { .. } | PriceError::TokenNotInPool { .. }
        )
    }
}

/// Failures raised by the pipeline stages themselves.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("no valid price samples for token {token} in blocks {min_block}..={max_block}")]
    NoPriceSamples {
        token: Address,
        min_block: u64,
        max_block: u64,
    },

    #[error("pool {0} has no configured weight")]
    MissingPoolWeight(Address),

    #[error("{kind} data of pool {pool} at {timestamp} is not available yet")]
    ActivityNotReady {
        kind: &'static str,
        pool: Address,
        timestamp: i64,
    },

    #[error("{kind} pagination of pool {pool} stalled at {fetched}/{total}")]
    PaginationStalled {
        kind: &'static str,
        pool: Address,
        fetched: usize,
        total: usize,
    },

    #[error("scan error ({status}): {message}")]
    Scan { status: String, message: String },
}

impl SyncError {
    /// Errors that will not clear up by retrying alone and need an operator.
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            SyncError::NoPriceSamples { .. } | SyncError::MissingPoolWeight(_)
        )
    }
}

/// Whether an error chain carries a permanent [`SyncError`] or [`PriceError`].
pub fn is_permanent(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        cause
            .downcast_ref::<SyncError>()
            .is_some_and(SyncError::is_permanent)
            || cause
                .downcast_ref::<PriceError>()
                .is_some_and(PriceError::is_permanent)
    })
}
