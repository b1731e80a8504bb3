use alloy::primitives::Address;
use serde::{Deserialize, Serialize};

/// ERC-20 metadata. Immutable once fetched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenInfo {
    pub address: Address,
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
}

/// Composition of an AMM pool. Immutable once fetched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolInfo {
    pub address: Address,
    pub token0: TokenInfo,
    pub token1: TokenInfo,
}

impl PoolInfo {
    pub fn token(&self, token: Address) -> Option<&TokenInfo> {
        if self.token0.address == token {
            Some(&self.token0)
        } else if self.token1.address == token {
            Some(&self.token1)
        } else {
            None
        }
    }

    /// The token on the other side of `token`, if `token` belongs to the pool.
    pub fn other(&self, token: Address) -> Option<&TokenInfo> {
        if self.token0.address == token {
            Some(&self.token1)
        } else if self.token1.address == token {
            Some(&self.token0)
        } else {
            None
        }
    }

    pub fn label(&self) -> String {
        format!("{}/{}", self.token0.symbol, self.token1.symbol)
    }
}
