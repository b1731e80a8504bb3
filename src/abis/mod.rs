pub mod erc20;
pub mod v2;

pub use erc20::IERC20;
pub use v2::{IUniswapV2Factory, IUniswapV2Pair};
