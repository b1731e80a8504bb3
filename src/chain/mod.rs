mod caller;
mod metadata;
mod types;

pub use caller::{ChainCaller, RpcChainCaller};
pub use metadata::MetadataCache;
pub use types::{PoolInfo, TokenInfo};
