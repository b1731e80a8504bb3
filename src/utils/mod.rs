//! Utility functions for the points service.
//!
//! - [`conversion`] - U256 to decimal scaling, hex encoding
//! - [`time`] - Timestamp formatting for log lines

mod conversion;
mod time;

pub use conversion::{hex_encode, ratio, u256_to_bigint, u256_to_decimal};
pub use time::format_ts;
