pub mod abis;
pub mod admin;
pub mod chain;
pub mod config;
pub mod db;
pub mod error;
pub mod oracle;
pub mod source;
pub mod utils;
pub mod worker;

#[cfg(test)]
mod test_utils;

pub use config::Settings;
pub use db::Database;
pub use worker::Pipeline;
