pub mod bootstrap;
pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod stack;
pub mod terraform;
pub mod units;
pub mod utils;

pub use cli::{Cli, Commands};
pub use error::{Error, Result};
