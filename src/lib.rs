pub mod cli;
pub mod commands;
pub mod config;
pub mod controller;
pub mod customer;
pub mod error;
pub mod logging;
pub mod market;
pub mod pool;
pub mod scheduler;
pub mod storage;
pub mod tui;
pub mod vendor;

pub use error::{Error, Result};
