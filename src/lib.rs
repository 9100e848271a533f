pub mod api;
pub mod chain;
pub mod config;
pub mod error;

pub use error::SentinelError;
