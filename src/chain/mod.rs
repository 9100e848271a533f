//! Sentinel Chain
//!
//! Tamper-evident, append-only log of threat reports. Each entry commits to
//! its payload and to its predecessor with SHA-256, so editing stored history
//! is detected on the next load or verification.

pub mod canonical;
pub mod entry;
pub mod log;
pub mod store;
pub mod validator;

pub use entry::{create_genesis_entry, ChainEntry, GENESIS_PREVIOUS_HASH};
pub use log::{AppendOutcome, ChainLog};
pub use store::{ChainDocument, ChainStore, ReadOutcome, StoreOptions, CHAIN_VERSION};
pub use validator::{check, recover, BreakReason, ChainBreak, GenesisCause, Recovery, VerifyReport};
