#![allow(dead_code)]

use sentinel_chain::chain::{ChainLog, ChainStore, StoreOptions};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Store rooted in a test directory, without fsync
pub fn test_store(dir: &Path) -> ChainStore {
    ChainStore::new(
        chain_path(dir),
        StoreOptions {
            lock_timeout: Duration::from_secs(2),
            fsync_writes: false,
        },
    )
}

pub fn chain_path(dir: &Path) -> PathBuf {
    dir.join("blockchain.json")
}

pub fn open_log(dir: &Path) -> ChainLog {
    ChainLog::open(test_store(dir)).expect("Failed to open chain log")
}

/// A distinct threat payload per `n`
pub fn threat(kind: &str, n: usize) -> Value {
    json!({
        "type": kind,
        "details": {"ip": format!("10.0.0.{}", n), "sequence": n}
    })
}

/// Read the stored document as raw JSON
pub fn read_document(dir: &Path) -> Value {
    let raw = std::fs::read_to_string(chain_path(dir)).expect("Failed to read chain document");
    serde_json::from_str(&raw).expect("Chain document is not JSON")
}

/// Overwrite the stored document behind the log's back
pub fn write_document(dir: &Path, document: &Value) {
    let raw = serde_json::to_string_pretty(document).expect("Failed to encode document");
    std::fs::write(chain_path(dir), raw).expect("Failed to write chain document");
}

/// Apply `edit` to the stored entry at `index`
pub fn tamper_entry(dir: &Path, index: usize, edit: impl FnOnce(&mut Value)) {
    let mut document = read_document(dir);
    edit(&mut document["chain"][index]);
    write_document(dir, &document);
}
