//! Chain Entry
//!
//! Defines the immutable, hash-linked record stored in the sentinel chain.
//! Each entry commits to its payload (`data_hash`) and to its predecessor
//! (`previous_hash`), and `hash` commits to both plus the timestamp.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};

use crate::chain::canonical::canonical_bytes;

/// `previous_hash` of the first entry in every chain.
pub const GENESIS_PREVIOUS_HASH: &str = "0";

/// Text layout of entry timestamps (UTC, second resolution).
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// One record of the chain, serialized with the persisted field names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainEntry {
    #[serde(rename = "data")]
    pub payload: Value,
    pub previous_hash: String,
    pub timestamp: String,
    #[serde(rename = "data_hash")]
    pub payload_hash: String,
    #[serde(rename = "hash")]
    pub entry_hash: String,
}

impl ChainEntry {
    /// Create a new entry stamped with the current time
    pub fn new(payload: Value, previous_hash: impl Into<String>) -> Self {
        Self::at(payload, previous_hash, format_timestamp(Utc::now()))
    }

    /// Create a new entry with an explicit timestamp
    pub fn at(payload: Value, previous_hash: impl Into<String>, timestamp: impl Into<String>) -> Self {
        let previous_hash = previous_hash.into();
        let timestamp = timestamp.into();
        let payload_hash = payload_digest(&payload);
        let entry_hash = entry_digest(&payload_hash, &previous_hash, &timestamp);

        Self {
            payload,
            previous_hash,
            timestamp,
            payload_hash,
            entry_hash,
        }
    }

    /// Rebuild an entry from stored fields. Every field is trusted as given;
    /// use the `verify_*` methods to check them.
    pub fn from_parts(
        payload: Value,
        previous_hash: String,
        timestamp: String,
        payload_hash: String,
        entry_hash: String,
    ) -> Self {
        Self {
            payload,
            previous_hash,
            timestamp,
            payload_hash,
            entry_hash,
        }
    }

    /// Parse a stored entry representation
    pub fn from_representation(value: &Value) -> Result<Self, serde_json::Error> {
        Self::deserialize(value)
    }

    /// The five fields as a plain JSON object
    pub fn representation(&self) -> Value {
        json!({
            "data": self.payload,
            "previous_hash": self.previous_hash,
            "timestamp": self.timestamp,
            "data_hash": self.payload_hash,
            "hash": self.entry_hash,
        })
    }

    /// Whether the stored payload hash matches the payload
    pub fn verify_payload_hash(&self) -> bool {
        self.payload_hash == payload_digest(&self.payload)
    }

    /// Whether the stored entry hash matches the recomputed payload hash,
    /// previous hash and timestamp
    pub fn verify_entry_hash(&self) -> bool {
        let payload_hash = payload_digest(&self.payload);
        self.entry_hash == entry_digest(&payload_hash, &self.previous_hash, &self.timestamp)
    }

    /// Whether this entry names `previous` as its predecessor
    pub fn links_to(&self, previous: &ChainEntry) -> bool {
        self.previous_hash == previous.entry_hash
    }

    pub fn is_genesis_linked(&self) -> bool {
        self.previous_hash == GENESIS_PREVIOUS_HASH
    }

    /// Get a human-readable summary
    pub fn summary(&self) -> String {
        let kind = self
            .payload
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or("unknown");
        format!("{} @ {} ({})", kind, self.timestamp, short_hash(&self.entry_hash))
    }
}

/// SHA-256 of `bytes`, lowercase hex
pub fn digest(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Digest of a payload's canonical encoding
pub fn payload_digest(payload: &Value) -> String {
    digest(&canonical_bytes(payload))
}

/// Digest linking a payload hash, its predecessor and its timestamp
pub fn entry_digest(payload_hash: &str, previous_hash: &str, timestamp: &str) -> String {
    let commitment = json!({
        "data_hash": payload_hash,
        "previous_hash": previous_hash,
        "timestamp": timestamp,
    });
    digest(&canonical_bytes(&commitment))
}

pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.format(TIMESTAMP_FORMAT).to_string()
}

/// Payload of the start event every chain begins with
pub fn genesis_payload() -> Value {
    json!({
        "type": "genesis",
        "message": "Zero-Day Sentinel Started",
    })
}

/// Genesis entry stamped with the current time
pub fn create_genesis_entry() -> ChainEntry {
    ChainEntry::new(genesis_payload(), GENESIS_PREVIOUS_HASH)
}

fn short_hash(hash: &str) -> &str {
    hash.get(..12).unwrap_or(hash)
}
