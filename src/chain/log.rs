//! Chain Log
//!
//! Owns the in-memory chain and keeps it in step with the store. All
//! mutations (initial load, append, reset) run under one mutex from the
//! duplicate check through the final write, so two appends can never link to
//! the same tail. Store calls made from async methods run on the blocking
//! pool, since they may wait on another process's file lock.

use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::chain::entry::{create_genesis_entry, payload_digest, ChainEntry, GENESIS_PREVIOUS_HASH};
use crate::chain::store::ChainStore;
use crate::chain::validator::{self, GenesisCause, Recovery, VerifyReport};
use crate::error::{Result, SentinelError};

/// Outcome of an append
#[derive(Debug, Clone, PartialEq)]
pub enum AppendOutcome {
    Accepted(ChainEntry),
    /// An entry with the same canonical payload already exists.
    Duplicate,
}

/// Single-writer owner of the tamper-evident chain
pub struct ChainLog {
    store: ChainStore,
    entries: Mutex<Vec<ChainEntry>>,
}

impl ChainLog {
    /// Load the stored chain, recovering what can be trusted, and persist a
    /// fresh genesis when nothing can
    pub fn open(store: ChainStore) -> Result<Self> {
        let recovery = validator::recover(store.read()?, store.version());

        let entries = match recovery {
            Recovery::Intact(entries) => {
                info!("Loaded {} chain entries from {}", entries.len(), store.path().display());
                entries
            }
            Recovery::Truncated { entries, at } => {
                warn!(
                    "Tampering detected: {}. Recovering the first {} entries.",
                    at,
                    entries.len()
                );
                store.write(&entries)?;
                entries
            }
            Recovery::NeedsGenesis(cause) => {
                if cause == GenesisCause::Absent {
                    info!("No chain at {}, starting a new one", store.path().display());
                } else {
                    warn!("Discarding stored chain ({}). Starting from genesis.", cause);
                }
                let entries = vec![create_genesis_entry()];
                store.write(&entries)?;
                entries
            }
        };

        Ok(Self {
            store,
            entries: Mutex::new(entries),
        })
    }

    /// Delete any stored chain, then open
    pub fn open_fresh(store: ChainStore) -> Result<Self> {
        if store.remove()? {
            warn!("Removed existing chain at {}", store.path().display());
        }
        Self::open(store)
    }

    /// Append `payload` unless an entry with the same canonical payload exists
    pub async fn append(&self, payload: Value) -> Result<AppendOutcome> {
        let mut entries = self.entries.lock().await;

        let payload_hash = payload_digest(&payload);
        if entries.iter().any(|entry| entry.payload_hash == payload_hash) {
            debug!("Rejected duplicate payload {}", payload_hash);
            return Ok(AppendOutcome::Duplicate);
        }

        let previous_hash = entries
            .last()
            .map(|tail| tail.entry_hash.clone())
            .unwrap_or_else(|| GENESIS_PREVIOUS_HASH.to_string());
        let entry = ChainEntry::new(payload, previous_hash);
        entries.push(entry.clone());

        let pending = entries.clone();
        if let Err(e) = self.on_store(move |store| store.write(&pending)).await {
            entries.pop();
            return Err(e);
        }

        debug!("Appended chain entry: {}", entry.summary());
        Ok(AppendOutcome::Accepted(entry))
    }

    /// Re-read the store and check every stored entry. Never mutates.
    pub async fn verify(&self) -> Result<VerifyReport> {
        let outcome = self.on_store(|store| store.read()).await?;
        let report = validator::check(outcome, self.store.version());
        match &report {
            VerifyReport::Valid { length } => info!("Chain verification passed: {} entries", length),
            VerifyReport::Invalid { reason, .. } => warn!("Chain verification failed: {}", reason),
        }
        Ok(report)
    }

    /// Replace the whole chain with a new genesis entry. Prior history is gone.
    pub async fn reset(&self) -> Result<Vec<ChainEntry>> {
        let mut entries = self.entries.lock().await;

        let fresh = vec![create_genesis_entry()];
        let pending = fresh.clone();
        self.on_store(move |store| store.write(&pending)).await?;
        *entries = fresh;

        warn!("Chain reset to a new genesis entry");
        Ok(entries.clone())
    }

    /// Copy of the current chain
    pub async fn snapshot(&self) -> Vec<ChainEntry> {
        self.entries.lock().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    /// Hash the next appended entry will link to
    pub async fn head_hash(&self) -> String {
        self.entries
            .lock()
            .await
            .last()
            .map(|tail| tail.entry_hash.clone())
            .unwrap_or_default()
    }

    pub fn store(&self) -> &ChainStore {
        &self.store
    }

    /// Run a store operation on the blocking pool and wait for it
    async fn on_store<T, F>(&self, op: F) -> Result<T>
    where
        F: FnOnce(&ChainStore) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let store = self.store.clone();
        tokio::task::spawn_blocking(move || op(&store))
            .await
            .map_err(|e| {
                SentinelError::io(self.store.path().display().to_string(), std::io::Error::other(e))
            })?
    }
}
