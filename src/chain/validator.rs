//! Chain Validation and Recovery
//!
//! Recomputes every commitment of a stored chain and decides what part of it
//! can still be trusted. The load path uses [`recover`] to rebuild state;
//! `verify` uses [`check`] to report on the same walk without acting on it.
//!
//! Document-level problems (absent, unparsable, wrong version, legacy shape,
//! an entry missing a field) discard everything. A hash or link mismatch at
//! index `i` keeps the prefix `[0, i)`; a mismatch at index 0 keeps nothing.
//! A field that is present but not a string can never match a recomputed
//! digest, so it counts as a mismatch at that entry.

use serde_json::Value;
use std::fmt;
use tracing::debug;

use crate::chain::entry::{payload_digest, ChainEntry};
use crate::chain::store::{json_type, ReadOutcome};

/// Keys every stored entry must carry.
const REQUIRED_FIELDS: [&str; 5] = ["data", "previous_hash", "timestamp", "data_hash", "hash"];

/// Why a walk stopped at a given entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakReason {
    /// Stored `data_hash` does not match the payload.
    PayloadHashMismatch,
    /// Stored `hash` does not match the recomputed commitment.
    EntryHashMismatch,
    /// `previous_hash` does not name the preceding entry.
    BrokenLink,
    /// First entry does not start from the genesis sentinel.
    NotGenesisLinked,
}

impl fmt::Display for BreakReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::PayloadHashMismatch => "payload hash does not match its data",
            Self::EntryHashMismatch => "entry hash does not match its contents",
            Self::BrokenLink => "previous hash does not match the preceding entry",
            Self::NotGenesisLinked => "first entry does not link to the genesis sentinel",
        };
        f.write_str(text)
    }
}

/// First failing entry of a chain walk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainBreak {
    pub index: usize,
    pub reason: BreakReason,
}

impl fmt::Display for ChainBreak {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Invalid entry at index {}: {}", self.index, self.reason)
    }
}

/// An entry that could not be parsed at all
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MalformedEntry {
    pub index: usize,
    pub message: String,
}

impl fmt::Display for MalformedEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Malformed entry at index {}: {}", self.index, self.message)
    }
}

/// Why nothing of the stored chain survives
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenesisCause {
    Absent,
    Corrupt(String),
    WrongVersion(String),
    OldFormat,
    Empty,
    Malformed(MalformedEntry),
    Tampered(BreakReason),
}

impl fmt::Display for GenesisCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Absent => f.write_str("no chain document found"),
            Self::Corrupt(reason) => write!(f, "chain document is corrupt: {}", reason),
            Self::WrongVersion(found) => write!(f, "incompatible chain version {}", found),
            Self::OldFormat => f.write_str("chain document uses the legacy list format"),
            Self::Empty => f.write_str("chain document holds no entries"),
            Self::Malformed(m) => write!(f, "{}", m),
            Self::Tampered(reason) => write!(f, "tampering detected at index 0: {}", reason),
        }
    }
}

/// Result of validating a stored chain for loading
#[derive(Debug, Clone, PartialEq)]
pub enum Recovery {
    /// Every entry checks out.
    Intact(Vec<ChainEntry>),
    /// Entries before the first break, which is reported alongside.
    Truncated {
        entries: Vec<ChainEntry>,
        at: ChainBreak,
    },
    /// Nothing can be kept; the log must start over from a new genesis.
    NeedsGenesis(GenesisCause),
}

/// Result of checking a stored chain without acting on it
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyReport {
    Valid { length: usize },
    Invalid { index: Option<usize>, reason: String },
}

impl VerifyReport {
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid { .. })
    }

    /// Get a human-readable summary
    pub fn summary(&self) -> String {
        match self {
            Self::Valid { length } => format!("Chain is valid ({} entries)", length),
            Self::Invalid { reason, .. } => reason.clone(),
        }
    }
}

/// Stored entries that parsed, up to the first one with a mistyped field
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedChain {
    pub entries: Vec<ChainEntry>,
    /// Break reported for the entry right after `entries`, if parsing stopped early.
    pub mistyped: Option<ChainBreak>,
}

/// Parse stored representations. Any entry missing a field fails the lot;
/// a wrongly typed field ends the parsed prefix at that entry.
pub fn parse_entries(raw: &[Value]) -> Result<ParsedChain, MalformedEntry> {
    for (index, value) in raw.iter().enumerate() {
        check_fields(index, value)?;
    }

    let mut entries = Vec::with_capacity(raw.len());
    for (index, value) in raw.iter().enumerate() {
        match ChainEntry::from_representation(value) {
            Ok(entry) => entries.push(entry),
            Err(e) => {
                debug!("Entry {} has a mistyped field: {}", index, e);
                return Ok(ParsedChain {
                    entries,
                    mistyped: Some(ChainBreak {
                        index,
                        reason: mistyped_reason(value),
                    }),
                });
            }
        }
    }

    Ok(ParsedChain {
        entries,
        mistyped: None,
    })
}

fn check_fields(index: usize, value: &Value) -> Result<(), MalformedEntry> {
    let fields = value.as_object().ok_or_else(|| MalformedEntry {
        index,
        message: format!("expected an object, found {}", json_type(value)),
    })?;

    match REQUIRED_FIELDS.iter().find(|name| !fields.contains_key(**name)) {
        Some(missing) => Err(MalformedEntry {
            index,
            message: format!("missing field `{}`", missing),
        }),
        None => Ok(()),
    }
}

/// Which check a mistyped entry fails first: the payload commitment when
/// `data_hash` is unusable, the entry commitment otherwise
fn mistyped_reason(value: &Value) -> BreakReason {
    let stored = value.get("data_hash").and_then(Value::as_str);
    let recomputed = value.get("data").map(payload_digest);
    match (stored, recomputed) {
        (Some(stored), Some(recomputed)) if stored == recomputed => BreakReason::EntryHashMismatch,
        _ => BreakReason::PayloadHashMismatch,
    }
}

/// Walk the chain from index 0 and return the first entry that fails a
/// content, commitment or link check
pub fn find_break(entries: &[ChainEntry]) -> Option<ChainBreak> {
    for (index, entry) in entries.iter().enumerate() {
        let reason = if !entry.verify_payload_hash() {
            Some(BreakReason::PayloadHashMismatch)
        } else if !entry.verify_entry_hash() {
            Some(BreakReason::EntryHashMismatch)
        } else if index == 0 && !entry.is_genesis_linked() {
            Some(BreakReason::NotGenesisLinked)
        } else if index > 0 && !entry.links_to(&entries[index - 1]) {
            // a self-consistent entry can still point at the wrong predecessor
            Some(BreakReason::BrokenLink)
        } else {
            None
        };

        if let Some(reason) = reason {
            return Some(ChainBreak { index, reason });
        }
        debug!("Entry {} verified", index);
    }
    None
}

/// Validate stored representations declared under `version`
pub fn validate(version: &str, expected_version: &str, raw: &[Value]) -> Recovery {
    if version != expected_version {
        return Recovery::NeedsGenesis(GenesisCause::WrongVersion(version.to_string()));
    }

    if raw.is_empty() {
        return Recovery::NeedsGenesis(GenesisCause::Empty);
    }
    let ParsedChain { mut entries, mistyped } = match parse_entries(raw) {
        Ok(parsed) => parsed,
        Err(malformed) => return Recovery::NeedsGenesis(GenesisCause::Malformed(malformed)),
    };

    // the parsed prefix is walked first, so an earlier mismatch wins
    match find_break(&entries).or(mistyped) {
        None => Recovery::Intact(entries),
        Some(at) if at.index == 0 => Recovery::NeedsGenesis(GenesisCause::Tampered(at.reason)),
        Some(at) => {
            entries.truncate(at.index);
            Recovery::Truncated { entries, at }
        }
    }
}

/// Decide what survives of whatever the store found
pub fn recover(outcome: ReadOutcome, expected_version: &str) -> Recovery {
    match outcome {
        ReadOutcome::Loaded(doc) => validate(&doc.version, expected_version, &doc.chain),
        ReadOutcome::Absent => Recovery::NeedsGenesis(GenesisCause::Absent),
        ReadOutcome::Corrupt(reason) => Recovery::NeedsGenesis(GenesisCause::Corrupt(reason)),
        ReadOutcome::WrongVersion(found) => Recovery::NeedsGenesis(GenesisCause::WrongVersion(found)),
        ReadOutcome::OldFormat => Recovery::NeedsGenesis(GenesisCause::OldFormat),
    }
}

/// Report on whatever the store found, without recovering anything
pub fn check(outcome: ReadOutcome, expected_version: &str) -> VerifyReport {
    match recover(outcome, expected_version) {
        Recovery::Intact(entries) => VerifyReport::Valid {
            length: entries.len(),
        },
        Recovery::Truncated { at, .. } => VerifyReport::Invalid {
            index: Some(at.index),
            reason: at.to_string(),
        },
        Recovery::NeedsGenesis(GenesisCause::Tampered(reason)) => VerifyReport::Invalid {
            index: Some(0),
            reason: ChainBreak { index: 0, reason }.to_string(),
        },
        Recovery::NeedsGenesis(GenesisCause::Malformed(malformed)) => VerifyReport::Invalid {
            index: Some(malformed.index),
            reason: malformed.to_string(),
        },
        Recovery::NeedsGenesis(cause) => VerifyReport::Invalid {
            index: None,
            reason: format!("Chain cannot be verified: {}", cause),
        },
    }
}
