//! Chain Store
//!
//! Durable storage for the whole chain as a single JSON document:
//! `{"version": ..., "chain": [...]}`. Every read and every write holds an
//! exclusive `flock(2)` advisory lock on a sidecar `<path>.lock` file for the
//! duration of that one operation. Writes go to a temp file that is renamed
//! over the document, so a lock-respecting reader never sees half a chain.

use nix::errno::Errno;
use nix::fcntl::{flock, FlockArg};
use serde::{Deserialize, Serialize};
use serde_json::ser::PrettyFormatter;
use serde_json::Value;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::chain::entry::ChainEntry;
use crate::error::{Result, SentinelError};

/// Version tag of the persisted document layout.
pub const CHAIN_VERSION: &str = "1.0";

/// Version assumed when a document carries no tag at all.
const UNTAGGED_VERSION: &str = "0.0";

const LOCK_RETRY_INTERVAL: Duration = Duration::from_millis(10);

/// Persisted document layout
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainDocument {
    pub version: String,
    pub chain: Vec<Value>,
}

/// What a read found on disk
#[derive(Debug, Clone)]
pub enum ReadOutcome {
    Loaded(ChainDocument),
    Absent,
    Corrupt(String),
    WrongVersion(String),
    /// Bare top-level array written by the first releases.
    OldFormat,
}

#[derive(Debug, Clone)]
pub struct StoreOptions {
    pub lock_timeout: Duration,
    /// `fsync` the document before it replaces the previous one.
    pub fsync_writes: bool,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            lock_timeout: Duration::from_secs(5),
            fsync_writes: true,
        }
    }
}

/// Lock-guarded storage for one chain document
#[derive(Debug, Clone)]
pub struct ChainStore {
    path: PathBuf,
    lock_path: PathBuf,
    version: String,
    options: StoreOptions,
}

impl ChainStore {
    pub fn new(path: impl Into<PathBuf>, options: StoreOptions) -> Self {
        let path = path.into();
        let lock_path = sidecar(&path, "lock");
        Self {
            path,
            lock_path,
            version: CHAIN_VERSION.to_string(),
            options,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn lock_path(&self) -> &Path {
        &self.lock_path
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// Read and classify the stored document
    pub fn read(&self) -> Result<ReadOutcome> {
        let _guard = self.lock()?;
        self.read_unlocked()
    }

    /// Like [`read`](Self::read), but leaves the filesystem untouched. The
    /// lock is only taken when its sidecar already exists; otherwise no
    /// writer has run yet, and renames keep any document it writes whole.
    pub fn read_only(&self) -> Result<ReadOutcome> {
        if self.lock_path.exists() {
            self.read()
        } else {
            self.read_unlocked()
        }
    }

    fn read_unlocked(&self) -> Result<ReadOutcome> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(ReadOutcome::Absent),
            Err(e) => return Err(SentinelError::io(self.path.display().to_string(), e)),
        };

        Ok(self.classify(&contents))
    }

    fn classify(&self, contents: &str) -> ReadOutcome {
        let document: Value = match serde_json::from_str(contents) {
            Ok(document) => document,
            Err(e) => return ReadOutcome::Corrupt(format!("unparsable document: {}", e)),
        };

        let fields = match document {
            Value::Array(_) => return ReadOutcome::OldFormat,
            Value::Object(fields) => fields,
            other => {
                return ReadOutcome::Corrupt(format!(
                    "expected a JSON object at the top level, found {}",
                    json_type(&other)
                ))
            }
        };

        // only the exact string tag matches; `1.0` as a number does not
        match fields.get("version") {
            Some(Value::String(v)) if *v == self.version => {}
            Some(Value::String(v)) => return ReadOutcome::WrongVersion(v.clone()),
            Some(other) => {
                return ReadOutcome::WrongVersion(format!("{} ({})", other, json_type(other)))
            }
            None => return ReadOutcome::WrongVersion(UNTAGGED_VERSION.to_string()),
        }

        match fields.get("chain") {
            Some(Value::Array(chain)) => ReadOutcome::Loaded(ChainDocument {
                version: self.version.clone(),
                chain: chain.clone(),
            }),
            Some(other) => ReadOutcome::Corrupt(format!(
                "`chain` must be an array, found {}",
                json_type(other)
            )),
            None => ReadOutcome::Corrupt("missing `chain` field".to_string()),
        }
    }

    /// Replace the stored document with `entries`
    pub fn write(&self, entries: &[ChainEntry]) -> Result<()> {
        let document = ChainDocument {
            version: self.version.clone(),
            chain: entries.iter().map(ChainEntry::representation).collect(),
        };

        let mut buffer = Vec::new();
        let mut serializer =
            serde_json::Serializer::with_formatter(&mut buffer, PrettyFormatter::with_indent(b"    "));
        document.serialize(&mut serializer)?;
        buffer.push(b'\n');

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .map_err(|e| SentinelError::io(parent.display().to_string(), e))?;
        }

        let _guard = self.lock()?;
        let tmp_path = sidecar(&self.path, "tmp");
        if let Err(e) = self.replace_with(&tmp_path, &buffer) {
            let _ = fs::remove_file(&tmp_path);
            return Err(e);
        }

        debug!("Wrote {} entries to {}", entries.len(), self.path.display());
        Ok(())
    }

    fn replace_with(&self, tmp_path: &Path, contents: &[u8]) -> Result<()> {
        let tmp_name = tmp_path.display().to_string();
        let mut file = File::create(tmp_path).map_err(|e| SentinelError::io(tmp_name.clone(), e))?;
        file.write_all(contents)
            .map_err(|e| SentinelError::io(tmp_name.clone(), e))?;
        if self.options.fsync_writes {
            file.sync_all().map_err(|e| SentinelError::io(tmp_name.clone(), e))?;
        }
        drop(file);

        fs::rename(tmp_path, &self.path)
            .map_err(|e| SentinelError::io(self.path.display().to_string(), e))
    }

    /// Delete the stored document. Returns whether one existed.
    pub fn remove(&self) -> Result<bool> {
        let _guard = self.lock()?;
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(SentinelError::io(self.path.display().to_string(), e)),
        }
    }

    /// Take the exclusive advisory lock, waiting at most `lock_timeout`
    fn lock(&self) -> Result<FileLockGuard> {
        let lock_name = self.lock_path.display().to_string();
        if let Some(parent) = self.lock_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .map_err(|e| SentinelError::io(parent.display().to_string(), e))?;
        }

        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .open(&self.lock_path)
            .map_err(|e| SentinelError::io(lock_name.clone(), e))?;

        let started = Instant::now();
        loop {
            match flock(file.as_raw_fd(), FlockArg::LockExclusiveNonblock) {
                Ok(()) => return Ok(FileLockGuard { file }),
                Err(Errno::EINTR) => continue,
                Err(errno) if errno == Errno::EWOULDBLOCK => {
                    let waited = started.elapsed();
                    if waited >= self.options.lock_timeout {
                        warn!("Gave up on {} after {:?}", lock_name, waited);
                        return Err(SentinelError::LockTimeout {
                            path: lock_name,
                            waited,
                        });
                    }
                    std::thread::sleep(LOCK_RETRY_INTERVAL);
                }
                Err(errno) => return Err(SentinelError::io(lock_name, errno.into())),
            }
        }
    }
}

/// Holds the advisory lock until dropped
struct FileLockGuard {
    file: File,
}

impl Drop for FileLockGuard {
    fn drop(&mut self) {
        // closing the descriptor also releases it
        let _ = flock(self.file.as_raw_fd(), FlockArg::Unlock);
    }
}

fn sidecar(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".");
    name.push(suffix);
    PathBuf::from(name)
}

pub(crate) fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
