//! Hash-chained implementation of `AssessmentStore`.
//!
//! `HashChainStore` keeps every event in a `Vec` behind a `Mutex`, so one
//! instance can serve all in-flight requests. When opened with a journal
//! path, each event is also appended to a JSON-lines file before it becomes
//! visible in memory, and the file is replayed and verified on startup.
//!
//! Use `export_ledger()` to snapshot the chain and `verify_integrity()` at
//! any time to confirm it has not been tampered with in memory.

use std::{
    fs::{self, OpenOptions},
    io::{Read, Seek, SeekFrom, Write},
    path::{Path, PathBuf},
    sync::{Arc, Mutex, MutexGuard},
};

use chrono::Utc;
use tracing::{debug, info, warn};

use respira_contracts::{
    error::{RespiraError, RespiraResult},
    record::AssessmentRecord,
};
use respira_core::traits::AssessmentStore;

use crate::{
    chain::{hash_event, verify_chain},
    event::{LedgerEvent, LedgerExport},
};

// ── Internal mutable state ────────────────────────────────────────────────────

pub(crate) struct LedgerState {
    /// All events written so far, in append order.
    pub(crate) events: Vec<LedgerEvent>,

    /// The `this_hash` of the last written event, or `GENESIS_HASH` before
    /// any event has been written.
    pub(crate) last_hash: String,
}

impl LedgerState {
    fn from_events(events: Vec<LedgerEvent>) -> Self {
        let last_hash = events
            .last()
            .map_or_else(|| LedgerEvent::GENESIS_HASH.to_string(), |e| e.this_hash.clone());
        Self { events, last_hash }
    }
}

// ── Public store ──────────────────────────────────────────────────────────────

/// An append-only assessment store backed by a SHA-256 hash chain.
pub struct HashChainStore {
    ledger_id: String,
    journal: Option<PathBuf>,
    pub(crate) state: Arc<Mutex<LedgerState>>,
}

impl HashChainStore {
    /// Create an empty, memory-only store.
    pub fn new(ledger_id: impl Into<String>) -> Self {
        Self {
            ledger_id: ledger_id.into(),
            journal: None,
            state: Arc::new(Mutex::new(LedgerState::from_events(Vec::new()))),
        }
    }

    /// Open a store persisted to a JSON-lines journal.
    ///
    /// A missing file starts an empty chain. An existing file is replayed
    /// and must form a valid chain under `ledger_id`.
    ///
    /// # Errors
    ///
    /// `ConfigError` if the journal cannot be read, a line does not parse,
    /// an event belongs to another ledger, or the chain fails verification.
    pub fn open(ledger_id: impl Into<String>, path: impl AsRef<Path>) -> RespiraResult<Self> {
        let ledger_id = ledger_id.into();
        let path = path.as_ref().to_path_buf();
        let events = if path.exists() {
            replay_journal(&path)?
        } else {
            Vec::new()
        };

        if let Some(foreign) = events.iter().find(|e| e.ledger_id != ledger_id) {
            return Err(RespiraError::ConfigError {
                reason: format!(
                    "journal {} holds events of ledger '{}', expected '{}'",
                    path.display(),
                    foreign.ledger_id,
                    ledger_id
                ),
            });
        }
        if !verify_chain(&events) {
            return Err(RespiraError::ConfigError {
                reason: format!("journal {} failed hash-chain verification", path.display()),
            });
        }

        info!(
            ledger_id = %ledger_id,
            journal = %path.display(),
            events = events.len(),
            "assessment journal replayed"
        );

        Ok(Self {
            ledger_id,
            journal: Some(path),
            state: Arc::new(Mutex::new(LedgerState::from_events(events))),
        })
    }

    pub fn ledger_id(&self) -> &str {
        &self.ledger_id
    }

    fn lock(&self) -> RespiraResult<MutexGuard<'_, LedgerState>> {
        self.state.lock().map_err(|e| RespiraError::StoreWriteFailed {
            reason: format!("ledger state lock poisoned: {}", e),
        })
    }

    /// Number of records in the chain.
    pub fn len(&self) -> usize {
        self.lock().map_or(0, |state| state.events.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot every event written so far.
    pub fn export_ledger(&self) -> RespiraResult<LedgerExport> {
        let state = self.lock()?;
        let terminal_hash = state
            .events
            .last()
            .map(|e| e.this_hash.clone())
            .unwrap_or_default();

        Ok(LedgerExport {
            ledger_id: self.ledger_id.clone(),
            events: state.events.clone(),
            exported_at: Utc::now(),
            terminal_hash,
        })
    }

    /// Verify that the in-memory chain has not been tampered with.
    ///
    /// A poisoned lock counts as a failed verification.
    pub fn verify_integrity(&self) -> bool {
        self.lock().map_or(false, |state| verify_chain(&state.events))
    }

    /// Append one line. On a failed write or flush the file is cut back to
    /// its previous length so no partial line is left behind.
    fn write_journal(path: &Path, event: &LedgerEvent) -> RespiraResult<()> {
        let write_failed = |e: &dyn std::fmt::Display| RespiraError::StoreWriteFailed {
            reason: format!("journal {}: {}", path.display(), e),
        };

        let mut line = serde_json::to_string(event).map_err(|e| write_failed(&e))?;
        line.push('\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| write_failed(&e))?;
        let prev_len = file.metadata().map_err(|e| write_failed(&e))?.len();

        let written = file.write_all(line.as_bytes()).and_then(|()| file.flush());
        if let Err(e) = written {
            if let Err(trunc) = file.set_len(prev_len) {
                warn!(
                    journal = %path.display(),
                    error = %trunc,
                    "could not roll back partial journal write"
                );
            }
            return Err(write_failed(&e));
        }
        Ok(())
    }
}

/// Read every event from the journal at `path`.
///
/// A final line that does not parse is a write torn by a crash: it is
/// dropped and the file truncated to the last complete event. An unparsable
/// line anywhere else is corruption.
fn replay_journal(path: &Path) -> RespiraResult<Vec<LedgerEvent>> {
    let unreadable = |e: &dyn std::fmt::Display| RespiraError::ConfigError {
        reason: format!("cannot read journal {}: {}", path.display(), e),
    };

    let text = fs::read_to_string(path).map_err(|e| unreadable(&e))?;
    let lines: Vec<&str> = text.split_inclusive('\n').collect();

    let mut events = Vec::new();
    let mut good_len = 0;
    for (index, raw) in lines.iter().enumerate() {
        let line = raw.trim();
        if !line.is_empty() {
            match serde_json::from_str::<LedgerEvent>(line) {
                Ok(event) => events.push(event),
                Err(e) if index + 1 == lines.len() => {
                    warn!(
                        journal = %path.display(),
                        line = index + 1,
                        error = %e,
                        "dropping torn final journal line"
                    );
                    break;
                }
                Err(e) => {
                    return Err(RespiraError::ConfigError {
                        reason: format!("journal {} line {}: {}", path.display(), index + 1, e),
                    });
                }
            }
        }
        good_len += raw.len();
    }

    if good_len < text.len() || (!text.is_empty() && !text.ends_with('\n')) {
        repair_tail(path, good_len as u64).map_err(|e| RespiraError::ConfigError {
            reason: format!("cannot repair journal {}: {}", path.display(), e),
        })?;
    }
    Ok(events)
}

/// Cut the journal to `len` bytes and make sure it ends on a line break.
fn repair_tail(path: &Path, len: u64) -> std::io::Result<()> {
    let mut file = OpenOptions::new().read(true).write(true).open(path)?;
    file.set_len(len)?;
    if len > 0 {
        file.seek(SeekFrom::Start(len - 1))?;
        let mut last = [0u8; 1];
        file.read_exact(&mut last)?;
        if last[0] != b'\n' {
            file.seek(SeekFrom::End(0))?;
            file.write_all(b"\n")?;
        }
    }
    file.flush()
}

// ── AssessmentStore impl ──────────────────────────────────────────────────────

impl AssessmentStore for HashChainStore {
    /// Append one record to the hash chain.
    ///
    /// With a journal, the event reaches disk before it is visible to
    /// readers; a failed journal write leaves the chain unchanged.
    fn append(&self, record: &AssessmentRecord) -> RespiraResult<()> {
        let mut state = self.lock()?;

        let prev_hash = state.last_hash.clone();
        let sequence = state.events.len() as u64;
        let this_hash = hash_event(&self.ledger_id, sequence, record, &prev_hash)?;

        let event = LedgerEvent {
            sequence,
            ledger_id: self.ledger_id.clone(),
            record: record.clone(),
            prev_hash,
            this_hash: this_hash.clone(),
        };

        if let Some(path) = &self.journal {
            Self::write_journal(path, &event)?;
        }

        debug!(
            ledger_id = %self.ledger_id,
            sequence,
            record_id = %record.record_id,
            "assessment appended"
        );

        state.events.push(event);
        state.last_hash = this_hash;
        Ok(())
    }

    fn recent(&self, limit: usize) -> RespiraResult<Vec<AssessmentRecord>> {
        let state = self.lock()?;
        Ok(state
            .events
            .iter()
            .rev()
            .take(limit)
            .map(|e| e.record.clone())
            .collect())
    }
}
