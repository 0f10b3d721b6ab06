//! JSON knowledge store.
//!
//! Learned mappings and corrections live in a snapshot file that is rewritten
//! atomically (temp file, fsync, rename) on each `confirm`. Match outcomes are
//! appended to a JSON-lines log beside it (`<name>.outcomes.jsonl`); marking an
//! outcome appends the updated record again and the last line per id wins on
//! load. Manual mappings come from configuration and are never written.
//!
//! `open` reads and writes synchronously. After that, disk work runs off the
//! async worker threads and no lock is held across it.

use super::{
    reinforced_confidence, Correction, KnowledgeStore, LearnedMapping, ManualMappings,
    MatchOutcomeRecord, StoreCounts, StoreError, TimeRange, INITIAL_LEARNED_CONFIDENCE,
};
use crate::matching::normalize::surface_key;
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// On-disk snapshot layout
#[derive(Debug, Default, Deserialize)]
struct Snapshot {
    #[serde(default)]
    learned_mappings: Vec<LearnedMapping>,
    #[serde(default)]
    mapping_corrections: Vec<Correction>,
}

#[derive(Serialize)]
struct SnapshotRef<'a> {
    learned_mappings: Vec<&'a LearnedMapping>,
    mapping_corrections: &'a [Correction],
}

#[derive(Debug, Clone, Default)]
struct MappingState {
    /// source key -> target key -> mapping
    learned: FxHashMap<String, FxHashMap<String, LearnedMapping>>,
    corrections: Vec<Correction>,
}

impl MappingState {
    fn from_snapshot(snapshot: Snapshot) -> Self {
        let mut state = MappingState {
            learned: FxHashMap::default(),
            corrections: snapshot.mapping_corrections,
        };
        for mapping in snapshot.learned_mappings {
            state
                .learned
                .entry(surface_key(&mapping.source))
                .or_default()
                .insert(surface_key(&mapping.target), mapping);
        }
        state
    }

    fn learned_count(&self) -> usize {
        self.learned.values().map(|targets| targets.len()).sum()
    }

    fn to_json(&self) -> Result<Vec<u8>, StoreError> {
        let mut learned: Vec<&LearnedMapping> =
            self.learned.values().flat_map(|targets| targets.values()).collect();
        learned.sort_by(|a, b| {
            surface_key(&a.source)
                .cmp(&surface_key(&b.source))
                .then_with(|| surface_key(&a.target).cmp(&surface_key(&b.target)))
        });

        let snapshot = SnapshotRef {
            learned_mappings: learned,
            mapping_corrections: &self.corrections,
        };
        Ok(serde_json::to_vec_pretty(&snapshot)?)
    }

    fn apply_confirmation(
        &mut self,
        source: &str,
        target: &str,
        is_correct: bool,
        league: Option<&str>,
    ) {
        let source_key = surface_key(source);
        let target_key = surface_key(target);

        if is_correct {
            let now = Utc::now();
            let targets = self.learned.entry(source_key).or_default();
            match targets.get_mut(&target_key) {
                Some(existing) => {
                    existing.times_confirmed += 1;
                    existing.confidence = reinforced_confidence(existing.confidence);
                    existing.last_confirmed_at = now;
                    existing.target = target.trim().to_string();
                }
                None => {
                    targets.insert(
                        target_key,
                        LearnedMapping {
                            source: source.trim().to_string(),
                            target: target.trim().to_string(),
                            confidence: INITIAL_LEARNED_CONFIDENCE,
                            times_confirmed: 1,
                            last_confirmed_at: now,
                        },
                    );
                }
            }
            return;
        }

        if let Some(targets) = self.learned.get_mut(&source_key) {
            if targets.remove(&target_key).is_some() {
                debug!("Purged learned mapping {} -> {}", source, target);
            }
            if targets.is_empty() {
                self.learned.remove(&source_key);
            }
        }
        self.corrections.push(Correction {
            source: source.trim().to_string(),
            target: target.trim().to_string(),
            league: league.map(str::to_string),
            corrected_at: Utc::now(),
        });
    }
}

/// Outcome records in log order, one entry per id
#[derive(Debug, Default)]
struct OutcomeLog {
    records: Vec<MatchOutcomeRecord>,
    positions: FxHashMap<Uuid, usize>,
}

impl OutcomeLog {
    /// Append a new record, or replace the one with the same id in place
    fn upsert(&mut self, record: MatchOutcomeRecord) {
        match self.positions.get(&record.id) {
            Some(&index) => self.records[index] = record,
            None => {
                self.positions.insert(record.id, self.records.len());
                self.records.push(record);
            }
        }
    }

    fn latest_for(&self, source_key: &str, candidate_key: &str) -> Option<&MatchOutcomeRecord> {
        self.records
            .iter()
            .enumerate()
            .filter(|(_, r)| {
                surface_key(&r.source) == source_key
                    && r.candidate.as_deref().map(surface_key).as_deref() == Some(candidate_key)
            })
            .max_by_key(|(i, r)| (r.resolved_at, *i))
            .map(|(_, r)| r)
    }

    fn load(path: &Path) -> Result<Self, StoreError> {
        let mut log = OutcomeLog::default();
        if !path.exists() {
            return Ok(log);
        }

        let content = fs::read_to_string(path)?;
        let mut skipped = 0usize;
        for line in content.lines().filter(|l| !l.trim().is_empty()) {
            match serde_json::from_str::<MatchOutcomeRecord>(line) {
                Ok(record) => log.upsert(record),
                Err(e) => {
                    skipped += 1;
                    debug!("Unreadable outcome line: {}", e);
                }
            }
        }
        if skipped > 0 {
            warn!(
                "Skipped {} unreadable lines in outcome log {}",
                skipped,
                path.display()
            );
        }

        // A torn final line must not swallow the next append.
        if !content.is_empty() && !content.ends_with('\n') {
            let mut file = OpenOptions::new().append(true).open(path)?;
            file.write_all(b"\n")?;
            file.sync_data()?;
        }
        Ok(log)
    }
}

#[derive(Debug)]
struct StorePaths {
    snapshot: PathBuf,
    outcome_log: PathBuf,
}

/// Knowledge store persisted as JSON files, or purely in memory.
#[derive(Debug)]
pub struct FileKnowledgeStore {
    paths: Option<StorePaths>,
    manual: ManualMappings,
    mappings: RwLock<MappingState>,
    outcomes: RwLock<OutcomeLog>,
    /// Serializes snapshot rewrites
    snapshot_writer: Mutex<()>,
    /// Serializes outcome log appends
    log_writer: Mutex<()>,
}

impl FileKnowledgeStore {
    /// Open (or create) the snapshot at `path` and its outcome log.
    ///
    /// `manual` is the complete manual table for this run. An unreadable or
    /// corrupt snapshot is an error; unreadable outcome lines are skipped.
    pub fn open(path: impl Into<PathBuf>, manual: ManualMappings) -> Result<Self, StoreError> {
        let snapshot_path = path.into();
        if let Some(parent) = snapshot_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let snapshot = if snapshot_path.exists() {
            let content = fs::read_to_string(&snapshot_path)?;
            serde_json::from_str::<Snapshot>(&content)?
        } else {
            Snapshot::default()
        };
        let mappings = MappingState::from_snapshot(snapshot);
        write_snapshot(&snapshot_path, &mappings.to_json()?)?;

        let outcome_log = snapshot_path.with_extension("outcomes.jsonl");
        let outcomes = OutcomeLog::load(&outcome_log)?;

        info!(
            "Opened knowledge store at {} ({} manual, {} learned, {} outcomes)",
            snapshot_path.display(),
            manual.len(),
            mappings.learned_count(),
            outcomes.records.len()
        );

        Ok(Self {
            paths: Some(StorePaths {
                snapshot: snapshot_path,
                outcome_log,
            }),
            manual,
            mappings: RwLock::new(mappings),
            outcomes: RwLock::new(outcomes),
            snapshot_writer: Mutex::new(()),
            log_writer: Mutex::new(()),
        })
    }

    /// Store that never touches disk
    pub fn in_memory(manual: ManualMappings) -> Self {
        Self {
            paths: None,
            manual,
            mappings: RwLock::new(MappingState::default()),
            outcomes: RwLock::new(OutcomeLog::default()),
            snapshot_writer: Mutex::new(()),
            log_writer: Mutex::new(()),
        }
    }

    /// Snapshot path, `None` for an in-memory store
    pub fn path(&self) -> Option<&Path> {
        self.paths.as_ref().map(|p| p.snapshot.as_path())
    }

    /// Outcome log path, `None` for an in-memory store
    pub fn outcome_log_path(&self) -> Option<&Path> {
        self.paths.as_ref().map(|p| p.outcome_log.as_path())
    }

    /// Write one record to the log, then publish it. Callers hold `log_writer`.
    async fn append_outcome(&self, record: MatchOutcomeRecord) -> Result<(), StoreError> {
        if let Some(paths) = &self.paths {
            append_line(&paths.outcome_log, &record).await?;
        }
        self.outcomes.write().upsert(record);
        Ok(())
    }
}

/// Temp file, fsync, rename, then fsync the directory
fn write_snapshot(path: &Path, content: &[u8]) -> Result<(), StoreError> {
    let tmp = path.with_extension("json.tmp");
    let mut file = File::create(&tmp)?;
    file.write_all(content)?;
    file.sync_all()?;
    drop(file);

    fs::rename(&tmp, path)?;
    sync_parent_dir(path)?;
    Ok(())
}

#[cfg(unix)]
fn sync_parent_dir(path: &Path) -> io::Result<()> {
    match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => File::open(dir)?.sync_all(),
        _ => Ok(()),
    }
}

#[cfg(not(unix))]
fn sync_parent_dir(_path: &Path) -> io::Result<()> {
    Ok(())
}

async fn persist_snapshot(path: PathBuf, content: Vec<u8>) -> Result<(), StoreError> {
    tokio::task::spawn_blocking(move || write_snapshot(&path, &content))
        .await
        .map_err(|e| StoreError::Unavailable(format!("snapshot writer: {e}")))?
}

async fn append_line(path: &Path, record: &MatchOutcomeRecord) -> Result<(), StoreError> {
    let mut line = serde_json::to_vec(record)?;
    line.push(b'\n');

    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await?;
    file.write_all(&line).await?;
    file.sync_data().await?;
    Ok(())
}

#[async_trait]
impl KnowledgeStore for FileKnowledgeStore {
    async fn lookup_manual(
        &self,
        name: &str,
        league: Option<&str>,
    ) -> Result<Option<String>, StoreError> {
        Ok(self.manual.lookup(name, league).map(str::to_string))
    }

    async fn lookup_learned(&self, name: &str) -> Result<Option<LearnedMapping>, StoreError> {
        let state = self.mappings.read();
        let best = state.learned.get(&surface_key(name)).and_then(|targets| {
            targets.values().max_by(|a, b| {
                a.confidence
                    .total_cmp(&b.confidence)
                    .then_with(|| a.times_confirmed.cmp(&b.times_confirmed))
                    .then_with(|| a.last_confirmed_at.cmp(&b.last_confirmed_at))
            })
        });
        Ok(best.cloned())
    }

    async fn record_outcome(&self, record: &MatchOutcomeRecord) -> Result<(), StoreError> {
        let _writer = self.log_writer.lock().await;
        self.append_outcome(record.clone()).await
    }

    async fn confirm(
        &self,
        source: &str,
        target: &str,
        is_correct: bool,
        league: Option<&str>,
    ) -> Result<(), StoreError> {
        let _writer = self.snapshot_writer.lock().await;

        let mut next = self.mappings.read().clone();
        next.apply_confirmation(source, target, is_correct, league);

        if let Some(paths) = &self.paths {
            persist_snapshot(paths.snapshot.clone(), next.to_json()?).await?;
        }
        *self.mappings.write() = next;
        Ok(())
    }

    async fn mark_outcome(
        &self,
        source: &str,
        candidate: &str,
        was_correct: bool,
    ) -> Result<bool, StoreError> {
        let _writer = self.log_writer.lock().await;

        let updated = {
            let log = self.outcomes.read();
            log.latest_for(&surface_key(source), &surface_key(candidate))
                .cloned()
        };
        let Some(mut record) = updated else {
            return Ok(false);
        };

        record.was_correct = Some(was_correct);
        self.append_outcome(record).await?;
        Ok(true)
    }

    async fn outcomes(&self, range: &TimeRange) -> Result<Vec<MatchOutcomeRecord>, StoreError> {
        let log = self.outcomes.read();
        let mut records: Vec<MatchOutcomeRecord> = log
            .records
            .iter()
            .filter(|r| range.contains(r.resolved_at))
            .cloned()
            .collect();
        records.sort_by_key(|r| r.resolved_at);
        Ok(records)
    }

    async fn counts(&self) -> Result<StoreCounts, StoreError> {
        let (learned_mappings, corrections) = {
            let state = self.mappings.read();
            (state.learned_count(), state.corrections.len())
        };
        Ok(StoreCounts {
            manual_mappings: self.manual.len(),
            learned_mappings,
            corrections,
            outcomes: self.outcomes.read().records.len(),
        })
    }

    fn backend_name(&self) -> &str {
        if self.paths.is_some() {
            "file"
        } else {
            "memory"
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
