//! Per-execution progress tracking shared across worker processes via
//! lock-coordinated files (C1, spec §4.1).
//!
//! This is the single most important correctness change from the source: a
//! progress tracker that lives in a process pool cannot be an in-memory
//! singleton, so state is read-modify-written under an advisory per-record
//! file lock and published via atomic rename. Readers never take the lock.

pub mod error;
pub mod models;

pub use error::ProgressError;
pub use models::*;

use analysis_core::Stage;
use chrono::Utc;
use fs2::FileExt;
use rand::Rng;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::time::{Duration, Instant};

/// Bounded wait for lock acquisition before giving up (§4.1 failure semantics).
const LOCK_WAIT_BUDGET: Duration = Duration::from_secs(5);

pub struct ProgressStore {
    root: PathBuf,
}

impl ProgressStore {
    /// Open (creating if needed) a progress store rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> std::io::Result<Self> {
        let root = root.into();
        fs::create_dir_all(root.join("progress"))?;
        fs::create_dir_all(root.join("locks"))?;
        fs::create_dir_all(root.join("index"))?;
        Ok(Self { root })
    }

    fn progress_path(&self, execution_id: &str) -> PathBuf {
        self.root.join("progress").join(format!("{execution_id}.json"))
    }

    fn lock_path(&self, execution_id: &str) -> PathBuf {
        self.root.join("locks").join(format!("{execution_id}.lock"))
    }

    /// Lock-free read. Returns `None` on a missing file or a parse failure —
    /// readers never raise, they just see "absent" (§4.1).
    pub fn get_progress(&self, execution_id: &str) -> Option<ProgressRecord> {
        let data = fs::read(self.progress_path(execution_id)).ok()?;
        match serde_json::from_slice(&data) {
            Ok(record) => Some(record),
            Err(e) => {
                tracing::warn!("corrupt progress record for {}: {}", execution_id, e);
                None
            }
        }
    }

    /// Enumerate all records younger than `hours`, newest first. Tolerates
    /// files removed by a concurrent `cleanup_old` mid-scan.
    pub fn get_all_recent(&self, hours: i64) -> Vec<ProgressRecord> {
        let cutoff = Utc::now() - chrono::Duration::hours(hours);
        let mut records: Vec<_> = self.scan_all().into_iter().filter(|r| r.start_time >= cutoff).collect();
        records.sort_by(|a, b| b.start_time.cmp(&a.start_time));
        records
    }

    /// All records whose `overall_status` is still `Running`.
    pub fn get_active_executions(&self) -> Vec<ProgressRecord> {
        self.scan_all()
            .into_iter()
            .filter(|r| r.overall_status == OverallStatus::Running)
            .collect()
    }

    fn scan_all(&self) -> Vec<ProgressRecord> {
        let dir = self.root.join("progress");
        let entries = match fs::read_dir(&dir) {
            Ok(e) => e,
            Err(_) => return Vec::new(),
        };
        let mut out = Vec::new();
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if let Ok(bytes) = fs::read(&path) {
                if let Ok(record) = serde_json::from_slice::<ProgressRecord>(&bytes) {
                    out.push(record);
                }
            }
        }
        out
    }

    /// Remove records whose backing file is older than `hours` (by mtime).
    /// Returns the number of records removed.
    pub fn cleanup_old(&self, hours: i64) -> usize {
        let dir = self.root.join("progress");
        let cutoff = std::time::SystemTime::now()
            .checked_sub(Duration::from_secs((hours.max(0) as u64) * 3600))
            .unwrap_or(std::time::SystemTime::UNIX_EPOCH);
        let mut removed = 0;
        if let Ok(entries) = fs::read_dir(&dir) {
            for entry in entries.flatten() {
                if let Ok(meta) = entry.metadata() {
                    if let Ok(modified) = meta.modified() {
                        if modified < cutoff && fs::remove_file(entry.path()).is_ok() {
                            removed += 1;
                        }
                    }
                }
            }
        }
        removed
    }

    /// Create a fresh progress record for a starting task.
    pub async fn start_analysis(
        &self,
        symbol: &str,
        execution_id: &str,
    ) -> Result<ProgressRecord, ProgressError> {
        let symbol = symbol.to_string();
        let execution_id_owned = execution_id.to_string();
        self.mutate(execution_id, move |_existing| {
            Ok(ProgressRecord::new(symbol, execution_id_owned))
        })
        .await
    }

    pub async fn update_stage(&self, execution_id: &str, stage: Stage) -> Result<(), ProgressError> {
        let id = execution_id.to_string();
        self.mutate(execution_id, move |existing| {
            let mut record = require(existing, &id)?;
            record.current_stage = stage;
            Ok(record)
        })
        .await?;
        Ok(())
    }

    pub async fn update_support_resistance(
        &self,
        execution_id: &str,
        result: SupportResistanceResult,
    ) -> Result<(), ProgressError> {
        let id = execution_id.to_string();
        self.mutate(execution_id, move |existing| {
            let mut record = require(existing, &id)?;
            record.support_resistance = result;
            Ok(record)
        })
        .await?;
        Ok(())
    }

    pub async fn update_ml_prediction(
        &self,
        execution_id: &str,
        result: MlPredictionResult,
    ) -> Result<(), ProgressError> {
        let id = execution_id.to_string();
        self.mutate(execution_id, move |existing| {
            let mut record = require(existing, &id)?;
            record.ml_prediction = result;
            Ok(record)
        })
        .await?;
        Ok(())
    }

    pub async fn update_market_context(
        &self,
        execution_id: &str,
        result: MarketContextResult,
    ) -> Result<(), ProgressError> {
        let id = execution_id.to_string();
        self.mutate(execution_id, move |existing| {
            let mut record = require(existing, &id)?;
            record.market_context = result;
            Ok(record)
        })
        .await?;
        Ok(())
    }

    pub async fn update_leverage_decision(
        &self,
        execution_id: &str,
        result: LeverageDecisionResult,
    ) -> Result<(), ProgressError> {
        let id = execution_id.to_string();
        self.mutate(execution_id, move |existing| {
            let mut record = require(existing, &id)?;
            record.leverage_decision = result;
            Ok(record)
        })
        .await?;
        Ok(())
    }

    pub async fn complete_analysis(
        &self,
        execution_id: &str,
        signal: FinalSignal,
        message: impl Into<String>,
    ) -> Result<(), ProgressError> {
        let id = execution_id.to_string();
        let message = message.into();
        self.mutate(execution_id, move |existing| {
            let mut record = require(existing, &id)?;
            record.overall_status = OverallStatus::Success;
            record.current_stage = Stage::Completed;
            record.final_signal = signal;
            record.final_message = Some(message.clone());
            Ok(record)
        })
        .await?;
        Ok(())
    }

    pub async fn fail_analysis(
        &self,
        execution_id: &str,
        stage: Stage,
        message: impl Into<String>,
    ) -> Result<(), ProgressError> {
        let id = execution_id.to_string();
        let message = message.into();
        self.mutate(execution_id, move |existing| {
            let mut record = require(existing, &id)?;
            record.overall_status = OverallStatus::Failed;
            record.current_stage = Stage::Failed;
            record.failure_stage = Some(stage);
            record.final_signal = FinalSignal::NoSignal;
            record.final_message = Some(message.clone());
            Ok(record)
        })
        .await?;
        Ok(())
    }

    /// Read-modify-write a record under its per-execution file lock. Runs on
    /// a blocking thread since `fs2` locks and file I/O are synchronous.
    async fn mutate<F>(&self, execution_id: &str, f: F) -> Result<ProgressRecord, ProgressError>
    where
        F: FnOnce(Option<ProgressRecord>) -> Result<ProgressRecord, ProgressError> + Send + 'static,
    {
        let progress_path = self.progress_path(execution_id);
        let lock_path = self.lock_path(execution_id);
        let execution_id = execution_id.to_string();

        tokio::task::spawn_blocking(move || -> Result<ProgressRecord, ProgressError> {
            let lock_file = OpenOptions::new().create(true).write(true).open(&lock_path)?;
            acquire_with_backoff(&lock_file, &execution_id)?;

            let existing = match fs::read(&progress_path) {
                Ok(bytes) => match serde_json::from_slice::<ProgressRecord>(&bytes) {
                    Ok(record) => Some(record),
                    Err(e) => {
                        tracing::warn!(
                            "corrupt progress record for {}, treating as absent: {}",
                            execution_id,
                            e
                        );
                        None
                    }
                },
                Err(_) => None,
            };

            let updated = f(existing)?;

            let tmp_path = progress_path.with_extension("json.tmp");
            let serialized = serde_json::to_vec_pretty(&updated)?;
            {
                let mut tmp = File::create(&tmp_path)?;
                tmp.write_all(&serialized)?;
                tmp.sync_all()?;
            }
            fs::rename(&tmp_path, &progress_path)?;

            let _ = FileExt::unlock(&lock_file);
            Ok(updated)
        })
        .await
        .expect("progress store blocking task panicked")
    }
}

fn require(existing: Option<ProgressRecord>, execution_id: &str) -> Result<ProgressRecord, ProgressError> {
    existing.ok_or_else(|| ProgressError::NotFound(execution_id.to_string()))
}

fn acquire_with_backoff(file: &File, execution_id: &str) -> Result<(), ProgressError> {
    let start = Instant::now();
    loop {
        if FileExt::try_lock_exclusive(file).is_ok() {
            return Ok(());
        }
        if start.elapsed() >= LOCK_WAIT_BUDGET {
            return Err(ProgressError::LockTimeout(execution_id.to_string()));
        }
        let jitter_ms = rand::thread_rng().gen_range(10..50);
        std::thread::sleep(Duration::from_millis(jitter_ms));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (ProgressStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = ProgressStore::new(dir.path()).unwrap();
        (store, dir)
    }

    #[tokio::test]
    async fn start_and_get_progress_round_trips() {
        let (store, _dir) = store();
        let record = store.start_analysis("BTC", "exec-1").await.unwrap();
        assert_eq!(record.current_stage, Stage::Initializing);
        assert_eq!(record.overall_status, OverallStatus::Running);

        let fetched = store.get_progress("exec-1").unwrap();
        assert_eq!(fetched.symbol, "BTC");
        assert_eq!(fetched.execution_id, "exec-1");
    }

    #[tokio::test]
    async fn stage_updates_apply_in_order() {
        let (store, _dir) = store();
        store.start_analysis("BTC", "exec-2").await.unwrap();

        for stage in [Stage::DataFetch, Stage::SupportResistance, Stage::MlPrediction] {
            store.update_stage("exec-2", stage).await.unwrap();
            let record = store.get_progress("exec-2").unwrap();
            assert_eq!(record.current_stage, stage);
        }
    }

    #[tokio::test]
    async fn mutating_unknown_execution_errors() {
        let (store, _dir) = store();
        let err = store.update_stage("does-not-exist", Stage::DataFetch).await;
        assert!(matches!(err, Err(ProgressError::NotFound(_))));
    }

    #[tokio::test]
    async fn complete_and_fail_set_terminal_fields() {
        let (store, _dir) = store();
        store.start_analysis("BTC", "exec-ok").await.unwrap();
        store
            .complete_analysis("exec-ok", FinalSignal::SignalDetected, "strong buy signal")
            .await
            .unwrap();
        let ok = store.get_progress("exec-ok").unwrap();
        assert_eq!(ok.overall_status, OverallStatus::Success);
        assert_eq!(ok.current_stage, Stage::Completed);

        store.start_analysis("ETH", "exec-fail").await.unwrap();
        store
            .fail_analysis("exec-fail", Stage::SupportResistance, "no levels detected")
            .await
            .unwrap();
        let failed = store.get_progress("exec-fail").unwrap();
        assert_eq!(failed.overall_status, OverallStatus::Failed);
        assert_eq!(failed.failure_stage, Some(Stage::SupportResistance));
        assert_eq!(failed.final_signal, FinalSignal::NoSignal);
    }

    #[tokio::test]
    async fn get_all_recent_sorts_newest_first() {
        let (store, _dir) = store();
        store.start_analysis("A", "e1").await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        store.start_analysis("B", "e2").await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        store.start_analysis("C", "e3").await.unwrap();

        let recent = store.get_all_recent(1);
        assert_eq!(recent.len(), 3);
        assert_eq!(recent[0].execution_id, "e3");
        assert_eq!(recent[2].execution_id, "e1");
    }

    #[tokio::test]
    async fn get_progress_tolerates_corrupt_file() {
        let (store, dir) = store();
        let path = dir.path().join("progress").join("corrupt.json");
        fs::write(&path, b"{not valid json").unwrap();
        assert!(store.get_progress("corrupt").is_none());
    }

    #[tokio::test]
    async fn active_executions_excludes_terminal_records() {
        let (store, _dir) = store();
        store.start_analysis("A", "running").await.unwrap();
        store.start_analysis("B", "done").await.unwrap();
        store
            .complete_analysis("done", FinalSignal::NoSignal, "no setup")
            .await
            .unwrap();

        let active = store.get_active_executions();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].execution_id, "running");
    }

    #[tokio::test]
    async fn concurrent_writers_never_corrupt_the_record() {
        let (store, _dir) = store();
        store.start_analysis("BTC", "race").await.unwrap();
        let store = std::sync::Arc::new(store);

        let mut handles = Vec::new();
        for stage in [Stage::DataFetch, Stage::SupportResistance, Stage::MlPrediction] {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.update_stage("race", stage).await.unwrap();
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        // whichever write landed last, the file must parse cleanly
        let record = store.get_progress("race").unwrap();
        assert!(Stage::ORDER.contains(&record.current_stage) || record.current_stage == Stage::Initializing);
    }
}
