//! Resumable progress tracking.
//!
//! A small JSON document records which batch dates have been fully stored.
//! Writes go to a sibling temp file that is synced and then renamed over the
//! original, so a crash mid-write leaves the previous state intact.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::error::ProgressError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchStats {
    pub review_count: usize,
    #[serde(deserialize_with = "utc_or_naive")]
    pub processed_at: DateTime<Utc>,
}

/// Accepts RFC 3339 or an offset-less timestamp, which is read as UTC.
fn utc_or_naive<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
    let raw = String::deserialize(d)?;
    if let Ok(at) = DateTime::parse_from_rfc3339(&raw) {
        return Ok(at.with_timezone(&Utc));
    }
    raw.parse::<NaiveDateTime>()
        .map(|naive| naive.and_utc())
        .map_err(serde::de::Error::custom)
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProgressState {
    pub processed_dates: BTreeSet<NaiveDate>,
    pub last_processed_date: Option<NaiveDate>,
    pub total_batches_processed: u64,
    #[serde(default)]
    pub batch_stats: BTreeMap<NaiveDate, BatchStats>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkOutcome {
    /// First time this date was marked.
    NewlyProcessed,
    /// Date was already processed; only its stats were replaced.
    Refreshed,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressSummary {
    pub total_processed: usize,
    pub last_processed_date: Option<NaiveDate>,
    pub total_batches: u64,
}

pub struct ProgressStore {
    path: PathBuf,
    state: ProgressState,
}

impl ProgressStore {
    /// Load state from `path`. A missing file is an empty state; an unreadable
    /// or malformed file is an error and nothing is overwritten.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, ProgressError> {
        let path = path.into();
        let state = match fs::read_to_string(&path) {
            Ok(raw) => serde_json::from_str(&raw).map_err(|source| ProgressError::Corrupt {
                path: path.clone(),
                source,
            })?,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %path.display(), "No progress file, starting fresh");
                ProgressState::default()
            }
            Err(source) => return Err(ProgressError::Read { path, source }),
        };

        Ok(Self { path, state })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn state(&self) -> &ProgressState {
        &self.state
    }

    pub fn is_processed(&self, date: NaiveDate) -> bool {
        self.state.processed_dates.contains(&date)
    }

    /// Dates from `available` not yet processed, in input order.
    pub fn unprocessed(&self, available: &[NaiveDate]) -> Vec<NaiveDate> {
        available
            .iter()
            .copied()
            .filter(|d| !self.is_processed(*d))
            .collect()
    }

    /// Record `date` as fully stored and persist. In-memory state only changes
    /// once the file write succeeds.
    pub fn mark_processed(
        &mut self,
        date: NaiveDate,
        review_count: usize,
    ) -> Result<MarkOutcome, ProgressError> {
        let mut next = self.state.clone();
        let outcome = if next.processed_dates.insert(date) {
            next.total_batches_processed += 1;
            MarkOutcome::NewlyProcessed
        } else {
            MarkOutcome::Refreshed
        };
        next.last_processed_date = Some(date);
        next.batch_stats.insert(
            date,
            BatchStats {
                review_count,
                processed_at: Utc::now(),
            },
        );

        self.write(&next)?;
        self.state = next;

        info!(%date, review_count, ?outcome, "Marked batch processed");
        Ok(outcome)
    }

    pub fn summary(&self) -> ProgressSummary {
        ProgressSummary {
            total_processed: self.state.processed_dates.len(),
            last_processed_date: self.state.last_processed_date,
            total_batches: self.state.total_batches_processed,
        }
    }

    fn write(&self, state: &ProgressState) -> Result<(), ProgressError> {
        let body = serde_json::to_vec_pretty(state)?;
        let write_err = |source| ProgressError::Write {
            path: self.path.clone(),
            source,
        };

        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir).map_err(write_err)?;

        let mut tmp = NamedTempFile::new_in(&dir).map_err(write_err)?;
        tmp.write_all(&body).map_err(write_err)?;
        tmp.as_file().sync_all().map_err(write_err)?;
        tmp.persist(&self.path).map_err(|e| write_err(e.error))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, day).unwrap()
    }

    #[test]
    fn missing_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = ProgressStore::load(dir.path().join("status.json")).unwrap();
        assert_eq!(store.state(), &ProgressState::default());
        assert_eq!(store.unprocessed(&[d(1), d(2)]), vec![d(1), d(2)]);
    }

    #[test]
    fn only_new_dates_are_unprocessed() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = ProgressStore::load(dir.path().join("status.json")).unwrap();
        store.mark_processed(d(1), 3).unwrap();
        store.mark_processed(d(2), 4).unwrap();

        assert_eq!(store.unprocessed(&[d(3), d(2), d(1)]), vec![d(3)]);
        assert!(store.is_processed(d(1)));
        assert!(!store.is_processed(d(3)));
    }

    #[test]
    fn remarking_does_not_double_count() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = ProgressStore::load(dir.path().join("status.json")).unwrap();

        assert_eq!(store.mark_processed(d(1), 3).unwrap(), MarkOutcome::NewlyProcessed);
        assert_eq!(store.mark_processed(d(1), 5).unwrap(), MarkOutcome::Refreshed);

        let summary = store.summary();
        assert_eq!(summary.total_processed, 1);
        assert_eq!(summary.total_batches, 1);
        assert_eq!(store.state().batch_stats[&d(1)].review_count, 5);
    }

    #[test]
    fn state_survives_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("status.json");

        let mut store = ProgressStore::load(&path).unwrap();
        store.mark_processed(d(2), 2).unwrap();
        store.mark_processed(d(1), 1).unwrap();

        let reloaded = ProgressStore::load(&path).unwrap();
        assert_eq!(reloaded.state(), store.state());
        assert_eq!(reloaded.summary().last_processed_date, Some(d(1)));
    }

    #[test]
    fn corrupt_file_is_fatal_and_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("status.json");
        fs::write(&path, "{ not json").unwrap();

        let err = ProgressStore::load(&path).err().unwrap();
        assert!(matches!(err, ProgressError::Corrupt { .. }));
        assert_eq!(fs::read_to_string(&path).unwrap(), "{ not json");
    }

    #[test]
    fn offsetless_timestamps_load_as_utc() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("status.json");
        fs::write(
            &path,
            r#"{"processed_dates":["2025-06-01","2025-06-02"],"last_processed_date":"2025-06-02",
               "total_batches_processed":2,
               "batch_stats":{"2025-06-01":{"review_count":40,"processed_at":"2025-06-02T08:15:30.123456"},
                              "2025-06-02":{"review_count":12,"processed_at":"2025-06-03T08:00:00+05:30"}}}"#,
        )
        .unwrap();

        let store = ProgressStore::load(&path).unwrap();
        let stats = &store.state().batch_stats;
        assert_eq!(stats[&d(1)].review_count, 40);
        assert_eq!(
            stats[&d(1)].processed_at.to_rfc3339(),
            "2025-06-02T08:15:30.123456+00:00"
        );
        assert_eq!(
            stats[&d(2)].processed_at.to_rfc3339(),
            "2025-06-03T02:30:00+00:00"
        );
    }

    #[test]
    fn bad_timestamp_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("status.json");
        fs::write(
            &path,
            r#"{"processed_dates":["2025-06-01"],"last_processed_date":"2025-06-01","total_batches_processed":1,
               "batch_stats":{"2025-06-01":{"review_count":1,"processed_at":"last tuesday"}}}"#,
        )
        .unwrap();

        let err = ProgressStore::load(&path).err().unwrap();
        assert!(matches!(err, ProgressError::Corrupt { .. }));
    }

    #[test]
    fn file_without_stats_loads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("status.json");
        fs::write(
            &path,
            r#"{"processed_dates":["2025-06-01"],"last_processed_date":"2025-06-01","total_batches_processed":1}"#,
        )
        .unwrap();

        let store = ProgressStore::load(&path).unwrap();
        assert!(store.is_processed(d(1)));
        assert!(store.state().batch_stats.is_empty());
    }
}
