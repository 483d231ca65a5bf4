//! The ingest run: fetch, partition, then store and mark each pending day.

use std::fmt;
use std::sync::Arc;

use anyhow::Result;
use chrono::NaiveDate;
use serde::Serialize;
use tracing::{error, info, warn};

use reviewpulse_common::Review;
use reviewpulse_store::{BatchWrite, ProgressStore};

use crate::fetcher::ReviewFetcher;
use crate::partition::partition;
use crate::traits::ReviewSink;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestStatus {
    Completed,
    NothingCollected,
    UpToDate,
}

impl fmt::Display for IngestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            IngestStatus::Completed => "completed",
            IngestStatus::NothingCollected => "nothing_collected",
            IngestStatus::UpToDate => "up_to_date",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IngestSummary {
    pub status: IngestStatus,
    pub reviews_fetched: usize,
    pub available_batches: usize,
    pub attempted_batches: usize,
    pub successful_batches: usize,
    pub failed_dates: Vec<NaiveDate>,
    pub reviews_inserted: u64,
    pub total_batches_processed: u64,
    pub date_range: Option<(NaiveDate, NaiveDate)>,
}

impl IngestSummary {
    fn empty(status: IngestStatus, total_batches_processed: u64) -> Self {
        Self {
            status,
            reviews_fetched: 0,
            available_batches: 0,
            attempted_batches: 0,
            successful_batches: 0,
            failed_dates: Vec::new(),
            reviews_inserted: 0,
            total_batches_processed,
            date_range: None,
        }
    }
}

impl fmt::Display for IngestSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "\n=== Ingest Run: {} ===", self.status)?;
        writeln!(f, "Reviews fetched:    {}", self.reviews_fetched)?;
        writeln!(f, "Batches available:  {}", self.available_batches)?;
        writeln!(f, "Batches attempted:  {}", self.attempted_batches)?;
        writeln!(f, "Batches stored:     {}", self.successful_batches)?;
        writeln!(f, "Batches failed:     {}", self.failed_dates.len())?;
        writeln!(f, "Reviews inserted:   {}", self.reviews_inserted)?;
        writeln!(f, "Total processed:    {}", self.total_batches_processed)?;
        if let Some((start, end)) = self.date_range {
            writeln!(f, "Date range:         {start} .. {end}")?;
        }
        for date in &self.failed_dates {
            writeln!(f, "  failed: {date}")?;
        }
        Ok(())
    }
}

pub struct BatchIngestor {
    fetcher: ReviewFetcher,
    sink: Arc<dyn ReviewSink>,
    progress: ProgressStore,
}

impl BatchIngestor {
    pub fn new(fetcher: ReviewFetcher, sink: Arc<dyn ReviewSink>, progress: ProgressStore) -> Self {
        Self {
            fetcher,
            sink,
            progress,
        }
    }

    pub fn progress(&self) -> &ProgressStore {
        &self.progress
    }

    /// One ingest pass over the last `day_count` days. A failing day is
    /// reported and left unmarked; the remaining days still run.
    pub async fn run(&mut self, day_count: u32, per_day_quota: usize) -> IngestSummary {
        let reviews = self.fetcher.fetch(day_count, per_day_quota).await;
        let total = self.progress.summary().total_batches;
        if reviews.is_empty() {
            warn!("No reviews collected");
            return IngestSummary::empty(IngestStatus::NothingCollected, total);
        }

        let reviews_fetched = reviews.len();
        let batches = partition(reviews, per_day_quota);
        let available: Vec<NaiveDate> = batches.keys().copied().collect();
        let date_range = available.first().copied().zip(available.last().copied());
        let pending = self.progress.unprocessed(&available);

        info!(
            reviews_fetched,
            available = available.len(),
            pending = pending.len(),
            "Partitioned reviews into daily batches"
        );

        let mut summary = IngestSummary {
            reviews_fetched,
            available_batches: available.len(),
            date_range,
            ..IngestSummary::empty(IngestStatus::Completed, total)
        };

        if pending.is_empty() {
            info!("All available batches already processed");
            summary.status = IngestStatus::UpToDate;
            return summary;
        }

        for date in pending {
            summary.attempted_batches += 1;
            let day = batches.get(&date).map(Vec::as_slice).unwrap_or_default();
            match self.ingest_day(date, day).await {
                Ok(write) => {
                    summary.successful_batches += 1;
                    summary.reviews_inserted += write.inserted;
                }
                Err(e) => {
                    error!(%date, error = %e, "Batch failed");
                    summary.failed_dates.push(date);
                }
            }
        }

        summary.total_batches_processed = self.progress.summary().total_batches;
        info!(
            successful = summary.successful_batches,
            failed = summary.failed_dates.len(),
            inserted = summary.reviews_inserted,
            "Ingest run complete"
        );
        summary
    }

    /// Store first; only a committed write may be marked.
    async fn ingest_day(&mut self, date: NaiveDate, reviews: &[Review]) -> Result<BatchWrite> {
        let write = self
            .sink
            .store_batch(reviews, &self.fetcher.settings().app_id, date)
            .await?;
        let count = reviews.len().min(write.filed as usize);
        self.progress.mark_processed(date, count)?;
        Ok(write)
    }
}
