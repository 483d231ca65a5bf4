//! The topic run: for each day, read stored reviews, extract, consolidate,
//! and replace that day's topic rows.

use std::fmt;

use anyhow::Result;
use chrono::NaiveDate;
use serde::Serialize;
use tracing::{error, info, warn};

use reviewpulse_common::Review;
use reviewpulse_store::ReviewStore;

use super::consolidator::TopicConsolidator;
use super::extractor::TopicExtractor;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TopicRunSummary {
    pub processed_batches: usize,
    pub skipped_batches: usize,
    pub empty_batches: usize,
    pub failed_dates: Vec<NaiveDate>,
    pub topics_stored: u64,
    pub canonical_topics: usize,
}

impl fmt::Display for TopicRunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "\n=== Topic Run Complete ===")?;
        writeln!(f, "Batches processed:  {}", self.processed_batches)?;
        writeln!(f, "Batches skipped:    {}", self.skipped_batches)?;
        writeln!(f, "Batches empty:      {}", self.empty_batches)?;
        writeln!(f, "Batches failed:     {}", self.failed_dates.len())?;
        writeln!(f, "Topics stored:      {}", self.topics_stored)?;
        writeln!(f, "Canonical topics:   {}", self.canonical_topics)?;
        for date in &self.failed_dates {
            writeln!(f, "  failed: {date}")?;
        }
        Ok(())
    }
}

enum DayOutcome {
    Stored(u64),
    Skipped,
    Empty,
}

pub struct TopicPipeline {
    store: ReviewStore,
    extractor: TopicExtractor,
    consolidator: TopicConsolidator,
    per_day_limit: usize,
}

impl TopicPipeline {
    pub fn new(
        store: ReviewStore,
        extractor: TopicExtractor,
        consolidator: TopicConsolidator,
        per_day_limit: usize,
    ) -> Self {
        Self {
            store,
            extractor,
            consolidator,
            per_day_limit,
        }
    }

    /// Process `dates` in order. Days that already have topics are skipped
    /// unless `force` is set.
    pub async fn run(&mut self, dates: &[NaiveDate], force: bool) -> TopicRunSummary {
        let mut summary = TopicRunSummary::default();

        for &date in dates {
            match self.process_day(date, force).await {
                Ok(DayOutcome::Stored(count)) => {
                    summary.processed_batches += 1;
                    summary.topics_stored += count;
                }
                Ok(DayOutcome::Skipped) => summary.skipped_batches += 1,
                Ok(DayOutcome::Empty) => summary.empty_batches += 1,
                Err(e) => {
                    error!(%date, error = %e, "Topic batch failed");
                    summary.failed_dates.push(date);
                }
            }
        }

        summary.canonical_topics = match self.consolidator.registry().count().await {
            Ok(count) => count,
            Err(e) => {
                warn!(error = %e, "Could not count canonical topics");
                0
            }
        };
        info!(
            processed = summary.processed_batches,
            skipped = summary.skipped_batches,
            failed = summary.failed_dates.len(),
            topics = summary.topics_stored,
            "Topic run complete"
        );
        summary
    }

    async fn process_day(&mut self, date: NaiveDate, force: bool) -> Result<DayOutcome> {
        if !force && self.store.has_topics_for(date).await? {
            info!(%date, "Topics already extracted, skipping");
            return Ok(DayOutcome::Skipped);
        }

        let reviews = self
            .store
            .read_by_batch_date(date)
            .await?
            .into_iter()
            .take(self.per_day_limit)
            .map(|row| row.into_review())
            .collect::<Result<Vec<Review>, _>>()?;
        if reviews.is_empty() {
            return Ok(DayOutcome::Empty);
        }

        let extracted = self.extractor.extract(&reviews, date).await;
        let topics = self.consolidator.consolidate(extracted).await?;
        let written = self.store.replace_topics(date, &topics).await?;
        Ok(DayOutcome::Stored(written))
    }
}
