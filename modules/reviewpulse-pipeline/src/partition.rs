use std::collections::BTreeMap;

use chrono::NaiveDate;
use tracing::debug;

use reviewpulse_common::Review;

/// Group reviews by their own date and keep the first `quota` of each day,
/// in the order given.
pub fn partition(reviews: Vec<Review>, quota: usize) -> BTreeMap<NaiveDate, Vec<Review>> {
    let mut batches: BTreeMap<NaiveDate, Vec<Review>> = BTreeMap::new();
    let mut dropped = 0usize;

    for review in reviews {
        let day = batches.entry(review.date).or_default();
        if day.len() < quota {
            day.push(review);
        } else {
            dropped += 1;
        }
    }

    // A quota of zero still leaves an entry per date it saw.
    batches.retain(|_, reviews| !reviews.is_empty());

    if dropped > 0 {
        debug!(dropped, quota, "Partition trimmed days over quota");
    }
    batches
}
