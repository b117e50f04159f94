//! Per-day activity summaries of a timeline.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::builder::Timeline;
use crate::events::ActionKind;

/// Number of entries of one action kind on one UTC day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityBucket {
    pub day: NaiveDate,
    pub action_kind: ActionKind,
    pub count: usize,
    pub last_activity: DateTime<Utc>,
}

/// Group entries at or after `since` by `(day, action_kind)`, sorted by day
/// then kind.
pub fn summarize(timeline: &Timeline, since: Option<DateTime<Utc>>) -> Vec<ActivityBucket> {
    let mut buckets: BTreeMap<(NaiveDate, ActionKind), (usize, DateTime<Utc>)> = BTreeMap::new();

    for entry in timeline
        .iter()
        .filter(|entry| since.map_or(true, |since| entry.timestamp >= since))
    {
        let slot = buckets
            .entry((entry.timestamp.date_naive(), entry.action_kind))
            .or_insert((0, entry.timestamp));
        slot.0 += 1;
        slot.1 = slot.1.max(entry.timestamp);
    }

    buckets
        .into_iter()
        .map(|((day, action_kind), (count, last_activity))| ActivityBucket {
            day,
            action_kind,
            count,
            last_activity,
        })
        .collect()
}
