//! Union and de-duplication of the two event streams.
//!
//! Two records describe the same real edit when their timestamps round to the
//! same second. Fine records are folded in first, so a fine record always
//! wins over a coarse one; within one source the earliest-seen record wins.

use metrics::counter;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

use super::record::{ActionKind, RawEvent, SourceKind};

/// Bookkeeping from one merge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeStats {
    pub kept: usize,
    pub discarded_fine: usize,
    pub discarded_coarse: usize,
    /// Kept records whose action kind was raised by a discarded duplicate.
    pub upgraded: usize,
}

impl MergeStats {
    pub fn discarded(&self) -> usize {
        self.discarded_fine + self.discarded_coarse
    }
}

/// Apply the coarse-only action signals.
///
/// The coarse log is the only place that knows whether a snapshot was run or
/// submitted, so an explicit `is_submission` flag or a recorded run result
/// outranks whatever kind the record was written with.
pub fn promote_coarse(event: &mut RawEvent) {
    if event.source != SourceKind::Coarse {
        return;
    }
    if event.is_submission {
        event.action_kind = ActionKind::Submission;
    } else if event.has_run_result() && event.action_kind.rank() < ActionKind::Run.rank() {
        event.action_kind = ActionKind::Run;
    }
}

/// Fold a discarded duplicate into the record that survives it.
///
/// Returns true when the kept record's action kind changed.
pub(crate) fn absorb(kept: &mut RawEvent, duplicate: &mut RawEvent) -> bool {
    let mut upgraded = false;
    if duplicate.action_kind.is_significant() && duplicate.action_kind.rank() > kept.action_kind.rank() {
        kept.action_kind = duplicate.action_kind;
        upgraded = true;
    }
    if kept.output.is_none() {
        kept.output = duplicate.output.take();
    }
    if kept.error.is_none() {
        kept.error = duplicate.error.take();
    }
    kept.is_submission |= duplicate.is_submission;
    upgraded
}

/// Merge both streams into one de-duplicated, un-sorted set.
///
/// The result preserves first-seen order: surviving fine records in input
/// order, then surviving coarse records in input order.
pub fn merge(fine: Vec<RawEvent>, coarse: Vec<RawEvent>) -> (Vec<RawEvent>, MergeStats) {
    let mut stats = MergeStats::default();
    let mut kept: Vec<RawEvent> = Vec::with_capacity(fine.len() + coarse.len());
    let mut by_second: HashMap<i64, usize> = HashMap::with_capacity(fine.len() + coarse.len());

    let events = fine.into_iter().chain(coarse.into_iter().map(|mut event| {
        promote_coarse(&mut event);
        event
    }));

    for mut event in events {
        let key = event.dedup_key();
        match by_second.get(&key) {
            Some(&index) => {
                match event.source {
                    SourceKind::Fine => stats.discarded_fine += 1,
                    SourceKind::Coarse => stats.discarded_coarse += 1,
                }
                if absorb(&mut kept[index], &mut event) {
                    stats.upgraded += 1;
                }
            }
            None => {
                by_second.insert(key, kept.len());
                kept.push(event);
            }
        }
    }

    stats.kept = kept.len();
    if stats.discarded() > 0 {
        counter!("codetrail_dedup_discarded_total").increment(stats.discarded() as u64);
    }
    debug!(
        kept = stats.kept,
        discarded_fine = stats.discarded_fine,
        discarded_coarse = stats.discarded_coarse,
        upgraded = stats.upgraded,
        "Merged event streams"
    );

    (kept, stats)
}
