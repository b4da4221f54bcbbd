use std::time::Duration;

use dashmap::{DashMap, DashSet};
use domain::model::entity::JobId;
use tokio::time::Instant;

/// Remembers when each job was last observed in the live queue.
///
/// Accounting records show up some time after a job leaves the live queue. A job
/// seen recently is still pending from the caller's point of view, even if
/// neither source knows about it right now.
#[derive(Debug, Default)]
pub struct SeenRegistry {
    last_seen: DashMap<JobId, Instant>,
    /// Jobs deleted before they started. They never reach accounting, so the mark
    /// stays until an accounting record shows up.
    removed: DashSet<JobId>,
}

impl SeenRegistry {
    pub fn mark_seen(&self, id: &JobId, now: Instant) {
        self.last_seen.insert(id.clone(), now);
    }

    /// Marks a live-queue snapshot as seen and drops sightings older than `window`,
    /// which can no longer keep a job pending.
    pub fn mark_all_seen<'a>(
        &self,
        ids: impl IntoIterator<Item = &'a JobId>,
        now: Instant,
        window: Duration,
    ) {
        for id in ids {
            self.mark_seen(id, now);
        }
        self.last_seen.retain(|_, seen| now.saturating_duration_since(*seen) < window);
    }

    pub fn len(&self) -> usize {
        self.last_seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.last_seen.is_empty()
    }

    /// True if `id` was seen less than `window` before `now`.
    pub fn seen_within(&self, id: &JobId, window: Duration, now: Instant) -> bool {
        self.last_seen
            .get(id)
            .is_some_and(|seen| now.saturating_duration_since(*seen) < window)
    }

    pub fn mark_removed(&self, id: &JobId) {
        self.removed.insert(id.clone());
    }

    pub fn is_removed(&self, id: &JobId) -> bool {
        self.removed.contains(id)
    }

    /// Drops everything known about a job whose final state is confirmed.
    pub fn forget(&self, id: &JobId) {
        self.last_seen.remove(id);
        self.removed.remove(id);
    }
}
