//! Per-entry unread badges.
//!
//! DESIGN
//! ======
//! Every chat button on the page shows the unread count of its entry. A
//! refresh asks the backend about every listed entry concurrently, builds a
//! fresh [`UnreadCounterSet`] and swaps it in wholesale; there is no
//! incremental bookkeeping to drift. Refreshes are numbered, and a result is
//! dropped if a newer refresh already landed.
//!
//! A failed check is logged and leaves that entry's previous count and badge
//! in place until the next refresh succeeds.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard};

use futures::future::join_all;
use tracing::{debug, warn};

use crate::api::ChatBackend;
use crate::page::EntryRef;
use crate::surface::BadgeSurface;

/// Badge text for `count`: hidden at zero, `"{cap}+"` above `cap`.
#[must_use]
pub fn badge_label(count: u32, cap: u32) -> Option<String> {
    match count {
        0 => None,
        n if n > cap => Some(format!("{cap}+")),
        n => Some(n.to_string()),
    }
}

/// Unread counts keyed by entry. Entries with nothing unread are absent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnreadCounterSet {
    counts: BTreeMap<EntryRef, u32>,
}

impl UnreadCounterSet {
    #[must_use]
    pub fn get(&self, entry: &EntryRef) -> u32 {
        self.counts.get(entry).copied().unwrap_or(0)
    }

    pub fn set(&mut self, entry: EntryRef, count: u32) {
        if count == 0 {
            self.counts.remove(&entry);
        } else {
            self.counts.insert(entry, count);
        }
    }

    pub fn remove(&mut self, entry: &EntryRef) -> u32 {
        self.counts.remove(entry).unwrap_or(0)
    }

    #[must_use]
    pub fn total(&self) -> u32 {
        self.counts.values().fold(0u32, |acc, n| acc.saturating_add(*n))
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&EntryRef, u32)> {
        self.counts.iter().map(|(entry, n)| (entry, *n))
    }
}

#[derive(Default)]
struct TrackerState {
    next_seq: u64,
    applied_seq: u64,
    counts: UnreadCounterSet,
}

pub struct UnreadTracker {
    backend: Arc<dyn ChatBackend>,
    surface: Arc<dyn BadgeSurface>,
    cap: u32,
    state: Mutex<TrackerState>,
}

impl UnreadTracker {
    pub fn new(backend: Arc<dyn ChatBackend>, surface: Arc<dyn BadgeSurface>, cap: u32) -> Self {
        Self { backend, surface, cap, state: Mutex::new(TrackerState::default()) }
    }

    fn state(&self) -> MutexGuard<'_, TrackerState> {
        self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Current counts.
    #[must_use]
    pub fn counts(&self) -> UnreadCounterSet {
        self.state().counts.clone()
    }

    /// Re-check every entry the page lists. Returns `false` when a newer
    /// refresh finished first and this result was discarded.
    pub async fn refresh(&self) -> bool {
        let entries: BTreeSet<EntryRef> = self.surface.chat_entries().into_iter().collect();
        let (seq, previous) = {
            let mut state = self.state();
            state.next_seq += 1;
            (state.next_seq, state.counts.clone())
        };

        let checks = join_all(entries.into_iter().map(|entry| async move {
            let result = self.backend.check_new_messages(&entry).await;
            (entry, result)
        }))
        .await;

        let mut next = UnreadCounterSet::default();
        let mut updates = Vec::with_capacity(checks.len());
        for (entry, result) in checks {
            match result {
                Ok(check) => {
                    let count = if check.new_messages_exist { check.badge_count() } else { 0 };
                    next.set(entry.clone(), count);
                    updates.push((entry, badge_label(count, self.cap)));
                }
                Err(e) => {
                    warn!(error = %e, code = e.error_code(), entry = %entry, "unread check failed");
                    next.set(entry.clone(), previous.get(&entry));
                }
            }
        }

        {
            let mut state = self.state();
            if seq <= state.applied_seq {
                debug!(seq, applied = state.applied_seq, "discarding stale unread refresh");
                return false;
            }
            state.applied_seq = seq;
            state.counts = next;
        }

        for (entry, label) in updates {
            self.surface.set_badge(&entry, label.as_deref());
        }
        true
    }

    /// Hide the entry's badge ahead of the backend catching up. Refreshes
    /// already in flight are discarded so they cannot bring the badge back.
    pub fn clear(&self, entry: &EntryRef) {
        let had = {
            let mut state = self.state();
            state.applied_seq = state.next_seq;
            state.counts.remove(entry)
        };
        debug!(entry = %entry, had, "unread badge cleared");
        self.surface.set_badge(entry, None);
    }
}

#[cfg(test)]
#[path = "badges_test.rs"]
mod tests;
