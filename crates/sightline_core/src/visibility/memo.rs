//! Short-lived per-entity visibility results.
//!
//! Every [`VisibilityMemo::clear`] starts a new epoch. A query reads the epoch
//! before it copies the geometry and stores through
//! [`VisibilityMemo::store_in_epoch`], so an answer traced against geometry
//! that was replaced mid-query is dropped instead of outliving the clear.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::debug;

/// A stored visibility result.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MemoEntry {
    /// The computed answer.
    pub visible: bool,
    /// When it was computed.
    pub stored_at: Instant,
}

impl MemoEntry {
    /// Time since the entry was stored.
    #[inline]
    #[must_use]
    pub fn age(&self) -> Duration {
        self.stored_at.elapsed()
    }
}

#[derive(Debug, Default)]
struct MemoTable {
    entries: HashMap<u64, MemoEntry>,
    epoch: u64,
}

/// Identity-keyed memo with a trust window and an age sweep.
#[derive(Debug)]
pub struct VisibilityMemo {
    table: Mutex<MemoTable>,
    ttl: Duration,
    stale_after: Duration,
    sweep_threshold: usize,
}

impl VisibilityMemo {
    /// Entries younger than `ttl` are trusted. Once the memo holds more than
    /// `sweep_threshold` entries, every store sweeps entries older than
    /// `stale_after`.
    #[must_use]
    pub fn new(ttl: Duration, stale_after: Duration, sweep_threshold: usize) -> Self {
        Self {
            table: Mutex::new(MemoTable::default()),
            ttl,
            stale_after,
            sweep_threshold,
        }
    }

    /// The stored answer for `identity`, if still within the trust window.
    #[must_use]
    pub fn lookup(&self, identity: u64) -> Option<bool> {
        self.table
            .lock()
            .entries
            .get(&identity)
            .filter(|entry| entry.age() < self.ttl)
            .map(|entry| entry.visible)
    }

    /// The raw entry for `identity`, fresh or not.
    #[must_use]
    pub fn entry(&self, identity: u64) -> Option<MemoEntry> {
        self.table.lock().entries.get(&identity).copied()
    }

    /// Number of clears so far.
    #[must_use]
    pub fn epoch(&self) -> u64 {
        self.table.lock().epoch
    }

    /// Records `visible` for `identity`, replacing any previous entry.
    pub fn store(&self, identity: u64, visible: bool) {
        let mut table = self.table.lock();
        Self::insert(&mut table, identity, visible, self.stale_after, self.sweep_threshold);
    }

    /// Records `visible` for `identity` only if no clear happened since
    /// `epoch` was read. Returns `false` when the answer was dropped.
    pub fn store_in_epoch(&self, identity: u64, visible: bool, epoch: u64) -> bool {
        let mut table = self.table.lock();
        if table.epoch != epoch {
            return false;
        }
        Self::insert(&mut table, identity, visible, self.stale_after, self.sweep_threshold);
        true
    }

    fn insert(
        table: &mut MemoTable,
        identity: u64,
        visible: bool,
        stale_after: Duration,
        sweep_threshold: usize,
    ) {
        let entries = &mut table.entries;
        entries.insert(
            identity,
            MemoEntry {
                visible,
                stored_at: Instant::now(),
            },
        );

        if entries.len() > sweep_threshold {
            let before = entries.len();
            entries.retain(|_, entry| entry.age() <= stale_after);
            let swept = before - entries.len();
            if swept > 0 {
                debug!(swept, remaining = entries.len(), "visibility memo swept");
            }
        }
    }

    /// Forgets everything and starts a new epoch.
    pub fn clear(&self) {
        let mut table = self.table.lock();
        table.entries.clear();
        table.epoch += 1;
    }

    /// Number of entries, fresh or stale.
    #[must_use]
    pub fn len(&self) -> usize {
        self.table.lock().entries.len()
    }

    /// True when no entries are held.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.table.lock().entries.is_empty()
    }
}
