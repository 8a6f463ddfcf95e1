use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::model::{AirportRef, FavoritePair};

/// In-memory projection of the favorites store, used for instant toggle feedback.
///
/// A missing key reads as `false`. Each toggled pair also remembers the
/// sequence number of its newest queued write and the last value the store
/// confirmed, so a failed write can be undone without clobbering a later one.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FavoriteFlags {
    flags: HashMap<FavoritePair, bool>,
    writes: HashMap<FavoritePair, WriteTrack>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct WriteTrack {
    latest: u64,
    durable: bool,
}

/// Result of a toggle: the new flag value and the sequence number of the
/// write that has to make it durable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Toggled {
    pub favorite: bool,
    pub seq: u64,
}

impl FavoriteFlags {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, pair: &FavoritePair) -> bool {
        self.flags.get(pair).copied().unwrap_or(false)
    }

    pub fn set(&mut self, pair: FavoritePair, value: bool) {
        self.flags.insert(pair, value);
    }

    /// Flip the flag and issue the next write sequence number for the pair.
    pub fn toggle(&mut self, pair: &FavoritePair) -> Toggled {
        let previous = self.get(pair);
        let track = self.writes.entry(pair.clone()).or_insert(WriteTrack {
            latest: 0,
            durable: previous,
        });
        track.latest += 1;
        let seq = track.latest;

        self.flags.insert(pair.clone(), !previous);
        Toggled { favorite: !previous, seq }
    }

    /// Record that a write for `pair` reached the store, leaving it at `value`.
    ///
    /// Writes are applied in issue order, so the last confirmation wins.
    pub fn confirm_write(&mut self, pair: &FavoritePair, value: bool) {
        if let Some(track) = self.writes.get_mut(pair) {
            track.durable = value;
        }
    }

    /// Undo the write `seq` after it failed.
    ///
    /// Only the newest write for a pair may roll back; an older failure is
    /// settled by the writes queued after it. The flag goes back to the last
    /// value the store confirmed. Returns the restored value if the flag changed.
    pub fn roll_back(&mut self, pair: &FavoritePair, seq: u64) -> Option<bool> {
        let track = *self.writes.get(pair)?;
        if track.latest != seq || self.get(pair) == track.durable {
            return None;
        }
        self.flags.insert(pair.clone(), track.durable);
        Some(track.durable)
    }

    /// Mark as favorite every stored pair departing `selection` whose
    /// destination is listed in `destinations`. Never clears a flag.
    ///
    /// Returns how many flags went from `false` to `true`.
    pub fn reconcile(
        &mut self,
        all_favorites: &[FavoritePair],
        selection: &AirportRef,
        destinations: &[AirportRef],
    ) -> usize {
        let mut raised = 0;
        for pair in all_favorites {
            if pair.departure_code != selection.iata_code {
                continue;
            }
            if !destinations.iter().any(|d| d.iata_code == pair.destination_code) {
                continue;
            }
            if !self.get(pair) {
                raised += 1;
            }
            self.flags.insert(pair.clone(), true);
        }
        raised
    }

    /// Pairs currently flagged as favorite, sorted.
    pub fn favorites(&self) -> Vec<FavoritePair> {
        let mut pairs: Vec<_> = self
            .flags
            .iter()
            .filter(|(_, on)| **on)
            .map(|(pair, _)| pair.clone())
            .collect();
        pairs.sort();
        pairs
    }
}

/// What to do with an optimistic flag when its durable write fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WriteFailurePolicy {
    /// Keep the optimistic value; the next reconciliation repairs it.
    #[default]
    Ignore,
    /// Restore the last value the store confirmed, unless a later write for
    /// the same pair is still queued.
    Rollback,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FavoriteOp {
    Insert,
    Delete,
}

/// A durable write that did not reach its store.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WriteFailure {
    Favorite {
        pair: FavoritePair,
        op: FavoriteOp,
        message: String,
    },
    InputPreference {
        text: String,
        message: String,
    },
}
