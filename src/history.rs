//! Recent-use ledger
//!
//! Remembers which wallpapers were shown so random rotation does not repeat
//! one before every candidate had its turn.

use crate::wallpaper::Wallpaper;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: String,
    pub path: PathBuf,
    pub shown_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecentLedger {
    #[serde(default)]
    entries: Vec<LedgerEntry>,
}

impl RecentLedger {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[LedgerEntry] {
        &self.entries
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.iter().any(|e| e.id == id)
    }

    /// Record a pick. An ID already present is moved to the end with a
    /// fresh timestamp rather than duplicated.
    pub fn record(&mut self, wallpaper: &Wallpaper) {
        self.entries.retain(|e| e.id != wallpaper.id);
        self.entries.push(LedgerEntry {
            id: wallpaper.id.clone(),
            path: wallpaper.path.clone(),
            shown_at: Utc::now(),
        });
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// True once every candidate has been shown
    pub fn covers(&self, candidates: &[&Wallpaper]) -> bool {
        candidates.iter().all(|wp| self.contains(&wp.id))
    }

    /// IDs to exclude from the next random pick among `candidates`.
    ///
    /// When the ledger already covers every candidate the cycle is over: the
    /// ledger is cleared and nothing is excluded.
    pub fn exclusions_for(&mut self, candidates: &[&Wallpaper]) -> HashSet<String> {
        if self.covers(candidates) {
            if !self.is_empty() {
                tracing::debug!("Ledger covers all {} candidates, starting a new cycle", candidates.len());
            }
            self.clear();
            return HashSet::new();
        }
        self.entries.iter().map(|e| e.id.clone()).collect()
    }
}
