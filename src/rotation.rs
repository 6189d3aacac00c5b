//! Rotation state and the wallpaper selector
//!
//! Each target (home, lock) keeps its own cursor and ledger; a third ledger
//! serves the library-wide random fallback.

use crate::history::RecentLedger;
use crate::wallpaper::Wallpaper;
use anyhow::{Context, Result};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// How the next wallpaper is chosen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RotationMode {
    /// Walk the candidate list in order
    Sequential,
    /// Uniform pick among candidates not shown in the current cycle
    #[default]
    Random,
}

impl RotationMode {
    pub fn display_name(&self) -> &'static str {
        match self {
            RotationMode::Sequential => "Sequential",
            RotationMode::Random => "Random",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Target {
    Home,
    Lock,
}

impl Target {
    pub const ALL: [Target; 2] = [Target::Home, Target::Lock];

    pub fn as_str(&self) -> &'static str {
        match self {
            Target::Home => "home",
            Target::Lock => "lock",
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which targets a rotation updates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum TargetSelection {
    Home,
    Lock,
    #[default]
    Both,
}

impl TargetSelection {
    pub fn targets(&self) -> &'static [Target] {
        match self {
            TargetSelection::Home => &[Target::Home],
            TargetSelection::Lock => &[Target::Lock],
            TargetSelection::Both => &Target::ALL,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetState {
    /// Index of the last sequential pick
    #[serde(default)]
    pub cursor: usize,
    #[serde(default)]
    pub ledger: RecentLedger,
    /// Last wallpaper applied to this target
    #[serde(default)]
    pub current: Option<PathBuf>,
}

impl TargetState {
    /// Forget position and history, e.g. after the scope changed
    pub fn reset(&mut self) {
        self.cursor = 0;
        self.ledger.clear();
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct StateData {
    #[serde(default)]
    home: TargetState,
    #[serde(default)]
    lock: TargetState,
    /// Ledger for the unscoped pick across the whole library
    #[serde(default)]
    library: RecentLedger,
}

/// Persisted rotation state
#[derive(Debug)]
pub struct RotationState {
    data: StateData,
    path: PathBuf,
}

impl RotationState {
    pub fn new(path: PathBuf) -> Self {
        Self {
            data: StateData::default(),
            path,
        }
    }

    pub fn open(path: &Path) -> Result<Self> {
        let mut state = Self::new(path.to_path_buf());

        if path.exists() {
            let content = fs::read_to_string(path)
                .with_context(|| format!("Failed to read rotation state {}", path.display()))?;
            state.data = serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse rotation state {}", path.display()))?;
        }

        Ok(state)
    }

    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(&self.data)?;
        fs::write(&self.path, content)
            .with_context(|| format!("Failed to write rotation state {}", self.path.display()))?;

        Ok(())
    }

    pub fn target(&self, target: Target) -> &TargetState {
        match target {
            Target::Home => &self.data.home,
            Target::Lock => &self.data.lock,
        }
    }

    pub fn target_mut(&mut self, target: Target) -> &mut TargetState {
        match target {
            Target::Home => &mut self.data.home,
            Target::Lock => &mut self.data.lock,
        }
    }

    pub fn library_ledger(&self) -> &RecentLedger {
        &self.data.library
    }

    pub fn library_ledger_mut(&mut self) -> &mut RecentLedger {
        &mut self.data.library
    }
}

/// Sequential pick: the candidate after `cursor`, wrapping to the first one.
///
/// The cursor is updated to the index returned; it is reset to 0 when it
/// points past the end (for instance after the candidate list shrank).
pub fn select_sequential<'a>(candidates: &[&'a Wallpaper], cursor: &mut usize) -> Option<&'a Wallpaper> {
    let position = cursor.saturating_add(1);
    match candidates.get(position) {
        Some(wp) => {
            *cursor = position;
            Some(*wp)
        }
        None => {
            *cursor = 0;
            candidates.first().copied()
        }
    }
}

/// Random pick that avoids anything already in `ledger` for this cycle.
///
/// Once the ledger covers every candidate it is cleared first. The pick is
/// appended to the ledger.
pub fn select_random<'a, R: Rng + ?Sized>(
    candidates: &[&'a Wallpaper],
    ledger: &mut RecentLedger,
    rng: &mut R,
) -> Option<&'a Wallpaper> {
    if candidates.is_empty() {
        return None;
    }

    let excluded: HashSet<String> = ledger.exclusions_for(candidates);
    let mut pool: Vec<&'a Wallpaper> = candidates
        .iter()
        .copied()
        .filter(|wp| !excluded.contains(&wp.id))
        .collect();
    if pool.is_empty() {
        pool = candidates.to_vec();
    }

    let pick = pool.choose(rng).copied()?;
    ledger.record(pick);
    Some(pick)
}

/// Pick with the target's own cursor or ledger depending on `mode`
pub fn select<'a, R: Rng + ?Sized>(
    candidates: &[&'a Wallpaper],
    mode: RotationMode,
    state: &mut TargetState,
    rng: &mut R,
) -> Option<&'a Wallpaper> {
    match mode {
        RotationMode::Sequential => select_sequential(candidates, &mut state.cursor),
        RotationMode::Random => select_random(candidates, &mut state.ledger, rng),
    }
}
