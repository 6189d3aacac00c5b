//! One rotation across the configured targets
//!
//! Resolves each target's scope to candidates, runs the selector, applies the
//! pick and reports it. The store, state and configuration are borrowed from
//! the caller, which decides when to persist them.

use crate::apply::Applier;
use crate::config::Config;
use crate::library::Library;
use crate::notifier::Notifier;
use crate::rotation::{self, RotationMode, RotationState, Target, TargetSelection};
use crate::scope::{self, Scope};
use crate::wallpaper::Wallpaper;
use anyhow::{Context, Result};
use rand::Rng;
use std::fs;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Applied { target: Target, wallpaper: Wallpaper },
    /// Nothing to select for this target
    Skipped { target: Target },
}

/// Result of deleting a target's current wallpaper
#[derive(Debug)]
pub struct Deleted {
    pub path: PathBuf,
    pub file_removed: bool,
    pub record: Option<Wallpaper>,
}

pub struct Rotator<'a, R: Rng> {
    config: &'a Config,
    library: &'a mut Library,
    state: &'a mut RotationState,
    rng: R,
}

impl<'a, R: Rng> Rotator<'a, R> {
    pub fn new(
        config: &'a Config,
        library: &'a mut Library,
        state: &'a mut RotationState,
        rng: R,
    ) -> Self {
        Self {
            config,
            library,
            state,
            rng,
        }
    }

    /// Drop unsupported entries and records whose file or folder is gone
    pub fn validate(&mut self) -> usize {
        let sanitized = self.library.sanitize();
        let purged = self.library.purge_missing(&self.config.library_folders()).len();
        if sanitized + purged > 0 {
            tracing::info!("Removed {} stale library entries", sanitized + purged);
        }
        sanitized + purged
    }

    /// Choose the next wallpaper for `target` without applying it.
    ///
    /// Unscoped targets, and scopes that cannot be resolved, get a random pick
    /// over the whole library against the library-wide ledger. The configured
    /// mode only applies to tag and folder scopes. `None` means there is
    /// nothing to pick from.
    pub fn pick(&mut self, target: Target) -> Option<Wallpaper> {
        let scope = self.config.scope(target).scope();
        if scope == Scope::All {
            return self.pick_from_library();
        }

        let folders = self.config.library_folders();
        let mode = self.config.rotation.mode;

        match scope::resolve(&*self.library, &scope, &folders) {
            Ok(candidates) => {
                tracing::debug!(
                    "{} candidates for {} in {} ({})",
                    candidates.len(),
                    target,
                    scope,
                    mode.display_name()
                );
                rotation::select(&candidates, mode, self.state.target_mut(target), &mut self.rng)
                    .cloned()
            }
            Err(e) => {
                tracing::warn!("{} for {}, falling back to a random pick", e, target);
                self.pick_from_library()
            }
        }
    }

    fn pick_from_library(&mut self) -> Option<Wallpaper> {
        let candidates = self.library.all();
        rotation::select_random(&candidates, self.state.library_ledger_mut(), &mut self.rng)
            .cloned()
    }

    /// Both targets get the same wallpaper when they rotate sequentially
    /// through the same scope
    pub fn shares_pick(&self, selection: TargetSelection) -> bool {
        selection == TargetSelection::Both
            && self.config.rotation.mode == RotationMode::Sequential
            && self.config.home.scope() == self.config.lock.scope()
    }

    pub fn rotate(
        &mut self,
        selection: TargetSelection,
        applier: &mut dyn Applier,
        notifier: &mut dyn Notifier,
    ) -> Result<Vec<Outcome>> {
        if self.config.library.validate_before_rotate {
            self.validate();
        }

        let mut outcomes = Vec::new();

        if self.shares_pick(selection) {
            let pick = self.pick(Target::Home);
            let cursor = self.state.target(Target::Home).cursor;
            self.state.target_mut(Target::Lock).cursor = cursor;

            for target in Target::ALL {
                outcomes.push(match &pick {
                    Some(wp) => self.apply_one(target, wp.clone(), applier, notifier)?,
                    None => skipped(target),
                });
            }
            return Ok(outcomes);
        }

        for &target in selection.targets() {
            let outcome = match self.pick(target) {
                Some(wp) => self.apply_one(target, wp, applier, notifier)?,
                None => skipped(target),
            };
            outcomes.push(outcome);
        }

        Ok(outcomes)
    }

    /// `rotate`, then save the library and state even when a target failed,
    /// so picks made before the failure are not lost
    pub fn rotate_and_save(
        &mut self,
        selection: TargetSelection,
        applier: &mut dyn Applier,
        notifier: &mut dyn Notifier,
    ) -> Result<Vec<Outcome>> {
        let result = self.rotate(selection, applier, notifier);
        let saved = self.library.save().and_then(|()| self.state.save());

        match (result, saved) {
            (Ok(outcomes), saved) => saved.map(|()| outcomes),
            (Err(e), saved) => {
                if let Err(save_err) = saved {
                    tracing::error!("Failed to save rotation progress: {:#}", save_err);
                }
                Err(e)
            }
        }
    }

    fn apply_one(
        &mut self,
        target: Target,
        wallpaper: Wallpaper,
        applier: &mut dyn Applier,
        notifier: &mut dyn Notifier,
    ) -> Result<Outcome> {
        applier.apply(target, &wallpaper)?;
        self.state.target_mut(target).current = Some(wallpaper.path.clone());
        notifier.wallpaper_changed(target, &wallpaper);
        Ok(Outcome::Applied { target, wallpaper })
    }

    /// Delete the wallpaper currently shown on `target`: clear the target,
    /// remove the file, and drop its record only once the file was deleted.
    /// A file that is already missing leaves the record for the next
    /// validation pass.
    pub fn delete_current(
        &mut self,
        target: Target,
        applier: &mut dyn Applier,
    ) -> Result<Option<Deleted>> {
        let Some(path) = self.state.target(target).current.clone() else {
            return Ok(None);
        };

        applier.clear(target)?;

        let file_removed = if path.exists() {
            fs::remove_file(&path)
                .with_context(|| format!("Failed to delete {}", path.display()))?;
            true
        } else {
            tracing::warn!("{} is already gone", path.display());
            false
        };

        if !file_removed {
            return Ok(Some(Deleted {
                path,
                file_removed,
                record: None,
            }));
        }

        let record = self.library.remove_by_path(&path);
        for t in Target::ALL {
            let state = self.state.target_mut(t);
            if state.current.as_deref() == Some(path.as_path()) {
                state.current = None;
            }
        }

        tracing::info!("Deleted {} wallpaper {}", target, path.display());
        Ok(Some(Deleted {
            path,
            file_removed,
            record,
        }))
    }
}

fn skipped(target: Target) -> Outcome {
    tracing::info!("No wallpapers available for {}, skipping", target);
    Outcome::Skipped { target }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::library::ConflictPolicy;
    use crate::scope::ScopeConfig;
    use crate::wallpaper::tests::{sample, write_png};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[derive(Default)]
    struct RecordingApplier {
        applied: Vec<(Target, String)>,
        cleared: Vec<Target>,
        fail_on: Option<Target>,
    }

    impl Applier for RecordingApplier {
        fn apply(&mut self, target: Target, wallpaper: &Wallpaper) -> Result<()> {
            if self.fail_on == Some(target) {
                anyhow::bail!("setter exploded");
            }
            self.applied.push((target, wallpaper.id.clone()));
            Ok(())
        }

        fn clear(&mut self, target: Target) -> Result<()> {
            self.cleared.push(target);
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingNotifier {
        changed: Vec<(Target, String)>,
        errors: Vec<String>,
    }

    impl Notifier for RecordingNotifier {
        fn wallpaper_changed(&mut self, target: Target, wallpaper: &Wallpaper) {
            self.changed.push((target, wallpaper.id.clone()));
        }

        fn error(&mut self, message: &str) {
            self.errors.push(message.to_string());
        }
    }

    fn config(mode: RotationMode) -> Config {
        let mut config = Config::default();
        config.library.folders = vec![PathBuf::from("/walls")];
        config.library.validate_before_rotate = false;
        config.rotation.mode = mode;
        config
    }

    fn library(ids: &[&str]) -> Library {
        let mut lib = Library::new(PathBuf::from("/nonexistent/library.json"));
        for (i, id) in ids.iter().enumerate() {
            let mut wp = sample(id);
            wp.modified_at = 100 - i as u64;
            lib.insert(wp, ConflictPolicy::Reject).unwrap();
        }
        lib
    }

    fn state() -> RotationState {
        RotationState::new(PathBuf::from("/nonexistent/state.json"))
    }

    fn tagged(tag: &str) -> ScopeConfig {
        ScopeConfig {
            tag: Some(tag.into()),
            folder: None,
        }
    }

    #[test]
    fn test_tag_scope_limits_candidates() {
        let cfg = {
            let mut c = config(RotationMode::Random);
            c.home = ScopeConfig {
                tag: Some("nature".into()),
                folder: None,
            };
            c
        };
        let mut lib = library(&["a", "b", "c", "d"]);
        lib.add_tag("b", "nature").unwrap();
        lib.add_tag("d", "nature").unwrap();
        let mut st = state();
        let mut rotator = Rotator::new(&cfg, &mut lib, &mut st, StdRng::seed_from_u64(3));

        let first = rotator.pick(Target::Home).unwrap();
        let second = rotator.pick(Target::Home).unwrap();
        let mut got = vec![first.id, second.id];
        got.sort();
        assert_eq!(got, vec!["b", "d"]);
    }

    #[test]
    fn test_unknown_tag_falls_back_to_library() {
        let mut cfg = config(RotationMode::Sequential);
        cfg.lock.tag = Some("missing".into());
        let mut lib = library(&["a", "b"]);
        let mut st = state();
        let mut rotator = Rotator::new(&cfg, &mut lib, &mut st, StdRng::seed_from_u64(1));

        let pick = rotator.pick(Target::Lock).unwrap();
        assert!(pick.id == "a" || pick.id == "b");
        drop(rotator);
        assert_eq!(st.library_ledger().len(), 1);
        assert_eq!(st.target(Target::Lock).cursor, 0);
    }

    #[test]
    fn test_folder_scope() {
        let mut cfg = config(RotationMode::Sequential);
        cfg.library.folders.push(PathBuf::from("/other"));
        cfg.home.folder = Some(PathBuf::from("/other"));
        let mut lib = library(&["a", "b"]);
        let mut other = sample("o");
        other.folder = PathBuf::from("/other");
        other.path = PathBuf::from("/other/o.png");
        lib.insert(other, ConflictPolicy::Reject).unwrap();
        let mut st = state();
        let mut rotator = Rotator::new(&cfg, &mut lib, &mut st, StdRng::seed_from_u64(1));

        for _ in 0..3 {
            assert_eq!(rotator.pick(Target::Home).unwrap().id, "o");
        }
    }

    #[test]
    fn test_rotate_empty_library_skips() {
        let cfg = config(RotationMode::Random);
        let mut lib = library(&[]);
        let mut st = state();
        let mut applier = RecordingApplier::default();
        let mut notifier = RecordingNotifier::default();
        let mut rotator = Rotator::new(&cfg, &mut lib, &mut st, StdRng::seed_from_u64(1));

        let outcomes = rotator
            .rotate(TargetSelection::Both, &mut applier, &mut notifier)
            .unwrap();
        assert_eq!(
            outcomes,
            vec![
                Outcome::Skipped { target: Target::Home },
                Outcome::Skipped { target: Target::Lock }
            ]
        );
        assert!(applier.applied.is_empty());
        assert!(notifier.changed.is_empty());
        assert!(notifier.errors.is_empty());
    }

    #[test]
    fn test_unscoped_pick_is_random_over_library_ledger() {
        let cfg = config(RotationMode::Sequential);
        let mut lib = library(&["a", "b", "c"]);
        let mut st = state();
        let mut rotator = Rotator::new(&cfg, &mut lib, &mut st, StdRng::seed_from_u64(4));

        let mut seen: Vec<String> = (0..3)
            .map(|_| rotator.pick(Target::Home).unwrap().id)
            .collect();
        drop(rotator);

        seen.sort();
        assert_eq!(seen, vec!["a", "b", "c"]);
        assert_eq!(st.library_ledger().len(), 3);
        assert_eq!(st.target(Target::Home).cursor, 0);
        assert!(st.target(Target::Home).ledger.is_empty());
    }

    #[test]
    fn test_sequential_both_unscoped_shares_one_pick() {
        let cfg = config(RotationMode::Sequential);
        let mut lib = library(&["a", "b", "c"]);
        let mut st = state();
        let mut applier = RecordingApplier::default();
        let mut notifier = RecordingNotifier::default();
        let mut rotator = Rotator::new(&cfg, &mut lib, &mut st, StdRng::seed_from_u64(1));
        assert!(rotator.shares_pick(TargetSelection::Both));

        rotator
            .rotate(TargetSelection::Both, &mut applier, &mut notifier)
            .unwrap();
        drop(rotator);

        assert_eq!(applier.applied.len(), 2);
        assert_eq!(applier.applied[0].1, applier.applied[1].1);
        assert_eq!(st.library_ledger().len(), 1);
        assert_eq!(
            st.target(Target::Home).current,
            st.target(Target::Lock).current
        );
    }

    #[test]
    fn test_sequential_both_shares_one_pick() {
        let mut cfg = config(RotationMode::Sequential);
        cfg.home = tagged("all");
        cfg.lock = tagged("all");
        let mut lib = library(&["a", "b", "c"]);
        for id in ["a", "b", "c"] {
            lib.add_tag(id, "all").unwrap();
        }
        let mut st = state();
        let mut applier = RecordingApplier::default();
        let mut notifier = RecordingNotifier::default();
        let mut rotator = Rotator::new(&cfg, &mut lib, &mut st, StdRng::seed_from_u64(1));
        assert!(rotator.shares_pick(TargetSelection::Both));
        assert!(!rotator.shares_pick(TargetSelection::Home));

        rotator
            .rotate(TargetSelection::Both, &mut applier, &mut notifier)
            .unwrap();
        drop(rotator);

        assert_eq!(
            applier.applied,
            vec![(Target::Home, "b".to_string()), (Target::Lock, "b".to_string())]
        );
        assert_eq!(st.target(Target::Home).cursor, 1);
        assert_eq!(st.target(Target::Lock).cursor, 1);
        assert_eq!(st.target(Target::Lock).current, Some(PathBuf::from("/walls/b.png")));
        assert_eq!(notifier.changed.len(), 2);
    }

    #[test]
    fn test_different_scopes_do_not_share_pick() {
        let mut cfg = config(RotationMode::Sequential);
        cfg.home = tagged("day");
        cfg.lock = tagged("night");
        let mut lib = library(&["a", "b"]);
        lib.add_tag("a", "day").unwrap();
        lib.add_tag("b", "night").unwrap();
        let mut st = state();
        let mut applier = RecordingApplier::default();
        let mut notifier = RecordingNotifier::default();
        let mut rotator = Rotator::new(&cfg, &mut lib, &mut st, StdRng::seed_from_u64(1));
        assert!(!rotator.shares_pick(TargetSelection::Both));

        rotator
            .rotate(TargetSelection::Both, &mut applier, &mut notifier)
            .unwrap();

        assert_eq!(
            applier.applied,
            vec![(Target::Home, "a".to_string()), (Target::Lock, "b".to_string())]
        );
    }

    #[test]
    fn test_failed_target_keeps_earlier_progress() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = config(RotationMode::Sequential);
        cfg.home = tagged("all");
        let mut lib = Library::new(dir.path().join("library.json"));
        for (i, id) in ["a", "b", "c"].iter().enumerate() {
            let mut wp = sample(id);
            wp.modified_at = 100 - i as u64;
            lib.insert(wp, ConflictPolicy::Reject).unwrap();
            lib.add_tag(id, "all").unwrap();
        }
        let state_path = dir.path().join("state.json");
        let mut st = RotationState::new(state_path.clone());
        let mut applier = RecordingApplier {
            fail_on: Some(Target::Lock),
            ..Default::default()
        };
        let mut notifier = RecordingNotifier::default();
        let mut rotator = Rotator::new(&cfg, &mut lib, &mut st, StdRng::seed_from_u64(1));
        assert!(!rotator.shares_pick(TargetSelection::Both));

        for _ in 0..2 {
            assert!(rotator
                .rotate_and_save(TargetSelection::Both, &mut applier, &mut notifier)
                .is_err());
        }
        drop(rotator);

        assert_eq!(
            applier.applied,
            vec![(Target::Home, "b".to_string()), (Target::Home, "c".to_string())]
        );

        let reopened = RotationState::open(&state_path).unwrap();
        assert_eq!(reopened.target(Target::Home).cursor, 2);
        assert_eq!(
            reopened.target(Target::Home).current,
            Some(PathBuf::from("/walls/c.png"))
        );
        assert!(reopened.target(Target::Lock).current.is_none());
        // Lock picks are recorded even though applying them failed
        assert_eq!(reopened.library_ledger().len(), 2);
    }

    #[test]
    fn test_random_both_uses_separate_ledgers() {
        let mut cfg = config(RotationMode::Random);
        cfg.home = tagged("all");
        cfg.lock = tagged("all");
        let mut lib = library(&["a", "b", "c"]);
        for id in ["a", "b", "c"] {
            lib.add_tag(id, "all").unwrap();
        }
        let mut st = state();
        let mut applier = RecordingApplier::default();
        let mut notifier = RecordingNotifier::default();
        let mut rotator = Rotator::new(&cfg, &mut lib, &mut st, StdRng::seed_from_u64(9));
        assert!(!rotator.shares_pick(TargetSelection::Both));

        for _ in 0..3 {
            rotator
                .rotate(TargetSelection::Both, &mut applier, &mut notifier)
                .unwrap();
        }
        drop(rotator);

        for target in Target::ALL {
            let mut seen: Vec<&str> = applier
                .applied
                .iter()
                .filter(|(t, _)| *t == target)
                .map(|(_, id)| id.as_str())
                .collect();
            seen.sort();
            assert_eq!(seen, vec!["a", "b", "c"]);
            assert_eq!(st.target(target).ledger.len(), 3);
        }
    }

    #[test]
    fn test_apply_failure_propagates() {
        let cfg = config(RotationMode::Random);
        let mut lib = library(&["a"]);
        let mut st = state();
        let mut applier = RecordingApplier {
            fail_on: Some(Target::Home),
            ..Default::default()
        };
        let mut notifier = RecordingNotifier::default();
        let mut rotator = Rotator::new(&cfg, &mut lib, &mut st, StdRng::seed_from_u64(1));

        let err = rotator
            .rotate(TargetSelection::Home, &mut applier, &mut notifier)
            .unwrap_err();
        assert!(err.to_string().contains("setter exploded"));
        drop(rotator);
        assert!(st.target(Target::Home).current.is_none());
        assert!(notifier.changed.is_empty());
    }

    #[test]
    fn test_validate_before_rotate_and_delete() {
        let dir = tempfile::tempdir().unwrap();
        let walls = dir.path().join("walls");
        fs::create_dir_all(&walls).unwrap();
        write_png(&walls.join("one.png"), 2, 2, 1);
        write_png(&walls.join("two.png"), 2, 2, 2);

        let mut cfg = config(RotationMode::Sequential);
        cfg.library.folders = vec![walls.clone()];
        cfg.library.validate_before_rotate = true;

        let mut lib = Library::new(dir.path().join("library.json"));
        lib.scan(&cfg.library_folders(), false, ConflictPolicy::Version)
            .unwrap();
        let ghost = sample("ghost");
        lib.insert(ghost, ConflictPolicy::Reject).unwrap();
        assert_eq!(lib.len(), 3);

        let mut st = state();
        let mut applier = RecordingApplier::default();
        let mut notifier = RecordingNotifier::default();
        let mut rotator = Rotator::new(&cfg, &mut lib, &mut st, StdRng::seed_from_u64(1));

        let outcomes = rotator
            .rotate(TargetSelection::Home, &mut applier, &mut notifier)
            .unwrap();
        let Outcome::Applied { wallpaper, .. } = &outcomes[0] else {
            panic!("expected a wallpaper to be applied");
        };
        let shown = wallpaper.path.clone();

        let deleted = rotator
            .delete_current(Target::Home, &mut applier)
            .unwrap()
            .unwrap();
        assert_eq!(deleted.path, shown);
        assert!(deleted.file_removed);
        assert!(deleted.record.is_some());
        assert!(!shown.exists());

        // Nothing left to delete until the next rotation
        assert!(rotator
            .delete_current(Target::Home, &mut applier)
            .unwrap()
            .is_none());
        drop(rotator);

        assert_eq!(lib.len(), 1);
        assert!(lib.get("ghost").is_none());
        assert_eq!(applier.cleared, vec![Target::Home]);
        assert!(st.target(Target::Home).current.is_none());
    }

    #[test]
    fn test_delete_missing_file_keeps_record() {
        let cfg = config(RotationMode::Random);
        let mut lib = library(&["a"]);
        let mut st = state();
        st.target_mut(Target::Lock).current = Some(PathBuf::from("/walls/a.png"));
        let mut applier = RecordingApplier::default();
        let mut rotator = Rotator::new(&cfg, &mut lib, &mut st, StdRng::seed_from_u64(1));

        let deleted = rotator
            .delete_current(Target::Lock, &mut applier)
            .unwrap()
            .unwrap();
        drop(rotator);

        assert!(!deleted.file_removed);
        assert!(deleted.record.is_none());
        assert!(lib.get("a").is_some());
        assert_eq!(
            st.target(Target::Lock).current,
            Some(PathBuf::from("/walls/a.png"))
        );
    }
}
