//! Watch daemon: rotate on an interval, rescan when library folders change

use crate::notifier::Notifier;
use anyhow::{Context, Result};
use notify::event::ModifyKind;
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::future::Future;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::MissedTickBehavior;

pub struct WatchConfig {
    pub interval: Duration,
    /// Folders to watch for added or removed images; empty disables watching
    pub folders: Vec<PathBuf>,
    pub recursive: bool,
}

/// Parse "90s", "30m", "1h", "1d" or a bare number of seconds
pub fn parse_interval(input: &str) -> Option<Duration> {
    let input = input.trim();
    let split = input
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(input.len());
    let (digits, unit) = input.split_at(split);
    let value: u64 = digits.parse().ok()?;

    let secs = match unit.trim() {
        "" | "s" | "sec" | "secs" => value,
        "m" | "min" | "mins" => value.checked_mul(60)?,
        "h" | "hr" | "hrs" => value.checked_mul(60 * 60)?,
        "d" | "day" | "days" => value.checked_mul(24 * 60 * 60)?,
        _ => return None,
    };

    (secs > 0).then(|| Duration::from_secs(secs))
}

fn is_library_change(event: &notify::Event) -> bool {
    let relevant_kind = matches!(
        event.kind,
        EventKind::Create(_) | EventKind::Remove(_) | EventKind::Modify(ModifyKind::Name(_))
    );
    relevant_kind && event.paths.iter().any(|p| crate::utils::is_image_file(p))
}

fn start_watcher(config: &WatchConfig, dirty: Arc<AtomicBool>) -> Result<RecommendedWatcher> {
    let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
        match res {
            Ok(event) if is_library_change(&event) => {
                tracing::debug!("Library change: {:?}", event.paths);
                dirty.store(true, Ordering::Relaxed);
            }
            Ok(_) => {}
            Err(e) => tracing::warn!("Folder watch error: {}", e),
        }
    })
    .context("Failed to create folder watcher")?;

    let mode = if config.recursive {
        RecursiveMode::Recursive
    } else {
        RecursiveMode::NonRecursive
    };
    for folder in &config.folders {
        if folder.is_dir() {
            watcher
                .watch(folder, mode)
                .with_context(|| format!("Failed to watch {}", folder.display()))?;
        }
    }

    Ok(watcher)
}

/// Call `on_tick` every interval until `shutdown` resolves.
///
/// The first tick fires immediately. `on_tick` receives `true` when a
/// watched folder changed since the previous tick. It runs on the blocking
/// pool, so `shutdown` is still observed while a rescan or an apply command
/// is in progress. A failing tick is reported through `notifier` and the
/// daemon keeps going. Returns the number of completed ticks.
pub async fn run_watch<F, S>(
    config: WatchConfig,
    notifier: &mut dyn Notifier,
    shutdown: S,
    on_tick: F,
) -> Result<usize>
where
    F: FnMut(bool) -> Result<()> + Send + 'static,
    S: Future,
{
    let dirty = Arc::new(AtomicBool::new(false));
    let _watcher = if config.folders.is_empty() {
        None
    } else {
        Some(start_watcher(&config, Arc::clone(&dirty))?)
    };

    tracing::info!("Rotating every {:?}", config.interval);
    let mut ticker = tokio::time::interval(config.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    tokio::pin!(shutdown);

    let on_tick = Arc::new(Mutex::new(on_tick));
    let mut ticks = 0;
    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            _ = ticker.tick() => {}
        }

        let rescan = dirty.swap(false, Ordering::Relaxed);
        let tick = Arc::clone(&on_tick);
        let job = tokio::task::spawn_blocking(move || {
            let mut on_tick = tick
                .lock()
                .map_err(|_| anyhow::anyhow!("A previous rotation panicked"))?;
            (*on_tick)(rescan)
        });

        let result = tokio::select! {
            _ = &mut shutdown => {
                tracing::info!("Stopping once the running rotation finishes");
                break;
            }
            joined = job => joined.context("Rotation task panicked").and_then(|r| r),
        };

        if let Err(e) = result {
            tracing::error!("Rotation failed: {:#}", e);
            notifier.error(&format!("{:#}", e));
        }
        ticks += 1;
    }

    tracing::info!("Stopping after {} rotations", ticks);
    Ok(ticks)
}
