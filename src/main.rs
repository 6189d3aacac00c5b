mod apply;
mod config;
mod error;
mod history;
mod library;
mod notifier;
mod rotation;
mod rotator;
mod scope;
mod utils;
mod wallpaper;
mod watch;

use anyhow::{Context, Result};
use apply::CommandApplier;
use clap::{ArgGroup, Parser, Subcommand, ValueEnum};
use config::Config;
use library::Library;
use notifier::{ConsoleNotifier, Notifier};
use rotation::{RotationState, Target, TargetSelection};
use rotator::{Outcome, Rotator};
use scope::Scope;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::Level;

#[derive(Parser)]
#[command(name = "periwall")]
#[command(version)]
#[command(about = "Rotate home and lock screen wallpapers from a local library without repeats")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file (defaults to the user config directory)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Directory for the library index and rotation state
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// More log output (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Pick and apply the next wallpaper
    Rotate {
        /// Targets to update (defaults to the configured target)
        #[arg(short, long)]
        target: Option<TargetSelection>,
    },
    /// Index the configured library folders
    Scan,
    /// List indexed wallpapers
    List {
        /// Only wallpapers with this tag
        #[arg(long)]
        tag: Option<String>,
        /// Only wallpapers from this library folder
        #[arg(long, conflicts_with = "tag")]
        folder: Option<PathBuf>,
    },
    /// Show rotation settings and per-target progress
    Status,
    /// Delete the wallpaper currently shown on a target (file and index entry)
    Delete {
        #[arg(short, long, value_enum)]
        target: Target,
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
    /// Manage wallpaper tags
    Tag {
        #[command(subcommand)]
        action: TagAction,
    },
    /// Restrict a target to a tag or folder
    Scope {
        #[command(subcommand)]
        action: ScopeAction,
    },
    /// Manage the recently shown history
    History {
        #[command(subcommand)]
        action: HistoryAction,
    },
    /// Run as a daemon, rotating on an interval
    Watch {
        /// Rotation interval (e.g. "30m", "1h", "90s"); defaults to the config
        #[arg(short, long)]
        interval: Option<String>,
        /// Targets to update (defaults to the configured target)
        #[arg(short, long)]
        target: Option<TargetSelection>,
        /// Do not rescan when library folders change
        #[arg(long)]
        no_watch_dir: bool,
    },
}

#[derive(Subcommand)]
enum TagAction {
    /// List all tags
    List,
    /// Add a tag to a wallpaper (ID, ID prefix or path)
    Add { wallpaper: String, tag: String },
    /// Remove a tag from a wallpaper
    Remove { wallpaper: String, tag: String },
    /// Show wallpapers with a tag
    Show { tag: String },
}

#[derive(Subcommand)]
enum ScopeAction {
    /// Rotate a target through a tag or a folder only
    #[command(group(ArgGroup::new("source").required(true).args(["tag", "folder"])))]
    Set {
        #[arg(short, long, value_enum)]
        target: Target,
        #[arg(long)]
        tag: Option<String>,
        #[arg(long)]
        folder: Option<PathBuf>,
    },
    /// Rotate a target through the whole library again
    Clear {
        #[arg(short, long, value_enum)]
        target: Target,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum HistoryTarget {
    Home,
    Lock,
    /// The library-wide history used when a scope cannot be resolved
    Library,
}

#[derive(Subcommand)]
enum HistoryAction {
    /// Forget recently shown wallpapers
    Clear {
        /// Only this history (all when omitted)
        #[arg(short, long)]
        target: Option<HistoryTarget>,
    },
}

/// Resolved locations plus the loaded configuration
#[derive(Clone)]
struct Session {
    config: Config,
    config_path: PathBuf,
    data_dir: PathBuf,
}

impl Session {
    fn load(config_path: PathBuf, data_dir: Option<PathBuf>) -> Result<Self> {
        let config = Config::load(&config_path)?;
        let data_dir = data_dir.unwrap_or_else(config::default_data_dir);
        Ok(Self {
            config,
            config_path,
            data_dir,
        })
    }

    fn library_path(&self) -> PathBuf {
        self.data_dir.join("library.json")
    }

    fn state_path(&self) -> PathBuf {
        self.data_dir.join("state.json")
    }

    fn open_library(&self) -> Result<Library> {
        Library::open(&self.library_path())
    }

    /// Open the library, indexing the folders first if it was never scanned
    fn open_library_or_scan(&self) -> Result<Library> {
        let mut library = self.open_library()?;
        if library.is_empty() {
            tracing::info!("Library is empty, scanning configured folders");
            self.scan_into(&mut library)?;
        }
        Ok(library)
    }

    fn open_state(&self) -> Result<RotationState> {
        RotationState::open(&self.state_path())
    }

    fn scan_into(&self, library: &mut Library) -> Result<library::ScanReport> {
        let report = library.scan(
            &self.config.library_folders(),
            self.config.library.recursive,
            self.config.library.conflict,
        )?;
        library.save()?;
        Ok(report)
    }

    fn notifier(&self) -> ConsoleNotifier {
        ConsoleNotifier::new(self.config.notifications.clone())
    }
}

fn init_logging(verbosity: u8) {
    let level = match verbosity {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config_path = cli.config.clone().unwrap_or_else(Config::default_path);

    match run(cli, config_path.clone()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let notifications = Config::load(&config_path)
                .map(|c| c.notifications)
                .unwrap_or_default();
            ConsoleNotifier::new(notifications).error(&format!("{:#}", e));
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli, config_path: PathBuf) -> Result<()> {
    let mut session = Session::load(config_path, cli.data_dir)?;

    match cli.command {
        Commands::Rotate { target } => cmd_rotate(&session, target)?,
        Commands::Scan => cmd_scan(&session)?,
        Commands::List { tag, folder } => cmd_list(&session, tag, folder)?,
        Commands::Status => cmd_status(&session)?,
        Commands::Delete { target, yes } => cmd_delete(&session, target, yes)?,
        Commands::Tag { action } => cmd_tag(&session, action)?,
        Commands::Scope { action } => cmd_scope(&mut session, action)?,
        Commands::History { action } => cmd_history(&session, action)?,
        Commands::Watch {
            interval,
            target,
            no_watch_dir,
        } => cmd_watch(&session, interval, target, no_watch_dir).await?,
    }

    Ok(())
}

fn rotate_once(session: &Session, target: Option<TargetSelection>) -> Result<Vec<Outcome>> {
    let mut library = session.open_library_or_scan()?;
    let mut state = session.open_state()?;
    let selection = target.unwrap_or(session.config.rotation.target);

    let mut applier = CommandApplier::new(session.config.apply.clone());
    let mut notifier = session.notifier();
    Rotator::new(&session.config, &mut library, &mut state, rand::thread_rng())
        .rotate_and_save(selection, &mut applier, &mut notifier)
}

fn cmd_rotate(session: &Session, target: Option<TargetSelection>) -> Result<()> {
    let outcomes = rotate_once(session, target)?;

    if outcomes
        .iter()
        .all(|o| matches!(o, Outcome::Skipped { .. }))
    {
        println!("No wallpapers to rotate through.");
        println!("Add images to a library folder and run 'periwall scan'.");
    }

    Ok(())
}

fn cmd_scan(session: &Session) -> Result<()> {
    let folders = session.config.library_folders();
    for folder in &folders {
        println!("Scanning {}...", folder.display());
    }

    let mut library = session.open_library()?;
    let report = session.scan_into(&mut library)?;

    println!("Found {} images:", report.found);
    println!("  New:       {}", report.added);
    println!("  Updated:   {}", report.updated);
    println!("  Versioned: {}", report.versioned);
    println!("  Rejected:  {}", report.rejected);
    println!("  Unreadable:{:>2}", report.failed);
    println!("  Removed:   {}", report.removed);
    println!(
        "Library holds {} wallpapers ({}).",
        library.len(),
        library.path().display()
    );

    Ok(())
}

fn cmd_list(session: &Session, tag: Option<String>, folder: Option<PathBuf>) -> Result<()> {
    let library = session.open_library()?;
    let scope = match (tag, folder) {
        (Some(tag), _) => Scope::Tag(tag),
        (None, Some(folder)) => Scope::Folder(utils::expand_tilde(&folder)),
        (None, None) => Scope::All,
    };

    let wallpapers = scope::resolve(&library, &scope, &session.config.library_folders())?;
    if wallpapers.is_empty() {
        println!("No wallpapers in {}.", scope);
        return Ok(());
    }

    for wp in wallpapers {
        let tags = library.tags_of(&wp.id);
        let tags = if tags.is_empty() {
            String::new()
        } else {
            format!(" [{}]", tags.join(", "))
        };
        let orientation = if wp.is_portrait() { "P" } else { "L" };
        println!(
            "{}  {:>5}x{:<5} {} {}{}",
            wp.short_id(),
            wp.width,
            wp.height,
            orientation,
            wp.path.display(),
            tags
        );
    }

    Ok(())
}

fn cmd_status(session: &Session) -> Result<()> {
    let library = session.open_library()?;
    let state = session.open_state()?;
    let folders = session.config.library_folders();
    let config = &session.config;

    println!("Library: {} wallpapers, {} tags", library.len(), library.tags().len());
    for folder in &folders {
        println!("  {} ({})", folder.display(), library.in_folder(folder).len());
    }
    println!();
    println!("Mode:     {}", config.rotation.mode.display_name());
    println!("Targets:  {:?}", config.rotation.target);
    println!("Interval: {}", config.rotation.interval);
    println!("Conflict: {}", config.library.conflict.display_name());

    for target in Target::ALL {
        let scope = config.scope(target).scope();
        let target_state = state.target(target);
        let candidates = match scope::resolve(&library, &scope, &folders) {
            Ok(c) => c.len().to_string(),
            Err(e) => format!("unavailable: {}", e),
        };

        println!();
        println!("{}:", target);
        if config.scope(target).is_set() {
            println!("  Scope:      {} ({} candidates)", scope, candidates);
        } else {
            println!("  Scope:      whole library ({} candidates)", candidates);
        }
        println!("  Position:   {}", target_state.cursor);
        println!("  Shown:      {} this cycle", target_state.ledger.len());
        if let Some(last) = target_state.ledger.entries().last() {
            println!(
                "  Last shown: {}",
                last.shown_at.with_timezone(&chrono::Local).format("%Y-%m-%d %H:%M")
            );
        }
        match &target_state.current {
            Some(path) => println!("  Current:    {}", path.display()),
            None => println!("  Current:    -"),
        }
    }

    println!();
    println!("Library-wide history: {}", state.library_ledger().len());
    Ok(())
}

fn cmd_delete(session: &Session, target: Target, yes: bool) -> Result<()> {
    let mut library = session.open_library()?;
    let mut state = session.open_state()?;

    let Some(current) = state.target(target).current.clone() else {
        println!("No wallpaper recorded for {}.", target);
        return Ok(());
    };

    if !yes {
        let confirmed = dialoguer::Confirm::new()
            .with_prompt(format!("Delete {}?", current.display()))
            .default(false)
            .interact()?;
        if !confirmed {
            return Ok(());
        }
    }

    let mut applier = CommandApplier::new(session.config.apply.clone());
    let deleted = Rotator::new(&session.config, &mut library, &mut state, rand::thread_rng())
        .delete_current(target, &mut applier)?;

    library.save()?;
    state.save()?;

    if let Some(deleted) = deleted {
        if !deleted.file_removed {
            println!(
                "{} is already gone; it leaves the index on the next rotation or scan",
                deleted.path.display()
            );
        } else {
            println!("✓ Deleted {}", deleted.path.display());
            if deleted.record.is_none() {
                println!("(it was not in the library index)");
            }
        }
    }

    Ok(())
}

fn cmd_tag(session: &Session, action: TagAction) -> Result<()> {
    let mut library = session.open_library()?;

    match action {
        TagAction::List => {
            if library.tags().is_empty() {
                println!("No tags defined.");
                println!("Add tags with: periwall tag add <wallpaper> <tag>");
            } else {
                println!("Tags:");
                for tag in library.tags() {
                    println!("  {} ({})", tag.name, tag.ids.len());
                }
            }
        }
        TagAction::Add { wallpaper, tag } => {
            let id = library.find(&wallpaper)?.id.clone();
            library.add_tag(&id, &tag)?;
            library.save()?;
            println!("✓ Added tag '{}' to {}", tag, utils::short_id(&id));
        }
        TagAction::Remove { wallpaper, tag } => {
            let id = library.find(&wallpaper)?.id.clone();
            if library.remove_tag(&id, &tag) {
                library.save()?;
                println!("✓ Removed tag '{}' from {}", tag, utils::short_id(&id));
            } else {
                println!("{} is not tagged '{}'", utils::short_id(&id), tag);
            }
        }
        TagAction::Show { tag } => match library.tag(&tag) {
            Some(t) => {
                println!("Wallpapers with tag '{}':", t.name);
                for wp in library.by_ids(&t.ids) {
                    println!("  {}  {}", wp.short_id(), wp.path.display());
                }
            }
            None => println!("No wallpapers with tag '{}'", tag),
        },
    }

    Ok(())
}

fn cmd_scope(session: &mut Session, action: ScopeAction) -> Result<()> {
    let target = match &action {
        ScopeAction::Set { target, .. } | ScopeAction::Clear { target } => *target,
    };

    match action {
        ScopeAction::Set {
            tag: Some(tag), ..
        } => {
            let library = session.open_library()?;
            if library.tag(&tag).is_none() {
                println!("Warning: no wallpaper is tagged '{}' yet", tag);
            }
            *session.config.scope_mut(target) = scope::ScopeConfig {
                tag: Some(tag),
                folder: None,
            };
        }
        ScopeAction::Set {
            folder: Some(folder),
            ..
        } => {
            let expanded = utils::expand_tilde(&folder);
            if !session.config.library_folders().contains(&expanded) {
                anyhow::bail!(
                    "{} is not a library folder; add it to [library] folders in {}",
                    expanded.display(),
                    session.config_path.display()
                );
            }
            *session.config.scope_mut(target) = scope::ScopeConfig {
                tag: None,
                folder: Some(folder),
            };
        }
        ScopeAction::Set { .. } => anyhow::bail!("Either --tag or --folder is required"),
        ScopeAction::Clear { .. } => {
            *session.config.scope_mut(target) = scope::ScopeConfig::default();
        }
    }

    session.config.save(&session.config_path)?;

    // New scope, new cycle
    let mut state = session.open_state()?;
    state.target_mut(target).reset();
    state.save()?;

    println!("{} now rotates through {}", target, session.config.scope(target).scope());
    Ok(())
}

fn cmd_history(session: &Session, action: HistoryAction) -> Result<()> {
    let mut state = session.open_state()?;

    match action {
        HistoryAction::Clear { target } => {
            match target {
                Some(HistoryTarget::Home) => state.target_mut(Target::Home).ledger.clear(),
                Some(HistoryTarget::Lock) => state.target_mut(Target::Lock).ledger.clear(),
                Some(HistoryTarget::Library) => state.library_ledger_mut().clear(),
                None => {
                    for t in Target::ALL {
                        state.target_mut(t).ledger.clear();
                    }
                    state.library_ledger_mut().clear();
                }
            }
            state.save()?;
            println!("✓ History cleared");
        }
    }

    Ok(())
}

async fn cmd_watch(
    session: &Session,
    interval: Option<String>,
    target: Option<TargetSelection>,
    no_watch_dir: bool,
) -> Result<()> {
    let interval = interval.unwrap_or_else(|| session.config.rotation.interval.clone());
    let parsed = watch::parse_interval(&interval)
        .with_context(|| format!("Invalid interval '{}'", interval))?;

    let folders = if no_watch_dir {
        Vec::new()
    } else {
        session.config.library_folders()
    };
    let watch_config = watch::WatchConfig {
        interval: parsed,
        folders,
        recursive: session.config.library.recursive,
    };

    println!("Rotating every {} (Ctrl-C to stop)", interval);
    let mut notifier = session.notifier();
    let tick_session = session.clone();
    watch::run_watch(
        watch_config,
        &mut notifier,
        async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::warn!("Cannot listen for Ctrl-C: {}", e);
                std::future::pending::<()>().await;
            }
        },
        move |rescan| {
            if rescan {
                let mut library = tick_session.open_library()?;
                tick_session.scan_into(&mut library)?;
            }
            rotate_once(&tick_session, target).map(|_| ())
        },
    )
    .await?;

    Ok(())
}
