use crate::library::ConflictPolicy;
use crate::rotation::{RotationMode, Target, TargetSelection};
use crate::scope::ScopeConfig;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

fn project_dirs() -> Option<directories::ProjectDirs> {
    directories::ProjectDirs::from("com", "periwall", "periwall")
}

/// Directory holding `library.json` and `state.json`
pub fn default_data_dir() -> PathBuf {
    project_dirs()
        .map(|dirs| dirs.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("/tmp/periwall"))
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub library: LibraryConfig,
    #[serde(default)]
    pub rotation: RotationConfig,
    /// Scope for the home screen target
    #[serde(default)]
    pub home: ScopeConfig,
    /// Scope for the lock screen target
    #[serde(default)]
    pub lock: ScopeConfig,
    #[serde(default)]
    pub apply: ApplyConfig,
    #[serde(default)]
    pub notifications: NotificationConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LibraryConfig {
    pub folders: Vec<PathBuf>,
    #[serde(default = "default_true")]
    pub recursive: bool,
    /// How scans handle two files with identical content
    #[serde(default)]
    pub conflict: ConflictPolicy,
    /// Purge missing files and unsupported entries before each rotation
    #[serde(default = "default_true")]
    pub validate_before_rotate: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RotationConfig {
    #[serde(default)]
    pub mode: RotationMode,
    #[serde(default = "default_target")]
    pub target: TargetSelection,
    /// Default interval for `watch` (e.g. "30m", "1h", "90s")
    #[serde(default = "default_interval")]
    pub interval: String,
}

/// External commands, as argv templates.
///
/// `{path}` expands to the wallpaper file and `{target}` to `home` or `lock`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplyConfig {
    #[serde(default)]
    pub home: Vec<String>,
    #[serde(default)]
    pub lock: Vec<String>,
    /// Run when the current wallpaper of a target is deleted
    #[serde(default)]
    pub clear: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationConfig {
    pub enabled: bool,
    /// Optional argv template with `{title}` and `{body}`, e.g. notify-send
    #[serde(default)]
    pub command: Vec<String>,
}

fn default_true() -> bool {
    true
}

fn default_target() -> TargetSelection {
    TargetSelection::Home
}

fn default_interval() -> String {
    "30m".to_string()
}

impl Default for LibraryConfig {
    fn default() -> Self {
        Self {
            folders: vec![dirs::picture_dir()
                .map(|p| p.join("wallpapers"))
                .unwrap_or_else(|| PathBuf::from("~/Pictures/wallpapers"))],
            recursive: true,
            conflict: ConflictPolicy::Version,
            validate_before_rotate: true,
        }
    }
}

impl Default for RotationConfig {
    fn default() -> Self {
        Self {
            mode: RotationMode::Random,
            target: default_target(),
            interval: default_interval(),
        }
    }
}

impl Default for ApplyConfig {
    fn default() -> Self {
        Self {
            home: vec!["swww".into(), "img".into(), "{path}".into()],
            lock: Vec::new(),
            clear: Vec::new(),
        }
    }
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            command: Vec::new(),
        }
    }
}

impl Config {
    pub fn default_path() -> PathBuf {
        project_dirs()
            .map(|dirs| dirs.config_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."))
            .join("config.toml")
    }

    /// Load `path`, writing the defaults there first if it does not exist
    pub fn load(path: &Path) -> Result<Self> {
        if path.exists() {
            let data = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config {}", path.display()))?;
            let config: Config = toml::from_str(&data)
                .with_context(|| format!("Failed to parse config {}", path.display()))?;
            Ok(config)
        } else {
            let config = Config::default();
            config.save(path)?;
            Ok(config)
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let data = toml::to_string_pretty(self)?;
        fs::write(path, data)
            .with_context(|| format!("Failed to write config {}", path.display()))?;

        Ok(())
    }

    /// Library folders with `~` expanded
    pub fn library_folders(&self) -> Vec<PathBuf> {
        self.library
            .folders
            .iter()
            .map(|f| crate::utils::expand_tilde(f))
            .collect()
    }

    pub fn scope(&self, target: Target) -> &ScopeConfig {
        match target {
            Target::Home => &self.home,
            Target::Lock => &self.lock,
        }
    }

    pub fn scope_mut(&mut self, target: Target) -> &mut ScopeConfig {
        match target {
            Target::Home => &mut self.home,
            Target::Lock => &mut self.lock,
        }
    }
}
