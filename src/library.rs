//! Wallpaper store
//!
//! Holds every indexed wallpaper plus the tags that group them. The store is
//! a plain JSON document loaded from an explicit path; callers own the handle
//! and decide when to save.

use crate::error::StoreError;
use crate::wallpaper::Wallpaper;
use anyhow::{Context, Result};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// What to do when an inserted wallpaper's ID is already taken by another file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ConflictPolicy {
    /// Refuse the insert
    Reject,
    /// Overwrite the existing record
    Replace,
    /// Keep both, storing the new one under `<id>-v<N>`
    #[default]
    Version,
}

impl ConflictPolicy {
    pub fn display_name(&self) -> &'static str {
        match self {
            ConflictPolicy::Reject => "reject",
            ConflictPolicy::Replace => "replace",
            ConflictPolicy::Version => "version",
        }
    }
}

/// Outcome of a successful insert, carrying the ID the record was stored under
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inserted {
    New(String),
    /// Same ID already existed and was overwritten
    Updated(String),
    /// ID collided with a different file and was versioned
    Versioned(String),
}

impl Inserted {
    pub fn id(&self) -> &str {
        match self {
            Inserted::New(id) | Inserted::Updated(id) | Inserted::Versioned(id) => id,
        }
    }
}

/// A named set of wallpaper IDs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub name: String,
    pub ids: BTreeSet<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct LibraryData {
    #[serde(default)]
    wallpapers: Vec<Wallpaper>,
    #[serde(default)]
    tags: Vec<Tag>,
}

/// Counters reported by a scan
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ScanReport {
    pub found: usize,
    pub added: usize,
    pub updated: usize,
    pub versioned: usize,
    pub rejected: usize,
    pub failed: usize,
    pub removed: usize,
}

#[derive(Debug)]
pub struct Library {
    data: LibraryData,
    path: PathBuf,
}

fn normalize_tag(tag: &str) -> String {
    tag.trim().to_lowercase()
}

impl Library {
    /// Empty store that will be saved to `path`
    pub fn new(path: PathBuf) -> Self {
        Self {
            data: LibraryData::default(),
            path,
        }
    }

    /// Load the store at `path`, or start empty if the file does not exist yet
    pub fn open(path: &Path) -> Result<Self> {
        let mut library = Self::new(path.to_path_buf());

        if path.exists() {
            let content = fs::read_to_string(path)
                .with_context(|| format!("Failed to read library {}", path.display()))?;
            library.data = serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse library {}", path.display()))?;
            library.sort();
        }

        Ok(library)
    }

    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(&self.data)?;
        fs::write(&self.path, content)
            .with_context(|| format!("Failed to write library {}", self.path.display()))?;

        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Newest first, path as tie-break
    fn sort(&mut self) {
        self.data.wallpapers.sort_by(|a, b| {
            b.modified_at
                .cmp(&a.modified_at)
                .then_with(|| a.path.cmp(&b.path))
        });
    }

    pub fn len(&self) -> usize {
        self.data.wallpapers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.wallpapers.is_empty()
    }

    /// Every wallpaper, newest first
    pub fn all(&self) -> Vec<&Wallpaper> {
        self.data.wallpapers.iter().collect()
    }

    pub fn get(&self, id: &str) -> Option<&Wallpaper> {
        self.data.wallpapers.iter().find(|wp| wp.id == id)
    }

    pub fn by_path(&self, path: &Path) -> Option<&Wallpaper> {
        self.data.wallpapers.iter().find(|wp| wp.path == path)
    }

    /// Resolve a user-supplied reference: full ID, path, or unique ID prefix
    pub fn find(&self, query: &str) -> Result<&Wallpaper, StoreError> {
        if let Some(wp) = self.get(query) {
            return Ok(wp);
        }
        let as_path = crate::utils::expand_tilde(Path::new(query));
        if let Some(wp) = self.by_path(&as_path) {
            return Ok(wp);
        }

        let matches: Vec<&Wallpaper> = self
            .data
            .wallpapers
            .iter()
            .filter(|wp| wp.id.starts_with(query))
            .collect();
        match matches.len() {
            0 => Err(StoreError::NotFound(query.to_string())),
            1 => Ok(matches[0]),
            n => Err(StoreError::Ambiguous {
                query: query.to_string(),
                matches: n,
            }),
        }
    }

    pub fn by_ids(&self, ids: &BTreeSet<String>) -> Vec<&Wallpaper> {
        self.data
            .wallpapers
            .iter()
            .filter(|wp| ids.contains(&wp.id))
            .collect()
    }

    pub fn in_folder(&self, folder: &Path) -> Vec<&Wallpaper> {
        self.data
            .wallpapers
            .iter()
            .filter(|wp| wp.folder == folder)
            .collect()
    }

    /// Insert a record, resolving ID collisions with `policy`.
    ///
    /// Re-inserting the same file (same ID, same path) always updates in place.
    /// A record already stored for the same path under another ID is dropped
    /// first, since the file content changed.
    pub fn insert(
        &mut self,
        mut wallpaper: Wallpaper,
        policy: ConflictPolicy,
    ) -> Result<Inserted, StoreError> {
        let base_id = wallpaper.id.clone();
        let existing = self.position(&base_id);

        let outcome = match existing {
            None => {
                self.drop_stale_path(&wallpaper);
                self.data.wallpapers.push(wallpaper);
                Inserted::New(base_id)
            }
            Some(idx) if self.data.wallpapers[idx].path == wallpaper.path => {
                self.data.wallpapers[idx] = wallpaper;
                Inserted::Updated(base_id)
            }
            Some(idx) => match policy {
                ConflictPolicy::Reject => {
                    return Err(StoreError::DuplicateId {
                        id: base_id,
                        existing: self.data.wallpapers[idx].path.clone(),
                    });
                }
                ConflictPolicy::Replace => {
                    tracing::info!(
                        "Replacing {} with {}",
                        self.data.wallpapers[idx].path.display(),
                        wallpaper.path.display()
                    );
                    self.drop_stale_path(&wallpaper);
                    let idx = self.position(&base_id).unwrap_or(idx);
                    self.data.wallpapers[idx] = wallpaper;
                    Inserted::Updated(base_id)
                }
                ConflictPolicy::Version => {
                    let mut n = 2;
                    loop {
                        let candidate = format!("{}-v{}", base_id, n);
                        match self.position(&candidate) {
                            None => {
                                tracing::info!(
                                    "Duplicate content at {}, stored as {}",
                                    wallpaper.path.display(),
                                    candidate
                                );
                                wallpaper.id = candidate.clone();
                                self.drop_stale_path(&wallpaper);
                                self.data.wallpapers.push(wallpaper);
                                break Inserted::Versioned(candidate);
                            }
                            Some(i) if self.data.wallpapers[i].path == wallpaper.path => {
                                wallpaper.id = candidate.clone();
                                self.data.wallpapers[i] = wallpaper;
                                break Inserted::Updated(candidate);
                            }
                            Some(_) => n += 1,
                        }
                    }
                }
            },
        };

        self.sort();
        Ok(outcome)
    }

    fn position(&self, id: &str) -> Option<usize> {
        self.data.wallpapers.iter().position(|wp| wp.id == id)
    }

    fn drop_stale_path(&mut self, incoming: &Wallpaper) {
        let stale: Vec<String> = self
            .data
            .wallpapers
            .iter()
            .filter(|wp| wp.path == incoming.path && wp.id != incoming.id)
            .map(|wp| wp.id.clone())
            .collect();
        for id in stale {
            tracing::debug!("Dropping stale record {} for {}", id, incoming.path.display());
            self.remove(&id);
        }
    }

    /// Remove a record and its tag memberships
    pub fn remove(&mut self, id: &str) -> Option<Wallpaper> {
        let idx = self.position(id)?;
        let removed = self.data.wallpapers.remove(idx);
        for tag in &mut self.data.tags {
            tag.ids.remove(id);
        }
        self.data.tags.retain(|t| !t.ids.is_empty());
        Some(removed)
    }

    pub fn remove_by_path(&mut self, path: &Path) -> Option<Wallpaper> {
        let id = self.by_path(path)?.id.clone();
        self.remove(&id)
    }

    /// Drop records whose file is gone, or whose folder is missing or no
    /// longer one of `folders`
    pub fn purge_missing(&mut self, folders: &[PathBuf]) -> Vec<Wallpaper> {
        let valid: BTreeSet<&Path> = folders
            .iter()
            .filter(|f| f.is_dir())
            .map(|f| f.as_path())
            .collect();

        let doomed: Vec<String> = self
            .data
            .wallpapers
            .iter()
            .filter(|wp| !valid.contains(wp.folder.as_path()) || !wp.exists_on_disk())
            .map(|wp| wp.id.clone())
            .collect();

        doomed.iter().filter_map(|id| self.remove(id)).collect()
    }

    /// Drop records whose file name is not a supported image type
    pub fn sanitize(&mut self) -> usize {
        let doomed: Vec<String> = self
            .data
            .wallpapers
            .iter()
            .filter(|wp| !crate::utils::is_image_file(Path::new(&wp.name)))
            .map(|wp| wp.id.clone())
            .collect();

        doomed.iter().filter_map(|id| self.remove(id)).count()
    }

    pub fn tags(&self) -> &[Tag] {
        &self.data.tags
    }

    pub fn tag(&self, name: &str) -> Option<&Tag> {
        let name = normalize_tag(name);
        self.data.tags.iter().find(|t| t.name == name)
    }

    /// Tags a wallpaper belongs to
    pub fn tags_of(&self, id: &str) -> Vec<&str> {
        self.data
            .tags
            .iter()
            .filter(|t| t.ids.contains(id))
            .map(|t| t.name.as_str())
            .collect()
    }

    /// Add a wallpaper to a tag, creating the tag if needed
    pub fn add_tag(&mut self, id: &str, tag: &str) -> Result<(), StoreError> {
        let name = normalize_tag(tag);
        if name.is_empty() {
            return Err(StoreError::EmptyTag);
        }
        if self.get(id).is_none() {
            return Err(StoreError::NotFound(id.to_string()));
        }

        match self.data.tags.iter_mut().find(|t| t.name == name) {
            Some(t) => {
                t.ids.insert(id.to_string());
            }
            None => {
                self.data.tags.push(Tag {
                    name,
                    ids: BTreeSet::from([id.to_string()]),
                });
                self.data.tags.sort_by(|a, b| a.name.cmp(&b.name));
            }
        }
        Ok(())
    }

    /// Remove a wallpaper from a tag; empty tags are deleted
    pub fn remove_tag(&mut self, id: &str, tag: &str) -> bool {
        let name = normalize_tag(tag);
        let removed = self
            .data
            .tags
            .iter_mut()
            .find(|t| t.name == name)
            .map(|t| t.ids.remove(id))
            .unwrap_or(false);
        self.data.tags.retain(|t| !t.ids.is_empty());
        removed
    }

    /// Index `folders`, then purge records that no longer have a backing file
    pub fn scan(
        &mut self,
        folders: &[PathBuf],
        recursive: bool,
        policy: ConflictPolicy,
    ) -> Result<ScanReport> {
        let mut entries: Vec<(PathBuf, &Path)> = Vec::new();
        for folder in folders {
            if !folder.is_dir() {
                tracing::warn!("Library folder {} does not exist, skipping", folder.display());
                continue;
            }
            let files: Vec<PathBuf> = if recursive {
                WalkDir::new(folder)
                    .follow_links(true)
                    .into_iter()
                    .filter_map(|e| e.ok())
                    .map(|e| e.path().to_path_buf())
                    .filter(|p| p.is_file() && crate::utils::is_image_file(p))
                    .collect()
            } else {
                fs::read_dir(folder)
                    .with_context(|| format!("Failed to read directory: {}", folder.display()))?
                    .flatten()
                    .map(|e| e.path())
                    .filter(|p| p.is_file() && crate::utils::is_image_file(p))
                    .collect()
            };
            entries.extend(files.into_iter().map(|p| (p, folder.as_path())));
        }

        let mut report = ScanReport {
            found: entries.len(),
            ..Default::default()
        };

        // Hashing dominates, so read files in parallel and insert serially
        let mut read: Vec<Wallpaper> = entries
            .par_iter()
            .filter_map(|(path, folder)| match Wallpaper::from_path(path, folder) {
                Ok(wp) => Some(wp),
                Err(e) => {
                    tracing::warn!("Failed to read {}: {:#}", path.display(), e);
                    None
                }
            })
            .collect();
        report.failed = entries.len() - read.len();

        // Deterministic insert order so versioned IDs are stable across scans
        read.sort_by(|a, b| a.path.cmp(&b.path));

        for wp in read {
            let path = wp.path.clone();
            match self.insert(wp, policy) {
                Ok(Inserted::New(_)) => report.added += 1,
                Ok(Inserted::Updated(_)) => report.updated += 1,
                Ok(versioned @ Inserted::Versioned(_)) => {
                    tracing::info!("{} stored as {}", path.display(), versioned.id());
                    report.versioned += 1;
                }
                Err(e) => {
                    tracing::warn!("Skipping {}: {}", path.display(), e);
                    report.rejected += 1;
                }
            }
        }

        report.removed = self.purge_missing(folders).len();
        tracing::info!(
            "Scan complete: {} found, {} new, {} removed",
            report.found,
            report.added,
            report.removed
        );

        Ok(report)
    }
}
