use crate::error::ScopeError;
use crate::library::Library;
use crate::wallpaper::Wallpaper;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Restricts which wallpapers a target may rotate through
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scope {
    All,
    Tag(String),
    Folder(PathBuf),
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::All => f.write_str("all wallpapers"),
            Scope::Tag(tag) => write!(f, "tag '{}'", tag),
            Scope::Folder(folder) => write!(f, "folder {}", folder.display()),
        }
    }
}

/// Scope as written in the config file; a tag wins over a folder
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopeConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub folder: Option<PathBuf>,
}

impl ScopeConfig {
    pub fn scope(&self) -> Scope {
        match (&self.tag, &self.folder) {
            (Some(tag), _) => Scope::Tag(tag.clone()),
            (None, Some(folder)) => Scope::Folder(crate::utils::expand_tilde(folder)),
            (None, None) => Scope::All,
        }
    }

    pub fn is_set(&self) -> bool {
        self.tag.is_some() || self.folder.is_some()
    }
}

/// Candidates for `scope`, newest first.
///
/// `folders` is the configured library folder list; a folder scope outside it
/// is an error rather than an empty list.
pub fn resolve<'a>(
    library: &'a Library,
    scope: &Scope,
    folders: &[PathBuf],
) -> Result<Vec<&'a Wallpaper>, ScopeError> {
    match scope {
        Scope::All => Ok(library.all()),
        Scope::Tag(name) => {
            let tag = library
                .tag(name)
                .ok_or_else(|| ScopeError::UnknownTag(name.clone()))?;
            Ok(library.by_ids(&tag.ids))
        }
        Scope::Folder(folder) => {
            if !is_configured(folder, folders) {
                return Err(ScopeError::UnknownFolder(folder.clone()));
            }
            Ok(library.in_folder(folder))
        }
    }
}

fn is_configured(folder: &Path, folders: &[PathBuf]) -> bool {
    folders.iter().any(|f| f == folder)
}
