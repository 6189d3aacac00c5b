use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Wallpaper {
    /// BLAKE3 hash of the file content (hex), possibly versioned on conflict
    pub id: String,
    pub name: String,
    pub path: PathBuf,
    pub width: u32,
    pub height: u32,
    /// Library folder this file was found under
    pub folder: PathBuf,
    /// File size in bytes
    #[serde(default)]
    pub file_size: u64,
    /// Modification timestamp (seconds since epoch)
    #[serde(default)]
    pub modified_at: u64,
}

impl Wallpaper {
    /// Build a record from a file on disk.
    ///
    /// Only the image header is read for dimensions; the whole file is read
    /// once for the content hash.
    pub fn from_path(path: &Path, folder: &Path) -> Result<Self> {
        let (width, height) = image::image_dimensions(path)
            .with_context(|| format!("Failed to read image dimensions of {}", path.display()))?;
        let id = crate::utils::content_hash(path)?;

        let metadata = std::fs::metadata(path).ok();
        let file_size = metadata.as_ref().map(|m| m.len()).unwrap_or(0);
        let modified_at = metadata
            .and_then(|m| m.modified().ok())
            .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
            .map(|d| d.as_secs())
            .unwrap_or(0);

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        Ok(Self {
            id,
            name,
            path: path.to_path_buf(),
            width,
            height,
            folder: folder.to_path_buf(),
            file_size,
            modified_at,
        })
    }

    /// Backing file and its library folder both still exist
    pub fn exists_on_disk(&self) -> bool {
        self.path.is_file() && self.folder.is_dir()
    }

    pub fn is_portrait(&self) -> bool {
        self.height > self.width
    }

    pub fn short_id(&self) -> &str {
        crate::utils::short_id(&self.id)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Write a small PNG so header reads succeed
    pub(crate) fn write_png(path: &Path, width: u32, height: u32, shade: u8) {
        let img = image::RgbImage::from_pixel(width, height, image::Rgb([shade, shade, shade]));
        img.save(path).unwrap();
    }

    /// In-memory record for selector and store tests
    pub(crate) fn sample(id: &str) -> Wallpaper {
        Wallpaper {
            id: id.to_string(),
            name: format!("{}.png", id),
            path: PathBuf::from(format!("/walls/{}.png", id)),
            width: 1920,
            height: 1080,
            folder: PathBuf::from("/walls"),
            file_size: 0,
            modified_at: 0,
        }
    }

    #[test]
    fn test_from_path_reads_header_and_hash() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tall.png");
        write_png(&path, 3, 7, 10);

        let wp = Wallpaper::from_path(&path, dir.path()).unwrap();
        assert_eq!((wp.width, wp.height), (3, 7));
        assert!(wp.is_portrait());
        assert_eq!(wp.name, "tall.png");
        assert_eq!(wp.folder, dir.path());
        assert_eq!(wp.id, crate::utils::content_hash(&path).unwrap());
        assert!(wp.file_size > 0);
        assert!(wp.exists_on_disk());
    }

    #[test]
    fn test_from_path_rejects_non_image() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fake.png");
        std::fs::write(&path, b"not an image").unwrap();
        assert!(Wallpaper::from_path(&path, dir.path()).is_err());
    }
}
