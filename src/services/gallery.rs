use serde::Serialize;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::info;

pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif"];

const TEXT_EXTENSIONS: &[&str] = &["txt", "md"];

/// File that collects notes posted through the upload form, one per line.
const NOTES_FILE: &str = "text.txt";

#[derive(Debug, Error)]
pub enum GalleryError {
    #[error("Gallery '{0}' not found")]
    NotFound(String),

    #[error("{0}")]
    Validation(String),

    #[error("Gallery I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GalleryListing {
    /// Image file names relative to the gallery directory.
    pub images: Vec<String>,

    pub texts: Vec<String>,
}

/// Directory-backed galleries.
///
/// Files directly under the root form the default gallery; every
/// sub-directory is a named gallery.
pub struct GalleryService {
    root: PathBuf,
}

impl GalleryService {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub async fn ensure_root(&self) -> Result<(), GalleryError> {
        fs::create_dir_all(&self.root).await?;
        Ok(())
    }

    /// Names of the named galleries, sorted.
    pub async fn galleries(&self) -> Result<Vec<String>, GalleryError> {
        let root = self.root.clone();
        let names = tokio::task::spawn_blocking(move || {
            if !root.is_dir() {
                return Vec::new();
            }
            let mut names: Vec<String> = walkdir::WalkDir::new(&root)
                .min_depth(1)
                .max_depth(1)
                .into_iter()
                .filter_map(Result::ok)
                .filter(|e| e.file_type().is_dir())
                .filter_map(|e| e.file_name().to_str().map(str::to_string))
                .filter(|name| !name.starts_with('.'))
                .collect();
            names.sort();
            names
        })
        .await
        .map_err(|e| GalleryError::Io(std::io::Error::other(e)))?;

        Ok(names)
    }

    /// Lists the images and notes of a gallery. `None` is the default gallery,
    /// which is empty rather than missing before the first upload.
    pub async fn list(&self, gallery: Option<&str>) -> Result<GalleryListing, GalleryError> {
        let dir = match gallery {
            Some(name) => {
                let dir = self.gallery_dir(name)?;
                if !fs::metadata(&dir).await.is_ok_and(|m| m.is_dir()) {
                    return Err(GalleryError::NotFound(name.to_string()));
                }
                dir
            }
            None => {
                if !fs::metadata(&self.root).await.is_ok_and(|m| m.is_dir()) {
                    return Ok(GalleryListing::default());
                }
                self.root.clone()
            }
        };

        let mut files = Vec::new();
        let mut entries = fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_file()
                && let Some(name) = entry.file_name().to_str()
            {
                files.push(name.to_string());
            }
        }
        files.sort();

        let mut listing = GalleryListing::default();
        let mut documents = Vec::new();

        for name in files {
            let Some(ext) = extension_of(&name) else {
                continue;
            };
            if IMAGE_EXTENSIONS.contains(&ext.as_str()) {
                listing.images.push(name);
            } else if name == NOTES_FILE {
                let content = fs::read_to_string(dir.join(&name)).await?;
                listing.texts.extend(
                    content
                        .lines()
                        .map(str::trim)
                        .filter(|l| !l.is_empty())
                        .map(str::to_string),
                );
            } else if TEXT_EXTENSIONS.contains(&ext.as_str()) {
                documents.push(fs::read_to_string(dir.join(&name)).await?);
            }
        }

        listing.texts.extend(documents);
        Ok(listing)
    }

    /// Stores an uploaded image under its sanitized name and returns that name.
    /// An existing file with the same name is replaced.
    pub async fn save_image(
        &self,
        gallery: Option<&str>,
        filename: &str,
        bytes: &[u8],
    ) -> Result<String, GalleryError> {
        let name = sanitize_filename(filename)
            .ok_or_else(|| GalleryError::Validation("Invalid file name".to_string()))?;

        let is_image = extension_of(&name).is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.as_str()));
        if !is_image {
            return Err(GalleryError::Validation(format!(
                "Only {} images can be uploaded",
                IMAGE_EXTENSIONS.join(", ")
            )));
        }

        if bytes.is_empty() {
            return Err(GalleryError::Validation("The uploaded file is empty".to_string()));
        }

        let dir = self.target_dir(gallery)?;
        fs::create_dir_all(&dir).await?;

        let path = dir.join(&name);
        fs::write(&path, bytes).await?;

        info!(path = %path.display(), bytes = bytes.len(), "Image uploaded");
        Ok(name)
    }

    /// Appends a note as one line of the gallery's notes file.
    pub async fn append_text(&self, gallery: Option<&str>, text: &str) -> Result<(), GalleryError> {
        let line = text.split_whitespace().collect::<Vec<_>>().join(" ");
        if line.is_empty() {
            return Err(GalleryError::Validation("Text cannot be empty".to_string()));
        }

        let dir = self.target_dir(gallery)?;
        fs::create_dir_all(&dir).await?;

        let path = dir.join(NOTES_FILE);
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        file.write_all(format!("{line}\n").as_bytes()).await?;
        file.flush().await?;

        info!(path = %path.display(), chars = line.len(), "Note added");
        Ok(())
    }

    fn target_dir(&self, gallery: Option<&str>) -> Result<PathBuf, GalleryError> {
        match gallery.map(str::trim).filter(|g| !g.is_empty()) {
            Some(name) => self.gallery_dir(name),
            None => Ok(self.root.clone()),
        }
    }

    fn gallery_dir(&self, name: &str) -> Result<PathBuf, GalleryError> {
        validate_gallery_name(name)?;
        Ok(self.root.join(name))
    }
}

/// Reduces an uploaded file name to a safe basename: ASCII alphanumerics,
/// `.`, `-` and `_`, with whitespace turned into `_` and leading dots dropped.
#[must_use]
pub fn sanitize_filename(name: &str) -> Option<String> {
    // Browsers may send a full client-side path.
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);

    let cleaned: String = base
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'))
        .collect();

    let cleaned = cleaned.trim_start_matches('.').to_string();
    (!cleaned.is_empty()).then_some(cleaned)
}

/// Gallery names must already be in sanitized form, which rules out
/// traversal and hidden directories.
pub fn validate_gallery_name(name: &str) -> Result<(), GalleryError> {
    if sanitize_filename(name).as_deref() == Some(name) && name.len() <= 64 {
        Ok(())
    } else {
        Err(GalleryError::Validation(format!("Invalid gallery name '{name}'")))
    }
}

fn extension_of(name: &str) -> Option<String> {
    Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
}
