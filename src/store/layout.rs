//! Deterministic on-disk placement of page image files.
//!
//! A document's pages live three directories deep so that no single directory
//! grows to hold the whole collection:
//!
//! ```text
//! <root>/<id[0:2]>/<id[2:4]>/<id>/<id>.<page>.png
//! ```

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::fs;

use crate::error::ImageError;
use crate::imaging::{ImageKey, IMAGE_FORMAT};

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Maps keys to file paths below a root directory.
#[derive(Debug, Clone)]
pub struct StoreLayout {
    root: PathBuf,
}

impl StoreLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Folder holding all pages of one document.
    pub fn document_dir(&self, doc_id: &str) -> PathBuf {
        // ImageKey guarantees an ASCII id of at least four characters
        self.root
            .join(&doc_id[0..2])
            .join(&doc_id[2..4])
            .join(doc_id)
    }

    /// File of one page.
    pub fn page_path(&self, key: &ImageKey) -> PathBuf {
        self.document_dir(key.doc_id())
            .join(format!("{}.{}", key, IMAGE_FORMAT))
    }
}

/// Write `data` to `path` through a uniquely named temp file and a rename.
///
/// Readers never see a partially written file, and concurrent writers of the
/// same path each replace it whole; the last rename wins.
pub async fn write_atomic(path: &Path, data: &[u8]) -> Result<(), ImageError> {
    let parent = path
        .parent()
        .ok_or_else(|| ImageError::Storage(format!("No parent directory for {}", path.display())))?;
    fs::create_dir_all(parent)
        .await
        .map_err(|e| storage_error("create directory", parent, e))?;

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let temp_path = parent.join(format!(
        ".{}.{}.{}.tmp",
        file_name,
        std::process::id(),
        TEMP_COUNTER.fetch_add(1, Ordering::Relaxed)
    ));

    if let Err(e) = fs::write(&temp_path, data).await {
        let _ = fs::remove_file(&temp_path).await;
        return Err(storage_error("write", &temp_path, e));
    }
    if let Err(e) = fs::rename(&temp_path, path).await {
        let _ = fs::remove_file(&temp_path).await;
        return Err(storage_error("rename", path, e));
    }
    Ok(())
}

/// Read a whole file, mapping "missing" to `None`.
pub async fn read_if_exists(path: &Path) -> Result<Option<Vec<u8>>, ImageError> {
    match fs::read(path).await {
        Ok(data) => Ok(Some(data)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(storage_error("read", path, e)),
    }
}

fn storage_error(action: &str, path: &Path, err: std::io::Error) -> ImageError {
    ImageError::Storage(format!("Failed to {} {}: {}", action, path.display(), err))
}
