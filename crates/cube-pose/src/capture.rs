//! Frame conversion and optional PNG persistence.

use std::path::{Path, PathBuf};

use image::{GrayImage, ImageFormat, RgbImage};
use serde::{Deserialize, Serialize};

/// Errors raised while persisting a captured frame.
#[derive(thiserror::Error, Debug)]
pub enum CaptureError {
    #[error("failed to create capture directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("capture file name must not be empty")]
    EmptyFileName,
    #[error(transparent)]
    Image(#[from] image::ImageError),
}

/// Where to write a frame, when requested.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureTarget {
    pub dir: PathBuf,
    /// File stem; `.png` is appended.
    pub file_name: String,
}

impl CaptureTarget {
    pub fn new(dir: impl Into<PathBuf>, file_name: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            file_name: file_name.into(),
        }
    }

    pub fn path(&self) -> PathBuf {
        self.dir.join(format!("{}.png", self.file_name))
    }
}

/// Single-channel intensity image used by marker detectors.
pub fn to_gray(image: &RgbImage) -> GrayImage {
    image::imageops::grayscale(image)
}

/// Write `image` to `<dir>/<file_name>.png`, creating `dir` if needed.
pub fn save_capture(image: &RgbImage, dir: &Path, file_name: &str) -> Result<PathBuf, CaptureError> {
    if file_name.is_empty() {
        return Err(CaptureError::EmptyFileName);
    }
    std::fs::create_dir_all(dir).map_err(|source| CaptureError::CreateDir {
        path: dir.to_path_buf(),
        source,
    })?;

    let path = CaptureTarget::new(dir, file_name).path();
    image.save_with_format(&path, ImageFormat::Png)?;
    log::info!("saved capture to {}", path.display());
    Ok(path)
}
