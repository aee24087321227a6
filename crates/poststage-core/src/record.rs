use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// One input image as it moves through the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageRecord {
    /// Where the image was found, before it was moved to the originals area
    pub source_path: PathBuf,
    /// Base filename of the source; the join key for upload results
    pub key: String,
    /// Caption read from the image's description field
    pub caption: String,
    /// Attribution-tagged copy waiting in the to-upload area
    pub staged_upload_path: PathBuf,
    /// Hosted URL once the upload result has been joined in
    pub url: Option<String>,
}

impl ImageRecord {
    pub fn new(source_path: PathBuf, key: String, caption: String, staged_upload_path: PathBuf) -> Self {
        Self {
            source_path,
            key,
            caption,
            staged_upload_path,
            url: None,
        }
    }
}

/// A successful upload, keyed by the display filename of its source image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadResult {
    pub display_filename: String,
    pub hosted_url: String,
}

/// An image loaded into memory, read once and shared by the extractor and the rewriter.
#[derive(Debug, Clone)]
pub struct SourceImage {
    pub path: PathBuf,
    pub bytes: Vec<u8>,
}

impl SourceImage {
    pub fn open(path: &Path) -> std::io::Result<Self> {
        Ok(Self {
            path: path.to_path_buf(),
            bytes: std::fs::read(path)?,
        })
    }

    /// Base filename, used as the join key and as the name in the originals area.
    pub fn file_name(&self) -> Option<&str> {
        self.path.file_name().and_then(|n| n.to_str())
    }

    pub fn is_jpeg(&self) -> bool {
        self.bytes.starts_with(&[0xFF, 0xD8])
    }
}
