use std::path::PathBuf;

use reqwest::StatusCode;

/// Failure reading a field out of an image's embedded metadata.
#[derive(Debug, thiserror::Error)]
pub enum MetadataError {
    #[error("image carries no metadata block")]
    NoMetadata,
    #[error("metadata field {0} is missing")]
    MissingField(exif::Tag),
    #[error("metadata field {0} is not text")]
    NotText(exif::Tag),
    #[error("unreadable metadata: {0}")]
    Malformed(#[source] exif::Error),
}

/// Failure producing the attribution-tagged copy of an image.
#[derive(Debug, thiserror::Error)]
pub enum RewriteError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("could not decode image: {0}")]
    Decode(#[from] image::ImageError),
    #[error("could not parse JPEG container: {0}")]
    Container(#[from] img_parts::Error),
    #[error("could not serialize EXIF: {0}")]
    Exif(#[from] exif::Error),
    #[error("{0} has no file name")]
    NoFileName(PathBuf),
}

/// Failure talking to a remote store.
#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("unexpected status {status}: {text}")]
    UnexpectedStatus { status: StatusCode, text: String },
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed response: {0}")]
    Malformed(String),
    #[error("no access token configured")]
    MissingToken,
}

/// A single item's upload failure. Carries the join key so the batch can keep going and
/// report the item in the final schedule.
#[derive(Debug, thiserror::Error)]
#[error("upload of {key} failed: {source}")]
pub struct UploadError {
    pub key: String,
    #[source]
    pub source: UploadFailure,
}

#[derive(Debug, thiserror::Error)]
pub enum UploadFailure {
    #[error(transparent)]
    Remote(#[from] RemoteError),
    #[error("could not move staged file: {0}")]
    Move(#[source] std::io::Error),
}
