use std::fs;
use std::path::Path;

use crate::error::RemoteError;

use super::Uploader;

/// Minimal object-store surface: put bytes under a key in a bucket.
pub trait ObjectStore: Send + Sync {
    fn put_object(&self, bucket: &str, key: &str, body: Vec<u8>, content_type: &str) -> Result<(), RemoteError>;
}

/// Direct object-store upload. The public URL is a fixed template over bucket and key, so
/// nothing has to be read back after the put.
pub struct ObjectStoreUploader<S> {
    store: S,
    bucket: String,
    endpoint: Option<String>,
}

impl<S: ObjectStore> ObjectStoreUploader<S> {
    pub fn new(store: S, bucket: impl Into<String>) -> Self {
        Self {
            store,
            bucket: bucket.into(),
            endpoint: None,
        }
    }

    /// Serve objects from `{endpoint}/{key}` instead of the default bucket host.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    pub fn public_url(&self, key: &str) -> String {
        public_url(&self.bucket, self.endpoint.as_deref(), key)
    }
}

pub fn public_url(bucket: &str, endpoint: Option<&str>, key: &str) -> String {
    match endpoint {
        Some(endpoint) => format!("{}/{}", endpoint.trim_end_matches('/'), key),
        None => format!("https://{}.s3.amazonaws.com/{}", bucket, key),
    }
}

impl<S: ObjectStore> Uploader for ObjectStoreUploader<S> {
    fn upload(&self, staged: &Path) -> Result<String, RemoteError> {
        let key = staged
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| RemoteError::Malformed(format!("no object key for {}", staged.display())))?;
        let body = fs::read(staged)?;
        let content_type = mime_guess::from_path(staged).first_or_octet_stream();
        self.store.put_object(&self.bucket, key, body, content_type.essence_str())?;
        Ok(self.public_url(key))
    }
}
