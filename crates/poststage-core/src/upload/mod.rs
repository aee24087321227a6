pub mod drive;
pub mod http;
pub mod object_store;
pub mod sigv4;

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use rayon::prelude::*;

use crate::config::Backend;
use crate::error::{RemoteError, UploadError, UploadFailure};
use crate::lifecycle;
use crate::record::UploadResult;
use crate::ThrottledProgress;

pub use drive::{DriveApi, DriveFile, DriveUploader};
pub use http::{HttpDrive, HttpObjectStore, ObjectStoreAuth};
pub use object_store::{ObjectStore, ObjectStoreUploader};
pub use sigv4::AwsCredentials;

/// A remote store that can take a staged file and hand back a public URL for it.
pub trait Uploader: Send + Sync {
    fn upload(&self, staged: &Path) -> Result<String, RemoteError>;
}

/// Secrets for the remote stores, gathered outside the options file.
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    /// OAuth access token for Drive, or a bearer token for a custom object-store endpoint
    pub token: Option<String>,
    pub aws: Option<AwsCredentials>,
}

impl Credentials {
    /// SigV4 when an access key pair is present, else the bearer token, else nothing.
    pub fn object_store_auth(&self) -> ObjectStoreAuth {
        match (&self.aws, &self.token) {
            (Some(aws), _) => ObjectStoreAuth::SigV4(aws.clone()),
            (None, Some(token)) => ObjectStoreAuth::Bearer(token.clone()),
            (None, None) => ObjectStoreAuth::Anonymous,
        }
    }
}

/// Build the uploader for the configured backend. Drive needs an access token.
pub fn connect(backend: &Backend, credentials: &Credentials) -> Result<Box<dyn Uploader>, RemoteError> {
    match backend {
        Backend::ObjectStore {
            bucket,
            endpoint,
            region,
            acl,
        } => {
            let store = HttpObjectStore::new(endpoint.clone(), region.clone(), acl.clone(), credentials.object_store_auth())?;
            let mut uploader = ObjectStoreUploader::new(store, bucket.clone());
            if let Some(endpoint) = endpoint {
                uploader = uploader.with_endpoint(endpoint.clone());
            }
            Ok(Box::new(uploader))
        }
        Backend::Drive { folder } => {
            let token = credentials.token.clone().ok_or(RemoteError::MissingToken)?;
            let uploader = DriveUploader::connect(HttpDrive::new(token)?, folder)?;
            tracing::info!(folder = %uploader.folder().name, id = %uploader.folder().id, "drive folder ready");
            Ok(Box::new(uploader))
        }
    }
}

/// One staged file waiting for upload.
#[derive(Debug, Clone)]
pub struct UploadJob {
    pub staged: PathBuf,
    pub key: String,
}

/// Upload one staged file and advance it to `uploaded`.
///
/// Failures come back as values so the caller can keep going with the rest of the batch.
pub fn dispatch(
    uploader: &dyn Uploader,
    staged: &Path,
    key: &str,
    uploaded_dir: &Path,
) -> Result<UploadResult, UploadError> {
    let fail = |source: UploadFailure| UploadError {
        key: key.to_string(),
        source,
    };

    let url = uploader.upload(staged).map_err(|e| fail(e.into()))?;

    let name = staged.file_name().unwrap_or_default();
    lifecycle::move_file(staged, &uploaded_dir.join(name)).map_err(|e| fail(UploadFailure::Move(e)))?;

    Ok(UploadResult {
        display_filename: key.to_string(),
        hosted_url: url,
    })
}

/// Upload every job, one result per job in job order.
///
/// `jobs <= 1` runs sequentially; otherwise uploads share a bounded rayon pool. Either way no
/// failure stops the remaining uploads.
pub fn dispatch_all(
    uploader: &dyn Uploader,
    batch: &[UploadJob],
    uploaded_dir: &Path,
    jobs: usize,
    progress: &ThrottledProgress,
) -> Vec<Result<UploadResult, UploadError>> {
    let total = batch.len() as u64;
    let counter = AtomicU64::new(0);
    let run_one = |job: &UploadJob| {
        let result = dispatch(uploader, &job.staged, &job.key, uploaded_dir);
        match &result {
            Ok(r) => tracing::debug!(key = %r.display_filename, url = %r.hosted_url, "uploaded"),
            Err(e) => tracing::warn!(key = %e.key, error = %e.source, "upload failed"),
        }
        let current = counter.fetch_add(1, Ordering::Relaxed);
        progress.report("upload", current, total, &job.key);
        result
    };

    if jobs <= 1 {
        return batch.iter().map(run_one).collect();
    }

    match rayon::ThreadPoolBuilder::new().num_threads(jobs).build() {
        Ok(pool) => pool.install(|| batch.par_iter().map(run_one).collect()),
        Err(e) => {
            tracing::warn!(error = %e, "could not start upload pool, uploading sequentially");
            batch.iter().map(run_one).collect()
        }
    }
}
