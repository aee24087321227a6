use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::RemoteError;

use super::Uploader;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriveFile {
    pub id: String,
    pub name: String,
}

/// The shared-drive operations the uploader needs. Authentication is the implementor's job.
pub trait DriveApi: Send + Sync {
    /// Files (or folders) with exactly this name, optionally restricted to one parent folder.
    fn find_by_name(&self, name: &str, parent: Option<&str>) -> Result<Vec<DriveFile>, RemoteError>;
    fn create_folder(&self, name: &str) -> Result<DriveFile, RemoteError>;
    fn upload_file(&self, name: &str, parent: &str, body: Vec<u8>, content_type: &str) -> Result<DriveFile, RemoteError>;
    /// Anyone with the link may read.
    fn grant_public_read(&self, file_id: &str) -> Result<(), RemoteError>;
    fn web_view_link(&self, file_id: &str) -> Result<String, RemoteError>;
}

/// Shared-drive upload into a named folder, returning the public share link.
pub struct DriveUploader<D> {
    api: D,
    folder: DriveFile,
}

impl<D: DriveApi> DriveUploader<D> {
    /// Find the named folder, creating it when there is none.
    pub fn connect(api: D, folder_name: &str) -> Result<Self, RemoteError> {
        let folder = find_or_create_folder(&api, folder_name)?;
        Ok(Self { api, folder })
    }

    pub fn folder(&self) -> &DriveFile {
        &self.folder
    }

    /// Upload unless a file with the same name is already in the folder, in which case that
    /// file is returned instead. This is a plain name lookup: two runs racing on the same
    /// folder can still both upload.
    pub fn upload_deduplicated(&self, staged: &Path) -> Result<DriveFile, RemoteError> {
        let name = staged
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| RemoteError::Malformed(format!("no display name for {}", staged.display())))?;

        if let Some(existing) = self.api.find_by_name(name, Some(&self.folder.id))?.into_iter().next() {
            tracing::info!(name, id = %existing.id, "already uploaded, reusing");
            return Ok(existing);
        }

        let body = fs::read(staged)?;
        let content_type = mime_guess::from_path(staged).first_or_octet_stream();
        self.api
            .upload_file(name, &self.folder.id, body, content_type.essence_str())
    }
}

fn find_or_create_folder<D: DriveApi>(api: &D, name: &str) -> Result<DriveFile, RemoteError> {
    match api.find_by_name(name, None)?.into_iter().next() {
        Some(folder) => {
            tracing::debug!(name, id = %folder.id, "using existing folder");
            Ok(folder)
        }
        None => api.create_folder(name),
    }
}

impl<D: DriveApi> Uploader for DriveUploader<D> {
    fn upload(&self, staged: &Path) -> Result<String, RemoteError> {
        let file = self.upload_deduplicated(staged)?;
        self.api.grant_public_read(&file.id)?;
        self.api.web_view_link(&file.id)
    }
}
