use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

pub const ORIGINALS_DIR: &str = "orig";
pub const TO_UPLOAD_DIR: &str = "to_upload";
pub const UPLOADED_DIR: &str = "uploaded";

/// Create `parent/name` (and any missing parents) if absent, returning the path.
/// Calling it again with the same arguments is a no-op.
pub fn ensure_dir(parent: &Path, name: &str) -> io::Result<PathBuf> {
    let path = parent.join(name);
    fs::create_dir_all(&path)?;
    Ok(path)
}

/// The staging lifecycle of one batch: `<workdir>/batch_<timestamp>/{orig,to_upload,uploaded}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchDirectories {
    pub root: PathBuf,
    pub originals: PathBuf,
    pub to_upload: PathBuf,
    pub uploaded: PathBuf,
}

impl BatchDirectories {
    /// Create the whole tree up front; every directory exists before any image is touched.
    pub fn create(workdir: &Path, started: NaiveDateTime) -> io::Result<Self> {
        let root = ensure_dir(workdir, &batch_dir_name(started))?;
        Ok(Self {
            originals: ensure_dir(&root, ORIGINALS_DIR)?,
            to_upload: ensure_dir(&root, TO_UPLOAD_DIR)?,
            uploaded: ensure_dir(&root, UPLOADED_DIR)?,
            root,
        })
    }
}

pub fn batch_dir_name(started: NaiveDateTime) -> String {
    format!("batch_{}", started.format("%Y-%m-%d-%H-%M-%S"))
}

/// Sortable, sub-second name for a staged copy. `attempt` > 0 adds a counter for the
/// rare case of two copies landing in the same microsecond.
pub fn staged_file_name(now: NaiveDateTime, attempt: u32) -> String {
    let stamp = now.format("%Y-%m-%d-%H-%M-%S-%6f");
    if attempt == 0 {
        format!("{}.jpg", stamp)
    } else {
        format!("{}-{}.jpg", stamp, attempt)
    }
}

/// Move a file between lifecycle stages. Falls back to copy + remove when a plain rename
/// is refused (e.g. the stages live on different devices).
pub fn move_file(from: &Path, to: &Path) -> io::Result<()> {
    match fs::rename(from, to) {
        Ok(()) => Ok(()),
        Err(rename_err) => {
            if !from.is_file() {
                return Err(rename_err);
            }
            fs::copy(from, to)?;
            fs::remove_file(from)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use tempfile::tempdir;

    fn at(h: u32, m: u32, s: u32, micro: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 9)
            .unwrap()
            .and_hms_micro_opt(h, m, s, micro)
            .unwrap()
    }

    #[test]
    fn test_ensure_dir_idempotent() {
        let dir = tempdir().unwrap();
        let first = ensure_dir(dir.path(), "a/b").unwrap();
        let second = ensure_dir(dir.path(), "a/b").unwrap();
        assert_eq!(first, second);
        assert!(first.is_dir());
    }

    #[test]
    fn test_batch_tree() {
        let dir = tempdir().unwrap();
        let batch = BatchDirectories::create(dir.path(), at(8, 5, 3, 0)).unwrap();
        assert_eq!(batch.root, dir.path().join("batch_2024-03-09-08-05-03"));
        assert_eq!(batch.originals, batch.root.join("orig"));
        assert_eq!(batch.to_upload, batch.root.join("to_upload"));
        assert_eq!(batch.uploaded, batch.root.join("uploaded"));
        assert!(batch.originals.is_dir() && batch.to_upload.is_dir() && batch.uploaded.is_dir());
    }

    #[test]
    fn test_staged_names_sort() {
        let a = staged_file_name(at(9, 0, 0, 999), 0);
        let b = staged_file_name(at(9, 0, 0, 1000), 0);
        let c = staged_file_name(at(10, 0, 0, 0), 0);
        assert_eq!(a, "2024-03-09-09-00-00-000999.jpg");
        assert!(a < b && b < c);
        assert_eq!(staged_file_name(at(9, 0, 0, 1), 2), "2024-03-09-09-00-00-000001-2.jpg");
    }

    #[test]
    fn test_move_file() {
        let dir = tempdir().unwrap();
        let from = dir.path().join("x.jpg");
        fs::write(&from, b"data").unwrap();
        let to = ensure_dir(dir.path(), "orig").unwrap().join("x.jpg");
        move_file(&from, &to).unwrap();
        assert!(!from.exists());
        assert_eq!(fs::read(&to).unwrap(), b"data");
    }

    #[test]
    fn test_move_missing_source() {
        let dir = tempdir().unwrap();
        let err = move_file(&dir.path().join("nope"), &dir.path().join("dest"));
        assert!(err.is_err());
    }
}
