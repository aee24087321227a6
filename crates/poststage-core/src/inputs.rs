use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};

/// Images selected for one batch, and the directory the batch tree and schedule go into.
#[derive(Debug, Clone)]
pub struct InputSet {
    pub workdir: PathBuf,
    pub images: Vec<PathBuf>,
    /// Non-image files that were passed over
    pub skipped: Vec<PathBuf>,
}

/// Resolve command-line inputs.
///
/// A single directory yields its regular files in lexicographic order and becomes the
/// working directory. Anything else is an explicit file list, kept in the given order,
/// with the first file's parent as the working directory.
pub fn collect_inputs(inputs: &[PathBuf]) -> anyhow::Result<InputSet> {
    let Some(first) = inputs.first() else {
        bail!("no input given");
    };

    let (workdir, candidates) = if inputs.len() == 1 && first.is_dir() {
        let mut files: Vec<PathBuf> = fs::read_dir(first)
            .with_context(|| format!("reading {}", first.display()))?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.is_file())
            .collect();
        files.sort();
        (first.clone(), files)
    } else {
        for path in inputs {
            if !path.is_file() {
                bail!("{} is not a file", path.display());
            }
        }
        let workdir = match first.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        (workdir, inputs.to_vec())
    };

    let (images, skipped): (Vec<PathBuf>, Vec<PathBuf>) =
        candidates.into_iter().partition(|p| is_image_file(p));

    let mut seen = HashSet::new();
    for path in &images {
        let name = join_key(path)?;
        if !seen.insert(name.to_string()) {
            bail!("more than one input is named {}", name);
        }
    }

    Ok(InputSet {
        workdir,
        images,
        skipped,
    })
}

/// Base filename of an input; the join key between image records and upload results.
pub fn join_key(path: &Path) -> anyhow::Result<&str> {
    path.file_name()
        .and_then(|n| n.to_str())
        .with_context(|| format!("{} has no usable file name", path.display()))
}

pub fn is_image_file(path: &Path) -> bool {
    mime_guess::from_path(path)
        .first()
        .map_or(false, |mime| mime.type_() == mime_guess::mime::IMAGE)
}
