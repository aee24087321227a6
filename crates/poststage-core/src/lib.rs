pub mod attribution;
pub mod caption;
pub mod config;
pub mod error;
pub mod inputs;
pub mod lifecycle;
pub mod record;
pub mod schedule;
pub mod upload;

#[cfg(test)]
mod testutil;

use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::Context;
use chrono::NaiveDateTime;

pub use attribution::Attribution;
pub use config::{Backend, StageOptions};
pub use error::{MetadataError, RemoteError, RewriteError, UploadError};
pub use inputs::InputSet;
pub use lifecycle::BatchDirectories;
pub use record::{ImageRecord, SourceImage, UploadResult};
pub use upload::Uploader;

/// Outcome of one batch run.
#[derive(Debug)]
pub struct RunResult {
    pub images: u64,
    pub uploaded: u64,
    /// Per-item upload failures; those rows carry an empty URL
    pub failures: Vec<UploadError>,
    pub batch: Option<BatchDirectories>,
    pub schedule_path: Option<PathBuf>,
    pub warnings: Vec<String>,
}

/// Type alias for progress callback
pub type ProgressCallback = dyn Fn(&str, u64, u64, &str) + Send + Sync;

/// Throttled progress reporter: emits at most every 200ms, plus the final step.
pub struct ThrottledProgress<'a> {
    inner: &'a ProgressCallback,
    last_emit: std::sync::Mutex<Instant>,
}

impl<'a> ThrottledProgress<'a> {
    pub fn new(inner: &'a ProgressCallback) -> Self {
        Self {
            inner,
            last_emit: std::sync::Mutex::new(Instant::now() - std::time::Duration::from_secs(1)),
        }
    }

    pub fn report(&self, stage: &str, current: u64, total: u64, message: &str) {
        let is_done = current + 1 >= total;
        if !is_done {
            let Ok(mut last) = self.last_emit.lock() else {
                return;
            };
            if last.elapsed().as_millis() < 200 {
                return;
            }
            *last = Instant::now();
        }
        (self.inner)(stage, current, total, message);
    }
}

/// Read the caption, write the attribution copy and retire the source for one image.
pub fn stage_image(path: &Path, attribution: &Attribution, batch: &BatchDirectories) -> anyhow::Result<ImageRecord> {
    let key = inputs::join_key(path)?.to_string();
    let image = SourceImage::open(path)?;
    let caption = caption::read_caption(&image)?;
    let staged = attribution::rewrite(&image, attribution, &batch.originals, &batch.to_upload)?;
    Ok(ImageRecord::new(path.to_path_buf(), key, caption, staged))
}

/// Run a whole batch over an already collected input set: stage every image, upload the
/// staged copies, write the schedule.
///
/// Any failure while staging an image aborts the run before a schedule is written. Upload
/// failures do not; the affected rows get an empty URL.
pub fn process(
    options: &StageOptions,
    input_set: &InputSet,
    start: NaiveDateTime,
    uploader: &dyn Uploader,
    progress_callback: &ProgressCallback,
) -> anyhow::Result<RunResult> {
    let tp = ThrottledProgress::new(progress_callback);

    let warnings: Vec<String> = input_set
        .skipped
        .iter()
        .map(|p| format!("skipped non-image file {}", p.display()))
        .collect();

    if input_set.images.is_empty() {
        return Ok(RunResult {
            images: 0,
            uploaded: 0,
            failures: Vec::new(),
            batch: None,
            schedule_path: None,
            warnings,
        });
    }

    let batch = BatchDirectories::create(&input_set.workdir, chrono::Local::now().naive_local())
        .with_context(|| format!("creating batch directories in {}", input_set.workdir.display()))?;
    tracing::info!(batch = %batch.root.display(), images = input_set.images.len(), "batch created");

    // Stage 1: per-image pipeline, strictly one image at a time
    let total = input_set.images.len() as u64;
    let mut records = Vec::with_capacity(input_set.images.len());
    for (i, path) in input_set.images.iter().enumerate() {
        let record = stage_image(path, &options.attribution, &batch)
            .with_context(|| format!("processing {}", path.display()))?;
        tp.report("stage", i as u64, total, &record.key);
        records.push(record);
    }

    // Stage 2: uploads
    let jobs: Vec<upload::UploadJob> = records
        .iter()
        .map(|r| upload::UploadJob {
            staged: r.staged_upload_path.clone(),
            key: r.key.clone(),
        })
        .collect();
    let mut uploads = Vec::with_capacity(jobs.len());
    let mut failures = Vec::new();
    for result in upload::dispatch_all(uploader, &jobs, &batch.uploaded, options.upload_jobs, &tp) {
        match result {
            Ok(u) => uploads.push(u),
            Err(e) => failures.push(e),
        }
    }

    // Stage 3: join and write the schedule
    schedule::join_uploads(&mut records, &uploads);
    let rows = schedule::build_schedule(&records, start, &options.enabled_platforms);
    let schedule_path = schedule::csv::write_schedule(
        &input_set.workdir,
        &options.output_prefix,
        chrono::Local::now().naive_local(),
        &rows,
    )
    .context("writing schedule")?;

    Ok(RunResult {
        images: records.len() as u64,
        uploaded: uploads.len() as u64,
        failures,
        batch: Some(batch),
        schedule_path: Some(schedule_path),
        warnings,
    })
}
