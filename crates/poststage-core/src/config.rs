use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::attribution::Attribution;
use crate::schedule::{default_platforms, Platform};

pub const DEFAULT_BUCKET: &str = "phils-metricool-stage";
pub const DEFAULT_DRIVE_FOLDER: &str = "metricool_stage";
pub const DEFAULT_POST_HOUR: u32 = 19;
pub const DEFAULT_OUTPUT_PREFIX: &str = "metricool";
pub const DEFAULT_REGION: &str = "us-east-1";

fn default_region() -> String {
    DEFAULT_REGION.to_string()
}

/// Where staged files are uploaded. Chosen once per run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Backend {
    /// Direct object-store upload with a templated public URL
    ObjectStore {
        bucket: String,
        #[serde(default)]
        endpoint: Option<String>,
        /// Signing region; also picks the regional upload host
        #[serde(default = "default_region")]
        region: String,
        /// Canned ACL sent with each put, e.g. `public-read`. Buckets with object ownership
        /// enforced reject any ACL, so none is sent unless configured.
        #[serde(default)]
        acl: Option<String>,
    },
    /// Shared-drive upload into a named folder, shared by link
    Drive { folder: String },
}

impl Default for Backend {
    fn default() -> Self {
        Backend::Drive {
            folder: DEFAULT_DRIVE_FOLDER.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StageOptions {
    pub inputs: Vec<PathBuf>,
    pub backend: Backend,
    pub attribution: Attribution,
    pub post_hour: u32,
    pub enabled_platforms: Vec<Platform>,
    /// Concurrent uploads; 1 keeps the upload loop sequential
    pub upload_jobs: usize,
    pub output_prefix: String,
}

impl Default for StageOptions {
    fn default() -> Self {
        Self {
            inputs: Vec::new(),
            backend: Backend::default(),
            attribution: Attribution::default(),
            post_hour: DEFAULT_POST_HOUR,
            enabled_platforms: default_platforms(),
            upload_jobs: 1,
            output_prefix: DEFAULT_OUTPUT_PREFIX.to_string(),
        }
    }
}

impl StageOptions {
    /// Load options from a JSON file; missing keys take their defaults.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let file = std::fs::File::open(path).with_context(|| format!("opening config {}", path.display()))?;
        let options: Self = serde_json::from_reader(std::io::BufReader::new(file))
            .with_context(|| format!("parsing config {}", path.display()))?;
        options.validate()?;
        Ok(options)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.post_hour > 23 {
            anyhow::bail!("post hour must be 0-23, got {}", self.post_hour);
        }
        if self.upload_jobs == 0 {
            anyhow::bail!("upload jobs must be at least 1");
        }
        Ok(())
    }
}
