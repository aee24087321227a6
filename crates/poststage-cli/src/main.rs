use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use poststage_core::schedule::{self, Platform};
use poststage_core::upload::{self, AwsCredentials, Credentials};
use poststage_core::{inputs, Backend, StageOptions};
use tracing_subscriber::EnvFilter;

const TOKEN_ENV: &str = "POSTSTAGE_TOKEN";

#[derive(Clone, Copy, ValueEnum)]
enum BackendKind {
    Drive,
    ObjectStore,
}

#[derive(Parser)]
#[command(name = "poststage", version, about = "Stage photos for scheduled posting - strip metadata, add attribution, upload, build a schedule")]
struct Cli {
    /// A directory of images, or an explicit list of image files
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// JSON options file; flags below override its values
    #[arg(long)]
    config: Option<PathBuf>,

    /// Upload backend
    #[arg(long, value_enum)]
    backend: Option<BackendKind>,

    /// Object-store bucket
    #[arg(long)]
    bucket: Option<String>,

    /// Object-store endpoint serving `{endpoint}/{key}`
    #[arg(long)]
    endpoint: Option<String>,

    /// Object-store signing region
    #[arg(long)]
    region: Option<String>,

    /// Canned ACL for object-store puts (e.g. public-read); none by default
    #[arg(long)]
    acl: Option<String>,

    /// Shared-drive folder to upload into
    #[arg(long)]
    drive_folder: Option<String>,

    /// File holding the Drive access token, or a bearer token for a custom object-store
    /// endpoint (default: $POSTSTAGE_TOKEN). S3 itself is signed with $AWS_ACCESS_KEY_ID and
    /// $AWS_SECRET_ACCESS_KEY.
    #[arg(long)]
    token_file: Option<PathBuf>,

    /// Creator written into every staged image
    #[arg(long)]
    creator: Option<String>,

    /// Copyright notice written into every staged image
    #[arg(long)]
    copyright: Option<String>,

    /// Hour of day for the default first post
    #[arg(long)]
    post_hour: Option<u32>,

    /// Platforms to enable in the schedule (repeatable)
    #[arg(long = "platform")]
    platforms: Vec<String>,

    /// Concurrent uploads
    #[arg(short, long)]
    jobs: Option<usize>,

    /// First post date and time (YYYY-MM-DD HH:MM:SS)
    #[arg(long)]
    start: Option<String>,

    /// Accept the start date without asking
    #[arg(short, long)]
    yes: bool,
}

fn build_options(cli: &Cli) -> anyhow::Result<StageOptions> {
    let mut options = match &cli.config {
        Some(path) => StageOptions::load(path)?,
        None => StageOptions::default(),
    };
    options.inputs = cli.inputs.clone();

    match cli.backend {
        Some(BackendKind::Drive) => {
            options.backend = Backend::Drive {
                folder: cli
                    .drive_folder
                    .clone()
                    .unwrap_or_else(|| poststage_core::config::DEFAULT_DRIVE_FOLDER.to_string()),
            };
        }
        Some(BackendKind::ObjectStore) => {
            options.backend = Backend::ObjectStore {
                bucket: cli
                    .bucket
                    .clone()
                    .unwrap_or_else(|| poststage_core::config::DEFAULT_BUCKET.to_string()),
                endpoint: cli.endpoint.clone(),
                region: cli
                    .region
                    .clone()
                    .unwrap_or_else(|| poststage_core::config::DEFAULT_REGION.to_string()),
                acl: cli.acl.clone(),
            };
        }
        None => match &mut options.backend {
            Backend::Drive { folder } => {
                if let Some(f) = &cli.drive_folder {
                    *folder = f.clone();
                }
            }
            Backend::ObjectStore {
                bucket,
                endpoint,
                region,
                acl,
            } => {
                if let Some(b) = &cli.bucket {
                    *bucket = b.clone();
                }
                if cli.endpoint.is_some() {
                    *endpoint = cli.endpoint.clone();
                }
                if let Some(r) = &cli.region {
                    *region = r.clone();
                }
                if cli.acl.is_some() {
                    *acl = cli.acl.clone();
                }
            }
        },
    }

    if let Some(creator) = &cli.creator {
        options.attribution.creator = creator.clone();
    }
    if let Some(copyright) = &cli.copyright {
        options.attribution.copyright = copyright.clone();
    }
    if let Some(hour) = cli.post_hour {
        options.post_hour = hour;
    }
    if let Some(jobs) = cli.jobs {
        options.upload_jobs = jobs;
    }
    if !cli.platforms.is_empty() {
        options.enabled_platforms = cli
            .platforms
            .iter()
            .map(|name| Platform::from_name(name).with_context(|| format!("unknown platform {}", name)))
            .collect::<anyhow::Result<_>>()?;
    }
    options.validate()?;
    Ok(options)
}

fn read_token(cli: &Cli) -> anyhow::Result<Option<String>> {
    if let Some(path) = &cli.token_file {
        let token = std::fs::read_to_string(path).with_context(|| format!("reading token {}", path.display()))?;
        return Ok(Some(token.trim().to_string()));
    }
    Ok(std::env::var(TOKEN_ENV).ok().filter(|t| !t.trim().is_empty()))
}

fn read_credentials(cli: &Cli) -> anyhow::Result<Credentials> {
    Ok(Credentials {
        token: read_token(cli)?,
        aws: AwsCredentials::from_env(),
    })
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let t_total = std::time::Instant::now();
    let options = build_options(&cli)?;

    eprintln!("Building file list...");
    let input_set = inputs::collect_inputs(&options.inputs)?;
    eprintln!("{} images to process.", input_set.images.len());
    eprintln!("WD: {}", input_set.workdir.display());
    if input_set.images.is_empty() {
        eprintln!("Nothing to do.");
        return Ok(());
    }

    let start = match &cli.start {
        Some(s) => schedule::parse_start(s).with_context(|| format!("cannot parse start date {:?}", s))?,
        None => {
            let proposed = schedule::default_start(chrono::Local::now().naive_local(), options.post_hour);
            if cli.yes {
                proposed
            } else {
                let stdin = std::io::stdin();
                schedule::confirm_start(proposed, &mut stdin.lock(), &mut std::io::stderr())?
            }
        }
    };

    let uploader = upload::connect(&options.backend, &read_credentials(&cli)?).context("connecting to remote store")?;

    let pb = ProgressBar::new(input_set.images.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{bar:40}] {pos}/{len} {prefix} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );
    let progress_bar = pb.clone();
    let result = poststage_core::process(&options, &input_set, start, uploader.as_ref(), &move |stage, current, total, message| {
        progress_bar.set_length(total);
        progress_bar.set_position(current + 1);
        progress_bar.set_prefix(stage.to_string());
        progress_bar.set_message(message.to_string());
    })?;
    pb.finish_and_clear();

    for warning in &result.warnings {
        eprintln!("warning: {}", warning);
    }
    for failure in &result.failures {
        eprintln!("failed: {}", failure);
    }
    if let Some(path) = &result.schedule_path {
        eprintln!("Schedule written to {}", path.display());
    }
    eprintln!(
        "Done! {} images staged, {} uploaded, {} failed ({:.2}s)",
        result.images,
        result.uploaded,
        result.failures.len(),
        t_total.elapsed().as_secs_f64()
    );

    Ok(())
}
