use clap::{Parser, Subcommand};
use rayon::prelude::*;
use serde::Deserialize;
use simple_thumbs::cache::{DiskStore, MemoryStore, SourceIdentity, TieredStore};
use simple_thumbs::config::{self, ThumbsConfig};
use simple_thumbs::imaging::{Mode, OutputFormat, Quality, RustBackend, TransformRequest};
use simple_thumbs::output::{self, JobStatus};
use simple_thumbs::pipeline::{Pipeline, Rendered};
use std::path::{Path, PathBuf};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Pipeline as the CLI runs it: pure-Rust backend, optional tiered cache.
type CliPipeline = Pipeline<RustBackend, Option<TieredStore>>;

#[derive(Parser)]
#[command(name = "simple-thumbs")]
#[command(about = "Resize, crop, pad and re-encode images with a result cache")]
#[command(long_about = "\
Resize, crop, pad and re-encode images with a result cache

Sizes: a width or height of 0 is derived from the source aspect ratio;
both 0 keeps the source size.

Modes:
  crop     fill the box exactly, trimming the overflowing axis (centered)
  pad      fit inside the box, then center on a canvas of exactly that size
  max      fit inside the box, no canvas
  default  stretch to exactly the requested size

Results are cached by source path + modification time + the resolved
request, so a repeated request is served without decoding. Touching the
source invalidates its entries.

Run 'simple-thumbs gen-config' to generate a documented config.toml.")]
#[command(version)]
struct Cli {
    /// Config file (default: ./config.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log debug output (cache hits, resolved geometry)
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

/// Shared flags for commands that serve images.
#[derive(clap::Args, Clone)]
struct CacheArgs {
    /// Disable the result cache, force re-encoding
    #[arg(long)]
    no_cache: bool,
}

/// Transform parameters. Unset values come from `[output]` in the config.
#[derive(clap::Args, Clone)]
struct RequestArgs {
    /// Target width in pixels (0 = derive from height)
    #[arg(long, default_value_t = 0)]
    width: u32,

    /// Target height in pixels (0 = derive from width)
    #[arg(long, default_value_t = 0)]
    height: u32,

    /// crop, pad, max or default
    #[arg(long, default_value = "default")]
    mode: Mode,

    /// jpeg or png
    #[arg(long)]
    format: Option<OutputFormat>,

    /// JPEG quality (1-100)
    #[arg(long)]
    quality: Option<u32>,

    /// Ignore the EXIF orientation tag
    #[arg(long)]
    no_autorotate: bool,
}

impl RequestArgs {
    fn to_request(&self, config: &ThumbsConfig) -> TransformRequest {
        let defaults = config.default_request();
        TransformRequest {
            width: self.width,
            height: self.height,
            mode: self.mode,
            format: self.format.unwrap_or(defaults.format),
            quality: self.quality.map(Quality::new).unwrap_or(defaults.quality),
            autorotate: defaults.autorotate && !self.no_autorotate,
        }
    }
}

#[derive(Subcommand)]
enum Command {
    /// Transform one image
    Transform {
        /// Source image
        source: PathBuf,
        /// Where to write the result
        #[arg(long, short)]
        output: PathBuf,
        #[command(flatten)]
        request: RequestArgs,
        #[command(flatten)]
        cache: CacheArgs,
    },
    /// Print the cache key for a source + request (reads the header only)
    Key {
        /// Source image
        source: PathBuf,
        #[command(flatten)]
        request: RequestArgs,
    },
    /// Run a JSON list of jobs in parallel against one shared cache
    #[command(long_about = "\
Run a JSON list of jobs in parallel against one shared cache

The file holds an array of jobs. Relative paths are resolved against the
directory containing the jobs file. Only `source` and `output` are required:

  [
    {\"source\": \"photos/cat.jpg\", \"output\": \"thumbs/cat.jpg\", \"width\": 400, \"mode\": \"crop\"},
    {\"source\": \"photos/dog.png\", \"output\": \"thumbs/dog.png\", \"width\": 300, \"height\": 300,
     \"mode\": \"pad\", \"format\": \"png\", \"autorotate\": false}
  ]")]
    Batch {
        /// Jobs file
        jobs: PathBuf,
        #[command(flatten)]
        cache: CacheArgs,
    },
    /// Print a stock config.toml with all options documented
    GenConfig,
}

/// One entry of a batch jobs file.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct Job {
    source: PathBuf,
    output: PathBuf,
    #[serde(default)]
    width: u32,
    #[serde(default)]
    height: u32,
    #[serde(default)]
    mode: Mode,
    format: Option<OutputFormat>,
    quality: Option<u32>,
    autorotate: Option<bool>,
}

impl Job {
    fn to_request(&self, defaults: &TransformRequest) -> TransformRequest {
        TransformRequest {
            width: self.width,
            height: self.height,
            mode: self.mode,
            format: self.format.unwrap_or(defaults.format),
            quality: self.quality.map(Quality::new).unwrap_or(defaults.quality),
            autorotate: self.autorotate.unwrap_or(defaults.autorotate),
        }
    }

    fn resolve_paths(mut self, base: &Path) -> Self {
        self.source = base.join(&self.source);
        self.output = base.join(&self.output);
        self
    }
}

fn main() -> Result<(), BoxError> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let load_config =
        || config::load_config(resolve_config_path(cli.config.as_deref()).as_deref());

    match cli.command {
        Command::Transform {
            source,
            output: dest,
            request,
            cache,
        } => {
            let config = load_config()?;
            let request = request.to_request(&config);
            let pipeline = build_pipeline(&config, cache.no_cache);
            let rendered = serve_to_file(&pipeline, &source, &dest, &request)?;
            output::print_transform_output(&source, &dest, &request, &job_status(&rendered));
        }
        Command::Key { source, request } => {
            let config = load_config()?;
            let identity = SourceIdentity::from_path(&source)?;
            let bytes = std::fs::read(&identity.path)?;
            let pipeline = build_pipeline(&config, true);
            let key = pipeline.cache_key(&identity, &bytes, &request.to_request(&config))?;
            println!("{key}");
        }
        Command::Batch { jobs, cache } => {
            let config = load_config()?;
            let content = std::fs::read_to_string(&jobs)?;
            let base = jobs.parent().unwrap_or(Path::new("")).to_path_buf();
            let parsed: Vec<Job> = serde_json::from_str(&content)?;
            let parsed: Vec<Job> = parsed.into_iter().map(|job| job.resolve_paths(&base)).collect();

            init_thread_pool(&config.processing);
            let pipeline = build_pipeline(&config, cache.no_cache);
            let defaults = config.default_request();

            let results: Vec<(TransformRequest, Result<Rendered, BoxError>)> = parsed
                .par_iter()
                .map(|job| {
                    let request = job.to_request(&defaults);
                    let result = serve_to_file(&pipeline, &job.source, &job.output, &request);
                    (request, result)
                })
                .collect();

            let mut failed = 0;
            for (index, (job, (request, result))) in parsed.iter().zip(&results).enumerate() {
                let status = match result {
                    Ok(rendered) => job_status(rendered),
                    Err(e) => {
                        failed += 1;
                        JobStatus::Failed(e.to_string())
                    }
                };
                output::print_job(index + 1, &job.source, &job.output, Some(request), &status);
            }
            output::print_batch_summary(parsed.len(), pipeline.stats(), failed);

            if failed > 0 {
                return Err(format!("{failed} of {} jobs failed", parsed.len()).into());
            }
        }
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
        }
    }

    Ok(())
}

/// Serve one request and write the result to `output`.
fn serve_to_file(
    pipeline: &CliPipeline,
    source: &Path,
    output: &Path,
    request: &TransformRequest,
) -> Result<Rendered, BoxError> {
    let identity = SourceIdentity::from_path(source)?;
    let rendered = pipeline.serve(&identity, request, || std::fs::read(&identity.path))?;
    if let Some(parent) = output.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(output, &rendered.bytes)?;
    Ok(rendered)
}

fn job_status(rendered: &Rendered) -> JobStatus {
    let size = rendered.bytes.len();
    if rendered.cached {
        JobStatus::Cached { size }
    } else {
        JobStatus::Encoded { size }
    }
}

/// Explicit `--config`, else `./config.toml` when it exists, else defaults.
fn resolve_config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    match explicit {
        Some(path) => Some(path.to_path_buf()),
        None => {
            let local = PathBuf::from("config.toml");
            local.is_file().then_some(local)
        }
    }
}

fn build_pipeline(config: &ThumbsConfig, no_cache: bool) -> CliPipeline {
    let cache = &config.cache;
    let store = (cache.enabled && !no_cache).then(|| {
        let memory =
            (cache.memory_entries > 0).then(|| MemoryStore::with_capacity(cache.memory_entries));
        TieredStore::new(memory, DiskStore::new(&cache.dir))
    });
    Pipeline::new(RustBackend::new(), store).with_limits(config.limits())
}

/// Initialize logging. `RUST_LOG` wins unless `--verbose` forces debug.
fn init_tracing(verbose: bool) {
    use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

/// Initialize the rayon thread pool based on processing config.
///
/// Caps at the number of available CPU cores; the config can constrain down, not up.
fn init_thread_pool(processing: &config::ProcessingConfig) {
    let threads = config::effective_threads(processing);
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()
        .ok();
}
