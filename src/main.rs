use clap::{Parser, Subcommand};
use media_derivatives::batch::{self, BatchOptions, JobDescription};
use media_derivatives::config::{self, DerivativesConfig};
use media_derivatives::executor;
use media_derivatives::imaging::RustBackend;
use media_derivatives::job::{GenerationJob, Generator, JobReport};
use media_derivatives::media::MediaCatalog;
use media_derivatives::options::{self, ProcessOptions};
use media_derivatives::output;
use media_derivatives::resolver::{Resolver, ResolverSettings};
use media_derivatives::scheduler::Scheduler;
use media_derivatives::storage::LocalStorage;
use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "media-derivatives")]
#[command(about = "Generate resized image derivatives on demand or in bulk")]
#[command(long_about = "\
Generate resized image derivatives on demand or in bulk

A derivative request path names an options token, a source image, and a
size index:

  /<token>/<path>_<index>.<ext>

  /_sa/images/hero_2.jpg            auto ladder, third width, source format
  /_se640xa-1280x720/banner_1.webp  explicit sizes, 1280x720, WebP copy
  /_pfill_q85_ss3/shots/wide_0.png  fill, quality 85, 3 steps of the source

Each generation writes the source format and a WebP copy. Existing files are
never regenerated.

Run 'media-derivatives gen-config' to generate a documented config file.")]
#[command(version)]
struct Cli {
    /// Config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Media root (overrides paths.input)
    #[arg(long, global = true)]
    input: Option<PathBuf>,

    /// Derivative output root (overrides paths.output)
    #[arg(long, global = true)]
    output: Option<PathBuf>,

    /// Media index JSON (overrides paths.index)
    #[arg(long, global = true)]
    index: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Resolve one derivative request path, generating it if needed
    Resolve {
        /// Request path, e.g. /_sa/images/hero_2.jpg
        path: String,
        /// HTTP method the request arrived with
        #[arg(long, default_value = "GET")]
        method: String,
        /// Print the resolution as JSON
        #[arg(long)]
        json: bool,
    },
    /// Generate every size of every media item in the index
    Batch {
        /// Options token (default: auto)
        #[arg(long)]
        token: Option<String>,
        /// Abort on the first failed derivative
        #[arg(long)]
        fail_on_error: bool,
        /// Maximum concurrent jobs (overrides processing.max_workers)
        #[arg(long)]
        workers: Option<usize>,
    },
    /// Generate every size of one media item and print a JSON report
    Generate {
        #[arg(long)]
        media_id: String,
        /// Options token
        #[arg(long, conflicts_with = "options")]
        token: Option<String>,
        /// Options as JSON, e.g. '{"quality":85}'
        #[arg(long)]
        options: Option<String>,
    },
    /// Run one job read from stdin (used by the subprocess strategy)
    #[command(hide = true)]
    RunJob,
    /// Encode JSON options into a path token
    Encode {
        #[arg(long)]
        options: String,
    },
    /// Decode a path token into JSON options
    Decode { token: String },
    /// Walk the media root and write the media index
    Scan,
    /// Print a stock config file with all options documented
    GenConfig,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(|| PathBuf::from(config::CONFIG_FILE_NAME));
    let mut cfg = config::load_config(&config_path)?;
    if let Some(input) = cli.input {
        cfg.paths.input = input;
    }
    if let Some(output) = cli.output {
        cfg.paths.output = output;
    }
    if let Some(index) = cli.index {
        cfg.paths.index = index;
    }

    match cli.command {
        Command::Resolve { path, method, json } => {
            let catalog = Arc::new(MediaCatalog::load(&cfg.paths.index)?);
            let resolver = build_resolver(&cfg, catalog, cfg.quality.on_demand)?;
            let resolution = resolver.resolve_request(&method, &path);
            if json {
                println!("{}", serde_json::to_string_pretty(&resolution)?);
            } else {
                output::print_resolution(&path, &resolution);
            }
        }
        Command::Batch {
            token,
            fail_on_error,
            workers,
        } => {
            if workers.is_some() {
                cfg.processing.max_workers = workers;
                cfg.validate()?;
            }
            let catalog = Arc::new(MediaCatalog::load(&cfg.paths.index)?);
            let resolver = build_resolver(&cfg, catalog.clone(), cfg.quality.batch)?;
            let opts = BatchOptions {
                options: token.as_deref().map(options::decode).unwrap_or_default(),
                fail_on_error: fail_on_error || cfg.batch.fail_on_error,
                default_quality: cfg.quality.batch,
            };

            let (tx, rx) = std::sync::mpsc::channel();
            let printer = std::thread::spawn(move || {
                for event in rx {
                    for line in output::format_batch_event(&event) {
                        println!("{}", line);
                    }
                }
            });
            let result = batch::run_batch(&resolver, catalog.items(), &opts, Some(tx));
            printer
                .join()
                .map_err(|_| "progress printer panicked")?;
            let report = result?;
            output::print_batch_summary(&report, &resolver.scheduler().stats());
        }
        Command::Generate {
            media_id,
            token,
            options,
        } => {
            let options = options
                .as_deref()
                .map(serde_json::from_str::<ProcessOptions>)
                .transpose()?;
            let description = JobDescription {
                media_id,
                input: cfg.paths.input.clone(),
                output: cfg.paths.output.clone(),
                options,
                token,
            };
            let catalog = Arc::new(MediaCatalog::load(&cfg.paths.index)?);
            let storage = Arc::new(LocalStorage::new());
            let generator = Generator::new(Arc::new(RustBackend::new()), storage.clone());
            let scheduler = Arc::new(Scheduler::new(executor::build_strategy(
                &cfg.processing,
                generator,
            )?));
            let report = batch::run_job_description(
                &description,
                catalog,
                storage,
                scheduler,
                &cfg.sizes.ladder,
                cfg.quality.batch,
            );
            println!("{}", serde_json::to_string_pretty(&report)?);
            if !report.ok {
                std::process::exit(1);
            }
        }
        Command::RunJob => {
            let mut input = String::new();
            std::io::stdin().read_to_string(&mut input)?;
            let job: GenerationJob = serde_json::from_str(&input)?;
            let generator = Generator::new(
                Arc::new(RustBackend::new()),
                Arc::new(LocalStorage::new()),
            );
            let result = generator.run(&job);
            println!("{}", serde_json::to_string(&JobReport::from(&result))?);
        }
        Command::Encode { options } => {
            let options: ProcessOptions = serde_json::from_str(&options)?;
            options.validate()?;
            println!("{}", options.encode());
        }
        Command::Decode { token } => {
            let options = options::decode(&token);
            println!("{}", serde_json::to_string_pretty(&options)?);
        }
        Command::Scan => {
            let catalog = MediaCatalog::scan(&cfg.paths.input)?;
            if let Some(parent) = cfg.paths.index.parent()
                && !parent.as_os_str().is_empty()
            {
                std::fs::create_dir_all(parent)?;
            }
            catalog.save(&cfg.paths.index)?;
            output::print_scan_output(catalog.items());
            println!("Index: {}", cfg.paths.index.display());
        }
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
        }
    }

    Ok(())
}

/// Wire the media index, local storage and the configured execution strategy
/// into a resolver.
fn build_resolver(
    cfg: &DerivativesConfig,
    catalog: Arc<MediaCatalog>,
    default_quality: u32,
) -> Result<Resolver, Box<dyn std::error::Error>> {
    let storage = Arc::new(LocalStorage::new());
    let generator = Generator::new(Arc::new(RustBackend::new()), storage.clone());
    let strategy = executor::build_strategy(&cfg.processing, generator)?;
    tracing::debug!(
        strategy = strategy.name(),
        workers = strategy.workers(),
        "execution strategy ready"
    );

    let mut settings = ResolverSettings::new(&cfg.paths.input, &cfg.paths.output);
    settings.ladder = cfg.sizes.ladder.clone();
    settings.default_quality = default_quality;
    Ok(Resolver::new(
        catalog,
        storage,
        Arc::new(Scheduler::new(strategy)),
        settings,
    ))
}
