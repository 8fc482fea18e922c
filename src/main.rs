//! seqpub CLI
//!
//! Entry point for the `seqpub` command-line tool.

use clap::{Parser, Subcommand};
use serde_json::{json, Map, Value};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use seqpub::checkpoint::{status_counts, CheckpointStore, PublishStatus};
use seqpub::logging::{init_logging, LogFormat, LoggingConfig};
use seqpub::{
    Category, EffectiveConfig, FileCatalog, FsStore, IdentityProvider, NoIdentity, PublishConfig,
    RunPublisher, SampleSheetProvider,
};

/// No errors were counted
const EXIT_OK: i32 = 0;
/// The run finished but counted errors
const EXIT_ERRORS: i32 = 1;
/// Configuration or setup failed before publishing
const EXIT_CONFIG: i32 = 2;

#[derive(Parser)]
#[command(name = "seqpub")]
#[command(about = "Publish sequencing run output to an archival store", version)]
struct Cli {
    /// Log level for seqpub crates (RUST_LOG overrides)
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Emit logs as JSON on stderr
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Publish a run directory
    Publish(PublishArgs),

    /// Classify a run directory without publishing
    Classify {
        /// Run output directory
        #[arg(long)]
        source_dir: PathBuf,

        /// TOML config file
        #[arg(long, short = 'c')]
        config: Option<PathBuf>,

        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Summarise a restart checkpoint
    Status {
        /// Checkpoint file
        #[arg(long)]
        restart_file: PathBuf,

        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },
}

#[derive(clap::Args)]
struct PublishArgs {
    /// TOML config file
    #[arg(long, short = 'c')]
    config: Option<PathBuf>,

    /// Run output directory
    #[arg(long)]
    source_dir: Option<PathBuf>,

    /// Run identifier
    #[arg(long)]
    id_run: Option<u64>,

    /// Base remote collection (default: /seq/<id_run>)
    #[arg(long)]
    collection: Option<String>,

    /// Alternative process name
    #[arg(long)]
    alt_process: Option<String>,

    /// Alignment format (cram or bam)
    #[arg(long)]
    file_format: Option<String>,

    /// Stop after this many errors have been exceeded
    #[arg(long)]
    max_errors: Option<usize>,

    /// Transfer content even when unchanged
    #[arg(long)]
    force: bool,

    /// Include spiked-control identity contributions
    #[arg(long)]
    with_spiked_control: bool,

    /// Checkpoint file (default: <source_dir>/published.json)
    #[arg(long)]
    restart_file: Option<PathBuf>,

    /// Root directory of the filesystem store
    #[arg(long)]
    store_root: Option<PathBuf>,

    /// Sample sheet JSON for identity tags
    #[arg(long)]
    sample_sheet: Option<PathBuf>,

    /// Output the summary as JSON
    #[arg(long)]
    json: bool,
}

impl PublishArgs {
    /// Flags given on the command line, as a config layer.
    fn overrides(&self) -> Value {
        let mut map = Map::new();
        let mut set = |key: &str, value: Value| {
            map.insert(key.to_string(), value);
        };

        if let Some(dir) = &self.source_dir {
            set("source_directory", json!(dir));
        }
        if let Some(id_run) = self.id_run {
            set("id_run", json!(id_run));
        }
        if let Some(collection) = &self.collection {
            set("dest_collection", json!(collection));
        }
        if let Some(alt) = &self.alt_process {
            set("alt_process", json!(alt));
        }
        if let Some(format) = &self.file_format {
            set("file_format", json!(format));
        }
        if let Some(max) = self.max_errors {
            set("max_errors", json!(max));
        }
        if self.force {
            set("force", json!(true));
        }
        if self.with_spiked_control {
            set("with_spiked_control", json!(true));
        }
        if let Some(restart) = &self.restart_file {
            set("restart_file", json!(restart));
        }
        if let Some(root) = &self.store_root {
            set("store", json!({ "root": root }));
        }
        if let Some(sheet) = &self.sample_sheet {
            set("identity", json!({ "sample_sheet": sheet }));
        }

        Value::Object(map)
    }
}

fn main() {
    let cli = Cli::parse();

    let logging = LoggingConfig {
        format: if cli.log_json {
            LogFormat::Json
        } else {
            LogFormat::Text
        },
        level: cli.log_level.clone(),
    };
    if let Err(e) = init_logging(&logging) {
        eprintln!("{}", e);
        process::exit(EXIT_CONFIG);
    }

    let code = match cli.command {
        Commands::Publish(args) => run_publish(&args),
        Commands::Classify {
            source_dir,
            config,
            json,
        } => run_classify(source_dir, config, json),
        Commands::Status { restart_file, json } => run_status(restart_file, json),
    };
    process::exit(code);
}

fn run_publish(args: &PublishArgs) -> i32 {
    let effective = match EffectiveConfig::build(args.config.as_deref(), Some(args.overrides())) {
        Ok(effective) => effective,
        Err(e) => {
            eprintln!("Error loading config: {}", e);
            return EXIT_CONFIG;
        }
    };

    let config: PublishConfig = match effective.publish_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return EXIT_CONFIG;
        }
    };

    let Some(root) = config.store.root.clone() else {
        eprintln!("Configuration error: no store root (use --store-root or store.root)");
        return EXIT_CONFIG;
    };
    let store = match FsStore::open(&root) {
        Ok(store) => store,
        Err(e) => {
            eprintln!("Error opening store {}: {}", root.display(), e);
            return EXIT_CONFIG;
        }
    };

    let identity: Arc<dyn IdentityProvider> = match &config.identity.sample_sheet {
        Some(path) => match SampleSheetProvider::load(path) {
            Ok(provider) => Arc::new(provider),
            Err(e) => {
                eprintln!("Error loading sample sheet: {}", e);
                return EXIT_CONFIG;
            }
        },
        None => Arc::new(NoIdentity),
    };

    let with_spiked_control = config.with_spiked_control;
    let mut publisher = match RunPublisher::new(config, Arc::new(store), identity) {
        Ok(publisher) => publisher,
        Err(e) => {
            eprintln!("Error preparing run: {}", e);
            return EXIT_CONFIG;
        }
    };

    publisher.publish_all(with_spiked_control);
    let summary = publisher.summary().with_effective_config(effective);

    if args.json {
        match summary.to_json() {
            Ok(json) => println!("{}", json),
            Err(e) => {
                eprintln!("Error serializing output: {}", e);
                return EXIT_ERRORS;
            }
        }
    } else {
        println!("{}", summary.human_summary);
        if let Some(effective) = &summary.effective_config {
            for source in &effective.sources {
                match (&source.path, &source.digest) {
                    (Some(path), Some(digest)) => {
                        println!("  config {:?} {} sha256:{}", source.origin, path, digest)
                    }
                    _ => println!("  config {:?}", source.origin),
                }
            }
        }
        println!();
        for report in &summary.categories {
            let scope = report.product.as_deref().unwrap_or("run");
            let outcome = match (&report.error, report.skipped) {
                (Some(e), true) => format!("skipped: {}", e),
                (None, true) => "skipped".to_string(),
                (Some(e), _) => format!("failed: {}", e),
                (None, false) => format!(
                    "{} considered, {} transferred, {} error(s)",
                    report.counts.considered, report.counts.published, report.counts.errors
                ),
            };
            println!("  {:<10} {:<20} {}", report.category, scope, outcome);
        }
    }

    match summary.exit_code() {
        0 => EXIT_OK,
        _ => EXIT_ERRORS,
    }
}

fn run_classify(source_dir: PathBuf, config_path: Option<PathBuf>, json_output: bool) -> i32 {
    let catalog_config = match EffectiveConfig::build(config_path.as_deref(), None)
        .and_then(|effective| effective.catalog_config())
    {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return EXIT_CONFIG;
        }
    };

    let files = match seqpub_catalog::discover_files(&source_dir) {
        Ok(files) => files,
        Err(e) => {
            eprintln!("Error reading {}: {}", source_dir.display(), e);
            return EXIT_CONFIG;
        }
    };
    let catalog = FileCatalog::new(catalog_config).classify(&files);

    if json_output {
        return match serde_json::to_string_pretty(&catalog) {
            Ok(json) => {
                println!("{}", json);
                EXIT_OK
            }
            Err(e) => {
                eprintln!("Error serializing output: {}", e);
                EXIT_ERRORS
            }
        };
    }

    println!("Products ({}):", catalog.compositions.len());
    for name in catalog.products() {
        println!("  {}", name);
    }
    println!();

    for category in Category::RUN_LEVEL.iter().chain(Category::PRODUCT_LEVEL.iter()) {
        let files = catalog.files(*category);
        if files.is_empty() {
            continue;
        }
        println!("{} ({}):", category, files.len());
        for file in files {
            match &file.product {
                Some(product) => println!("  {} [{}]", file.path.display(), product),
                None => println!("  {}", file.path.display()),
            }
        }
    }

    if !catalog.unassigned.is_empty() {
        println!("unassigned ({}):", catalog.unassigned.len());
        for path in &catalog.unassigned {
            println!("  {}", path.display());
        }
    }
    EXIT_OK
}

fn run_status(restart_file: PathBuf, json_output: bool) -> i32 {
    let records = match CheckpointStore::read(&restart_file) {
        Ok(records) => records,
        Err(e) => {
            eprintln!("Error reading checkpoint: {}", e);
            return EXIT_CONFIG;
        }
    };
    let counts = status_counts(&records);

    if json_output {
        let output = json!({
            "restart_file": restart_file,
            "records": records.len(),
            "by_status": counts,
            "failed": records
                .iter()
                .filter(|(_, r)| r.status == PublishStatus::Failed)
                .map(|(local, _)| local)
                .collect::<Vec<_>>(),
        });
        return match serde_json::to_string_pretty(&output) {
            Ok(json) => {
                println!("{}", json);
                EXIT_OK
            }
            Err(e) => {
                eprintln!("Error serializing output: {}", e);
                EXIT_ERRORS
            }
        };
    }

    println!("Checkpoint: {} ({} records)", restart_file.display(), records.len());
    for (status, count) in &counts {
        println!("  {:<10} {}", status, count);
    }
    for (local, record) in records.iter().filter(|(_, r)| r.status == PublishStatus::Failed) {
        println!("  failed: {} -> {}", local, record.remote_path);
    }
    EXIT_OK
}
