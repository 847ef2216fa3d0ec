use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use tracing::{info, warn};

use release_status::config::{self, StatusConfig};
use release_status::release::{JsonMetadata, MetadataLookup, Registry};
use release_status::report::{DocumentRenderer, parse_table, table_to_string};
use release_status::snapshot::SnapshotStore;
use release_status::snapshot::loader::import_snapshots;
use release_status::status::{Classifier, Matrix, MatrixBuilder, StatusSummary};

#[derive(Parser)]
#[command(name = "release-status")]
#[command(version, about = "Package version status across release channels and platforms")]
struct Cli {
    /// Write logs to this file instead of stderr
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Import a snapshot tree (<dir>/<channel>/<distro>_<arch>/Packages) into the store
    Import {
        #[command(flatten)]
        common: CommonArgs,

        /// Root of the snapshot tree
        #[arg(long)]
        snapshots: PathBuf,
    },
    /// Build the status matrix and write the table (and optionally the document)
    Report {
        #[command(flatten)]
        common: CommonArgs,

        /// Release manifest
        #[arg(long)]
        manifest: PathBuf,

        /// Output interchange table
        #[arg(long)]
        table: PathBuf,

        #[command(flatten)]
        document: DocumentArgs,
    },
    /// Render the document from a previously written table
    Render {
        #[command(flatten)]
        common: CommonArgs,

        /// Input interchange table
        #[arg(long)]
        table: PathBuf,

        #[command(flatten)]
        document: DocumentArgs,
    },
}

#[derive(Args)]
struct CommonArgs {
    /// Configuration file (JSON)
    #[arg(long)]
    config: PathBuf,

    /// Snapshot database, defaults to the data directory
    #[arg(long)]
    db: Option<PathBuf>,
}

#[derive(Args)]
struct DocumentArgs {
    /// Output HTML document
    #[arg(long)]
    html: Option<PathBuf>,

    /// Package status and maintainer metadata (JSON)
    #[arg(long)]
    metadata: Option<PathBuf>,

    /// Path prefix, relative to the page, of a copy of the `resources/` directory
    #[arg(long, default_value = "")]
    resources: String,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let _guard = release_status::logging::init(cli.log_file.as_deref(), cli.json_logs)?;

    match cli.command {
        Command::Import { common, snapshots } => {
            let config = load_config(&common.config)?;
            let store = open_store(common.db.as_deref())?;
            let imported = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()?
                .block_on(import_snapshots(
                    &store,
                    &snapshots,
                    &config.channels,
                    &config.platforms(),
                ))
                .with_context(|| format!("importing snapshots from {}", snapshots.display()))?;
            info!("Imported {} snapshots", imported);
            Ok(())
        }
        Command::Report {
            common,
            manifest,
            table,
            document,
        } => {
            let config = load_config(&common.config)?;
            // A partial registry never produces a report
            let registry = Registry::load(&manifest)
                .with_context(|| format!("loading manifest {}", manifest.display()))?;
            if let Some(release) = registry.release()
                && release != config.release
            {
                warn!(
                    "Manifest is for release {} but config is for {}",
                    release, config.release
                );
            }
            if registry.is_empty() {
                warn!("Manifest {} declares no packages", manifest.display());
            }
            let store = open_store(common.db.as_deref())?;
            let columns = store.available_columns(&config.channels, &config.platforms())?;
            if columns.is_empty() {
                anyhow::bail!(
                    "no snapshot in the store matches the configured channels and platforms, \
                     run `release-status import` first"
                );
            }
            info!("{} configured columns have a snapshot", columns.len());

            let matrix = MatrixBuilder::from_config(&config).build(&registry, &store);
            let classifier = Classifier::from_config(&config)?;
            let summary = StatusSummary::from_rows(&classifier.classify(&matrix));
            info!("Status summary: {:?}", summary);

            let text = table_to_string(&matrix);
            std::fs::write(&table, &text)
                .with_context(|| format!("writing table {}", table.display()))?;
            info!("Wrote table {:?}", table);

            // The document is always rendered from the persisted form
            let persisted = parse_table(&text, &config.channels)?;
            render_document(&config, &persisted, &document)
        }
        Command::Render {
            common,
            table,
            document,
        } => {
            let config = load_config(&common.config)?;
            let text = std::fs::read_to_string(&table)
                .with_context(|| format!("reading table {}", table.display()))?;
            let matrix = parse_table(&text, &config.channels)
                .with_context(|| format!("parsing table {}", table.display()))?;
            render_document(&config, &matrix, &document)
        }
    }
}

fn load_config(path: &Path) -> anyhow::Result<StatusConfig> {
    StatusConfig::load(path).with_context(|| format!("loading config {}", path.display()))
}

fn open_store(db: Option<&Path>) -> anyhow::Result<SnapshotStore> {
    let path = db.map(Path::to_path_buf).unwrap_or_else(config::db_path);
    if let Some(dir) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)?;
    }
    SnapshotStore::open(&path).with_context(|| format!("opening store {}", path.display()))
}

fn render_document(config: &StatusConfig, matrix: &Matrix, args: &DocumentArgs) -> anyhow::Result<()> {
    let Some(html_path) = &args.html else {
        return Ok(());
    };

    let metadata = args
        .metadata
        .as_deref()
        .map(JsonMetadata::load)
        .transpose()
        .context("loading metadata")?;

    let renderer = DocumentRenderer::new(config)?.with_resource_path(&args.resources);
    let html = renderer.render(
        matrix,
        chrono::Utc::now(),
        metadata.as_ref().map(|m| m as &dyn MetadataLookup),
    );

    std::fs::write(html_path, html)
        .with_context(|| format!("writing document {}", html_path.display()))?;
    info!("Wrote document {:?}", html_path);
    Ok(())
}
