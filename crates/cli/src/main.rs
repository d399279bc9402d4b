mod commands;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use photolog_core::fields::FieldSchema;
use photolog_core::PhotoLog;
use tracing_subscriber::EnvFilter;

/// photolog: catalog, rename and relate photo observations
#[derive(Parser)]
#[command(name = "photolog", version, about)]
struct Cli {
    /// Path to the catalog database
    #[arg(long, default_value_t = default_catalog_path())]
    catalog: String,

    /// JSON field schema (defaults to the built-in sighting log fields)
    #[arg(long)]
    fields: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Configure the image folder the catalog tracks
    Root {
        #[command(subcommand)]
        action: RootAction,
    },
    /// Compare the image folder with the catalog
    Check,
    /// Catalog every image file that is not catalogued yet
    Load,
    /// Propose (or apply) capture-time based file names
    Rename {
        /// Rename the files instead of only listing proposals
        #[arg(long)]
        apply: bool,
    },
    /// List observations in chronological order
    Ls {
        /// Only observations of this image path
        path: Option<String>,
    },
    /// Show every field of one observation (id, path or path#group)
    Show { observation: String },
    /// Set an annotation field of an observation (empty value clears it)
    Set {
        observation: String,
        field: String,
        value: String,
    },
    /// Add another observation of an already catalogued image
    Group { path: String },
    /// Relate two observations to each other
    Relate { a: String, b: String },
    /// Remove the relation of an observation and its partner
    Unrelate { observation: String },
    /// Show catalog summary counts
    Status,
    /// Show the active field schema
    Fields {
        /// Print the schema as JSON
        #[arg(long)]
        json: bool,
    },
    /// Insert observations from a CSV table
    Import { path: PathBuf },
    /// Write all observations to a CSV table
    Export { path: PathBuf },
}

#[derive(Subcommand)]
enum RootAction {
    /// Set the image folder
    Set {
        /// Path to the image directory
        path: PathBuf,
    },
    /// Show the configured image folder
    Show,
}

fn default_catalog_path() -> String {
    dirs_path().to_string_lossy().to_string()
}

fn dirs_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    PathBuf::from(home).join(".photolog").join("catalog.db")
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("photolog=info,photolog_core=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let schema = match cli.fields {
        Some(ref path) => FieldSchema::load(path)
            .with_context(|| format!("loading field schema {}", path.display()))?,
        None => FieldSchema::default(),
    };
    let catalog_path = PathBuf::from(&cli.catalog);
    let mut log = PhotoLog::open(&catalog_path, schema)
        .with_context(|| format!("opening catalog {}", catalog_path.display()))?;
    tracing::debug!(catalog = %catalog_path.display(), fields = log.schema().fields.len(), "catalog opened");

    match cli.command {
        Commands::Root { action } => match action {
            RootAction::Set { path } => commands::root::set(&log, path)?,
            RootAction::Show => commands::root::show(&log)?,
        },
        Commands::Check => commands::sync::check(&log)?,
        Commands::Load => commands::sync::load(&mut log)?,
        Commands::Rename { apply } => commands::rename::run(&mut log, apply)?,
        Commands::Ls { path } => commands::ls::run(&log, path.as_deref())?,
        Commands::Show { observation } => commands::ls::show(&log, &observation)?,
        Commands::Set {
            observation,
            field,
            value,
        } => commands::edit::set(&mut log, &observation, &field, value)?,
        Commands::Group { path } => commands::edit::group(&mut log, &path)?,
        Commands::Relate { a, b } => commands::edit::relate(&mut log, &a, &b)?,
        Commands::Unrelate { observation } => commands::edit::unrelate(&mut log, &observation)?,
        Commands::Status => commands::status::run(&log)?,
        Commands::Fields { json } => commands::status::fields(&log, json)?,
        Commands::Import { path } => commands::table::import(&mut log, path)?,
        Commands::Export { path } => commands::table::export(&log, path)?,
    }

    Ok(())
}
