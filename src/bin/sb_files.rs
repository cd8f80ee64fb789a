use std::path::PathBuf;

use anyhow::{ensure, Context, Result};
use clap::{ArgGroup, Parser, Subcommand};
use glob::Pattern;
use sb_tools::{
    cas::CatalogResolver,
    commands::{
        bundles::list_bundles, cat::cat_entry, chunks::list_chunks, dump::dump_bundles,
        list::list_entries, toc::dump_tocs,
    },
    cursor::Endian,
    file_parsers::{
        binary_sb::types::{DecodeOptions, PayloadExtent},
        sbtoc::types::TocFormat,
    },
    keys::StaticKeyStore,
    superbundle_fs::{LoadOptions, SuperbundleFs, TocSource},
};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::{layer::SubscriberExt, EnvFilter};

#[derive(Debug, Subcommand)]
enum Command {
    /// Print the decoded TOC files as JSON
    Toc,
    /// List the bundles and where they're stored
    Bundles,
    /// List ebx, res and chunk entries
    List {
        /// Glob pattern to filter the list of entries
        #[clap(default_value = "*")]
        glob: Vec<Pattern>,
    },
    /// Write matched bundles to a folder as JSON
    Dump {
        /// Path to the folder to output the bundles to
        output_folder: PathBuf,
        /// Glob pattern to filter bundles by name
        #[clap(default_value = "*")]
        glob: Vec<Pattern>,
    },
    /// List every chunk known after applying all TOCs
    Chunks,
    /// Decompress a single entry to stdout
    Cat {
        /// Ebx or res name, or chunk GUID
        name: String,
    },
}

/// Inspect superbundle TOCs and the bundles they point to.
/// Listings are printed to stdout.
#[derive(Parser, Debug)]
#[command(
    name = "sb_files",
    group(
        ArgGroup::new("source")
        .args(&["toc", "superbundle"])
        .required(true)
        .multiple(false)
    )
)]
#[clap(version)]
struct Cli {
    /// Game install folder containing native_data and native_patch
    #[arg(long)]
    game_dir: PathBuf,

    /// Read a single TOC file
    #[arg(long)]
    toc: Option<PathBuf>,

    /// Superbundle name, read from native_data with native_patch applied on top
    #[arg(long)]
    superbundle: Option<String>,

    /// Catalog folder names, in index order
    #[arg(long = "catalog", value_delimiter = ',')]
    catalogs: Vec<String>,

    /// JSON file mapping key labels to hex keys
    #[arg(long)]
    key_file: Option<PathBuf>,

    /// Byte order of the bundles' entry tables
    #[arg(long, default_value = "little")]
    endian: Endian,

    /// Which sections the TOC carries: with-chunks or bundles-only
    #[arg(long, default_value = "with-chunks")]
    format: TocFormat,

    /// Hand everything after a bundle's header to the entry table decoder
    #[arg(long)]
    payload_to_end: bool,

    /// Bundle data blocks hold raw bytes rather than compression frames
    #[arg(long)]
    uncompressed: bool,

    /// Log debug output
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

/// Validates user input and constructs the loader options
fn parse_args(cli: &Cli) -> Result<LoadOptions> {
    ensure!(cli.game_dir.exists(), "Game folder doesn't exist");

    let source = match (&cli.toc, &cli.superbundle) {
        (Some(toc), _) => TocSource::Single(toc.clone()),
        (None, Some(name)) => TocSource::Overlay(name.clone()),
        (None, None) => unreachable!("Enforced by the source arg group"),
    };

    Ok(LoadOptions {
        game_dir: cli.game_dir.clone(),
        source,
        endian: cli.endian,
        format: cli.format,
        decode: DecodeOptions {
            uncompressed: cli.uncompressed,
            base_offset: 0,
            extent: if cli.payload_to_end {
                PayloadExtent::ToEnd
            } else {
                PayloadExtent::UntilDataOffset
            },
        },
    })
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    };
    tracing::subscriber::set_global_default(
        tracing_subscriber::registry()
            .with(tracing_subscriber::fmt::layer().compact().without_time())
            .with(
                EnvFilter::builder()
                    .with_default_directive(default_level.into())
                    .from_env_lossy(),
            ),
    )
    .context("Failed to set global tracing subscriber")?;

    let options = parse_args(&cli)?;

    let keys = match &cli.key_file {
        Some(path) => StaticKeyStore::load(path)?,
        None => StaticKeyStore::new(),
    };
    let resolver = CatalogResolver::new(&cli.game_dir, cli.catalogs.clone());
    let fs = SuperbundleFs::new(options, Box::new(keys), Box::new(resolver));

    if let Command::Toc = cli.command {
        return dump_tocs(&fs).context("Toc command failed");
    }

    let report = fs.load().context("Failed to load superbundle")?;

    match cli.command {
        Command::Toc => unreachable!("Handled above"),
        Command::Bundles => list_bundles(&report).context("Bundles command failed")?,
        Command::List { glob } => list_entries(&report, &glob).context("List command failed")?,
        Command::Dump {
            output_folder,
            glob,
        } => dump_bundles(&report, &glob, &output_folder).context("Dump command failed")?,
        Command::Chunks => list_chunks(&report).context("Chunks command failed")?,
        Command::Cat { name } => cat_entry(&fs, &report, &name).context("Cat command failed")?,
    }

    Ok(())
}
