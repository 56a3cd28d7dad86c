use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{info, level_filters::LevelFilter};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use melodeon::library_store::LibraryStore;
use melodeon::maintenance::{reset_library, run_sweep, ResetScope};
use melodeon::scan::{ScanManifest, ScanOptions, Scanner};

#[derive(Parser, Debug)]
#[command(name = "melodeon", about = "Media library metadata consistency engine")]
struct CliArgs {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Import externally extracted metadata into the library.
    Scan {
        /// Path to the SQLite library database file.
        db: PathBuf,

        /// Path to the JSON metadata manifest produced by the extraction step.
        #[arg(long)]
        metadata: PathBuf,

        /// Restrict the scan to files under this folder.
        #[arg(long)]
        folder: Option<String>,

        /// Delete tracks whose files are gone, then sweep orphans.
        #[arg(long)]
        clean_obsolete: bool,

        /// Re-process every known audio file, not just unscanned/dirty ones.
        #[arg(long)]
        rescan: bool,

        /// Process only unscanned files, leaving dirty ones alone.
        #[arg(long)]
        skip_dirty: bool,

        /// Skip cover art resolution.
        #[arg(long)]
        skip_art: bool,
    },

    /// Remove orphaned rows and stale cover references, printing the
    /// per-category removal counts as JSON.
    Cleanup {
        /// Path to the SQLite library database file.
        db: PathBuf,
    },

    /// Wipe all library data for the given users, or for everyone.
    ResetDatabase {
        /// Path to the SQLite library database file.
        db: PathBuf,

        /// User ids to reset.
        users: Vec<String>,

        /// Reset every user's data.
        #[arg(long)]
        all: bool,

        /// Reset all members of a host user group.
        #[arg(long)]
        group: Option<String>,
    },
}

fn main() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()
        .unwrap();

    if let Err(err) = run(CliArgs::parse()) {
        eprintln!("Error: {err:#}");
        std::process::exit(1);
    }
}

fn run(args: CliArgs) -> Result<()> {
    match args.command {
        Command::Scan {
            db,
            metadata,
            folder,
            clean_obsolete,
            rescan,
            skip_dirty,
            skip_art,
        } => {
            if rescan && skip_dirty {
                bail!("--rescan and --skip-dirty are mutually exclusive");
            }

            let raw = std::fs::read_to_string(&metadata)
                .with_context(|| format!("Failed to read metadata manifest {:?}", metadata))?;
            let manifest: ScanManifest = serde_json::from_str(&raw)
                .with_context(|| format!("Failed to parse metadata manifest {:?}", metadata))?;

            let store = LibraryStore::new(&db)?;
            let options = ScanOptions {
                rescan,
                skip_dirty,
                clean_obsolete,
                skip_art,
                folder,
            };
            let report = Scanner::new(&store).run(&manifest, &options)?;
            println!("{}", serde_json::to_string(&report)?);
        }

        Command::Cleanup { db } => {
            let store = LibraryStore::new(&db)?;
            info!("Running maintenance sweep...");
            let report = run_sweep(&store)?;
            println!("{}", serde_json::to_string(&report)?);
        }

        Command::ResetDatabase {
            db,
            users,
            all,
            group,
        } => {
            if group.is_some() {
                bail!(
                    "--group cannot be resolved here: user groups live in the host \
                     user directory; resolve the members there and pass them explicitly"
                );
            }
            if all && !users.is_empty() {
                bail!("--all cannot be combined with explicit user ids");
            }
            if !all && users.is_empty() {
                bail!("specify user ids to reset, or --all");
            }

            let store = LibraryStore::new(&db)?;
            let scope = if all {
                ResetScope::All
            } else {
                ResetScope::Users(&users)
            };
            reset_library(&store, scope)?;
            info!("Library reset complete");
        }
    }
    Ok(())
}
