//! Flowprint command-line interface.
//!
//! Layout under the data directory:
//!
//! ```text
//! <data>/
//!   store/      process store (one file per database, methods)
//!   tmp/        flat-table caches
//!   results/    per-database audit CSVs
//! ```

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::path::PathBuf;

use flowprint_core::{
    pipeline, registry::QueryRegistry, verify, PipelineConfig, RunSummary,
};
use flowprint_store::{import_json, ProcessStore};

#[derive(Parser)]
#[command(
    name = "flowprint",
    version,
    about = "Waste and material footprints for LCA databases"
)]
struct Cli {
    /// Root data directory; store, caches, and results live beneath it.
    #[arg(long, default_value = "data", global = true)]
    data_dir: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Import database snapshots from JSON files into the store
    Import {
        /// JSON snapshot files, one database each
        files: Vec<PathBuf>,
    },

    /// List databases and registered footprint methods
    List,

    /// Flatten one database into the cache
    Flatten {
        database: String,
        /// Also render the flat table as CSV
        #[arg(long)]
        csv: bool,
    },

    /// Run the full pipeline: flatten, classify, inject, verify
    Run {
        /// Databases to process (default: every source database in the store)
        #[arg(long = "db")]
        databases: Vec<String>,

        /// Worker count; one worker per database (default: available CPUs)
        #[arg(long)]
        jobs: Option<usize>,

        /// JSON file replacing the built-in waste queries
        #[arg(long)]
        waste_rules: Option<PathBuf>,

        /// JSON file replacing the built-in material prefix table
        #[arg(long)]
        material_rules: Option<PathBuf>,

        /// Mutate source databases directly instead of working copies.
        /// Re-running an in-place injection duplicates exchanges.
        #[arg(long)]
        in_place: bool,

        /// Verifier sampling budget per database
        #[arg(long, default_value_t = 5)]
        verify_attempts: u32,

        /// Render flat tables as CSV next to their caches
        #[arg(long)]
        flat_csv: bool,
    },

    /// Sample one database through the registered footprint methods
    Verify {
        database: String,
        #[arg(long, default_value_t = 5)]
        attempts: u32,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let store = ProcessStore::open(cli.data_dir.join("store"))
        .with_context(|| format!("opening store under {}", cli.data_dir.display()))?;

    match cli.command {
        Command::Import { files } => {
            if files.is_empty() {
                bail!("no snapshot files given");
            }
            for file in files {
                let db = import_json(&store, &file)
                    .with_context(|| format!("importing {}", file.display()))?;
                println!(
                    "{} {} ({} processes, {} exchanges)",
                    "imported".green(),
                    db.name.bold(),
                    db.len(),
                    db.exchange_count()
                );
            }
        }

        Command::List => {
            let databases = store.list_databases()?;
            if databases.is_empty() {
                println!("store is empty");
            }
            for name in databases {
                let db = store.load_database(&name)?;
                println!(
                    "{:<40} {:>8} processes {:>10} exchanges",
                    name.bold(),
                    db.len(),
                    db.exchange_count()
                );
            }
            let methods = store.load_methods()?;
            if !methods.is_empty() {
                println!("\n{} registered methods:", methods.len());
                for method in methods.iter() {
                    println!("  {}", method.key);
                }
            }
        }

        Command::Flatten { database, csv } => {
            let cfg = config(&cli.data_dir, true);
            let db = store.load_database(&database)?;
            let table = flowprint_core::load_or_flatten(&db, &cfg.tmp_dir)?;
            println!("{} rows for {}", table.len(), database.bold());
            if csv {
                let path = flowprint_core::report::write_flat_csv(&cfg.tmp_dir, &table)?;
                println!("flat CSV: {}", path.display());
            }
        }

        Command::Run {
            databases,
            jobs,
            waste_rules,
            material_rules,
            in_place,
            verify_attempts,
            flat_csv,
        } => {
            let registry =
                QueryRegistry::from_json_files(waste_rules.as_deref(), material_rules.as_deref())
                    .context("loading classification rules")?;

            let mut cfg = config(&cli.data_dir, !in_place);
            cfg.verify_attempts = verify_attempts;
            cfg.export_flat_csv = flat_csv;

            let names = if databases.is_empty() {
                pipeline::source_databases(&store, &cfg)?
            } else {
                databases
            };
            if names.is_empty() {
                bail!("no source databases in the store; import one first");
            }

            let jobs = jobs.unwrap_or_else(|| {
                std::thread::available_parallelism()
                    .map(|n| n.get())
                    .unwrap_or(1)
            });
            println!(
                "processing {} database(s) with {} worker(s)",
                names.len(),
                jobs
            );

            let summary = pipeline::run_all(&store, &registry, &cfg, &names, jobs)?;
            print_summary(&summary);
            if summary.success_count() < summary.total {
                std::process::exit(1);
            }
        }

        Command::Verify { database, attempts } => {
            let db = store.load_database(&database)?;
            let methods = store.load_methods()?;
            let mut rng = StdRng::from_entropy();
            let report = verify(&db, &methods, attempts, &mut rng)?;
            println!(
                "score {:>12.4e}  ({} samples)\n  method:   {}\n  activity: {}",
                report.score, report.samples, report.method, report.activity
            );
        }
    }

    Ok(())
}

fn config(data_dir: &std::path::Path, isolate: bool) -> PipelineConfig {
    PipelineConfig {
        tmp_dir: data_dir.join("tmp"),
        results_dir: data_dir.join("results"),
        copy_suffix: isolate.then(|| "_flowprint".to_string()),
        ..PipelineConfig::default()
    }
}

fn print_summary(summary: &RunSummary) {
    println!();
    for db in &summary.succeeded {
        println!(
            "{} {} ({} rows, {} waste + {} material matches, {} injected, {} failed)",
            "ok".green().bold(),
            db.database.bold(),
            db.rows,
            db.waste_matched,
            db.material_matched,
            db.injected,
            db.failed
        );
        if let Some(verify) = &db.verify {
            println!(
                "     verify: score {:.4e} via {} ({})",
                verify.score, verify.method, verify.activity
            );
        }
    }
    for (name, err) in &summary.failed {
        println!("{} {}: {}", "failed".red().bold(), name.bold(), err);
    }
    let line = format!(
        "{} of {} databases processed successfully",
        summary.success_count(),
        summary.total
    );
    if summary.failed.is_empty() {
        println!("\n{}", line.green().bold());
    } else {
        println!("\n{}", line.yellow().bold());
    }
}
