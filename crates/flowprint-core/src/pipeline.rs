//! Pipeline driver: stage sequencing for one database, fan-out across many.
//!
//! Within one database the stages are strictly sequential: flatten, classify,
//! inject, verify. Later stages assume earlier stages' artifacts exist, and
//! injection must see the complete classification output.
//!
//! Across databases each is an independent unit of work. The accounting
//! database, method set, and registry are finalized before any worker starts
//! (the one shared-state barrier); after that, one worker per database, no
//! ordering guarantees between them, and one database's failure never aborts
//! its siblings.

use rand::rngs::StdRng;
use rand::SeedableRng;
use rayon::prelude::*;
use std::path::PathBuf;

use flowprint_store::{MethodSet, ProcessStore};

use crate::classify::{match_materials, match_waste};
use crate::flatten::load_or_flatten;
use crate::inject::inject;
use crate::registry::QueryRegistry;
use crate::report;
use crate::synthdb::{build_synthetic_flows, register_methods, SyntheticFlowSet};
use crate::verify::{verify, VerifyReport};
use crate::{PipelineError, ACCOUNTING_DB};

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Flat-table cache directory.
    pub tmp_dir: PathBuf,
    /// Root of the per-database result CSV trees.
    pub results_dir: PathBuf,
    /// Sampling budget for the verifier.
    pub verify_attempts: u32,
    /// Also render each flat table as CSV next to its binary cache.
    pub export_flat_csv: bool,
    /// When set, each source database is copied to `<name><suffix>` and the
    /// copy is mutated, leaving the source pristine. Re-running injection
    /// against an already-injected copy duplicates exchanges, so in-place
    /// runs are for callers who manage isolation themselves.
    pub copy_suffix: Option<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            tmp_dir: PathBuf::from("data/tmp"),
            results_dir: PathBuf::from("data/results"),
            verify_attempts: 5,
            export_flat_csv: false,
            copy_suffix: Some("_flowprint".to_string()),
        }
    }
}

/// What happened to one database.
#[derive(Debug, Clone)]
pub struct DatabaseSummary {
    /// The database that was mutated (the working copy when isolation is on).
    pub database: String,
    pub source: String,
    pub rows: usize,
    pub waste_matched: usize,
    pub material_markets: usize,
    pub material_matched: usize,
    pub injected: usize,
    pub failed: usize,
    pub verify: Option<VerifyReport>,
}

#[derive(Debug)]
pub struct RunSummary {
    pub total: usize,
    pub succeeded: Vec<DatabaseSummary>,
    pub failed: Vec<(String, PipelineError)>,
}

impl RunSummary {
    pub fn success_count(&self) -> usize {
        self.succeeded.len()
    }
}

/// Run the full pipeline for one source database.
///
/// The synthetic flow set and method set must already be finalized for this
/// run (see [`run_all`]).
pub fn run_database(
    store: &ProcessStore,
    registry: &QueryRegistry,
    flows: &SyntheticFlowSet,
    methods: &MethodSet,
    cfg: &PipelineConfig,
    db_name: &str,
) -> Result<DatabaseSummary, PipelineError> {
    let mut db = match &cfg.copy_suffix {
        Some(suffix) => store.copy_database(db_name, &format!("{db_name}{suffix}"))?,
        None => store.load_database(db_name)?,
    };
    let working = db.name.clone();

    // flatten (cached)
    let table = load_or_flatten(&db, &cfg.tmp_dir)?;
    if cfg.export_flat_csv {
        report::write_flat_csv(&cfg.tmp_dir, &table)?;
    }

    // classify
    let waste_tables: Vec<_> = registry
        .waste_queries()
        .iter()
        .map(|query| match_waste(&table, query))
        .collect();
    let (activities, material_tables) = match_materials(&table, &db, registry.material_queries());

    let waste_matched: usize = waste_tables.iter().map(|t| t.len()).sum();
    let material_matched: usize = material_tables.iter().map(|t| t.len()).sum();
    tracing::info!(
        database = %working,
        rows = table.len(),
        waste_matched,
        material_markets = activities.len(),
        material_matched,
        "classification complete"
    );

    // audit CSVs
    let db_dir = report::prepare_results_dir(&cfg.results_dir, &working)?;
    report::write_waste_results(&db_dir, &waste_tables)?;
    report::write_material_results(&db_dir, &activities, &material_tables)?;

    // inject
    let mut injected = 0usize;
    let mut failed = 0usize;
    for matches in waste_tables.iter().chain(material_tables.iter()) {
        let report = inject(&mut db, matches, flows);
        injected += report.added;
        failed += report.failed;
    }
    store.save_database(&db)?;
    tracing::info!(database = %working, injected, failed, "injection complete");

    // verify (advisory: a failed verification is reported, not fatal)
    let verify_report = if injected > 0 {
        let mut rng = StdRng::from_entropy();
        match verify(&db, methods, cfg.verify_attempts, &mut rng) {
            Ok(report) => Some(report),
            Err(err) => {
                tracing::error!(database = %working, error = %err, "verification failed");
                None
            }
        }
    } else {
        tracing::info!(database = %working, "nothing injected, skipping verification");
        None
    };

    Ok(DatabaseSummary {
        database: working,
        source: db_name.to_string(),
        rows: table.len(),
        waste_matched,
        material_markets: activities.len(),
        material_matched,
        injected,
        failed,
        verify: verify_report,
    })
}

/// Run the pipeline for every named database, one worker per database.
///
/// Finalizes the shared state first: synthetic flows for every registry
/// category, plus their methods. Worker failures are isolated and reported
/// in the summary, never escalated.
pub fn run_all(
    store: &ProcessStore,
    registry: &QueryRegistry,
    cfg: &PipelineConfig,
    db_names: &[String],
    jobs: usize,
) -> Result<RunSummary, PipelineError> {
    let categories = registry.categories();
    let flows = build_synthetic_flows(store, &categories)?;
    let methods = register_methods(store, &categories, &flows)?;

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(jobs.max(1))
        .build()
        .map_err(|err| std::io::Error::new(std::io::ErrorKind::Other, err))?;

    let results: Vec<(String, Result<DatabaseSummary, PipelineError>)> = pool.install(|| {
        db_names
            .par_iter()
            .map(|name| {
                let result = run_database(store, registry, &flows, &methods, cfg, name);
                if let Err(err) = &result {
                    tracing::error!(database = %name, error = %err, "database pipeline failed");
                }
                (name.clone(), result)
            })
            .collect()
    });

    let mut summary = RunSummary {
        total: db_names.len(),
        succeeded: Vec::new(),
        failed: Vec::new(),
    };
    for (name, result) in results {
        match result {
            Ok(db_summary) => summary.succeeded.push(db_summary),
            Err(err) => summary.failed.push((name, err)),
        }
    }
    tracing::info!(
        total = summary.total,
        succeeded = summary.success_count(),
        failed = summary.failed.len(),
        "pipeline run complete"
    );
    Ok(summary)
}

/// Databases eligible as pipeline sources: everything in the store except the
/// accounting database and earlier runs' working copies.
pub fn source_databases(
    store: &ProcessStore,
    cfg: &PipelineConfig,
) -> Result<Vec<String>, PipelineError> {
    let mut names = store.list_databases()?;
    names.retain(|name| {
        if name == ACCOUNTING_DB {
            return false;
        }
        match &cfg.copy_suffix {
            Some(suffix) => !name.ends_with(suffix.as_str()),
            None => true,
        }
    });
    Ok(names)
}
