//! Graph flattener: one denormalized row per (process, exchange) pair.
//!
//! A flat table is the searchable form of a database. It is built in a single
//! pass over the process list (no per-row store lookups) and cached on disk
//! keyed by database name plus a content fingerprint, so reruns skip the
//! flatten when the source is unchanged. Tables run to 10^5..10^6 rows for a
//! full industrial database; everything downstream treats them as immutable.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::hash::{BuildHasher, Hasher};
use std::path::{Path, PathBuf};

use flowprint_store::{Database, ExchangeType};

use crate::PipelineError;

/// One (process, exchange) pair with process fields denormalized and
/// exchange fields prefixed `ex_`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlatRow {
    pub database: String,
    pub code: String,
    pub name: String,
    pub location: String,
    pub reference_product: String,
    pub ex_name: String,
    pub ex_amount: f64,
    pub ex_unit: String,
    pub ex_type: ExchangeType,
    pub ex_location: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlatTable {
    pub database: String,
    pub fingerprint: u64,
    pub rows: Vec<FlatRow>,
}

impl FlatTable {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// On-disk cache envelope. `created` is informational only; staleness is
/// decided by the fingerprint.
#[derive(Debug, Serialize, Deserialize)]
struct CachedTable {
    created: DateTime<Utc>,
    table: FlatTable,
}

/// Content fingerprint of a database: name, process codes, and full exchange
/// content. Seeded hasher, stable across runs and processes.
pub fn fingerprint(db: &Database) -> u64 {
    let state = ahash::RandomState::with_seeds(
        0x466c_6f77_7072_696e,
        0x7446_6c61_7454_6162,
        0x6c65_4669_6e67_6572,
        0x7072_696e_7456_3031,
    );
    let mut hasher = state.build_hasher();
    hasher.write(db.name.as_bytes());
    for process in db.processes() {
        hasher.write(process.key.code.as_bytes());
        hasher.write_usize(process.exchanges.len());
        for ex in &process.exchanges {
            hasher.write(ex.name.as_bytes());
            hasher.write(ex.unit.as_bytes());
            hasher.write_u64(ex.amount.to_bits());
        }
    }
    hasher.finish()
}

/// Flatten a database: single pass, row count equals the database's total
/// exchange count.
pub fn flatten(db: &Database) -> FlatTable {
    let mut rows = Vec::with_capacity(db.exchange_count());
    for process in db.processes() {
        for ex in &process.exchanges {
            rows.push(FlatRow {
                database: db.name.clone(),
                code: process.key.code.clone(),
                name: process.name.clone(),
                location: process.location.clone(),
                reference_product: process.reference_product.clone(),
                ex_name: ex.name.clone(),
                ex_amount: ex.amount,
                ex_unit: ex.unit.clone(),
                ex_type: ex.exchange_type,
                ex_location: ex.location.clone(),
            });
        }
    }

    tracing::info!(
        database = %db.name,
        processes = db.len(),
        rows = rows.len(),
        "flattened database"
    );

    FlatTable {
        database: db.name.clone(),
        fingerprint: fingerprint(db),
        rows,
    }
}

pub fn cache_path(tmp_dir: &Path, db_name: &str) -> PathBuf {
    tmp_dir.join(format!("{db_name}_flat.bin"))
}

/// Reuse the cached flat table when its fingerprint matches the database's
/// current content; otherwise flatten afresh and rewrite the cache.
pub fn load_or_flatten(db: &Database, tmp_dir: &Path) -> Result<FlatTable, PipelineError> {
    std::fs::create_dir_all(tmp_dir)?;
    let path = cache_path(tmp_dir, &db.name);
    let current = fingerprint(db);

    if path.exists() {
        let bytes = std::fs::read(&path)?;
        match bincode::deserialize::<CachedTable>(&bytes) {
            Ok(cached) if cached.table.fingerprint == current => {
                tracing::info!(
                    database = %db.name,
                    rows = cached.table.len(),
                    created = %cached.created,
                    "reusing cached flat table"
                );
                return Ok(cached.table);
            }
            Ok(_) => {
                tracing::info!(database = %db.name, "flat table cache is stale, re-flattening");
            }
            Err(err) => {
                tracing::warn!(
                    database = %db.name,
                    error = %err,
                    "unreadable flat table cache, re-flattening"
                );
            }
        }
    }

    let table = flatten(db);
    let cached = CachedTable {
        created: Utc::now(),
        table,
    };
    std::fs::write(&path, bincode::serialize(&cached)?)?;
    Ok(cached.table)
}
