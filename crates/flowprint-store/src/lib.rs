//! Flowprint process store.
//!
//! A small persistent graph store for LCA process data. Each database is a
//! self-contained file under the store root:
//!
//! ```text
//! <root>/
//!   ecoinvent-3.9-cutoff.db.bin     one bincode file per database
//!   flowprint.db.bin                the shared accounting database
//!   methods.bin                     registered footprint methods
//! ```
//!
//! Processes are keyed by `(database, code)` and carry an ordered exchange
//! list. Mutation of existing processes is append-only: the pipeline adds new
//! exchanges, it never rewrites or removes existing ones. Databases iterate in
//! code order so counts and reports are reproducible run to run.
//!
//! The unit of concurrency is one worker per database. The store itself holds
//! no locks; callers must not open the same database file from two workers at
//! once.

pub mod json;
pub mod solver;

#[cfg(test)]
mod tests;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

pub use json::import_json;
pub use solver::{score, Method, MethodKey, MethodKind, MethodSet, SolverError};

const DB_FILE_SUFFIX: &str = ".db.bin";
const METHODS_FILE: &str = "methods.bin";

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database not found in store: {name}")]
    DatabaseNotFound { name: String },

    #[error("process not found: ({database}, {code})")]
    ProcessNotFound { database: String, code: String },

    #[error("process already exists: ({database}, {code})")]
    DuplicateProcess { database: String, code: String },

    #[error("process key ({database}, {code}) does not belong to database {expected}")]
    ForeignKey {
        database: String,
        code: String,
        expected: String,
    },

    #[error("invalid database name: {name:?}")]
    InvalidName { name: String },

    #[error("unknown exchange type: {value:?}")]
    UnknownExchangeType { value: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Codec(#[from] bincode::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

// ============================================================================
// Core Types
// ============================================================================

/// Identity of a process: the database it lives in plus its code.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProcessKey {
    pub database: String,
    pub code: String,
}

impl ProcessKey {
    pub fn new(database: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            code: code.into(),
        }
    }
}

impl fmt::Display for ProcessKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.database, self.code)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExchangeType {
    Technosphere,
    Biosphere,
    Production,
}

impl ExchangeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExchangeType::Technosphere => "technosphere",
            ExchangeType::Biosphere => "biosphere",
            ExchangeType::Production => "production",
        }
    }

    pub fn parse(value: &str) -> Result<Self, StoreError> {
        match value {
            "technosphere" => Ok(ExchangeType::Technosphere),
            "biosphere" => Ok(ExchangeType::Biosphere),
            "production" => Ok(ExchangeType::Production),
            other => Err(StoreError::UnknownExchangeType {
                value: other.to_string(),
            }),
        }
    }
}

/// A directed flow into or out of a process.
///
/// Amount and unit are immutable once created; re-running a pipeline stage
/// must not edit an exchange in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Exchange {
    /// The flow this exchange draws from (may be the owning process itself
    /// for production exchanges).
    pub input: ProcessKey,
    pub name: String,
    pub amount: f64,
    pub unit: String,
    pub exchange_type: ExchangeType,
    pub location: Option<String>,
}

/// A production activity: one node in the LCA graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Process {
    pub key: ProcessKey,
    pub name: String,
    pub reference_product: String,
    pub unit: String,
    pub location: String,
    /// Classification pairs, e.g. `("ISIC rev.4 ecoinvent", "2420: ...")`.
    pub classifications: Vec<(String, String)>,
    /// Ordered exchange list. Append-only for existing processes.
    pub exchanges: Vec<Exchange>,
}

// ============================================================================
// Database
// ============================================================================

/// One named database: a code-ordered collection of processes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Database {
    pub name: String,
    processes: BTreeMap<String, Process>,
}

impl Database {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            processes: BTreeMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.processes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processes.is_empty()
    }

    /// Total exchange count across all processes.
    pub fn exchange_count(&self) -> usize {
        self.processes.values().map(|p| p.exchanges.len()).sum()
    }

    /// Processes in code order.
    pub fn processes(&self) -> impl Iterator<Item = &Process> {
        self.processes.values()
    }

    pub fn get(&self, code: &str) -> Option<&Process> {
        self.processes.get(code)
    }

    /// Insert a new process. The key must belong to this database and must
    /// not collide with an existing code.
    pub fn insert(&mut self, process: Process) -> Result<(), StoreError> {
        if process.key.database != self.name {
            return Err(StoreError::ForeignKey {
                database: process.key.database.clone(),
                code: process.key.code.clone(),
                expected: self.name.clone(),
            });
        }
        if self.processes.contains_key(&process.key.code) {
            return Err(StoreError::DuplicateProcess {
                database: process.key.database.clone(),
                code: process.key.code.clone(),
            });
        }
        self.processes.insert(process.key.code.clone(), process);
        Ok(())
    }

    /// Append one exchange to an existing process. Existing exchanges are
    /// untouched; the new exchange lands at the end of the list.
    pub fn append_exchange(&mut self, code: &str, exchange: Exchange) -> Result<(), StoreError> {
        let process = self
            .processes
            .get_mut(code)
            .ok_or_else(|| StoreError::ProcessNotFound {
                database: self.name.clone(),
                code: code.to_string(),
            })?;
        process.exchanges.push(exchange);
        Ok(())
    }
}

// ============================================================================
// Process Store
// ============================================================================

/// Directory-backed store of databases.
pub struct ProcessStore {
    root: PathBuf,
}

impl ProcessStore {
    /// Open a store rooted at `root`, creating the directory if needed.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn db_path(&self, name: &str) -> Result<PathBuf, StoreError> {
        if name.is_empty() || name.contains('/') || name.contains('\\') {
            return Err(StoreError::InvalidName {
                name: name.to_string(),
            });
        }
        Ok(self.root.join(format!("{name}{DB_FILE_SUFFIX}")))
    }

    /// Names of all databases currently present, sorted.
    pub fn list_databases(&self) -> Result<Vec<String>, StoreError> {
        let mut names = Vec::new();
        for entry in std::fs::read_dir(&self.root)? {
            let entry = entry?;
            let file_name = entry.file_name();
            let Some(file_name) = file_name.to_str() else {
                continue;
            };
            if let Some(name) = file_name.strip_suffix(DB_FILE_SUFFIX) {
                names.push(name.to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.db_path(name).map(|p| p.exists()).unwrap_or(false)
    }

    pub fn load_database(&self, name: &str) -> Result<Database, StoreError> {
        let path = self.db_path(name)?;
        if !path.exists() {
            return Err(StoreError::DatabaseNotFound {
                name: name.to_string(),
            });
        }
        let bytes = std::fs::read(&path)?;
        let db: Database = bincode::deserialize(&bytes)?;
        Ok(db)
    }

    pub fn save_database(&self, db: &Database) -> Result<(), StoreError> {
        let path = self.db_path(&db.name)?;
        let bytes = bincode::serialize(db)?;
        std::fs::write(&path, bytes)?;
        Ok(())
    }

    /// Copy a database's contents to a new name, rewriting internal keys.
    ///
    /// Exchange inputs that point at the source database follow the copy;
    /// inputs into other databases are left as-is. Used to isolate a working
    /// copy before injection mutates it.
    pub fn copy_database(&self, src: &str, dst: &str) -> Result<Database, StoreError> {
        let source = self.load_database(src)?;
        let mut copy = Database::new(dst);
        for process in source.processes() {
            let mut process = process.clone();
            process.key.database = dst.to_string();
            for exchange in &mut process.exchanges {
                if exchange.input.database == src {
                    exchange.input.database = dst.to_string();
                }
            }
            copy.insert(process)?;
        }
        self.save_database(&copy)?;
        tracing::info!(src, dst, processes = copy.len(), "copied database");
        Ok(copy)
    }

    /// Convenience point lookup across database files. Loads the whole
    /// database; batch callers should hold a loaded `Database` instead.
    pub fn get_process(&self, key: &ProcessKey) -> Result<Process, StoreError> {
        let db = self.load_database(&key.database)?;
        db.get(&key.code)
            .cloned()
            .ok_or_else(|| StoreError::ProcessNotFound {
                database: key.database.clone(),
                code: key.code.clone(),
            })
    }

    // ------------------------------------------------------------------
    // Method persistence
    // ------------------------------------------------------------------

    /// Load the registered method set, or an empty set if none exists yet.
    pub fn load_methods(&self) -> Result<MethodSet, StoreError> {
        let path = self.root.join(METHODS_FILE);
        if !path.exists() {
            return Ok(MethodSet::default());
        }
        let bytes = std::fs::read(&path)?;
        Ok(bincode::deserialize(&bytes)?)
    }

    pub fn save_methods(&self, methods: &MethodSet) -> Result<(), StoreError> {
        let path = self.root.join(METHODS_FILE);
        let bytes = bincode::serialize(methods)?;
        std::fs::write(&path, bytes)?;
        Ok(())
    }
}
