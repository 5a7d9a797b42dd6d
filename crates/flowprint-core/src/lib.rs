//! Flowprint core pipeline.
//!
//! Computes waste-generation and material-demand footprints for every process
//! in an LCA database and writes them back as new accounting artifacts that a
//! downstream impact calculation can consume. Three stages do the real work:
//!
//! 1. **Flatten** a database into one row per (process, exchange) pair
//!    (`flatten`), cached on disk per database.
//! 2. **Classify** the flat table against the query registry (`registry`,
//!    `classify`): keyword logic for waste categories, name-prefix grouping
//!    for material categories.
//! 3. **Aggregate and inject** (`synthdb`, `inject`): one synthetic reference
//!    flow per category in a shared accounting database, then one appended
//!    biosphere exchange per matched row on the owning process.
//!
//! `verify` samples the mutated database through the scoring surface as an
//! advisory end-of-run check, and `pipeline` sequences the stages for one
//! database and fans out across databases with one worker each.

pub mod classify;
pub mod flatten;
pub mod inject;
pub mod pipeline;
pub mod registry;
pub mod report;
pub mod synthdb;
pub mod verify;

use serde::{Deserialize, Serialize};
use std::fmt;

pub use classify::{match_materials, match_waste, MatchTable, MaterialActivity};
pub use flatten::{flatten, load_or_flatten, FlatRow, FlatTable};
pub use inject::{inject, InjectionReport};
pub use pipeline::{run_all, run_database, DatabaseSummary, PipelineConfig, RunSummary};
pub use registry::{ConfigError, MaterialQuery, QueryRegistry, QueryRegistryBuilder, WasteQuery};
pub use synthdb::{build_synthetic_flows, register_methods, SyntheticFlow, SyntheticFlowSet};
pub use verify::{verify, VerifyReport};

use flowprint_store::{SolverError, StoreError};

/// Name of the shared accounting database holding synthetic flows.
pub const ACCOUNTING_DB: &str = "flowprint";

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Solver(#[from] SolverError),

    #[error("database {name} has no processes to verify")]
    EmptyDatabase { name: String },

    #[error("no footprint methods registered")]
    NoMethods,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Codec(#[from] bincode::Error),
}

// ============================================================================
// Category
// ============================================================================

/// The unit of aggregation: every matched row rolls up into exactly one
/// category, and every category maps to exactly one synthetic flow.
///
/// The variant is fixed at classification time; downstream stages never
/// re-derive kind, unit, or naming from strings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Category {
    /// A waste subcategory at a specific unit, e.g. `hazardous` / `kilogram`.
    Waste { subcategory: String, unit: String },
    /// A material demand group, e.g. `chromium`. The unit is derived from
    /// the group name: volumetric for water and gas markets, energy for
    /// electricity, mass otherwise.
    Material { group: String },
}

impl Category {
    /// Deterministic flow code: doubles as the synthetic process code and the
    /// method code. Space-free so it can name result files directly.
    pub fn code(&self) -> String {
        match self {
            Category::Waste { subcategory, unit } => {
                format!("waste_{subcategory}-{unit}").replace(' ', "_")
            }
            Category::Material { group } => format!("material_{group}").replace(' ', "_"),
        }
    }

    /// Human-readable name for the synthetic flow.
    pub fn flow_name(&self) -> String {
        match self {
            Category::Waste { subcategory, unit } => {
                format!("Waste footprint: {subcategory} [{unit}]")
            }
            Category::Material { group } => format!("Material demand: {group}"),
        }
    }

    /// Unit of the synthetic flow. Waste categories carry their query's
    /// unit; material groups are volumetric when the group names a water or
    /// gas market, energy-denominated for electricity, and mass otherwise.
    pub fn unit(&self) -> &str {
        match self {
            Category::Waste { unit, .. } => unit,
            Category::Material { group } => {
                if group.contains("water") || group.contains("gas") {
                    "cubic meter"
                } else if group.contains("electricity") {
                    "kilowatt hour"
                } else {
                    "kilogram"
                }
            }
        }
    }

    /// Flow type tag carried on the synthetic process.
    pub fn flow_type(&self) -> &'static str {
        match self {
            Category::Waste { .. } => "waste",
            Category::Material { .. } => "natural resource",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.code())
    }
}
