//! Aggregator: synthetic reference flows and their footprint methods.
//!
//! Each category maps to exactly one synthetic flow in the shared accounting
//! database. Creation is idempotent by flow code, so running the pipeline
//! against a second source database with overlapping categories extends the
//! accounting database without duplicating what is already there. The method
//! registration mirrors that: one method per flow, characterization factor
//! -1.0 for waste and +1.0 for material demand, idempotent by method key.
//!
//! The accounting database and method set are finalized once per run, before
//! any per-database worker starts injecting.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use flowprint_store::{
    Method, MethodKey, MethodKind, MethodSet, Process, ProcessKey, ProcessStore, StoreError,
};

use crate::{Category, PipelineError, ACCOUNTING_DB};

/// One synthetic reference flow in the accounting database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyntheticFlow {
    pub key: ProcessKey,
    pub name: String,
    pub unit: String,
}

/// All synthetic flows known after a build, keyed by flow code.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyntheticFlowSet {
    flows: BTreeMap<String, SyntheticFlow>,
}

impl SyntheticFlowSet {
    pub fn len(&self) -> usize {
        self.flows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flows.is_empty()
    }

    pub fn get(&self, code: &str) -> Option<&SyntheticFlow> {
        self.flows.get(code)
    }

    pub fn for_category(&self, category: &Category) -> Option<&SyntheticFlow> {
        self.flows.get(&category.code())
    }

    pub fn iter(&self) -> impl Iterator<Item = &SyntheticFlow> {
        self.flows.values()
    }
}

/// Ensure one synthetic flow per category exists in the accounting database.
///
/// Loads the accounting database (creating it on first use), inserts a flow
/// process for every category not yet represented, and returns the full flow
/// set including flows created by earlier runs.
pub fn build_synthetic_flows(
    store: &ProcessStore,
    categories: &[Category],
) -> Result<SyntheticFlowSet, PipelineError> {
    let mut db = match store.load_database(ACCOUNTING_DB) {
        Ok(db) => db,
        Err(StoreError::DatabaseNotFound { .. }) => {
            tracing::info!(database = ACCOUNTING_DB, "creating accounting database");
            flowprint_store::Database::new(ACCOUNTING_DB)
        }
        Err(err) => return Err(err.into()),
    };

    let mut added = 0usize;
    for category in categories {
        let code = category.code();
        if db.get(&code).is_some() {
            continue;
        }
        let name = category.flow_name();
        db.insert(Process {
            key: ProcessKey::new(ACCOUNTING_DB, &code),
            name: name.clone(),
            reference_product: name,
            unit: category.unit().to_string(),
            location: "GLO".to_string(),
            classifications: vec![("flow type".to_string(), category.flow_type().to_string())],
            exchanges: vec![],
        })?;
        added += 1;
    }

    if added > 0 {
        store.save_database(&db)?;
    }
    tracing::info!(
        added,
        total = db.len(),
        "synthetic flows ready in accounting database"
    );

    let flows = db
        .processes()
        .map(|p| {
            (
                p.key.code.clone(),
                SyntheticFlow {
                    key: p.key.clone(),
                    name: p.name.clone(),
                    unit: p.unit.clone(),
                },
            )
        })
        .collect();
    Ok(SyntheticFlowSet { flows })
}

/// Register one footprint method per category, tied to its synthetic flow.
/// Existing method keys are left untouched; the persisted set is returned.
pub fn register_methods(
    store: &ProcessStore,
    categories: &[Category],
    flows: &SyntheticFlowSet,
) -> Result<MethodSet, PipelineError> {
    let mut methods = store.load_methods()?;

    let mut added = 0usize;
    for category in categories {
        let Some(flow) = flows.for_category(category) else {
            // build_synthetic_flows runs first; a missing flow here is a
            // caller sequencing bug, surface it loudly but keep going.
            tracing::warn!(category = %category, "no synthetic flow for category, skipping method");
            continue;
        };
        let (kind, family, factor, description) = match category {
            Category::Waste { subcategory, .. } => (
                MethodKind::Waste,
                format!("Waste: {subcategory}"),
                -1.0,
                "For estimating the waste footprint of an activity".to_string(),
            ),
            Category::Material { group } => (
                MethodKind::Material,
                format!("Demand: {group}"),
                1.0,
                "For estimating the material demand footprint of an activity".to_string(),
            ),
        };
        let method = Method {
            key: MethodKey {
                namespace: "Flowprint".to_string(),
                family,
                code: category.code(),
            },
            kind,
            flow: flow.key.clone(),
            factor,
            unit: flow.unit.clone(),
            description,
        };
        if methods.register(method) {
            added += 1;
        }
    }

    store.save_methods(&methods)?;
    tracing::info!(added, total = methods.len(), "footprint methods registered");
    Ok(methods)
}
