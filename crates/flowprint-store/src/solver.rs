//! Footprint methods and the scoring surface used by the verifier.
//!
//! A method ties one synthetic flow to a signed characterization factor:
//! -1.0 for waste categories (depletion-style indicator) and +1.0 for
//! material demand. Scoring a demand against a method sums the amounts of
//! every exchange drawing from the method's flow, weighted by the demanded
//! quantity and the factor.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::{Database, ProcessKey, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum SolverError {
    #[error("empty demand")]
    EmptyDemand,

    #[error("non-finite demand amount {amount} for {key}")]
    BadAmount { key: ProcessKey, amount: f64 },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Hierarchical method identity, ordered for stable listings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MethodKey {
    pub namespace: String,
    pub family: String,
    pub code: String,
}

impl fmt::Display for MethodKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} / {} / {}", self.namespace, self.family, self.code)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MethodKind {
    Waste,
    Material,
}

/// An impact-assessment method registered against exactly one flow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Method {
    pub key: MethodKey,
    pub kind: MethodKind,
    /// The synthetic flow this method characterizes.
    pub flow: ProcessKey,
    /// Signed characterization factor: -1.0 waste, +1.0 material.
    pub factor: f64,
    pub unit: String,
    pub description: String,
}

/// The set of registered footprint methods, keyed by method identity.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MethodSet {
    methods: BTreeMap<MethodKey, Method>,
}

impl MethodSet {
    pub fn len(&self) -> usize {
        self.methods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }

    /// Register a method; a no-op when the key is already present.
    /// Returns whether the method was newly added.
    pub fn register(&mut self, method: Method) -> bool {
        if self.methods.contains_key(&method.key) {
            return false;
        }
        self.methods.insert(method.key.clone(), method);
        true
    }

    pub fn get(&self, key: &MethodKey) -> Option<&Method> {
        self.methods.get(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Method> {
        self.methods.values()
    }

    pub fn of_kind(&self, kind: MethodKind) -> Vec<&Method> {
        self.methods.values().filter(|m| m.kind == kind).collect()
    }
}

/// Score a `{process: amount}` demand against one method.
///
/// All demanded processes must live in `db`. The score is
/// `factor * sum(demand_amount * exchange_amount)` over every exchange of a
/// demanded process whose input is the method's flow.
pub fn score(
    db: &Database,
    demand: &[(ProcessKey, f64)],
    method: &Method,
) -> Result<f64, SolverError> {
    if demand.is_empty() {
        return Err(SolverError::EmptyDemand);
    }

    let mut total = 0.0;
    for (key, quantity) in demand {
        if !quantity.is_finite() {
            return Err(SolverError::BadAmount {
                key: key.clone(),
                amount: *quantity,
            });
        }
        if key.database != db.name {
            return Err(StoreError::ForeignKey {
                database: key.database.clone(),
                code: key.code.clone(),
                expected: db.name.clone(),
            }
            .into());
        }
        let process = db.get(&key.code).ok_or_else(|| StoreError::ProcessNotFound {
            database: key.database.clone(),
            code: key.code.clone(),
        })?;
        let drawn: f64 = process
            .exchanges
            .iter()
            .filter(|ex| ex.input == method.flow)
            .map(|ex| ex.amount)
            .sum();
        total += quantity * drawn;
    }

    Ok(total * method.factor)
}
