//! Classification engine: evaluates registry rules against a flat table.
//!
//! Waste matching is a batch predicate sweep over the row vector: literal
//! case-sensitive containment for keyword terms, exact unit equality, and a
//! non-zero amount. The worst case is O(rows x queries), which is fine at the
//! tested scale (~10^6 rows, ~60 queries) because the per-row work is a
//! handful of substring tests with no allocation.
//!
//! Material matching is two-phase: first find the market processes whose name
//! starts with a registered prefix (longest prefix wins), then sweep the flat
//! table for technosphere exchanges drawing from those markets, tagging each
//! matched row with the market's group.

use ahash::AHashMap;

use flowprint_store::{Database, ExchangeType};

use crate::flatten::{FlatRow, FlatTable};
use crate::registry::{MaterialQuery, WasteQuery};
use crate::Category;

/// The rows of one flat table that rolled up into one category.
#[derive(Debug, Clone)]
pub struct MatchTable {
    pub category: Category,
    pub rows: Vec<FlatRow>,
}

impl MatchTable {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// A material-market process selected in phase 1, with its demand group and
/// classification metadata for the audit CSV.
#[derive(Debug, Clone)]
pub struct MaterialActivity {
    pub code: String,
    pub name: String,
    pub location: String,
    pub reference_product: String,
    pub unit: String,
    pub group: String,
    pub classifications: Vec<(String, String)>,
    /// True when the classifications were inferred from a sibling process
    /// rather than declared on the activity itself.
    pub inferred_classifications: bool,
}

fn waste_row_matches(row: &FlatRow, query: &WasteQuery) -> bool {
    row.ex_unit == query.unit
        && row.ex_amount != 0.0
        && query.all.iter().all(|term| row.ex_name.contains(term))
        && (query.any.is_empty() || query.any.iter().any(|term| row.ex_name.contains(term)))
        && query.none.iter().all(|term| !row.ex_name.contains(term))
}

/// Rows satisfying one waste query. Output order follows table order, so
/// per-category counts are reproducible for the same input.
pub fn match_waste(table: &FlatTable, query: &WasteQuery) -> MatchTable {
    let rows: Vec<FlatRow> = table
        .rows
        .iter()
        .filter(|row| waste_row_matches(row, query))
        .cloned()
        .collect();

    tracing::debug!(
        database = %table.database,
        query = %query.name,
        unit = %query.unit,
        matches = rows.len(),
        "waste query evaluated"
    );

    MatchTable {
        category: query.category(),
        rows,
    }
}

/// Longest matching prefix for a process name. `queries` must be sorted
/// longest prefix first (the registry guarantees this); the first hit wins.
fn material_group<'a>(queries: &'a [MaterialQuery], name: &str) -> Option<&'a MaterialQuery> {
    queries.iter().find(|q| name.starts_with(&q.prefix))
}

/// Infer classifications for a process that declares none, from the first
/// sibling whose reference product equals the base of this one (the text
/// before the first comma). Mirrors the recovery used when source data has
/// holes in its classification metadata.
fn infer_classifications(db: &Database, reference_product: &str) -> Option<Vec<(String, String)>> {
    let base = reference_product.split(',').next().unwrap_or_default().trim();
    if base.is_empty() {
        return None;
    }
    db.processes()
        .find(|p| p.reference_product == base && !p.classifications.is_empty())
        .map(|p| p.classifications.clone())
}

/// Two-phase material matching.
///
/// Phase 1 selects market processes by name prefix and resolves their
/// classification metadata. Phase 2 selects the technosphere rows of the flat
/// table whose exchange name is one of the matched market names, grouped by
/// demand group. Returns the matched activities and one match table per
/// group, group-sorted.
pub fn match_materials(
    table: &FlatTable,
    db: &Database,
    queries: &[MaterialQuery],
) -> (Vec<MaterialActivity>, Vec<MatchTable>) {
    // Phase 1: market activities by prefix.
    let mut activities = Vec::new();
    for process in db.processes() {
        let Some(query) = material_group(queries, &process.name) else {
            continue;
        };
        let (classifications, inferred) = if process.classifications.is_empty() {
            match infer_classifications(db, &process.reference_product) {
                Some(found) => {
                    tracing::warn!(
                        activity = %process.name,
                        reference_product = %process.reference_product,
                        "no declared classifications, inferred from reference product base"
                    );
                    (found, true)
                }
                None => {
                    tracing::warn!(
                        activity = %process.name,
                        "no declared classifications and no sibling to infer from"
                    );
                    (Vec::new(), true)
                }
            }
        } else {
            (process.classifications.clone(), false)
        };
        activities.push(MaterialActivity {
            code: process.key.code.clone(),
            name: process.name.clone(),
            location: process.location.clone(),
            reference_product: process.reference_product.clone(),
            unit: process.unit.clone(),
            group: query.group.clone(),
            classifications,
            inferred_classifications: inferred,
        });
    }

    // Phase 2: technosphere rows drawing from a matched market.
    let name_to_group: AHashMap<&str, &str> = activities
        .iter()
        .map(|a| (a.name.as_str(), a.group.as_str()))
        .collect();

    let mut grouped: AHashMap<&str, Vec<FlatRow>> = AHashMap::new();
    for row in &table.rows {
        if row.ex_type != ExchangeType::Technosphere {
            continue;
        }
        if let Some(group) = name_to_group.get(row.ex_name.as_str()).copied() {
            grouped.entry(group).or_default().push(row.clone());
        }
    }

    let mut tables: Vec<MatchTable> = grouped
        .into_iter()
        .map(|(group, rows)| MatchTable {
            category: Category::Material {
                group: group.to_string(),
            },
            rows,
        })
        .collect();
    tables.sort_by(|a, b| a.category.cmp(&b.category));

    tracing::debug!(
        database = %table.database,
        markets = activities.len(),
        groups = tables.len(),
        rows = tables.iter().map(MatchTable::len).sum::<usize>(),
        "material queries evaluated"
    );

    (activities, tables)
}
