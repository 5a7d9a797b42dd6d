//! Exchange injector: materializes match tables as declared exchanges.
//!
//! For every matched row, the owning process gets one appended biosphere
//! exchange drawing from the category's synthetic flow, with the row's amount
//! and unit. This is the highest-volume operation in the pipeline (hundreds
//! of thousands of appends for a full database), so it works against a loaded
//! `Database` and appends in place; the caller saves once at the end.
//!
//! Failure handling is per process: a row whose process is missing, or whose
//! key points at another database, is counted and logged without aborting the
//! rest of the batch. Re-injection is not deduplicated; run against a fresh
//! working copy (see `ProcessStore::copy_database`).

use flowprint_store::{Database, Exchange, ExchangeType};

use crate::classify::MatchTable;
use crate::synthdb::SyntheticFlowSet;

/// Outcome of injecting one category into one database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InjectionReport {
    pub category: String,
    pub added: usize,
    pub failed: usize,
}

/// Append one exchange per matched row onto its owning process.
pub fn inject(db: &mut Database, matches: &MatchTable, flows: &SyntheticFlowSet) -> InjectionReport {
    let code = matches.category.code();

    let Some(flow) = flows.for_category(&matches.category) else {
        tracing::warn!(
            category = %code,
            rows = matches.len(),
            "no synthetic flow registered for category, nothing injected"
        );
        return InjectionReport {
            category: code,
            added: 0,
            failed: matches.len(),
        };
    };

    let mut added = 0usize;
    let mut failed = 0usize;
    for row in &matches.rows {
        if row.database != db.name {
            tracing::warn!(
                category = %code,
                row_database = %row.database,
                database = %db.name,
                code = %row.code,
                "matched row belongs to a different database, skipped"
            );
            failed += 1;
            continue;
        }
        let exchange = Exchange {
            input: flow.key.clone(),
            name: flow.name.clone(),
            amount: row.ex_amount,
            unit: row.ex_unit.clone(),
            exchange_type: ExchangeType::Biosphere,
            location: None,
        };
        match db.append_exchange(&row.code, exchange) {
            Ok(()) => added += 1,
            Err(err) => {
                tracing::warn!(
                    category = %code,
                    code = %row.code,
                    error = %err,
                    "failed to append exchange, skipped"
                );
                failed += 1;
            }
        }
    }

    tracing::debug!(category = %code, added, failed, "category injected");
    InjectionReport {
        category: code,
        added,
        failed,
    }
}
