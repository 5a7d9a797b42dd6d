//! JSON database import.
//!
//! The boundary to external scenario providers: a provider materializes a
//! database snapshot as JSON and this module loads it into the store. Only
//! structure is validated here; flow semantics are the pipeline's problem.
//!
//! Expected shape:
//!
//! ```json
//! {
//!   "name": "ecoinvent-3.9-cutoff",
//!   "processes": [
//!     {
//!       "code": "a1b2",
//!       "name": "market for chromium",
//!       "reference_product": "chromium",
//!       "unit": "kilogram",
//!       "location": "GLO",
//!       "classifications": [["ISIC rev.4 ecoinvent", "2420"]],
//!       "exchanges": [
//!         {
//!           "name": "waste chromium slag, hazardous",
//!           "amount": 2.0,
//!           "unit": "kilogram",
//!           "type": "technosphere",
//!           "input": ["ecoinvent-3.9-cutoff", "ffee"]
//!         }
//!       ]
//!     }
//!   ]
//! }
//! ```
//!
//! `input` may be omitted, in which case the exchange points at its owning
//! process (the usual shape for production exchanges).

use serde::Deserialize;
use std::path::Path;

use crate::{Database, Exchange, ExchangeType, Process, ProcessKey, ProcessStore, StoreError};

#[derive(Debug, Deserialize)]
struct JsonDatabase {
    name: String,
    processes: Vec<JsonProcess>,
}

#[derive(Debug, Deserialize)]
struct JsonProcess {
    code: String,
    name: String,
    #[serde(default)]
    reference_product: String,
    unit: String,
    #[serde(default)]
    location: String,
    #[serde(default)]
    classifications: Vec<(String, String)>,
    #[serde(default)]
    exchanges: Vec<JsonExchange>,
}

#[derive(Debug, Deserialize)]
struct JsonExchange {
    name: String,
    amount: f64,
    unit: String,
    #[serde(rename = "type")]
    exchange_type: String,
    #[serde(default)]
    input: Option<(String, String)>,
    #[serde(default)]
    location: Option<String>,
}

/// Parse a JSON snapshot, persist it as a database, and return it.
pub fn import_json(store: &ProcessStore, path: &Path) -> Result<Database, StoreError> {
    let contents = std::fs::read_to_string(path)?;
    let parsed: JsonDatabase = serde_json::from_str(&contents)?;

    let mut db = Database::new(&parsed.name);
    for jp in parsed.processes {
        let key = ProcessKey::new(&parsed.name, &jp.code);
        let mut exchanges = Vec::with_capacity(jp.exchanges.len());
        for je in jp.exchanges {
            let input = match je.input {
                Some((database, code)) => ProcessKey::new(database, code),
                None => key.clone(),
            };
            exchanges.push(Exchange {
                input,
                name: je.name,
                amount: je.amount,
                unit: je.unit,
                exchange_type: ExchangeType::parse(&je.exchange_type)?,
                location: je.location,
            });
        }
        db.insert(Process {
            key,
            name: jp.name,
            reference_product: jp.reference_product,
            unit: jp.unit,
            location: jp.location,
            classifications: jp.classifications,
            exchanges,
        })?;
    }

    store.save_database(&db)?;
    tracing::info!(
        database = %db.name,
        processes = db.len(),
        exchanges = db.exchange_count(),
        "imported database from JSON"
    );
    Ok(db)
}
