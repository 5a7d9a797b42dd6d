//! End-to-end test of the full footprint pipeline
//!
//! Seeds a small store, runs flatten -> classify -> synthetic flows ->
//! inject -> verify against the stock rules, and checks the accounting
//! artifacts the run leaves behind.
//!
//! Run with: cargo test --test pipeline_e2e

use rand::rngs::StdRng;
use rand::SeedableRng;
use tempfile::tempdir;

use flowprint_core::{pipeline, verify, Category, PipelineConfig, QueryRegistry, ACCOUNTING_DB};
use flowprint_store::{
    Database, Exchange, ExchangeType, MethodKind, Process, ProcessKey, ProcessStore,
};

fn process(db: &str, code: &str, name: &str, exchanges: Vec<Exchange>) -> Process {
    Process {
        key: ProcessKey::new(db, code),
        name: name.to_string(),
        reference_product: name.trim_start_matches("market for ").to_string(),
        unit: "kilogram".to_string(),
        location: "GLO".to_string(),
        classifications: vec![("CPC".to_string(), "x".to_string())],
        exchanges,
    }
}

fn technosphere(db: &str, code: &str, name: &str, amount: f64, unit: &str) -> Exchange {
    Exchange {
        input: ProcessKey::new(db, code),
        name: name.to_string(),
        amount,
        unit: unit.to_string(),
        exchange_type: ExchangeType::Technosphere,
        location: None,
    }
}

/// The toy scenario: a chromium market with a hazardous waste exchange, a
/// coal market drawing on a natural gas market, and a bystander process.
fn seed(store: &ProcessStore) {
    let mut db = Database::new("toy");
    db.insert(process(
        "toy",
        "gas1",
        "market for natural gas, high pressure",
        vec![],
    ))
    .unwrap();
    db.insert(process(
        "toy",
        "chr1",
        "market for chromium",
        vec![technosphere(
            "toy",
            "w1",
            "waste chromium slag, hazardous",
            2.0,
            "kilogram",
        )],
    ))
    .unwrap();
    db.insert(process(
        "toy",
        "coal1",
        "market for coal",
        vec![technosphere(
            "toy",
            "gas1",
            "market for natural gas, high pressure",
            5.0,
            "cubic meter",
        )],
    ))
    .unwrap();
    db.insert(process("toy", "by1", "unrelated assembly", vec![]))
        .unwrap();
    store.save_database(&db).unwrap();
}

/// Registry narrowed to the rules the toy scenario exercises.
fn registry() -> QueryRegistry {
    QueryRegistry::builder()
        .waste_query(flowprint_core::WasteQuery {
            name: "hazardous".to_string(),
            unit: "kilogram".to_string(),
            all: vec!["waste".to_string()],
            any: vec!["hazardous".to_string(), "radioactive".to_string()],
            none: vec!["non-hazardous".to_string(), "non-radioactive".to_string()],
        })
        .material_query("market for natural gas,", "natural gas")
        .material_query("market for chromium", "chromium")
        .build()
        .unwrap()
}

#[test]
fn toy_scenario_end_to_end() {
    let dir = tempdir().unwrap();
    let store = ProcessStore::open(dir.path().join("store")).unwrap();
    seed(&store);

    let cfg = PipelineConfig {
        tmp_dir: dir.path().join("tmp"),
        results_dir: dir.path().join("results"),
        verify_attempts: 25,
        export_flat_csv: false,
        copy_suffix: None,
    };

    let summary =
        pipeline::run_all(&store, &registry(), &cfg, &["toy".to_string()], 1).unwrap();
    assert_eq!(summary.success_count(), 1);
    let db_summary = &summary.succeeded[0];

    // one waste match (chromium slag) and one material match (natural gas
    // drawn by the coal market); the chromium market itself has no matching
    // material exchange pointing at it
    assert_eq!(db_summary.waste_matched, 1);
    assert_eq!(db_summary.material_matched, 1);
    assert_eq!(db_summary.injected, 2);
    assert_eq!(db_summary.failed, 0);

    // exactly one injected exchange each on (a) and (b), none on (c)
    let db = store.load_database("toy").unwrap();
    let chromium = db.get("chr1").unwrap();
    assert_eq!(chromium.exchanges.len(), 2);
    let injected = chromium.exchanges.last().unwrap();
    assert_eq!(injected.input.database, ACCOUNTING_DB);
    assert_eq!(injected.input.code, "waste_hazardous-kilogram");
    assert_eq!(injected.amount, 2.0);
    assert_eq!(injected.exchange_type, ExchangeType::Biosphere);

    let coal = db.get("coal1").unwrap();
    assert_eq!(coal.exchanges.len(), 2);
    let injected = coal.exchanges.last().unwrap();
    assert_eq!(injected.input.code, "material_natural_gas");
    assert_eq!(injected.amount, 5.0);

    assert!(db.get("by1").unwrap().exchanges.is_empty());

    // accounting database holds one flow per registry category: the
    // hazardous waste category plus the two material groups
    let accounting = store.load_database(ACCOUNTING_DB).unwrap();
    assert_eq!(accounting.len(), 3);
    assert!(accounting.get("waste_hazardous-kilogram").is_some());
    assert!(accounting.get("material_natural_gas").is_some());
    assert!(accounting.get("material_chromium").is_some());

    // methods: -1.0 on the waste category, +1.0 on materials
    let methods = store.load_methods().unwrap();
    assert_eq!(methods.len(), 3);
    assert!(methods
        .of_kind(MethodKind::Waste)
        .iter()
        .all(|m| m.factor == -1.0));
    assert!(methods
        .of_kind(MethodKind::Material)
        .iter()
        .all(|m| m.factor == 1.0));

    // verifier over the mutated database returns without error
    let mut rng = StdRng::seed_from_u64(42);
    let report = verify(&db, &methods, 25, &mut rng).unwrap();
    assert!(report.score.is_finite());

    // audit CSVs exist for the non-empty categories
    let results = dir.path().join("results").join("toy");
    assert!(results.join("waste_hazardous-kilogram.csv").exists());
    assert!(results.join("material_activities.csv").exists());
    assert!(results.join("material_exchanges.csv").exists());
    assert!(results
        .join("grouped")
        .join("material_natural_gas.csv")
        .exists());
}

#[test]
fn rerun_reuses_cache_and_keeps_flows_unique() {
    let dir = tempdir().unwrap();
    let store = ProcessStore::open(dir.path().join("store")).unwrap();
    seed(&store);

    let cfg = PipelineConfig {
        tmp_dir: dir.path().join("tmp"),
        results_dir: dir.path().join("results"),
        verify_attempts: 5,
        export_flat_csv: false,
        // isolate each run in a fresh working copy so re-injection cannot
        // touch already-injected data
        copy_suffix: Some("_wmf".to_string()),
    };

    let registry = registry();
    pipeline::run_all(&store, &registry, &cfg, &["toy".to_string()], 1).unwrap();
    pipeline::run_all(&store, &registry, &cfg, &["toy".to_string()], 1).unwrap();

    // synthetic flows were not duplicated by the second run
    let accounting = store.load_database(ACCOUNTING_DB).unwrap();
    assert_eq!(accounting.len(), 3);
    assert_eq!(store.load_methods().unwrap().len(), 3);

    // the source database is untouched; the working copy carries injections
    let source = store.load_database("toy").unwrap();
    assert_eq!(source.exchange_count(), 2);
    let working = store.load_database("toy_wmf").unwrap();
    assert_eq!(working.exchange_count(), 4);
}

#[test]
fn default_rules_cover_the_toy_scenario() {
    // same scenario through the full stock registry instead of the narrowed
    // one: the hazardous query and both "total" queries match the slag, and
    // the gas exchange lands in the natural gas group
    let dir = tempdir().unwrap();
    let store = ProcessStore::open(dir.path().join("store")).unwrap();
    seed(&store);

    let cfg = PipelineConfig {
        tmp_dir: dir.path().join("tmp"),
        results_dir: dir.path().join("results"),
        verify_attempts: 5,
        export_flat_csv: false,
        copy_suffix: None,
    };
    let registry = QueryRegistry::default_rules();
    let summary =
        pipeline::run_all(&store, &registry, &cfg, &["toy".to_string()], 1).unwrap();
    let db_summary = &summary.succeeded[0];

    // slag matches hazardous + total at kilogram
    assert_eq!(db_summary.waste_matched, 2);
    assert_eq!(db_summary.material_matched, 1);

    // every registry category has exactly one flow, even unmatched ones
    let accounting = store.load_database(ACCOUNTING_DB).unwrap();
    let expected: Vec<Category> = registry.categories();
    assert_eq!(accounting.len(), expected.len());
    for category in expected {
        assert!(accounting.get(&category.code()).is_some());
    }
}
