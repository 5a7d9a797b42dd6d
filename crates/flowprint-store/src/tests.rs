//! End-to-end tests for the process store

use super::*;
use tempfile::tempdir;

fn process(db: &str, code: &str, name: &str) -> Process {
    Process {
        key: ProcessKey::new(db, code),
        name: name.to_string(),
        reference_product: name.to_string(),
        unit: "kilogram".to_string(),
        location: "GLO".to_string(),
        classifications: vec![],
        exchanges: vec![],
    }
}

fn exchange(db: &str, code: &str, name: &str, amount: f64) -> Exchange {
    Exchange {
        input: ProcessKey::new(db, code),
        name: name.to_string(),
        amount,
        unit: "kilogram".to_string(),
        exchange_type: ExchangeType::Technosphere,
        location: None,
    }
}

#[test]
fn save_and_load_round_trip() {
    let dir = tempdir().unwrap();
    let store = ProcessStore::open(dir.path()).unwrap();

    let mut db = Database::new("base");
    let mut p = process("base", "p1", "market for chromium");
    p.exchanges.push(exchange("base", "p2", "chromium slag", 2.0));
    db.insert(p).unwrap();
    db.insert(process("base", "p2", "chromium slag treatment"))
        .unwrap();
    store.save_database(&db).unwrap();

    let loaded = store.load_database("base").unwrap();
    assert_eq!(loaded.len(), 2);
    assert_eq!(loaded.exchange_count(), 1);
    assert_eq!(
        loaded.get("p1").unwrap().exchanges[0].name,
        "chromium slag"
    );
}

#[test]
fn missing_database_is_an_error() {
    let dir = tempdir().unwrap();
    let store = ProcessStore::open(dir.path()).unwrap();
    let err = store.load_database("nope").unwrap_err();
    assert!(matches!(err, StoreError::DatabaseNotFound { .. }));
}

#[test]
fn list_databases_is_sorted() {
    let dir = tempdir().unwrap();
    let store = ProcessStore::open(dir.path()).unwrap();
    store.save_database(&Database::new("zeta")).unwrap();
    store.save_database(&Database::new("alpha")).unwrap();
    assert_eq!(store.list_databases().unwrap(), vec!["alpha", "zeta"]);
}

#[test]
fn insert_rejects_foreign_and_duplicate_keys() {
    let mut db = Database::new("base");
    let err = db.insert(process("other", "p1", "x")).unwrap_err();
    assert!(matches!(err, StoreError::ForeignKey { .. }));

    db.insert(process("base", "p1", "x")).unwrap();
    let err = db.insert(process("base", "p1", "y")).unwrap_err();
    assert!(matches!(err, StoreError::DuplicateProcess { .. }));
}

#[test]
fn append_exchange_preserves_existing_order() {
    let mut db = Database::new("base");
    let mut p = process("base", "p1", "x");
    p.exchanges.push(exchange("base", "a", "first", 1.0));
    p.exchanges.push(exchange("base", "b", "second", 2.0));
    db.insert(p).unwrap();

    db.append_exchange("p1", exchange("base", "c", "third", 3.0))
        .unwrap();

    let names: Vec<_> = db
        .get("p1")
        .unwrap()
        .exchanges
        .iter()
        .map(|ex| ex.name.as_str())
        .collect();
    assert_eq!(names, vec!["first", "second", "third"]);

    let err = db
        .append_exchange("ghost", exchange("base", "c", "x", 1.0))
        .unwrap_err();
    assert!(matches!(err, StoreError::ProcessNotFound { .. }));
}

#[test]
fn copy_database_rewrites_internal_keys_only() {
    let dir = tempdir().unwrap();
    let store = ProcessStore::open(dir.path()).unwrap();

    let mut db = Database::new("base");
    let mut p = process("base", "p1", "x");
    p.exchanges.push(exchange("base", "p2", "internal", 1.0));
    p.exchanges.push(exchange("biosphere", "co2", "external", 1.0));
    db.insert(p).unwrap();
    store.save_database(&db).unwrap();

    let copy = store.copy_database("base", "working").unwrap();
    let p = copy.get("p1").unwrap();
    assert_eq!(p.key.database, "working");
    assert_eq!(p.exchanges[0].input.database, "working");
    assert_eq!(p.exchanges[1].input.database, "biosphere");

    // original stays intact
    let base = store.load_database("base").unwrap();
    assert_eq!(base.get("p1").unwrap().key.database, "base");
}

#[test]
fn get_process_looks_up_across_database_files() {
    let dir = tempdir().unwrap();
    let store = ProcessStore::open(dir.path()).unwrap();

    let mut db = Database::new("base");
    db.insert(process("base", "p1", "x")).unwrap();
    store.save_database(&db).unwrap();

    let p = store.get_process(&ProcessKey::new("base", "p1")).unwrap();
    assert_eq!(p.name, "x");

    let err = store
        .get_process(&ProcessKey::new("base", "missing"))
        .unwrap_err();
    assert!(matches!(err, StoreError::ProcessNotFound { .. }));
}

#[test]
fn json_import_round_trip() {
    let dir = tempdir().unwrap();
    let store = ProcessStore::open(dir.path()).unwrap();

    let payload = serde_json::json!({
        "name": "scenario-2050",
        "processes": [{
            "code": "c1",
            "name": "market for chromium",
            "reference_product": "chromium",
            "unit": "kilogram",
            "location": "GLO",
            "exchanges": [
                {"name": "chromium", "amount": 1.0, "unit": "kilogram", "type": "production"},
                {"name": "waste chromium slag, hazardous", "amount": 2.0,
                 "unit": "kilogram", "type": "technosphere",
                 "input": ["scenario-2050", "c2"]}
            ]
        }]
    });
    let path = dir.path().join("snapshot.json");
    std::fs::write(&path, payload.to_string()).unwrap();

    let db = import_json(&store, &path).unwrap();
    assert_eq!(db.len(), 1);
    let p = db.get("c1").unwrap();
    assert_eq!(p.exchanges.len(), 2);
    // omitted input points at the owning process
    assert_eq!(p.exchanges[0].input, ProcessKey::new("scenario-2050", "c1"));
    assert_eq!(p.exchanges[1].input.code, "c2");
    assert!(store.contains("scenario-2050"));
}

#[test]
fn method_set_registration_is_idempotent() {
    let dir = tempdir().unwrap();
    let store = ProcessStore::open(dir.path()).unwrap();

    let method = Method {
        key: MethodKey {
            namespace: "Flowprint".to_string(),
            family: "Waste: hazardous".to_string(),
            code: "waste_hazardous-kilogram".to_string(),
        },
        kind: MethodKind::Waste,
        flow: ProcessKey::new("flowprint", "waste_hazardous-kilogram"),
        factor: -1.0,
        unit: "kilogram".to_string(),
        description: String::new(),
    };

    let mut methods = MethodSet::default();
    assert!(methods.register(method.clone()));
    assert!(!methods.register(method));
    assert_eq!(methods.len(), 1);

    store.save_methods(&methods).unwrap();
    let loaded = store.load_methods().unwrap();
    assert_eq!(loaded.len(), 1);
    assert_eq!(loaded.of_kind(MethodKind::Waste).len(), 1);
    assert_eq!(loaded.of_kind(MethodKind::Material).len(), 0);
}

#[test]
fn solver_scores_demand_against_flow() {
    let mut db = Database::new("base");
    let mut p = process("base", "p1", "x");
    p.exchanges
        .push(exchange("flowprint", "waste_total-kilogram", "waste total", 3.0));
    p.exchanges.push(exchange("base", "p2", "unrelated", 9.0));
    db.insert(p).unwrap();

    let method = Method {
        key: MethodKey {
            namespace: "Flowprint".to_string(),
            family: "Waste: total".to_string(),
            code: "waste_total-kilogram".to_string(),
        },
        kind: MethodKind::Waste,
        flow: ProcessKey::new("flowprint", "waste_total-kilogram"),
        factor: -1.0,
        unit: "kilogram".to_string(),
        description: String::new(),
    };

    let demand = vec![(ProcessKey::new("base", "p1"), 2.0)];
    let score = solver::score(&db, &demand, &method).unwrap();
    assert_eq!(score, -6.0);

    let err = solver::score(&db, &[], &method).unwrap_err();
    assert!(matches!(err, SolverError::EmptyDemand));
}
