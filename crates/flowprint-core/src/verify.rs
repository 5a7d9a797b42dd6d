//! Sampling verifier: advisory sanity check over a mutated database.
//!
//! Scores one random process against one random footprint method, retrying up
//! to the attempt budget when the sample comes back exactly zero. A zero
//! score is not an error (plenty of activity/method pairs are legitimately
//! zero); the verifier just wants one informative non-zero sample for a human
//! to eyeball. Solver errors are retryable sampling failures. The last sample
//! is returned either way. Passing verification certifies only that the
//! database does not error when queried, not that injection was complete.

use rand::Rng;

use flowprint_store::{solver, Database, MethodKey, MethodSet, ProcessKey};

use crate::PipelineError;

#[derive(Debug, Clone)]
pub struct VerifyReport {
    pub score: f64,
    pub method: MethodKey,
    pub activity: String,
    /// How many samples were drawn before settling on this one.
    pub samples: u32,
}

/// Sample the database through the scoring surface.
pub fn verify(
    db: &Database,
    methods: &MethodSet,
    attempts: u32,
    rng: &mut impl Rng,
) -> Result<VerifyReport, PipelineError> {
    if db.is_empty() {
        return Err(PipelineError::EmptyDatabase {
            name: db.name.clone(),
        });
    }
    if methods.is_empty() {
        return Err(PipelineError::NoMethods);
    }

    let processes: Vec<_> = db.processes().collect();
    let methods: Vec<_> = methods.iter().collect();

    let mut last: Option<VerifyReport> = None;
    let mut last_err: Option<PipelineError> = None;

    for attempt in 1..=attempts.max(1) {
        let process = processes[rng.gen_range(0..processes.len())];
        let method = methods[rng.gen_range(0..methods.len())];
        let demand = vec![(ProcessKey::new(&db.name, &process.key.code), 1.0)];

        match solver::score(db, &demand, method) {
            Ok(score) => {
                let report = VerifyReport {
                    score,
                    method: method.key.clone(),
                    activity: process.name.clone(),
                    samples: attempt,
                };
                if score != 0.0 {
                    tracing::info!(
                        database = %db.name,
                        score,
                        method = %report.method,
                        activity = %report.activity,
                        "verification sample is non-zero"
                    );
                    return Ok(report);
                }
                last = Some(report);
            }
            Err(err) => {
                tracing::warn!(
                    database = %db.name,
                    method = %method.key,
                    error = %err,
                    "verification sample errored, retrying"
                );
                last_err = Some(err.into());
            }
        }
    }

    match last {
        Some(report) => {
            tracing::info!(
                database = %db.name,
                samples = report.samples,
                "verification budget exhausted without a non-zero sample"
            );
            Ok(report)
        }
        // every attempt errored
        None => Err(last_err.unwrap_or(PipelineError::NoMethods)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowprint_store::{
        Exchange, ExchangeType, Method, MethodKind, Process, ProcessKey,
    };
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn flow_key() -> ProcessKey {
        ProcessKey::new("flowprint", "waste_total-kilogram")
    }

    fn method() -> Method {
        Method {
            key: MethodKey {
                namespace: "Flowprint".to_string(),
                family: "Waste: total".to_string(),
                code: "waste_total-kilogram".to_string(),
            },
            kind: MethodKind::Waste,
            flow: flow_key(),
            factor: -1.0,
            unit: "kilogram".to_string(),
            description: String::new(),
        }
    }

    fn db_with_injected(amount: f64) -> Database {
        let mut db = Database::new("base");
        let key = ProcessKey::new("base", "p1");
        db.insert(Process {
            key: key.clone(),
            name: "activity".to_string(),
            reference_product: "product".to_string(),
            unit: "kilogram".to_string(),
            location: "GLO".to_string(),
            classifications: vec![],
            exchanges: vec![Exchange {
                input: flow_key(),
                name: "Waste footprint: total [kilogram]".to_string(),
                amount,
                unit: "kilogram".to_string(),
                exchange_type: ExchangeType::Biosphere,
                location: None,
            }],
        })
        .unwrap();
        db
    }

    fn methods() -> MethodSet {
        let mut set = MethodSet::default();
        set.register(method());
        set
    }

    #[test]
    fn finds_non_zero_sample() {
        let db = db_with_injected(3.0);
        let mut rng = StdRng::seed_from_u64(7);
        let report = verify(&db, &methods(), 5, &mut rng).unwrap();
        assert_eq!(report.score, -3.0);
        assert_eq!(report.activity, "activity");
    }

    #[test]
    fn zero_scores_exhaust_budget_and_return_last_sample() {
        let db = db_with_injected(0.0);
        let mut rng = StdRng::seed_from_u64(7);
        let report = verify(&db, &methods(), 4, &mut rng).unwrap();
        assert_eq!(report.score, 0.0);
        assert_eq!(report.samples, 4);
    }

    #[test]
    fn empty_database_is_an_error() {
        let db = Database::new("base");
        let mut rng = StdRng::seed_from_u64(7);
        let err = verify(&db, &methods(), 5, &mut rng).unwrap_err();
        assert!(matches!(err, PipelineError::EmptyDatabase { .. }));
    }

    #[test]
    fn no_methods_is_an_error() {
        let db = db_with_injected(1.0);
        let mut rng = StdRng::seed_from_u64(7);
        let err = verify(&db, &MethodSet::default(), 5, &mut rng).unwrap_err();
        assert!(matches!(err, PipelineError::NoMethods));
    }
}
