use std::sync::Arc;

use log::{error, info};
use rusqlite::Connection;
use tokio::sync::broadcast;

use crate::algorithms::GeneticEngine;
use crate::config::RunConfig;
use crate::diagnostics;
use crate::error::Error;
use crate::loader;
use crate::materializer::SolutionMaterializer;
use crate::models::{ProgressRecord, RunReport};

/// Validates, loads, searches, diagnoses and commits one scope.
///
/// Only a bad configuration or an unusable catalogue is an `Err`. A failed
/// commit still returns the report, marked as not materialized.
pub fn run_scope(
    conn: &mut Connection,
    config: RunConfig,
    status_tx: Option<broadcast::Sender<ProgressRecord>>,
) -> Result<RunReport, Error> {
    config.validate()?;
    let scope = config.scope();
    let snapshot = Arc::new(loader::load_all(conn, &scope, &config.days)?);

    let outcome = GeneticEngine::new(Arc::clone(&snapshot), config, status_tx).optimize();
    let failures = diagnostics::report(&snapshot, &outcome);

    let (committed, materialized, persistence_error, failures) =
        match SolutionMaterializer::new(conn).commit(&snapshot, &outcome.best, failures.clone()) {
            Ok(result) => (result.committed, true, None, result.failures),
            Err(err) => {
                error!("run for stream {} not materialized: {err}", scope.stream_id);
                (0, false, Some(err.to_string()), failures)
            }
        };

    info!(
        "run for stream {} semester {} {}: {} placements committed, {} failures",
        scope.stream_id,
        scope.semester,
        scope.academic_year,
        committed,
        failures.len()
    );

    Ok(RunReport {
        seed: outcome.seed,
        termination: outcome.termination,
        generations: outcome.generations,
        best_fitness: outcome.score,
        fitness_history: outcome.history,
        schedule: outcome.best,
        failures,
        committed,
        materialized,
        persistence_error,
        elapsed_ms: outcome.elapsed.as_millis(),
    })
}
