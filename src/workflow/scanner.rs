//! Automatic transition scanner.
//!
//! Periodically walks every in-flight application and fires the first
//! automatic transition whose conditions hold. Policy: one hop per
//! application per pass — if the new stage also has a satisfied
//! automatic transition, it fires on the next tick, not in the same
//! pass. Races with manual transitions are resolved by the engine's
//! version check; the scanner just logs the lost race and moves on.

use std::time::Duration;

use rusqlite::Connection;

use crate::auth::session::Actor;
use crate::db::DbPool;
use crate::errors::AppError;
use crate::models::application;
use crate::workflow::engine;

#[derive(Debug, Default, Clone, Copy)]
pub struct ScanOutcome {
    pub scanned: usize,
    pub fired: usize,
}

/// One scanner pass over all in-flight applications.
pub fn scan_once(conn: &mut Connection) -> Result<ScanOutcome, AppError> {
    let ids = application::list_in_flight_ids(conn)?;
    let mut outcome = ScanOutcome { scanned: ids.len(), fired: 0 };
    let system = Actor::system();

    for application_id in ids {
        let transition = match engine::evaluate_automatic(conn, application_id) {
            Ok(Some(t)) => t,
            Ok(None) => continue,
            Err(e) => {
                log::error!("Scanner: evaluate failed for application {}: {}", application_id, e);
                continue;
            }
        };

        match engine::execute_transition(conn, application_id, transition.id, &system, None) {
            Ok(record) => {
                outcome.fired += 1;
                log::info!(
                    "Scanner: application {} auto-advanced to '{}' via '{}'",
                    application_id,
                    record.status,
                    transition.name
                );
            }
            Err(AppError::InvalidTransition(reason)) => {
                // Lost a race against a manual transition; next tick
                // re-evaluates from the new stage.
                log::warn!("Scanner: application {} skipped: {}", application_id, reason);
            }
            Err(e) => {
                log::error!("Scanner: transition failed for application {}: {}", application_id, e);
            }
        }
    }
    Ok(outcome)
}

/// Recurring scanner task on the actix runtime.
pub fn spawn_scanner(pool: DbPool, interval_secs: u64) {
    actix_web::rt::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));
        loop {
            interval.tick().await;
            let mut conn = match pool.get() {
                Ok(c) => c,
                Err(e) => {
                    log::error!("Scanner: failed to get DB connection: {}", e);
                    continue;
                }
            };
            match scan_once(&mut conn) {
                Ok(outcome) if outcome.fired > 0 => {
                    log::info!(
                        "Scanner pass: {} scanned, {} advanced",
                        outcome.scanned,
                        outcome.fired
                    );
                }
                Ok(_) => {}
                Err(e) => log::error!("Scanner pass failed: {}", e),
            }
        }
    });
}
