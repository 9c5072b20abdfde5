//! Wall-clock budget for a scrape
//!
//! Waits inside a scrape are synchronous and cannot be cancelled cooperatively. The
//! supervisor runs the scrape on a blocking worker and, when the budget runs out,
//! tears the session down; the worker's next browser call then fails as a session
//! failure and it unwinds on its own.

use crate::browser::{PageDriver, Teardown};
use crate::model::SearchRequest;
use crate::orchestrator::{FailureCause, ScrapeOutcome};
use std::sync::Arc;
use std::time::Duration;

/// Tears the session down when dropped, including when the supervising future is
/// itself dropped (e.g. on Ctrl-C)
struct TeardownGuard<S: Teardown>(Arc<S>);

impl<S: Teardown> Drop for TeardownGuard<S> {
    fn drop(&mut self) {
        self.0.teardown();
    }
}

/// Run `job` against `session` within `budget`; the session is torn down on every
/// exit path.
///
/// An expired budget or a panicking job yields an empty outcome failed with
/// [`FailureCause::Session`].
pub async fn run_with_budget<S, F>(session: Arc<S>, budget: Duration, request: SearchRequest, job: F) -> ScrapeOutcome
where
    S: PageDriver + Teardown + 'static,
    F: FnOnce(&S, &SearchRequest) -> ScrapeOutcome + Send + 'static,
{
    let _guard = TeardownGuard(Arc::clone(&session));

    let worker_request = request.clone();
    let worker = tokio::task::spawn_blocking(move || job(&*session, &worker_request));

    match tokio::time::timeout(budget, worker).await {
        Ok(Ok(outcome)) => outcome,
        Ok(Err(e)) => {
            log::error!("Scrape worker failed: {}", e);
            ScrapeOutcome::failed(&request, FailureCause::Session(format!("scrape worker failed: {}", e)))
        }
        Err(_) => {
            log::error!("Scrape budget of {:?} exceeded, tearing down the session", budget);
            ScrapeOutcome::failed(&request, FailureCause::Session(format!("budget of {:?} exceeded", budget)))
        }
    }
}
