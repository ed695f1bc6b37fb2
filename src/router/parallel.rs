//! Parallel execution strategy: concurrent fan-out under a shared
//! deadline.
//!
//! Every admitted candidate is dispatched at once; whichever complete
//! within their timeout contribute results. A provider that times out or
//! errors is recorded as a circuit-breaker failure without aborting its
//! siblings — the first failing dispatch never cancels the rest.

use std::sync::Arc;

use crate::admission::AdmissionControl;

use super::{dispatch_one, DispatchOutcome, PlannedDispatch};

/// Dispatch all planned candidates concurrently and collect every
/// outcome. Outcomes come back in candidate order regardless of
/// completion order.
pub(crate) async fn execute(
    admission: Arc<AdmissionControl>,
    planned: Vec<PlannedDispatch>,
) -> Vec<DispatchOutcome> {
    let dispatches: Vec<_> = planned
        .into_iter()
        .map(|dispatch| dispatch_one(Arc::clone(&admission), dispatch))
        .collect();
    futures::future::join_all(dispatches).await
}
