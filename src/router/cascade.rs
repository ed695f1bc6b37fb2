//! Cascade execution strategy: sequential dispatch with an adequacy
//! stop.
//!
//! Candidates are tried highest-scored first, each with its own timeout.
//! Once the accumulated result count reaches the adequacy threshold the
//! cascade stops — remaining candidates are never dispatched and cost
//! nothing. Admission denials and failures skip to the next candidate.

use std::sync::Arc;

use crate::admission::AdmissionControl;

use super::{dispatch_one, DispatchOutcome, PlannedDispatch};

/// Dispatch candidates in order until `adequacy` results have
/// accumulated or the candidates run out.
pub(crate) async fn execute(
    admission: Arc<AdmissionControl>,
    planned: Vec<PlannedDispatch>,
    adequacy: usize,
) -> Vec<DispatchOutcome> {
    let mut outcomes = Vec::new();
    let mut accumulated = 0usize;

    for dispatch in planned {
        if adequacy > 0 && accumulated >= adequacy {
            tracing::debug!(accumulated, adequacy, "cascade adequacy met, stopping");
            break;
        }
        let outcome = dispatch_one(Arc::clone(&admission), dispatch).await;
        if let DispatchOutcome::Success { results, .. } = &outcome {
            accumulated += results.len();
        }
        outcomes.push(outcome);
    }
    outcomes
}
