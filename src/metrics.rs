use metrics::{counter, histogram};
use tracing::trace;

pub fn inc_requests(route: &'static str) {
    counter!("itemlens_requests_total", "route" => route).increment(1);
    trace!(
        target: "itemlens.metrics",
        route = route,
        "requests_total_inc"
    );
}

pub fn stage_elapsed(stage: &'static str, elapsed_ms: u128) {
    histogram!("itemlens_stage_duration_ms", "stage" => stage).record(elapsed_ms as f64);
    trace!(
        target: "itemlens.metrics",
        stage = stage,
        elapsed_ms = elapsed_ms as u64,
        "stage_elapsed"
    );
}

pub fn enrichment_outcome(outcome: &'static str) {
    counter!("itemlens_enrichment_total", "outcome" => outcome).increment(1);
    trace!(
        target: "itemlens.metrics",
        outcome = outcome,
        "enrichment_outcome"
    );
}
