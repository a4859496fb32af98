// =============================================================================
// Sampling Loop — fixed-cadence reconcile-then-flush cycle
// =============================================================================
//
// Each tick: pull the latest published batch (or nothing), reconcile it into
// the cache, compute the drift-corrected time, and flush if anything changed.
// The cache is owned by this loop's call chain alone; the listener only ever
// touches the batch slot, so no lock guards the cache.
// =============================================================================

use std::sync::Arc;

use tokio::time::{interval, Duration};
use tracing::{info, warn};

use crate::clock::DriftClock;
use crate::feed::LatestBatch;
use crate::quote::QuoteCache;
use crate::reconcile;
use crate::snapshot::{self, SnapshotSink};

/// One full tick: consume the slot, reconcile, stamp, flush.
///
/// A persistence failure is reported and left for the next tick; the dirty
/// flag survives it, so nothing is lost.
pub fn tick_once(
    cache: &mut QuoteCache,
    slot: &LatestBatch,
    clock: &DriftClock,
    sink: &mut impl SnapshotSink,
) {
    if let Some(batch) = slot.take() {
        reconcile::apply(cache, &batch);
    }

    let timestamp = DriftClock::timestamp_string(clock.now());

    match snapshot::flush_if_dirty(cache, timestamp, sink) {
        Ok(true) => info!("snapshot row flushed"),
        Ok(false) => {}
        Err(e) => warn!(error = %e, "snapshot flush failed; retrying next tick"),
    }
}

/// Run the sampling loop until the process shuts down.
///
/// The cadence is fixed and configured; no tick blocks indefinitely, so no
/// cancellation token is needed beyond process termination.
pub async fn run_sampling_loop(
    mut cache: QuoteCache,
    slot: Arc<LatestBatch>,
    clock: DriftClock,
    mut sink: impl SnapshotSink,
    interval_ms: u64,
) {
    info!(interval_ms, "sampling loop starting");
    let mut ticker = interval(Duration::from_millis(interval_ms));

    loop {
        ticker.tick().await;
        tick_once(&mut cache, &slot, &clock, &mut sink);
    }
}

// -----------------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------------
