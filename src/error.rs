// =============================================================================
// Error taxonomy for the quotescribe engine
// =============================================================================
//
// Only clock initialization is fatal: without a time reference every row we
// would write is worthless. Everything else degrades gracefully so that a
// transient feed or storage hiccup never loses already-cached state.
// =============================================================================

use thiserror::Error;

/// The one-shot authoritative time query at startup failed.
///
/// Fatal: the process aborts before the sampling loop starts.
#[derive(Debug, Error)]
pub enum ClockInitError {
    #[error("time source unreachable: {0}")]
    Unreachable(String),

    #[error("time source returned an unparseable response: {0}")]
    BadResponse(String),
}

/// A feed transport failure. Recoverable: logged at the spawn site, the
/// sampling loop simply sees empty batches until the stream is back.
#[derive(Debug, Error)]
pub enum FeedError {
    #[error("websocket connect failed: {0}")]
    Connect(String),

    #[error("websocket read failed: {0}")]
    Read(String),

    #[error("subscribe request failed: {0}")]
    Subscribe(String),
}

/// The persistence append failed. Recoverable: the dirty flag stays set and
/// the next tick retries with the accumulated state.
#[derive(Debug, Error)]
#[error("snapshot append failed: {0}")]
pub struct PersistenceError(pub String);

/// A symbol outside the configured set was handed to the cache.
///
/// The reconciler validates symbols before touching the cache, so this never
/// fires in normal operation; the contract exists for defensive correctness.
#[derive(Debug, Error)]
#[error("unknown symbol: {0}")]
pub struct UnknownSymbol(pub String);
