// =============================================================================
// Feed Listener — level-one equities push stream
// =============================================================================
//
// Runs on its own task, driven by the transport's delivery. The only state it
// shares with the sampling loop is the single-slot latest-batch holder below:
// a new batch replaces any unconsumed one, so memory stays bounded no matter
// how fast the feed runs, and staleness is capped at one tick interval.
// =============================================================================

use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

use crate::error::FeedError;
use crate::quote::FieldTag;
use crate::reconcile::RawFieldUpdate;

// -----------------------------------------------------------------------------
// Latest-batch slot
// -----------------------------------------------------------------------------

/// Single-slot handoff between the listener and the sampling loop.
///
/// `publish` overwrites, `take` swaps-and-clears, so the reader never sees a
/// half-written batch and the writer never blocks on the reader. There is no
/// queue by design: only the most recent batch matters to the sampler.
#[derive(Default)]
pub struct LatestBatch {
    slot: Mutex<Option<Vec<RawFieldUpdate>>>,
}

impl LatestBatch {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Publish a decoded batch, replacing any batch the sampler has not
    /// consumed yet.
    pub fn publish(&self, batch: Vec<RawFieldUpdate>) {
        *self.slot.lock() = Some(batch);
    }

    /// Consume the latest batch, leaving the slot empty.
    pub fn take(&self) -> Option<Vec<RawFieldUpdate>> {
        self.slot.lock().take()
    }
}

// -----------------------------------------------------------------------------
// Message decoding
// -----------------------------------------------------------------------------

/// Decode one inbound stream message.
///
/// Heartbeats and other `notify` control frames yield `None`, as does
/// anything that fails to parse; a `data` frame yields the content entries of
/// its first data block as raw field updates. Entries without a symbol key
/// are dropped here so the reconciler only ever sees keyed updates.
pub fn decode_stream_message(text: &str) -> Option<Vec<RawFieldUpdate>> {
    let root: serde_json::Value = match serde_json::from_str(text) {
        Ok(v) => v,
        Err(e) => {
            warn!(error = %e, "unparseable stream message dropped");
            return None;
        }
    };

    if root.get("notify").is_some() {
        debug!("control frame discarded");
        return None;
    }

    let content = root
        .get("data")
        .and_then(|d| d.as_array())
        .and_then(|entries| entries.first())
        .and_then(|entry| entry.get("content"))
        .and_then(|c| c.as_array())?;

    let batch: Vec<RawFieldUpdate> = content
        .iter()
        .filter_map(|item| {
            let symbol = item.get("key")?.as_str()?.to_string();
            let fields = item.as_object()?.clone();
            Some(RawFieldUpdate { symbol, fields })
        })
        .collect();

    Some(batch)
}

/// Build the level-one equities subscribe frame for `symbols`.
fn subscribe_frame(symbols: &[String]) -> String {
    serde_json::json!({
        "requests": [{
            "service": "LEVELONE_EQUITIES",
            "requestid": "1",
            "command": "SUBS",
            "parameters": {
                "keys": symbols.join(","),
                "fields": FieldTag::subscribe_fields(),
            }
        }]
    })
    .to_string()
}

// -----------------------------------------------------------------------------
// Stream task
// -----------------------------------------------------------------------------

/// Connect to the push-stream endpoint, subscribe, and publish every decoded
/// batch into `slot`.
///
/// Runs until the stream disconnects or an error occurs, then returns so the
/// spawn site (main.rs) can handle reconnection. The sampling loop sees empty
/// batches while the stream is down; it never crashes on transport trouble.
pub async fn run_feed_stream(
    url: &str,
    symbols: &[String],
    slot: &Arc<LatestBatch>,
) -> Result<(), FeedError> {
    info!(url = %url, symbols = symbols.len(), "connecting to quote stream");

    let (ws_stream, _response) = connect_async(url)
        .await
        .map_err(|e| FeedError::Connect(e.to_string()))?;

    info!("quote stream connected");
    let (mut write, mut read) = ws_stream.split();

    write
        .send(Message::Text(subscribe_frame(symbols)))
        .await
        .map_err(|e| FeedError::Subscribe(e.to_string()))?;

    loop {
        match read.next().await {
            Some(Ok(Message::Text(text))) => {
                if let Some(batch) = decode_stream_message(&text) {
                    debug!(updates = batch.len(), "batch published");
                    slot.publish(batch);
                }
            }
            Some(Ok(_)) => {
                // Ping/pong and binary frames are transport noise here.
            }
            Some(Err(e)) => {
                error!(error = %e, "quote stream read error");
                return Err(FeedError::Read(e.to_string()));
            }
            None => {
                warn!("quote stream ended");
                return Ok(());
            }
        }
    }
}

// -----------------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn heartbeat_notify_is_discarded() {
        let msg = r#"{"notify":[{"heartbeat":"1724668800123"}]}"#;
        assert!(decode_stream_message(msg).is_none());
    }

    #[test]
    fn non_heartbeat_notify_is_also_discarded() {
        let msg = r#"{"notify":[{"service":"ADMIN","content":{"code":30}}]}"#;
        assert!(decode_stream_message(msg).is_none());
    }

    #[test]
    fn garbage_is_discarded() {
        assert!(decode_stream_message("not json at all").is_none());
        assert!(decode_stream_message(r#"{"response":[{"command":"SUBS"}]}"#).is_none());
    }

    #[test]
    fn data_frame_decodes_to_updates() {
        let msg = r#"{
            "data": [{
                "service": "LEVELONE_EQUITIES",
                "timestamp": 1724668800123,
                "content": [
                    { "key": "AAA", "1": 101.5, "4": 300 },
                    { "key": "BBB", "29": 55.0 }
                ]
            }]
        }"#;

        let batch = decode_stream_message(msg).expect("should decode");
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[0].symbol, "AAA");
        assert_eq!(batch[0].fields.get("1"), Some(&json!(101.5)));
        assert_eq!(batch[1].symbol, "BBB");
        assert_eq!(batch[1].fields.get("29"), Some(&json!(55.0)));
    }

    #[test]
    fn keyless_entries_are_dropped() {
        let msg = r#"{
            "data": [{
                "content": [
                    { "1": 101.5 },
                    { "key": "AAA", "2": 102.0 }
                ]
            }]
        }"#;

        let batch = decode_stream_message(msg).expect("should decode");
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].symbol, "AAA");
    }

    #[test]
    fn slot_overwrites_unconsumed_batch() {
        let slot = LatestBatch::new();

        slot.publish(vec![RawFieldUpdate {
            symbol: "AAA".into(),
            fields: serde_json::Map::new(),
        }]);
        slot.publish(vec![RawFieldUpdate {
            symbol: "BBB".into(),
            fields: serde_json::Map::new(),
        }]);

        // Only the most recent batch survives.
        let batch = slot.take().expect("slot should hold a batch");
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].symbol, "BBB");

        // Slot is cleared by the take.
        assert!(slot.take().is_none());
    }

    #[tokio::test]
    async fn connect_failure_surfaces_as_transport_error() {
        let slot = LatestBatch::new();
        // A malformed endpoint fails during request construction, before any
        // network traffic.
        let err = run_feed_stream("not a websocket url", &["AAA".to_string()], &slot)
            .await
            .expect_err("connect should fail");
        assert!(matches!(err, FeedError::Connect(_)));
        assert!(slot.take().is_none());
    }

    #[test]
    fn subscribe_frame_carries_keys_and_fields() {
        let frame = subscribe_frame(&["AAA".into(), "BBB".into()]);
        let parsed: serde_json::Value = serde_json::from_str(&frame).unwrap();
        let req = &parsed["requests"][0];
        assert_eq!(req["command"], "SUBS");
        assert_eq!(req["parameters"]["keys"], "AAA,BBB");
        assert_eq!(req["parameters"]["fields"], "0,1,2,4,5,10,11,29");
    }
}
