// =============================================================================
// Field Reconciler — apply a batch of raw feed updates against the quote cache
// =============================================================================
//
// LENIENCY POLICY: the upstream feed is treated as untrusted and noisy. A
// batch may carry heartbeat entries, symbols outside the configured set, tags
// we do not track, or malformed values. Each such item is skipped on its own;
// it never aborts reconciliation of the rest of the batch and never reaches
// the cache.
// =============================================================================

use serde_json::{Map, Value};
use tracing::debug;

use crate::quote::{FieldTag, QuoteCache};

/// One item from an inbound feed batch: a symbol key plus a raw mapping from
/// wire field-tag to value, exactly as decoded off the stream.
#[derive(Debug, Clone)]
pub struct RawFieldUpdate {
    pub symbol: String,
    pub fields: Map<String, Value>,
}

/// Apply `batch` against `cache`.
///
/// For every update, each of the seven known tags present in the raw mapping
/// is normalized and compared against the cached value; any actual change
/// raises the cache's aggregate dirty flag. Re-delivering values the cache
/// already holds is a no-op, so applying the same batch twice never flips the
/// flag on the second pass. An empty batch does nothing.
pub fn apply(cache: &mut QuoteCache, batch: &[RawFieldUpdate]) {
    for update in batch {
        if !cache.contains(&update.symbol) {
            debug!(symbol = %update.symbol, "update for untracked symbol skipped");
            continue;
        }

        for (key, raw) in &update.fields {
            // Non-tag keys ("key", service metadata) and tags we do not track
            // fall out here.
            let Some(tag) = FieldTag::from_wire(key) else {
                continue;
            };

            let Some(value) = tag.normalize(raw) else {
                debug!(
                    symbol = %update.symbol,
                    tag = tag.wire_tag(),
                    raw = %raw,
                    "malformed field value skipped"
                );
                continue;
            };

            // Symbol membership was checked above, so this cannot fail; if it
            // somehow does, the item is dropped like any other bad entry.
            if let Ok(true) = cache.set_if_changed(&update.symbol, tag, value) {
                cache.mark_dirty();
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

    fn syms(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn update(symbol: &str, fields: Value) -> RawFieldUpdate {
        RawFieldUpdate {
            symbol: symbol.to_string(),
            fields: fields.as_object().unwrap().clone(),
        }
    }

    #[test]
    fn empty_batch_is_a_noop() {
        let mut cache = QuoteCache::new(&syms(&["AAA"]));
        apply(&mut cache, &[]);
        assert!(!cache.is_dirty());
    }

    #[test]
    fn changed_field_sets_dirty_flag() {
        let mut cache = QuoteCache::new(&syms(&["AAA", "BBB"]));
        apply(&mut cache, &[update("AAA", json!({ "1": 101.5 }))]);

        assert!(cache.is_dirty());
        assert_eq!(cache.get("AAA").unwrap().bid_price, Some(101.5));
        assert_eq!(cache.get("BBB").unwrap().bid_price, None);
    }

    #[test]
    fn reapplying_same_batch_is_idempotent() {
        let mut cache = QuoteCache::new(&syms(&["AAA"]));
        let batch = vec![update("AAA", json!({ "1": 101.5, "2": 101.75, "4": 300 }))];

        apply(&mut cache, &batch);
        assert!(cache.is_dirty());
        cache.clear_dirty();

        // Same content again: nothing differs, the flag stays down.
        apply(&mut cache, &batch);
        assert!(!cache.is_dirty());
    }

    #[test]
    fn unknown_symbols_and_tags_never_mutate() {
        let mut cache = QuoteCache::new(&syms(&["AAA"]));
        let batch = vec![
            update("GHOST", json!({ "1": 999.0 })),
            update("AAA", json!({ "0": "AAA", "7": 12.0, "assetMainType": "EQUITY" })),
        ];

        apply(&mut cache, &batch);
        assert!(!cache.is_dirty());
        assert_eq!(cache.get("AAA").unwrap(), &crate::quote::QuoteRecord::default());
    }

    #[test]
    fn malformed_value_skipped_rest_of_batch_applies() {
        let mut cache = QuoteCache::new(&syms(&["AAA", "BBB"]));
        let batch = vec![
            update("AAA", json!({ "4": "not-a-size", "1": 50.0 })),
            update("BBB", json!({ "2": 51.25 })),
        ];

        apply(&mut cache, &batch);
        assert!(cache.is_dirty());
        assert_eq!(cache.get("AAA").unwrap().bid_size, None);
        assert_eq!(cache.get("AAA").unwrap().bid_price, Some(50.0));
        assert_eq!(cache.get("BBB").unwrap().ask_price, Some(51.25));
    }

    #[test]
    fn partial_update_touches_only_delivered_fields() {
        let mut cache = QuoteCache::new(&syms(&["AAA"]));
        apply(
            &mut cache,
            &[update("AAA", json!({ "10": 110.0, "11": 90.0 }))],
        );
        cache.clear_dirty();

        apply(&mut cache, &[update("AAA", json!({ "11": 89.5 }))]);
        assert!(cache.is_dirty());
        let rec = cache.get("AAA").unwrap();
        assert_eq!(rec.high_price, Some(110.0));
        assert_eq!(rec.low_price, Some(89.5));
    }

    #[test]
    fn high_field_stores_high_value() {
        // The high tag must land in the high field, not leak from another tag.
        let mut cache = QuoteCache::new(&syms(&["AAA"]));
        apply(
            &mut cache,
            &[update("AAA", json!({ "1": 100.0, "10": 112.5 }))],
        );
        let rec = cache.get("AAA").unwrap();
        assert_eq!(rec.bid_price, Some(100.0));
        assert_eq!(rec.high_price, Some(112.5));
    }
}
