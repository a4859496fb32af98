// =============================================================================
// Quote Cache — per-symbol last-known-value store with an aggregate dirty flag
// =============================================================================
//
// The cache is touched only by the sampling loop's own call chain (reconcile
// then flush) and never from the feed listener context, so it carries no lock.
// Introducing concurrent mutation would require a mutex around the whole
// reconcile + dispatch sequence.
// =============================================================================

use std::collections::HashMap;

use crate::error::UnknownSymbol;

// -----------------------------------------------------------------------------
// Field tags
// -----------------------------------------------------------------------------

/// The seven level-one quote fields we track, identified by the feed's stable
/// numeric wire tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldTag {
    BidPrice,
    AskPrice,
    BidSize,
    AskSize,
    HighPrice,
    LowPrice,
    ClosePrice,
}

impl FieldTag {
    /// All tracked fields in fixed column order. This order determines both
    /// the header layout and every snapshot row.
    pub const ALL: [FieldTag; 7] = [
        FieldTag::BidPrice,
        FieldTag::AskPrice,
        FieldTag::BidSize,
        FieldTag::AskSize,
        FieldTag::HighPrice,
        FieldTag::LowPrice,
        FieldTag::ClosePrice,
    ];

    /// Numeric tag used on the wire (level-one equities field numbers).
    pub fn wire_tag(self) -> &'static str {
        match self {
            FieldTag::BidPrice => "1",
            FieldTag::AskPrice => "2",
            FieldTag::BidSize => "4",
            FieldTag::AskSize => "5",
            FieldTag::HighPrice => "10",
            FieldTag::LowPrice => "11",
            FieldTag::ClosePrice => "29",
        }
    }

    /// Comma-separated wire tags for the subscribe request, with the leading
    /// "0" key field the feed requires.
    pub fn subscribe_fields() -> &'static str {
        "0,1,2,4,5,10,11,29"
    }

    pub fn from_wire(tag: &str) -> Option<FieldTag> {
        match tag {
            "1" => Some(FieldTag::BidPrice),
            "2" => Some(FieldTag::AskPrice),
            "4" => Some(FieldTag::BidSize),
            "5" => Some(FieldTag::AskSize),
            "10" => Some(FieldTag::HighPrice),
            "11" => Some(FieldTag::LowPrice),
            "29" => Some(FieldTag::ClosePrice),
            _ => None,
        }
    }

    /// Human-readable name used in the output header.
    pub fn column_name(self) -> &'static str {
        match self {
            FieldTag::BidPrice => "bid_price",
            FieldTag::AskPrice => "ask_price",
            FieldTag::BidSize => "bid_size",
            FieldTag::AskSize => "ask_size",
            FieldTag::HighPrice => "high_price",
            FieldTag::LowPrice => "low_price",
            FieldTag::ClosePrice => "close_price",
        }
    }

    /// Convert a raw feed value into the canonical representation for this
    /// field. Prices are decimals, sizes are integers; anything else is
    /// malformed and yields `None` so the caller can skip it.
    ///
    /// Normalizing before comparison is what keeps change detection honest:
    /// equality is always evaluated between two canonical values, never
    /// between mismatched raw representations.
    pub fn normalize(self, raw: &serde_json::Value) -> Option<FieldValue> {
        match self {
            FieldTag::BidPrice
            | FieldTag::AskPrice
            | FieldTag::HighPrice
            | FieldTag::LowPrice
            | FieldTag::ClosePrice => raw.as_f64().map(FieldValue::Price),
            FieldTag::BidSize | FieldTag::AskSize => match raw.as_u64() {
                Some(n) => Some(FieldValue::Size(n)),
                // Some venues deliver sizes as integral floats.
                None => raw.as_f64().and_then(|f| {
                    if f >= 0.0 && f.fract() == 0.0 {
                        Some(FieldValue::Size(f as u64))
                    } else {
                        None
                    }
                }),
            },
        }
    }
}

// -----------------------------------------------------------------------------
// Field values
// -----------------------------------------------------------------------------

/// Canonical value for a quote field: one representation per field kind, so
/// exact-equality change detection never compares across numeric types.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldValue {
    Price(f64),
    Size(u64),
}

impl FieldValue {
    /// Render for an output cell.
    pub fn cell(self) -> String {
        match self {
            FieldValue::Price(p) => p.to_string(),
            FieldValue::Size(n) => n.to_string(),
        }
    }
}

// -----------------------------------------------------------------------------
// Quote record
// -----------------------------------------------------------------------------

/// Last-known values for a single symbol. Every field starts unset and stays
/// unset until the feed first delivers it; unset fields serialize as empty
/// cells, never as zero.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QuoteRecord {
    pub bid_price: Option<f64>,
    pub ask_price: Option<f64>,
    pub bid_size: Option<u64>,
    pub ask_size: Option<u64>,
    pub high_price: Option<f64>,
    pub low_price: Option<f64>,
    pub close_price: Option<f64>,
}

impl QuoteRecord {
    pub fn get(&self, tag: FieldTag) -> Option<FieldValue> {
        match tag {
            FieldTag::BidPrice => self.bid_price.map(FieldValue::Price),
            FieldTag::AskPrice => self.ask_price.map(FieldValue::Price),
            FieldTag::BidSize => self.bid_size.map(FieldValue::Size),
            FieldTag::AskSize => self.ask_size.map(FieldValue::Size),
            FieldTag::HighPrice => self.high_price.map(FieldValue::Price),
            FieldTag::LowPrice => self.low_price.map(FieldValue::Price),
            FieldTag::ClosePrice => self.close_price.map(FieldValue::Price),
        }
    }

    fn set(&mut self, tag: FieldTag, value: FieldValue) {
        match (tag, value) {
            (FieldTag::BidPrice, FieldValue::Price(p)) => self.bid_price = Some(p),
            (FieldTag::AskPrice, FieldValue::Price(p)) => self.ask_price = Some(p),
            (FieldTag::BidSize, FieldValue::Size(n)) => self.bid_size = Some(n),
            (FieldTag::AskSize, FieldValue::Size(n)) => self.ask_size = Some(n),
            (FieldTag::HighPrice, FieldValue::Price(p)) => self.high_price = Some(p),
            (FieldTag::LowPrice, FieldValue::Price(p)) => self.low_price = Some(p),
            (FieldTag::ClosePrice, FieldValue::Price(p)) => self.close_price = Some(p),
            // normalize() guarantees kind/tag agreement; a mismatch here is a
            // caller bug and is dropped rather than stored wrong.
            _ => {}
        }
    }

    /// Render the field for an output cell, empty string when unset.
    pub fn value_cell(&self, tag: FieldTag) -> String {
        self.get(tag).map(FieldValue::cell).unwrap_or_default()
    }
}

// -----------------------------------------------------------------------------
// Quote cache
// -----------------------------------------------------------------------------

/// In-memory store of every tracked symbol's `QuoteRecord`, plus one
/// aggregate dirty flag.
///
/// Invariant: `dirty` is true iff at least one field changed since the last
/// successful flush.
pub struct QuoteCache {
    /// Configured symbol order. Significant: it fixes the output column order
    /// regardless of update arrival order.
    symbols: Vec<String>,
    records: HashMap<String, QuoteRecord>,
    dirty: bool,
}

impl QuoteCache {
    /// Build a cache for the configured symbol set. All records start with
    /// every field unset and the dirty flag false.
    pub fn new(symbols: &[String]) -> Self {
        let records = symbols
            .iter()
            .map(|s| (s.clone(), QuoteRecord::default()))
            .collect();
        Self {
            symbols: symbols.to_vec(),
            records,
            dirty: false,
        }
    }

    /// Symbols in configured (output column) order.
    pub fn symbols(&self) -> &[String] {
        &self.symbols
    }

    pub fn contains(&self, symbol: &str) -> bool {
        self.records.contains_key(symbol)
    }

    pub fn get(&self, symbol: &str) -> Result<&QuoteRecord, UnknownSymbol> {
        self.records
            .get(symbol)
            .ok_or_else(|| UnknownSymbol(symbol.to_string()))
    }

    /// Compare `value` to the cached field using exact equality on the
    /// canonical representation; assign and return `true` only if different.
    /// Does not touch the dirty flag; aggregation is the reconciler's job.
    pub fn set_if_changed(
        &mut self,
        symbol: &str,
        tag: FieldTag,
        value: FieldValue,
    ) -> Result<bool, UnknownSymbol> {
        let record = self
            .records
            .get_mut(symbol)
            .ok_or_else(|| UnknownSymbol(symbol.to_string()))?;

        if record.get(tag) == Some(value) {
            return Ok(false);
        }
        record.set(tag, value);
        Ok(true)
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    /// Called by the dispatcher only after a successful persistence append.
    pub fn clear_dirty(&mut self) {
        self.dirty = false;
    }
}

// -----------------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------------
