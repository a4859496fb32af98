// =============================================================================
// Runtime Configuration — symbol roster, cadence, and endpoints
// =============================================================================
//
// Persistence uses an atomic tmp + rename pattern to prevent corruption on
// crash. All fields carry `#[serde(default)]` so that adding new fields never
// breaks loading an older config file.
// =============================================================================

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

// =============================================================================
// Default-value helpers (required by serde `default = "..."` attribute)
// =============================================================================

fn default_sample_interval_ms() -> u64 {
    250
}

fn default_output_key() -> String {
    "Day3".to_string()
}

fn default_feed_url() -> String {
    "wss://streamer.example.com/ws".to_string()
}

fn default_time_url() -> String {
    "https://api.example.com/v1/time".to_string()
}

// =============================================================================
// Symbol groups
// =============================================================================

/// Predefined observation rosters, one per collection day, plus a custom
/// roster taken from the `symbols` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SymbolGroup {
    DayOne,
    DayTwo,
    DayThree,
    Custom,
}

impl Default for SymbolGroup {
    fn default() -> Self {
        Self::DayThree
    }
}

impl std::fmt::Display for SymbolGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DayOne => write!(f, "DayOne"),
            Self::DayTwo => write!(f, "DayTwo"),
            Self::DayThree => write!(f, "DayThree"),
            Self::Custom => write!(f, "Custom"),
        }
    }
}

impl SymbolGroup {
    /// The fixed roster for a predefined group, `None` for `Custom`.
    pub fn roster(self) -> Option<&'static str> {
        match self {
            Self::DayOne => Some("FUBO,ROKU,AFRM,ABNB,ELF,NFLX,SPOT,ARM,GTLB,VEEV,XYZ"),
            Self::DayTwo => Some("TSLA,CART,COIN,GBX,DASH,SNAP,APP,IONQ,TOST,HIMS,CMG"),
            Self::DayThree => Some("SBUX,CVNA,META,PLTR,FFIV,INTC,IBM,SAP,IBKR,NKE,ADBE"),
            Self::Custom => None,
        }
    }
}

// =============================================================================
// RuntimeConfig
// =============================================================================

/// Top-level runtime configuration for the quote logger.
///
/// Every field has a serde default so that older JSON files missing new
/// fields will still deserialise correctly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Which predefined roster to observe.
    #[serde(default)]
    pub symbol_group: SymbolGroup,

    /// Custom roster, used only when `symbol_group` is `Custom` (or when the
    /// group roster is overridden via environment in main.rs).
    #[serde(default)]
    pub symbols: Vec<String>,

    /// Sampling loop cadence in milliseconds.
    #[serde(default = "default_sample_interval_ms")]
    pub sample_interval_ms: u64,

    /// Destination key for the snapshot file (file stem).
    #[serde(default = "default_output_key")]
    pub output_key: String,

    /// Push-stream websocket endpoint.
    #[serde(default = "default_feed_url")]
    pub feed_url: String,

    /// Server-time endpoint for the one-shot clock initialization.
    #[serde(default = "default_time_url")]
    pub time_url: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            symbol_group: SymbolGroup::default(),
            symbols: Vec::new(),
            sample_interval_ms: default_sample_interval_ms(),
            output_key: default_output_key(),
            feed_url: default_feed_url(),
            time_url: default_time_url(),
        }
    }
}

impl RuntimeConfig {
    /// The symbols actually observed this run, in output column order.
    ///
    /// Predefined groups win over the `symbols` field unless the group is
    /// `Custom`. The set is fixed for the lifetime of a run.
    pub fn resolved_symbols(&self) -> Vec<String> {
        match self.symbol_group.roster() {
            Some(roster) => roster.split(',').map(|s| s.to_string()).collect(),
            None => self.symbols.clone(),
        }
    }

    /// Load configuration from a JSON file at `path`.
    ///
    /// If the file does not exist, returns an error so the caller can fall
    /// back to defaults with a warning.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read runtime config from {}", path.display()))?;

        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse runtime config from {}", path.display()))?;

        info!(
            path = %path.display(),
            symbol_group = %config.symbol_group,
            interval_ms = config.sample_interval_ms,
            "runtime config loaded"
        );

        Ok(config)
    }

    /// Persist the current configuration to `path` using an atomic write
    /// (write to `.tmp`, then rename).
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        let content = serde_json::to_string_pretty(self)
            .context("failed to serialise runtime config to JSON")?;

        let tmp_path = path.with_extension("json.tmp");

        std::fs::write(&tmp_path, &content)
            .with_context(|| format!("failed to write tmp config to {}", tmp_path.display()))?;

        std::fs::rename(&tmp_path, path)
            .with_context(|| format!("failed to rename tmp config to {}", path.display()))?;

        info!(path = %path.display(), "runtime config saved (atomic)");
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_expected_values() {
        let cfg = RuntimeConfig::default();
        assert_eq!(cfg.symbol_group, SymbolGroup::DayThree);
        assert!(cfg.symbols.is_empty());
        assert_eq!(cfg.sample_interval_ms, 250);
        assert_eq!(cfg.output_key, "Day3");
    }

    #[test]
    fn deserialise_empty_json_uses_defaults() {
        let cfg: RuntimeConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg.symbol_group, SymbolGroup::DayThree);
        assert_eq!(cfg.sample_interval_ms, 250);
        assert!(!cfg.feed_url.is_empty());
    }

    #[test]
    fn deserialise_partial_json_fills_defaults() {
        let json = r#"{ "symbol_group": "DayOne", "sample_interval_ms": 100 }"#;
        let cfg: RuntimeConfig = serde_json::from_str(json).unwrap();
        assert_eq!(cfg.symbol_group, SymbolGroup::DayOne);
        assert_eq!(cfg.sample_interval_ms, 100);
        assert_eq!(cfg.output_key, "Day3");
    }

    #[test]
    fn predefined_group_resolves_its_roster() {
        let cfg = RuntimeConfig {
            symbol_group: SymbolGroup::DayTwo,
            ..Default::default()
        };
        let symbols = cfg.resolved_symbols();
        assert_eq!(symbols.len(), 11);
        assert_eq!(symbols[0], "TSLA");
        assert_eq!(symbols[10], "CMG");
    }

    #[test]
    fn custom_group_uses_symbols_field() {
        let cfg = RuntimeConfig {
            symbol_group: SymbolGroup::Custom,
            symbols: vec!["AAA".into(), "BBB".into()],
            ..Default::default()
        };
        assert_eq!(cfg.resolved_symbols(), vec!["AAA", "BBB"]);
    }

    #[test]
    fn save_writes_file_and_load_reads_it_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("quotescribe.json");

        let cfg = RuntimeConfig {
            symbol_group: SymbolGroup::DayOne,
            sample_interval_ms: 100,
            ..Default::default()
        };
        cfg.save(&path).unwrap();

        let loaded = RuntimeConfig::load(&path).unwrap();
        assert_eq!(loaded.symbol_group, SymbolGroup::DayOne);
        assert_eq!(loaded.sample_interval_ms, 100);

        // The tmp sibling is renamed away, not left behind.
        assert!(!dir.path().join("quotescribe.json.tmp").exists());
    }

    #[test]
    fn roundtrip_serialisation() {
        let cfg = RuntimeConfig {
            symbol_group: SymbolGroup::Custom,
            symbols: vec!["AAA".into()],
            sample_interval_ms: 500,
            output_key: "run1".into(),
            ..Default::default()
        };
        let json = serde_json::to_string(&cfg).unwrap();
        let cfg2: RuntimeConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(cfg2.symbol_group, SymbolGroup::Custom);
        assert_eq!(cfg2.symbols, cfg.symbols);
        assert_eq!(cfg2.sample_interval_ms, 500);
        assert_eq!(cfg2.output_key, "run1");
    }
}
