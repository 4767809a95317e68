//! `bhavlab.toml`: every table the pipeline consumes, loadable from partial
//! files (each section falls back to its defaults).

use std::path::{Path, PathBuf};
use std::time::Duration;

use bhavlab_core::data::{
    default_patterns, FilenamePattern, HttpSettings, SchemaSettings, SniffSettings,
    UnpackSettings,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::signal::SignalSettings;

pub const DEFAULT_CONFIG_FILE: &str = "bhavlab.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Remote archive location and fetch limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub base_url: String,
    /// Probe order within a kind follows list order.
    pub patterns: Vec<FilenamePattern>,
    /// Calendar days examined, counting the start date.
    pub lookback_days: u32,
    pub timeout_secs: u64,
    pub min_payload_bytes: usize,
    pub user_agent: String,
}

impl Default for SourceConfig {
    fn default() -> Self {
        let http = HttpSettings::default();
        Self {
            base_url: "https://nsearchives.nseindia.com/content/fo".into(),
            patterns: default_patterns(),
            lookback_days: 10,
            timeout_secs: http.timeout.as_secs(),
            min_payload_bytes: http.min_payload_bytes,
            user_agent: http.user_agent,
        }
    }
}

impl SourceConfig {
    pub fn http_settings(&self) -> HttpSettings {
        HttpSettings {
            timeout: Duration::from_secs(self.timeout_secs),
            min_payload_bytes: self.min_payload_bytes,
            user_agent: self.user_agent.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HolidayConfig {
    /// Holiday-master endpoint; `None` uses `dates` only.
    pub url: Option<String>,
    /// Extra holidays, always applied.
    pub dates: Vec<NaiveDate>,
    pub timeout_secs: u64,
}

impl Default for HolidayConfig {
    fn default() -> Self {
        Self {
            url: Some("https://www.nseindia.com/api/holiday-master?type=trading".into()),
            dates: Vec::new(),
            timeout_secs: 10,
        }
    }
}

impl HolidayConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub root: PathBuf,
    /// How far back to look for the previous snapshot.
    pub lookback_days: u32,
    /// How far back to gather sessions for the volume baseline.
    pub history_days: u32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("data/snapshots"),
            lookback_days: 10,
            history_days: 30,
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BhavlabConfig {
    pub source: SourceConfig,
    pub holidays: HolidayConfig,
    pub sniff: SniffSettings,
    pub unpack: UnpackSettings,
    pub schema: SchemaSettings,
    pub signal: SignalSettings,
    pub store: StoreConfig,
}

impl BhavlabConfig {
    /// Load and validate a config file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::Invalid(msg));

        if self.source.patterns.is_empty() {
            return invalid("source.patterns must list at least one filename pattern".into());
        }
        if let Some(p) = self.source.patterns.iter().find(|p| p.template.trim().is_empty()) {
            return invalid(format!("empty {:?} filename pattern", p.kind));
        }
        if self.source.lookback_days == 0 {
            return invalid("source.lookback_days must be > 0".into());
        }
        if self.source.timeout_secs == 0 {
            return invalid("source.timeout_secs must be > 0".into());
        }
        if self.sniff.delimiters.is_empty() {
            return invalid("sniff.delimiters must not be empty".into());
        }
        if self.sniff.sample_lines == 0 {
            return invalid("sniff.sample_lines must be > 0".into());
        }
        let t = &self.signal.thresholds;
        if t.medium_spike > t.high_spike {
            return invalid(format!(
                "signal.thresholds.medium_spike ({}) exceeds high_spike ({})",
                t.medium_spike, t.high_spike
            ));
        }
        if self.signal.volume_window == 0 {
            return invalid("signal.volume_window must be > 0".into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::LabelStyle;
    use bhavlab_core::data::FormatKind;
    use bhavlab_core::domain::CanonicalField;

    #[test]
    fn default_config_is_valid() {
        let config = BhavlabConfig::default();
        config.validate().unwrap();
        assert_eq!(config.holidays.timeout(), Duration::from_secs(10));
    }

    #[test]
    fn toml_roundtrip() {
        let config = BhavlabConfig::default();
        let text = config.to_toml().unwrap();
        let parsed = BhavlabConfig::from_toml(&text).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let config = BhavlabConfig::from_toml(
            r#"
            [source]
            lookback_days = 5

            [signal]
            label_style = "long_short_neutral"

            [signal.thresholds]
            buy_return_pct = 1.0
            "#,
        )
        .unwrap();

        assert_eq!(config.source.lookback_days, 5);
        assert_eq!(config.source.patterns, default_patterns());
        assert_eq!(config.signal.label_style, LabelStyle::LongShortNeutral);
        assert_eq!(config.signal.thresholds.buy_return_pct, 1.0);
        assert_eq!(config.signal.thresholds.sell_return_pct, -0.5);
        assert_eq!(config.store.lookback_days, 10);
    }

    #[test]
    fn patterns_and_aliases_are_data() {
        let config = BhavlabConfig::from_toml(
            r#"
            [[source.patterns]]
            template = "fo{dd}{MMM}{yyyy}.dat"
            kind = "raw_tabular"

            [schema.aliases]
            symbol = ["UNDERLYING_NAME"]
            "#,
        )
        .unwrap();

        assert_eq!(config.source.patterns.len(), 1);
        assert_eq!(config.source.patterns[0].kind, FormatKind::RawTabular);
        assert_eq!(
            config.schema.aliases_for(CanonicalField::Symbol),
            ["UNDERLYING_NAME".to_string()]
        );
        let defaults = SchemaSettings::default();
        for field in [CanonicalField::LastPrice, CanonicalField::OpenInterest, CanonicalField::Expiry] {
            assert!(!config.schema.aliases_for(field).is_empty());
            assert_eq!(config.schema.aliases_for(field), defaults.aliases_for(field));
        }
    }

    #[test]
    fn empty_alias_list_disables_a_field() {
        let config = BhavlabConfig::from_toml("[schema.aliases]
strike = []
").unwrap();
        assert!(config.schema.aliases_for(CanonicalField::Strike).is_empty());
        assert_eq!(
            config.schema.aliases_for(CanonicalField::Symbol),
            SchemaSettings::default().aliases_for(CanonicalField::Symbol)
        );
    }

    #[test]
    fn invalid_values_are_rejected() {
        assert!(matches!(
            BhavlabConfig::from_toml("[source]\nlookback_days = 0\n"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            BhavlabConfig::from_toml("[source]\npatterns = []\n"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            BhavlabConfig::from_toml("[signal.thresholds]\nmedium_spike = 3.0\n"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            BhavlabConfig::from_toml("[source\n"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn http_settings_follow_source() {
        let mut config = BhavlabConfig::default();
        config.source.timeout_secs = 7;
        let http = config.source.http_settings();
        assert_eq!(http.timeout, Duration::from_secs(7));
        assert_eq!(http.min_payload_bytes, 300);
    }
}
