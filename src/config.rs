//! Configuration file handling.
//!
//! This module handles loading and merging configuration from
//! `.talkie.toml` files.

use crate::analysis::parser::{DEFAULT_SUMMARY_DELIMITER, DEFAULT_TITLE_DELIMITER};
use crate::analysis::{ClientConfig, TitleSummaryParser};
use crate::calendar::Calendar;
use anyhow::{anyhow, Context, Result};
use chrono::{FixedOffset, Weekday};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,

    /// Analysis service settings.
    #[serde(default)]
    pub analysis: AnalysisConfig,

    /// Week-of-month calendar settings.
    #[serde(default)]
    pub calendar: CalendarConfig,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// JSON snapshot holding users and turn buffers between runs.
    #[serde(default = "default_state_file")]
    pub state_file: String,

    /// Enable verbose logging by default.
    #[serde(default)]
    pub verbose: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            state_file: default_state_file(),
            verbose: false,
        }
    }
}

fn default_state_file() -> String {
    "talkie_state.json".to_string()
}

/// Analysis gateway settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Ollama API URL used for the summaries.
    #[serde(default = "default_llm_url")]
    pub llm_url: String,

    /// Model name.
    #[serde(default = "default_model")]
    pub model: String,

    /// Temperature for generation.
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Bulk content-analysis endpoint.
    #[serde(default = "default_analysis_url")]
    pub analysis_url: String,

    /// Timeout for a single remote call, in seconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,

    /// Overall analysis budget for one finalize, in seconds.
    #[serde(default = "default_finalize_timeout")]
    pub finalize_timeout_seconds: u64,

    /// Marker preceding the summary in the title reply.
    #[serde(default = "default_summary_delimiter")]
    pub summary_delimiter: String,

    /// Marker preceding the title in the title reply.
    #[serde(default = "default_title_delimiter")]
    pub title_delimiter: String,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            llm_url: default_llm_url(),
            model: default_model(),
            temperature: default_temperature(),
            analysis_url: default_analysis_url(),
            request_timeout_seconds: default_request_timeout(),
            finalize_timeout_seconds: default_finalize_timeout(),
            summary_delimiter: default_summary_delimiter(),
            title_delimiter: default_title_delimiter(),
        }
    }
}

fn default_llm_url() -> String {
    "http://localhost:11434".to_string()
}

fn default_model() -> String {
    "llama3.2:latest".to_string()
}

fn default_temperature() -> f32 {
    0.3
}

fn default_analysis_url() -> String {
    "http://localhost:8000/analyze".to_string()
}

fn default_request_timeout() -> u64 {
    60
}

fn default_finalize_timeout() -> u64 {
    120
}

fn default_summary_delimiter() -> String {
    DEFAULT_SUMMARY_DELIMITER.to_string()
}

fn default_title_delimiter() -> String {
    DEFAULT_TITLE_DELIMITER.to_string()
}

/// Week-of-month calendar settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalendarConfig {
    /// First day of the week (e.g. `sunday`, `mon`).
    #[serde(default = "default_week_start")]
    pub week_start: String,

    /// Days a partial first week needs to count as week 1.
    #[serde(default = "default_minimal_days")]
    pub minimal_days_in_first_week: u32,

    /// Offset of the local calendar from UTC, in minutes.
    #[serde(default)]
    pub utc_offset_minutes: i32,
}

impl Default for CalendarConfig {
    fn default() -> Self {
        Self {
            week_start: default_week_start(),
            minimal_days_in_first_week: default_minimal_days(),
            utc_offset_minutes: 0,
        }
    }
}

fn default_week_start() -> String {
    "sunday".to_string()
}

fn default_minimal_days() -> u32 {
    1
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Try to load configuration from the default location.
    ///
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but can't be parsed.
    pub fn load_default() -> Result<Option<Self>> {
        let default_path = Path::new(".talkie.toml");

        if default_path.exists() {
            Ok(Some(Self::load(default_path)?))
        } else {
            Ok(None)
        }
    }

    /// Merge this configuration with CLI arguments.
    ///
    /// CLI arguments take precedence over config file settings, but only
    /// when they were given explicitly.
    pub fn merge_with_args(&mut self, args: &crate::cli::Args) {
        if let Some(ref state_file) = args.state_file {
            self.general.state_file = state_file.display().to_string();
        }
        if let Some(ref url) = args.llm_url {
            self.analysis.llm_url = url.clone();
        }
        if let Some(ref model) = args.model {
            self.analysis.model = model.clone();
        }
        if let Some(ref url) = args.analysis_url {
            self.analysis.analysis_url = url.clone();
        }
        if let Some(timeout) = args.timeout {
            self.analysis.finalize_timeout_seconds = timeout;
        }

        // Flags always override
        if args.verbose {
            self.general.verbose = true;
        }
    }

    /// Build the week-of-month calendar.
    pub fn to_calendar(&self) -> Result<Calendar> {
        let week_start: Weekday = self
            .calendar
            .week_start
            .parse()
            .map_err(|_| anyhow!("Invalid week_start: {}", self.calendar.week_start))?;

        let offset = FixedOffset::east_opt(self.calendar.utc_offset_minutes * 60).ok_or_else(
            || anyhow!("Invalid utc_offset_minutes: {}", self.calendar.utc_offset_minutes),
        )?;

        Ok(Calendar::new(
            week_start,
            self.calendar.minimal_days_in_first_week,
            offset,
        ))
    }

    /// Settings for the HTTP analysis client.
    pub fn to_client_config(&self) -> ClientConfig {
        ClientConfig {
            llm_url: self.analysis.llm_url.clone(),
            model_name: self.analysis.model.clone(),
            temperature: self.analysis.temperature,
            analysis_url: self.analysis.analysis_url.clone(),
            timeout_seconds: self.analysis.request_timeout_seconds,
            summary_delimiter: self.analysis.summary_delimiter.clone(),
            title_delimiter: self.analysis.title_delimiter.clone(),
        }
    }

    pub fn to_parser(&self) -> TitleSummaryParser {
        TitleSummaryParser::new(
            self.analysis.summary_delimiter.clone(),
            self.analysis.title_delimiter.clone(),
        )
    }

    pub fn finalize_timeout(&self) -> Duration {
        Duration::from_secs(self.analysis.finalize_timeout_seconds)
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.general.state_file, "talkie_state.json");
        assert_eq!(config.analysis.llm_url, "http://localhost:11434");
        assert_eq!(config.analysis.summary_delimiter, "summary:");
        assert_eq!(config.calendar.week_start, "sunday");
        assert_eq!(config.calendar.minimal_days_in_first_week, 1);
    }

    #[test]
    fn test_parse_config() {
        let toml_content = r#"
[general]
state_file = "family.json"
verbose = true

[analysis]
model = "gemma2:9b"
finalize_timeout_seconds = 30
title_delimiter = "제목:"

[calendar]
week_start = "monday"
minimal_days_in_first_week = 4
utc_offset_minutes = 540
"#;

        let config: Config = toml::from_str(toml_content).unwrap();
        assert_eq!(config.general.state_file, "family.json");
        assert!(config.general.verbose);
        assert_eq!(config.analysis.model, "gemma2:9b");
        assert_eq!(config.analysis.temperature, 0.3);
        assert_eq!(config.finalize_timeout(), Duration::from_secs(30));
        let parsed = config.to_parser().parse("summary: A trip. 제목: Zoo");
        assert_eq!(parsed.title.as_deref(), Some("Zoo"));
        assert_eq!(config.to_client_config().title_delimiter, "제목:");

        let calendar = config.to_calendar().unwrap();
        assert_eq!(
            calendar,
            Calendar::new(Weekday::Mon, 4, FixedOffset::east_opt(540 * 60).unwrap())
        );
        // ISO rules: Jan 1 2024 is a Monday
        let date = NaiveDate::from_ymd_opt(2024, 1, 7).unwrap();
        assert_eq!(calendar.week_of_month(date), 1);
    }

    #[test]
    fn test_default_calendar_is_korean() {
        let calendar = Config::default().to_calendar().unwrap();
        let date = NaiveDate::from_ymd_opt(2024, 6, 2).unwrap();
        assert_eq!(calendar.week_key(date), Calendar::korean().week_key(date));
    }

    #[test]
    fn test_invalid_calendar_rejected() {
        let mut config = Config::default();
        config.calendar.week_start = "someday".to_string();
        assert!(config.to_calendar().is_err());

        let mut config = Config::default();
        config.calendar.utc_offset_minutes = 24 * 60;
        assert!(config.to_calendar().is_err());
    }

    #[test]
    fn test_default_toml_generation() {
        let toml_str = Config::default_toml();
        assert!(!toml_str.is_empty());
        assert!(toml_str.contains("[general]"));
        assert!(toml_str.contains("[analysis]"));
        assert!(toml_str.contains("[calendar]"));
    }
}
