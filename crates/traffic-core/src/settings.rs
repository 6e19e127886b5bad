use clap::{CommandFactory, Parser};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::models::{
    AggregationParameters, Granularity, DEFAULT_MAX_DISPLAYED_USERS, DEFAULT_MIN_TRAFFIC_THRESHOLD,
};

// ── Settings (CLI) ─────────────────────────────────────────────────────────────

/// Per-user bandwidth usage report for proxy panel exports
#[derive(Parser, Debug, Clone)]
#[command(
    name = "traffic-report",
    about = "Per-user bandwidth usage report for proxy panel exports",
    version
)]
pub struct Settings {
    /// Usage export: a JSON file or a directory of JSON files
    #[arg(long)]
    pub input: Option<PathBuf>,

    /// Minimum total traffic in bytes for a user to be charted
    #[arg(long, default_value_t = DEFAULT_MIN_TRAFFIC_THRESHOLD)]
    pub threshold: u64,

    /// Maximum number of charted users
    #[arg(long, default_value_t = DEFAULT_MAX_DISPLAYED_USERS)]
    pub max_users: usize,

    /// Only chart these users (repeatable)
    #[arg(long = "user")]
    pub users: Vec<String>,

    /// Bucket size
    #[arg(long, default_value = "daily", value_parser = ["daily", "monthly"])]
    pub granularity: String,

    /// Timezone used to bucket timestamps (auto-detected if not specified)
    #[arg(long, default_value = "auto")]
    pub timezone: String,

    /// Output format
    #[arg(long, default_value = "table", value_parser = ["table", "json"])]
    pub format: String,

    /// Logging level
    #[arg(long, default_value = "INFO", value_parser = ["DEBUG", "INFO", "WARNING", "ERROR", "CRITICAL"])]
    pub log_level: String,

    /// Log file path
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long)]
    pub debug: bool,

    /// Clear saved configuration
    #[arg(long)]
    pub clear: bool,
}

// ── LastUsedParams ─────────────────────────────────────────────────────────────

/// Persisted last-used parameters saved to `~/.traffic-report/last_used.json`.
#[derive(Debug, Serialize, Deserialize, Default, Clone)]
pub struct LastUsedParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub threshold: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_users: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub granularity: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
}

impl LastUsedParams {
    /// Default path of the persisted config file.
    pub fn config_path() -> PathBuf {
        Self::config_path_in(&dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")))
    }

    /// Config path rooted at `base_dir`.
    pub fn config_path_in(base_dir: &std::path::Path) -> PathBuf {
        base_dir.join(".traffic-report").join("last_used.json")
    }

    /// Load persisted params from `path`.
    /// Returns `Default` when the file is absent or cannot be parsed.
    pub fn load_from(path: &std::path::Path) -> Self {
        let Ok(content) = std::fs::read_to_string(path) else {
            return Self::default();
        };
        serde_json::from_str(&content).unwrap_or_default()
    }

    /// Atomically write params to `path`, creating parent directories if needed.
    pub fn save_to(&self, path: &std::path::Path) -> Result<(), std::io::Error> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;

        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, &json)?;
        std::fs::rename(&tmp, path)?;

        Ok(())
    }

    pub fn clear_at(path: &std::path::Path) -> Result<(), std::io::Error> {
        if path.exists() {
            std::fs::remove_file(path)?;
        }
        Ok(())
    }
}

// ── Settings impl ──────────────────────────────────────────────────────────────

impl Settings {
    /// Parse CLI arguments and fill unset values from the last run.
    ///
    /// The merged values are persisted before `"auto"` is resolved, so a
    /// saved `auto` timezone is detected again on every run.
    pub fn load_with_last_used() -> Self {
        Self::load_with_last_used_impl(
            std::env::args_os().collect(),
            &LastUsedParams::config_path(),
        )
    }

    /// Same as [`Settings::load_with_last_used`] with explicit arguments and
    /// config location.
    pub fn load_with_last_used_impl(
        args: Vec<std::ffi::OsString>,
        config_path: &std::path::Path,
    ) -> Self {
        let matches = Settings::command().get_matches_from(args.clone());
        let mut settings = Settings::parse_from(args);

        if settings.clear {
            if let Err(e) = LastUsedParams::clear_at(config_path) {
                tracing::warn!(error = %e, "failed to clear saved configuration");
            }
            return Self::resolve_auto_values(settings);
        }

        let last = LastUsedParams::load_from(config_path);

        // CLI always wins. The user filter is never restored.
        if settings.input.is_none() {
            settings.input = last.input;
        }
        if !is_arg_explicitly_set(&matches, "threshold") {
            if let Some(v) = last.threshold {
                settings.threshold = v;
            }
        }
        // NOTE: clap stores the arg id using the field name, not the flag.
        if !is_arg_explicitly_set(&matches, "max_users") {
            if let Some(v) = last.max_users {
                settings.max_users = v;
            }
        }
        if !is_arg_explicitly_set(&matches, "granularity") {
            if let Some(v) = last.granularity {
                settings.granularity = v;
            }
        }
        if !is_arg_explicitly_set(&matches, "timezone") {
            if let Some(v) = last.timezone {
                settings.timezone = v;
            }
        }
        if !is_arg_explicitly_set(&matches, "format") {
            if let Some(v) = last.format {
                settings.format = v;
            }
        }

        if let Err(e) = LastUsedParams::from(&settings).save_to(config_path) {
            tracing::debug!(error = %e, "could not persist last-used parameters");
        }

        Self::resolve_auto_values(settings)
    }

    /// Parameters for the usage aggregator derived from these settings.
    ///
    /// An unrecognised persisted granularity falls back to daily buckets.
    pub fn aggregation_parameters(&self) -> AggregationParameters {
        let granularity = self.granularity.parse().unwrap_or_else(|e| {
            tracing::warn!(error = %e, "falling back to daily buckets");
            Granularity::Daily
        });
        AggregationParameters {
            selected_users: self.users.iter().cloned().collect(),
            min_traffic_threshold: self.threshold,
            max_displayed_users: self.max_users,
            timezone: Some(self.timezone.clone()),
            granularity,
        }
    }

    /// Resolve `"auto"` sentinel values and apply the `--debug` flag.
    fn resolve_auto_values(mut settings: Settings) -> Settings {
        if settings.timezone == "auto" {
            settings.timezone = crate::time_utils::get_system_timezone();
        }

        if settings.debug {
            settings.log_level = "DEBUG".to_string();
        }

        settings
    }
}

// ── Conversion ─────────────────────────────────────────────────────────────────

impl From<&Settings> for LastUsedParams {
    fn from(s: &Settings) -> Self {
        LastUsedParams {
            input: s.input.clone(),
            threshold: Some(s.threshold),
            max_users: Some(s.max_users),
            granularity: Some(s.granularity.clone()),
            timezone: Some(s.timezone.clone()),
            format: Some(s.format.clone()),
        }
    }
}

/// Returns `true` when `name` was supplied explicitly on the command line
/// (not via default value or environment variable).
fn is_arg_explicitly_set(matches: &clap::ArgMatches, name: &str) -> bool {
    matches.value_source(name) == Some(clap::parser::ValueSource::CommandLine)
}

// ── Tests ──────────────────────────────────────────────────────────────────────
