//! Code for loading program settings.
use crate::get_elci_config_dir;
use crate::input::read_toml;
use crate::log::DEFAULT_LOG_LEVEL;
use crate::source::SourceCache;
use anyhow::{Context, Result, ensure};
use documented::DocumentedFields;
use serde::{Deserialize, Serialize};
use std::fmt::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

const SETTINGS_FILE_NAME: &str = "settings.toml";

const DEFAULT_SETTINGS_FILE_HEADER: &str = "# This file contains the program settings for ELCI
# Uncomment a line to change its value.
";

/// Default maximum age of cached source files, in days
const DEFAULT_CACHE_MAX_AGE_DAYS: u64 = 30;

const SECONDS_PER_DAY: u64 = 24 * 60 * 60;

/// Default log level for program
fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_cache_max_age_days() -> u64 {
    DEFAULT_CACHE_MAX_AGE_DAYS
}

/// Get the path to where the settings file will be read from
pub fn get_settings_file_path() -> PathBuf {
    let mut path = get_elci_config_dir();
    path.push(SETTINGS_FILE_NAME);

    path
}

/// Program settings from config file
#[derive(Debug, DocumentedFields, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    /// The default program log level
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Whether to overwrite output files by default
    #[serde(default)]
    pub overwrite: bool,
    /// Folder in which downloaded source files are cached (defaults to the user cache folder)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_dir: Option<PathBuf>,
    /// Cached source files older than this many days are fetched again
    #[serde(default = "default_cache_max_age_days")]
    pub cache_max_age_days: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            overwrite: false,
            cache_dir: None,
            cache_max_age_days: DEFAULT_CACHE_MAX_AGE_DAYS,
        }
    }
}

impl Settings {
    /// Read the program settings file.
    ///
    /// If the file is not present, default values for settings will be used
    ///
    /// # Returns
    ///
    /// The program settings as a `Settings` struct or an error if the file is invalid
    pub fn load() -> Result<Settings> {
        Self::load_from_path(&get_settings_file_path())
    }

    /// Read settings from the specified path, using defaults if there is no file
    fn load_from_path(file_path: &Path) -> Result<Settings> {
        if !file_path.is_file() {
            return Ok(Settings::default());
        }

        let settings: Settings = read_toml(file_path)?;
        ensure!(
            settings.cache_max_age_days > 0,
            "cache_max_age_days must be at least one"
        );

        Ok(settings)
    }

    /// Create the source cache described by these settings.
    ///
    /// `cache_dir` overrides the cache folder given in the settings file.
    pub fn source_cache(&self, cache_dir: Option<&Path>, offline: bool) -> SourceCache {
        let dir = cache_dir
            .map(Path::to_path_buf)
            .or_else(|| self.cache_dir.clone())
            .unwrap_or_else(SourceCache::default_dir);
        let max_age = Duration::from_secs(self.cache_max_age_days.saturating_mul(SECONDS_PER_DAY));

        SourceCache::new(dir, max_age, offline)
    }

    /// The contents of the default settings file
    pub fn default_file_contents() -> Result<String> {
        let settings_raw =
            toml::to_string(&Settings::default()).context("Could not convert settings to TOML")?;

        // Comment out every setting, preceded by its documentation
        let mut out = DEFAULT_SETTINGS_FILE_HEADER.to_string();
        for line in settings_raw.lines() {
            let Some(last) = line.find('=') else {
                continue;
            };
            let field = line[..last].trim();
            let docs = Settings::get_field_docs(field)
                .ok()
                .with_context(|| format!("Missing doc comment for setting {field}"))?;
            for line in docs.lines() {
                write!(&mut out, "\n# # {}\n", line.trim())?;
            }
            writeln!(&mut out, "# {}", line.trim())?;
        }

        Ok(out)
    }
}
