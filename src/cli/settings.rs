//! The `settings` subcommands, for managing program settings and the source cache.
use crate::settings::{Settings, get_settings_file_path};
use anyhow::{Context, Result};
use clap::Subcommand;
use std::fs;
use std::path::Path;

/// Subcommands for settings
#[derive(Subcommand)]
pub enum SettingsSubcommands {
    /// Open the settings file in an editor, creating it first if needed
    Edit,
    /// Print the path of the settings file
    Path,
    /// Print the settings in effect, including the source cache folder
    Show,
    /// Delete every cached source file
    ClearCache,
}

impl SettingsSubcommands {
    /// Execute the supplied settings subcommand
    pub fn execute(self) -> Result<()> {
        let file_path = get_settings_file_path();
        match self {
            Self::Edit => {
                write_default_if_missing(&file_path)?;
                println!("Opening settings file for editing: {}", file_path.display());
                edit::edit_file(&file_path)?;
            }
            Self::Path => println!("{}", file_path.display()),
            Self::Show => print!("{}", describe(&Settings::load()?)?),
            Self::ClearCache => {
                let cache = Settings::load()?.source_cache(None, true);
                if clear_cache(cache.dir())? {
                    println!("Removed cached sources from {}", cache.dir().display());
                } else {
                    println!("No cached sources in {}", cache.dir().display());
                }
            }
        }

        Ok(())
    }
}

/// Write the commented-out default settings to `file_path` if there is no file there
fn write_default_if_missing(file_path: &Path) -> Result<()> {
    if file_path.is_file() {
        return Ok(());
    }

    if let Some(dir_path) = file_path.parent() {
        fs::create_dir_all(dir_path)
            .with_context(|| format!("Failed to create directory: {}", dir_path.display()))?;
    }
    fs::write(file_path, Settings::default_file_contents()?)?;

    Ok(())
}

/// The settings as TOML, followed by the source cache folder they resolve to
fn describe(settings: &Settings) -> Result<String> {
    let mut out = toml::to_string(settings).context("Could not convert settings to TOML")?;
    let cache = settings.source_cache(None, true);
    out.push_str(&format!("# Source cache folder: {}\n", cache.dir().display()));

    Ok(out)
}

/// Delete the cache folder and everything in it.
///
/// # Returns
///
/// Whether there was a cache folder to delete
fn clear_cache(cache_dir: &Path) -> Result<bool> {
    if !cache_dir.is_dir() {
        return Ok(false);
    }

    fs::remove_dir_all(cache_dir)
        .with_context(|| format!("Could not delete {}", cache_dir.display()))?;

    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_write_default_if_missing() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("elci").join("settings.toml");
        write_default_if_missing(&file_path).unwrap();
        assert!(file_path.is_file());

        // An existing file is left alone
        fs::write(&file_path, "overwrite = true\n").unwrap();
        write_default_if_missing(&file_path).unwrap();
        assert_eq!(fs::read_to_string(&file_path).unwrap(), "overwrite = true\n");
    }

    #[test]
    fn test_describe() {
        let settings = Settings {
            cache_dir: Some("sources".into()),
            ..Settings::default()
        };
        let out = describe(&settings).unwrap();
        assert!(out.contains("log_level = \"info\""));
        assert!(out.ends_with("# Source cache folder: sources\n"));

        // The description is itself a valid settings file
        let read: Settings = toml::from_str(&out).unwrap();
        assert_eq!(read, settings);
    }

    #[test]
    fn test_clear_cache() {
        let dir = tempdir().unwrap();
        let cache_dir = dir.path().join("cache");
        assert!(!clear_cache(&cache_dir).unwrap());

        let cached = cache_dir.join("egrid").join("2016");
        fs::create_dir_all(&cached).unwrap();
        fs::write(cached.join("releases.csv"), "").unwrap();
        assert!(clear_cache(&cache_dir).unwrap());
        assert!(!cache_dir.exists());
    }
}
