//! A local cache for source datasets which are published at a URL.
use super::SourceSpec;
use crate::error::{RunError, RunReport, Stage};
use anyhow::{Context, Result, bail};
use log::{debug, info, warn};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tempfile::NamedTempFile;

/// File name used for URLs which do not end in one
const DEFAULT_FILE_NAME: &str = "data";

/// Resolves source locations to files on disk, downloading and caching remote sources.
///
/// Cached files live at `<dir>/<source id>/<release>/<file name>`.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceCache {
    dir: PathBuf,
    max_age: Duration,
    offline: bool,
}

/// Whether a source location is a URL rather than a path
pub(super) fn is_url(location: &str) -> bool {
    location.starts_with("http://") || location.starts_with("https://")
}

/// The last path segment of a URL, ignoring any query string
fn file_name_from_url(url: &str) -> &str {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    match path.rsplit('/').next() {
        Some(name) if !name.is_empty() && !name.contains(':') => name,
        _ => DEFAULT_FILE_NAME,
    }
}

/// Whether the file at `path` was modified more recently than `max_age` ago
fn is_fresh(path: &Path, max_age: Duration) -> bool {
    fs::metadata(path)
        .and_then(|metadata| metadata.modified())
        .ok()
        .and_then(|modified| SystemTime::now().duration_since(modified).ok())
        .is_some_and(|age| age < max_age)
}

/// Download `url` into `dest`, replacing it atomically
fn download(url: &str, dest: &Path) -> Result<()> {
    let dir = dest.parent().context("Cache path has no parent directory")?;
    fs::create_dir_all(dir)
        .with_context(|| format!("Could not create cache directory {}", dir.display()))?;

    let response = match ureq::get(url).call() {
        Ok(response) => response,
        Err(ureq::Error::Status(code, _)) => bail!("Failed to download {url}: HTTP {code}"),
        Err(err) => return Err(err).with_context(|| format!("Error requesting {url}")),
    };

    let mut file = NamedTempFile::new_in(dir)?;
    io::copy(&mut response.into_reader(), &mut file)
        .with_context(|| format!("Error writing download to {}", dest.display()))?;
    file.persist(dest)
        .with_context(|| format!("Could not save {}", dest.display()))?;

    Ok(())
}

impl SourceCache {
    /// Create a new cache.
    ///
    /// # Arguments
    ///
    /// * `dir` - Directory in which downloaded files are stored
    /// * `max_age` - Cached files older than this are downloaded again
    /// * `offline` - If true, never download; only cached copies are used
    pub fn new(dir: PathBuf, max_age: Duration, offline: bool) -> Self {
        Self {
            dir,
            max_age,
            offline,
        }
    }

    /// The default location of the cache (a folder in the user's cache directory)
    pub fn default_dir() -> PathBuf {
        match dirs::cache_dir() {
            Some(dir) => dir.join("elci"),
            None => PathBuf::from(".elci_cache"),
        }
    }

    /// The folder holding cached files
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Where a remote source is cached
    pub fn cached_path(&self, spec: &SourceSpec) -> PathBuf {
        self.dir
            .join(&spec.id)
            .join(&spec.release)
            .join(file_name_from_url(&spec.location))
    }

    fn unavailable(spec: &SourceSpec) -> anyhow::Error {
        RunError::SourceUnavailable {
            source_id: spec.id.clone(),
            release: spec.release.clone(),
        }
        .into()
    }

    /// Get the path of a local copy of the source.
    ///
    /// Local paths are resolved relative to `model_dir` and used in place. Remote sources are
    /// downloaded unless a fresh cached copy exists. If a download fails, a stale copy is used
    /// with a warning; if there is no copy at all, a [`RunError::SourceUnavailable`] is returned.
    pub fn fetch(&self, spec: &SourceSpec, model_dir: &Path, report: &mut RunReport) -> Result<PathBuf> {
        if !is_url(&spec.location) {
            let path = model_dir.join(&spec.location);
            if !path.is_file() {
                warn!("Source file {} does not exist", path.display());
                return Err(Self::unavailable(spec));
            }
            return Ok(path);
        }

        let path = self.cached_path(spec);
        let exists = path.is_file();
        if exists && (self.offline || is_fresh(&path, self.max_age)) {
            debug!("Using cached copy of {} at {}", spec.id, path.display());
            return Ok(path);
        }
        if self.offline {
            info!("No cached copy of {} and downloads are disabled", spec.id);
            return Err(Self::unavailable(spec));
        }

        info!("Downloading {} (release {}) from {}", spec.id, spec.release, spec.location);
        match download(&spec.location, &path) {
            Ok(()) => Ok(path),
            Err(err) if exists => {
                report.coverage(
                    Stage::Ingestion,
                    &spec.id,
                    format!("Download failed ({err:#}); using stale cached copy"),
                );
                Ok(path)
            }
            Err(err) => {
                warn!("{err:#}");
                Err(Self::unavailable(spec))
            }
        }
    }
}
