//! Layered configuration for hondana.
//!
//! Values are merged in three layers, later ones winning:
//! 1. Built-in defaults
//! 2. A config file: an explicit path, or the first of `config.toml`,
//!    `config.yaml`, `config.yml` and `config.json` found in the platform
//!    config directory
//! 3. `HONDANA_` environment variables, with `__` separating nested keys
//!    (`HONDANA_THUMBNAILS__WORKERS=2`)
//!
//! The loaded [`Config`] is validated once and then handed out as immutable
//! snapshots ([`CacheSettings`], [`SessionSettings`]) to the components.

pub mod error;

use crate::error::{ErrorKind, Result};
use directories::ProjectDirs;
use exn::ResultExt;
use figment::Figment;
use figment::providers::{Env, Format, Json, Serialized, Toml, Yaml};
use hondana_cache::CacheSettings;
use hondana_session::{InputMapping, SessionSettings, check_interval};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

pub const ENV_PREFIX: &str = "HONDANA_";
const CONFIG_FILES: [&str; 4] = ["config.toml", "config.yaml", "config.yml", "config.json"];

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub library: LibraryConfig,
    pub storage: StorageConfig,
    pub bookmarks: BookmarksConfig,
    pub thumbnails: ThumbnailsConfig,
    pub input: InputConfig,
    pub reading: ReadingConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LibraryConfig {
    /// Roots scanned in addition to the ones registered in `library.json`.
    pub roots: Vec<PathBuf>,
    /// Volume file extensions, matched case-insensitively.
    pub extensions: Vec<String>,
}
impl Default for LibraryConfig {
    fn default() -> Self {
        Self { roots: Vec::new(), extensions: vec![hondana_library::DEFAULT_EXTENSION.to_string()] }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Bookmarks, favorites and library roots.
    pub data_dir: PathBuf,
    /// Thumbnail index and PNG files. Safe to delete.
    pub cache_dir: PathBuf,
}
impl Default for StorageConfig {
    fn default() -> Self {
        match project_dirs() {
            Some(dirs) => Self { data_dir: dirs.data_dir().to_path_buf(), cache_dir: dirs.cache_dir().to_path_buf() },
            None => {
                let base = std::env::temp_dir().join("hondana");
                Self { data_dir: base.join("data"), cache_dir: base.join("cache") }
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BookmarksConfig {
    pub debounce_ms: u64,
}
impl Default for BookmarksConfig {
    fn default() -> Self {
        let debounce = hondana_store::DEFAULT_DEBOUNCE.as_millis();
        Self { debounce_ms: u64::try_from(debounce).unwrap_or(u64::MAX) }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThumbnailsConfig {
    pub workers: usize,
    pub memory_entries: usize,
    pub memory_bytes: usize,
    pub disk_capacity_bytes: Option<u64>,
    pub max_dimension: u32,
    pub placeholder_ttl_secs: u64,
    pub render_timeout_secs: u64,
}
impl Default for ThumbnailsConfig {
    fn default() -> Self {
        let settings = CacheSettings::default();
        Self {
            workers: settings.workers,
            memory_entries: settings.memory_entries,
            memory_bytes: settings.memory_bytes,
            disk_capacity_bytes: settings.disk_capacity_bytes,
            max_dimension: settings.max_dimension,
            placeholder_ttl_secs: settings.placeholder_ttl.as_secs(),
            render_timeout_secs: settings.render_timeout.as_secs(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InputConfig {
    pub arrow_keys: bool,
    pub left_click_next: bool,
}
impl Default for InputConfig {
    fn default() -> Self {
        let mapping = InputMapping::default();
        Self { arrow_keys: mapping.arrow_keys, left_click_next: mapping.left_click_next }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReadingConfig {
    pub auto_advance_secs: u64,
}
impl Default for ReadingConfig {
    fn default() -> Self {
        Self { auto_advance_secs: hondana_session::DEFAULT_AUTO_ADVANCE.as_secs() }
    }
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("", "", "hondana")
}

impl Config {
    /// Load and validate the configuration.
    ///
    /// With `explicit` set, that file must exist. Otherwise the platform
    /// config directory is searched and a missing file is fine.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        Self::figment(explicit)?.extract::<Self>().or_raise(|| ErrorKind::Parse)?.validated()
    }

    /// The merged layers, before extraction.
    pub fn figment(explicit: Option<&Path>) -> Result<Figment> {
        let file = match explicit {
            Some(path) if !path.is_file() => exn::bail!(ErrorKind::NotFound(path.to_path_buf())),
            Some(path) => Some(path.to_path_buf()),
            None => Self::default_file(),
        };
        let mut figment = Figment::from(Serialized::defaults(Self::default()));
        if let Some(file) = file {
            debug!(path = %file.display(), "loading config file");
            figment = Self::merge_file(figment, &file)?;
        }
        Ok(figment.merge(Env::prefixed(ENV_PREFIX).split("__")))
    }

    /// The first config file present in the platform config directory.
    pub fn default_file() -> Option<PathBuf> {
        let dirs = project_dirs()?;
        CONFIG_FILES.iter().map(|name| dirs.config_dir().join(name)).find(|path| path.is_file())
    }

    fn merge_file(figment: Figment, path: &Path) -> Result<Figment> {
        let extension = path.extension().and_then(|e| e.to_str()).map(str::to_ascii_lowercase);
        Ok(match extension.as_deref() {
            Some("toml") => figment.merge(Toml::file(path)),
            Some("yaml" | "yml") => figment.merge(Yaml::file(path)),
            Some("json") => figment.merge(Json::file(path)),
            _ => exn::bail!(ErrorKind::UnsupportedFormat(path.to_path_buf())),
        })
    }

    /// Reject values no component can work with.
    pub fn validated(self) -> Result<Self> {
        let invalid = |message: &str| -> Result<Self> { Err(exn::Exn::from(ErrorKind::Invalid(message.to_string()))) };
        if self.library.extensions.is_empty() || self.library.extensions.iter().any(|e| e.trim().is_empty()) {
            return invalid("library.extensions must list at least one non-empty extension");
        }
        if !self.storage.data_dir.is_absolute() || !self.storage.cache_dir.is_absolute() {
            return invalid("storage.data_dir and storage.cache_dir must be absolute paths");
        }
        let thumbnails = &self.thumbnails;
        if thumbnails.workers == 0 {
            return invalid("thumbnails.workers must be at least 1");
        }
        if thumbnails.memory_entries == 0 {
            return invalid("thumbnails.memory_entries must be at least 1");
        }
        if thumbnails.max_dimension == 0 {
            return invalid("thumbnails.max_dimension must be at least 1");
        }
        if thumbnails.render_timeout_secs == 0 {
            return invalid("thumbnails.render_timeout_secs must be at least 1");
        }
        if check_interval(Duration::from_secs(self.reading.auto_advance_secs)).is_err() {
            return invalid("reading.auto_advance_secs must be between 1 and 60");
        }
        Ok(self)
    }

    /// Extensions without a leading dot, lowercased.
    pub fn extensions(&self) -> Vec<String> {
        self.library.extensions.iter().map(|e| e.trim().trim_start_matches('.').to_ascii_lowercase()).collect()
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.bookmarks.debounce_ms)
    }

    pub fn cache_settings(&self) -> CacheSettings {
        let thumbnails = &self.thumbnails;
        CacheSettings {
            workers: thumbnails.workers,
            memory_entries: thumbnails.memory_entries,
            memory_bytes: thumbnails.memory_bytes,
            disk_capacity_bytes: thumbnails.disk_capacity_bytes,
            max_dimension: thumbnails.max_dimension,
            placeholder_ttl: Duration::from_secs(thumbnails.placeholder_ttl_secs),
            render_timeout: Duration::from_secs(thumbnails.render_timeout_secs),
        }
    }

    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            input: InputMapping { arrow_keys: self.input.arrow_keys, left_click_next: self.input.left_click_next },
            auto_advance_interval: Duration::from_secs(self.reading.auto_advance_secs),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;
    use rstest::rstest;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default().validated().unwrap();
        assert_eq!(config.extensions(), vec!["pdf".to_string()]);
        assert_eq!(config.debounce(), Duration::from_millis(500));
        assert_eq!(config.cache_settings(), CacheSettings::default());
        assert_eq!(config.session_settings(), SessionSettings::default());
    }

    #[test]
    fn test_file_then_env() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "hondana.toml",
                r#"
                    [library]
                    roots = ["/srv/manga"]
                    extensions = [".PDF", "cbz"]

                    [thumbnails]
                    workers = 3
                    max_dimension = 320
                "#,
            )?;
            jail.set_env("HONDANA_THUMBNAILS__WORKERS", "2");
            jail.set_env("HONDANA_READING__AUTO_ADVANCE_SECS", "15");
            let config = Config::load(Some(Path::new("hondana.toml"))).unwrap();
            assert_eq!(config.library.roots, vec![PathBuf::from("/srv/manga")]);
            assert_eq!(config.extensions(), vec!["pdf".to_string(), "cbz".to_string()]);
            assert_eq!(config.thumbnails.workers, 2);
            assert_eq!(config.thumbnails.max_dimension, 320);
            assert_eq!(config.session_settings().auto_advance_interval, Duration::from_secs(15));
            // Untouched sections keep their defaults.
            assert_eq!(config.bookmarks, BookmarksConfig::default());
            Ok(())
        });
    }

    #[test]
    fn test_yaml_and_json_files() {
        Jail::expect_with(|jail| {
            jail.create_file("config.yaml", "input:\n  left_click_next: false\n")?;
            jail.create_file("config.json", r#"{"bookmarks": {"debounce_ms": 250}}"#)?;
            let yaml = Config::load(Some(Path::new("config.yaml"))).unwrap();
            assert!(!yaml.session_settings().input.left_click_next);
            let json = Config::load(Some(Path::new("config.json"))).unwrap();
            assert_eq!(json.debounce(), Duration::from_millis(250));
            Ok(())
        });
    }

    #[test]
    fn test_explicit_file_errors() {
        Jail::expect_with(|jail| {
            let err = Config::load(Some(Path::new("missing.toml"))).unwrap_err();
            assert!(matches!(&*err, ErrorKind::NotFound(_)));

            jail.create_file("config.ini", "workers = 2")?;
            let err = Config::load(Some(Path::new("config.ini"))).unwrap_err();
            assert!(matches!(&*err, ErrorKind::UnsupportedFormat(_)));

            jail.create_file("broken.toml", "[thumbnails]\nworkers = \"many\"")?;
            let err = Config::load(Some(Path::new("broken.toml"))).unwrap_err();
            assert!(matches!(&*err, ErrorKind::Parse));
            Ok(())
        });
    }

    #[rstest]
    #[case("[thumbnails]\nworkers = 0")]
    #[case("[thumbnails]\nmemory_entries = 0")]
    #[case("[thumbnails]\nmax_dimension = 0")]
    #[case("[thumbnails]\nrender_timeout_secs = 0")]
    #[case("[reading]\nauto_advance_secs = 0")]
    #[case("[reading]\nauto_advance_secs = 61")]
    #[case("[library]\nextensions = []")]
    #[case("[storage]\ndata_dir = \"relative/data\"")]
    fn test_validation_rejects(#[case] toml: &str) {
        Jail::expect_with(|jail| {
            jail.create_file("config.toml", toml)?;
            let err = Config::load(Some(Path::new("config.toml"))).unwrap_err();
            assert!(matches!(&*err, ErrorKind::Invalid(_)), "{toml}: {err:?}");
            Ok(())
        });
    }

    #[test]
    fn test_disk_capacity_from_env() {
        Jail::expect_with(|jail| {
            jail.create_file("config.toml", "")?;
            jail.set_env("HONDANA_THUMBNAILS__DISK_CAPACITY_BYTES", "1048576");
            let config = Config::load(Some(Path::new("config.toml"))).unwrap();
            assert_eq!(config.cache_settings().disk_capacity_bytes, Some(1_048_576));
            Ok(())
        });
    }
}
