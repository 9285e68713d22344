//! Configuration for quire.
//!
//! Parses `quire.toml` with serde, discovering it in the current directory
//! or any parent. Relative paths are resolved against the directory holding
//! the config file. [`CliSettings`] are applied last.
//!
//! ```toml
//! [provider]
//! backend = "versioning"        # filesystem | versioning | rcs
//! page_dir = "pages"
//! encoding = "UTF-8"
//! fallback_encoding = "ISO-8859-1"
//!
//! [cache]
//! enabled = true
//! check_interval_ms = 2000
//! text_ttl_secs = 300
//! history_ttl_secs = 60
//! mtime_epsilon_ms = 1
//! index_dir = ".quire/index"
//! optimize_every = 100
//!
//! [attachments]
//! storage_dir = "attachments"
//!
//! [rcs]
//! checkin = "ci -m\"author=%u;changenote=%c\" -l -t-none %s"
//! ```
//!
//! ## Environment Variable Expansion
//!
//! `${VAR}` and `${VAR:-default}` are expanded in `provider.page_dir`,
//! `cache.index_dir` and `attachments.storage_dir`.

mod expand;

use std::path::{Path, PathBuf};
use std::time::Duration;

use quire_store::Charset;
use serde::Deserialize;

/// Configuration filename to search for.
const CONFIG_FILENAME: &str = "quire.toml";

/// Backend used when none is configured.
pub const DEFAULT_BACKEND: &str = "versioning";

/// CLI settings that override configuration file values.
#[derive(Debug, Default)]
pub struct CliSettings {
    /// Override the storage backend.
    pub backend: Option<String>,
    /// Override the page directory.
    pub page_dir: Option<PathBuf>,
    /// Override the cache enabled flag.
    pub cache_enabled: Option<bool>,
}

/// Application configuration.
#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    provider: ProviderConfigRaw,
    cache: CacheConfigRaw,
    attachments: AttachmentsConfigRaw,
    /// External RCS command templates. Unset entries use the built-in defaults.
    pub rcs: RcsConfig,

    /// Resolved provider configuration (set after loading).
    #[serde(skip)]
    pub provider_resolved: ProviderConfig,
    /// Resolved cache configuration (set after loading).
    #[serde(skip)]
    pub cache_resolved: CacheSettings,
    /// Resolved attachment storage directory (set after loading).
    #[serde(skip)]
    pub attachments_dir: PathBuf,
    /// Path to the config file (set after loading).
    #[serde(skip)]
    pub config_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self::default_with_base(Path::new("."))
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct ProviderConfigRaw {
    backend: Option<String>,
    page_dir: Option<String>,
    encoding: Option<String>,
    fallback_encoding: Option<String>,
}

/// Resolved page storage settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderConfig {
    /// Registry name of the backend.
    pub backend: String,
    /// Directory holding page files.
    pub page_dir: PathBuf,
    /// Charset for names and text.
    pub encoding: Charset,
    /// Charset tried when text does not decode with `encoding`.
    pub fallback_encoding: Charset,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            backend: DEFAULT_BACKEND.to_owned(),
            page_dir: PathBuf::from("pages"),
            encoding: Charset::Utf8,
            fallback_encoding: Charset::Latin1,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct CacheConfigRaw {
    enabled: Option<bool>,
    check_interval_ms: Option<u64>,
    text_ttl_secs: Option<u64>,
    history_ttl_secs: Option<u64>,
    mtime_epsilon_ms: Option<u64>,
    index_dir: Option<String>,
    optimize_every: Option<usize>,
}

/// Resolved cache settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheSettings {
    /// Whether the caching layer wraps the provider.
    pub enabled: bool,
    /// Minimum time between consistency checks of one page.
    pub check_interval: Duration,
    /// Age after which cached text is revalidated.
    pub text_ttl: Duration,
    /// Age after which a cached history is refetched.
    pub history_ttl: Duration,
    /// Tolerance when comparing modification times.
    pub mtime_epsilon: Duration,
    /// Search index directory.
    pub index_dir: PathBuf,
    /// Index updates between optimize-and-persist passes.
    pub optimize_every: usize,
}

impl CacheSettings {
    fn default_with_base(base: &Path) -> Self {
        Self {
            enabled: true,
            check_interval: Duration::from_secs(2),
            text_ttl: Duration::from_secs(300),
            history_ttl: Duration::from_secs(60),
            mtime_epsilon: Duration::from_millis(1),
            index_dir: base.join(".quire").join("index"),
            optimize_every: 100,
        }
    }
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self::default_with_base(Path::new("."))
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct AttachmentsConfigRaw {
    storage_dir: Option<String>,
}

/// Command templates for the RCS backend.
///
/// Placeholders: `%s` file, `%u` author, `%c` change note, `%v` version.
#[derive(Debug, Default, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RcsConfig {
    /// Check-in command.
    pub checkin: Option<String>,
    /// Check-out of one revision to stdout.
    pub checkout: Option<String>,
    /// Log of the head revision.
    pub log: Option<String>,
    /// Log of every revision.
    pub full_log: Option<String>,
    /// Removal of one revision.
    pub delete_version: Option<String>,
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File not found.
    #[error("Configuration file not found: {}", .0.display())]
    NotFound(PathBuf),
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// TOML parsing error.
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),
    /// Validation error.
    #[error("Configuration error: {0}")]
    Validation(String),
    /// Environment variable error during expansion.
    #[error("Environment variable error in {field}: {message}")]
    EnvVar {
        /// Config field path (e.g., "`provider.page_dir`").
        field: String,
        /// Error message (e.g., "${`WIKI_ROOT`} not set").
        message: String,
    },
}

fn require_non_empty(value: &str, field: &str) -> Result<(), ConfigError> {
    if value.trim().is_empty() {
        return Err(ConfigError::Validation(format!("{field} cannot be empty")));
    }
    Ok(())
}

fn parse_charset(label: &str, field: &str) -> Result<Charset, ConfigError> {
    label
        .parse()
        .map_err(|_| ConfigError::Validation(format!("{field}: unsupported charset '{label}'")))
}

impl Config {
    /// Load configuration from file with optional CLI settings.
    ///
    /// If `config_path` is provided, loads from that file. Otherwise searches
    /// for `quire.toml` in the current directory and its parents, falling
    /// back to defaults relative to the current directory.
    ///
    /// # Errors
    ///
    /// Returns error if an explicit `config_path` doesn't exist, parsing
    /// fails, or the result does not validate.
    pub fn load(
        config_path: Option<&Path>,
        cli_settings: Option<&CliSettings>,
    ) -> Result<Self, ConfigError> {
        let mut config = if let Some(path) = config_path {
            if !path.exists() {
                return Err(ConfigError::NotFound(path.to_path_buf()));
            }
            Self::load_from_file(path)?
        } else if let Some(discovered) = Self::discover_config() {
            Self::load_from_file(&discovered)?
        } else {
            Self::default_with_cwd()
        };

        if let Some(settings) = cli_settings {
            config.apply_cli_settings(settings);
            config.validate()?;
        }

        Ok(config)
    }

    fn apply_cli_settings(&mut self, settings: &CliSettings) {
        if let Some(backend) = &settings.backend {
            self.provider_resolved.backend.clone_from(backend);
        }
        if let Some(page_dir) = &settings.page_dir {
            self.provider_resolved.page_dir.clone_from(page_dir);
        }
        if let Some(enabled) = settings.cache_enabled {
            self.cache_resolved.enabled = enabled;
        }
    }

    fn discover_config() -> Option<PathBuf> {
        let mut current = std::env::current_dir().ok()?;
        loop {
            let candidate = current.join(CONFIG_FILENAME);
            if candidate.exists() {
                return Some(candidate);
            }
            if !current.pop() {
                return None;
            }
        }
    }

    fn default_with_cwd() -> Self {
        let cwd = std::env::current_dir().unwrap_or_default();
        Self::default_with_base(&cwd)
    }

    fn default_with_base(base: &Path) -> Self {
        Self {
            provider: ProviderConfigRaw::default(),
            cache: CacheConfigRaw::default(),
            attachments: AttachmentsConfigRaw::default(),
            rcs: RcsConfig::default(),
            provider_resolved: ProviderConfig {
                page_dir: base.join("pages"),
                ..ProviderConfig::default()
            },
            cache_resolved: CacheSettings::default_with_base(base),
            attachments_dir: base.join("attachments"),
            config_path: None,
        }
    }

    fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let mut config: Self = toml::from_str(&content)?;

        config.expand_env_vars()?;

        let config_dir = path.parent().unwrap_or(Path::new("."));
        config.resolve_paths(config_dir)?;
        config.config_path = Some(path.to_path_buf());

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Validation` if any check fails.
    pub fn validate(&self) -> Result<(), ConfigError> {
        require_non_empty(&self.provider_resolved.backend, "provider.backend")?;
        if self.provider_resolved.page_dir.as_os_str().is_empty() {
            return Err(ConfigError::Validation(
                "provider.page_dir cannot be empty".to_owned(),
            ));
        }
        if self.cache_resolved.optimize_every == 0 {
            return Err(ConfigError::Validation(
                "cache.optimize_every must be greater than 0".to_owned(),
            ));
        }
        for (field, template) in [
            ("rcs.checkin", &self.rcs.checkin),
            ("rcs.checkout", &self.rcs.checkout),
            ("rcs.log", &self.rcs.log),
            ("rcs.full_log", &self.rcs.full_log),
            ("rcs.delete_version", &self.rcs.delete_version),
        ] {
            if let Some(template) = template {
                require_non_empty(template, field)?;
                if !template.contains("%s") {
                    return Err(ConfigError::Validation(format!(
                        "{field} must reference the file with %s"
                    )));
                }
            }
        }
        Ok(())
    }

    fn expand_env_vars(&mut self) -> Result<(), ConfigError> {
        expand::expand_opt(&mut self.provider.page_dir, "provider.page_dir")?;
        expand::expand_opt(&mut self.cache.index_dir, "cache.index_dir")?;
        expand::expand_opt(&mut self.attachments.storage_dir, "attachments.storage_dir")?;
        Ok(())
    }

    /// Resolve relative paths against `config_dir` and parse charsets.
    fn resolve_paths(&mut self, config_dir: &Path) -> Result<(), ConfigError> {
        let resolve = |path: Option<&str>, default: &str| config_dir.join(path.unwrap_or(default));
        let defaults = CacheSettings::default_with_base(config_dir);

        let encoding = match &self.provider.encoding {
            Some(label) => parse_charset(label, "provider.encoding")?,
            None => Charset::Utf8,
        };
        let fallback_encoding = match &self.provider.fallback_encoding {
            Some(label) => parse_charset(label, "provider.fallback_encoding")?,
            None => Charset::Latin1,
        };

        self.provider_resolved = ProviderConfig {
            backend: self
                .provider
                .backend
                .clone()
                .unwrap_or_else(|| DEFAULT_BACKEND.to_owned()),
            page_dir: resolve(self.provider.page_dir.as_deref(), "pages"),
            encoding,
            fallback_encoding,
        };
        self.cache_resolved = CacheSettings {
            enabled: self.cache.enabled.unwrap_or(defaults.enabled),
            check_interval: self
                .cache
                .check_interval_ms
                .map_or(defaults.check_interval, Duration::from_millis),
            text_ttl: self
                .cache
                .text_ttl_secs
                .map_or(defaults.text_ttl, Duration::from_secs),
            history_ttl: self
                .cache
                .history_ttl_secs
                .map_or(defaults.history_ttl, Duration::from_secs),
            mtime_epsilon: self
                .cache
                .mtime_epsilon_ms
                .map_or(defaults.mtime_epsilon, Duration::from_millis),
            index_dir: self
                .cache
                .index_dir
                .as_deref()
                .map_or(defaults.index_dir, |dir| config_dir.join(dir)),
            optimize_every: self.cache.optimize_every.unwrap_or(defaults.optimize_every),
        };
        self.attachments_dir = resolve(self.attachments.storage_dir.as_deref(), "attachments");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn parse(toml: &str) -> Config {
        let mut config: Config = toml::from_str(toml).unwrap();
        config.resolve_paths(Path::new("/wiki")).unwrap();
        config
    }

    #[test]
    fn test_default_config() {
        let config = Config::default_with_base(Path::new("/test"));

        assert_eq!(config.provider_resolved.backend, "versioning");
        assert_eq!(config.provider_resolved.page_dir, PathBuf::from("/test/pages"));
        assert_eq!(config.provider_resolved.encoding, Charset::Utf8);
        assert_eq!(config.attachments_dir, PathBuf::from("/test/attachments"));
        assert!(config.cache_resolved.enabled);
        assert_eq!(
            config.cache_resolved.index_dir,
            PathBuf::from("/test/.quire/index")
        );
        assert_eq!(config.cache_resolved.check_interval, Duration::from_secs(2));
    }

    #[test]
    fn test_empty_file_matches_defaults() {
        let config = parse("");

        assert_eq!(
            config.cache_resolved,
            CacheSettings::default_with_base(Path::new("/wiki"))
        );
        assert_eq!(config.provider_resolved.page_dir, PathBuf::from("/wiki/pages"));
        assert_eq!(config.provider_resolved.fallback_encoding, Charset::Latin1);
    }

    #[test]
    fn test_parse_full_config() {
        let config = parse(
            r#"
[provider]
backend = "rcs"
page_dir = "data/pages"
encoding = "ISO-8859-1"
fallback_encoding = "US-ASCII"

[cache]
enabled = false
check_interval_ms = 500
text_ttl_secs = 10
history_ttl_secs = 5
mtime_epsilon_ms = 20
index_dir = "/var/cache/quire"
optimize_every = 7

[attachments]
storage_dir = "files"

[rcs]
checkout = "co -q -p -r1.%v %s"
"#,
        );

        assert_eq!(
            config.provider_resolved,
            ProviderConfig {
                backend: "rcs".to_owned(),
                page_dir: PathBuf::from("/wiki/data/pages"),
                encoding: Charset::Latin1,
                fallback_encoding: Charset::Ascii,
            }
        );
        assert_eq!(
            config.cache_resolved,
            CacheSettings {
                enabled: false,
                check_interval: Duration::from_millis(500),
                text_ttl: Duration::from_secs(10),
                history_ttl: Duration::from_secs(5),
                mtime_epsilon: Duration::from_millis(20),
                index_dir: PathBuf::from("/var/cache/quire"),
                optimize_every: 7,
            }
        );
        assert_eq!(config.attachments_dir, PathBuf::from("/wiki/files"));
        assert_eq!(config.rcs.checkout.as_deref(), Some("co -q -p -r1.%v %s"));
        assert!(config.rcs.checkin.is_none());
    }

    #[test]
    fn test_unknown_charset_rejected() {
        let mut config: Config = toml::from_str("[provider]\nencoding = \"EBCDIC\"\n").unwrap();

        let err = config.resolve_paths(Path::new("/wiki")).unwrap_err();

        assert!(matches!(err, ConfigError::Validation(_)));
        assert!(err.to_string().contains("EBCDIC"));
    }

    #[test]
    fn test_unknown_field_rejected() {
        let result: Result<Config, _> = toml::from_str("[provider]\npagedir = \"x\"\n");

        assert!(result.is_err());
    }

    #[test]
    fn test_template_without_file_placeholder_rejected() {
        let config = parse("[rcs]\ncheckin = \"ci -l\"\n");

        let err = config.validate().unwrap_err();

        assert!(err.to_string().contains("rcs.checkin"));
    }

    #[test]
    fn test_zero_optimize_interval_rejected() {
        let config = parse("[cache]\noptimize_every = 0\n");

        assert!(config.validate().is_err());
    }

    #[test]
    fn test_apply_cli_settings() {
        let mut config = Config::default_with_base(Path::new("/test"));
        let overrides = CliSettings {
            backend: Some("filesystem".to_owned()),
            page_dir: Some(PathBuf::from("/elsewhere")),
            cache_enabled: Some(false),
        };

        config.apply_cli_settings(&overrides);

        assert_eq!(config.provider_resolved.backend, "filesystem");
        assert_eq!(config.provider_resolved.page_dir, PathBuf::from("/elsewhere"));
        assert!(!config.cache_resolved.enabled);
    }

    #[test]
    fn test_apply_empty_cli_settings() {
        let before = Config::default_with_base(Path::new("/test"));
        let mut config = Config::default_with_base(Path::new("/test"));

        config.apply_cli_settings(&CliSettings::default());

        assert_eq!(config.provider_resolved, before.provider_resolved);
        assert_eq!(config.cache_resolved, before.cache_resolved);
    }

    #[test]
    fn test_load_from_file_resolves_against_config_dir() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILENAME);
        std::fs::write(&path, "[provider]\nbackend = \"filesystem\"\n").unwrap();

        let config = Config::load(Some(path.as_path()), None).unwrap();

        assert_eq!(config.provider_resolved.backend, "filesystem");
        assert_eq!(config.provider_resolved.page_dir, dir.path().join("pages"));
        assert_eq!(config.config_path, Some(path));
    }

    #[test]
    fn test_load_missing_explicit_path() {
        let err = Config::load(Some(Path::new("/nonexistent/quire.toml")), None).unwrap_err();

        assert!(matches!(err, ConfigError::NotFound(_)));
    }

    #[test]
    fn test_expand_env_in_page_dir() {
        // SAFETY: the variable name is unique to this test
        unsafe {
            std::env::set_var("QUIRE_TEST_PAGE_ROOT", "/srv/wiki");
        }
        let mut config: Config =
            toml::from_str("[provider]\npage_dir = \"${QUIRE_TEST_PAGE_ROOT}/pages\"\n").unwrap();

        config.expand_env_vars().unwrap();
        config.resolve_paths(Path::new("/wiki")).unwrap();

        assert_eq!(
            config.provider_resolved.page_dir,
            PathBuf::from("/srv/wiki/pages")
        );
        unsafe {
            std::env::remove_var("QUIRE_TEST_PAGE_ROOT");
        }
    }
}
