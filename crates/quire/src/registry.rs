//! Backend registry: configured backend names mapped to constructors.

use std::sync::Arc;

use quire_cache::{CacheConfig, CachingProvider};
use quire_config::{CacheSettings, Config, RcsConfig};
use quire_store::{AttachmentProvider, PageProvider, ProviderError};
use quire_store_fs::{BasicAttachmentProvider, FileSystemProvider, VersioningFileProvider};
use quire_vcs::{CommandTemplates, RcsFileProvider};

use crate::error::CliError;

type Constructor = fn(&Config) -> Result<Arc<dyn PageProvider>, ProviderError>;

/// Known backends. Lookup is case-insensitive.
const BACKENDS: &[(&str, Constructor)] = &[
    ("filesystem", open_filesystem),
    ("versioning", open_versioning),
    ("rcs", open_rcs),
    ("FileSystemProvider", open_filesystem),
    ("VersioningFileProvider", open_versioning),
    ("RCSFileProvider", open_rcs),
];

/// Names accepted in `provider.backend`.
pub(crate) fn names() -> Vec<&'static str> {
    BACKENDS.iter().map(|(name, _)| *name).collect()
}

/// Open the configured page provider, wrapped in the cache when enabled.
pub(crate) fn open_pages(config: &Config) -> Result<Arc<dyn PageProvider>, CliError> {
    let name = &config.provider_resolved.backend;
    let (_, construct) = BACKENDS
        .iter()
        .find(|(known, _)| known.eq_ignore_ascii_case(name))
        .ok_or_else(|| CliError::UnknownBackend {
            name: name.clone(),
            available: names().join(", "),
        })?;

    let provider = construct(config)?;
    tracing::debug!(backend = %name, info = %provider.provider_info(), "Opened page provider");
    if !config.cache_resolved.enabled {
        return Ok(provider);
    }
    Ok(Arc::new(CachingProvider::new(
        provider,
        cache_config(&config.cache_resolved),
    )))
}

/// Open the attachment store.
pub(crate) fn open_attachments(config: &Config) -> Result<Box<dyn AttachmentProvider>, CliError> {
    let provider = BasicAttachmentProvider::new(config.attachments_dir.clone())?
        .with_encoding(config.provider_resolved.encoding);
    Ok(Box::new(provider))
}

fn open_filesystem(config: &Config) -> Result<Arc<dyn PageProvider>, ProviderError> {
    let p = &config.provider_resolved;
    let provider = FileSystemProvider::new(p.page_dir.clone())?
        .with_encoding(p.encoding, p.fallback_encoding);
    Ok(Arc::new(provider))
}

fn open_versioning(config: &Config) -> Result<Arc<dyn PageProvider>, ProviderError> {
    let p = &config.provider_resolved;
    let provider = VersioningFileProvider::new(p.page_dir.clone())?
        .with_encoding(p.encoding, p.fallback_encoding);
    Ok(Arc::new(provider))
}

fn open_rcs(config: &Config) -> Result<Arc<dyn PageProvider>, ProviderError> {
    let p = &config.provider_resolved;
    let provider = RcsFileProvider::new(p.page_dir.clone())?
        .with_encoding(p.encoding, p.fallback_encoding)
        .with_templates(rcs_templates(&config.rcs));
    Ok(Arc::new(provider))
}

fn cache_config(settings: &CacheSettings) -> CacheConfig {
    CacheConfig {
        check_interval: settings.check_interval,
        text_ttl: settings.text_ttl,
        history_ttl: settings.history_ttl,
        mtime_epsilon: settings.mtime_epsilon,
        index_dir: Some(settings.index_dir.clone()),
        optimize_every: settings.optimize_every,
    }
}

/// Configured templates over the built-in defaults.
fn rcs_templates(rcs: &RcsConfig) -> CommandTemplates {
    let defaults = CommandTemplates::default();
    CommandTemplates {
        checkin: rcs.checkin.clone().unwrap_or(defaults.checkin),
        checkout: rcs.checkout.clone().unwrap_or(defaults.checkout),
        log: rcs.log.clone().unwrap_or(defaults.log),
        full_log: rcs.full_log.clone().unwrap_or(defaults.full_log),
        delete_version: rcs.delete_version.clone().or(defaults.delete_version),
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use quire_store::{PageUpdate, Version};

    use super::*;

    fn config_for(dir: &std::path::Path, backend: &str, cache: bool) -> Config {
        let mut config = Config::default();
        config.provider_resolved.backend = backend.to_owned();
        config.provider_resolved.page_dir = dir.join("pages");
        config.cache_resolved.enabled = cache;
        config.cache_resolved.index_dir = dir.join("index");
        config.attachments_dir = dir.join("attachments");
        config
    }

    #[test]
    fn test_unknown_backend_lists_available() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_for(dir.path(), "jdbc", false);

        let err = open_pages(&config).err().unwrap();

        let message = err.to_string();
        assert!(message.contains("jdbc"));
        assert!(message.contains("versioning"));
    }

    #[test]
    fn test_lookup_is_case_insensitive() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_for(dir.path(), "VersioningFileProvider", false);

        let provider = open_pages(&config).unwrap();
        provider.put_page_text(&PageUpdate::new("Main"), "one").unwrap();
        provider.put_page_text(&PageUpdate::new("Main"), "two").unwrap();

        assert_eq!(provider.get_page_text("Main", Version::Number(1)).unwrap(), "one");
    }

    #[test]
    fn test_cache_wraps_backend() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_for(dir.path(), "filesystem", true);

        let provider = open_pages(&config).unwrap();

        assert!(provider.provider_info().starts_with("CachingProvider over"));
    }

    #[test]
    fn test_rcs_templates_overlay_defaults() {
        let rcs = RcsConfig {
            checkout: Some("co -q -p -r1.%v %s".to_owned()),
            ..RcsConfig::default()
        };

        let templates = rcs_templates(&rcs);

        assert_eq!(templates.checkout, "co -q -p -r1.%v %s");
        assert_eq!(templates.checkin, CommandTemplates::default().checkin);
        assert!(templates.delete_version.is_some());
    }

    #[test]
    fn test_open_attachments_creates_storage_dir() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_for(dir.path(), "filesystem", false);

        open_attachments(&config).unwrap();

        assert!(dir.path().join("attachments").is_dir());
    }
}
