//! `${VAR}` and `${VAR:-default}` expansion for configuration values.
//!
//! Bare `$VAR` is left alone so RCS templates and Windows paths survive.

use std::env;

use crate::ConfigError;

/// Expand variable references in `value`, naming `field` in errors.
pub(crate) fn expand_env(value: &str, field: &str) -> Result<String, ConfigError> {
    if !value.contains("${") {
        return Ok(value.to_owned());
    }

    shellexpand::env_with_context(value, |var| match env::var(var) {
        Ok(found) => Ok(Some(found)),
        Err(_) => Err(Unset(var.to_owned())),
    })
    .map(std::borrow::Cow::into_owned)
    .map_err(|e| ConfigError::EnvVar {
        field: field.to_owned(),
        message: format!("${{{}}} not set", e.cause.0),
    })
}

/// Expand an optional field in place.
pub(crate) fn expand_opt(value: &mut Option<String>, field: &str) -> Result<(), ConfigError> {
    if let Some(v) = value {
        *v = expand_env(v, field)?;
    }
    Ok(())
}

struct Unset(String);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_literal_passes_through() {
        assert_eq!(expand_env("pages", "provider.page_dir").unwrap(), "pages");
        assert_eq!(expand_env("co -p $HOME", "rcs.checkout").unwrap(), "co -p $HOME");
    }

    #[test]
    fn test_variable_and_default() {
        // SAFETY: the variable name is unique to this test
        unsafe {
            env::set_var("QUIRE_TEST_WIKI_ROOT", "/srv/wiki");
            env::remove_var("QUIRE_TEST_WIKI_UNSET");
        }

        assert_eq!(
            expand_env("${QUIRE_TEST_WIKI_ROOT}/pages", "provider.page_dir").unwrap(),
            "/srv/wiki/pages"
        );
        assert_eq!(
            expand_env("${QUIRE_TEST_WIKI_UNSET:-fallback}", "provider.page_dir").unwrap(),
            "fallback"
        );

        unsafe {
            env::remove_var("QUIRE_TEST_WIKI_ROOT");
        }
    }

    #[test]
    fn test_missing_variable_names_field() {
        // SAFETY: the variable name is unique to this test
        unsafe {
            env::remove_var("QUIRE_TEST_MISSING");
        }

        let err = expand_env("${QUIRE_TEST_MISSING}", "cache.index_dir").unwrap_err();

        assert!(matches!(err, ConfigError::EnvVar { .. }));
        let message = err.to_string();
        assert!(message.contains("QUIRE_TEST_MISSING"));
        assert!(message.contains("cache.index_dir"));
    }

    #[test]
    fn test_expand_opt_none_is_noop() {
        let mut value = None;

        expand_opt(&mut value, "attachments.storage_dir").unwrap();

        assert!(value.is_none());
    }
}
