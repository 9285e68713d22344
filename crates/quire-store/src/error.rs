//! Provider error type.
//!
//! Every backend reports failures through [`ProviderError`], a semantic kind
//! plus optional context (page name, version, path, backend) and the
//! underlying cause. Callers branch on [`ProviderErrorKind`]; the source chain
//! is kept intact for logging.

use std::path::PathBuf;

/// Semantic error categories shared by all providers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum ProviderErrorKind {
    /// Page, attachment or version does not exist.
    NotFound,
    /// Version number out of range, or an external tool produced a
    /// different revision than the one requested.
    NoSuchVersion,
    /// The backing store changed outside the application. The caller must
    /// drop any reference it holds and fetch again.
    RepositoryModified,
    /// I/O failure, malformed tool output or corrupt directory structure.
    Provider,
}

/// Provider error with semantic kind and backend-specific source.
#[derive(Debug)]
pub struct ProviderError {
    /// Semantic error category.
    pub kind: ProviderErrorKind,
    /// Page (or attachment) name, if the error concerns one.
    pub name: Option<String>,
    /// Version number, if the error concerns a specific revision.
    pub version: Option<u32>,
    /// Filesystem path context.
    pub path: Option<PathBuf>,
    /// Backend identifier (e.g., "Fs", "Versioning", "Rcs", "Cache").
    pub backend: Option<&'static str>,
    message: Option<String>,
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl ProviderError {
    /// Create a new provider error.
    #[must_use]
    pub fn new(kind: ProviderErrorKind) -> Self {
        Self {
            kind,
            name: None,
            version: None,
            path: None,
            backend: None,
            message: None,
            source: None,
        }
    }

    /// Attach page name context.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Attach version context.
    #[must_use]
    pub fn with_version(mut self, version: u32) -> Self {
        self.version = Some(version);
        self
    }

    /// Attach path context.
    #[must_use]
    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Attach backend identifier.
    #[must_use]
    pub fn with_backend(mut self, backend: &'static str) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Attach a human-readable message.
    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Attach the underlying error source.
    #[must_use]
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Downcast the source error to a concrete type.
    #[must_use]
    pub fn downcast_source<E: std::error::Error + 'static>(&self) -> Option<&E> {
        self.source.as_ref()?.downcast_ref()
    }

    /// Create a not found error for a page.
    #[must_use]
    pub fn not_found(name: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::NotFound).with_name(name)
    }

    /// Create a no-such-version error.
    #[must_use]
    pub fn no_such_version(name: impl Into<String>, version: u32) -> Self {
        Self::new(ProviderErrorKind::NoSuchVersion)
            .with_name(name)
            .with_version(version)
    }

    /// Create a repository-modified error for a page.
    #[must_use]
    pub fn repository_modified(name: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::RepositoryModified).with_name(name)
    }

    /// Create a catch-all provider error with a message.
    #[must_use]
    pub fn provider(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::Provider).with_message(message)
    }

    /// Create a provider error from an I/O error.
    ///
    /// `NotFound` I/O errors keep their meaning; everything else becomes
    /// [`ProviderErrorKind::Provider`].
    #[must_use]
    pub fn io(err: std::io::Error, path: Option<PathBuf>) -> Self {
        let kind = match err.kind() {
            std::io::ErrorKind::NotFound => ProviderErrorKind::NotFound,
            _ => ProviderErrorKind::Provider,
        };
        let mut error = Self::new(kind).with_source(err);
        if let Some(p) = path {
            error = error.with_path(p);
        }
        error
    }

    /// True if the page or version is missing.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(
            self.kind,
            ProviderErrorKind::NotFound | ProviderErrorKind::NoSuchVersion
        )
    }

    /// True if the caller should discard held references and re-fetch.
    #[must_use]
    pub fn is_repository_modified(&self) -> bool {
        self.kind == ProviderErrorKind::RepositoryModified
    }
}

impl std::fmt::Display for ProviderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Format: "[Backend] Kind: message: source (page: Name, version: 3, path: /foo)"
        if let Some(backend) = self.backend {
            write!(f, "[{backend}] ")?;
        }

        let kind_str = match self.kind {
            ProviderErrorKind::NotFound => "Not found",
            ProviderErrorKind::NoSuchVersion => "No such version",
            ProviderErrorKind::RepositoryModified => "Repository modified",
            ProviderErrorKind::Provider => "Provider error",
        };
        write!(f, "{kind_str}")?;

        if let Some(message) = &self.message {
            write!(f, ": {message}")?;
        }
        if let Some(source) = &self.source {
            write!(f, ": {source}")?;
        }

        let mut context = Vec::new();
        if let Some(name) = &self.name {
            context.push(format!("page: {name}"));
        }
        if let Some(version) = self.version {
            context.push(format!("version: {version}"));
        }
        if let Some(path) = &self.path {
            context.push(format!("path: {}", path.display()));
        }
        if !context.is_empty() {
            write!(f, " ({})", context.join(", "))?;
        }

        Ok(())
    }
}

impl std::error::Error for ProviderError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|s| s.as_ref() as &(dyn std::error::Error + 'static))
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::*;

    #[test]
    fn test_new_has_no_context() {
        let err = ProviderError::new(ProviderErrorKind::Provider);

        assert_eq!(err.kind, ProviderErrorKind::Provider);
        assert!(err.name.is_none());
        assert!(err.version.is_none());
        assert!(err.path.is_none());
        assert!(err.backend.is_none());
    }

    #[test]
    fn test_no_such_version_carries_context() {
        let err = ProviderError::no_such_version("Main", 7);

        assert_eq!(err.kind, ProviderErrorKind::NoSuchVersion);
        assert_eq!(err.name.as_deref(), Some("Main"));
        assert_eq!(err.version, Some(7));
        assert!(err.is_not_found());
    }

    #[test]
    fn test_io_not_found_maps_to_not_found() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err = ProviderError::io(io_err, Some(PathBuf::from("/pages/Main.txt")));

        assert_eq!(err.kind, ProviderErrorKind::NotFound);
        assert_eq!(err.path.as_deref(), Some(Path::new("/pages/Main.txt")));
        assert!(err.downcast_source::<std::io::Error>().is_some());
    }

    #[test]
    fn test_io_other_maps_to_provider() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err = ProviderError::io(io_err, None);

        assert_eq!(err.kind, ProviderErrorKind::Provider);
        assert!(!err.is_not_found());
    }

    #[test]
    fn test_repository_modified_predicate() {
        let err = ProviderError::repository_modified("Main");

        assert!(err.is_repository_modified());
        assert!(!err.is_not_found());
    }

    #[test]
    fn test_display_simple() {
        let err = ProviderError::new(ProviderErrorKind::NotFound);

        assert_eq!(err.to_string(), "Not found");
    }

    #[test]
    fn test_display_full() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err = ProviderError::new(ProviderErrorKind::NotFound)
            .with_backend("Fs")
            .with_name("Main")
            .with_version(2)
            .with_path("/pages/Main.txt")
            .with_source(io_err);

        assert_eq!(
            err.to_string(),
            "[Fs] Not found: file not found (page: Main, version: 2, path: /pages/Main.txt)"
        );
    }

    #[test]
    fn test_display_message() {
        let err = ProviderError::provider("checkin failed").with_backend("Rcs");

        assert_eq!(err.to_string(), "[Rcs] Provider error: checkin failed");
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<ProviderError>();
    }
}
