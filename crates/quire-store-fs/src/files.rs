//! Small filesystem helpers shared by the providers.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use quire_store::{Properties, ProviderError};

/// Sibling path used for staging a write to `path`.
pub(crate) fn temp_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{name}.tmp"))
}

/// Write `bytes` to a temporary sibling, sync it, and return the temp path.
///
/// The caller renames the temp file into place with [`commit`].
pub(crate) fn stage(path: &Path, bytes: &[u8]) -> io::Result<PathBuf> {
    let tmp = temp_path(path);
    let result = File::create(&tmp).and_then(|mut file| {
        file.write_all(bytes)?;
        file.sync_all()
    });
    if let Err(e) = result {
        discard(&tmp);
        return Err(e);
    }
    Ok(tmp)
}

/// Move a staged file into place.
pub(crate) fn commit(tmp: &Path, path: &Path) -> io::Result<()> {
    fs::rename(tmp, path).inspect_err(|_| discard(tmp))
}

/// Replace `path` with `bytes` atomically.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let tmp = stage(path, bytes)?;
    commit(&tmp, path)
}

/// Best-effort removal of a file during error unwind.
pub(crate) fn discard(path: &Path) {
    if let Err(e) = fs::remove_file(path)
        && e.kind() != io::ErrorKind::NotFound
    {
        tracing::warn!(path = %path.display(), error = %e, "Failed to clean up file");
    }
}

/// Remove a file, treating "already gone" as success.
pub(crate) fn remove_if_exists(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

/// Remove a directory tree, treating "already gone" as success.
pub(crate) fn remove_dir_if_exists(path: &Path) -> io::Result<()> {
    match fs::remove_dir_all(path) {
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

/// Copy a file and give the copy the source's modification time.
pub(crate) fn copy_preserving_mtime(from: &Path, to: &Path) -> io::Result<()> {
    let modified = fs::metadata(from)?.modified()?;
    fs::copy(from, to)?;
    File::options().write(true).open(to)?.set_modified(modified)
}

/// Modification time and size, or `None` if the file does not exist.
pub(crate) fn stat(path: &Path) -> io::Result<Option<(SystemTime, u64)>> {
    match fs::metadata(path) {
        Ok(meta) if meta.is_file() => Ok(Some((meta.modified()?, meta.len()))),
        Ok(_) => Ok(None),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

/// Load a properties file; a missing file reads as empty.
pub(crate) fn read_properties(path: &Path) -> Result<Properties, ProviderError> {
    match fs::read_to_string(path) {
        Ok(text) => Ok(Properties::parse(&text)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Properties::new()),
        Err(e) => Err(ProviderError::io(e, Some(path.to_path_buf()))),
    }
}

/// Highest `N` among keys of the form `N.<field>`.
pub(crate) fn max_recorded_version(props: &Properties) -> u32 {
    props
        .iter()
        .filter_map(|(key, _)| key.split_once('.')?.0.parse::<u32>().ok())
        .max()
        .unwrap_or(0)
}

/// Numbered files `N.<ext>` in `dir`, ascending. Missing dir yields nothing.
pub(crate) fn numbered_files(dir: &Path) -> io::Result<Vec<u32>> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };
    let mut versions = Vec::new();
    for entry in entries {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let name = entry.file_name();
        let Some((stem, _)) = name.to_str().and_then(|n| n.split_once('.')) else {
            continue;
        };
        if let Ok(version) = stem.parse::<u32>() {
            versions.push(version);
        }
    }
    versions.sort_unstable();
    Ok(versions)
}
