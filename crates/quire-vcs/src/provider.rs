//! Page provider that delegates versioning to RCS.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use quire_store::{
    Charset, PageInfo, PageProvider, PageUpdate, ProviderError, QueryItem, SearchResult, Version,
    decode_with_fallback,
};
use quire_store_fs::FileSystemProvider;

use crate::log::{LogEntry, confirmed_version, parse_log};
use crate::runner::{CommandOutput, CommandRunner, ShellRunner};
use crate::template::{CommandTemplates, Substitutions, expand};

/// Backend identifier for error messages.
const BACKEND: &str = "Rcs";

/// Directory holding `,v` archives.
const RCS_DIR: &str = "RCS";

/// Page provider backed by the RCS command-line tools.
///
/// The working file in the page directory always holds the latest text and
/// is read directly. Check-in, historical check-out, logs and revision
/// removal run the configured [`CommandTemplates`] with the page directory as
/// working directory.
///
/// Process calls are synchronous and block the calling thread.
pub struct RcsFileProvider {
    store: FileSystemProvider,
    templates: CommandTemplates,
    runner: Arc<dyn CommandRunner>,
    encoding: Charset,
    fallback_encoding: Charset,
}

impl std::fmt::Debug for RcsFileProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RcsFileProvider")
            .field("page_dir", &self.store.page_dir())
            .field("templates", &self.templates)
            .finish_non_exhaustive()
    }
}

impl RcsFileProvider {
    /// Open a page directory with the default templates and the shell runner.
    ///
    /// Creates `<page_dir>/RCS` so archives stay out of the page listing.
    pub fn new(page_dir: PathBuf) -> Result<Self, ProviderError> {
        let store = FileSystemProvider::new(page_dir)?;
        let rcs_dir = store.page_dir().join(RCS_DIR);
        fs::create_dir_all(&rcs_dir)
            .map_err(|e| ProviderError::io(e, Some(rcs_dir)).with_backend(BACKEND))?;
        Ok(Self {
            store,
            templates: CommandTemplates::default(),
            runner: Arc::new(ShellRunner),
            encoding: Charset::Utf8,
            fallback_encoding: Charset::Latin1,
        })
    }

    /// Replace the command templates.
    #[must_use]
    pub fn with_templates(mut self, templates: CommandTemplates) -> Self {
        self.templates = templates;
        self
    }

    /// Replace the process runner.
    #[must_use]
    pub fn with_runner(mut self, runner: Arc<dyn CommandRunner>) -> Self {
        self.runner = runner;
        self
    }

    /// Use a different storage charset and read fallback.
    #[must_use]
    pub fn with_encoding(mut self, encoding: Charset, fallback_encoding: Charset) -> Self {
        self.store = self.store.with_encoding(encoding, fallback_encoding);
        self.encoding = encoding;
        self.fallback_encoding = fallback_encoding;
        self
    }

    /// Directory holding the working files.
    #[must_use]
    pub fn page_dir(&self) -> &Path {
        self.store.page_dir()
    }

    fn working_file_name(&self, name: &str) -> Result<String, ProviderError> {
        let path = self.store.page_file(name)?;
        Ok(path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default())
    }

    fn run(
        &self,
        name: &str,
        template: &str,
        author: Option<&str>,
        changenote: Option<&str>,
        version: Option<u32>,
    ) -> Result<CommandOutput, ProviderError> {
        let file = self.working_file_name(name)?;
        let subs = Substitutions {
            file: &file,
            author,
            changenote,
            version,
        };
        let command = expand(template, &subs, self.encoding).map_err(|e| {
            ProviderError::provider("cannot encode command arguments")
                .with_name(name)
                .with_backend(BACKEND)
                .with_source(e)
        })?;
        tracing::debug!(page = %name, command = %command, "Running RCS command");
        self.runner
            .run(&command, self.store.page_dir())
            .map_err(|e| {
                ProviderError::io(e, Some(self.store.page_dir().to_path_buf()))
                    .with_name(name)
                    .with_backend(BACKEND)
                    .with_message(format!("failed to start `{command}`"))
            })
    }

    fn run_checked(
        &self,
        name: &str,
        template: &str,
        author: Option<&str>,
        changenote: Option<&str>,
        version: Option<u32>,
    ) -> Result<CommandOutput, ProviderError> {
        let output = self.run(name, template, author, changenote, version)?;
        if !output.success() {
            return Err(command_failed(name, &output));
        }
        Ok(output)
    }

    /// Parsed full history, newest first. Empty if the page has no archive.
    fn full_log(&self, name: &str) -> Result<Vec<LogEntry>, ProviderError> {
        let output = self.run(name, &self.templates.full_log, None, None, None)?;
        if !output.success() {
            tracing::debug!(page = %name, stderr = %output.stderr_text().trim(), "No RCS history");
            return Ok(Vec::new());
        }
        Ok(parse_log(&output.stdout_text(), self.encoding))
    }

    /// Head revision log entry, if the page has an archive.
    fn head_entry(&self, name: &str) -> Result<Option<LogEntry>, ProviderError> {
        let output = self.run(name, &self.templates.log, None, None, None)?;
        if !output.success() {
            return Ok(None);
        }
        Ok(parse_log(&output.stdout_text(), self.encoding)
            .into_iter()
            .next())
    }

    /// Latest metadata: working file stat plus head log entry.
    fn latest_info(&self, name: &str) -> Result<Option<PageInfo>, ProviderError> {
        let Some((modified, size)) = self.store.current_stat(name)? else {
            return Ok(None);
        };
        let head = self.head_entry(name)?;
        let version = head.as_ref().map_or(1, |e| e.version);
        let mut info = PageInfo::new(name, version, modified, size);
        if let Some(entry) = head {
            apply_entry(&mut info, entry);
        }
        Ok(Some(info))
    }

    fn latest_version(&self, name: &str) -> Result<u32, ProviderError> {
        Ok(self.head_entry(name)?.map_or(1, |e| e.version))
    }

    fn checkout(&self, name: &str, version: u32) -> Result<String, ProviderError> {
        let output = self.run(name, &self.templates.checkout, None, None, Some(version))?;
        if !output.success() {
            return Err(command_failed(name, &output).with_version(version));
        }
        match confirmed_version(&output.stderr_text()) {
            Some(v) if v == version => {}
            Some(v) => {
                tracing::debug!(page = %name, requested = version, got = v, "Checked out wrong revision");
                return Err(ProviderError::no_such_version(name, version).with_backend(BACKEND));
            }
            None => {
                return Err(ProviderError::provider("checkout did not confirm a revision")
                    .with_name(name)
                    .with_version(version)
                    .with_backend(BACKEND));
            }
        }
        decode_with_fallback(&output.stdout, self.encoding, self.fallback_encoding).map_err(|e| {
            ProviderError::provider("charset conversion failed")
                .with_name(name)
                .with_version(version)
                .with_backend(BACKEND)
                .with_source(e)
        })
    }

    fn archive_files(&self, name: &str) -> Result<[PathBuf; 2], ProviderError> {
        let file = self.working_file_name(name)?;
        let archive = format!("{file},v");
        Ok([
            self.store.page_dir().join(RCS_DIR).join(&archive),
            self.store.page_dir().join(archive),
        ])
    }
}

fn apply_entry(info: &mut PageInfo, entry: LogEntry) {
    info.author = entry.author;
    if let Some(note) = entry.changenote {
        info.attributes
            .insert(quire_store::CHANGENOTE.to_owned(), note);
    }
}

fn command_failed(name: &str, output: &CommandOutput) -> ProviderError {
    let code = output
        .code
        .map_or_else(|| "signal".to_owned(), |c| c.to_string());
    ProviderError::provider(format!(
        "command exited with {code}: {}",
        output.stderr_text().trim()
    ))
    .with_name(name)
    .with_backend(BACKEND)
}

impl PageProvider for RcsFileProvider {
    fn put_page_text(&self, page: &PageUpdate, text: &str) -> Result<(), ProviderError> {
        let name = page.name.as_str();
        let path = self.store.page_file(name)?;
        let _guard = self.store.locks().lock(name);

        let previous = match fs::read(&path) {
            Ok(bytes) => Some(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => {
                return Err(ProviderError::io(e, Some(path))
                    .with_name(name)
                    .with_backend(BACKEND));
            }
        };
        self.store.write_current(name, text)?;

        let checkin = self.run_checked(
            name,
            &self.templates.checkin,
            page.author.as_deref(),
            page.changenote(),
            None,
        );
        if let Err(e) = checkin {
            let restored = match &previous {
                Some(bytes) => fs::write(&path, bytes),
                None => fs::remove_file(&path),
            };
            if let Err(restore_err) = restored {
                tracing::warn!(page = %name, error = %restore_err, "Failed to restore working file");
            }
            return Err(e);
        }
        tracing::debug!(page = %name, author = page.author.as_deref(), "Checked in revision");
        Ok(())
    }

    fn get_page_text(&self, name: &str, version: Version) -> Result<String, ProviderError> {
        let path = self.store.page_file(name)?;
        if !path.is_file() {
            return Err(ProviderError::not_found(name).with_backend(BACKEND));
        }
        let Version::Number(number) = version else {
            return self.store.read_text(name, &path);
        };
        let latest = self.latest_version(name)?;
        if number == 0 || number > latest {
            return Err(ProviderError::no_such_version(name, number).with_backend(BACKEND));
        }
        if number == latest {
            return self.store.read_text(name, &path);
        }
        self.checkout(name, number)
    }

    fn get_page_info(
        &self,
        name: &str,
        version: Version,
    ) -> Result<Option<PageInfo>, ProviderError> {
        let Some(latest) = self.latest_info(name)? else {
            return Ok(None);
        };
        let number = match version {
            Version::Latest => return Ok(Some(latest)),
            Version::Number(n) if n == latest.version => return Ok(Some(latest)),
            Version::Number(n) => n,
        };
        Ok(self
            .get_version_history(name)?
            .into_iter()
            .find(|info| info.version == number))
    }

    fn get_version_history(&self, name: &str) -> Result<Vec<PageInfo>, ProviderError> {
        let Some((modified, size)) = self.store.current_stat(name)? else {
            return Ok(Vec::new());
        };
        let entries = self.full_log(name)?;
        if entries.is_empty() {
            return Ok(vec![PageInfo::new(name, 1, modified, size)]);
        }
        let head = entries.iter().map(|e| e.version).max().unwrap_or(1);
        Ok(entries
            .into_iter()
            .map(|entry| {
                let mut info = if entry.version == head {
                    PageInfo::new(name, entry.version, modified, size)
                } else {
                    PageInfo::new(
                        name,
                        entry.version,
                        entry.date.unwrap_or(std::time::UNIX_EPOCH),
                        0,
                    )
                };
                apply_entry(&mut info, entry);
                info
            })
            .collect())
    }

    fn page_exists(&self, name: &str) -> bool {
        self.store.page_exists(name)
    }

    fn get_all_pages(&self) -> Result<Vec<PageInfo>, ProviderError> {
        let mut pages = Vec::new();
        for page in self.store.get_all_pages()? {
            if let Some(info) = self.latest_info(&page.name)? {
                pages.push(info);
            }
        }
        Ok(pages)
    }

    fn find_pages(&self, query: &[QueryItem]) -> Result<Vec<SearchResult>, ProviderError> {
        self.store.find_pages(query)
    }

    fn delete_version(&self, name: &str, version: u32) -> Result<(), ProviderError> {
        let Some(template) = self.templates.delete_version.as_deref() else {
            return Err(ProviderError::provider("revision removal is not configured")
                .with_name(name)
                .with_backend(BACKEND));
        };
        if !self.page_exists(name) {
            return Err(ProviderError::not_found(name).with_backend(BACKEND));
        }
        let guard = self.store.locks().lock(name);
        let entries = self.full_log(name)?;
        let latest = entries.iter().map(|e| e.version).max().unwrap_or(1);
        if version == 0 || version > latest {
            return Err(ProviderError::no_such_version(name, version).with_backend(BACKEND));
        }
        if !entries.iter().any(|e| e.version == version) {
            return Err(ProviderError::not_found(name)
                .with_version(version)
                .with_backend(BACKEND));
        }

        let previous = entries
            .iter()
            .map(|e| e.version)
            .filter(|v| *v < version)
            .max();
        if version == latest && previous.is_none() {
            drop(guard);
            return self.delete_page(name);
        }
        // Fetch the new head before its successor disappears.
        let restored = match previous {
            Some(prev) if version == latest => Some(self.checkout(name, prev)?),
            _ => None,
        };

        self.run_checked(name, template, None, None, Some(version))?;
        if let Some(text) = restored {
            self.store.write_current(name, &text)?;
        }
        tracing::debug!(page = %name, version, "Removed RCS revision");
        Ok(())
    }

    fn delete_page(&self, name: &str) -> Result<(), ProviderError> {
        let working = self.store.page_file(name)?;
        let archives = self.archive_files(name)?;
        let _guard = self.store.locks().lock(name);
        for path in std::iter::once(&working).chain(archives.iter()) {
            match fs::remove_file(path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    return Err(ProviderError::io(e, Some(path.clone()))
                        .with_name(name)
                        .with_backend(BACKEND));
                }
            }
        }
        tracing::debug!(page = %name, "Deleted page and RCS archive");
        Ok(())
    }

    fn move_page(&self, from: &str, to: &str) -> Result<(), ProviderError> {
        let from_archives = self.archive_files(from)?;
        let to_archives = self.archive_files(to)?;
        if !self.page_exists(from) {
            return Err(ProviderError::not_found(from).with_backend(BACKEND));
        }
        if self.page_exists(to) || to_archives.iter().any(|p| p.exists()) {
            return Err(ProviderError::provider("target page already exists")
                .with_name(to)
                .with_backend(BACKEND));
        }
        let _guards = self.store.locks().lock_pair(from, to);
        let working_from = self.store.page_file(from)?;
        let working_to = self.store.page_file(to)?;
        for (source, target) in std::iter::once((&working_from, &working_to))
            .chain(from_archives.iter().zip(to_archives.iter()))
        {
            if !source.exists() {
                continue;
            }
            fs::rename(source, target).map_err(|e| {
                ProviderError::io(e, Some(source.clone()))
                    .with_name(from)
                    .with_backend(BACKEND)
            })?;
        }
        tracing::debug!(from = %from, to = %to, "Moved page and RCS archive");
        Ok(())
    }

    fn provider_info(&self) -> String {
        format!(
            "RcsFileProvider (dir: {}, checkin: `{}`)",
            self.store.page_dir().display(),
            self.templates.checkin
        )
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::io;
    use std::sync::Mutex;

    use pretty_assertions::assert_eq;
    use quire_store::{ProviderErrorKind, url_decode};

    use super::*;

    #[derive(Clone)]
    struct Revision {
        text: Vec<u8>,
        message: String,
    }

    /// In-memory stand-in for `ci`, `co`, `rlog` and `rcs -o`.
    #[derive(Default)]
    struct FakeRcs {
        archives: Mutex<HashMap<String, Vec<(u32, Revision)>>>,
        commands: Mutex<Vec<String>>,
        fail_checkin: std::sync::atomic::AtomicBool,
    }

    fn ok(stdout: impl Into<Vec<u8>>, stderr: &str) -> CommandOutput {
        CommandOutput {
            code: Some(0),
            stdout: stdout.into(),
            stderr: stderr.as_bytes().to_vec(),
        }
    }

    fn fail(stderr: &str) -> CommandOutput {
        CommandOutput {
            code: Some(1),
            stdout: Vec::new(),
            stderr: stderr.as_bytes().to_vec(),
        }
    }

    fn log_text(file: &str, revisions: &[(u32, Revision)]) -> String {
        let mut out = format!("RCS file: RCS/{file},v\nWorking file: {file}\ndescription:\n");
        for (version, rev) in revisions.iter().rev() {
            out.push_str("----------------------------\n");
            out.push_str(&format!(
                "revision 1.{version}\ndate: 2024/01/{:02} 10:00:00;  author: wiki;  state: Exp;\n{}\n",
                version, rev.message
            ));
        }
        out.push_str(&"=".repeat(77));
        out.push('\n');
        out
    }

    impl CommandRunner for FakeRcs {
        fn run(&self, command: &str, cwd: &Path) -> io::Result<CommandOutput> {
            self.commands.lock().unwrap().push(command.to_owned());
            let file = command
                .rsplit(' ')
                .next()
                .unwrap_or_default()
                .trim_matches(['\'', '"'])
                .trim_start_matches("./")
                .to_owned();
            let mut archives = self.archives.lock().unwrap();
            let output = if let Some(rest) = command.strip_prefix("ci -m\"") {
                if self.fail_checkin.load(std::sync::atomic::Ordering::SeqCst) {
                    return Ok(fail("ci: write error"));
                }
                let message = rest.split('"').next().unwrap_or_default().to_owned();
                let text = std::fs::read(cwd.join(&file))?;
                let revisions = archives.entry(file).or_default();
                let next = revisions.last().map_or(1, |(v, _)| v + 1);
                revisions.push((next, Revision { text, message }));
                ok("", &format!("new revision: 1.{next}\ndone\n"))
            } else if let Some(rest) = command.strip_prefix("co -p -r1.") {
                let requested: u32 = rest.split(' ').next().unwrap_or("0").parse().unwrap();
                match archives
                    .get(&file)
                    .and_then(|revs| revs.iter().rev().find(|(v, _)| *v <= requested))
                {
                    Some((v, rev)) => ok(
                        rev.text.clone(),
                        &format!("{file},v  -->  standard output\nrevision 1.{v}\n"),
                    ),
                    None => fail("co: revision absent"),
                }
            } else if command.starts_with("rlog -zLT -r ") {
                match archives.get(&file) {
                    Some(revs) => ok(log_text(&file, &revs[revs.len() - 1..]), ""),
                    None => fail("rlog: no such file"),
                }
            } else if command.starts_with("rlog -zLT ") {
                match archives.get(&file) {
                    Some(revs) => ok(log_text(&file, revs), ""),
                    None => fail("rlog: no such file"),
                }
            } else if let Some(rest) = command.strip_prefix("rcs -o1.") {
                let version: u32 = rest.split(' ').next().unwrap_or("0").parse().unwrap();
                let revs = archives.entry(file).or_default();
                let before = revs.len();
                revs.retain(|(v, _)| *v != version);
                if revs.len() == before {
                    fail("rcs: revision absent")
                } else {
                    ok("", "done\n")
                }
            } else {
                fail("unknown command")
            };
            Ok(output)
        }
    }

    fn create_provider() -> (tempfile::TempDir, Arc<FakeRcs>, RcsFileProvider) {
        let temp_dir = tempfile::tempdir().unwrap();
        let fake = Arc::new(FakeRcs::default());
        let provider = RcsFileProvider::new(temp_dir.path().to_path_buf())
            .unwrap()
            .with_runner(Arc::clone(&fake) as Arc<dyn CommandRunner>);
        (temp_dir, fake, provider)
    }

    fn put(provider: &RcsFileProvider, author: &str, text: &str) {
        provider
            .put_page_text(&PageUpdate::new("Test").with_author(author), text)
            .unwrap();
    }

    #[test]
    fn test_alpha_beta_scenario() {
        let (_dir, _fake, provider) = create_provider();

        put(&provider, "A", "Alpha");
        put(&provider, "B", "Beta");

        assert_eq!(provider.get_page_text("Test", Version::Number(1)).unwrap(), "Alpha");
        assert_eq!(provider.get_page_text("Test", Version::Number(2)).unwrap(), "Beta");
        assert_eq!(provider.get_page_text("Test", Version::Latest).unwrap(), "Beta");

        provider.delete_version("Test", 2).unwrap();

        assert_eq!(provider.get_page_text("Test", Version::Latest).unwrap(), "Alpha");
        let history = provider.get_version_history("Test").unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].version, 1);
    }

    #[test]
    #[cfg(not(target_os = "windows"))]
    fn test_checkin_command_encodes_author_and_note() {
        let (_dir, fake, provider) = create_provider();

        provider
            .put_page_text(
                &PageUpdate::new("Main Page")
                    .with_author("Jane Doe")
                    .with_changenote("a;b"),
                "x",
            )
            .unwrap();

        let commands = fake.commands.lock().unwrap();
        assert_eq!(
            commands[0],
            "ci -m\"author=Jane+Doe;changenote=a%3Bb\" -l -t-none './Main+Page.txt'"
        );
    }

    #[test]
    fn test_history_newest_first_with_authors() {
        let (_dir, _fake, provider) = create_provider();
        put(&provider, "Alice", "one");
        provider
            .put_page_text(
                &PageUpdate::new("Test")
                    .with_author("Bob")
                    .with_changenote("second"),
                "two",
            )
            .unwrap();

        let history = provider.get_version_history("Test").unwrap();

        let summary: Vec<_> = history
            .iter()
            .map(|p| (p.version, p.author_or_unknown().to_owned()))
            .collect();
        assert_eq!(summary, vec![(2, "Bob".to_owned()), (1, "Alice".to_owned())]);
        assert_eq!(history[0].changenote(), Some("second"));
        assert_eq!(history[0].size, 3);
    }

    #[test]
    fn test_latest_info_uses_working_file() {
        let (_dir, _fake, provider) = create_provider();
        put(&provider, "Alice", "hello");

        let info = provider
            .get_page_info("Test", Version::Latest)
            .unwrap()
            .unwrap();

        assert_eq!(info.version, 1);
        assert_eq!(info.size, 5);
        assert_eq!(info.author.as_deref(), Some("Alice"));
    }

    #[test]
    fn test_version_mismatch_is_no_such_version() {
        let (_dir, _fake, provider) = create_provider();
        put(&provider, "A", "v1");
        put(&provider, "A", "v2");
        put(&provider, "A", "v3");
        provider.delete_version("Test", 2).unwrap();

        let err = provider
            .get_page_text("Test", Version::Number(2))
            .unwrap_err();

        assert_eq!(err.kind, ProviderErrorKind::NoSuchVersion);
        assert_eq!(provider.get_page_text("Test", Version::Number(1)).unwrap(), "v1");
    }

    #[test]
    fn test_out_of_range_version() {
        let (_dir, _fake, provider) = create_provider();
        put(&provider, "A", "v1");

        assert_eq!(
            provider
                .get_page_text("Test", Version::Number(5))
                .unwrap_err()
                .kind,
            ProviderErrorKind::NoSuchVersion
        );
        assert_eq!(
            provider
                .get_page_text("Missing", Version::Latest)
                .unwrap_err()
                .kind,
            ProviderErrorKind::NotFound
        );
    }

    #[test]
    fn test_failed_checkin_restores_working_file() {
        let (_dir, fake, provider) = create_provider();
        put(&provider, "A", "original");
        fake.fail_checkin
            .store(true, std::sync::atomic::Ordering::SeqCst);

        let err = provider
            .put_page_text(&PageUpdate::new("Test"), "replacement")
            .unwrap_err();

        assert_eq!(err.kind, ProviderErrorKind::Provider);
        assert!(err.to_string().contains("write error"));
        assert_eq!(provider.get_page_text("Test", Version::Latest).unwrap(), "original");
    }

    #[test]
    fn test_failed_first_checkin_removes_working_file() {
        let (_dir, fake, provider) = create_provider();
        fake.fail_checkin
            .store(true, std::sync::atomic::Ordering::SeqCst);

        assert!(provider.put_page_text(&PageUpdate::new("New"), "x").is_err());
        assert!(!provider.page_exists("New"));
    }

    #[test]
    fn test_missing_confirmation_is_provider_error() {
        struct Silent;
        impl CommandRunner for Silent {
            fn run(&self, command: &str, _cwd: &Path) -> io::Result<CommandOutput> {
                if command.starts_with("rlog") {
                    let log = "revision 1.3\ndate: 2024/01/01 00:00:00;\n=====================\n";
                    return Ok(ok(log, ""));
                }
                Ok(ok("text", ""))
            }
        }
        let temp_dir = tempfile::tempdir().unwrap();
        let provider = RcsFileProvider::new(temp_dir.path().to_path_buf())
            .unwrap()
            .with_runner(Arc::new(Silent));
        std::fs::write(temp_dir.path().join("Test.txt"), "current").unwrap();

        let err = provider
            .get_page_text("Test", Version::Number(1))
            .unwrap_err();

        assert_eq!(err.kind, ProviderErrorKind::Provider);
    }

    #[test]
    fn test_page_without_archive_is_version_one() {
        let (dir, _fake, provider) = create_provider();
        std::fs::write(dir.path().join("Loose.txt"), "hand made").unwrap();

        let info = provider
            .get_page_info("Loose", Version::Latest)
            .unwrap()
            .unwrap();

        assert_eq!(info.version, 1);
        assert!(info.author.is_none());
        assert_eq!(provider.get_version_history("Loose").unwrap().len(), 1);
    }

    #[test]
    fn test_delete_version_disabled() {
        let (_dir, _fake, provider) = create_provider();
        let provider = provider.with_templates(CommandTemplates {
            delete_version: None,
            ..CommandTemplates::default()
        });
        put(&provider, "A", "v1");

        let err = provider.delete_version("Test", 1).unwrap_err();

        assert_eq!(err.kind, ProviderErrorKind::Provider);
    }

    #[test]
    fn test_delete_and_move_page() {
        let (dir, _fake, provider) = create_provider();
        put(&provider, "A", "v1");
        std::fs::write(dir.path().join("RCS").join("Test.txt,v"), "archive").unwrap();

        provider.move_page("Test", "Renamed").unwrap();
        assert!(dir.path().join("RCS").join("Renamed.txt,v").exists());
        assert!(!provider.page_exists("Test"));

        provider.delete_page("Renamed").unwrap();
        assert!(!provider.page_exists("Renamed"));
        assert!(!dir.path().join("RCS").join("Renamed.txt,v").exists());
    }

    #[test]
    fn test_find_pages_scans_working_files() {
        let (_dir, _fake, provider) = create_provider();
        put(&provider, "A", "needle in a haystack");

        let results = provider
            .find_pages(&quire_store::parse_query("needle"))
            .unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].name, "Test");
    }

    #[test]
    fn test_fake_log_round_trips_through_parser() {
        let rev = Revision {
            text: Vec::new(),
            message: "author=A%26B".to_owned(),
        };
        let log = log_text("X.txt", &[(1, rev)]);

        let entries = parse_log(&log, Charset::Utf8);

        assert_eq!(entries[0].author.as_deref(), Some("A&B"));
        assert_eq!(url_decode("A%26B", Charset::Utf8).unwrap(), "A&B");
    }

    #[test]
    #[cfg(not(target_os = "windows"))]
    fn test_shell_does_not_glob_page_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("Alpha.txt"), "a").unwrap();
        std::fs::write(dir.path().join("Beta.txt"), "b").unwrap();
        let templates = CommandTemplates {
            checkin: "echo %s >> checkin.log".to_owned(),
            ..CommandTemplates::default()
        };
        let provider = RcsFileProvider::new(dir.path().to_path_buf())
            .unwrap()
            .with_templates(templates)
            .with_runner(Arc::new(ShellRunner));

        provider
            .put_page_text(&PageUpdate::new("*"), "star")
            .unwrap();

        let log = std::fs::read_to_string(dir.path().join("checkin.log")).unwrap();
        assert_eq!(log, "./*.txt\n");
    }

    #[test]
    #[cfg(not(target_os = "windows"))]
    fn test_leading_dash_page_is_not_an_option() {
        let dir = tempfile::tempdir().unwrap();
        let templates = CommandTemplates {
            checkin: "cat %s > copy.out".to_owned(),
            ..CommandTemplates::default()
        };
        let provider = RcsFileProvider::new(dir.path().to_path_buf())
            .unwrap()
            .with_templates(templates)
            .with_runner(Arc::new(ShellRunner));

        provider
            .put_page_text(&PageUpdate::new("-n-foo"), "dashed")
            .unwrap();

        let copy = std::fs::read_to_string(dir.path().join("copy.out")).unwrap();
        assert_eq!(copy, "dashed");
    }
}
