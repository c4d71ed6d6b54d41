//! Firmware version files, build numbers from version control, and C header
//! export.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::path::{file_in_dir, validate_dir, validate_file, validate_path};
use crate::subprocess::{execute, CommandSpec};
use crate::version::{BuildFormat, Version};

/// Build number used outside a repository.
pub const UNVERSIONED_BUILD: u32 = 99_999;

/// File name used when a storage path is a directory.
pub const VERSION_FILE_NAME: &str = "version.txt";

/// Persists a version between runs.
pub trait VersionStorage: fmt::Debug {
    /// Read the stored version.
    ///
    /// # Errors
    ///
    /// Returns an error if the version can't be read or parsed.
    fn load(&self) -> Result<Version>;

    /// Store `version`.
    ///
    /// # Errors
    ///
    /// Returns an error if the version can't be written.
    fn save(&self, version: &Version) -> Result<()>;
}

/// Fills in the build number.
pub trait VersionUpdater: fmt::Debug {
    /// Update the build of `version`.
    ///
    /// # Errors
    ///
    /// Returns an error if the build source fails unexpectedly.
    fn update(&self, version: &mut Version) -> Result<()>;
}

/// Publishes a version to another format.
pub trait VersionExporter: fmt::Debug {
    /// Export `version`.
    ///
    /// # Errors
    ///
    /// Returns an error if the export target can't be written.
    fn export(&self, version: &Version) -> Result<()>;
}

/// Version stored as `major.minor.build` in a text file.
///
/// When the build is not stored it is written as `X`, which loads as 0.
#[derive(Debug, Clone)]
pub struct SimpleVersionStorage {
    path: PathBuf,
    store_build: bool,
}

impl SimpleVersionStorage {
    /// Storage at `path`, or at `path/version.txt` when `path` is a directory.
    #[must_use]
    pub fn new(path: &Path, store_build: bool) -> Self {
        Self {
            path: file_in_dir(path, VERSION_FILE_NAME),
            store_build,
        }
    }

    /// Path of the version file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl VersionStorage for SimpleVersionStorage {
    fn load(&self) -> Result<Version> {
        validate_file(&self.path, true, &[])?;
        let text = fs::read_to_string(&self.path)?;
        Version::parse(&text)
    }

    fn save(&self, version: &Version) -> Result<()> {
        validate_file(&self.path, false, &[])?;
        let build = if self.store_build {
            version.build.to_string()
        } else {
            "X".to_string()
        };
        fs::write(
            &self.path,
            format!("{}.{}.{build}", version.major, version.minor),
        )?;
        info!(path = %self.path.display(), version = %version, "Version saved");
        Ok(())
    }
}

/// Build number from the short commit hash, read as hex.
#[derive(Debug, Clone)]
pub struct GitBuildUpdater {
    repo: PathBuf,
}

impl GitBuildUpdater {
    /// Updater for the repository at `repo`.
    #[must_use]
    pub fn new(repo: impl Into<PathBuf>) -> Self {
        Self { repo: repo.into() }
    }
}

impl VersionUpdater for GitBuildUpdater {
    fn update(&self, version: &mut Version) -> Result<()> {
        validate_dir(&self.repo, true, false)?;
        let command = CommandSpec::new("git").args(["rev-parse", "--short=7", "HEAD"]);
        let hash = query(&command, &self.repo)
            .and_then(|out| u32::from_str_radix(out.trim(), 16).ok());
        match hash {
            Some(build) => {
                version.build = build;
                version.build_format = BuildFormat::Hex;
            }
            None => {
                warn!(repo = %self.repo.display(), "Not a git repository, using the unversioned build");
                version.build = UNVERSIONED_BUILD;
                version.build_format = BuildFormat::Decimal;
            }
        }
        Ok(())
    }
}

/// Build number from the last SVN revision.
#[derive(Debug, Clone)]
pub struct SvnBuildUpdater {
    repo: PathBuf,
}

impl SvnBuildUpdater {
    /// Updater for the working copy at `repo`.
    #[must_use]
    pub fn new(repo: impl Into<PathBuf>) -> Self {
        Self { repo: repo.into() }
    }
}

fn revision_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\d+").expect("Invalid regex pattern"))
}

/// Last revision in `svnversion` output such as `4123:4168MS`.
fn last_revision(output: &str) -> Option<u32> {
    if output.to_ascii_lowercase().contains("unversioned") {
        return None;
    }
    revision_pattern()
        .find_iter(output)
        .last()
        .and_then(|m| m.as_str().parse().ok())
}

impl VersionUpdater for SvnBuildUpdater {
    fn update(&self, version: &mut Version) -> Result<()> {
        validate_dir(&self.repo, true, false)?;
        let command = CommandSpec::new("svnversion").arg(self.repo.to_string_lossy());
        version.build_format = BuildFormat::Decimal;
        version.build = query(&command, &self.repo)
            .as_deref()
            .and_then(last_revision)
            .unwrap_or_else(|| {
                warn!(repo = %self.repo.display(), "Not an SVN working copy, using the unversioned build");
                UNVERSIONED_BUILD
            });
        Ok(())
    }
}

/// Stdout of a successful command, `None` if it failed or can't run.
fn query(command: &CommandSpec, cwd: &Path) -> Option<String> {
    match execute(command, Some(cwd), None, false) {
        Ok(output) if output.success() => Some(output.stdout),
        Ok(_) => None,
        Err(e) => {
            warn!(command = %command, error = %e, "Version control query failed");
            None
        }
    }
}

/// Writes the version as C preprocessor definitions.
#[derive(Debug, Clone)]
pub struct CHeaderExporter {
    path: PathBuf,
    author: String,
    note: String,
}

impl CHeaderExporter {
    /// Exporter writing to `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, author: impl Into<String>, note: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            author: author.into(),
            note: note.into(),
        }
    }

    /// Header text for `version`.
    #[must_use]
    pub fn render(&self, version: &Version) -> String {
        let file = self
            .path
            .file_name()
            .map_or_else(|| "version.h".to_string(), |name| name.to_string_lossy().into_owned());
        let guard: String = file
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_uppercase() } else { '_' })
            .collect();
        format!(
            "/**\n\
             \x20* @file    {file}\n\
             \x20* @author  {author}\n\
             \x20* @date    {date}\n\
             \x20* @note    {note}\n\
             \x20*\n\
             \x20* Generated file, changes will be overwritten.\n\
             \x20*/\n\
             #ifndef {guard}\n\
             #define {guard}\n\
             \n\
             #define VERSION_MAJOR   {major}\n\
             #define VERSION_MINOR   {minor}\n\
             #define VERSION_BUILD   0x{build:X}\n\
             #define VERSION_STRING  \"{version}\"\n\
             \n\
             #endif /* {guard} */\n",
            author = self.author,
            date = chrono::Local::now().format("%Y/%m/%d %H:%M:%S"),
            note = self.note,
            major = version.major,
            minor = version.minor,
            build = version.build,
        )
    }
}

impl VersionExporter for CHeaderExporter {
    fn export(&self, version: &Version) -> Result<()> {
        if self.path.is_dir() {
            return Err(Error::path(&self.path, "expected a file, found a directory"));
        }
        validate_path(&self.path, true)?;
        fs::write(&self.path, self.render(version))?;
        info!(path = %self.path.display(), version = %version, "Version header exported");
        Ok(())
    }
}

/// Runs the version workflow: load, bump, update build, save, export.
#[derive(Debug)]
pub struct VersionHandler {
    storage: Box<dyn VersionStorage>,
    updater: Option<Box<dyn VersionUpdater>>,
    exporters: Vec<Box<dyn VersionExporter>>,
}

impl VersionHandler {
    /// Handler for `storage` with no updater or exporters.
    #[must_use]
    pub fn new(storage: impl VersionStorage + 'static) -> Self {
        Self {
            storage: Box::new(storage),
            updater: None,
            exporters: Vec::new(),
        }
    }

    /// Use `updater` for the build number.
    #[must_use]
    pub fn with_updater(mut self, updater: impl VersionUpdater + 'static) -> Self {
        self.updater = Some(Box::new(updater));
        self
    }

    /// Also export through `exporter`.
    #[must_use]
    pub fn with_exporter(mut self, exporter: impl VersionExporter + 'static) -> Self {
        self.exporters.push(Box::new(exporter));
        self
    }

    /// Run the workflow and return the resulting version.
    ///
    /// # Errors
    ///
    /// Returns the first error of any step; later steps are skipped.
    pub fn run(&self, bump: Option<&str>) -> Result<Version> {
        let mut version = self.storage.load()?;
        if let Some(bump) = bump {
            version.bump(bump)?;
        }
        if let Some(updater) = &self.updater {
            updater.update(&mut version)?;
        }
        self.storage.save(&version)?;
        for exporter in &self.exporters {
            exporter.export(&version)?;
        }
        Ok(version)
    }
}
