//! Developer tasks for a Cargo workspace.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::OnceLock;

use chrono::NaiveDate;
use regex::Regex;
use tracing::info;

use crate::error::{Error, Result};
use crate::path::{validate_dir, validate_file};
use crate::subprocess::{run_commands, CommandSpec};

/// Manifest holding the workspace version.
pub const MANIFEST_NAME: &str = "Cargo.toml";

/// Named developer task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Task {
    /// Build the API documentation.
    Docs,
    /// Show where the built documentation lives.
    Html,
    /// Run the test suite.
    Test,
    /// Report the workspace version.
    Version,
    /// Set the workspace version to today's date.
    BumpVersion,
    /// Run the tests under coverage with a minimum line threshold.
    CheckCoverage,
    /// Check formatting and lints.
    CheckLinter,
    /// Type check every target.
    CheckTypes,
}

impl Task {
    /// Every task, in display order.
    pub const ALL: [Task; 8] = [
        Task::Docs,
        Task::Html,
        Task::Test,
        Task::Version,
        Task::BumpVersion,
        Task::CheckCoverage,
        Task::CheckLinter,
        Task::CheckTypes,
    ];

    /// Task name as accepted on the command line.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Task::Docs => "docs",
            Task::Html => "html",
            Task::Test => "test",
            Task::Version => "version",
            Task::BumpVersion => "bump-version",
            Task::CheckCoverage => "check-coverage",
            Task::CheckLinter => "check-linter",
            Task::CheckTypes => "check-types",
        }
    }
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Task {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let name = s.trim().to_ascii_lowercase().replace('_', "-");
        Task::ALL
            .into_iter()
            .find(|task| task.name() == name)
            .ok_or_else(|| Error::invalid_value(s, "unknown task"))
    }
}

/// Workspace version for `date`: `YYYY.M.D` without leading zeros.
#[must_use]
pub fn date_version(date: NaiveDate) -> String {
    date.format("%Y.%m.%d").to_string().replace(".0", ".")
}

fn version_line() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r#"(?m)^version\s*=\s*"([^"]*)""#).expect("Invalid regex pattern")
    })
}

/// Runs [`Task`]s in a workspace root.
#[derive(Debug, Clone)]
pub struct TaskRunner {
    root: PathBuf,
    coverage_threshold: u8,
}

impl TaskRunner {
    /// Runner for the workspace at `root`.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>, coverage_threshold: u8) -> Self {
        Self {
            root: root.into(),
            coverage_threshold,
        }
    }

    /// Workspace root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn manifest(&self) -> PathBuf {
        self.root.join(MANIFEST_NAME)
    }

    /// Commands run by `task`. Tasks handled in-process have none.
    #[must_use]
    pub fn commands(&self, task: Task) -> Vec<(&'static str, CommandSpec)> {
        let cargo = || CommandSpec::new("cargo");
        match task {
            Task::Docs => vec![("docs", cargo().args(["doc", "--workspace", "--no-deps"]))],
            Task::Test => vec![("tests", cargo().args(["test", "--workspace"]))],
            Task::CheckCoverage => vec![(
                "coverage",
                cargo()
                    .args(["llvm-cov", "--workspace", "--fail-under-lines"])
                    .arg(self.coverage_threshold.to_string()),
            )],
            Task::CheckLinter => vec![
                ("rustfmt", cargo().args(["fmt", "--all", "--", "--check"])),
                (
                    "clippy",
                    cargo().args(["clippy", "--workspace", "--all-targets", "--", "-D", "warnings"]),
                ),
            ],
            Task::CheckTypes => vec![(
                "check",
                cargo().args(["check", "--workspace", "--all-targets"]),
            )],
            Task::Html | Task::Version | Task::BumpVersion => Vec::new(),
        }
    }

    /// Run `task`, stopping at the first failing command.
    ///
    /// # Errors
    ///
    /// Returns an error if the root or manifest is invalid, or a command
    /// fails.
    pub fn run(&self, task: Task) -> Result<()> {
        validate_dir(&self.root, true, false)?;
        info!(task = %task, root = %self.root.display(), "Running task");
        match task {
            Task::Html => {
                println!("{}", self.docs_url()?);
                Ok(())
            }
            Task::Version => {
                println!("{}", self.version()?);
                Ok(())
            }
            Task::BumpVersion => {
                let version = date_version(chrono::Local::now().date_naive());
                self.set_version(&version)?;
                println!("{version}");
                Ok(())
            }
            _ => run_commands(&self.commands(task), Some(&self.root), true),
        }
    }

    /// `file://` URL of the built documentation index.
    ///
    /// # Errors
    ///
    /// Returns an error if the documentation has not been built.
    pub fn docs_url(&self) -> Result<String> {
        let docs = self.root.join("target").join("doc");
        validate_dir(&docs, true, false)?;
        let docs = fs::canonicalize(&docs)?;
        let index = fs::read_dir(&docs)?
            .filter_map(std::result::Result::ok)
            .map(|entry| entry.path().join("index.html"))
            .filter(|index| index.is_file())
            .min()
            .unwrap_or_else(|| docs.join("index.html"));
        Ok(format!("file://{}", index.display()))
    }

    /// Version in the workspace manifest.
    ///
    /// # Errors
    ///
    /// Returns an error if the manifest can't be read or has no version.
    pub fn version(&self) -> Result<String> {
        let manifest = self.manifest();
        validate_file(&manifest, true, &[".toml"])?;
        let text = fs::read_to_string(&manifest)?;
        version_line()
            .captures(&text)
            .map(|caps| caps[1].to_string())
            .ok_or_else(|| Error::path(&manifest, "no version entry"))
    }

    /// Replace the first version entry of the workspace manifest.
    ///
    /// # Errors
    ///
    /// Returns an error if the manifest can't be read, has no version or
    /// can't be written.
    pub fn set_version(&self, version: &str) -> Result<()> {
        let manifest = self.manifest();
        validate_file(&manifest, true, &[".toml"])?;
        let text = fs::read_to_string(&manifest)?;
        if !version_line().is_match(&text) {
            return Err(Error::path(&manifest, "no version entry"));
        }
        let updated = version_line().replace(&text, format!("version = \"{version}\"").as_str());
        fs::write(&manifest, updated.as_bytes())?;
        info!(path = %manifest.display(), version, "Workspace version updated");
        Ok(())
    }
}
