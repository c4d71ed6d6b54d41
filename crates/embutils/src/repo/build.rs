//! Headless firmware builds through vendor IDE command line tools.
//!
//! The tool executables (`stm32cubeidec`, `IarBuild`) must be on `PATH`.

use std::path::Path;

use tracing::info;

use crate::error::Result;
use crate::path::{validate_dir, validate_file, validate_path};
use crate::subprocess::{execute, CommandSpec};

/// STM32CubeIDE headless build command.
#[must_use]
pub fn cubeide_command(
    name: &str,
    config: &str,
    project: &Path,
    workspace: &Path,
    indexer: bool,
) -> CommandSpec {
    let mut command =
        CommandSpec::new("stm32cubeidec").args(["--launcher.suppressErrors", "-nosplash"]);
    if !indexer {
        command = command.arg("-no-indexer");
    }
    command
        .args([
            "-application",
            "org.eclipse.cdt.managedbuilder.core.headlessbuild",
            "-data",
        ])
        .arg(workspace.to_string_lossy())
        .arg("-cleanBuild")
        .arg(format!("{name}/{config}"))
        .arg("-import")
        .arg(project.to_string_lossy())
}

/// IAR Embedded Workbench headless build command.
#[must_use]
pub fn iar_command(config: &str, project: &Path) -> CommandSpec {
    CommandSpec::new("IarBuild")
        .arg(project.to_string_lossy())
        .arg("-build")
        .arg(config)
}

/// Clean build of configuration `config` of the CubeIDE project `name`.
///
/// The workspace must not be open in another IDE instance.
///
/// # Errors
///
/// Returns an error if a path is invalid, the builder can't be started or
/// exits with a non-zero code.
pub fn build_cubeide(
    name: &str,
    config: &str,
    project: &Path,
    workspace: &Path,
    indexer: bool,
    log: Option<&Path>,
    pipe: bool,
) -> Result<()> {
    validate_dir(project, true, false)?;
    validate_dir(workspace, false, true)?;
    if let Some(log) = log {
        validate_path(log, true)?;
    }
    let command = cubeide_command(name, config, project, workspace, indexer);
    info!(project = name, config, "Building with STM32CubeIDE");
    execute(&command, None, log, pipe)?.check()?;
    Ok(())
}

/// Build configuration `config` of the EWARM project file `project`.
///
/// # Errors
///
/// Returns an error if a path is invalid, the builder can't be started or
/// exits with a non-zero code.
pub fn build_iar(config: &str, project: &Path, log: Option<&Path>, pipe: bool) -> Result<()> {
    validate_file(project, true, &[".ewp"])?;
    if let Some(log) = log {
        validate_path(log, true)?;
    }
    let command = iar_command(config, project);
    info!(project = %project.display(), config, "Building with IAR");
    execute(&command, None, log, pipe)?.check()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cubeide_command() {
        let command = cubeide_command(
            "blinky",
            "Debug",
            Path::new("/work/blinky"),
            Path::new("/work/ws"),
            false,
        );
        assert_eq!(command.program, "stm32cubeidec");
        assert_eq!(
            command.args,
            vec![
                "--launcher.suppressErrors",
                "-nosplash",
                "-no-indexer",
                "-application",
                "org.eclipse.cdt.managedbuilder.core.headlessbuild",
                "-data",
                "/work/ws",
                "-cleanBuild",
                "blinky/Debug",
                "-import",
                "/work/blinky",
            ]
        );

        let command = cubeide_command("a", "Release", Path::new("p"), Path::new("w"), true);
        assert!(!command.args.iter().any(|arg| arg == "-no-indexer"));
    }

    #[test]
    fn test_iar_command() {
        let command = iar_command("Release", Path::new("fw.ewp"));
        assert_eq!(command.to_string(), "IarBuild fw.ewp -build Release");
    }

    #[test]
    fn test_build_invalid_paths() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing");

        let err = build_cubeide("a", "Debug", &missing, dir.path(), false, None, false)
            .unwrap_err();
        assert!(err.is_path_error());

        let err = build_iar("Debug", &missing.join("fw.ewp"), None, false).unwrap_err();
        assert!(err.is_path_error());

        let project = dir.path().join("fw.ewp");
        std::fs::write(&project, "").unwrap();
        let log = dir.path().join("reach_issue").join("build.log");
        let err = build_iar("Debug", &project, Some(&log), false).unwrap_err();
        assert!(err.is_path_error());
    }
}
