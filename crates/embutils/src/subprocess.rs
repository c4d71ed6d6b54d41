//! External command execution.
//!
//! Commands run without a shell. Output can be forwarded to the terminal line
//! by line while it is captured, and a log of the run can be written to disk.

use std::fmt;
use std::fs;
use std::io::{self, BufRead, BufReader, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;

use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::path::{validate_dir, validate_path};

/// A program and its arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    /// Program to run, looked up on `PATH`.
    pub program: String,
    /// Arguments, passed verbatim.
    pub args: Vec<String>,
}

impl CommandSpec {
    /// Create a command with no arguments.
    #[must_use]
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Append one argument.
    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append several arguments.
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            if arg.is_empty() || arg.contains(char::is_whitespace) {
                write!(f, " \"{arg}\"")?;
            } else {
                write!(f, " {arg}")?;
            }
        }
        Ok(())
    }
}

/// Result of a finished command.
#[derive(Debug, Clone)]
pub struct ExecOutput {
    /// The command that ran.
    pub command: CommandSpec,
    /// Exit code; `None` when terminated by a signal.
    pub code: Option<i32>,
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
}

impl ExecOutput {
    /// True if the command exited with code 0.
    #[must_use]
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// Turn a failed run into [`Error::CommandFailed`].
    ///
    /// # Errors
    ///
    /// Returns an error if the command did not exit with code 0.
    pub fn check(self) -> Result<Self> {
        if self.success() {
            Ok(self)
        } else {
            Err(Error::CommandFailed {
                command: self.command.to_string(),
                code: self.code,
            })
        }
    }
}

/// Run `cmd` and wait for it to finish.
///
/// With `pipe`, stdout and stderr are echoed to the terminal as they arrive.
/// When `log` is given the run is recorded there, replacing any previous
/// content.
///
/// # Errors
///
/// Returns an error if `cwd` is not a directory, `log` is unreachable, the
/// program can't be started or the log can't be written. A non-zero exit is
/// not an error here; see [`ExecOutput::check`].
pub fn execute(
    cmd: &CommandSpec,
    cwd: Option<&Path>,
    log: Option<&Path>,
    pipe: bool,
) -> Result<ExecOutput> {
    if let Some(cwd) = cwd {
        validate_dir(cwd, true, false)?;
    }
    if let Some(log) = log {
        validate_path(log, true)?;
    }

    let mut command = Command::new(&cmd.program);
    command
        .args(&cmd.args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    if let Some(cwd) = cwd {
        command.current_dir(cwd);
    }

    debug!(command = %cmd, pipe, "Executing command");
    let spawn_error = |source| Error::CommandSpawn {
        command: cmd.to_string(),
        source,
    };
    let mut child = command.spawn().map_err(spawn_error)?;

    if pipe {
        println!("Executing:\n{cmd}\nOutput:");
    }
    let stdout = child.stdout.take().map(|out| capture(out, pipe, false));
    let stderr = child.stderr.take().map(|err| capture(err, pipe, true));

    let status = child.wait().map_err(spawn_error)?;
    let stdout = join_capture(stdout);
    let stderr = join_capture(stderr);

    let output = ExecOutput {
        command: cmd.clone(),
        code: status.code(),
        stdout,
        stderr,
    };
    if let Some(log) = log {
        write_log(log, cwd, &output)?;
    }
    info!(command = %cmd, code = ?output.code, "Command finished");
    Ok(output)
}

/// Read a child stream on its own thread, echoing lines when `pipe` is set.
fn capture<R>(stream: R, pipe: bool, is_stderr: bool) -> thread::JoinHandle<String>
where
    R: Read + Send + 'static,
{
    thread::spawn(move || {
        let mut buffer = String::new();
        let mut reader = BufReader::new(stream);
        let mut line = String::new();
        loop {
            line.clear();
            match reader.read_line(&mut line) {
                Ok(0) => break,
                Ok(_) => {
                    if pipe {
                        let written = if is_stderr {
                            io::stderr().write_all(line.as_bytes())
                        } else {
                            io::stdout().write_all(line.as_bytes())
                        };
                        if let Err(e) = written {
                            warn!(error = %e, "Failed to forward command output");
                        }
                    }
                    buffer.push_str(&line);
                }
                Err(e) => {
                    warn!(error = %e, "Failed to read command output");
                    break;
                }
            }
        }
        buffer
    })
}

fn join_capture(handle: Option<thread::JoinHandle<String>>) -> String {
    handle
        .and_then(|handle| handle.join().ok())
        .unwrap_or_default()
}

fn write_log(log: &Path, cwd: Option<&Path>, output: &ExecOutput) -> Result<()> {
    let cwd = cwd.map_or_else(
        || std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
        Path::to_path_buf,
    );
    let code = output
        .code
        .map_or_else(|| "signal".to_string(), |code| code.to_string());
    let text = format!(
        "Date: {}\nCWD : {}\nCMD : {}\nRET : {}\nLOG : \n{}\n{}",
        chrono::Local::now().format("%Y/%m/%d - %H:%M:%S"),
        cwd.display(),
        output.command,
        code,
        output.stdout,
        output.stderr,
    );
    fs::write(log, text)?;
    Ok(())
}

/// Run named commands in order, echoing their output.
///
/// With `fail_fast` the first failure stops the sequence. Otherwise every
/// command runs and the first failure is reported at the end.
///
/// # Errors
///
/// Returns an error if a command can't be started or exits with a non-zero
/// code.
pub fn run_commands(
    commands: &[(&str, CommandSpec)],
    cwd: Option<&Path>,
    fail_fast: bool,
) -> Result<()> {
    let mut failure = None;
    for (name, cmd) in commands {
        println!("Running {name}...");
        let output = execute(cmd, cwd, None, true)?;
        if let Err(e) = output.check() {
            println!("Process exited with error code {}", code_text(&e));
            if fail_fast {
                return Err(e);
            }
            failure.get_or_insert(e);
        }
    }
    failure.map_or(Ok(()), Err)
}

fn code_text(err: &Error) -> String {
    match err {
        Error::CommandFailed { code: Some(code), .. } => code.to_string(),
        _ => "unknown".to_string(),
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh(script: &str) -> CommandSpec {
        CommandSpec::new("sh").args(["-c", script])
    }

    #[test]
    fn test_command_display() {
        let cmd = CommandSpec::new("IarBuild")
            .arg("project.ewp")
            .args(["-build", "Debug Flash"]);
        assert_eq!(cmd.to_string(), "IarBuild project.ewp -build \"Debug Flash\"");
    }

    #[test]
    fn test_execute_captures_output() {
        let output = execute(&sh("echo out; echo err 1>&2"), None, None, false).unwrap();
        assert!(output.success());
        assert_eq!(output.stdout, "out\n");
        assert_eq!(output.stderr, "err\n");
    }

    #[test]
    fn test_execute_exit_code() {
        let output = execute(&sh("exit 3"), None, None, false).unwrap();
        assert_eq!(output.code, Some(3));
        let err = output.check().unwrap_err();
        assert!(matches!(err, Error::CommandFailed { code: Some(3), .. }));
    }

    #[test]
    fn test_execute_in_cwd_with_log() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("run.log");
        let output = execute(&sh("pwd"), Some(dir.path()), Some(&log), true).unwrap();
        assert!(output.success());

        let text = fs::read_to_string(&log).unwrap();
        assert!(text.starts_with("Date: "));
        assert!(text.contains("CMD : sh -c pwd"));
        assert!(text.contains("RET : 0"));
    }

    #[test]
    fn test_execute_missing_program() {
        let err = execute(&CommandSpec::new("embutils-no-such-tool"), None, None, false)
            .unwrap_err();
        assert!(matches!(err, Error::CommandSpawn { .. }));
    }

    #[test]
    fn test_execute_bad_cwd() {
        let dir = tempfile::tempdir().unwrap();
        let err = execute(&sh("true"), Some(&dir.path().join("missing")), None, false)
            .unwrap_err();
        assert!(err.is_path_error());
    }

    #[test]
    fn test_run_commands_fail_fast() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("marker");
        let commands = [
            ("fails", sh("exit 2")),
            ("touch", CommandSpec::new("touch").arg(marker.to_string_lossy())),
        ];

        let err = run_commands(&commands, None, true).unwrap_err();
        assert!(matches!(err, Error::CommandFailed { code: Some(2), .. }));
        assert!(!marker.exists());

        assert!(run_commands(&commands, None, false).is_err());
        assert!(marker.exists());
    }

    #[test]
    fn test_run_commands_success() {
        let commands = [("first", sh("true")), ("second", sh("true"))];
        assert!(run_commands(&commands, None, true).is_ok());
    }
}
