//! Child process management: spawn, merged output capture, exit status.

use std::ffi::OsStr;
use std::io::{self, BufRead, BufReader, PipeReader, Read};
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::process::{Child, Command};
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::execution::{ExecError, ExecutionResult};

/// Runs one fixed program per call and captures its combined output.
///
/// The program path is set at construction and never taken from request
/// data; callers only supply positional arguments, which reach the child
/// verbatim without passing through a shell.
#[derive(Debug, Clone)]
pub struct CommandExecutor {
    program: PathBuf,
    timeout: Option<Duration>,
}

impl CommandExecutor {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            timeout: None,
        }
    }

    /// Bound each run by `limit`. `None` or a zero duration leaves runs unbounded.
    pub fn with_timeout(mut self, limit: Option<Duration>) -> Self {
        self.timeout = limit.filter(|d| !d.is_zero());
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Spawn the program with `args`, read everything it writes to stdout or
    /// stderr, wait for it to exit and classify the outcome.
    ///
    /// Never returns early while the child is still running, except when a
    /// timeout is configured, in which case the child is killed first.
    /// Dropping the returned future does not stop the child; it runs on
    /// and is reaped in the background.
    pub async fn execute<S: AsRef<OsStr>>(&self, args: &[S]) -> ExecutionResult {
        self.run(args).await.into()
    }

    async fn run<S: AsRef<OsStr>>(&self, args: &[S]) -> Result<String, ExecError> {
        let (mut child, reader) = self.spawn(args).map_err(|err| {
            ExecError::launch(format!(
                "cannot run program \"{}\": {}",
                self.program.display(),
                err
            ))
        })?;
        debug!(program = %self.program.display(), pid = ?child.id(), "spawned script");

        // The merged pipe is a plain OS handle, so drain it on the blocking pool.
        let collect = tokio::task::spawn_blocking(move || read_lines(reader));
        let finish = async {
            let output = collect.await.map_err(io::Error::other)??;
            let status = child.wait().await?;
            Ok::<_, io::Error>((output, status))
        };

        let finished = match self.timeout {
            None => finish.await,
            Some(limit) => {
                let outcome = timeout(limit, finish).await;
                match outcome {
                    Ok(finished) => finished,
                    Err(_) => {
                        warn!(
                            program = %self.program.display(),
                            limit_secs = limit.as_secs_f64(),
                            "script exceeded its deadline, killing it"
                        );
                        if let Err(err) = child.kill().await {
                            warn!(error = %err, "failed to kill timed out script");
                        }
                        return Err(ExecError::TimedOut { after: limit });
                    }
                }
            }
        };

        let (output, status) = finished.map_err(ExecError::launch)?;
        let code = exit_code(status);
        debug!(code, bytes = output.len(), "script exited");
        if code != 0 {
            return Err(ExecError::NonZeroExit { code, output });
        }
        Ok(output)
    }

    fn spawn<S: AsRef<OsStr>>(&self, args: &[S]) -> io::Result<(Child, PipeReader)> {
        let (reader, writer) = io::pipe()?;
        let mut cmd = Command::new(&self.program);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(writer.try_clone()?)
            .stderr(writer);
        let child = cmd.spawn()?;
        // `cmd` still holds both write ends; the reader only sees EOF once they are closed.
        drop(cmd);
        Ok((child, reader))
    }
}

/// Accumulate every line from `reader`, each followed by a single `\n`.
///
/// `\n`, `\r\n` and a bare `\r` all end a line, so carriage-return
/// progress updates become separate lines. A final unterminated line still
/// gets its newline. Invalid UTF-8 is replaced rather than rejected.
pub fn read_lines<R: Read>(reader: R) -> io::Result<String> {
    let mut reader = BufReader::new(reader);
    let mut output = String::new();
    let mut chunk = Vec::new();
    loop {
        chunk.clear();
        if reader.read_until(b'\n', &mut chunk)? == 0 {
            break;
        }
        if chunk.last() == Some(&b'\n') {
            chunk.pop();
        }
        // A `\r` right before the `\n` (or at EOF) terminates the last line, not an extra one.
        if chunk.last() == Some(&b'\r') {
            chunk.pop();
        }
        for line in chunk.split(|b| *b == b'\r') {
            output.push_str(&String::from_utf8_lossy(line));
            output.push('\n');
        }
    }
    Ok(output)
}

/// Numeric exit status. Signal deaths map to `128 + signal` on Unix.
fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }
    -1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_lines_appends_newline_to_every_line() {
        let out = read_lines(&b"one\ntwo\r\nthree"[..]).unwrap();
        assert_eq!(out, "one\ntwo\nthree\n");
    }

    #[test]
    fn read_lines_keeps_blank_lines_and_handles_empty_input() {
        assert_eq!(read_lines(&b""[..]).unwrap(), "");
        assert_eq!(read_lines(&b"\n\nx\n"[..]).unwrap(), "\n\nx\n");
    }

    #[test]
    fn read_lines_splits_on_bare_carriage_return() {
        let out = read_lines(&b"10%\r50%\r100%\ndone\n"[..]).unwrap();
        assert_eq!(out, "10%\n50%\n100%\ndone\n");
    }

    #[test]
    fn read_lines_counts_crlf_and_trailing_cr_once() {
        assert_eq!(read_lines(&b"a\r\r\nb\r"[..]).unwrap(), "a\n\nb\n");
        assert_eq!(read_lines(&b"\r\n"[..]).unwrap(), "\n");
    }

    #[test]
    fn read_lines_replaces_invalid_utf8() {
        let out = read_lines(&b"ok\xff\n"[..]).unwrap();
        assert_eq!(out, "ok\u{fffd}\n");
    }

    #[test]
    fn zero_timeout_means_unbounded() {
        let exec = CommandExecutor::new("true").with_timeout(Some(Duration::ZERO));
        assert_eq!(exec.timeout(), None);
        assert_eq!(exec.program(), Path::new("true"));
    }

    #[cfg(unix)]
    mod unix {
        use super::super::*;

        fn sh() -> CommandExecutor {
            CommandExecutor::new("/bin/sh")
        }

        #[tokio::test]
        async fn captures_lines_in_order() {
            let result = sh().execute(&["-c", "echo alpha; echo beta; printf gamma"]).await;
            match result {
                ExecutionResult::Success { output } => assert_eq!(output, "alpha\nbeta\ngamma\n"),
                other => panic!("unexpected result: {other:?}"),
            }
        }

        #[tokio::test]
        async fn merges_stderr_into_stdout_in_write_order() {
            let result = sh()
                .execute(&["-c", "echo out1; echo err1 >&2; echo out2; echo err2 >&2"])
                .await;
            assert_eq!(result.render(false), "out1\nerr1\nout2\nerr2\n");
        }

        #[tokio::test]
        async fn non_zero_exit_keeps_code_and_output() {
            let result = sh().execute(&["-c", "echo partial; exit 7"]).await;
            match result.error() {
                Some(ExecError::NonZeroExit { code, output }) => {
                    assert_eq!(*code, 7);
                    assert_eq!(output, "partial\n");
                }
                other => panic!("unexpected error: {other:?}"),
            }
            assert_eq!(result.render(false), "Script execution failed with exit code 7");
        }

        #[tokio::test]
        async fn missing_program_is_a_launch_failure() {
            let result = CommandExecutor::new("/definitely/not/here.sh")
                .execute(&["a", "b"])
                .await;
            assert!(matches!(result.error(), Some(ExecError::Launch(msg)) if !msg.is_empty()));
            let body = result.render(false);
            assert!(body.starts_with("Script execution failed: "));
            assert!(body.len() > "Script execution failed: ".len());
        }

        #[tokio::test]
        async fn arguments_are_not_shell_interpreted() {
            let result = sh()
                .execute(&["-c", "printf '%s\\n' \"$#\" \"$1\"", "sh", "foo; rm -rf /"])
                .await;
            assert_eq!(result.render(false), "1\nfoo; rm -rf /\n");
        }

        #[tokio::test]
        async fn timeout_kills_the_child() {
            let exec = sh().with_timeout(Some(Duration::from_millis(200)));
            let started = std::time::Instant::now();
            let result = exec.execute(&["-c", "exec sleep 5"]).await;
            assert!(started.elapsed() < Duration::from_secs(4));
            assert!(matches!(result.error(), Some(ExecError::TimedOut { .. })));
            assert_eq!(result.render(false), "Script execution failed: timed out after 0.2s");
        }

        #[tokio::test]
        async fn dropped_call_leaves_the_child_running() {
            let dir = tempfile::tempdir().unwrap();
            let marker = dir.path().join("finished");
            let exec = sh();
            let args = [
                std::ffi::OsStr::new("-c"),
                std::ffi::OsStr::new("sleep 1; touch \"$1\""),
                std::ffi::OsStr::new("sh"),
                marker.as_os_str(),
            ];
            let call = exec.execute(&args);
            assert!(tokio::time::timeout(Duration::from_millis(200), call).await.is_err());
            tokio::time::sleep(Duration::from_secs(2)).await;
            assert!(marker.exists(), "child was stopped when its caller went away");
        }

        #[tokio::test]
        async fn signal_death_reports_128_plus_signal() {
            let result = sh().execute(&["-c", "kill -TERM $$"]).await;
            assert!(matches!(
                result.error(),
                Some(ExecError::NonZeroExit { code: 143, .. })
            ));
        }

        #[tokio::test]
        async fn repeated_runs_are_independent() {
            let exec = sh();
            let first = exec.execute(&["-c", "echo $$"]).await.render(false);
            let second = exec.execute(&["-c", "echo $$"]).await.render(false);
            assert_ne!(first, second);
        }
    }
}
