use std::io::Read;
use std::process::{Child, Command, Stdio};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::app::error::AppError;

/// Timeout for `input tap/swipe/keyevent` style commands.
pub const INPUT_TIMEOUT: Duration = Duration::from_secs(5);
/// Timeout for `am`/`pm` commands, which can stall while the target app spins up.
pub const APP_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
}

/// Boundary between the automation layers and the device. Production code
/// talks to the elevated shell; tests substitute a recording fake.
pub trait ShellExecutor: Send + Sync {
    /// Runs one command given as an argument vector. Any failure mode --
    /// launch error, non-zero exit, timeout -- comes back as `ERR_SYSTEM`;
    /// callers log it and treat the step as failed, never as fatal.
    fn execute(
        &self,
        args: &[String],
        timeout: Duration,
        trace_id: &str,
    ) -> Result<CommandOutput, AppError>;
}

fn drain_pipe(mut reader: impl Read + Send + 'static) -> JoinHandle<Vec<u8>> {
    std::thread::spawn(move || {
        let mut buffer = Vec::<u8>::new();
        let mut temp = [0u8; 4096];
        loop {
            match reader.read(&mut temp) {
                Ok(0) => break,
                Ok(count) => buffer.extend_from_slice(&temp[..count]),
                Err(_) => break,
            }
        }
        buffer
    })
}

pub fn run_command_with_timeout(
    program: &str,
    args: &[String],
    timeout: Duration,
    trace_id: &str,
) -> Result<CommandOutput, AppError> {
    let mut child: Child = Command::new(program)
        .args(args)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|err| AppError::system(format!("Failed to spawn command: {err}"), trace_id))?;

    // Drain stdout/stderr in parallel; otherwise a chatty child can block once
    // the pipe buffer fills and we would incorrectly hit the timeout.
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| AppError::system("Failed to capture stdout", trace_id))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| AppError::system("Failed to capture stderr", trace_id))?;
    let stdout_handle = drain_pipe(stdout);
    let stderr_handle = drain_pipe(stderr);

    let start = Instant::now();
    let exit_code = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status.code(),
            Ok(None) => {
                if start.elapsed() > timeout {
                    let _ = child.kill();
                    let _ = child.wait();
                    let _ = stdout_handle.join();
                    let _ = stderr_handle.join();
                    return Err(AppError::system("Command timed out", trace_id));
                }
                std::thread::sleep(Duration::from_millis(50));
            }
            Err(err) => {
                let _ = stdout_handle.join();
                let _ = stderr_handle.join();
                return Err(AppError::system(
                    format!("Failed to poll command: {err}"),
                    trace_id,
                ));
            }
        }
    };

    let stdout_bytes = stdout_handle.join().unwrap_or_default();
    let stderr_bytes = stderr_handle.join().unwrap_or_default();

    Ok(CommandOutput {
        stdout: String::from_utf8_lossy(&stdout_bytes).to_string(),
        stderr: String::from_utf8_lossy(&stderr_bytes).to_string(),
        exit_code,
    })
}

/// Quotes one argument for the `su -c` payload. Arguments made of plainly safe
/// characters pass through untouched; everything else gets single-quoted with
/// embedded quotes escaped, so user-identifier content cannot inject shell
/// syntax.
pub fn shell_quote(arg: &str) -> String {
    let safe = !arg.is_empty()
        && arg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | '/' | ':' | '='));
    if safe {
        return arg.to_string();
    }
    let mut quoted = String::with_capacity(arg.len() + 2);
    quoted.push('\'');
    for c in arg.chars() {
        if c == '\'' {
            quoted.push_str("'\\''");
        } else {
            quoted.push(c);
        }
    }
    quoted.push('\'');
    quoted
}

/// Production executor: runs every command through the device's elevated
/// shell (`su -c ...`). Assumes the process has been granted root.
pub struct SuShell {
    program: String,
}

impl SuShell {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }
}

impl Default for SuShell {
    fn default() -> Self {
        Self::new("su")
    }
}

impl ShellExecutor for SuShell {
    fn execute(
        &self,
        args: &[String],
        timeout: Duration,
        trace_id: &str,
    ) -> Result<CommandOutput, AppError> {
        if args.is_empty() {
            return Err(AppError::system("Empty command", trace_id));
        }
        let payload = args
            .iter()
            .map(|arg| shell_quote(arg))
            .collect::<Vec<_>>()
            .join(" ");
        let output = run_command_with_timeout(
            &self.program,
            &["-c".to_string(), payload],
            timeout,
            trace_id,
        )?;
        if output.exit_code != Some(0) {
            return Err(AppError::system(
                format!(
                    "Command exited with {:?}: {}",
                    output.exit_code,
                    output.stderr.trim()
                ),
                trace_id,
            ));
        }
        Ok(output)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::Mutex;

    /// Records every argument vector it receives; optionally fails commands
    /// whose payload contains a marker substring.
    pub struct RecordingShell {
        pub calls: Mutex<Vec<Vec<String>>>,
        pub fail_containing: Option<String>,
    }

    impl RecordingShell {
        pub fn new() -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                fail_containing: None,
            }
        }

        pub fn failing_on(marker: &str) -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                fail_containing: Some(marker.to_string()),
            }
        }

        pub fn call_count(&self) -> usize {
            self.calls.lock().expect("calls lock").len()
        }

        pub fn joined_calls(&self) -> Vec<String> {
            self.calls
                .lock()
                .expect("calls lock")
                .iter()
                .map(|args| args.join(" "))
                .collect()
        }
    }

    impl ShellExecutor for RecordingShell {
        fn execute(
            &self,
            args: &[String],
            _timeout: Duration,
            trace_id: &str,
        ) -> Result<CommandOutput, AppError> {
            self.calls.lock().expect("calls lock").push(args.to_vec());
            if let Some(marker) = &self.fail_containing {
                if args.iter().any(|arg| arg.contains(marker.as_str())) {
                    return Err(AppError::system("injected failure", trace_id));
                }
            }
            Ok(CommandOutput {
                stdout: String::new(),
                stderr: String::new(),
                exit_code: Some(0),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_command_with_timeout_does_not_deadlock_on_large_stdout() {
        // Regression test: if stdout/stderr are piped but not drained, the
        // child can block once the pipe buffer fills, causing an otherwise
        // fast command to "hang" until we hit the timeout.
        let args = vec![
            "-c".to_string(),
            "i=0; while [ $i -lt 100000 ]; do echo 1234567890; i=$((i+1)); done".to_string(),
        ];
        let output =
            run_command_with_timeout("sh", &args, Duration::from_secs(10), "test-trace-large")
                .expect("large-output command should complete without timing out");
        assert_eq!(output.exit_code, Some(0));
        assert!(output.stdout.len() >= 1_000_000);
    }

    #[test]
    fn run_command_with_timeout_kills_slow_child() {
        let args = vec!["-c".to_string(), "sleep 30".to_string()];
        let err = run_command_with_timeout("sh", &args, Duration::from_millis(200), "test-trace")
            .expect_err("expected timeout");
        assert_eq!(err.code, "ERR_SYSTEM");
        assert!(err.error.contains("timed out"));
    }

    #[test]
    fn quotes_only_when_needed() {
        assert_eq!(shell_quote("input"), "input");
        assert_eq!(shell_quote("am"), "am");
        assert_eq!(
            shell_quote("com.ss.android.ugc.aweme/.main.MainActivity"),
            "com.ss.android.ugc.aweme/.main.MainActivity"
        );
        assert_eq!(shell_quote("user 01"), "'user 01'");
        assert_eq!(shell_quote(""), "''");
    }

    #[test]
    fn quoting_defuses_shell_metacharacters() {
        let hostile = "x'; rm -rf /; echo '";
        let quoted = shell_quote(hostile);
        assert!(quoted.starts_with('\''));
        assert!(quoted.ends_with('\''));
        // The embedded quote must be escaped, not left to close the string.
        assert!(quoted.contains("'\\''"));

        // Round-trip through a real shell: the argument survives verbatim.
        let args = vec!["-c".to_string(), format!("printf %s {quoted}")];
        let output = run_command_with_timeout("sh", &args, Duration::from_secs(5), "test-quote")
            .expect("printf should run");
        assert_eq!(output.exit_code, Some(0));
        assert_eq!(output.stdout, hostile);
    }
}
