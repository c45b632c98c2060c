//! Single choke point for running external commands.
//!
//! Every docker and in-container call goes through a [`CommandRunner`]. The
//! runner never returns an error: spawn failures, timeouts and non-zero exits
//! are all folded into a [`CommandResult`].

use serde::Serialize;
use std::io::{self, Read};
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::sync::{mpsc, Arc, Mutex};
use std::thread;
use std::time::Duration;
use tracing::{debug, instrument, warn};
use wait_timeout::ChildExt;

/// Exit code reported when the process never produced one of its own.
pub const SENTINEL_EXIT_CODE: i32 = -1;

pub const TIMED_OUT_MESSAGE: &str = "Command timed out";

/// Outcome of exactly one external process invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandResult {
    pub ok: bool,
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl CommandResult {
    pub fn success(stdout: impl Into<String>) -> Self {
        Self {
            ok: true,
            stdout: stdout.into(),
            stderr: String::new(),
            exit_code: 0,
        }
    }

    pub fn failure(stderr: impl Into<String>) -> Self {
        Self {
            ok: false,
            stdout: String::new(),
            stderr: stderr.into(),
            exit_code: SENTINEL_EXIT_CODE,
        }
    }

    pub fn exited(exit_code: i32, stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self {
            ok: exit_code == 0,
            stdout: stdout.into(),
            stderr: stderr.into(),
            exit_code,
        }
    }

    pub fn timed_out(partial_stdout: impl Into<String>) -> Self {
        Self {
            ok: false,
            stdout: partial_stdout.into(),
            stderr: TIMED_OUT_MESSAGE.to_string(),
            exit_code: SENTINEL_EXIT_CODE,
        }
    }

    pub fn not_found(program: &str) -> Self {
        Self::failure(format!("Command not found: {program}"))
    }

    /// Combined output for display, stdout first.
    pub fn combined_output(&self) -> String {
        match (self.stdout.is_empty(), self.stderr.is_empty()) {
            (true, true) => String::new(),
            (false, true) => self.stdout.clone(),
            (true, false) => self.stderr.clone(),
            (false, false) => format!("{}\n{}", self.stdout, self.stderr),
        }
    }
}

pub trait CommandRunner {
    fn run(&self, program: &str, args: &[String], cwd: &Path, timeout: Duration)
        -> CommandResult;
}

/// Upper bound on captured bytes per stream. Output past it is drained and dropped.
pub const OUTPUT_LIMIT_BYTES: usize = 4 * 1024 * 1024;

/// How long to keep reading pipes after the child is gone. A grandchild that
/// inherited stdout/stderr can hold them open indefinitely.
const PIPE_DRAIN_GRACE: Duration = Duration::from_millis(500);

/// Timeouts beyond this are clamped so deadline arithmetic cannot overflow.
const MAX_WAIT: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// Runs commands as real child processes.
///
/// On unix each child leads its own process group, and a timeout kills the
/// whole group so helpers such as the compose plugin go down with it.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    #[instrument(skip_all, fields(program = %program, timeout_secs = timeout.as_secs()))]
    fn run(
        &self,
        program: &str,
        args: &[String],
        cwd: &Path,
        timeout: Duration,
    ) -> CommandResult {
        let command = render_command(program, args);
        debug!(%command, cwd = %cwd.display(), "spawning command");

        let mut cmd = Command::new(program);
        cmd.args(args)
            .current_dir(cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            cmd.process_group(0);
        }

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                warn!(%command, "executable not found");
                return CommandResult::not_found(program);
            }
            Err(err) => {
                warn!(%command, err = %err, "failed to spawn command");
                return CommandResult::failure(format!("failed to run `{command}`: {err}"));
            }
        };

        let stdout_capture = child
            .stdout
            .take()
            .map(|out| OutputCapture::spawn(out, OUTPUT_LIMIT_BYTES));
        let stderr_capture = child
            .stderr
            .take()
            .map(|err| OutputCapture::spawn(err, OUTPUT_LIMIT_BYTES));

        let status = match child.wait_timeout(timeout.min(MAX_WAIT)) {
            Ok(Some(status)) => Some(status),
            Ok(None) => {
                warn!(%command, timeout_secs = timeout.as_secs(), "command timed out, killing");
                kill_process_tree(&mut child);
                None
            }
            Err(err) => {
                warn!(%command, err = %err, "failed waiting for command");
                kill_process_tree(&mut child);
                return CommandResult::failure(format!("failed to wait for `{command}`: {err}"));
            }
        };

        let stdout = finish_capture(stdout_capture, "stdout");
        let stderr = finish_capture(stderr_capture, "stderr");

        match status {
            None => CommandResult::timed_out(stdout.trim()),
            Some(status) => {
                let exit_code = status.code().unwrap_or(SENTINEL_EXIT_CODE);
                debug!(%command, exit_code, "command finished");
                CommandResult::exited(exit_code, stdout.trim(), stderr.trim())
            }
        }
    }
}

fn kill_process_tree(child: &mut Child) {
    #[cfg(unix)]
    if let Ok(pid) = i32::try_from(child.id()) {
        // SAFETY: kill(2) only signals; the group id is the child we spawned
        // with process_group(0).
        unsafe {
            libc::kill(-pid, libc::SIGKILL);
        }
    }
    let _ = child.kill();
    let _ = child.wait();
}

#[derive(Debug, Default)]
struct CapturedBytes {
    bytes: Vec<u8>,
    truncated: usize,
}

impl CapturedBytes {
    fn push(&mut self, chunk: &[u8], limit: usize) {
        let keep = chunk.len().min(limit.saturating_sub(self.bytes.len()));
        self.bytes.extend_from_slice(&chunk[..keep]);
        self.truncated += chunk.len() - keep;
    }
}

/// A pipe drained on a helper thread into a shared, size-limited buffer.
struct OutputCapture {
    captured: Arc<Mutex<CapturedBytes>>,
    done: mpsc::Receiver<()>,
}

impl OutputCapture {
    fn spawn<R: Read + Send + 'static>(mut reader: R, limit: usize) -> Self {
        let captured = Arc::new(Mutex::new(CapturedBytes::default()));
        let (tx, done) = mpsc::channel();
        let sink = Arc::clone(&captured);
        thread::spawn(move || {
            let mut chunk = [0u8; 8192];
            loop {
                // Partial output is still useful when the pipe breaks mid-read.
                let n = match reader.read(&mut chunk) {
                    Ok(0) | Err(_) => break,
                    Ok(n) => n,
                };
                match sink.lock() {
                    Ok(mut out) => out.push(&chunk[..n], limit),
                    Err(poisoned) => poisoned.into_inner().push(&chunk[..n], limit),
                }
            }
            let _ = tx.send(());
        });
        Self { captured, done }
    }

    /// Waits up to `grace` for EOF, then returns whatever was read so far.
    fn finish(self, grace: Duration) -> (String, usize, bool) {
        let drained = match self.done.recv_timeout(grace) {
            Ok(()) => true,
            Err(mpsc::RecvTimeoutError::Disconnected) => true,
            Err(mpsc::RecvTimeoutError::Timeout) => false,
        };
        let captured = match self.captured.lock() {
            Ok(out) => out,
            Err(poisoned) => poisoned.into_inner(),
        };
        let text = String::from_utf8_lossy(&captured.bytes).into_owned();
        let truncated = captured.truncated;
        drop(captured);
        (text, truncated, drained)
    }
}

fn finish_capture(capture: Option<OutputCapture>, stream: &'static str) -> String {
    let Some(capture) = capture else {
        return String::new();
    };
    let (text, truncated, drained) = capture.finish(PIPE_DRAIN_GRACE);
    if truncated > 0 {
        warn!(stream, truncated, "output truncated");
    }
    if !drained {
        debug!(stream, "pipe still held open after exit; keeping partial output");
    }
    text
}

pub fn render_command(program: &str, args: &[String]) -> String {
    fn shell_quote(part: &str) -> String {
        if part.is_empty() {
            return "\"\"".to_string();
        }
        if part.chars().any(char::is_whitespace) {
            return format!("\"{}\"", part.replace('"', "\\\""));
        }
        part.to_string()
    }
    let mut parts = Vec::with_capacity(args.len() + 1);
    parts.push(shell_quote(program));
    parts.extend(args.iter().map(|arg| shell_quote(arg)));
    parts.join(" ")
}

/// Short classification of a failed docker command, for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnosis {
    pub code: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<&'static str>,
}

pub fn diagnose(result: &CommandResult) -> Option<Diagnosis> {
    if result.ok {
        return None;
    }
    let lower = result.stderr.to_lowercase();

    let (code, hint) = if lower.starts_with("command not found") {
        (
            "docker_not_found",
            Some("Install Docker and ensure `docker` is on your PATH."),
        )
    } else if lower == TIMED_OUT_MESSAGE.to_lowercase() {
        (
            "command_timed_out",
            Some("The command exceeded its timeout. Check `docker compose logs` and retry."),
        )
    } else if lower.contains("unknown command: docker compose")
        || lower.contains("is not a docker command")
    {
        (
            "docker_compose_unavailable",
            Some("Docker Compose is unavailable. Install the compose plugin and retry."),
        )
    } else if lower.contains("cannot connect to the docker daemon")
        || lower.contains("is the docker daemon running")
        || lower.contains("error during connect")
    {
        (
            "docker_daemon_unreachable",
            Some("Docker daemon is unreachable. Start Docker Desktop (or dockerd) and retry."),
        )
    } else if lower.contains("port is already allocated")
        || lower.contains("address already in use")
    {
        (
            "docker_port_conflict",
            Some("A required host port is already in use. Free it or edit docker-compose.yml."),
        )
    } else if lower.contains("service \"app\" is not running")
        || lower.contains("no container found")
    {
        (
            "app_container_not_running",
            Some("The app container is not running. Run `laradev up` first."),
        )
    } else if lower.contains("denied") || lower.contains("unauthorized") {
        (
            "docker_registry_auth",
            Some("Authenticate with `docker login` for private images."),
        )
    } else {
        ("process_command_failed", None)
    };

    Some(Diagnosis { code, hint })
}
