use std::io::Read;
use std::os::unix::process::{CommandExt, ExitStatusExt};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use nix::sched::{unshare, CloneFlags};
use nix::sys::resource::{setrlimit, Resource};
use nix::sys::signal::{kill, Signal};
use nix::unistd::{setsid, Pid};

use crate::config::types::{Difficulty, Language};
use crate::config::SandboxSettings;
use crate::sandbox::profile::ExecutionProfile;

/// Per-stream capture cap. Harness reports are one line of JSON; anything
/// beyond this is runaway output.
const OUTPUT_CAP: usize = 1024 * 1024;

/// Outcome of one sandboxed launch.
#[derive(Clone, Debug, PartialEq)]
pub enum RunOutcome {
    /// Process ran to completion (any exit status). Fatal signals other
    /// than the memory kill surface here as 128+signo.
    Completed {
        exit_status: i32,
        stdout: String,
        stderr: String,
    },
    /// Killed by the kernel for exceeding the address-space cap
    /// (SIGKILL / exit 137).
    MemoryExceeded,
    /// Wall-clock watchdog fired.
    TimeLimitExceeded,
    /// Infrastructure failure; never attributed to the submission.
    SandboxError(String),
}

/// Launches harness programs under rlimits with a host-side wall-clock
/// watchdog. The whole process group is killed on timeout and reaped on
/// every exit path.
#[derive(Clone)]
pub struct SandboxRunner {
    settings: SandboxSettings,
}

impl SandboxRunner {
    pub fn new(settings: SandboxSettings) -> Self {
        Self { settings }
    }

    /// Execute the harness at `source_path` for one submission.
    pub async fn run(
        &self,
        language: Language,
        source_path: &Path,
        difficulty: Difficulty,
    ) -> RunOutcome {
        let profile = ExecutionProfile::for_submission(&self.settings, difficulty, language);
        let settings = self.settings.clone();
        let source = source_path.to_path_buf();

        let outcome = tokio::task::spawn_blocking(move || {
            run_blocking(&settings, language, &source, &profile)
        })
        .await;

        match outcome {
            Ok(outcome) => outcome,
            Err(e) => RunOutcome::SandboxError(format!("sandbox task failed: {e}")),
        }
    }
}

fn run_blocking(
    settings: &SandboxSettings,
    language: Language,
    source: &Path,
    profile: &ExecutionProfile,
) -> RunOutcome {
    let Some(workdir) = source.parent().map(Path::to_path_buf) else {
        return RunOutcome::SandboxError(format!(
            "harness path has no parent directory: {}",
            source.display()
        ));
    };

    let command = match language {
        Language::Python => vec![
            settings.python_bin.clone(),
            "-B".to_string(),
            source.to_string_lossy().to_string(),
        ],
        Language::Java => vec![
            settings.java_bin.clone(),
            format!("-Xmx{}m", profile.memory_limit / (1024 * 1024)),
            "-XX:+UseSerialGC".to_string(),
            source.to_string_lossy().to_string(),
        ],
        Language::Cpp => {
            let binary = workdir.join("harness_bin");
            match compile_cpp(settings, source, &binary, &workdir, profile) {
                Ok(None) => {}
                Ok(Some(outcome)) => return outcome,
                Err(outcome) => return outcome,
            }
            vec![binary.to_string_lossy().to_string()]
        }
    };

    launch(&command, &workdir, profile)
}

/// Compile stage for C++ under the same envelope. `Ok(Some)` carries a
/// compile diagnostic outcome; `Ok(None)` means the binary is ready.
fn compile_cpp(
    settings: &SandboxSettings,
    source: &Path,
    binary: &Path,
    workdir: &Path,
    profile: &ExecutionProfile,
) -> std::result::Result<Option<RunOutcome>, RunOutcome> {
    let command = vec![
        settings.cpp_compiler.clone(),
        "-O2".to_string(),
        "-std=c++17".to_string(),
        "-o".to_string(),
        binary.to_string_lossy().to_string(),
        source.to_string_lossy().to_string(),
    ];
    match launch(&command, workdir, profile) {
        RunOutcome::Completed { exit_status: 0, .. } => Ok(None),
        // Compiler diagnostics belong to the submitter.
        outcome @ RunOutcome::Completed { .. } => Ok(Some(outcome)),
        RunOutcome::TimeLimitExceeded => Err(RunOutcome::SandboxError(
            "compiler exceeded the time budget".to_string(),
        )),
        RunOutcome::MemoryExceeded => Err(RunOutcome::SandboxError(
            "compiler exceeded the memory budget".to_string(),
        )),
        err @ RunOutcome::SandboxError(_) => Err(err),
    }
}

fn launch(command: &[String], workdir: &Path, profile: &ExecutionProfile) -> RunOutcome {
    let mut cmd = Command::new(&command[0]);
    cmd.args(&command[1..])
        .current_dir(workdir)
        .env_clear()
        .env("PATH", "/usr/local/bin:/usr/bin:/bin")
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let limits = profile.clone();
    unsafe {
        cmd.pre_exec(move || apply_limits(&limits));
    }

    let mut child = match cmd.spawn() {
        Ok(child) => child,
        Err(e) => return RunOutcome::SandboxError(format!("spawn failed: {e}")),
    };
    let pid = child.id() as i32;

    // Drain both streams off-thread so a chatty child never deadlocks on a
    // full pipe while the watchdog waits for it.
    let stdout_handle = child
        .stdout
        .take()
        .map(|s| thread::spawn(move || collect_stream(s, OUTPUT_CAP)));
    let stderr_handle = child
        .stderr
        .take()
        .map(|s| thread::spawn(move || collect_stream(s, OUTPUT_CAP)));

    let (status, timed_out) = wait_with_watchdog(&mut child, pid, profile.wall_time_limit());

    // Straggling descendants die with the group; ESRCH just means the
    // group is already gone.
    kill_group(pid);

    let stdout = join_capture(stdout_handle);
    let stderr = join_capture(stderr_handle);

    let status = match status {
        Ok(status) => status,
        Err(e) => return RunOutcome::SandboxError(format!("wait failed: {e}")),
    };

    if timed_out {
        return RunOutcome::TimeLimitExceeded;
    }

    match (status.code(), status.signal()) {
        (Some(137), _) | (_, Some(9)) => RunOutcome::MemoryExceeded,
        (Some(code), _) => RunOutcome::Completed {
            exit_status: code,
            stdout,
            stderr,
        },
        (None, Some(sig)) => RunOutcome::Completed {
            exit_status: 128 + sig,
            stdout,
            stderr,
        },
        (None, None) => RunOutcome::SandboxError("wait returned no status".to_string()),
    }
}

/// Pre-exec isolation chain, applied in the child between fork and exec.
fn apply_limits(profile: &ExecutionProfile) -> std::io::Result<()> {
    let errno = |e: nix::errno::Errno| std::io::Error::from_raw_os_error(e as i32);

    // Own session and process group so the watchdog can kill the tree.
    setsid().map_err(errno)?;

    setrlimit(Resource::RLIMIT_AS, profile.memory_limit, profile.memory_limit).map_err(errno)?;
    setrlimit(
        Resource::RLIMIT_CPU,
        profile.cpu_time_limit_secs,
        profile.cpu_time_limit_secs,
    )
    .map_err(errno)?;
    setrlimit(Resource::RLIMIT_NOFILE, profile.fd_limit, profile.fd_limit).map_err(errno)?;
    setrlimit(
        Resource::RLIMIT_FSIZE,
        profile.file_size_limit,
        profile.file_size_limit,
    )
    .map_err(errno)?;
    setrlimit(Resource::RLIMIT_CORE, 0, 0).map_err(errno)?;

    if profile.isolate_network {
        unshare(CloneFlags::CLONE_NEWNET).map_err(errno)?;
    }
    Ok(())
}

fn wait_with_watchdog(
    child: &mut Child,
    pid: i32,
    wall_limit: Duration,
) -> (std::io::Result<std::process::ExitStatus>, bool) {
    let started = Instant::now();
    loop {
        match child.try_wait() {
            Ok(Some(status)) => return (Ok(status), false),
            Ok(None) => {
                if started.elapsed() > wall_limit {
                    kill_group(pid);
                    return (child.wait(), true);
                }
                thread::sleep(Duration::from_millis(10));
            }
            Err(e) => return (Err(e), false),
        }
    }
}

/// SIGTERM the group, give it a moment, then SIGKILL. Falls back to the
/// direct pid when the group signal is refused.
fn kill_group(pid: i32) {
    let group = Pid::from_raw(-pid);
    if kill(group, Signal::SIGTERM).is_err() {
        let _ = kill(Pid::from_raw(pid), Signal::SIGTERM);
    }
    thread::sleep(Duration::from_millis(50));
    if kill(group, Signal::SIGKILL).is_err() {
        let _ = kill(Pid::from_raw(pid), Signal::SIGKILL);
    }
}

fn collect_stream<R: Read>(mut stream: R, cap: usize) -> String {
    let mut buffer = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        match stream.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => {
                // Keep draining past the cap so the child never blocks on
                // a full pipe.
                if buffer.len() < cap {
                    let take = n.min(cap - buffer.len());
                    buffer.extend_from_slice(&chunk[..take]);
                }
            }
            Err(_) => break,
        }
    }
    String::from_utf8_lossy(&buffer).to_string()
}

fn join_capture(handle: Option<thread::JoinHandle<String>>) -> String {
    handle
        .and_then(|h| h.join().ok())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collect_stream_caps_output() {
        let data = vec![b'x'; 3 * 4096];
        let collected = collect_stream(&data[..], 4096);
        assert_eq!(collected.len(), 4096);
    }

    #[test]
    fn collect_stream_reads_to_eof() {
        let collected = collect_stream(&b"hello"[..], OUTPUT_CAP);
        assert_eq!(collected, "hello");
    }
}
