//! §4.L Process Supervisor — spawn, monitor activity, enforce timeouts,
//! escalate termination for a single external command.
//!
//! Re-architects the teacher's `exec.Command` + stderr-drain-thread pattern
//! (`shared_utils::ffmpeg_process::FfmpegProcess`) into a supervisor that
//! owns the full lifecycle of one child, including true activity-based hang
//! detection (CPU time / RSS / disk I/O), not just a wall-clock timeout.

use std::io::Read;
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::errors::{EngineError, Result};

/// Size-bucket context the caller supplies so the supervisor can compute a
/// per-job timeout without re-deriving complexity itself.
#[derive(Debug, Clone, Copy)]
pub struct JobContext {
    pub file_size: u64,
    pub complexity: u8, // [0,100], see scheduler::complexity_score
    pub format_factor: f64,
}

impl JobContext {
    fn base_timeout(&self) -> Duration {
        const MIB: u64 = 1024 * 1024;
        const GIB: u64 = 1024 * MIB;
        let secs = if self.file_size <= 10 * MIB {
            120
        } else if self.file_size <= 100 * MIB {
            300
        } else if self.file_size <= GIB {
            900
        } else {
            3600
        };
        Duration::from_secs(secs)
    }

    /// 1x - 8x derived from the [0,100] complexity score.
    fn complexity_factor(&self) -> f64 {
        1.0 + (self.complexity as f64 / 100.0) * 7.0
    }

    pub fn estimate_timeout(&self) -> Duration {
        let secs = self.base_timeout().as_secs_f64()
            * self.complexity_factor()
            * self.format_factor.max(0.1);
        let clamped = secs.clamp(30.0, 7200.0);
        Duration::from_secs_f64(clamped)
    }
}

pub struct CommandOutput {
    pub status_success: bool,
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

/// Policy applied when the watchdog declares a child hung (non-interactive
/// default per §4.L; interactive mode overrides via a prompt the caller
/// wires up separately).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HangPolicy {
    Terminate,
    Wait,
    Ignore,
}

const WATCHDOG_SAMPLE_INTERVAL: Duration = Duration::from_secs(1);
const HANG_THRESHOLD: Duration = Duration::from_secs(30);
const RSS_CHANGE_THRESHOLD_KB: i64 = 10 * 1024;

/// One sample of a child's resource usage, used by the watchdog to decide
/// whether it has been "active" in the last window.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct Sample {
    cpu_ticks: u64,
    rss_kb: i64,
    io_bytes: u64,
}

#[cfg(target_os = "linux")]
fn sample_process(pid: u32) -> Option<Sample> {
    let stat = std::fs::read_to_string(format!("/proc/{pid}/stat")).ok()?;
    // fields are space separated; utime/stime are fields 14/15 (1-indexed).
    // the comm field (2) may itself contain spaces inside parens, so split
    // after the closing paren.
    let after_comm = stat.rsplit_once(')')?.1;
    let fields: Vec<&str> = after_comm.split_whitespace().collect();
    // fields[0] is state (field 3); utime is field 14 -> index (14-3)=11
    let utime: u64 = fields.get(11)?.parse().ok()?;
    let stime: u64 = fields.get(12)?.parse().ok()?;
    let rss_pages: i64 = fields.get(21).and_then(|s| s.parse().ok()).unwrap_or(0);
    let page_size_kb = 4; // typical; exactness doesn't matter for delta detection
    let io = std::fs::read_to_string(format!("/proc/{pid}/io")).unwrap_or_default();
    let io_bytes = io
        .lines()
        .filter(|l| l.starts_with("read_bytes") || l.starts_with("write_bytes"))
        .filter_map(|l| l.split_whitespace().nth(1))
        .filter_map(|v| v.parse::<u64>().ok())
        .sum();
    Some(Sample {
        cpu_ticks: utime + stime,
        rss_kb: rss_pages * page_size_kb,
        io_bytes,
    })
}

#[cfg(target_os = "macos")]
fn sample_process(pid: u32) -> Option<Sample> {
    let out = Command::new("ps")
        .args(["-o", "cputime=,rss=", "-p", &pid.to_string()])
        .output()
        .ok()?;
    if !out.status.success() {
        return None;
    }
    let text = String::from_utf8_lossy(&out.stdout);
    let mut parts = text.split_whitespace();
    let cputime = parts.next()?; // HH:MM:SS or MM:SS.ss
    let rss_kb: i64 = parts.next().and_then(|s| s.parse().ok()).unwrap_or(0);
    let secs = parse_ps_cputime(cputime);
    Some(Sample {
        cpu_ticks: (secs * 100.0) as u64,
        rss_kb,
        io_bytes: 0,
    })
}

#[cfg(target_os = "macos")]
fn parse_ps_cputime(s: &str) -> f64 {
    let parts: Vec<&str> = s.split(':').collect();
    let mut secs = 0.0;
    for p in &parts {
        secs = secs * 60.0 + p.parse::<f64>().unwrap_or(0.0);
    }
    secs
}

#[cfg(not(any(target_os = "linux", target_os = "macos")))]
fn sample_process(_pid: u32) -> Option<Sample> {
    None
}

fn sample_changed(prev: &Sample, cur: &Sample) -> bool {
    cur.cpu_ticks > prev.cpu_ticks
        || (cur.rss_kb - prev.rss_kb).abs() >= RSS_CHANGE_THRESHOLD_KB
        || cur.io_bytes > prev.io_bytes
}

#[cfg(unix)]
fn send_signal(pid: i32, sig: i32) {
    unsafe {
        libc::kill(pid, sig);
    }
}

/// Spawn `command args...`, drain stdout/stderr on dedicated threads (to
/// avoid the classic pipe-deadlock the teacher's `FfmpegProcess` already
/// guards against), watch for hangs, and enforce the estimated timeout.
pub fn run(
    command: &str,
    args: &[&str],
    ctx: JobContext,
    cancel: &Arc<AtomicBool>,
    hang_policy: HangPolicy,
) -> Result<CommandOutput> {
    let timeout = ctx.estimate_timeout();
    let mut child = Command::new(command)
        .args(args)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| EngineError::Other(anyhow::anyhow!("failed to spawn {command}: {e}")))?;

    let pid = child.id();
    let stdout_buf = Arc::new(Mutex::new(String::new()));
    let stderr_buf = Arc::new(Mutex::new(String::new()));
    drain_pipe(child.stdout.take(), stdout_buf.clone());
    drain_pipe(child.stderr.take(), stderr_buf.clone());

    let started = Instant::now();
    let mut last_sample = sample_process(pid);
    let mut last_activity = started;

    let status = loop {
        if cancel.load(Ordering::Relaxed) {
            escalate_and_kill(&mut child, pid);
            return Err(EngineError::Cancelled);
        }

        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) => {}
            Err(e) => return Err(EngineError::Io(e)),
        }

        std::thread::sleep(WATCHDOG_SAMPLE_INTERVAL);

        if let Some(cur) = sample_process(pid) {
            if let Some(prev) = last_sample {
                if sample_changed(&prev, &cur) {
                    last_activity = Instant::now();
                }
            } else {
                last_activity = Instant::now();
            }
            last_sample = Some(cur);
        }

        if last_activity.elapsed() >= HANG_THRESHOLD {
            warn!(command, pid, "child process appears hung, no activity for 30s");
            match hang_policy {
                HangPolicy::Terminate => {
                    escalate_and_kill(&mut child, pid);
                    return Err(EngineError::ProcessHung {
                        command: command.to_string(),
                    });
                }
                HangPolicy::Ignore => {
                    last_activity = Instant::now(); // stop re-triggering every second
                }
                HangPolicy::Wait => {
                    last_activity = Instant::now() + Duration::from_secs(600) - HANG_THRESHOLD;
                }
            }
        }

        if started.elapsed() >= timeout {
            escalate_and_kill(&mut child, pid);
            return Err(EngineError::ProcessHung {
                command: command.to_string(),
            });
        }
    };

    // Give the drain threads a moment to flush after the child exits.
    std::thread::sleep(Duration::from_millis(20));

    let stdout = stdout_buf.lock().unwrap().clone();
    let stderr = stderr_buf.lock().unwrap().clone();

    Ok(CommandOutput {
        status_success: status.success(),
        exit_code: exit_code_of(&status),
        stdout,
        stderr,
    })
}

#[cfg(unix)]
fn exit_code_of(status: &std::process::ExitStatus) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;
    status.code().or_else(|| status.signal())
}

#[cfg(not(unix))]
fn exit_code_of(status: &std::process::ExitStatus) -> Option<i32> {
    status.code()
}

fn drain_pipe<R: Read + Send + 'static>(pipe: Option<R>, into: Arc<Mutex<String>>) {
    if let Some(mut pipe) = pipe {
        std::thread::spawn(move || {
            let mut buf = [0u8; 4096];
            loop {
                match pipe.read(&mut buf) {
                    Ok(0) => break,
                    Ok(n) => {
                        let chunk = String::from_utf8_lossy(&buf[..n]);
                        if let Ok(mut s) = into.lock() {
                            s.push_str(&chunk);
                        }
                    }
                    Err(_) => break,
                }
            }
        });
    }
}

/// SIGINT, wait 5s, SIGTERM, wait 5s, SIGKILL. Always reaps via `wait()`.
fn escalate_and_kill(child: &mut Child, pid: u32) {
    debug!(pid, "escalating termination");
    #[cfg(unix)]
    {
        send_signal(pid as i32, libc::SIGINT);
        if wait_for_exit(child, Duration::from_secs(5)) {
            return;
        }
        send_signal(pid as i32, libc::SIGTERM);
        if wait_for_exit(child, Duration::from_secs(5)) {
            return;
        }
        send_signal(pid as i32, libc::SIGKILL);
    }
    #[cfg(not(unix))]
    {
        let _ = child.kill();
    }
    let _ = child.wait();
}

fn wait_for_exit(child: &mut Child, budget: Duration) -> bool {
    let start = Instant::now();
    while start.elapsed() < budget {
        if let Ok(Some(_)) = child.try_wait() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(100));
    }
    false
}
