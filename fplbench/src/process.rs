//! Cancellable child processes running in their own process group
//!
//! A [`GroupChild`] is spawned as the leader of a new process group, so the
//! solver and everything it forks can be killed with one signal. Exit of the
//! leader is observed with `waitid(WNOWAIT)`, which leaves it a zombie: the
//! group id stays reserved until the leftover group members are killed. Only
//! then is the leader reaped with `wait4(2)`, which yields the resource usage
//! of that one child (including the descendants it reaped), so CPU
//! accounting stays correct while many solver runs share this process.

#![allow(unsafe_code)]

use std::io::{self, Read};
use std::os::unix::process::{CommandExt, ExitStatusExt};
use std::process::{Child, ChildStderr, ChildStdout, Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Initial poll interval while waiting for a child
const POLL_MIN: Duration = Duration::from_millis(1);
/// Upper bound of the poll interval
const POLL_MAX: Duration = Duration::from_millis(50);

/// CPU time consumed by a child and its reaped descendants
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CpuTime {
    /// User-mode CPU time
    pub user: Duration,
    /// Kernel-mode CPU time
    pub system: Duration,
}

impl CpuTime {
    fn from_rusage(usage: &libc::rusage) -> Self {
        Self {
            user: timeval_to_duration(usage.ru_utime),
            system: timeval_to_duration(usage.ru_stime),
        }
    }
}

fn timeval_to_duration(tv: libc::timeval) -> Duration {
    let secs = u64::try_from(tv.tv_sec).unwrap_or(0);
    let micros = u32::try_from(tv.tv_usec).unwrap_or(0);
    Duration::new(secs, micros.saturating_mul(1000))
}

/// Exit status and resource usage of a reaped child
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reaped {
    /// Exit status
    pub status: ExitStatus,
    /// CPU time of the child
    pub cpu: CpuTime,
}

/// Output captured from a finished child
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapturedOutput {
    /// Standard output (lossy UTF-8)
    pub stdout: String,
    /// Standard error (lossy UTF-8)
    pub stderr: String,
}

/// A child process leading its own process group
pub struct GroupChild {
    child: Child,
    pid: libc::pid_t,
    stdout: Option<JoinHandle<String>>,
    stderr: Option<JoinHandle<String>>,
    reaped: Option<Reaped>,
}

impl GroupChild {
    /// Spawn `command` as the leader of a new process group
    ///
    /// Standard input is closed; standard output and error are captured on
    /// background threads so a chatty child cannot block on a full pipe.
    pub fn spawn(mut command: Command) -> io::Result<Self> {
        command
            .process_group(0)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = command.spawn()?;
        let pid = libc::pid_t::try_from(child.id())
            .map_err(|_| io::Error::other("child pid out of range"))?;

        let stdout = child.stdout.take().map(drain_stdout);
        let stderr = child.stderr.take().map(drain_stderr);

        debug!("Spawned process group {}", pid);

        Ok(Self {
            child,
            pid,
            stdout,
            stderr,
            reaped: None,
        })
    }

    /// Process id of the group leader (also the process group id)
    #[must_use]
    pub fn id(&self) -> u32 {
        self.child.id()
    }

    /// Wait for the leader to exit, at most `timeout`
    ///
    /// Returns `Ok(None)` if the deadline passed with the child still running.
    /// Once the leader has exited, the rest of its group is killed and the
    /// leader is reaped.
    pub fn wait_timeout(&mut self, timeout: Duration) -> io::Result<Option<Reaped>> {
        if let Some(reaped) = self.reaped {
            return Ok(Some(reaped));
        }

        let deadline = Instant::now() + timeout;
        let mut interval = POLL_MIN;

        loop {
            if self.leader_exited(false)? {
                return self.reap().map(Some);
            }

            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }

            thread::sleep(interval.min(deadline - now));
            interval = (interval * 2).min(POLL_MAX);
        }
    }

    /// Block until the leader exits, then kill the rest of the group and reap
    pub fn wait(&mut self) -> io::Result<Reaped> {
        if let Some(reaped) = self.reaped {
            return Ok(reaped);
        }
        while !self.leader_exited(true)? {}
        self.reap()
    }

    /// Send SIGKILL to every process in the group
    ///
    /// A group that no longer exists is not an error. Does nothing once the
    /// leader has been reaped, since its group id may then be reused.
    pub fn kill_group(&self) -> io::Result<()> {
        if self.reaped.is_some() {
            return Ok(());
        }
        // SAFETY: killpg only sends a signal; the group id is our own unreaped child's pid
        let rc = unsafe { libc::killpg(self.pid, libc::SIGKILL) };
        if rc == 0 {
            return Ok(());
        }
        let err = io::Error::last_os_error();
        if err.raw_os_error() == Some(libc::ESRCH) {
            Ok(())
        } else {
            Err(err)
        }
    }

    /// Wait for the output reader threads and return what they captured
    ///
    /// An unreaped leader is killed with its group first, so this cannot hang
    /// on a lingering descendant holding the pipes open.
    pub fn into_output(mut self) -> CapturedOutput {
        if self.reaped.is_none() {
            if let Err(e) = self.kill_group() {
                warn!("Failed to kill process group {}: {}", self.pid, e);
            }
            if let Err(e) = self.wait() {
                warn!("Failed to reap process group {}: {}", self.pid, e);
            }
        }
        CapturedOutput {
            stdout: join_reader(self.stdout.take()),
            stderr: join_reader(self.stderr.take()),
        }
    }

    /// Check for exit of the leader without reaping it
    fn leader_exited(&self, block: bool) -> io::Result<bool> {
        let mut options = libc::WEXITED | libc::WNOWAIT;
        if !block {
            options |= libc::WNOHANG;
        }
        let id = libc::id_t::from(self.child.id());

        loop {
            // SAFETY: siginfo_t is plain old data, all-zero is a valid value
            let mut info: libc::siginfo_t = unsafe { std::mem::zeroed() };
            // SAFETY: the out-pointer refers to a live local; id is our child
            let rc = unsafe { libc::waitid(libc::P_PID, id, &mut info, options) };
            if rc == 0 {
                // With WNOHANG a still-running child leaves si_pid zeroed
                // SAFETY: waitid filled in a SIGCHLD siginfo, or left it zeroed
                return Ok(unsafe { info.si_pid() } != 0);
            }
            let err = io::Error::last_os_error();
            if err.kind() != io::ErrorKind::Interrupted {
                return Err(err);
            }
        }
    }

    /// Kill what is left of the group, then reap the exited leader
    fn reap(&mut self) -> io::Result<Reaped> {
        if let Err(e) = self.kill_group() {
            warn!("Failed to clean up process group {}: {}", self.pid, e);
        }

        let mut status: libc::c_int = 0;
        // SAFETY: rusage is plain old data, all-zero is a valid value
        let mut usage: libc::rusage = unsafe { std::mem::zeroed() };

        loop {
            // SAFETY: both out-pointers refer to live locals; pid is our child
            let rc = unsafe { libc::wait4(self.pid, &mut status, 0, &mut usage) };
            if rc == self.pid {
                let reaped = Reaped {
                    status: ExitStatus::from_raw(status),
                    cpu: CpuTime::from_rusage(&usage),
                };
                self.reaped = Some(reaped);
                return Ok(reaped);
            }
            let err = io::Error::last_os_error();
            if err.kind() != io::ErrorKind::Interrupted {
                return Err(err);
            }
        }
    }
}

impl Drop for GroupChild {
    fn drop(&mut self) {
        if self.reaped.is_none() {
            let _ = self.kill_group();
            let _ = self.wait();
        }
    }
}

fn drain_stdout(mut pipe: ChildStdout) -> JoinHandle<String> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = pipe.read_to_end(&mut buf);
        String::from_utf8_lossy(&buf).into_owned()
    })
}

fn drain_stderr(mut pipe: ChildStderr) -> JoinHandle<String> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = pipe.read_to_end(&mut buf);
        String::from_utf8_lossy(&buf).into_owned()
    })
}

fn join_reader(handle: Option<JoinHandle<String>>) -> String {
    handle
        .and_then(|h| h.join().ok())
        .unwrap_or_default()
}

/// Check whether a process is alive (exists and is not a zombie)
#[cfg(target_os = "linux")]
#[must_use]
pub fn process_alive(pid: u32) -> bool {
    match std::fs::read_to_string(format!("/proc/{pid}/stat")) {
        // State is the first field after the parenthesized command name
        Ok(stat) => stat
            .rsplit_once(')')
            .and_then(|(_, rest)| rest.split_whitespace().next())
            .is_some_and(|state| state != "Z" && state != "X"),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sh(script: &str) -> Command {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(script);
        cmd
    }

    #[test]
    fn test_exit_code_and_output() {
        let mut child = GroupChild::spawn(sh("echo out; echo err >&2; exit 2")).unwrap();
        let reaped = child.wait_timeout(Duration::from_secs(10)).unwrap().unwrap();
        assert_eq!(reaped.status.code(), Some(2));

        let output = child.into_output();
        assert_eq!(output.stdout, "out\n");
        assert_eq!(output.stderr, "err\n");
    }

    #[test]
    fn test_timeout_and_kill() {
        let mut child = GroupChild::spawn(sh("sleep 5")).unwrap();
        let start = Instant::now();
        assert!(child.wait_timeout(Duration::from_millis(200)).unwrap().is_none());
        assert!(start.elapsed() >= Duration::from_millis(200));

        child.kill_group().unwrap();
        let reaped = child.wait().unwrap();
        assert_eq!(reaped.status.signal(), Some(libc::SIGKILL));
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_cpu_time_is_per_child() {
        // Busy loop for a short while, then exit
        let mut child = GroupChild::spawn(sh(
            "i=0; while [ $i -lt 200000 ]; do i=$((i+1)); done",
        ))
        .unwrap();
        let reaped = child.wait_timeout(Duration::from_secs(30)).unwrap().unwrap();
        assert!(reaped.status.success());
        assert!(reaped.cpu.user + reaped.cpu.system > Duration::ZERO);
    }

    #[test]
    fn test_group_is_killed_before_leader_is_reaped() {
        // The leader exits at once, leaving a background member in its group
        let mut child = GroupChild::spawn(sh("sleep 30 & echo $!; exit 3")).unwrap();
        let reaped = child.wait_timeout(Duration::from_secs(10)).unwrap().unwrap();
        assert_eq!(reaped.status.code(), Some(3));

        // Reaped: no further signal may target the freed group id
        assert!(child.kill_group().is_ok());
        assert_eq!(child.wait().unwrap(), reaped);

        let output = child.into_output();
        let member: u32 = output.stdout.trim().parse().unwrap();
        assert_gone(member);
    }

    #[cfg(target_os = "linux")]
    fn assert_gone(pid: u32) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while process_alive(pid) && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(20));
        }
        assert!(!process_alive(pid), "group member {pid} survived");
    }

    #[cfg(not(target_os = "linux"))]
    fn assert_gone(_pid: u32) {}

    #[test]
    fn test_spawn_missing_binary() {
        let result = GroupChild::spawn(Command::new("/nonexistent/solver-binary"));
        assert!(result.is_err());
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_process_alive() {
        assert!(process_alive(std::process::id()));
        assert!(!process_alive(u32::MAX));
    }
}
