//! Process helpers: PID inspection and bounded subprocess execution.

use std::fs;
use std::io;
use std::process::Output;
use std::time::Duration;

use sirberus_shared::errors::{SirberusError, SirberusResult};
use tokio::process::Command;

/// Run `cmd` to completion, killing it if it takes longer than `timeout`.
///
/// A missing binary is reported as `BackendUnavailable`, an expired timer as
/// `Timeout`. The exit status is left for the caller to interpret.
pub async fn run_with_timeout(mut cmd: Command, timeout: Duration) -> SirberusResult<Output> {
    cmd.kill_on_drop(true);
    let program = cmd.as_std().get_program().to_string_lossy().into_owned();

    match tokio::time::timeout(timeout, cmd.output()).await {
        Err(_) => {
            tracing::warn!(program = %program, ?timeout, "Command timed out");
            Err(SirberusError::Timeout(timeout))
        }
        Ok(Err(e)) if e.kind() == io::ErrorKind::NotFound => Err(
            SirberusError::BackendUnavailable(format!("{} not found: {}", program, e)),
        ),
        Ok(Err(e)) => Err(SirberusError::Io(e)),
        Ok(Ok(output)) => Ok(output),
    }
}

/// Check if a process with the given PID exists.
///
/// Uses `libc::kill(pid, 0)` which sends a null signal to check existence.
///
/// # Returns
/// * `true` - Process exists
/// * `false` - Process does not exist, PID is 0, or permission denied
pub fn is_process_alive(pid: u32) -> bool {
    if pid == 0 || pid > i32::MAX as u32 {
        return false;
    }
    unsafe { libc::kill(pid as i32, 0) == 0 }
}

/// Read the command line of `pid` with NUL separators replaced by spaces.
///
/// Returns `None` when the process is gone or the command line is empty
/// (kernel threads).
pub fn read_proc_cmdline(pid: u32) -> Option<String> {
    if pid == 0 {
        return None;
    }
    let raw = fs::read(format!("/proc/{}/cmdline", pid)).ok()?;
    let cmdline = String::from_utf8_lossy(&raw)
        .trim_end_matches('\0')
        .replace('\0', " ");
    if cmdline.is_empty() {
        None
    } else {
        Some(cmdline)
    }
}

/// Real user id of this process, used to locate per-user runtime sockets.
pub fn current_uid() -> u32 {
    unsafe { libc::getuid() }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_process_alive_current() {
        // Current process should always be alive
        assert!(is_process_alive(std::process::id()));
    }

    #[test]
    fn test_is_process_alive_invalid() {
        assert!(!is_process_alive(0));
        assert!(!is_process_alive(999999999));
        assert!(!is_process_alive(u32::MAX));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_read_proc_cmdline_current() {
        let cmdline = read_proc_cmdline(std::process::id()).unwrap();
        assert!(!cmdline.contains('\0'));
        assert!(!cmdline.ends_with(' '));
    }

    #[tokio::test]
    async fn test_run_with_timeout_collects_output() {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", "echo hello; exit 3"]);
        let output = run_with_timeout(cmd, Duration::from_secs(5)).await.unwrap();
        assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "hello");
        assert_eq!(output.status.code(), Some(3));
    }

    #[tokio::test]
    async fn test_run_with_timeout_expires() {
        let mut cmd = Command::new("sleep");
        cmd.arg("5");
        let err = run_with_timeout(cmd, Duration::from_millis(50)).await.unwrap_err();
        assert!(matches!(err, SirberusError::Timeout(_)));
    }

    #[tokio::test]
    async fn test_run_with_timeout_missing_binary() {
        let cmd = Command::new("/nonexistent/sirberus-test-binary");
        let err = run_with_timeout(cmd, Duration::from_secs(1)).await.unwrap_err();
        assert!(matches!(err, SirberusError::BackendUnavailable(_)));
    }

    #[test]
    fn test_read_proc_cmdline_missing() {
        assert!(read_proc_cmdline(0).is_none());
        assert!(read_proc_cmdline(999999999).is_none());
    }
}
