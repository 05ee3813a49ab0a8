//! `systemctl` subprocess implementation of [`ServiceManager`].

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use sirberus_shared::constants::systemd::{JOB_RESULT_DONE, UNIT_TIMEOUT};
use sirberus_shared::errors::{SirberusError, SirberusResult};
use tokio::process::Command;

use super::properties::UnitProperties;
use super::{JobResult, ServiceManager, UnitOperation, UnitSummary};
use crate::util::process::run_with_timeout;

/// Talks to systemd through the `systemctl` CLI.
#[derive(Debug, Clone)]
pub struct SystemctlManager {
    binary: PathBuf,
    timeout: Duration,
}

impl Default for SystemctlManager {
    fn default() -> Self {
        Self::new("systemctl")
    }
}

impl SystemctlManager {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            timeout: UNIT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn command(&self, args: &[&str]) -> Command {
        let mut cmd = Command::new(&self.binary);
        cmd.args(args);
        cmd.env("SYSTEMD_COLORS", "0");
        cmd
    }
}

#[async_trait]
impl ServiceManager for SystemctlManager {
    async fn list_units(&self) -> SirberusResult<Vec<UnitSummary>> {
        let cmd = self.command(&[
            "list-units",
            "--type=service",
            "--all",
            "--no-legend",
            "--no-pager",
            "--plain",
        ]);
        let output = run_with_timeout(cmd, self.timeout).await?;
        if !output.status.success() {
            return Err(SirberusError::BackendUnavailable(format!(
                "systemctl list-units failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(parse_list_units(&String::from_utf8_lossy(&output.stdout)))
    }

    async fn unit_properties(&self, name: &str) -> SirberusResult<UnitProperties> {
        let cmd = self.command(&["show", name, "--no-pager", "--timestamp=unix"]);
        let output = run_with_timeout(cmd, self.timeout).await?;
        if !output.status.success() {
            return Err(SirberusError::BackendUnavailable(format!(
                "systemctl show {} failed: {}",
                name,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let props = UnitProperties::parse(&String::from_utf8_lossy(&output.stdout));
        if props.get_string("LoadState") == "not-found" {
            return Err(SirberusError::NotFound(format!("Service {} not found", name)));
        }
        Ok(props)
    }

    async fn run_job(&self, name: &str, op: UnitOperation) -> SirberusResult<JobResult> {
        tracing::info!(unit = %name, operation = %op, "Running unit job");
        let cmd = self.command(&[op.verb(), name, "--no-ask-password"]);
        let output = run_with_timeout(cmd, self.timeout).await?;

        if output.status.success() {
            return Ok(JobResult {
                result: JOB_RESULT_DONE.to_string(),
                detail: None,
            });
        }

        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        if stderr.contains("not found") || stderr.contains("not loaded") {
            return Err(SirberusError::NotFound(format!("Service {} not found", name)));
        }
        Ok(JobResult {
            result: "failed".to_string(),
            detail: (!stderr.is_empty()).then_some(stderr),
        })
    }
}

fn parse_list_units(output: &str) -> Vec<UnitSummary> {
    output
        .lines()
        .filter_map(|line| {
            let mut fields = line.split_whitespace().peekable();
            // Failed units may carry a status marker in front of the name
            if matches!(fields.peek(), Some(&"●") | Some(&"*") | Some(&"×")) {
                fields.next();
            }
            let name = fields.next()?;
            let load_state = fields.next()?;
            let active_state = fields.next()?;
            let sub_state = fields.next()?;
            let description = fields.collect::<Vec<_>>().join(" ");
            Some(UnitSummary {
                name: name.to_string(),
                description,
                load_state: load_state.to_string(),
                active_state: active_state.to_string(),
                sub_state: sub_state.to_string(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;

    const FAKE_SYSTEMCTL: &str = r#"#!/bin/sh
case "$1" in
  list-units)
    echo "nginx.service loaded active running A high performance web server"
    echo "● broken.service loaded failed failed Broken thing"
    ;;
  show)
    if [ "$2" = "nginx.service" ]; then
      echo "Id=nginx.service"
      echo "LoadState=loaded"
      echo "ActiveState=active"
      echo "MainPID=42"
    else
      echo "Id=$2"
      echo "LoadState=not-found"
    fi
    ;;
  start)
    exit 0
    ;;
  stop)
    echo "Failed to stop $2: Unit $2 not loaded." >&2
    exit 5
    ;;
  restart)
    echo "Job for $2 failed because the control process exited with error code." >&2
    exit 1
    ;;
  *)
    sleep 10
    ;;
esac
"#;

    fn fake_manager() -> (tempfile::TempDir, SystemctlManager) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("systemctl");
        std::fs::write(&path, FAKE_SYSTEMCTL).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        (dir, SystemctlManager::new(path))
    }

    #[test]
    fn test_parse_list_units() {
        let units = parse_list_units(
            "ssh.service loaded active running OpenBSD Secure Shell server\n\
             ● cron.service loaded failed failed Regular background program\n\
             \n",
        );
        assert_eq!(units.len(), 2);
        assert_eq!(units[0].name, "ssh.service");
        assert_eq!(units[0].description, "OpenBSD Secure Shell server");
        assert_eq!(units[1].name, "cron.service");
        assert_eq!(units[1].active_state, "failed");
    }

    #[tokio::test]
    async fn test_list_units_via_binary() {
        let (_dir, manager) = fake_manager();
        let units = manager.list_units().await.unwrap();
        assert_eq!(units.len(), 2);
        assert_eq!(units[1].name, "broken.service");
    }

    #[tokio::test]
    async fn test_unit_properties_and_not_found() {
        let (_dir, manager) = fake_manager();
        let props = manager.unit_properties("nginx.service").await.unwrap();
        assert_eq!(props.get_u32("MainPID"), 42);

        let err = manager.unit_properties("ghost.service").await.unwrap_err();
        assert!(matches!(err, SirberusError::NotFound(ref m) if m == "Service ghost.service not found"));
    }

    #[tokio::test]
    async fn test_run_job_results() {
        let (_dir, manager) = fake_manager();
        let done = manager
            .run_job("nginx.service", UnitOperation::Start)
            .await
            .unwrap();
        assert_eq!(done.result, "done");

        let err = manager
            .run_job("ghost.service", UnitOperation::Stop)
            .await
            .unwrap_err();
        assert!(matches!(err, SirberusError::NotFound(_)));

        let failed = manager
            .run_job("nginx.service", UnitOperation::Restart)
            .await
            .unwrap();
        assert_eq!(failed.result, "failed");
        assert!(failed.detail.unwrap().contains("control process exited"));
    }

    #[tokio::test]
    async fn test_missing_binary_is_backend_unavailable() {
        let manager = SystemctlManager::new("/nonexistent/systemctl");
        let err = manager.list_units().await.unwrap_err();
        assert!(matches!(err, SirberusError::BackendUnavailable(_)));
    }
}
