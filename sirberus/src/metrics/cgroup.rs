//! Cumulative CPU counters from cgroup accounting files.

use std::fs;
use std::path::{Path, PathBuf};

use sirberus_shared::constants::metrics::CGROUP_ROOT;
use sirberus_shared::errors::{SirberusError, SirberusResult};

use super::reading::CpuCounter;
use super::sampler::CpuCounterSource;

/// v1 controller directories, probed in order.
const V1_CONTROLLERS: &[&str] = &["cpu,cpuacct", "cpuacct"];

/// Reads cumulative CPU usage for a control group.
///
/// The unified (v2) hierarchy is tried first, then the two common v1
/// controller mounts. The first file that exists and parses wins.
#[derive(Debug, Clone)]
pub struct CgroupCpuReader {
    root: PathBuf,
}

impl Default for CgroupCpuReader {
    fn default() -> Self {
        Self::new(CGROUP_ROOT)
    }
}

impl CgroupCpuReader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Read the counter for `cgroup`, e.g. `/system.slice/nginx.service`.
    pub fn read(&self, cgroup: &str) -> SirberusResult<CpuCounter> {
        let rel = cgroup.trim().trim_start_matches('/');
        if rel.is_empty() {
            return Err(SirberusError::TransientRead(
                "unit has no control group".to_string(),
            ));
        }

        if let Some(usec) = self.read_v2(rel) {
            return Ok(CpuCounter::micros(usec));
        }

        for controller in V1_CONTROLLERS {
            let path = self.root.join(controller).join(rel).join("cpuacct.usage");
            if let Some(nsec) = read_single_u64(&path) {
                return Ok(CpuCounter::nanos(nsec));
            }
        }

        Err(SirberusError::TransientRead(format!(
            "no cpu accounting data for cgroup {}",
            cgroup
        )))
    }

    fn read_v2(&self, rel: &str) -> Option<u64> {
        let content = fs::read_to_string(self.root.join(rel).join("cpu.stat")).ok()?;
        content.lines().find_map(|line| {
            let (key, value) = line.split_once(char::is_whitespace)?;
            if key == "usage_usec" {
                value.trim().parse().ok()
            } else {
                None
            }
        })
    }
}

fn read_single_u64(path: &Path) -> Option<u64> {
    fs::read_to_string(path).ok()?.trim().parse().ok()
}

/// A reader bound to one control group, usable as a sampler counter source.
#[derive(Debug, Clone, Copy)]
pub struct CgroupCpu<'a> {
    pub reader: &'a CgroupCpuReader,
    pub cgroup: &'a str,
}

impl CpuCounterSource for CgroupCpu<'_> {
    fn read_counter(&self) -> SirberusResult<CpuCounter> {
        self.reader.read(self.cgroup)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::CpuTimeUnit;

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[test]
    fn test_reads_v2_usage_usec() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "system.slice/nginx.service/cpu.stat",
            "usage_usec 123456\nuser_usec 100000\nsystem_usec 23456\n",
        );

        let reader = CgroupCpuReader::new(dir.path());
        let counter = reader.read("/system.slice/nginx.service").unwrap();
        assert_eq!(counter.value, 123456);
        assert_eq!(counter.unit, CpuTimeUnit::Microseconds);
    }

    #[test]
    fn test_v2_wins_over_v1() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "system.slice/a.service/cpu.stat", "usage_usec 5\n");
        write(
            dir.path(),
            "cpu,cpuacct/system.slice/a.service/cpuacct.usage",
            "999\n",
        );

        let counter = CgroupCpuReader::new(dir.path())
            .read("/system.slice/a.service")
            .unwrap();
        assert_eq!(counter, CpuCounter::micros(5));
    }

    #[test]
    fn test_falls_back_to_v1_controllers_in_order() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "cpuacct/system.slice/b.service/cpuacct.usage",
            "777000\n",
        );

        let counter = CgroupCpuReader::new(dir.path())
            .read("/system.slice/b.service")
            .unwrap();
        assert_eq!(counter, CpuCounter::nanos(777000));
    }

    #[test]
    fn test_v2_without_usage_key_falls_through() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "system.slice/c.service/cpu.stat", "nr_periods 0\n");
        write(
            dir.path(),
            "cpu,cpuacct/system.slice/c.service/cpuacct.usage",
            "10\n",
        );

        let counter = CgroupCpuReader::new(dir.path())
            .read("/system.slice/c.service")
            .unwrap();
        assert_eq!(counter, CpuCounter::nanos(10));
    }

    #[test]
    fn test_missing_accounting_is_transient_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = CgroupCpuReader::new(dir.path())
            .read("/system.slice/gone.service")
            .unwrap_err();
        assert!(matches!(err, SirberusError::TransientRead(_)));

        let err = CgroupCpuReader::new(dir.path()).read("").unwrap_err();
        assert!(matches!(err, SirberusError::TransientRead(_)));
    }
}
