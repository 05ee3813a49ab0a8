//! Command-line and environment configuration.

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

use clap::Parser;
use sirberus_shared::constants::metrics::CGROUP_ROOT;
use sirberus_shared::constants::server::{DEFAULT_HOST, DEFAULT_PORT};
use sirberus_shared::errors::{SirberusError, SirberusResult};

#[derive(Debug, Clone, Parser)]
#[command(name = "sirberus", version, about = "Dashboard backend for systemd services and containers")]
pub struct Config {
    /// Address to listen on
    #[arg(long, env = "SIRBERUS_HOST", default_value = DEFAULT_HOST)]
    pub host: String,

    /// Port to listen on
    #[arg(long, short, env = "SIRBERUS_PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Log filter, overridden by RUST_LOG
    #[arg(long, env = "SIRBERUS_LOG", default_value = "info")]
    pub log_level: String,

    /// Also write daily rolling log files to this directory
    #[arg(long, env = "SIRBERUS_LOG_DIR")]
    pub log_dir: Option<PathBuf>,

    /// Container runtime endpoint (unix:// or tcp://). Defaults to DOCKER_HOST, then socket discovery
    #[arg(long)]
    pub docker_host: Option<String>,

    /// Mount point of the cgroup hierarchy
    #[arg(long, env = "SIRBERUS_CGROUP_ROOT", default_value = CGROUP_ROOT)]
    pub cgroup_root: PathBuf,

    #[arg(long, default_value = "journalctl")]
    pub journalctl: PathBuf,

    #[arg(long, default_value = "systemctl")]
    pub systemctl: PathBuf,
}

impl Config {
    pub fn bind_addr(&self) -> SirberusResult<SocketAddr> {
        let host = self.host.trim_start_matches('[').trim_end_matches(']');
        let ip: IpAddr = host
            .parse()
            .map_err(|e| SirberusError::Config(format!("invalid host {}: {}", self.host, e)))?;
        Ok(SocketAddr::new(ip, self.port))
    }
}
