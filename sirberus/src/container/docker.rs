//! Docker Engine API implementation of [`ContainerRuntime`].
//!
//! Podman exposes the same API on its own socket, so host discovery probes
//! both before giving up.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use async_trait::async_trait;
use bollard::Docker;
use bollard::container::{
    InspectContainerOptions, ListContainersOptions, LogsOptions, RestartContainerOptions,
    StartContainerOptions, StatsOptions, StopContainerOptions,
};
use bollard::errors::Error as BollardError;
use bollard::exec::{CreateExecOptions, StartExecResults};
use bollard::models::{ContainerInspectResponse, PortBinding};
use futures::StreamExt;
use sirberus_shared::constants::container::{API_TIMEOUT_SECS, SOCKET_CANDIDATES, STOP_TIMEOUT};
use sirberus_shared::errors::{SirberusError, SirberusResult};

use super::{
    ContainerEntry, ContainerInspect, ContainerOperation, ContainerRuntime, ContainerStats,
    ExecAttach, MountInfo, NetworkInfo, PortMapping, TextStream,
};
use crate::util::process::current_uid;

/// Pick the runtime endpoint.
///
/// Order: explicit configuration, `DOCKER_HOST`, then the first existing
/// socket among Docker's, Podman's system socket and the current user's
/// Podman socket.
pub fn discover_host(configured: Option<&str>) -> Option<String> {
    discover_host_with(
        configured,
        std::env::var("DOCKER_HOST").ok(),
        current_uid(),
        |p| p.exists(),
    )
}

fn discover_host_with(
    configured: Option<&str>,
    env_host: Option<String>,
    uid: u32,
    exists: impl Fn(&Path) -> bool,
) -> Option<String> {
    if let Some(host) = configured.filter(|h| !h.is_empty()) {
        return Some(host.to_string());
    }
    if let Some(host) = env_host.filter(|h| !h.is_empty()) {
        return Some(host);
    }

    let user_socket = format!("/run/user/{}/podman/podman.sock", uid);
    SOCKET_CANDIDATES
        .iter()
        .copied()
        .chain(std::iter::once(user_socket.as_str()))
        .find(|p| exists(Path::new(p)))
        .map(|p| format!("unix://{}", p))
}

#[derive(Debug, Clone)]
pub struct DockerRuntime {
    docker: Docker,
    host: String,
}

impl DockerRuntime {
    /// Connect to `host` (`unix://...`, `tcp://...` or `http://...`).
    ///
    /// A unix socket path that does not exist fails here. A socket nobody listens
    /// on, or an unreachable TCP daemon, only shows up on the first request.
    pub fn connect(host: &str) -> SirberusResult<Self> {
        let docker = if let Some(path) = host.strip_prefix("unix://") {
            Docker::connect_with_unix(path, API_TIMEOUT_SECS, bollard::API_DEFAULT_VERSION)
        } else if host.starts_with("tcp://") || host.starts_with("http://") {
            Docker::connect_with_http(host, API_TIMEOUT_SECS, bollard::API_DEFAULT_VERSION)
        } else {
            Docker::connect_with_unix(host, API_TIMEOUT_SECS, bollard::API_DEFAULT_VERSION)
        }
        .map_err(|e| {
            SirberusError::BackendUnavailable(format!(
                "cannot connect to container runtime at {}: {}",
                host, e
            ))
        })?;

        tracing::info!(host = %host, "Using container runtime");
        Ok(Self {
            docker,
            host: host.to_string(),
        })
    }

    pub fn host(&self) -> &str {
        &self.host
    }
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn list(&self) -> SirberusResult<Vec<ContainerEntry>> {
        let options = ListContainersOptions::<String> {
            all: true,
            ..Default::default()
        };
        let containers = self
            .docker
            .list_containers(Some(options))
            .await
            .map_err(|e| map_bollard_error("", e))?;

        Ok(containers
            .into_iter()
            .map(|c| ContainerEntry {
                id: c.id.unwrap_or_default(),
                image: c.image.unwrap_or_default(),
                status: c.status.unwrap_or_default(),
                ports: c
                    .ports
                    .unwrap_or_default()
                    .into_iter()
                    .map(|p| PortMapping {
                        ip: p.ip,
                        private_port: p.private_port,
                        public_port: p.public_port,
                        protocol: p
                            .typ
                            .map(|t| t.to_string())
                            .unwrap_or_else(|| "tcp".to_string()),
                    })
                    .collect(),
            })
            .collect())
    }

    async fn inspect(&self, id: &str) -> SirberusResult<ContainerInspect> {
        let response = self
            .docker
            .inspect_container(id, None::<InspectContainerOptions>)
            .await
            .map_err(|e| map_bollard_error(id, e))?;
        Ok(convert_inspect(response))
    }

    async fn stats(&self, id: &str) -> SirberusResult<ContainerStats> {
        let options = StatsOptions {
            stream: false,
            one_shot: true,
        };
        let stats = self
            .docker
            .stats(id, Some(options))
            .next()
            .await
            .ok_or_else(|| SirberusError::TransientRead(format!("no stats for container {}", id)))?
            .map_err(|e| map_bollard_error(id, e))?;

        Ok(ContainerStats {
            cpu_total_ns: stats.cpu_stats.cpu_usage.total_usage,
            memory_bytes: stats.memory_stats.usage.unwrap_or(0),
        })
    }

    async fn apply(&self, id: &str, op: ContainerOperation) -> SirberusResult<()> {
        let timeout = STOP_TIMEOUT.as_secs();
        let result = match op {
            ContainerOperation::Start => {
                self.docker
                    .start_container(id, None::<StartContainerOptions<String>>)
                    .await
            }
            ContainerOperation::Stop => {
                self.docker
                    .stop_container(id, Some(StopContainerOptions { t: timeout as _ }))
                    .await
            }
            ContainerOperation::Restart => {
                self.docker
                    .restart_container(id, Some(RestartContainerOptions { t: timeout as _ }))
                    .await
            }
        };

        match result {
            Ok(()) => Ok(()),
            // Already in the requested state
            Err(BollardError::DockerResponseServerError {
                status_code: 304, ..
            }) => Ok(()),
            Err(e) => Err(map_bollard_error(id, e)),
        }
    }

    async fn logs(&self, id: &str, tail: usize, follow: bool) -> SirberusResult<TextStream> {
        // Surface unknown containers before the stream starts
        self.inspect(id).await?;

        let options = LogsOptions::<String> {
            stdout: true,
            stderr: true,
            follow,
            timestamps: true,
            tail: tail.to_string(),
            ..Default::default()
        };
        let docker = self.docker.clone();
        let id = id.to_string();

        let stream = async_stream::stream! {
            let mut logs = docker.logs(&id, Some(options));
            while let Some(chunk) = logs.next().await {
                yield chunk
                    .map(|out| String::from_utf8_lossy(&out.into_bytes()).into_owned())
                    .map_err(|e| map_bollard_error(&id, e));
            }
        };
        Ok(Box::pin(stream))
    }

    async fn exec(&self, id: &str, cmd: Vec<String>) -> SirberusResult<ExecAttach> {
        let options = CreateExecOptions {
            cmd: Some(cmd),
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            tty: Some(false),
            ..Default::default()
        };
        let created = self
            .docker
            .create_exec(id, options)
            .await
            .map_err(|e| map_bollard_error(id, e))?;

        match self
            .docker
            .start_exec(&created.id, None)
            .await
            .map_err(|e| map_bollard_error(id, e))?
        {
            StartExecResults::Attached { output, .. } => {
                let id = id.to_string();
                let output = output.map(move |chunk| {
                    chunk
                        .map(|out| String::from_utf8_lossy(&out.into_bytes()).into_owned())
                        .map_err(|e| map_bollard_error(&id, e))
                });
                Ok(ExecAttach {
                    exec_id: created.id,
                    output: Box::pin(output),
                })
            }
            StartExecResults::Detached => Err(SirberusError::Internal(
                "exec started detached, no output to attach".to_string(),
            )),
        }
    }

    async fn exec_exit_code(&self, exec_id: &str) -> SirberusResult<Option<i64>> {
        let inspect = self
            .docker
            .inspect_exec(exec_id)
            .await
            .map_err(|e| map_bollard_error(exec_id, e))?;
        if inspect.running.unwrap_or(false) {
            return Ok(None);
        }
        Ok(Some(inspect.exit_code.unwrap_or(0)))
    }
}

fn map_bollard_error(id: &str, err: BollardError) -> SirberusError {
    match err {
        BollardError::DockerResponseServerError {
            status_code: 404, ..
        } if !id.is_empty() => SirberusError::NotFound(format!("Container {} not found", id)),
        BollardError::DockerResponseServerError {
            status_code,
            message,
        } => SirberusError::OperationFailed(format!(
            "container runtime returned {}: {}",
            status_code, message
        )),
        other => SirberusError::BackendUnavailable(other.to_string()),
    }
}

fn convert_inspect(response: ContainerInspectResponse) -> ContainerInspect {
    let state = response.state.unwrap_or_default();
    let config = response.config.unwrap_or_default();
    let network = response.network_settings.unwrap_or_default();

    let mounts = response
        .mounts
        .unwrap_or_default()
        .into_iter()
        .map(|m| MountInfo {
            source: m.source.unwrap_or_default(),
            destination: m.destination.unwrap_or_default(),
            mode: if m.rw.unwrap_or(true) { "rw" } else { "ro" }.to_string(),
        })
        .collect();

    let networks = network
        .networks
        .unwrap_or_default()
        .into_iter()
        .map(|(name, ep)| {
            (
                name,
                NetworkInfo {
                    ip_address: ep.ip_address.unwrap_or_default(),
                    gateway: ep.gateway.unwrap_or_default(),
                    mac_address: ep.mac_address.unwrap_or_default(),
                },
            )
        })
        .collect();

    ContainerInspect {
        id: response.id.unwrap_or_default(),
        name: response.name.unwrap_or_default(),
        image: config.image.unwrap_or_default(),
        path: response.path.unwrap_or_default(),
        args: response.args.unwrap_or_default(),
        created: response.created.unwrap_or_default(),
        state: state.status.map(|s| s.to_string()).unwrap_or_default(),
        running: state.running.unwrap_or(false),
        started_at: state.started_at,
        finished_at: state.finished_at,
        restart_count: response.restart_count.unwrap_or(0),
        platform: response.platform.unwrap_or_default(),
        env: config.env.unwrap_or_default(),
        labels: config
            .labels
            .unwrap_or_default()
            .into_iter()
            .collect::<BTreeMap<_, _>>(),
        mounts,
        networks,
        ports: convert_port_map(network.ports.unwrap_or_default()),
    }
}

/// Flatten `{"80/tcp": [{"HostIp": "0.0.0.0", "HostPort": "8080"}]}`.
fn convert_port_map(map: HashMap<String, Option<Vec<PortBinding>>>) -> Vec<PortMapping> {
    let mut ports = Vec::new();
    for (key, bindings) in map {
        let (port, protocol) = key.split_once('/').unwrap_or((key.as_str(), "tcp"));
        let Ok(private_port) = port.parse::<u16>() else {
            continue;
        };
        match bindings.filter(|b| !b.is_empty()) {
            None => ports.push(PortMapping {
                ip: None,
                private_port,
                public_port: None,
                protocol: protocol.to_string(),
            }),
            Some(bindings) => {
                for binding in bindings {
                    ports.push(PortMapping {
                        ip: binding.host_ip,
                        private_port,
                        public_port: binding.host_port.and_then(|p| p.parse().ok()),
                        protocol: protocol.to_string(),
                    });
                }
            }
        }
    }
    ports.sort_by(|a, b| {
        (a.private_port, a.public_port, &a.protocol).cmp(&(b.private_port, b.public_port, &b.protocol))
    });
    ports
}
