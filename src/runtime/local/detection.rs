// ABOUTME: Locates the local engine socket.
// ABOUTME: DOCKER_HOST wins, then rootless Podman, rootful Podman, Docker.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Which engine answers on the socket. Both speak the Docker API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineKind {
    Docker,
    Podman,
}

impl std::fmt::Display for EngineKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineKind::Docker => write!(f, "docker"),
            EngineKind::Podman => write!(f, "podman"),
        }
    }
}

/// Where the local engine listens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineEndpoint {
    pub kind: EngineKind,
    pub socket_path: String,
}

#[derive(Debug, thiserror::Error)]
pub enum DetectionError {
    #[error("no container engine found (checked DOCKER_HOST, Podman and Docker sockets)")]
    NoEngineFound,

    #[error("unsupported DOCKER_HOST {0}: only unix:// sockets are supported")]
    UnsupportedHost(String),
}

const ROOTFUL_PODMAN: &str = "/run/podman/podman.sock";
const DOCKER_SOCKET: &str = "/var/run/docker.sock";

/// Find the local engine.
///
/// Order: `DOCKER_HOST` (unix sockets only), `/run/user/$UID/podman/podman.sock`,
/// `/run/podman/podman.sock`, `/var/run/docker.sock`.
pub fn detect_local() -> Result<EngineEndpoint, DetectionError> {
    if let Ok(host) = std::env::var("DOCKER_HOST")
        && !host.is_empty()
    {
        let Some(path) = host.strip_prefix("unix://") else {
            return Err(DetectionError::UnsupportedHost(host));
        };
        let kind = if path.contains("podman") {
            EngineKind::Podman
        } else {
            EngineKind::Docker
        };
        return Ok(EngineEndpoint {
            kind,
            socket_path: path.to_string(),
        });
    }

    if let Some(uid) = current_uid() {
        let rootless = format!("/run/user/{}/podman/podman.sock", uid);
        if Path::new(&rootless).exists() {
            return Ok(EngineEndpoint {
                kind: EngineKind::Podman,
                socket_path: rootless,
            });
        }
    }

    if Path::new(ROOTFUL_PODMAN).exists() {
        return Ok(EngineEndpoint {
            kind: EngineKind::Podman,
            socket_path: ROOTFUL_PODMAN.to_string(),
        });
    }

    if Path::new(DOCKER_SOCKET).exists() {
        return Ok(EngineEndpoint {
            kind: EngineKind::Docker,
            socket_path: DOCKER_SOCKET.to_string(),
        });
    }

    Err(DetectionError::NoEngineFound)
}

fn current_uid() -> Option<String> {
    std::env::var("UID").ok().or_else(|| {
        std::fs::read_to_string("/proc/self/status")
            .ok()
            .and_then(|s| {
                s.lines()
                    .find(|l| l.starts_with("Uid:"))
                    .and_then(|l| l.split_whitespace().nth(1))
                    .map(|s| s.to_string())
            })
    })
}
