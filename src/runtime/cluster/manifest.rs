// ABOUTME: Translates a ContainerSpec into cluster workload and config map descriptions.
// ABOUTME: Also owns the label scheme used to find a container's resources again.

use std::collections::BTreeMap;

use super::resources::{
    ConfigMapSpec, ContainerTemplate, Labels, MountPoint, NamedPort, PodTemplate, Probe,
    ResourceRequirements, Volume, VolumeSource, WorkloadKind, WorkloadSpec, cpu_quantity,
    memory_quantity,
};
use crate::config::{ContainerSpec, Resources};
use crate::error::Result;

pub const INSTANCE_LABEL: &str = "berth.io/instance";
pub const MANAGED_BY_LABEL: &str = "berth.io/managed-by";
pub const OWNER_LABEL: &str = "berth.io/owner";

/// Labels that identify every resource belonging to `name`.
pub fn selector(name: &str) -> Labels {
    Labels::from([(INSTANCE_LABEL.to_string(), name.to_string())])
}

/// Selector plus bookkeeping labels plus the spec's own labels.
pub fn resource_labels(spec: &ContainerSpec) -> Labels {
    let mut labels = spec.labels.clone();
    labels.insert(MANAGED_BY_LABEL.to_string(), env!("CARGO_PKG_NAME").to_string());
    labels.insert(OWNER_LABEL.to_string(), label_value(&owner()));
    labels.extend(selector(&spec.name));
    labels
}

fn owner() -> String {
    gethostname::gethostname().to_string_lossy().into_owned()
}

/// Label values allow alphanumerics, `-`, `_`, `.` and at most 63 characters.
fn label_value(raw: &str) -> String {
    let cleaned: String = raw
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || "-_.".contains(c) {
                c
            } else {
                '-'
            }
        })
        .take(63)
        .collect();
    cleaned.trim_matches(|c: char| !c.is_ascii_alphanumeric()).to_string()
}

/// Object names are lowercase DNS labels.
pub fn object_name(raw: &str) -> String {
    let cleaned: String = raw
        .to_ascii_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect();
    cleaned.trim_matches('-').chars().take(63).collect()
}

pub fn config_map_name(spec: &ContainerSpec, key: &str) -> String {
    object_name(&format!("{}-{}", spec.name, key))
}

/// One config map per file mount, each holding a single file.
pub fn config_maps(spec: &ContainerSpec) -> Result<Vec<ConfigMapSpec>> {
    let labels = resource_labels(spec);
    spec.files
        .iter()
        .map(|(key, mount)| {
            Ok(ConfigMapSpec {
                name: config_map_name(spec, key),
                namespace: spec.namespace.clone(),
                labels: labels.clone(),
                data: BTreeMap::from([(mount.file_name().to_string(), mount.read()?)]),
            })
        })
        .collect()
}

pub fn workload(spec: &ContainerSpec, kind: WorkloadKind) -> WorkloadSpec {
    let labels = resource_labels(spec);

    let mut volumes = Vec::new();
    let mut mounts = Vec::new();
    for (key, mount) in &spec.files {
        let volume = object_name(&format!("file-{}", key));
        volumes.push(Volume {
            name: volume.clone(),
            source: VolumeSource::ConfigMap {
                name: config_map_name(spec, key),
            },
        });
        mounts.push(MountPoint {
            volume,
            path: mount.path.clone(),
            sub_path: Some(mount.file_name().to_string()),
            read_only: true,
        });
    }
    for (index, bind) in spec.volumes.iter().enumerate() {
        let volume = format!("volume-{}", index);
        volumes.push(Volume {
            name: volume.clone(),
            source: VolumeSource::HostPath {
                path: bind.source.clone(),
            },
        });
        mounts.push(MountPoint {
            volume,
            path: bind.target.clone(),
            sub_path: None,
            read_only: bind.read_only,
        });
    }

    let readiness = match kind {
        WorkloadKind::Task => None,
        WorkloadKind::Service => Some(match spec.primary_port() {
            Some(port) => Probe::TcpSocket { port },
            None => Probe::Exec {
                command: vec!["true".to_string()],
            },
        }),
    };

    let container = ContainerTemplate {
        name: spec.name.clone(),
        image: spec.image.to_string(),
        command: spec.command.clone(),
        args: spec.args.clone(),
        env: spec.env.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
        ports: spec
            .exposed_ports
            .iter()
            .map(|(name, &port)| NamedPort {
                name: name.clone(),
                port,
            })
            .collect(),
        resources: requirements(&spec.resources),
        readiness,
        mounts,
    };

    WorkloadSpec {
        name: spec.name.clone(),
        namespace: spec.namespace.clone(),
        kind,
        replicas: 1,
        labels: labels.clone(),
        selector: selector(&spec.name),
        template: PodTemplate {
            labels,
            container,
            volumes,
            restart: kind == WorkloadKind::Service,
        },
    }
}

fn requirements(resources: &Resources) -> ResourceRequirements {
    let mut req = ResourceRequirements::default();
    if let Some(cpu) = resources.cpu_request {
        req.requests.insert("cpu".into(), cpu_quantity(cpu));
    }
    if let Some(mem) = resources.memory_request {
        req.requests.insert("memory".into(), memory_quantity(mem));
    }
    if let Some(cpu) = resources.cpu_limit {
        req.limits.insert("cpu".into(), cpu_quantity(cpu));
    }
    if let Some(mem) = resources.memory_limit {
        req.limits.insert("memory".into(), memory_quantity(mem));
    }
    req
}
