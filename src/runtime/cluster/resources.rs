// ABOUTME: Backend-neutral descriptions of the cluster objects the runtime manages.
// ABOUTME: Workloads, exposures, config maps, and the pod and job status read back.

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

use crate::types::PodId;

pub type Labels = BTreeMap<String, String>;

/// Long-running replicated service, or a run-once job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkloadKind {
    Service,
    Task,
}

impl std::fmt::Display for WorkloadKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WorkloadKind::Service => f.write_str("service"),
            WorkloadKind::Task => f.write_str("task"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct WorkloadSpec {
    pub name: String,
    pub namespace: String,
    pub kind: WorkloadKind,
    pub replicas: i32,
    pub labels: Labels,
    /// Pods carrying these labels belong to the workload.
    pub selector: Labels,
    pub template: PodTemplate,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PodTemplate {
    pub labels: Labels,
    pub container: ContainerTemplate,
    pub volumes: Vec<Volume>,
    /// Task pods never restart.
    pub restart: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ContainerTemplate {
    pub name: String,
    pub image: String,
    pub command: Option<Vec<String>>,
    pub args: Vec<String>,
    pub env: BTreeMap<String, String>,
    pub ports: Vec<NamedPort>,
    pub resources: ResourceRequirements,
    pub readiness: Option<Probe>,
    pub mounts: Vec<MountPoint>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamedPort {
    pub name: String,
    pub port: u16,
}

/// Quantities in the cluster's string notation, such as `500m` or `256Mi`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceRequirements {
    pub requests: BTreeMap<String, String>,
    pub limits: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Probe {
    TcpSocket { port: u16 },
    Exec { command: Vec<String> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Volume {
    pub name: String,
    pub source: VolumeSource,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VolumeSource {
    ConfigMap { name: String },
    HostPath { path: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountPoint {
    pub volume: String,
    pub path: String,
    pub sub_path: Option<String>,
    pub read_only: bool,
}

/// How a workload's ports are reachable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExposureType {
    /// Reachable inside the cluster only.
    ClusterIp,
    /// Also reachable on every node at a fixed port.
    NodePort,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExposureSpec {
    pub name: String,
    pub namespace: String,
    pub exposure_type: ExposureType,
    pub selector: Labels,
    pub labels: Labels,
    pub ports: Vec<ExposedPort>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExposedPort {
    pub name: String,
    pub port: u16,
    pub target_port: u16,
    pub node_port: Option<u16>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigMapSpec {
    pub name: String,
    pub namespace: String,
    pub labels: Labels,
    pub data: BTreeMap<String, Vec<u8>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PodPhase {
    Pending,
    Running,
    Succeeded,
    Failed,
    Unknown(String),
}

impl PodPhase {
    pub fn parse(phase: &str) -> Self {
        match phase {
            "Pending" => PodPhase::Pending,
            "Running" => PodPhase::Running,
            "Succeeded" => PodPhase::Succeeded,
            "Failed" => PodPhase::Failed,
            other => PodPhase::Unknown(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerState {
    pub name: String,
    pub ready: bool,
    /// Set once the container has terminated.
    pub exit_code: Option<i64>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PodStatus {
    pub name: PodId,
    pub namespace: String,
    pub phase: PodPhase,
    pub pod_ip: Option<String>,
    pub host_ip: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub labels: Labels,
    pub containers: Vec<ContainerState>,
}

impl PodStatus {
    pub fn container(&self, name: &str) -> Option<&ContainerState> {
        self.containers.iter().find(|c| c.name == name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobCondition {
    /// `Complete` or `Failed`.
    pub kind: String,
    pub status: bool,
    pub reason: Option<String>,
    pub message: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobStatus {
    pub name: String,
    pub active: u32,
    pub succeeded: u32,
    pub failed: u32,
    pub conditions: Vec<JobCondition>,
}

impl JobStatus {
    fn condition(&self, kind: &str) -> Option<&JobCondition> {
        self.conditions
            .iter()
            .find(|c| c.kind == kind && c.status)
    }

    pub fn is_complete(&self) -> bool {
        self.condition("Complete").is_some()
    }

    pub fn failure(&self) -> Option<&JobCondition> {
        self.condition("Failed")
    }
}

/// Render a label map as a `k=v,k=v` selector.
pub fn selector_string(labels: &Labels) -> String {
    labels
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join(",")
}

/// Cluster quantity for a CPU count: whole cores stay integral, fractions become millicores.
pub fn cpu_quantity(cores: f64) -> String {
    if cores.fract() == 0.0 {
        format!("{}", cores as u64)
    } else {
        format!("{}m", (cores * 1000.0).round() as u64)
    }
}

/// Cluster quantity for a byte count, in the largest exact binary unit.
pub fn memory_quantity(bytes: u64) -> String {
    const UNITS: [(&str, u64); 3] = [("Gi", 1 << 30), ("Mi", 1 << 20), ("Ki", 1 << 10)];
    for (suffix, size) in UNITS {
        if bytes >= size && bytes % size == 0 {
            return format!("{}{}", bytes / size, suffix);
        }
    }
    bytes.to_string()
}
