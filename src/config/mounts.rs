// ABOUTME: File mounts and volume mounts declared by a container spec.
// ABOUTME: File mounts carry inline content or a local source file.

use serde::Deserialize;
use std::path::PathBuf;

use crate::error::{Error, Result};

/// A single file placed into the container before it starts.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FileMount {
    /// Absolute path of the file inside the container.
    pub path: String,
    #[serde(flatten)]
    pub source: FileSource,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileSource {
    Content(String),
    Source(PathBuf),
}

impl FileMount {
    pub fn inline(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            source: FileSource::Content(content.into()),
        }
    }

    pub fn from_file(path: impl Into<String>, source: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            source: FileSource::Source(source.into()),
        }
    }

    /// Directory part of `path`, `/` for top-level files.
    pub fn directory(&self) -> &str {
        match self.path.rsplit_once('/') {
            Some(("", _)) | None => "/",
            Some((dir, _)) => dir,
        }
    }

    pub fn file_name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }

    pub fn read(&self) -> Result<Vec<u8>> {
        match &self.source {
            FileSource::Content(text) => Ok(text.as_bytes().to_vec()),
            FileSource::Source(path) if !path.exists() => Err(Error::NotFound(path.clone())),
            FileSource::Source(path) => Ok(std::fs::read(path)?),
        }
    }
}

/// A bind mount (local engine) or host-path volume (cluster).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeMount {
    pub source: String,
    pub target: String,
    pub read_only: bool,
}

impl VolumeMount {
    /// Parse `source:target` or `source:target:ro`.
    pub fn parse(spec: &str) -> Result<Self> {
        let parts: Vec<&str> = spec.split(':').collect();
        let (source, target, read_only) = match parts.as_slice() {
            [source, target] => (*source, *target, false),
            [source, target, "ro"] => (*source, *target, true),
            [source, target, "rw"] => (*source, *target, false),
            _ => return Err(Error::Config(format!("invalid volume mount: {}", spec))),
        };
        if source.is_empty() || !target.starts_with('/') {
            return Err(Error::Config(format!("invalid volume mount: {}", spec)));
        }
        Ok(Self {
            source: source.to_string(),
            target: target.to_string(),
            read_only,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_mount_splits_path() {
        let m = FileMount::inline("/etc/app/config.yml", "a: 1");
        assert_eq!(m.directory(), "/etc/app");
        assert_eq!(m.file_name(), "config.yml");
        assert_eq!(FileMount::inline("/motd", "").directory(), "/");
    }

    #[test]
    fn missing_source_file_is_reported() {
        let m = FileMount::from_file("/x", "/definitely/not/here");
        assert!(matches!(m.read(), Err(Error::NotFound(_))));
    }

    #[test]
    fn volume_parse_variants() {
        assert_eq!(
            VolumeMount::parse("/data:/var/lib/data:ro").unwrap(),
            VolumeMount {
                source: "/data".into(),
                target: "/var/lib/data".into(),
                read_only: true
            }
        );
        assert!(!VolumeMount::parse("cache:/cache").unwrap().read_only);
        assert!(VolumeMount::parse("/data").is_err());
        assert!(VolumeMount::parse("/data:relative").is_err());
    }
}
