// ABOUTME: Container image reference parsing.
// ABOUTME: Handles nginx, nginx:tag, registry:5000/org/image:tag@digest.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseImageRefError {
    #[error("image reference cannot be empty")]
    Empty,

    #[error("invalid character in image reference: {0}")]
    InvalidChar(char),

    #[error("invalid image reference format: {0}")]
    InvalidFormat(String),
}

/// A parsed image reference. Untagged, undigested references default to `latest`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ImageRef {
    registry: Option<String>,
    repository: String,
    tag: Option<String>,
    digest: Option<String>,
}

impl ImageRef {
    pub fn parse(input: &str) -> Result<Self, ParseImageRefError> {
        let input = input.trim();
        if input.is_empty() {
            return Err(ParseImageRefError::Empty);
        }
        if let Some(c) = input
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || "/:.-_@".contains(*c)))
        {
            return Err(ParseImageRefError::InvalidChar(c));
        }

        let (rest, digest) = match input.split_once('@') {
            Some((before, after)) if !after.is_empty() => (before, Some(after.to_string())),
            Some(_) => return Err(ParseImageRefError::InvalidFormat(input.to_string())),
            None => (input, None),
        };

        // A colon after the last slash separates the tag; earlier colons are registry ports.
        let (rest, tag) = match rest.rsplit_once(':') {
            Some((before, after)) if !after.contains('/') => (before, Some(after.to_string())),
            _ => (rest, None),
        };

        let (registry, repository) = split_registry(rest);
        if repository.is_empty() || repository.starts_with('/') || repository.ends_with('/') {
            return Err(ParseImageRefError::InvalidFormat(input.to_string()));
        }

        let tag = match (tag, &digest) {
            (None, None) => Some("latest".to_string()),
            (tag, _) => tag,
        };

        Ok(Self {
            registry,
            repository: repository.to_string(),
            tag,
            digest,
        })
    }

    /// Compose a push destination such as `registry.local:5000/team/app:v2`.
    pub fn destination(registry: &str, repository: &str, tag: &str) -> Self {
        Self {
            registry: Some(registry.trim_end_matches('/').to_string()),
            repository: repository.trim_matches('/').to_string(),
            tag: Some(tag.to_string()),
            digest: None,
        }
    }

    /// The same repository with a different tag; any digest is dropped.
    pub fn with_tag(&self, tag: &str) -> Self {
        Self {
            registry: self.registry.clone(),
            repository: self.repository.clone(),
            tag: Some(tag.to_string()),
            digest: None,
        }
    }

    pub fn registry(&self) -> Option<&str> {
        self.registry.as_deref()
    }

    pub fn name(&self) -> &str {
        &self.repository
    }

    pub fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }

    pub fn digest(&self) -> Option<&str> {
        self.digest.as_deref()
    }
}

fn split_registry(input: &str) -> (Option<String>, &str) {
    match input.split_once('/') {
        Some((first, rest))
            if first.contains('.') || first.contains(':') || first == "localhost" =>
        {
            (Some(first.to_string()), rest)
        }
        _ => (None, input),
    }
}

impl fmt::Display for ImageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(ref registry) = self.registry {
            write!(f, "{}/", registry)?;
        }
        f.write_str(&self.repository)?;
        if let Some(ref tag) = self.tag {
            write!(f, ":{}", tag)?;
        }
        if let Some(ref digest) = self.digest {
            write!(f, "@{}", digest)?;
        }
        Ok(())
    }
}

impl Serialize for ImageRef {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ImageRef {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        ImageRef::parse(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_name_defaults_to_latest() {
        let img = ImageRef::parse("alpine").unwrap();
        assert_eq!(img.name(), "alpine");
        assert_eq!(img.tag(), Some("latest"));
        assert_eq!(img.registry(), None);
        assert_eq!(img.to_string(), "alpine:latest");
    }

    #[test]
    fn registry_port_is_not_a_tag() {
        let img = ImageRef::parse("localhost:5000/team/app").unwrap();
        assert_eq!(img.registry(), Some("localhost:5000"));
        assert_eq!(img.name(), "team/app");
        assert_eq!(img.tag(), Some("latest"));
    }

    #[test]
    fn digest_without_tag_keeps_tag_empty() {
        let img = ImageRef::parse("ghcr.io/org/app@sha256:abc").unwrap();
        assert_eq!(img.tag(), None);
        assert_eq!(img.digest(), Some("sha256:abc"));
    }

    #[test]
    fn docker_hub_org_is_not_a_registry() {
        let img = ImageRef::parse("library/nginx:1.25").unwrap();
        assert_eq!(img.registry(), None);
        assert_eq!(img.name(), "library/nginx");
    }

    #[test]
    fn rejects_bad_input() {
        assert_eq!(ImageRef::parse("  "), Err(ParseImageRefError::Empty));
        assert_eq!(
            ImageRef::parse("nginx latest"),
            Err(ParseImageRefError::InvalidChar(' '))
        );
        assert!(ImageRef::parse("nginx@").is_err());
    }

    #[test]
    fn destination_and_retag() {
        let img = ImageRef::destination("registry.local:5000/", "/team/app", "v2");
        assert_eq!(img.to_string(), "registry.local:5000/team/app:v2");
        assert_eq!(img.with_tag("v3").to_string(), "registry.local:5000/team/app:v3");
    }
}
