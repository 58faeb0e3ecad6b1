// ABOUTME: Environment values for container specs: literals or host variable references.
// ABOUTME: References are resolved once, when the spec is built.

use crate::error::{Error, Result};
use serde::Deserialize;
use std::collections::HashMap;

/// A value in the `env:` map of a spec file.
///
/// ```yaml
/// env:
///   MODE: production
///   WORKERS: 4
///   TOKEN: { env: API_TOKEN }
///   REGION: { env: REGION, default: eu-west-1 }
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum EnvValue {
    Text(String),
    Number(serde_yaml::Number),
    Flag(bool),
    FromHost {
        #[serde(rename = "env")]
        var: String,
        #[serde(default)]
        default: Option<String>,
    },
}

impl EnvValue {
    pub fn resolve(&self) -> Result<String> {
        match self {
            EnvValue::Text(s) => Ok(s.clone()),
            EnvValue::Number(n) => Ok(n.to_string()),
            EnvValue::Flag(b) => Ok(b.to_string()),
            EnvValue::FromHost { var, default } => std::env::var(var)
                .ok()
                .or_else(|| default.clone())
                .ok_or_else(|| Error::MissingEnvVar(var.clone())),
        }
    }
}

pub fn resolve_env_map(map: &HashMap<String, EnvValue>) -> Result<HashMap<String, String>> {
    map.iter()
        .map(|(k, v)| Ok((k.clone(), v.resolve()?)))
        .collect()
}
