// ABOUTME: Resolves the build context to a path the builder pod can read.
// ABOUTME: Outside the cluster the context is staged into the shared host directory.

use snafu::{ResultExt, ensure};
use std::path::{Path, PathBuf};

use super::error::{BuildError, ContextCopySnafu, ContextNotFoundSnafu};
use super::spec::{BuildSpec, SharedContext};

/// `C:\work\app` becomes `/c/work/app`; POSIX paths pass through.
pub fn to_posix_path(path: &str) -> String {
    let bytes = path.as_bytes();
    let has_drive = bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':';
    if !has_drive {
        return path.replace('\\', "/");
    }
    let drive = (bytes[0] as char).to_ascii_lowercase();
    let rest = path[2..].replace('\\', "/");
    let rest = rest.trim_start_matches('/');
    if rest.is_empty() {
        format!("/{}", drive)
    } else {
        format!("/{}/{}", drive, rest)
    }
}

/// Where the context lives, as seen from the host and from the builder pod.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedContext {
    pub host_path: String,
    pub cluster_path: String,
    /// Host-path volume the builder mounts, if any.
    pub volume: Option<String>,
}

pub fn resolve(spec: &BuildSpec, in_cluster: bool) -> Result<ResolvedContext, BuildError> {
    let context = spec.context_dir.to_string_lossy().into_owned();
    if in_cluster {
        return Ok(ResolvedContext {
            host_path: context.clone(),
            cluster_path: context,
            volume: None,
        });
    }

    ensure!(
        spec.context_dir.exists(),
        ContextNotFoundSnafu {
            path: spec.context_dir.clone()
        }
    );
    let posix = to_posix_path(&context);

    let Some(shared) = &spec.shared_context else {
        return Ok(ResolvedContext {
            host_path: posix.clone(),
            cluster_path: posix.clone(),
            volume: Some(posix),
        });
    };

    let host_root = to_posix_path(&shared.host_dir.to_string_lossy());
    let relative = match relative_to(&posix, &host_root) {
        Some(relative) => relative,
        None => stage(spec, shared)?,
    };
    let cluster_root = shared.cluster_dir.trim_end_matches('/');
    Ok(ResolvedContext {
        host_path: join(&host_root, &relative),
        cluster_path: join(cluster_root, &relative),
        volume: Some(cluster_root.to_string()),
    })
}

fn join(root: &str, relative: &str) -> String {
    if relative.is_empty() {
        root.to_string()
    } else {
        format!("{}/{}", root.trim_end_matches('/'), relative)
    }
}

fn relative_to(path: &str, root: &str) -> Option<String> {
    let root = root.trim_end_matches('/');
    let rest = path.strip_prefix(root)?;
    if rest.is_empty() {
        return Some(String::new());
    }
    rest.strip_prefix('/')
        .map(|r| r.trim_end_matches('/').to_string())
}

/// Copy the context into `<host_dir>/<build name>`; returns that relative path.
fn stage(spec: &BuildSpec, shared: &SharedContext) -> Result<String, BuildError> {
    let dest = shared.host_dir.join(&spec.name);
    if dest.exists() {
        std::fs::remove_dir_all(&dest).context(ContextCopySnafu { dest: dest.clone() })?;
    }
    copy_dir(&spec.context_dir, &dest).context(ContextCopySnafu { dest: dest.clone() })?;
    tracing::info!(
        "staged build context {} into {}",
        spec.context_dir.display(),
        dest.display()
    );
    Ok(spec.name.clone())
}

fn copy_dir(from: &Path, to: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(to)?;
    for entry in std::fs::read_dir(from)? {
        let entry = entry?;
        let target: PathBuf = to.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_dir(&entry.path(), &target)?;
        } else {
            std::fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn windows_paths_become_posix() {
        assert_eq!(to_posix_path(r"C:\work\app"), "/c/work/app");
        assert_eq!(to_posix_path("D:"), "/d");
        assert_eq!(to_posix_path("/home/me/app"), "/home/me/app");
    }

    #[test]
    fn in_cluster_context_is_used_as_is() {
        let spec = BuildSpec::new("api", "/workspace/api");
        let resolved = resolve(&spec, true).unwrap();
        assert_eq!(resolved.cluster_path, "/workspace/api");
        assert!(resolved.volume.is_none());
    }

    #[test]
    fn missing_context_is_an_error() {
        let spec = BuildSpec::new("api", "/definitely/not/here");
        assert!(matches!(
            resolve(&spec, false),
            Err(BuildError::ContextNotFound { .. })
        ));
    }

    #[test]
    fn context_under_shared_dir_is_mapped_not_copied() {
        let shared = tempfile::tempdir().unwrap();
        let ctx = shared.path().join("apps").join("api");
        std::fs::create_dir_all(&ctx).unwrap();
        let spec = BuildSpec::new("api", &ctx).shared_context(shared.path(), "/mnt/shared");

        let resolved = resolve(&spec, false).unwrap();
        assert_eq!(resolved.cluster_path, "/mnt/shared/apps/api");
        assert_eq!(resolved.volume.as_deref(), Some("/mnt/shared"));
        assert!(!shared.path().join("api").exists());
    }

    #[test]
    fn context_elsewhere_is_staged() {
        let shared = tempfile::tempdir().unwrap();
        let ctx = tempfile::tempdir().unwrap();
        std::fs::write(ctx.path().join("Dockerfile"), "FROM alpine\n").unwrap();
        std::fs::create_dir(ctx.path().join("src")).unwrap();
        std::fs::write(ctx.path().join("src").join("main.sh"), "echo hi\n").unwrap();
        let spec = BuildSpec::new("api", ctx.path()).shared_context(shared.path(), "/mnt/shared/");

        let resolved = resolve(&spec, false).unwrap();
        assert_eq!(resolved.cluster_path, "/mnt/shared/api");
        assert!(shared.path().join("api").join("Dockerfile").exists());
        assert!(shared.path().join("api").join("src").join("main.sh").exists());
    }
}
