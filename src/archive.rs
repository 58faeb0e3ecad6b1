// ABOUTME: Tar packing and unpacking for copying files in and out of containers.
// ABOUTME: Both backends move files as tar streams.

use std::io::Cursor;
use std::path::{Component, Path, PathBuf};

use crate::error::{Error, Result};

/// Pack one local file into an archive holding a single entry named `name`.
pub fn pack_file(local: &Path, name: &str) -> Result<Vec<u8>> {
    if !local.is_file() {
        return Err(Error::NotFound(local.to_path_buf()));
    }
    let mut builder = tar::Builder::new(Vec::new());
    builder.append_path_with_name(local, name)?;
    Ok(builder.into_inner()?)
}

/// Pack in-memory bytes as a single entry named `name`.
pub fn pack_bytes(name: &str, data: &[u8], mode: u32) -> Result<Vec<u8>> {
    let mut header = tar::Header::new_gnu();
    header.set_size(data.len() as u64);
    header.set_mode(mode);
    header.set_mtime(
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default(),
    );
    header.set_cksum();

    let mut builder = tar::Builder::new(Vec::new());
    builder.append_data(&mut header, name, data)?;
    Ok(builder.into_inner()?)
}

/// Pack a local directory; entries are rooted at the directory's own name.
pub fn pack_dir(local: &Path) -> Result<Vec<u8>> {
    if !local.is_dir() {
        return Err(Error::NotFound(local.to_path_buf()));
    }
    let root = local
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| Error::Transfer(format!("{} has no directory name", local.display())))?;
    let mut builder = tar::Builder::new(Vec::new());
    builder.follow_symlinks(false);
    builder.append_dir_all(&root, local)?;
    Ok(builder.into_inner()?)
}

/// Unpack an archive under `dest`, returning every regular file written.
///
/// A truncated or corrupt archive fails the whole operation.
pub fn unpack(data: &[u8], dest: &Path) -> Result<Vec<PathBuf>> {
    std::fs::create_dir_all(dest)?;
    let mut archive = tar::Archive::new(Cursor::new(data));
    let mut written = Vec::new();

    let entries = archive
        .entries()
        .map_err(|e| Error::Transfer(format!("unreadable archive: {}", e)))?;
    for entry in entries {
        let mut entry = entry.map_err(|e| Error::Transfer(format!("corrupt archive: {}", e)))?;
        let relative = entry
            .path()
            .map_err(|e| Error::Transfer(e.to_string()))?
            .into_owned();
        if relative
            .components()
            .any(|c| matches!(c, Component::ParentDir | Component::RootDir))
        {
            return Err(Error::Transfer(format!(
                "archive entry escapes destination: {}",
                relative.display()
            )));
        }
        let is_file = entry.header().entry_type().is_file();
        let unpacked = entry
            .unpack_in(dest)
            .map_err(|e| Error::Transfer(format!("{}: {}", relative.display(), e)))?;
        if unpacked && is_file {
            written.push(dest.join(&relative));
        }
    }

    if written.is_empty() && data.len() < 512 {
        return Err(Error::Transfer("archive is empty or truncated".to_string()));
    }
    Ok(written)
}
