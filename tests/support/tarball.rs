// ABOUTME: In-memory tar helpers shared by the engine and cluster fakes.
// ABOUTME: Both fakes keep container files as a flat path -> bytes map.

use std::collections::BTreeMap;
use std::io::Read;

pub type Files = BTreeMap<String, Vec<u8>>;

fn join(dir: &str, rel: &str) -> String {
    let dir = dir.trim_end_matches('/');
    let rel = rel.trim_start_matches("./").trim_end_matches('/');
    if dir.is_empty() {
        format!("/{rel}")
    } else {
        format!("{dir}/{rel}")
    }
}

/// Extract every regular file of `tar` under `dir`.
pub fn extract(files: &mut Files, dir: &str, tar: &[u8]) -> std::io::Result<()> {
    let mut archive = tar::Archive::new(tar);
    for entry in archive.entries()? {
        let mut entry = entry?;
        if !entry.header().entry_type().is_file() {
            continue;
        }
        let rel = entry.path()?.to_string_lossy().into_owned();
        let mut data = Vec::new();
        entry.read_to_end(&mut data)?;
        files.insert(join(dir, &rel), data);
    }
    Ok(())
}

/// Archive `path` rooted at its base name; `None` when nothing lives there.
pub fn archive(files: &Files, path: &str) -> Option<Vec<u8>> {
    let path = path.trim_end_matches('/');
    let (parent, _) = path.rsplit_once('/').unwrap_or(("", path));
    let prefix = format!("{path}/");
    let matching: Vec<(&String, &Vec<u8>)> = files
        .iter()
        .filter(|(p, _)| p.as_str() == path || p.starts_with(&prefix))
        .collect();
    if matching.is_empty() {
        return None;
    }
    let mut builder = tar::Builder::new(Vec::new());
    for (p, data) in matching {
        let rel = p[parent.len()..].trim_start_matches('/');
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append_data(&mut header, rel, data.as_slice()).ok()?;
    }
    builder.into_inner().ok()
}
