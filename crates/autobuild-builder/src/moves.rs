use nix::unistd::{self, Gid, Group, User};
use std::path::{Path, PathBuf};
use tracing::warn;

/// Move every regular file produced by a build into `incoming_dir`,
/// skipping any destination that already exists (a file shared between the
/// source build and a binary build of the same distribution, for example
/// a previously-moved `.orig.tar.gz`). Returns the destination paths.
pub async fn move_results(results_dir: &Path, incoming_dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    tokio::fs::create_dir_all(incoming_dir).await?;
    let mut moved = Vec::new();
    let mut entries = tokio::fs::read_dir(results_dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let Some(name) = path.file_name() else {
            continue;
        };
        let dest = incoming_dir.join(name);
        if dest.exists() {
            continue;
        }
        if tokio::fs::rename(&path, &dest).await.is_err() {
            tokio::fs::copy(&path, &dest).await?;
            tokio::fs::remove_file(&path).await?;
        }
        moved.push(dest);
    }
    moved.sort();
    Ok(moved)
}

/// `chown` every moved file to `owner_uid` and the effective gid: the
/// configured group's gid if `group` names one, else the owner's primary
/// gid. Best-effort — a failed `chown` is logged and does not fail the
/// build, matching how the rest of this crate treats filesystem cleanup.
pub fn assign_ownership(files: &[PathBuf], owner_uid: u32, group: &str) {
    let uid = owner_uid.into();
    let gid = resolve_gid(owner_uid, group);
    for file in files {
        if let Err(err) = unistd::chown(file, Some(uid), gid) {
            warn!(file = %file.display(), error = %err, "failed to chown released artifact");
        }
    }
}

fn resolve_gid(owner_uid: u32, group: &str) -> Option<Gid> {
    if !group.is_empty() {
        if let Ok(Some(g)) = Group::from_name(group) {
            return Some(g.gid);
        }
    }
    User::from_uid(owner_uid.into()).ok().flatten().map(|u| u.gid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn moves_files_and_skips_existing_destinations() {
        let dir = tempdir().unwrap();
        let results = dir.path().join("results");
        let incoming = dir.path().join("incoming");
        std::fs::create_dir_all(&results).unwrap();
        std::fs::write(results.join("a.deb"), b"a").unwrap();
        std::fs::write(results.join("b.dsc"), b"b").unwrap();
        std::fs::create_dir_all(&incoming).unwrap();
        std::fs::write(incoming.join("b.dsc"), b"already there").unwrap();

        let moved = move_results(&results, &incoming).await.unwrap();
        assert_eq!(moved, vec![incoming.join("a.deb")]);
        assert!(!results.join("a.deb").exists());
        assert_eq!(std::fs::read_to_string(incoming.join("b.dsc")).unwrap(), "already there");
    }
}
