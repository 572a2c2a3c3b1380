//! Importing a directory on disk as a tree, and exporting it back.

use std::fs;
use std::path::Path;

use hive_store::{EntryType, Tree, TreeBuilder};
use hive_types::ObjectId;
use tracing::debug;

use crate::error::{HiveError, HiveResult};
use crate::hive::HiveRead;
use crate::transaction::Transaction;

/// Stage every file below `dir` in `tx` and return the root tree id.
///
/// Symlinks are stored as blobs holding the link target; files with any
/// execute bit set become [`EntryType::ExecutableBlob`].
pub fn import_dir(tx: &Transaction<'_>, dir: &Path) -> HiveResult<ObjectId> {
    let mut builder = TreeBuilder::new();
    let mut entries = fs::read_dir(dir)?.collect::<Result<Vec<_>, _>>()?;
    entries.sort_by_key(|e| e.file_name());

    for entry in entries {
        let name = entry
            .file_name()
            .into_string()
            .map_err(|raw| HiveError::InvalidDocument(format!("non UTF-8 file name {raw:?}")))?;
        let path = entry.path();
        let file_type = entry.file_type()?;

        if file_type.is_symlink() {
            let target = fs::read_link(&path)?;
            let id = tx.put(target.to_string_lossy().as_bytes())?;
            builder.insert(name, id, EntryType::Symlink);
        } else if file_type.is_dir() {
            let id = import_dir(tx, &path)?;
            builder.insert(name, id, EntryType::Tree);
        } else {
            let id = tx.put(&fs::read(&path)?)?;
            let kind = if is_executable(&entry.metadata()?) {
                EntryType::ExecutableBlob
            } else {
                EntryType::Blob
            };
            builder.insert(name, id, kind);
        }
    }

    let tree = builder.build()?;
    let id = tx.put_tree(&tree)?;
    debug!(dir = %dir.display(), %id, entries = tree.len(), "imported directory");
    Ok(id)
}

/// Write the tree `id` below `dest`, which must not exist yet.
pub fn export_tree<R: HiveRead + ?Sized>(hive: &R, id: &ObjectId, dest: &Path) -> HiveResult<()> {
    fs::create_dir(dest)?;
    let tree: Tree = hive.read_tree(id)?;
    for entry in tree.entries() {
        let path = dest.join(&entry.name);
        match entry.entry_type {
            EntryType::Tree => export_tree(hive, &entry.object_id, &path)?,
            EntryType::Blob => fs::write(&path, hive.get(&entry.object_id)?)?,
            EntryType::ExecutableBlob => {
                fs::write(&path, hive.get(&entry.object_id)?)?;
                set_executable(&path)?;
            }
            EntryType::Symlink => {
                let target = String::from_utf8_lossy(&hive.get(&entry.object_id)?).into_owned();
                make_symlink(&target, &path)?;
            }
        }
    }
    Ok(())
}

#[cfg(unix)]
fn is_executable(meta: &fs::Metadata) -> bool {
    use std::os::unix::fs::PermissionsExt;
    meta.permissions().mode() & 0o111 != 0
}

#[cfg(not(unix))]
fn is_executable(_meta: &fs::Metadata) -> bool {
    false
}

#[cfg(unix)]
fn set_executable(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let mut perms = fs::metadata(path)?.permissions();
    perms.set_mode(perms.mode() | 0o755);
    fs::set_permissions(path, perms)
}

#[cfg(not(unix))]
fn set_executable(_path: &Path) -> std::io::Result<()> {
    Ok(())
}

#[cfg(unix)]
fn make_symlink(target: &str, path: &Path) -> std::io::Result<()> {
    std::os::unix::fs::symlink(target, path)
}

#[cfg(not(unix))]
fn make_symlink(target: &str, path: &Path) -> std::io::Result<()> {
    fs::write(path, target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Hive;

    #[test]
    fn import_then_export() {
        let src = tempfile::tempdir().unwrap();
        fs::write(src.path().join("file.txt"), b"hello").unwrap();
        fs::create_dir(src.path().join("bin")).unwrap();
        fs::write(src.path().join("bin").join("run.sh"), b"#!/bin/sh\n").unwrap();
        #[cfg(unix)]
        set_executable(&src.path().join("bin").join("run.sh")).unwrap();

        let hive = Hive::in_memory("t");
        let root = hive.transaction(|tx| import_dir(tx, src.path())).unwrap();

        let tree = hive.read_tree(&root).unwrap();
        assert_eq!(tree.len(), 2);
        assert_eq!(
            tree.get("file.txt").unwrap().object_id,
            ObjectId::digest(b"hello")
        );
        let bin = hive.read_tree(&tree.get("bin").unwrap().object_id).unwrap();
        assert_eq!(bin.len(), 1);
        #[cfg(unix)]
        assert_eq!(
            bin.get("run.sh").unwrap().entry_type,
            EntryType::ExecutableBlob
        );

        let out = tempfile::tempdir().unwrap();
        let dest = out.path().join("restored");
        export_tree(&hive, &root, &dest).unwrap();
        assert_eq!(fs::read(dest.join("file.txt")).unwrap(), b"hello");
        assert_eq!(fs::read(dest.join("bin").join("run.sh")).unwrap(), b"#!/bin/sh\n");
    }

    #[test]
    fn identical_directories_share_a_root() {
        let a = tempfile::tempdir().unwrap();
        let b = tempfile::tempdir().unwrap();
        for dir in [a.path(), b.path()] {
            fs::write(dir.join("same"), b"content").unwrap();
        }
        let hive = Hive::in_memory("t");
        let tx = hive.begin();
        assert_eq!(
            import_dir(&tx, a.path()).unwrap(),
            import_dir(&tx, b.path()).unwrap()
        );
    }
}
