use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::warn;
use walkdir::WalkDir;

/// Copy the tree under `src` into `dest`, creating `dest` if needed.
///
/// Symlinks are recreated as symlinks, never followed. Returns the number of
/// regular files copied.
pub fn copy_dir_recursive(src: &Path, dest: &Path) -> io::Result<u64> {
    fs::create_dir_all(dest)?;
    let mut copied = 0;
    for entry in WalkDir::new(src).min_depth(1) {
        let entry = entry?;
        let rel = entry.path().strip_prefix(src).map_err(io::Error::other)?;
        let target = dest.join(rel);
        let file_type = entry.file_type();
        if file_type.is_dir() {
            fs::create_dir_all(&target)?;
        } else if file_type.is_file() {
            fs::copy(entry.path(), &target)?;
            copied += 1;
        } else if file_type.is_symlink() {
            let link = fs::read_link(entry.path())?;
            std::os::unix::fs::symlink(link, &target)?;
        } else {
            warn!("skipping special file {}", entry.path().display());
        }
    }
    Ok(copied)
}

/// Remove everything inside `dir`, keeping `dir` itself.
pub fn clear_dir(dir: &Path) -> io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if entry.file_type()?.is_dir() {
            fs::remove_dir_all(&path)?;
        } else {
            fs::remove_file(&path)?;
        }
    }
    Ok(())
}

/// Make `dest` an exact copy of `src`: create it if missing, otherwise empty it first.
pub fn replace_dir_contents(src: &Path, dest: &Path) -> io::Result<u64> {
    if dest.is_dir() {
        clear_dir(dest)?;
    } else {
        fs::create_dir_all(dest)?;
    }
    copy_dir_recursive(src, dest)
}

/// Delete a file, treating "already gone" as success.
pub fn remove_file_if_exists(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

/// Absolute form of `path` with symlinks resolved as far as the path exists.
///
/// Missing trailing components are appended unresolved, so a directory that
/// is about to be created still compares correctly against existing ones.
pub fn resolve_path(path: &Path) -> PathBuf {
    let absolute = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
    let mut existing = absolute.as_path();
    let mut missing = Vec::new();
    loop {
        if let Ok(canonical) = fs::canonicalize(existing) {
            return missing
                .iter()
                .rev()
                .fold(canonical, |acc: PathBuf, part| acc.join(part));
        }
        match (existing.parent(), existing.file_name()) {
            (Some(parent), Some(name)) => {
                missing.push(name.to_os_string());
                existing = parent;
            }
            _ => return absolute,
        }
    }
}

/// Whether one of the two directories contains the other (or they are the same).
pub fn paths_overlap(a: &Path, b: &Path) -> bool {
    let a = resolve_path(a);
    let b = resolve_path(b);
    a.starts_with(&b) || b.starts_with(&a)
}
