//! Zip packing and unpacking of staged directory trees.

use crate::CoreError;
use std::fs::{self, File};
use std::io;
use std::os::unix::fs::PermissionsExt;
use std::path::{Component, Path};
use tempfile::NamedTempFile;
use tracing::{debug, warn};
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

fn entry_options() -> SimpleFileOptions {
    SimpleFileOptions::default().compression_method(CompressionMethod::Deflated)
}

/// Archive-internal name for a path relative to the staging root.
fn entry_name(rel: &Path) -> Result<String, CoreError> {
    let mut parts = Vec::new();
    for component in rel.components() {
        match component {
            Component::Normal(part) => parts.push(part.to_str().ok_or_else(|| {
                CoreError::Io(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("non UTF-8 path: {}", rel.display()),
                ))
            })?),
            _ => {
                return Err(CoreError::Io(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("unexpected path component in {}", rel.display()),
                )))
            }
        }
    }
    Ok(parts.join("/"))
}

/// Pack every entry under `src` into a zip file at `dest`.
///
/// Entry names are relative to `src` with `/` separators; directories get their
/// own entries so empty ones survive. `dest` appears only once the archive is
/// complete. Returns the number of entries written.
pub fn zip_dir(src: &Path, dest: &Path) -> Result<usize, CoreError> {
    let parent = dest
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    let mut zip = ZipWriter::new(NamedTempFile::new_in(parent)?);
    let mut entries = 0;

    for entry in WalkDir::new(src).min_depth(1).sort_by_file_name() {
        let entry = entry.map_err(io::Error::from)?;
        let rel = entry.path().strip_prefix(src).map_err(io::Error::other)?;
        let name = entry_name(rel)?;
        let file_type = entry.file_type();

        if file_type.is_dir() {
            zip.add_directory(name, entry_options())?;
        } else if file_type.is_file() {
            let mode = entry.metadata().map_err(io::Error::from)?.permissions().mode();
            zip.start_file(name, entry_options().unix_permissions(mode))?;
            io::copy(&mut File::open(entry.path())?, &mut zip)?;
        } else if file_type.is_symlink() {
            let target = fs::read_link(entry.path())?;
            zip.add_symlink(name, target.to_string_lossy(), entry_options())?;
        } else {
            warn!("not archiving special file {}", entry.path().display());
            continue;
        }
        entries += 1;
    }

    let tmp = zip.finish()?;
    tmp.persist(dest).map_err(|e| CoreError::Io(e.error))?;
    debug!("wrote {entries} entries to {}", dest.display());
    Ok(entries)
}

/// Extract `archive` into `dest`. Entries that would escape `dest` are rejected
/// by the zip reader.
pub fn unzip(archive: &Path, dest: &Path) -> Result<(), CoreError> {
    let mut zip = ZipArchive::new(File::open(archive)?)?;
    fs::create_dir_all(dest)?;
    zip.extract(dest)?;
    debug!("extracted {} entries from {}", zip.len(), archive.display());
    Ok(())
}
