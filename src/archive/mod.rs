use std::fs;
use std::path::{Path, PathBuf};

use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use log::{debug, info};
use tar::{Archive, Builder};

use crate::error::{Error, Result};

/// Write a `tar.gz` at `dest` holding each `(source, member)` pair at the archive root.
pub fn create_targz(members: &[(PathBuf, &str)], dest: &Path) -> Result<()> {
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent).map_err(|e| Error::io("failed to create output dir", e))?;
    }
    let file = fs::File::create(dest).map_err(|e| Error::io("failed to create archive", e))?;
    let mut builder = Builder::new(GzEncoder::new(file, Compression::default()));
    builder.follow_symlinks(true);

    for (source, member) in members {
        debug!("archive: adding {} as {member}", source.display());
        builder
            .append_path_with_name(source, member)
            .map_err(|e| Error::Archive(format!("failed to add {}: {e}", source.display())))?;
    }

    let encoder = builder
        .into_inner()
        .map_err(|e| Error::Archive(format!("failed to finish tar stream: {e}")))?;
    encoder
        .finish()
        .map_err(|e| Error::Archive(format!("failed to finish gzip stream: {e}")))?;

    info!(
        "archive: wrote {} member(s) to {}",
        members.len(),
        dest.display()
    );
    Ok(())
}

fn extract_targz(archive_path: &Path, out_dir: &Path) -> Result<()> {
    fs::create_dir_all(out_dir).map_err(|e| Error::io("failed to create extract dir", e))?;
    let file = fs::File::open(archive_path).map_err(|e| Error::io("tar.gz open error", e))?;
    let mut archive = Archive::new(GzDecoder::new(file));
    archive
        .unpack(out_dir)
        .map_err(|e| Error::Archive(format!("tar.gz extract error: {e}")))
}

/// Unpack `archive_path` into `out_dir` on the blocking pool.
pub async fn extract(archive_path: &Path, out_dir: &Path) -> Result<()> {
    info!(
        "archive: extracting {} into {}",
        archive_path.display(),
        out_dir.display()
    );
    let archive_path = archive_path.to_path_buf();
    let out_dir = out_dir.to_path_buf();
    tokio::task::spawn_blocking(move || extract_targz(&archive_path, &out_dir))
        .await
        .map_err(|e| Error::Archive(format!("extract task failed: {e}")))?
}

/// Names of the regular files in a `tar.gz`.
pub fn list_members(archive_path: &Path) -> Result<Vec<String>> {
    let file = fs::File::open(archive_path).map_err(|e| Error::io("tar.gz open error", e))?;
    let mut archive = Archive::new(GzDecoder::new(file));
    let entries = archive
        .entries()
        .map_err(|e| Error::Archive(format!("tar.gz read error: {e}")))?;

    let mut names = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| Error::Archive(format!("tar.gz entry error: {e}")))?;
        if !entry.header().entry_type().is_file() {
            continue;
        }
        let path = entry
            .path()
            .map_err(|e| Error::Archive(format!("tar.gz path error: {e}")))?;
        names.push(path.to_string_lossy().into_owned());
    }
    Ok(names)
}
