//! Atomic file replacement using temp-and-rename.
//!
//! New content is written to a uniquely named temporary file in the *same
//! directory* as the target, synced to disk, then renamed over the target.
//! Rename within one filesystem is atomic, so a reader opening the target sees
//! either the old complete file or the new complete file. If anything fails
//! before the rename, the temporary file is removed and the target is untouched.

use crate::constants::COPY_BUFFER_CAPACITY;
use crate::utils::fs::dirs::ensure_parent_dir;
use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::{BufReader, Read, Write};
use std::path::Path;
use tempfile::NamedTempFile;

/// Byte count and SHA-256 of content written by [`atomic_copy`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopySummary {
    /// Number of bytes written.
    pub bytes: u64,
    /// Lowercase hex SHA-256 of the content.
    pub sha256: String,
}

/// Permissions applied to the replacement file before the rename.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplaceMode {
    /// Owner read/write only (0600 on Unix). Used for files holding credentials.
    Private,
    /// Keep the permissions of the file being replaced, or 0644 for a new file.
    InheritOrShared,
}

/// Atomically writes bytes to a file.
///
/// The parent directory is created if it does not exist. The resulting file is
/// private to its owner on Unix.
///
/// # Examples
///
/// ```rust,no_run
/// use geoip_refresh::utils::fs::atomic_write;
/// use std::path::Path;
///
/// # fn example() -> anyhow::Result<()> {
/// atomic_write(Path::new("config.toml"), b"license_key = \"...\"")?;
/// # Ok(())
/// # }
/// ```
pub fn atomic_write(path: &Path, content: &[u8]) -> Result<()> {
    replace_with(path, ReplaceMode::Private, |file| {
        file.write_all(content)
            .with_context(|| format!("Failed to write temporary file for {}", path.display()))
    })
}

/// Atomically replaces `dest` with the contents of `src`, streaming with a
/// bounded buffer and hashing as it copies.
///
/// The parent directory of `dest` is created if missing. The permissions of an
/// existing `dest` are carried over to the replacement.
pub fn atomic_copy(src: &Path, dest: &Path) -> Result<CopySummary> {
    let source =
        File::open(src).with_context(|| format!("Failed to open source file: {}", src.display()))?;
    let mut reader = BufReader::with_capacity(COPY_BUFFER_CAPACITY, source);

    let mut hasher = Sha256::new();
    let mut bytes: u64 = 0;

    replace_with(dest, ReplaceMode::InheritOrShared, |file| {
        let mut buffer = vec![0u8; COPY_BUFFER_CAPACITY];
        loop {
            let n = reader
                .read(&mut buffer)
                .with_context(|| format!("Failed to read {}", src.display()))?;
            if n == 0 {
                break;
            }
            hasher.update(&buffer[..n]);
            file.write_all(&buffer[..n])
                .with_context(|| format!("Failed to write temporary file for {}", dest.display()))?;
            bytes += n as u64;
        }
        Ok(())
    })?;

    Ok(CopySummary {
        bytes,
        sha256: hex::encode(hasher.finalize()),
    })
}

fn replace_with<F>(path: &Path, mode: ReplaceMode, write: F) -> Result<()>
where
    F: FnOnce(&mut NamedTempFile) -> Result<()>,
{
    ensure_parent_dir(path)?;

    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let file_name = path
        .file_name()
        .ok_or_else(|| anyhow::anyhow!("Path does not name a file: {}", path.display()))?
        .to_string_lossy();

    // Dropping `temp` on any early return deletes the temporary file
    let mut temp = tempfile::Builder::new()
        .prefix(&format!(".{file_name}."))
        .suffix(".tmp")
        .tempfile_in(parent)
        .with_context(|| {
            format!(
                "Failed to create temporary file in {}\n\nCheck file permissions and free disk space",
                parent.display()
            )
        })?;

    write(&mut temp)?;

    temp.flush().with_context(|| format!("Failed to flush temporary file for {}", path.display()))?;
    temp.as_file()
        .sync_all()
        .with_context(|| format!("Failed to sync temporary file for {}", path.display()))?;

    apply_mode(temp.path(), path, mode)?;

    temp.persist(path)
        .map_err(|e| e.error)
        .with_context(|| format!("Failed to rename temporary file to: {}", path.display()))?;

    sync_dir(parent);
    Ok(())
}

#[cfg(unix)]
fn apply_mode(temp: &Path, target: &Path, mode: ReplaceMode) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let permissions = match mode {
        ReplaceMode::Private => fs::Permissions::from_mode(0o600),
        ReplaceMode::InheritOrShared => match fs::metadata(target) {
            Ok(existing) => existing.permissions(),
            Err(_) => fs::Permissions::from_mode(0o644),
        },
    };

    fs::set_permissions(temp, permissions)
        .with_context(|| format!("Failed to set permissions on {}", temp.display()))
}

#[cfg(not(unix))]
fn apply_mode(_temp: &Path, _target: &Path, _mode: ReplaceMode) -> Result<()> {
    Ok(())
}

/// Persist the rename itself; failure here does not undo the replace.
#[cfg(unix)]
fn sync_dir(dir: &Path) {
    if let Ok(handle) = File::open(dir) {
        let _ = handle.sync_all();
    }
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) {}
