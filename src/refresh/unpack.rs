//! Archive decompression, extraction and payload discovery.
//!
//! Publisher archives look like this:
//!
//! ```text
//! GeoLite2-City_20240102/
//! GeoLite2-City_20240102/COPYRIGHT.txt
//! GeoLite2-City_20240102/LICENSE.txt
//! GeoLite2-City_20240102/GeoLite2-City.mmdb
//! ```
//!
//! The date suffix is unpredictable, so the extraction directory is discovered
//! after unpacking by matching `<identifier>_*`. All steps are blocking,
//! streaming I/O with bounded buffers; call them from `spawn_blocking`.

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Component, Path, PathBuf};

use flate2::read::GzDecoder;
use tracing::debug;

use super::cleanup::TemporaryArtifacts;
use super::error::RefreshError;
use super::job::DatabaseJob;
use crate::constants::UNPACK_BUFFER_CAPACITY;

/// The located payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnpackedPayload {
    /// Directory the archive unpacked into.
    pub extraction_dir: PathBuf,
    /// The payload file inside it.
    pub payload: PathBuf,
}

/// Decompress, extract and locate the payload of `job`'s downloaded archive.
///
/// Every file and directory this creates is registered with `artifacts` before
/// it is written.
///
/// # Errors
///
/// [`RefreshError::Decompression`], [`RefreshError::Extraction`] or
/// [`RefreshError::PayloadNotFound`] depending on the failing step.
pub fn unpack(
    job: &DatabaseJob,
    archive: &Path,
    payload_extension: &str,
    artifacts: &mut TemporaryArtifacts,
) -> Result<UnpackedPayload, RefreshError> {
    let intermediate = job.intermediate_path();
    decompress(job, archive, &intermediate, artifacts)?;
    extract(job, &intermediate, artifacts)?;
    locate_payload(job, payload_extension)
}

/// Remove the gzip layer of `archive` into `intermediate`.
///
/// A stale `intermediate` from an earlier run is removed first.
pub fn decompress(
    job: &DatabaseJob,
    archive: &Path,
    intermediate: &Path,
    artifacts: &mut TemporaryArtifacts,
) -> Result<u64, RefreshError> {
    let error = |reason: String| RefreshError::Decompression {
        identifier: job.identifier().to_string(),
        reason,
    };

    artifacts.register_file(intermediate);

    if std::fs::symlink_metadata(intermediate).is_ok() {
        debug!("[{}] removing stale {}", job.identifier(), intermediate.display());
        std::fs::remove_file(intermediate).map_err(|e| {
            error(format!("failed to remove stale {}: {e}", intermediate.display()))
        })?;
    }

    let input = File::open(archive)
        .map_err(|e| error(format!("failed to open {}: {e}", archive.display())))?;
    let mut decoder = GzDecoder::new(BufReader::with_capacity(UNPACK_BUFFER_CAPACITY, input));

    let output = File::create(intermediate)
        .map_err(|e| error(format!("failed to create {}: {e}", intermediate.display())))?;
    let mut writer = BufWriter::with_capacity(UNPACK_BUFFER_CAPACITY, output);

    let bytes = std::io::copy(&mut decoder, &mut writer).map_err(|e| error(e.to_string()))?;
    writer
        .flush()
        .map_err(|e| error(format!("failed to write {}: {e}", intermediate.display())))?;

    if bytes == 0 {
        return Err(error("archive decompressed to zero bytes".to_string()));
    }

    debug!("[{}] decompressed {} bytes to {}", job.identifier(), bytes, intermediate.display());
    Ok(bytes)
}

/// Unpack the tar at `intermediate` into the job's working directory.
///
/// Only entries below a top-level `<identifier>_*` name are accepted; anything
/// else fails the job before it is written, so extraction can never overwrite
/// the destination or unrelated files in the shared directory.
pub fn extract(
    job: &DatabaseJob,
    intermediate: &Path,
    artifacts: &mut TemporaryArtifacts,
) -> Result<usize, RefreshError> {
    let error = |reason: String| RefreshError::Extraction {
        identifier: job.identifier().to_string(),
        reason,
    };

    let input = File::open(intermediate)
        .map_err(|e| error(format!("failed to open {}: {e}", intermediate.display())))?;
    let mut archive =
        tar::Archive::new(BufReader::with_capacity(UNPACK_BUFFER_CAPACITY, input));
    let prefix = job.extraction_prefix();
    let working_dir = job.working_dir();

    let mut unpacked = 0usize;
    for entry in archive.entries().map_err(|e| error(e.to_string()))? {
        let mut entry = entry.map_err(|e| error(e.to_string()))?;

        if matches!(
            entry.header().entry_type(),
            tar::EntryType::XGlobalHeader | tar::EntryType::XHeader
        ) {
            continue;
        }

        let path = entry.path().map_err(|e| error(e.to_string()))?.into_owned();
        let entry_type = entry.header().entry_type();
        if entry_type.is_symlink() || entry_type.is_hard_link() {
            return Err(error(format!("link entry {} is not allowed in archive", path.display())));
        }

        let (top, depth) = top_level_component(&path)
            .ok_or_else(|| error(format!("unsafe entry path in archive: {}", path.display())))?;

        if !top.starts_with(&prefix) {
            return Err(error(format!(
                "unexpected entry {} outside a {}* directory",
                path.display(),
                prefix
            )));
        }

        let top_path = working_dir.join(&top);
        if depth > 1 || entry.header().entry_type().is_dir() {
            artifacts.register_dir(top_path);
        } else {
            artifacts.register_file(top_path);
        }

        let written = entry
            .unpack_in(working_dir)
            .map_err(|e| error(format!("failed to unpack {}: {e}", path.display())))?;
        if !written {
            return Err(error(format!(
                "entry {} would escape the working directory",
                path.display()
            )));
        }
        unpacked += 1;
    }

    if unpacked == 0 {
        return Err(error("archive contains no entries".to_string()));
    }

    debug!("[{}] extracted {} entries into {}", job.identifier(), unpacked, working_dir.display());
    Ok(unpacked)
}

/// Find the single `<identifier>_*` directory and the payload inside it.
pub fn locate_payload(
    job: &DatabaseJob,
    payload_extension: &str,
) -> Result<UnpackedPayload, RefreshError> {
    let error = |reason: String| RefreshError::PayloadNotFound {
        identifier: job.identifier().to_string(),
        reason,
    };

    let prefix = job.extraction_prefix();
    let working_dir = job.working_dir().to_str().ok_or_else(|| {
        error(format!("working directory is not valid UTF-8: {}", job.working_dir().display()))
    })?;
    let pattern = format!(
        "{}/{}*",
        glob::Pattern::escape(working_dir),
        glob::Pattern::escape(&prefix)
    );

    let mut candidates: Vec<PathBuf> = glob::glob(&pattern)
        .map_err(|e| error(format!("invalid pattern {pattern}: {e}")))?
        .filter_map(Result::ok)
        .filter(|p| std::fs::symlink_metadata(p).is_ok_and(|m| m.is_dir()))
        .collect();
    candidates.sort();

    let extraction_dir = match candidates.len() {
        0 => {
            return Err(error(format!("no {prefix}* directory found after extraction")));
        }
        1 => candidates.remove(0),
        n => {
            let names: Vec<String> = candidates
                .iter()
                .filter_map(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
                .collect();
            return Err(error(format!(
                "{n} directories match {prefix}* ({}); remove stale directories and retry",
                names.join(", ")
            )));
        }
    };

    let payload_name = job.payload_file_name(payload_extension);
    let payload = extraction_dir.join(&payload_name);
    match std::fs::symlink_metadata(&payload) {
        Ok(metadata) if metadata.file_type().is_file() => {}
        Ok(_) => {
            return Err(error(format!(
                "{payload_name} inside {} is not a regular file",
                extraction_dir.display()
            )));
        }
        Err(_) => {
            return Err(error(format!(
                "{payload_name} not found inside {}",
                extraction_dir.display()
            )));
        }
    }

    debug!("[{}] located payload {}", job.identifier(), payload.display());
    Ok(UnpackedPayload {
        extraction_dir,
        payload,
    })
}

/// First normal component of an archive path and the number of normal
/// components, or `None` if the path is absolute or climbs with `..`.
fn top_level_component(path: &Path) -> Option<(String, usize)> {
    let mut top = None;
    let mut depth = 0usize;

    for component in path.components() {
        match component {
            Component::Normal(part) => {
                if top.is_none() {
                    top = Some(part.to_string_lossy().into_owned());
                }
                depth += 1;
            }
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }

    top.map(|t| (t, depth))
}
