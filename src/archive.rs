use std::fs::{self, File};
use std::io::{self, Cursor};
use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;
use tempfile::TempDir;
use thiserror::Error;

use crate::AppError;

/// Anything smaller than this cannot be a real backup archive; the upload is
/// most likely a truncated body or a stray file.
const MIN_ARCHIVE_BYTES: usize = 64;

/// Database file a CarVault backup carries at its root.
pub const CARVAULT_DB_FILE: &str = "carvault.db";

/// CarVault names its backup folders `carvault_backup_<timestamp>`.
static BACKUP_DIR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^carvault[_-]backup").expect("backup folder pattern to compile"));

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("uploaded file is too small to be a backup archive ({0} bytes)")]
    TooSmall(usize),
    #[error("uploaded file is not a valid zip archive: {0}")]
    Invalid(String),
    #[error("archive entry escapes the extraction directory: {0}")]
    PathTraversal(String),
    #[error("no recognized backup found inside the archive")]
    BackupRootNotFound,
    #[error("failed to extract archive: {0}")]
    Io(#[from] io::Error),
}

impl From<ArchiveError> for AppError {
    fn from(err: ArchiveError) -> Self {
        let code = match &err {
            ArchiveError::TooSmall(_) => "IMPORT/ARCHIVE_TOO_SMALL",
            ArchiveError::Invalid(_) | ArchiveError::PathTraversal(_) => "IMPORT/ARCHIVE_INVALID",
            ArchiveError::BackupRootNotFound => "IMPORT/BACKUP_ROOT_NOT_FOUND",
            ArchiveError::Io(_) => "IO/ARCHIVE",
        };
        AppError::new(code, err.to_string())
    }
}

/// Scratch directory holding one extracted archive.
///
/// The directory is uniquely named per invocation and removed when the guard
/// drops, on every exit path. Nothing outside the owning import call may hold
/// on to the path.
#[derive(Debug)]
pub struct Scratch {
    dir: TempDir,
}

impl Scratch {
    pub fn path(&self) -> &Path {
        self.dir.path()
    }
}

/// Expand an uploaded archive into a fresh scratch directory.
pub fn extract_archive(bytes: &[u8]) -> Result<Scratch, ArchiveError> {
    if bytes.len() < MIN_ARCHIVE_BYTES {
        return Err(ArchiveError::TooSmall(bytes.len()));
    }

    let dir = tempfile::Builder::new()
        .prefix("wrenchcloud-import-")
        .tempdir()?;

    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))
        .map_err(|err| ArchiveError::Invalid(err.to_string()))?;

    for index in 0..archive.len() {
        let mut entry = archive
            .by_index(index)
            .map_err(|err| ArchiveError::Invalid(err.to_string()))?;
        let relative = match entry.enclosed_name() {
            Some(name) => name.to_path_buf(),
            None => return Err(ArchiveError::PathTraversal(entry.name().to_string())),
        };
        let target = dir.path().join(relative);

        if entry.is_dir() {
            fs::create_dir_all(&target)?;
            continue;
        }
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut out = File::create(&target)?;
        io::copy(&mut entry, &mut out)?;
    }

    tracing::debug!(
        target: "wrenchcloud",
        event = "archive_extracted",
        entries = archive.len(),
        path = %dir.path().display()
    );

    Ok(Scratch { dir })
}

/// Locate the actual CarVault backup root inside an extracted tree.
///
/// Either the extracted directory itself holds `carvault.db`, or exactly one
/// subdirectory follows the backup-folder naming convention and holds it.
pub fn resolve_backup_root(extracted: &Path) -> Result<PathBuf, ArchiveError> {
    if extracted.join(CARVAULT_DB_FILE).is_file() {
        return Ok(extracted.to_path_buf());
    }

    let mut candidates = Vec::new();
    for entry in fs::read_dir(extracted)? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let name = entry.file_name();
        if BACKUP_DIR_RE.is_match(&name.to_string_lossy()) {
            candidates.push(entry.path());
        }
    }

    match candidates.as_slice() {
        [single] if single.join(CARVAULT_DB_FILE).is_file() => Ok(single.clone()),
        _ => Err(ArchiveError::BackupRootNotFound),
    }
}
