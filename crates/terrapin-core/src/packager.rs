//! Configuration directory validation and packaging.
//!
//! A configuration directory is bundled into a gzip-compressed tarball in a
//! temporary file. Entries are added in sorted order with deterministic
//! headers, so packaging an unchanged tree always yields the same bytes and
//! therefore the same checksum.

use flate2::Compression;
use flate2::write::GzEncoder;
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::debug;
use walkdir::{DirEntry, WalkDir};

/// Directories never shipped to the backend.
const EXCLUDED_DIRS: &[&str] = &[".git", ".terraform"];

#[derive(Debug, thiserror::Error)]
pub enum PackageError {
    #[error("directory {} does not exist", .0.display())]
    NotFound(PathBuf),

    #[error("{} is not a directory", .0.display())]
    NotADirectory(PathBuf),

    #[error(
        "directory {} does not contain any Terraform configuration files (*.tf or *.tf.json)",
        .0.display()
    )]
    NoConfigurationFiles(PathBuf),

    #[error("failed to package {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// A packaged configuration directory awaiting upload.
///
/// The archive is a temporary file deleted when the package is dropped.
#[derive(Debug)]
pub struct ConfigurationPackage {
    archive: NamedTempFile,
    checksum: String,
    size: u64,
}

impl ConfigurationPackage {
    pub fn path(&self) -> &Path {
        self.archive.path()
    }

    /// Hex-encoded SHA-256 of the archive.
    pub fn checksum(&self) -> &str {
        &self.checksum
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn read_bytes(&self) -> io::Result<Vec<u8>> {
        fs::read(self.archive.path())
    }
}

/// Checks that `directory` can be packaged.
///
/// Destroy runs introduce no new configuration, so they skip the requirement
/// for at least one `.tf` or `.tf.json` file.
pub fn validate_directory(directory: &Path, is_destroy: bool) -> Result<(), PackageError> {
    if !directory.exists() {
        return Err(PackageError::NotFound(directory.to_path_buf()));
    }
    if !directory.is_dir() {
        return Err(PackageError::NotADirectory(directory.to_path_buf()));
    }
    if !is_destroy && !contains_configuration_files(directory) {
        return Err(PackageError::NoConfigurationFiles(directory.to_path_buf()));
    }
    Ok(())
}

/// Validates and archives `directory`.
pub fn package_directory(
    directory: &Path,
    is_destroy: bool,
) -> Result<ConfigurationPackage, PackageError> {
    validate_directory(directory, is_destroy)?;

    let io_err = |source: io::Error| PackageError::Io {
        path: directory.to_path_buf(),
        source,
    };

    let archive = tempfile::Builder::new()
        .prefix("terrapin-config-")
        .suffix(".tar.gz")
        .tempfile()
        .map_err(io_err)?;

    write_archive(directory, archive.as_file()).map_err(io_err)?;

    let checksum = checksum_file(archive.path()).map_err(io_err)?;
    let size = archive.as_file().metadata().map_err(io_err)?.len();

    debug!(
        directory = %directory.display(),
        archive = %archive.path().display(),
        size,
        checksum = %checksum,
        "Packaged configuration directory"
    );

    Ok(ConfigurationPackage {
        archive,
        checksum,
        size,
    })
}

/// Hex-encoded SHA-256 of a file's contents.
pub fn checksum_file(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 8192];
    loop {
        let read = file.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }
    Ok(hex::encode(hasher.finalize()))
}

fn is_excluded(entry: &DirEntry) -> bool {
    entry.depth() > 0
        && entry.file_type().is_dir()
        && entry
            .file_name()
            .to_str()
            .is_some_and(|name| EXCLUDED_DIRS.contains(&name))
}

fn walk(directory: &Path) -> impl Iterator<Item = walkdir::Result<DirEntry>> {
    WalkDir::new(directory)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| !is_excluded(entry))
}

fn contains_configuration_files(directory: &Path) -> bool {
    walk(directory).filter_map(Result::ok).any(|entry| {
        entry.file_type().is_file()
            && entry
                .file_name()
                .to_str()
                .is_some_and(|name| name.ends_with(".tf") || name.ends_with(".tf.json"))
    })
}

fn write_archive(directory: &Path, out: &File) -> io::Result<()> {
    let encoder = GzEncoder::new(out, Compression::default());
    let mut builder = tar::Builder::new(encoder);
    builder.mode(tar::HeaderMode::Deterministic);

    for entry in walk(directory) {
        let entry = entry.map_err(io::Error::other)?;
        let relative = entry
            .path()
            .strip_prefix(directory)
            .map_err(io::Error::other)?;
        if relative.as_os_str().is_empty() {
            continue;
        }

        if entry.file_type().is_dir() {
            builder.append_dir(relative, entry.path())?;
        } else {
            builder.append_path_with_name(entry.path(), relative)?;
        }
    }

    let encoder = builder.into_inner()?;
    let out = encoder.finish()?;
    out.sync_all()
}
