//! Reproducibility bundles (`.tar.gz`)

use crate::error::ArchiveError;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::File;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Write `members` into a gzip tarball at `archive`
///
/// Members are stored under their path relative to `root`. The tarball is
/// built in a temporary file next to `archive` and renamed into place only
/// once complete, so a failed bundle leaves nothing at `archive`.
///
/// # Errors
/// Returns [`ArchiveError::OutsideRoot`] for a member not under `root`, or an
/// IO error.
pub fn bundle(root: &Path, archive: &Path, members: &[PathBuf]) -> Result<(), ArchiveError> {
    let dir = archive.parent().unwrap_or(root);
    let staged = NamedTempFile::new_in(dir).map_err(|e| ArchiveError::io_error(dir, e))?;
    let mut builder = tar::Builder::new(GzEncoder::new(staged.as_file(), Compression::default()));

    for member in members {
        let rel = member
            .strip_prefix(root)
            .map_err(|_| ArchiveError::OutsideRoot(member.clone()))?;
        builder
            .append_path_with_name(member, rel)
            .map_err(|e| ArchiveError::io_error(member, e))?;
    }

    let encoder = builder
        .into_inner()
        .map_err(|e| ArchiveError::io_error(archive, e))?;
    encoder
        .finish()
        .map_err(|e| ArchiveError::io_error(archive, e))?;
    staged
        .persist(archive)
        .map_err(|e| ArchiveError::io_error(archive, e.error))?;
    tracing::debug!(archive = %archive.display(), members = members.len(), "bundle written");
    Ok(())
}

/// Unpack a gzip tarball into `dest`
///
/// # Errors
/// Returns an IO error if the archive is unreadable or a member cannot be
/// written.
pub fn extract(archive: &Path, dest: &Path) -> Result<(), ArchiveError> {
    let file = File::open(archive).map_err(|e| ArchiveError::io_error(archive, e))?;
    let mut tarball = tar::Archive::new(GzDecoder::new(file));
    tarball
        .unpack(dest)
        .map_err(|e| ArchiveError::io_error(archive, e))
}

/// Relative member names of a bundle
///
/// # Errors
/// Returns an IO error if the archive is unreadable
pub fn list(archive: &Path) -> Result<Vec<String>, ArchiveError> {
    let file = File::open(archive).map_err(|e| ArchiveError::io_error(archive, e))?;
    let mut tarball = tar::Archive::new(GzDecoder::new(file));
    let entries = tarball
        .entries()
        .map_err(|e| ArchiveError::io_error(archive, e))?;

    let mut names = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| ArchiveError::io_error(archive, e))?;
        let path = entry
            .path()
            .map_err(|e| ArchiveError::io_error(archive, e))?;
        names.push(path.to_string_lossy().replace('\\', "/"));
    }
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bundle_then_extract_elsewhere() {
        let src = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(src.path().join(".pytest_cache")).unwrap();
        std::fs::write(src.path().join("Cargo.toml"), "[package]\n").unwrap();
        std::fs::write(src.path().join(".pytest_cache/lastfailed"), "{}").unwrap();

        let archive = src.path().join("bundle.tar.gz");
        bundle(
            src.path(),
            &archive,
            &[
                src.path().join("Cargo.toml"),
                src.path().join(".pytest_cache/lastfailed"),
            ],
        )
        .unwrap();

        assert_eq!(
            list(&archive).unwrap(),
            ["Cargo.toml", ".pytest_cache/lastfailed"]
        );

        let dest = tempfile::tempdir().unwrap();
        extract(&archive, dest.path()).unwrap();
        assert_eq!(
            std::fs::read_to_string(dest.path().join("Cargo.toml")).unwrap(),
            "[package]\n"
        );
        assert!(dest.path().join(".pytest_cache/lastfailed").exists());
    }

    #[test]
    fn member_outside_root_is_rejected() {
        let root = tempfile::tempdir().unwrap();
        let other = tempfile::tempdir().unwrap();
        std::fs::write(other.path().join("x"), "x").unwrap();
        let archive = root.path().join("b.tar.gz");
        let err = bundle(root.path(), &archive, &[other.path().join("x")]).unwrap_err();
        assert!(matches!(err, ArchiveError::OutsideRoot(_)));
        assert!(!archive.exists());
        assert_eq!(std::fs::read_dir(root.path()).unwrap().count(), 0);
    }
}
