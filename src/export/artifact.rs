//! Scoped files that are removed unless explicitly kept
//!
//! Every file the export stage writes starts life as a [`ScopedArtifact`]
//! next to its final destination. If anything fails before the artifact is
//! persisted, dropping it deletes the file, so a failed run never leaves a
//! partial output behind.

use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::error::Result;

#[derive(Debug)]
pub struct ScopedArtifact {
    path: PathBuf,
    armed: bool,
}

impl ScopedArtifact {
    /// Take ownership of `path`; it is deleted on drop unless persisted
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            armed: true,
        }
    }

    /// Unique hidden sibling of `destination`, e.g. `.final.partial-<uuid>.mp4`
    ///
    /// Staging beside the destination keeps the final rename on one filesystem.
    pub fn staging_for(destination: &Path) -> Self {
        let dir = destination
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let stem = destination
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "output".to_string());
        let name = match destination.extension() {
            Some(ext) => format!(".{}.partial-{}.{}", stem, Uuid::new_v4(), ext.to_string_lossy()),
            None => format!(".{}.partial-{}", stem, Uuid::new_v4()),
        };
        Self::new(dir.join(name))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// True when the file exists and holds at least one byte
    pub fn is_non_empty(&self) -> bool {
        fs::metadata(&self.path)
            .map(|m| m.is_file() && m.len() > 0)
            .unwrap_or(false)
    }

    /// Move the file to `destination` and stop tracking it
    pub fn persist_to(mut self, destination: &Path) -> Result<PathBuf> {
        fs::rename(&self.path, destination)?;
        self.armed = false;
        Ok(destination.to_path_buf())
    }
}

impl Drop for ScopedArtifact {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        match fs::remove_file(&self.path) {
            Ok(()) => log::debug!("Removed partial artifact {}", self.path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => log::warn!(
                "Could not remove partial artifact {}: {}",
                self.path.display(),
                e
            ),
        }
    }
}

/// Create the directory `path` will be written into
pub fn ensure_parent(path: &Path) -> Result<()> {
    match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => Ok(fs::create_dir_all(dir)?),
        _ => Ok(()),
    }
}

/// SHA-256 of a file as lowercase hex
pub fn file_checksum(path: &Path) -> Result<String> {
    let mut file = fs::File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 8192];

    loop {
        let bytes_read = file.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_dropped_artifact_is_removed() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("scratch.wav");
        {
            let artifact = ScopedArtifact::new(&path);
            fs::write(artifact.path(), b"partial").unwrap();
            assert!(artifact.is_non_empty());
        }
        assert!(!path.exists());
    }

    #[test]
    fn test_persisted_artifact_survives() {
        let dir = tempdir().unwrap();
        let final_path = dir.path().join("final.mp4");
        let artifact = ScopedArtifact::staging_for(&final_path);
        let staging = artifact.path().to_path_buf();
        assert_eq!(staging.parent(), Some(dir.path()));
        assert!(staging.file_name().unwrap().to_string_lossy().starts_with(".final.partial-"));
        assert_eq!(staging.extension().unwrap(), "mp4");

        fs::write(&staging, b"done").unwrap();
        artifact.persist_to(&final_path).unwrap();
        assert!(final_path.exists());
        assert!(!staging.exists());
    }

    #[test]
    fn test_empty_file_is_not_non_empty() {
        let dir = tempdir().unwrap();
        let artifact = ScopedArtifact::new(dir.path().join("empty.mp4"));
        assert!(!artifact.is_non_empty());
        fs::write(artifact.path(), b"").unwrap();
        assert!(!artifact.is_non_empty());
    }

    #[test]
    fn test_checksum_of_known_content() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("abc.txt");
        fs::write(&path, b"abc").unwrap();
        assert_eq!(
            file_checksum(&path).unwrap(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
