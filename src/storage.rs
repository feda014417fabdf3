//! Whole-file reads and replacements for the files this crate owns:
//! the account key, the terms record and the keystore.
//!
//! Writes go to a sibling temporary file which is then renamed over the
//! target, so a concurrent reader sees either the old or the new file and
//! never a partial one.

use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tracing::trace;

/// Read a file, returning `None` when it does not exist.
pub async fn read_optional(path: &Path) -> io::Result<Option<Vec<u8>>> {
    match tokio::fs::read(path).await {
        Ok(contents) => Ok(Some(contents)),
        Err(error) if error.kind() == io::ErrorKind::NotFound => {
            trace!(path = %path.display(), "File does not exist");
            Ok(None)
        }
        Err(error) => Err(error),
    }
}

/// Replace `path` with `contents`, readable only by the owner on unix.
///
/// The replacement runs on the blocking pool. Once started it either
/// completes or removes its staging file, even if the returned future is
/// dropped.
pub async fn write_atomic(path: &Path, contents: &[u8]) -> io::Result<()> {
    let target = path.to_owned();
    let contents = contents.to_vec();
    tokio::task::spawn_blocking(move || replace(&target, &contents))
        .await
        .map_err(io::Error::other)??;

    trace!(path = %path.display(), "Replaced file");
    Ok(())
}

fn replace(path: &Path, contents: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    let mut staging = Staging {
        path: staging_path(path),
        renamed: false,
    };
    let mut options = std::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let mut file = options.open(&staging.path)?;
    #[cfg(unix)]
    {
        // A leftover staging file keeps its old mode through `open`.
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(std::fs::Permissions::from_mode(0o600))?;
    }
    file.write_all(contents)?;
    file.sync_all()?;
    drop(file);

    std::fs::rename(&staging.path, path)?;
    staging.renamed = true;
    Ok(())
}

/// Removes the staging file unless it was renamed into place.
struct Staging {
    path: PathBuf,
    renamed: bool,
}

impl Drop for Staging {
    fn drop(&mut self) {
        if self.renamed {
            return;
        }
        if let Err(error) = std::fs::remove_file(&self.path) {
            if error.kind() != io::ErrorKind::NotFound {
                tracing::warn!(path = %self.path.display(), %error, "Could not remove staging file");
            }
        }
    }
}

fn staging_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|name| name.to_os_string())
        .unwrap_or_default();
    name.push(format!(".{}.tmp", std::process::id()));
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_file_reads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let contents = read_optional(&dir.path().join("absent")).await.unwrap();
        assert!(contents.is_none());
    }

    #[tokio::test]
    async fn replaces_existing_contents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("file.bin");

        write_atomic(&path, b"first").await.unwrap();
        write_atomic(&path, b"second").await.unwrap();

        assert_eq!(read_optional(&path).await.unwrap().unwrap(), b"second");

        let leftovers: Vec<_> = std::fs::read_dir(path.parent().unwrap())
            .unwrap()
            .map(|entry| entry.unwrap().file_name())
            .collect();
        assert_eq!(leftovers.len(), 1);

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&path).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }
    }

    fn entries(dir: &Path) -> Vec<std::ffi::OsString> {
        std::fs::read_dir(dir)
            .unwrap()
            .map(|entry| entry.unwrap().file_name())
            .collect()
    }

    #[tokio::test]
    async fn failed_rename_removes_staging_file() {
        let dir = tempfile::tempdir().unwrap();
        // A non-empty directory can not be replaced by a file.
        let path = dir.path().join("keystore.p12");
        std::fs::create_dir(&path).unwrap();
        std::fs::write(path.join("occupied"), b"").unwrap();

        assert!(write_atomic(&path, b"contents").await.is_err());
        assert_eq!(entries(dir.path()), vec![std::ffi::OsString::from("keystore.p12")]);
    }

    #[tokio::test]
    async fn dropped_write_leaves_no_staging_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keystore.p12");

        // Start the write, then abandon it as a timeout would.
        let write = write_atomic(&path, b"contents");
        let _ = tokio::time::timeout(std::time::Duration::ZERO, write).await;

        for _ in 0..100 {
            if path.exists() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }

        assert_eq!(entries(dir.path()), vec![std::ffi::OsString::from("keystore.p12")]);
        assert_eq!(std::fs::read(&path).unwrap(), b"contents");
    }
}
