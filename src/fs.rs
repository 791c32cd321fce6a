// Copyright 2025 Jayashankar
// SPDX-License-Identifier: Apache-2.0

use crate::error::{Error, Result};
use std::path::Path;

/// Atomically write an owner-only file using a temporary file and rename.
///
/// The temporary file lives next to `path`, so a missing parent directory
/// fails before anything is written.
pub fn atomic_write_secret(path: &Path, contents: &[u8]) -> Result<()> {
    use std::fs;

    let parent = match path.parent() {
        Some(p) if p.as_os_str().is_empty() => Path::new("."),
        Some(p) => p,
        None => return Err(Error::InvalidPath(path.to_path_buf())),
    };
    let random_suffix: u64 = rand::Rng::random(&mut rand::rng());
    let temp_path = parent.join(format!(".tmp-{:x}", random_suffix));

    write_secret_file(&temp_path, contents)?;

    fs::rename(&temp_path, path).map_err(|e| {
        if temp_path.exists() {
            let _ = fs::remove_file(&temp_path);
        }
        Error::WriteFile {
            path: path.to_path_buf(),
            source: e,
        }
    })?;

    Ok(())
}

#[cfg(unix)]
pub fn write_secret_file(path: &Path, contents: &[u8]) -> Result<()> {
    use std::fs::OpenOptions;
    use std::io::Write;
    use std::os::unix::fs::OpenOptionsExt;

    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)
        .map_err(|e| Error::WriteFile {
            path: path.to_path_buf(),
            source: e,
        })?;

    file.write_all(contents).map_err(|e| Error::WriteFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    file.sync_all().map_err(|e| Error::WriteFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    Ok(())
}

#[cfg(not(unix))]
pub fn write_secret_file(path: &Path, contents: &[u8]) -> Result<()> {
    std::fs::write(path, contents).map_err(|e| Error::WriteFile {
        path: path.to_path_buf(),
        source: e,
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_atomic_write_secret_replaces_contents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("secret.json");

        atomic_write_secret(&path, b"first").unwrap();
        atomic_write_secret(&path, b"second").unwrap();

        assert_eq!(std::fs::read(&path).unwrap(), b"second");
        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().starts_with(".tmp-"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_atomic_write_secret_missing_parent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("does/not/exist/config.json");

        let err = atomic_write_secret(&path, b"x").unwrap_err();
        assert!(matches!(err, Error::WriteFile { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn test_write_secret_file_mode() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("key.pem");
        write_secret_file(&path, b"key").unwrap();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
