//! Local code packaging.
//!
//! Walks the artifact directory and produces a deterministic-layout zip
//! archive in the system temp directory. Archive construction is synchronous
//! `std::io` work, so it runs on the blocking pool.

use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::info;
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{ZipArchive, ZipWriter};

use crate::error::{DeployError, DeployResult};

/// Package the contents of `code_dir` into a zip archive.
///
/// Returns the path of the archive, which lives in the system temp directory
/// and is left for the caller to consume and discard.
pub async fn package_artifacts(code_dir: &Path) -> DeployResult<PathBuf> {
    let code_dir = code_dir.to_owned();
    tokio::task::spawn_blocking(move || package_artifacts_sync(&code_dir))
        .await
        .map_err(|e| DeployError::Package(format!("packaging task failed: {e}")))?
}

fn package_artifacts_sync(code_dir: &Path) -> DeployResult<PathBuf> {
    if !code_dir.is_dir() {
        return Err(DeployError::Package(format!(
            "code artifacts directory not found: {}",
            code_dir.display()
        )));
    }

    let mut entries = code_dir
        .read_dir()
        .map_err(|e| DeployError::Package(format!("failed to read artifacts directory: {e}")))?;
    if entries.next().is_none() {
        return Err(DeployError::Package(format!(
            "code artifacts directory is empty: {}",
            code_dir.display()
        )));
    }

    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default();
    let archive_path = std::env::temp_dir().join(format!("function-package-{millis}.zip"));

    let file = File::create(&archive_path)
        .map_err(|e| DeployError::Package(format!("failed to create archive: {e}")))?;
    let mut writer = ZipWriter::new(file);
    let options = SimpleFileOptions::default();

    for entry in WalkDir::new(code_dir).sort_by_file_name() {
        let entry =
            entry.map_err(|e| DeployError::Package(format!("failed to walk artifacts: {e}")))?;
        let path = entry.path();
        if path == code_dir {
            continue;
        }

        // Archive entry names are relative to the artifacts directory.
        let name = path
            .strip_prefix(code_dir)
            .map_err(|e| DeployError::Package(e.to_string()))?
            .to_string_lossy()
            .replace('\\', "/");

        if entry.file_type().is_dir() {
            writer
                .add_directory(&name, options)
                .map_err(|e| DeployError::Package(e.to_string()))?;
        } else {
            writer
                .start_file(&name, options)
                .map_err(|e| DeployError::Package(e.to_string()))?;
            let mut source = File::open(path)
                .map_err(|e| DeployError::Package(format!("failed to read {name}: {e}")))?;
            io::copy(&mut source, &mut writer)
                .map_err(|e| DeployError::Package(format!("failed to archive {name}: {e}")))?;
        }
    }

    writer
        .finish()
        .map_err(|e| DeployError::Package(e.to_string()))?;

    let archive = File::open(&archive_path)
        .map_err(|e| DeployError::Package(format!("failed to reopen archive: {e}")))?;
    let size = archive
        .metadata()
        .map(|m| m.len())
        .unwrap_or_default();
    let entries = ZipArchive::new(archive)
        .map_err(|e| DeployError::Package(format!("archive verification failed: {e}")))?
        .len();

    info!(
        archive = %archive_path.display(),
        size_bytes = size,
        entries,
        "packaged code artifacts"
    );

    Ok(archive_path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[tokio::test]
    async fn packages_nested_directories() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("index.js"), b"exports.handler = 1;").unwrap();
        fs::create_dir(dir.path().join("lib")).unwrap();
        fs::write(dir.path().join("lib/util.js"), b"module.exports = {};").unwrap();

        let archive_path = package_artifacts(dir.path()).await.unwrap();
        let archive = ZipArchive::new(File::open(&archive_path).unwrap()).unwrap();

        let names: Vec<&str> = archive.file_names().collect();
        assert!(names.contains(&"index.js"));
        assert!(names.contains(&"lib/util.js"));

        fs::remove_file(archive_path).unwrap();
    }

    #[tokio::test]
    async fn missing_directory_is_an_error() {
        let err = package_artifacts(Path::new("/nonexistent/dist"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[tokio::test]
    async fn empty_directory_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = package_artifacts(dir.path()).await.unwrap_err();
        assert!(err.to_string().contains("empty"));
    }
}
