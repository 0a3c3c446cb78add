//! Local package storage
//!
//! One JSON file per pending package, named from its record kind and package
//! id. Dead-lettered packages are moved under an `Error_` name with the last
//! error message attached.

use std::path::{Path, PathBuf};

use tank_core::{dead_letter_file_name, DeadLetterRecord, PackageRecord, UploadPackage, DEAD_LETTER_PREFIX};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::error::{StoreError, StoreResult};

#[derive(Debug, Clone)]
pub struct PackageStore {
    dir: PathBuf,
}

impl PackageStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Create the storage directory if needed
    pub async fn init(&self) -> StoreResult<()> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| StoreError::io(&self.dir, e))
    }

    /// Write a package and flush it to disk; returns the file path
    pub async fn persist<T: PackageRecord>(&self, package: &UploadPackage<T>) -> StoreResult<PathBuf> {
        let path = self.dir.join(package.file_name());
        let json = package.to_json()?;
        write_synced(&path, json.as_bytes()).await?;
        debug!(path = %path.display(), records = package.len(), "Package persisted");
        Ok(path)
    }

    /// Delete a delivered package
    pub async fn remove(&self, path: &Path) -> StoreResult<()> {
        match tokio::fs::remove_file(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StoreError::io(path, e)),
        }
    }

    /// Move a pending package under its dead-letter name with the error attached
    pub async fn dead_letter(&self, path: &Path, error_message: &str) -> StoreResult<PathBuf> {
        let original = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| StoreError::io(path, e))?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let target = self.dir.join(dead_letter_file_name(&file_name));

        let record = DeadLetterRecord::wrap(&original, error_message);
        write_synced(&target, record.to_json()?.as_bytes()).await?;
        self.remove(path).await?;

        info!(path = %target.display(), "Package dead-lettered");
        Ok(target)
    }

    /// Pending package files, sorted by name
    pub async fn pending(&self) -> StoreResult<Vec<PathBuf>> {
        self.list(|name| !name.starts_with(DEAD_LETTER_PREFIX)).await
    }

    /// Dead-lettered package files, sorted by name
    pub async fn dead_letters(&self) -> StoreResult<Vec<PathBuf>> {
        self.list(|name| name.starts_with(DEAD_LETTER_PREFIX)).await
    }

    async fn list(&self, keep: impl Fn(&str) -> bool) -> StoreResult<Vec<PathBuf>> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StoreError::io(&self.dir, e)),
        };

        let mut files = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| StoreError::io(&self.dir, e))?
        {
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.ends_with(".json") && keep(&name) {
                files.push(entry.path());
            }
        }
        files.sort();
        Ok(files)
    }
}

async fn write_synced(path: &Path, contents: &[u8]) -> StoreResult<()> {
    let mut file = tokio::fs::File::create(path)
        .await
        .map_err(|e| StoreError::io(path, e))?;
    file.write_all(contents)
        .await
        .map_err(|e| StoreError::io(path, e))?;
    file.sync_all().await.map_err(|e| StoreError::io(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tank_core::MeasurementRecord;

    fn package() -> UploadPackage<MeasurementRecord> {
        let mut record = MeasurementRecord::new(1, None).with_tank_id(42);
        record.volume = Some(1000.0);
        UploadPackage::new(42, vec![record]).unwrap()
    }

    #[tokio::test]
    async fn test_persist_and_remove() {
        let dir = tempfile::tempdir().unwrap();
        let store = PackageStore::new(dir.path());
        let pkg = package();

        let path = store.persist(&pkg).await.unwrap();
        assert_eq!(
            path.file_name().unwrap().to_string_lossy(),
            format!("TanksIndicators_{}.json", pkg.package_id)
        );
        let saved = std::fs::read_to_string(&path).unwrap();
        assert_eq!(UploadPackage::<MeasurementRecord>::from_json(&saved).unwrap(), pkg);
        assert_eq!(store.pending().await.unwrap(), vec![path.clone()]);

        store.remove(&path).await.unwrap();
        assert!(!path.exists());
        // Removing twice is fine
        store.remove(&path).await.unwrap();
    }

    #[tokio::test]
    async fn test_dead_letter() {
        let dir = tempfile::tempdir().unwrap();
        let store = PackageStore::new(dir.path());
        let pkg = package();
        let path = store.persist(&pkg).await.unwrap();

        let target = store.dead_letter(&path, "HTTP 503").await.unwrap();
        assert!(!path.exists());
        assert_eq!(
            target.file_name().unwrap().to_string_lossy(),
            format!("Error_TanksIndicators_{}.json", pkg.package_id)
        );

        let value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&target).unwrap()).unwrap();
        assert_eq!(value["errorMessage"], "HTTP 503");
        assert_eq!(
            value["originalData"]["packageId"],
            serde_json::Value::String(pkg.package_id.to_string())
        );
        assert!(store.pending().await.unwrap().is_empty());
        assert_eq!(store.dead_letters().await.unwrap(), vec![target]);
    }

    #[tokio::test]
    async fn test_dead_letter_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = PackageStore::new(dir.path());
        let result = store.dead_letter(&dir.path().join("TanksTransfers_x.json"), "boom").await;
        assert!(matches!(result, Err(StoreError::Io { .. })));
    }

    #[tokio::test]
    async fn test_init_and_listing_missing_dir() {
        let dir = tempfile::tempdir().unwrap();
        let store = PackageStore::new(dir.path().join("nested/packages"));
        assert!(store.pending().await.unwrap().is_empty());
        store.init().await.unwrap();
        assert!(store.dir().is_dir());
    }

    #[tokio::test]
    async fn test_persist_into_missing_dir_fails() {
        let dir = tempfile::tempdir().unwrap();
        let store = PackageStore::new(dir.path().join("absent"));
        assert!(store.persist(&package()).await.is_err());
    }
}
