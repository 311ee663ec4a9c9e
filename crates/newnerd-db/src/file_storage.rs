//! Object storage for uploaded library files.
//!
//! Objects are addressed by `{bucket}/{storage_path}`, where the bucket is
//! chosen by owner kind and the storage path is `{owner}/{millis}_{name}`.
//!
//! ```rust,ignore
//! use newnerd_db::file_storage::{object_key, FilesystemBackend, StorageBackend};
//!
//! let backend = FilesystemBackend::new("/var/newnerd/storage");
//! let key = object_key(OwnerKind::Student, &doc.storage_path)?;
//! backend.write(&key, &bytes).await?;
//! ```

use std::path::PathBuf;

use async_trait::async_trait;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use newnerd_core::{Error, OwnerKind, Result};

/// Storage backend trait for different storage implementations.
///
/// Allows abstracting over filesystem, S3-compatible buckets, or other
/// object stores.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Write data to the specified key, replacing any existing object.
    async fn write(&self, key: &str, data: &[u8]) -> Result<()>;

    /// Read data from the specified key.
    async fn read(&self, key: &str) -> Result<Vec<u8>>;

    /// Delete the object at the key. Missing objects are not an error.
    async fn delete(&self, key: &str) -> Result<()>;

    /// Check if an object exists at the key.
    async fn exists(&self, key: &str) -> Result<bool>;
}

/// Build the object key for a document's storage path.
///
/// Rejects empty, absolute, and parent-relative paths so a key can never
/// escape its bucket.
pub fn object_key(kind: OwnerKind, storage_path: &str) -> Result<String> {
    validate_relative(storage_path)?;
    Ok(format!("{}/{}", kind.bucket(), storage_path))
}

fn validate_relative(path: &str) -> Result<()> {
    if path.trim().is_empty() {
        return Err(Error::InvalidInput("Storage path is empty".to_string()));
    }
    if path.starts_with('/') || path.starts_with('\\') {
        return Err(Error::InvalidInput(format!(
            "Storage path must be relative: {}",
            path
        )));
    }
    if path
        .split(['/', '\\'])
        .any(|segment| segment == ".." || segment == ".")
    {
        return Err(Error::InvalidInput(format!(
            "Storage path contains relative segments: {}",
            path
        )));
    }
    Ok(())
}

/// Filesystem storage backend. Keys map to paths under `base_path`.
pub struct FilesystemBackend {
    base_path: PathBuf,
}

impl FilesystemBackend {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    fn full_path(&self, key: &str) -> Result<PathBuf> {
        validate_relative(key)?;
        Ok(self.base_path.join(key))
    }

    /// Validate that the backend can write, read, and delete files.
    ///
    /// Run at startup to surface permission errors and missing volumes early.
    pub async fn validate(&self) -> std::result::Result<(), String> {
        let test_dir = self.base_path.join(".health-check");
        let test_file = test_dir.join("probe.bin");

        fs::create_dir_all(&test_dir)
            .await
            .map_err(|e| format!("create_dir_all({:?}): {}", test_dir, e))?;

        let data = b"storage-health-check";
        fs::write(&test_file, data)
            .await
            .map_err(|e| format!("write({:?}): {}", test_file, e))?;

        let read_data = fs::read(&test_file)
            .await
            .map_err(|e| format!("read({:?}): {}", test_file, e))?;
        if read_data != data {
            return Err("read-back mismatch".to_string());
        }

        fs::remove_file(&test_file)
            .await
            .map_err(|e| format!("remove_file({:?}): {}", test_file, e))?;
        let _ = fs::remove_dir(&test_dir).await;

        Ok(())
    }
}

#[async_trait]
impl StorageBackend for FilesystemBackend {
    async fn write(&self, key: &str, data: &[u8]) -> Result<()> {
        let full_path = self.full_path(key)?;
        debug!(
            subsystem = "storage",
            component = "filesystem",
            op = "write",
            key = %key,
            size_bytes = data.len(),
            "Writing object"
        );

        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent).await.map_err(|e| {
                warn!(parent = %parent.display(), error = %e, "file_storage: create_dir_all failed");
                e
            })?;
        }

        // Atomic write: temp file + rename
        let mut temp_name = full_path.as_os_str().to_owned();
        temp_name.push(".tmp");
        let temp_path = PathBuf::from(temp_name);
        let mut file = fs::File::create(&temp_path).await.map_err(|e| {
            warn!(temp_path = %temp_path.display(), error = %e, "file_storage: File::create failed");
            e
        })?;
        file.write_all(data).await?;
        file.sync_all().await?;
        drop(file);

        fs::rename(&temp_path, &full_path).await.map_err(|e| {
            warn!(from = %temp_path.display(), to = %full_path.display(), error = %e, "file_storage: rename failed");
            e
        })?;

        // rw-r--r--, never executable
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&full_path, std::fs::Permissions::from_mode(0o644)).await?;
        }

        Ok(())
    }

    async fn read(&self, key: &str) -> Result<Vec<u8>> {
        let full_path = self.full_path(key)?;
        match fs::read(&full_path).await {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(Error::NotFound(format!("Object not found: {}", key)))
            }
            Err(e) => Err(Error::Io(e)),
        }
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let full_path = self.full_path(key)?;
        if fs::try_exists(&full_path).await? {
            fs::remove_file(full_path).await?;
        }
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let full_path = self.full_path(key)?;
        Ok(fs::try_exists(full_path).await?)
    }
}
