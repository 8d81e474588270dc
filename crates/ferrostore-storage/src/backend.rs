//! Filesystem Backend (§4.2): `Put`/`Get`/`Delete`/`Exists`/`List`/
//! `GetMetadata`/`SetMetadata`/`RemoveDirectory` against real directories and
//! files under a sandboxed root, with a JSON sidecar per object and
//! `.maxiofs-folder` markers standing in for zero-byte directory objects.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use md5::{Digest, Md5};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};

use crate::error::{StorageError, StorageResult};
use crate::metadata::{ObjectInfo, ObjectMetadata, DIRECTORY_CONTENT_TYPE, DIRECTORY_MARKER};

#[derive(Clone, Debug)]
pub struct FilesystemBackend {
    root: PathBuf,
}

impl FilesystemBackend {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Write an object at `path`. If `is_directory`, creates a real
    /// directory with a `.maxiofs-folder` marker instead of streaming a
    /// body. Otherwise streams `reader` to a same-directory temp file while
    /// hashing MD5, then atomically renames it into place; on any failure
    /// no partial file is left at `path`.
    #[tracing::instrument(skip(self, reader, custom))]
    pub async fn put(
        &self,
        path: &Path,
        is_directory: bool,
        reader: impl AsyncRead + Unpin,
        content_type: Option<&str>,
        custom: HashMap<String, String>,
    ) -> StorageResult<ObjectMetadata> {
        if is_directory {
            return self.put_directory(path, custom).await;
        }

        let parent = path.parent().ok_or_else(|| {
            StorageError::InvalidPath(format!("object path has no parent: {}", path.display()))
        })?;
        tokio::fs::create_dir_all(parent).await?;
        self.ensure_folder_markers(parent).await?;

        // If a directory previously occupied this path, replace it.
        if tokio::fs::try_exists(path).await? && tokio::fs::metadata(path).await?.is_dir() {
            tokio::fs::remove_dir_all(path).await?;
        }

        let tmp_path = PathBuf::from(format!("{}.{}.tmp", path.display(), uuid::Uuid::new_v4().simple()));

        let (size, etag) = self.stream_to_temp(reader, &tmp_path).await?;

        let metadata = ObjectMetadata {
            size,
            etag,
            content_type: content_type.unwrap_or("application/octet-stream").to_string(),
            last_modified: Utc::now(),
            custom,
        };
        self.write_sidecar(path, &metadata).await?;

        if let Err(e) = tokio::fs::rename(&tmp_path, path).await {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            let _ = tokio::fs::remove_file(sidecar_path(path)).await;
            return Err(e.into());
        }

        Ok(metadata)
    }

    async fn stream_to_temp(
        &self,
        mut reader: impl AsyncRead + Unpin,
        tmp_path: &Path,
    ) -> StorageResult<(u64, String)> {
        let mut file = tokio::fs::File::create(tmp_path).await?;
        let mut hasher = Md5::new();
        let mut buf = vec![0u8; 64 * 1024];
        let mut size: u64 = 0;

        loop {
            let n = match reader.read(&mut buf).await {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) => {
                    let _ = tokio::fs::remove_file(tmp_path).await;
                    return Err(e.into());
                }
            };
            if let Err(e) = file.write_all(&buf[..n]).await {
                let _ = tokio::fs::remove_file(tmp_path).await;
                return Err(e.into());
            }
            hasher.update(&buf[..n]);
            size += n as u64;
        }
        file.flush().await?;

        let etag = hex::encode(hasher.finalize());
        Ok((size, etag))
    }

    async fn put_directory(&self, path: &Path, custom: HashMap<String, String>) -> StorageResult<ObjectMetadata> {
        if tokio::fs::try_exists(path).await? && !tokio::fs::metadata(path).await?.is_dir() {
            tokio::fs::remove_file(path).await?;
        }
        tokio::fs::create_dir_all(path).await?;
        self.ensure_folder_markers(path).await?;

        let metadata = ObjectMetadata {
            custom,
            content_type: DIRECTORY_CONTENT_TYPE.to_string(),
            ..ObjectMetadata::directory(Utc::now())
        };
        self.write_sidecar(path, &metadata).await?;
        Ok(metadata)
    }

    /// Touch `.maxiofs-folder` in `dir` and every ancestor up to (not
    /// including) the storage root, so `List` can surface each intermediate
    /// level as a zero-byte directory object.
    async fn ensure_folder_markers(&self, dir: &Path) -> StorageResult<()> {
        let mut current = dir.to_path_buf();
        loop {
            let marker = current.join(DIRECTORY_MARKER);
            if !tokio::fs::try_exists(&marker).await? {
                tokio::fs::write(&marker, b"").await?;
            }
            if current == self.root || !current.starts_with(&self.root) {
                break;
            }
            match current.parent() {
                Some(parent) if parent.starts_with(&self.root) => current = parent.to_path_buf(),
                _ => break,
            }
        }
        Ok(())
    }

    /// Open the data file at `path` for reading along with its metadata.
    #[tracing::instrument(skip(self))]
    pub async fn get(&self, path: &Path) -> StorageResult<(tokio::fs::File, ObjectMetadata)> {
        let file = match tokio::fs::File::open(path).await {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StorageError::NotFound(path.display().to_string()));
            }
            Err(e) => return Err(e.into()),
        };
        let metadata = self.get_metadata(path).await?;
        Ok((file, metadata))
    }

    pub async fn delete(&self, path: &Path) -> StorageResult<()> {
        match tokio::fs::remove_file(path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        match tokio::fs::remove_file(sidecar_path(path)).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        Ok(())
    }

    pub async fn exists(&self, path: &Path) -> bool {
        tokio::fs::try_exists(path).await.unwrap_or(false)
    }

    /// Read the JSON sidecar for `path`, or synthesize it by stat+hash if
    /// absent (e.g. a file dropped onto the filesystem out of band).
    pub async fn get_metadata(&self, path: &Path) -> StorageResult<ObjectMetadata> {
        let sidecar = sidecar_path(path);
        match tokio::fs::read(&sidecar).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => self.synthesize_metadata(path).await,
            Err(e) => Err(e.into()),
        }
    }

    async fn synthesize_metadata(&self, path: &Path) -> StorageResult<ObjectMetadata> {
        let fs_meta = tokio::fs::metadata(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                StorageError::NotFound(path.display().to_string())
            } else {
                StorageError::Io(e)
            }
        })?;
        if fs_meta.is_dir() {
            return Ok(ObjectMetadata::directory(modified_time(&fs_meta)));
        }

        let mut file = tokio::fs::File::open(path).await?;
        let mut hasher = Md5::new();
        let mut buf = vec![0u8; 64 * 1024];
        loop {
            let n = file.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
        }

        Ok(ObjectMetadata {
            size: fs_meta.len(),
            etag: hex::encode(hasher.finalize()),
            content_type: "application/octet-stream".to_string(),
            last_modified: modified_time(&fs_meta),
            custom: HashMap::new(),
        })
    }

    pub async fn set_metadata(&self, path: &Path, metadata: &ObjectMetadata) -> StorageResult<()> {
        self.write_sidecar(path, metadata).await
    }

    async fn write_sidecar(&self, path: &Path, metadata: &ObjectMetadata) -> StorageResult<()> {
        let bytes = serde_json::to_vec(metadata)?;
        tokio::fs::write(sidecar_path(path), bytes).await?;
        Ok(())
    }

    pub async fn remove_directory(&self, path: &Path) -> StorageResult<()> {
        match tokio::fs::remove_dir_all(path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        match tokio::fs::remove_file(sidecar_path(path)).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        Ok(())
    }

    /// Walk the subtree under `prefix`. Non-recursive listings only surface
    /// the immediate children of `prefix` (no deeper `/`-separated entries).
    pub async fn list(&self, prefix: &Path, recursive: bool) -> StorageResult<Vec<ObjectInfo>> {
        let mut results = Vec::new();
        let mut stack = vec![prefix.to_path_buf()];

        while let Some(dir) = stack.pop() {
            let mut entries = match tokio::fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };

            while let Some(entry) = entries.next_entry().await? {
                let entry_path = entry.path();
                let file_name = entry.file_name();
                let name = file_name.to_string_lossy();
                if name.ends_with(".metadata") || name == DIRECTORY_MARKER {
                    continue;
                }

                let file_type = entry.file_type().await?;
                if file_type.is_dir() {
                    let marker = entry_path.join(DIRECTORY_MARKER);
                    if tokio::fs::try_exists(&marker).await? {
                        let fs_meta = tokio::fs::metadata(&entry_path).await?;
                        results.push(ObjectInfo {
                            path: entry_path.display().to_string(),
                            is_directory: true,
                            metadata: ObjectMetadata::directory(modified_time(&fs_meta)),
                        });
                    }
                    if recursive {
                        stack.push(entry_path);
                    }
                } else {
                    let meta = self.get_metadata(&entry_path).await?;
                    results.push(ObjectInfo {
                        path: entry_path.display().to_string(),
                        is_directory: false,
                        metadata: meta,
                    });
                }
            }
        }

        Ok(results)
    }
}

fn sidecar_path(path: &Path) -> PathBuf {
    let mut sidecar = path.to_path_buf();
    let file_name = sidecar
        .file_name()
        .map(|n| format!("{}.metadata", n.to_string_lossy()))
        .unwrap_or_else(|| "root.metadata".to_string());
    sidecar.set_file_name(file_name);
    sidecar
}

fn modified_time(meta: &std::fs::Metadata) -> DateTime<Utc> {
    meta.modified().map(DateTime::<Utc>::from).unwrap_or_else(|_| Utc::now())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_put_get_roundtrip() {
        let dir = tempdir().unwrap();
        let backend = FilesystemBackend::new(dir.path());
        let path = dir.path().join("a.txt");

        let meta = backend
            .put(&path, false, Cursor::new(b"hello world".to_vec()), Some("text/plain"), HashMap::new())
            .await
            .unwrap();
        assert_eq!(meta.size, 11);
        assert_eq!(meta.etag, "5eb63bbbe01eeed093cb22bb8f5acdc3");

        let (mut file, meta) = backend.get(&path).await.unwrap();
        let mut buf = Vec::new();
        file.read_to_end(&mut buf).await.unwrap();
        assert_eq!(buf, b"hello world");
        assert_eq!(meta.content_type, "text/plain");
    }

    #[tokio::test]
    async fn test_get_missing_returns_not_found() {
        let dir = tempdir().unwrap();
        let backend = FilesystemBackend::new(dir.path());
        let err = backend.get(&dir.path().join("missing.txt")).await.unwrap_err();
        assert!(matches!(err, StorageError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_directory_marker_surfaces_in_list() {
        let dir = tempdir().unwrap();
        let backend = FilesystemBackend::new(dir.path());
        let folder = dir.path().join("photos");

        backend.put(&folder, true, Cursor::new(Vec::new()), None, HashMap::new()).await.unwrap();
        backend
            .put(&folder.join("a.jpg"), false, Cursor::new(b"img".to_vec()), Some("image/jpeg"), HashMap::new())
            .await
            .unwrap();

        let listing = backend.list(dir.path(), true).await.unwrap();
        assert!(listing.iter().any(|e| e.is_directory && e.path.ends_with("photos")));
        assert!(listing.iter().any(|e| !e.is_directory && e.path.ends_with("a.jpg")));
    }

    #[tokio::test]
    async fn test_non_recursive_list_stops_at_one_level() {
        let dir = tempdir().unwrap();
        let backend = FilesystemBackend::new(dir.path());
        let nested = dir.path().join("a/b");
        backend.put(&nested, true, Cursor::new(Vec::new()), None, HashMap::new()).await.unwrap();

        let listing = backend.list(dir.path(), false).await.unwrap();
        // only "a" should surface; "b" is one level deeper
        assert_eq!(listing.iter().filter(|e| e.is_directory).count(), 1);
    }

    #[tokio::test]
    async fn test_delete_removes_data_and_sidecar() {
        let dir = tempdir().unwrap();
        let backend = FilesystemBackend::new(dir.path());
        let path = dir.path().join("a.txt");
        backend.put(&path, false, Cursor::new(b"x".to_vec()), None, HashMap::new()).await.unwrap();

        backend.delete(&path).await.unwrap();
        assert!(!backend.exists(&path).await);
        assert!(!tokio::fs::try_exists(sidecar_path(&path)).await.unwrap());
    }
}
