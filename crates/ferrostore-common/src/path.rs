//! Path Sandbox (§4.1): maps tenant/bucket/object coordinates onto filesystem
//! paths without ever letting a crafted object key escape the storage root.

use crate::error::{Error, Result};
use std::path::{Component, Path, PathBuf};

/// Resolves a tenant-scoped bucket/key pair to an absolute path under `root`,
/// rejecting any input that would traverse outside of it.
#[derive(Clone, Debug)]
pub struct PathSandbox {
    root: PathBuf,
}

impl PathSandbox {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path to a bucket's directory: `<root>/<tenant_id>/<bucket_name>`.
    pub fn bucket_path(&self, tenant_id: &str, bucket: &str) -> Result<PathBuf> {
        let mut path = self.root.clone();
        push_segment(&mut path, tenant_id)?;
        push_segment(&mut path, bucket)?;
        Ok(path)
    }

    /// Path to an object's data file under its bucket directory. Object keys
    /// may contain `/`, each segment of which is validated independently so
    /// that `..` never resolves outside the bucket directory.
    pub fn object_path(&self, tenant_id: &str, bucket: &str, key: &str) -> Result<PathBuf> {
        let mut path = self.bucket_path(tenant_id, bucket)?;
        for segment in key.split('/') {
            push_segment(&mut path, segment)?;
        }
        Ok(path)
    }

    /// Path to an object's JSON metadata sidecar file.
    pub fn metadata_path(&self, tenant_id: &str, bucket: &str, key: &str) -> Result<PathBuf> {
        let mut path = self.object_path(tenant_id, bucket, key)?;
        let file_name = path
            .file_name()
            .map(|n| format!("{}.metadata", n.to_string_lossy()))
            .ok_or_else(|| Error::invalid_request("empty object key"))?;
        path.set_file_name(file_name);
        Ok(path)
    }

    /// Path to a staged multipart part under `<bucket>/.multipart/<upload_id>/<part_number>`.
    pub fn multipart_part_path(
        &self,
        tenant_id: &str,
        bucket: &str,
        upload_id: &str,
        part_number: i32,
    ) -> Result<PathBuf> {
        let mut path = self.bucket_path(tenant_id, bucket)?;
        push_segment(&mut path, ".multipart")?;
        push_segment(&mut path, upload_id)?;
        push_segment(&mut path, &part_number.to_string())?;
        Ok(path)
    }
}

/// Validate a single path segment and append it to `path`.
///
/// Rejects empty segments, `.`/`..`, embedded path separators, and NUL bytes
/// — anything that would let a crafted key step outside the sandbox root or
/// reinterpret a segment boundary.
fn push_segment(path: &mut PathBuf, segment: &str) -> Result<()> {
    if segment.is_empty() || segment == "." || segment == ".." {
        return Err(Error::invalid_request(format!(
            "invalid path segment: {segment:?}"
        )));
    }
    if segment.contains('\0') {
        return Err(Error::invalid_request("path segment contains NUL byte"));
    }
    // Belt-and-suspenders: reject backslashes too, so Windows-style
    // traversal attempts fail the same way on every host platform.
    if segment.contains('\\') {
        return Err(Error::invalid_request(
            "path segment contains backslash".to_string(),
        ));
    }
    path.push(segment);
    Ok(())
}

/// Verify that `candidate` is contained within `root` after lexical
/// normalization, without touching the filesystem (for paths that may not
/// exist yet).
#[must_use]
pub fn is_contained(root: &Path, candidate: &Path) -> bool {
    let mut depth: i64 = 0;
    for component in candidate.strip_prefix(root).unwrap_or(candidate).components() {
        match component {
            Component::ParentDir => depth -= 1,
            Component::Normal(_) => depth += 1,
            _ => {}
        }
        if depth < 0 {
            return false;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_path_happy() {
        let sandbox = PathSandbox::new("/data");
        let path = sandbox
            .object_path("tenant-1", "my-bucket", "a/b/c.txt")
            .unwrap();
        assert_eq!(path, PathBuf::from("/data/tenant-1/my-bucket/a/b/c.txt"));
    }

    #[test]
    fn test_object_path_rejects_traversal() {
        let sandbox = PathSandbox::new("/data");
        assert!(sandbox.object_path("tenant-1", "bucket", "../../etc/passwd").is_err());
        assert!(sandbox.object_path("tenant-1", "bucket", "a/../../b").is_err());
    }

    #[test]
    fn test_object_path_rejects_empty_segment() {
        let sandbox = PathSandbox::new("/data");
        assert!(sandbox.object_path("tenant-1", "bucket", "a//b").is_err());
    }

    #[test]
    fn test_metadata_path() {
        let sandbox = PathSandbox::new("/data");
        let path = sandbox.metadata_path("t", "b", "key.txt").unwrap();
        assert_eq!(path, PathBuf::from("/data/t/b/key.txt.metadata"));
    }

    #[test]
    fn test_is_contained() {
        assert!(is_contained(Path::new("/data"), Path::new("/data/a/b")));
        assert!(!is_contained(Path::new("/data"), Path::new("/data/../etc")));
    }
}
