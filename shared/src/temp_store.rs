//! Mediates every filesystem touch inside the two pipeline roots: `uploads`
//! and `downloads`. No other module in this crate opens a file by a path it
//! built itself — it asks the store to allocate or validate one first.

use std::path::{Path, PathBuf};

use uuid::Uuid;

use crate::error::{AppError, ErrorCode};

#[derive(Debug, Clone)]
pub struct TempStore {
    uploads_root: PathBuf,
    downloads_root: PathBuf,
}

impl TempStore {
    /// Creates both roots (if absent) and returns a handle mediating them.
    pub fn new(uploads_root: impl Into<PathBuf>, downloads_root: impl Into<PathBuf>) -> std::io::Result<Self> {
        let uploads_root = uploads_root.into();
        let downloads_root = downloads_root.into();
        std::fs::create_dir_all(&uploads_root)?;
        std::fs::create_dir_all(&downloads_root)?;
        Ok(Self {
            uploads_root,
            downloads_root,
        })
    }

    pub fn uploads_root(&self) -> &Path {
        &self.uploads_root
    }

    pub fn downloads_root(&self) -> &Path {
        &self.downloads_root
    }

    /// Returns a path inside `uploads` with an unpredictable, non-colliding
    /// leaf. Does not create the file; the multipart parser streams into it.
    pub fn allocate_upload_slot(&self) -> PathBuf {
        self.uploads_root.join(Uuid::new_v4().to_string())
    }

    /// Returns a fresh, unique subdirectory under `uploads` for a single tool
    /// invocation's scratch files, so concurrent jobs never collide on a
    /// filesystem path.
    pub fn allocate_scratch_dir(&self) -> std::io::Result<PathBuf> {
        let dir = self.uploads_root.join(format!("scratch-{}", Uuid::new_v4()));
        std::fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    /// Returns `downloads/{job_id}.{ext}`. `ext` is expected to be `pdf` or
    /// `zip`, per the artifact naming convention in the specification.
    pub fn allocate_download_path(&self, job_id: Uuid, ext: &str) -> PathBuf {
        self.downloads_root.join(format!("{job_id}.{ext}"))
    }

    /// Create-exclusive write: fails if `path` already exists.
    pub fn write_buffer(&self, path: &Path, bytes: &[u8]) -> Result<(), AppError> {
        self.validate_under_either_root(path)?;
        use std::io::Write;
        let mut f = std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
            .map_err(AppError::from)?;
        f.write_all(bytes).map_err(AppError::from)?;
        Ok(())
    }

    /// Writes a zip archive at `path` with one deflate-level-9 entry per
    /// source file, named by that file's basename.
    pub fn write_zip(&self, path: &Path, files: &[(String, Vec<u8>)]) -> Result<(), AppError> {
        self.validate_under_either_root(path)?;
        let file = std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
            .map_err(AppError::from)?;
        let mut zip = zip::ZipWriter::new(file);
        let options = zip::write::FileOptions::default()
            .compression_method(zip::CompressionMethod::Deflated)
            .compression_level(Some(9));
        for (name, bytes) in files {
            let basename = Path::new(name)
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| name.clone());
            zip.start_file(basename, options)
                .map_err(|e| AppError::internal(e.to_string()))?;
            use std::io::Write;
            zip.write_all(bytes).map_err(AppError::from)?;
        }
        zip.finish().map_err(|e| AppError::internal(e.to_string()))?;
        Ok(())
    }

    /// Opens `path` for streaming download after validating it lies under the
    /// downloads root.
    pub fn read_stream(&self, path: &Path) -> Result<std::fs::File, AppError> {
        self.validate_under(&self.downloads_root, path)?;
        std::fs::File::open(path).map_err(AppError::from)
    }

    /// Resolves `path` and checks prefix-containment against `root`,
    /// rejecting `..`, absolute-path, and symlink escapes.
    pub fn validate_under(&self, root: &Path, path: &Path) -> Result<PathBuf, AppError> {
        let resolved_root = dunce_canonicalize_best_effort(root);
        let resolved_path = dunce_canonicalize_best_effort(path);

        // `canonicalize` requires the path to exist; for paths we are about to
        // create (e.g. a brand new download path) fall back to lexical
        // normalization rooted at the (existing) parent directory.
        let resolved_path = match resolved_path {
            Some(p) => p,
            None => lexical_normalize(path),
        };
        let resolved_root = resolved_root.unwrap_or_else(|| lexical_normalize(root));

        if resolved_path.starts_with(&resolved_root) && resolved_path != resolved_root {
            Ok(resolved_path)
        } else {
            Err(AppError::new(ErrorCode::PathEscape, "path escapes its allowed root"))
        }
    }

    fn validate_under_either_root(&self, path: &Path) -> Result<PathBuf, AppError> {
        self.validate_under(&self.uploads_root, path)
            .or_else(|_| self.validate_under(&self.downloads_root, path))
    }

    /// Best-effort deletion, silent on an absent file.
    pub fn unlink(&self, path: &Path) {
        if let Err(e) = std::fs::remove_file(path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(?path, error = %e, "failed to unlink temp file");
            }
        }
    }

    /// Best-effort recursive removal of a scratch subdirectory.
    pub fn remove_scratch_dir(&self, dir: &Path) {
        if let Err(e) = std::fs::remove_dir_all(dir) {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(?dir, error = %e, "failed to remove scratch dir");
            }
        }
    }
}

fn dunce_canonicalize_best_effort(path: &Path) -> Option<PathBuf> {
    std::fs::canonicalize(path).ok()
}

/// Normalizes `.`/`..` components lexically without touching the filesystem,
/// used only for paths that do not exist yet (e.g. an about-to-be-created
/// download artifact).
fn lexical_normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            std::path::Component::ParentDir => {
                out.pop();
            }
            std::path::Component::CurDir => {}
            other => out.push(other.as_os_str()),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (TempStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = TempStore::new(dir.path().join("uploads"), dir.path().join("downloads")).unwrap();
        (store, dir)
    }

    #[test]
    fn allocate_upload_slot_is_unique_and_unwritten() {
        let (store, _dir) = store();
        let a = store.allocate_upload_slot();
        let b = store.allocate_upload_slot();
        assert_ne!(a, b);
        assert!(!a.exists());
    }

    #[test]
    fn validate_under_rejects_traversal() {
        let (store, _dir) = store();
        let escape = store.uploads_root().join("../../etc/passwd");
        assert!(store.validate_under(store.uploads_root(), &escape).is_err());
    }

    #[test]
    fn validate_under_accepts_path_inside_root() {
        let (store, _dir) = store();
        let inside = store.allocate_upload_slot();
        assert!(store.validate_under(store.uploads_root(), &inside).is_ok());
    }

    #[test]
    fn write_and_read_round_trips() {
        let (store, _dir) = store();
        let path = store.allocate_download_path(Uuid::new_v4(), "pdf");
        store.write_buffer(&path, b"hello").unwrap();
        let mut f = store.read_stream(&path).unwrap();
        let mut buf = Vec::new();
        std::io::Read::read_to_end(&mut f, &mut buf).unwrap();
        assert_eq!(buf, b"hello");
    }

    #[test]
    fn unlink_is_silent_on_absent_file() {
        let (store, _dir) = store();
        let missing = store.uploads_root().join("does-not-exist");
        store.unlink(&missing); // must not panic
    }

    #[test]
    fn write_zip_names_entries_by_basename() {
        let (store, _dir) = store();
        let path = store.allocate_download_path(Uuid::new_v4(), "zip");
        store
            .write_zip(&path, &[("/some/dir/a.pdf".to_string(), b"A".to_vec())])
            .unwrap();
        let file = std::fs::File::open(&path).unwrap();
        let mut zip = zip::ZipArchive::new(file).unwrap();
        let entry = zip.by_index(0).unwrap();
        assert_eq!(entry.name(), "a.pdf");
    }
}
