//! Gate run after multipart parsing: rejects requests whose attached files
//! cannot be safely handed to the pipeline, and deletes their temp files
//! before returning.

use std::path::{Path, PathBuf};

use crate::error::{AppError, ErrorCode};
use crate::temp_store::TempStore;

/// The file family an endpoint declares for its uploads, used to pick the
/// expected magic-byte signature and the allowed extension list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadFamily {
    Pdf,
    Docx,
    Xlsx,
    Pptx,
    LegacyOffice,
}

impl UploadFamily {
    fn allowed_extensions(self) -> &'static [&'static str] {
        match self {
            UploadFamily::Pdf => &["pdf"],
            UploadFamily::Docx => &["docx"],
            UploadFamily::Xlsx => &["xlsx"],
            UploadFamily::Pptx => &["pptx"],
            UploadFamily::LegacyOffice => &["doc", "xls", "ppt"],
        }
    }
}

/// A single file already streamed to disk by the multipart parser, pending
/// validation.
#[derive(Debug, Clone)]
pub struct PendingUpload {
    pub path: PathBuf,
    pub original_name: String,
    pub size: u64,
}

/// Per-endpoint validation limits.
#[derive(Debug, Clone)]
pub struct ValidatorConfig {
    pub max_files: usize,
    pub max_file_size: u64,
    pub family: UploadFamily,
}

impl ValidatorConfig {
    pub fn single(max_file_size: u64, family: UploadFamily) -> Self {
        Self {
            max_files: 1,
            max_file_size,
            family,
        }
    }

    pub fn multi(max_files: usize, max_file_size: u64, family: UploadFamily) -> Self {
        Self {
            max_files,
            max_file_size,
            family,
        }
    }
}

/// Validates `files` against `config`, applying checks in spec order (count,
/// size, magic bytes, extension). On any failure every file in `files` is
/// unlinked via `store` before the error is returned.
pub fn validate(files: &[PendingUpload], config: &ValidatorConfig, store: &TempStore) -> Result<(), AppError> {
    match validate_inner(files, config) {
        Ok(()) => Ok(()),
        Err(e) => {
            for f in files {
                store.unlink(&f.path);
            }
            Err(e)
        }
    }
}

fn validate_inner(files: &[PendingUpload], config: &ValidatorConfig) -> Result<(), AppError> {
    if files.is_empty() || files.len() > config.max_files {
        return Err(AppError::new(
            ErrorCode::UploadTooManyFiles,
            format!("request carries {} files, limit is {}", files.len(), config.max_files),
        ));
    }

    for f in files {
        if f.size > config.max_file_size {
            return Err(AppError::new(
                ErrorCode::UploadTooLarge,
                format!("'{}' is {} bytes, limit is {}", f.original_name, f.size, config.max_file_size),
            ));
        }
    }

    for f in files {
        check_magic_bytes(&f.path, config.family)?;
    }

    for f in files {
        if !has_allowed_extension(&f.original_name, config.family) {
            return Err(AppError::new(
                ErrorCode::UploadBadType,
                format!("'{}' has an extension not allowed for this endpoint", f.original_name),
            ));
        }
    }

    Ok(())
}

fn has_allowed_extension(name: &str, family: UploadFamily) -> bool {
    let ext = Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    match ext {
        Some(ext) => family.allowed_extensions().contains(&ext.as_str()),
        None => false,
    }
}

const PDF_MAGIC: &[u8] = b"%PDF-";
const ZIP_MAGIC: &[u8] = &[0x50, 0x4B, 0x03, 0x04];
const ZIP_MAGIC_EMPTY: &[u8] = &[0x50, 0x4B, 0x05, 0x06];
const OLE_MAGIC: &[u8] = &[0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];

fn check_magic_bytes(path: &Path, family: UploadFamily) -> Result<(), AppError> {
    let mut buf = [0u8; 16];
    let read = {
        use std::io::Read;
        let mut f = std::fs::File::open(path).map_err(AppError::from)?;
        f.read(&mut buf).map_err(AppError::from)?
    };
    let head = &buf[..read];

    let ok = match family {
        UploadFamily::Pdf => head.starts_with(PDF_MAGIC),
        UploadFamily::Docx | UploadFamily::Xlsx | UploadFamily::Pptx => {
            head.starts_with(ZIP_MAGIC) || head.starts_with(ZIP_MAGIC_EMPTY)
        }
        UploadFamily::LegacyOffice => head.starts_with(OLE_MAGIC),
    };

    // `infer` gives us a second opinion on the zip-vs-pdf family boundary in
    // particular, since a renamed file can otherwise slip past the extension
    // check with a technically-valid-but-wrong-family signature.
    let cross_family_confusion = infer::get(head)
        .map(|t| match (family, t.mime_type()) {
            (UploadFamily::Pdf, m) => m != "application/pdf",
            (UploadFamily::Docx | UploadFamily::Xlsx | UploadFamily::Pptx, m) => {
                !m.contains("zip") && !m.contains("officedocument")
            }
            (UploadFamily::LegacyOffice, _) => false,
        })
        .unwrap_or(false);

    if ok && !cross_family_confusion {
        Ok(())
    } else {
        Err(AppError::new(
            ErrorCode::UploadInvalidMagic,
            "file signature does not match the declared type",
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn upload(dir: &Path, name: &str, content: &[u8]) -> PendingUpload {
        let path = dir.join(name);
        std::fs::write(&path, content).unwrap();
        PendingUpload {
            path,
            original_name: name.to_string(),
            size: content.len() as u64,
        }
    }

    #[test]
    fn accepts_valid_pdf() {
        let dir = tempfile::tempdir().unwrap();
        let files = vec![upload(dir.path(), "a.pdf", b"%PDF-1.4\ncontent")];
        let config = ValidatorConfig::single(1024, UploadFamily::Pdf);
        assert!(validate_inner(&files, &config).is_ok());
    }

    #[test]
    fn rejects_invalid_magic() {
        let dir = tempfile::tempdir().unwrap();
        let files = vec![upload(dir.path(), "a.pdf", b"NOTAPDF----")];
        let config = ValidatorConfig::single(1024, UploadFamily::Pdf);
        let err = validate_inner(&files, &config).unwrap_err();
        assert_eq!(err.code, ErrorCode::UploadInvalidMagic);
    }

    #[test]
    fn rejects_too_large() {
        let dir = tempfile::tempdir().unwrap();
        let files = vec![upload(dir.path(), "a.pdf", &[b'%', b'P', b'D', b'F', b'-'][..].repeat(30))];
        let config = ValidatorConfig::single(10, UploadFamily::Pdf);
        let err = validate_inner(&files, &config).unwrap_err();
        assert_eq!(err.code, ErrorCode::UploadTooLarge);
    }

    #[test]
    fn rejects_too_many_files() {
        let dir = tempfile::tempdir().unwrap();
        let files = vec![
            upload(dir.path(), "a.pdf", b"%PDF-1.4"),
            upload(dir.path(), "b.pdf", b"%PDF-1.4"),
        ];
        let config = ValidatorConfig::single(1024, UploadFamily::Pdf);
        let err = validate_inner(&files, &config).unwrap_err();
        assert_eq!(err.code, ErrorCode::UploadTooManyFiles);
    }

    #[test]
    fn rejects_disallowed_extension() {
        let dir = tempfile::tempdir().unwrap();
        let files = vec![upload(dir.path(), "a.exe", b"%PDF-1.4")];
        let config = ValidatorConfig::single(1024, UploadFamily::Pdf);
        let err = validate_inner(&files, &config).unwrap_err();
        assert_eq!(err.code, ErrorCode::UploadBadType);
    }

    #[test]
    fn validate_unlinks_all_files_on_failure() {
        let dir = tempfile::tempdir().unwrap();
        let store = TempStore::new(dir.path().join("u"), dir.path().join("d")).unwrap();
        let good = upload(store.uploads_root(), "a.pdf", b"%PDF-1.4");
        let bad = {
            std::fs::create_dir_all(store.uploads_root()).unwrap();
            upload(store.uploads_root(), "b.pdf", b"NOPE")
        };
        let files = vec![good.clone(), bad.clone()];
        let config = ValidatorConfig::multi(10, 1024, UploadFamily::Pdf);
        assert!(validate(&files, &config, &store).is_err());
        assert!(!good.path.exists());
        assert!(!bad.path.exists());
    }

    #[test]
    fn accepts_docx_zip_signature() {
        let dir = tempfile::tempdir().unwrap();
        let mut content = vec![0x50, 0x4B, 0x03, 0x04];
        content.extend_from_slice(&[0u8; 20]);
        let files = vec![upload(dir.path(), "a.docx", &content)];
        let config = ValidatorConfig::single(1024, UploadFamily::Docx);
        assert!(validate_inner(&files, &config).is_ok());
    }

    #[test]
    fn accepts_legacy_ole_signature() {
        let dir = tempfile::tempdir().unwrap();
        let mut content = OLE_MAGIC.to_vec();
        content.extend_from_slice(&[0u8; 20]);
        let files = vec![upload(dir.path(), "a.doc", &content)];
        let config = ValidatorConfig::single(1024, UploadFamily::LegacyOffice);
        assert!(validate_inner(&files, &config).is_ok());
    }
}
