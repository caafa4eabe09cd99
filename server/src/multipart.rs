//! Streams a multipart request to disk, splitting fields into file uploads
//! (anything carrying a filename) and plain text fields, mirroring the
//! `while let Some(field) = payload.next().await { field.next().await ... }`
//! streaming loop `pdf-ingest`/`upload-api` use for the same job.

use std::collections::HashMap;

use actix_multipart::Multipart;
use futures_util::StreamExt as _;
use shared::error::AppError;
use shared::temp_store::TempStore;
use shared::validator::PendingUpload;

pub struct ParsedMultipart {
    pub files: Vec<PendingUpload>,
    pub fields: HashMap<String, String>,
}

impl ParsedMultipart {
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }
}

pub async fn parse(payload: Multipart, store: &TempStore) -> Result<ParsedMultipart, AppError> {
    let mut files = Vec::new();
    match parse_inner(payload, store, &mut files).await {
        Ok(fields) => Ok(ParsedMultipart { files, fields }),
        Err(e) => {
            for f in &files {
                store.unlink(&f.path);
            }
            Err(e)
        }
    }
}

/// Does the actual streaming, pushing every file flushed to disk into
/// `files` as it goes so the caller can unlink them if a later field fails.
async fn parse_inner(mut payload: Multipart, store: &TempStore, files: &mut Vec<PendingUpload>) -> Result<HashMap<String, String>, AppError> {
    let mut fields = HashMap::new();

    while let Some(field_res) = payload.next().await {
        let mut field = field_res.map_err(|e| AppError::bad_payload(format!("malformed multipart body: {e}")))?;
        let field_name = field.name().to_string();
        let filename = field.content_disposition().get_filename().map(str::to_string);

        match filename {
            Some(original_name) if !original_name.is_empty() => {
                let path = store.allocate_upload_slot();
                let mut size: u64 = 0;
                let mut file = tokio::fs::File::create(&path).await.map_err(AppError::from)?;
                use tokio::io::AsyncWriteExt;
                while let Some(chunk) = field.next().await {
                    let bytes = chunk.map_err(|e| AppError::bad_payload(format!("malformed multipart body: {e}")))?;
                    size += bytes.len() as u64;
                    file.write_all(&bytes).await.map_err(AppError::from)?;
                }
                files.push(PendingUpload {
                    path,
                    original_name,
                    size,
                });
            }
            _ => {
                let mut buf = Vec::new();
                while let Some(chunk) = field.next().await {
                    let bytes = chunk.map_err(|e| AppError::bad_payload(format!("malformed multipart body: {e}")))?;
                    buf.extend_from_slice(&bytes);
                }
                let value = String::from_utf8_lossy(&buf).into_owned();
                fields.insert(field_name, value);
            }
        }
    }

    Ok(fields)
}
