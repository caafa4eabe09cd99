//! Headless LibreOffice conversion between office formats and PDF.

use std::path::Path;

use crate::error::{AppError, ErrorCode};

use super::process;

static SOFFICE: super::ToolPath = super::ToolPath::new(&["soffice", "libreoffice"]);

/// Target formats `to_word`/`to_excel`/`to_ppt` convert a PDF into.
#[derive(Debug, Clone, Copy)]
pub enum OfficeFormat {
    Docx,
    Xlsx,
    Pptx,
    Pdf,
}

impl OfficeFormat {
    fn filter_name(self) -> &'static str {
        match self {
            OfficeFormat::Docx => "docx",
            OfficeFormat::Xlsx => "xlsx",
            OfficeFormat::Pptx => "pptx",
            OfficeFormat::Pdf => "pdf",
        }
    }
}

/// Converts `bytes` (named `source_name` purely to give soffice a correct
/// extension to key its import filter on) into `target`, returning the
/// converted file's bytes.
pub async fn convert(bytes: &[u8], source_extension: &str, target: OfficeFormat) -> Result<Vec<u8>, AppError> {
    let bin = SOFFICE.resolve()?;
    let scratch = tempfile::tempdir().map_err(AppError::from)?;
    let input_path = scratch.path().join(format!("in.{source_extension}"));
    std::fs::write(&input_path, bytes).map_err(AppError::from)?;

    let args = vec![
        "--headless".to_string(),
        "--norestore".to_string(),
        "--convert-to".to_string(),
        target.filter_name().to_string(),
        "--outdir".to_string(),
        scratch.path().to_string_lossy().to_string(),
        input_path.to_string_lossy().to_string(),
    ];

    let output = process::run(bin, &args, super::OFFICE_CONVERT_DEADLINE, super::MAX_TOOL_OUTPUT_BYTES).await?;
    if !output.success() {
        return Err(AppError::new(ErrorCode::ToolFailed, output.stderr_tail(400)));
    }

    let output_path = scratch.path().join(format!("in.{}", target.filter_name()));
    find_converted_file(scratch.path(), &input_path, &output_path).and_then(|path| std::fs::read(path).map_err(AppError::from))
}

fn find_converted_file(dir: &Path, input_path: &Path, expected: &Path) -> Result<std::path::PathBuf, AppError> {
    if expected.exists() {
        return Ok(expected.to_path_buf());
    }
    // soffice names its output after the input stem; fall back to scanning
    // the scratch directory for the one file that isn't the input.
    let entries = std::fs::read_dir(dir).map_err(AppError::from)?;
    for entry in entries.flatten() {
        let path = entry.path();
        if path != input_path && path.extension().is_some() {
            return Ok(path);
        }
    }
    Err(AppError::new(ErrorCode::ToolFailed, "soffice did not produce an output file"))
}
