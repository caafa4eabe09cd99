//! Layout-preserving text extraction via `pdftotext -layout`, the same
//! binary and flag `text-extraction::extract_text` wraps in the upstream
//! workspace. Not wired to any current job kind, but kept as one of the tool
//! adapter's five named capabilities.

use crate::error::{AppError, ErrorCode};

use super::process;

static PDFTOTEXT: super::ToolPath = super::ToolPath::new(&["pdftotext"]);

/// Extracts text from `bytes`, optionally limited to `first_page..=last_page`
/// (1-based, inclusive).
pub async fn extract_text(bytes: &[u8], page_range: Option<(u32, u32)>) -> Result<String, AppError> {
    let bin = PDFTOTEXT.resolve()?;
    let scratch = tempfile::tempdir().map_err(AppError::from)?;
    let input_path = scratch.path().join("in.pdf");
    let output_path = scratch.path().join("out.txt");
    std::fs::write(&input_path, bytes).map_err(AppError::from)?;

    let mut args = vec!["-layout".to_string()];
    if let Some((first, last)) = page_range {
        args.push("-f".to_string());
        args.push(first.to_string());
        args.push("-l".to_string());
        args.push(last.to_string());
    }
    args.push(input_path.to_string_lossy().to_string());
    args.push(output_path.to_string_lossy().to_string());

    let output = process::run(bin, &args, super::EXTRACT_DEADLINE, super::MAX_TOOL_OUTPUT_BYTES).await?;
    if !output.success() {
        return Err(AppError::new(ErrorCode::ToolFailed, output.stderr_tail(400)));
    }
    std::fs::read_to_string(&output_path).map_err(AppError::from)
}
