//! Ghostscript-backed recompression and deep-repair re-rendering. Ghostscript
//! is invoked the same way every other subprocess tool in this crate is: a
//! fixed argv, a wall-clock deadline, capped output, through
//! `adapter::process::run`.

use crate::dto::CompressPreset;
use crate::error::AppError;

use super::process;

static GS: super::ToolPath = super::ToolPath::new(&["gs", "gsc"]);

fn preset_args(preset: CompressPreset) -> &'static str {
    match preset {
        CompressPreset::Smallest => "/screen",
        CompressPreset::Balanced => "/ebook",
        CompressPreset::High => "/printer",
    }
}

/// Recompresses `bytes` at `preset` quality, returning the new bytes. The
/// result may not be smaller than the input; the handler reports both sizes.
pub async fn compress(bytes: &[u8], preset: CompressPreset) -> Result<Vec<u8>, AppError> {
    let bin = GS.resolve()?;
    let scratch = tempfile::tempdir().map_err(AppError::from)?;
    let input_path = scratch.path().join("in.pdf");
    let output_path = scratch.path().join("out.pdf");
    std::fs::write(&input_path, bytes).map_err(AppError::from)?;

    let args = vec![
        "-sDEVICE=pdfwrite".to_string(),
        "-dCompatibilityLevel=1.4".to_string(),
        format!("-dPDFSETTINGS={}", preset_args(preset)),
        "-dNOPAUSE".to_string(),
        "-dBATCH".to_string(),
        "-dQUIET".to_string(),
        format!("-sOutputFile={}", output_path.display()),
        input_path.to_string_lossy().to_string(),
    ];

    let output = process::run(bin, &args, super::COMPRESS_DEADLINE, super::MAX_TOOL_OUTPUT_BYTES).await?;
    if !output.success() {
        return Err(AppError::new(crate::error::ErrorCode::ToolFailed, output.stderr_tail(400)));
    }
    std::fs::read(&output_path).map_err(AppError::from)
}

/// Re-renders `bytes` page by page through Ghostscript's PDF writer with a
/// permissive recovery flag set, the deep-repair fallback used when every
/// quick repair strategy has already failed.
pub async fn deep_repair(bytes: &[u8], permissive: bool) -> Result<Vec<u8>, AppError> {
    let bin = GS.resolve()?;
    let scratch = tempfile::tempdir().map_err(AppError::from)?;
    let input_path = scratch.path().join("in.pdf");
    let output_path = scratch.path().join("out.pdf");
    std::fs::write(&input_path, bytes).map_err(AppError::from)?;

    let mut args = vec![
        "-sDEVICE=pdfwrite".to_string(),
        "-dCompatibilityLevel=1.4".to_string(),
        "-dNOPAUSE".to_string(),
        "-dBATCH".to_string(),
        "-dQUIET".to_string(),
    ];
    if permissive {
        args.push("-dPDFSTOPONERROR=false".to_string());
        args.push("-dPDFSTOPONWARNING=false".to_string());
    }
    args.push(format!("-sOutputFile={}", output_path.display()));
    args.push(input_path.to_string_lossy().to_string());

    let output = process::run(bin, &args, super::REPAIR_ATTEMPT_DEADLINE, super::MAX_TOOL_OUTPUT_BYTES).await?;
    if !output.success() || !output_path.exists() {
        return Err(AppError::new(crate::error::ErrorCode::ToolFailed, output.stderr_tail(400)));
    }
    let bytes = std::fs::read(&output_path).map_err(AppError::from)?;
    if bytes.is_empty() {
        return Err(AppError::new(crate::error::ErrorCode::ToolFailed, "repair produced an empty file"));
    }
    Ok(bytes)
}
