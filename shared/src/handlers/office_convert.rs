use crate::adapter::office::{self, OfficeFormat};
use crate::dto::HandlerOutput;
use crate::error::AppError;

use super::{read_input, HandlerCtx};

/// The three office formats `to-word`/`to-excel`/`to-ppt` can target.
#[derive(Debug, Clone, Copy)]
pub enum Target {
    Docx,
    Xlsx,
    Pptx,
}

impl Target {
    fn office_format(self) -> OfficeFormat {
        match self {
            Target::Docx => OfficeFormat::Docx,
            Target::Xlsx => OfficeFormat::Xlsx,
            Target::Pptx => OfficeFormat::Pptx,
        }
    }

    fn extension(self) -> &'static str {
        match self {
            Target::Docx => "docx",
            Target::Xlsx => "xlsx",
            Target::Pptx => "pptx",
        }
    }
}

/// PDF -> office format. The artifact convention only admits `pdf`/`zip`
/// extensions, so a single converted office file still travels as a
/// one-entry zip rather than bare `.docx`/`.xlsx`/`.pptx` bytes.
pub async fn to_office(ctx: &HandlerCtx, input_path: &str, target: Target) -> Result<HandlerOutput, AppError> {
    let bytes = read_input(ctx, input_path)?;
    let converted = office::convert(&bytes, "pdf", target.office_format()).await?;
    Ok(HandlerOutput::MultiFile {
        files: vec![(format!("converted.{}", target.extension()), converted)],
    })
}

/// office format -> PDF.
pub async fn from_office(ctx: &HandlerCtx, input_path: &str, source_extension: &str) -> Result<HandlerOutput, AppError> {
    let bytes = read_input(ctx, input_path)?;
    let pdf = office::convert(&bytes, source_extension, OfficeFormat::Pdf).await?;
    Ok(HandlerOutput::SingleFile { bytes: pdf, ext: "pdf" })
}
