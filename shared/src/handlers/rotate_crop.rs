use lopdf::Document;

use crate::adapter::pdf_engine::{self, Margins, MarginUnit};
use crate::dto::{CropMargins, HandlerOutput, MarginUnit as DtoMarginUnit};
use crate::error::AppError;

use super::{read_input, HandlerCtx};

pub async fn rotate(ctx: &HandlerCtx, input_path: &str, page_spec: Option<&str>, degrees: i32) -> Result<HandlerOutput, AppError> {
    if !matches!(degrees, 0 | 90 | 180 | 270) {
        return Err(AppError::bad_payload("rotation must be one of 0, 90, 180, 270 degrees"));
    }
    let bytes = read_input(ctx, input_path)?;

    let pages = match page_spec {
        Some(spec) => {
            let total_pages = Document::load_mem(&bytes)
                .map_err(|e| AppError::bad_payload(format!("not a readable PDF: {e}")))?
                .get_pages()
                .len() as u32;
            let pages = crate::page_spec::parse(spec, total_pages)?;
            if pages.is_empty() {
                return Err(AppError::bad_payload("page spec selected no pages"));
            }
            Some(pages)
        }
        None => None,
    };

    let result = pdf_engine::rotate(&bytes, pages.as_deref(), degrees)?;
    Ok(HandlerOutput::SingleFile { bytes: result, ext: "pdf" })
}

pub async fn crop(ctx: &HandlerCtx, input_path: &str, margins: &CropMargins) -> Result<HandlerOutput, AppError> {
    let bytes = read_input(ctx, input_path)?;
    let engine_margins = Margins {
        unit: match margins.unit {
            DtoMarginUnit::Points => MarginUnit::Points,
            DtoMarginUnit::Percent => MarginUnit::Percent,
        },
        top: margins.top,
        bottom: margins.bottom,
        left: margins.left,
        right: margins.right,
    };
    let result = pdf_engine::crop(&bytes, &engine_margins)?;
    Ok(HandlerOutput::SingleFile { bytes: result, ext: "pdf" })
}
