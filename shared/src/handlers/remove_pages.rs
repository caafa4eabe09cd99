use lopdf::Document;

use crate::adapter::pdf_engine;
use crate::dto::HandlerOutput;
use crate::error::AppError;
use crate::page_spec;

use super::{read_input, HandlerCtx};

pub async fn run(ctx: &HandlerCtx, input_path: &str, spec: &str) -> Result<HandlerOutput, AppError> {
    let bytes = read_input(ctx, input_path)?;
    let total_pages = Document::load_mem(&bytes)
        .map_err(|e| AppError::bad_payload(format!("not a readable PDF: {e}")))?
        .get_pages()
        .len() as u32;

    let remove = page_spec::parse(spec, total_pages)?;
    if remove.is_empty() {
        return Err(AppError::bad_payload("page spec selected no pages to remove"));
    }

    let keep: Vec<u32> = (1..=total_pages).filter(|p| !remove.contains(p)).collect();
    if keep.is_empty() {
        return Err(AppError::bad_payload("cannot remove all pages"));
    }

    let result = pdf_engine::select_pages(&bytes, &keep)?;
    Ok(HandlerOutput::SingleFile { bytes: result, ext: "pdf" })
}
