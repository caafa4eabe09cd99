//! Splits a document into one file per page-spec group and zips the results.
//! Page groups are the comma-separated top-level tokens of `page_spec`; each
//! token (itself a page or range) becomes one output file, in token order.

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

    let mut files = Vec::new();
    for (idx, token) in spec.split(',').map(str::trim).filter(|t| !t.is_empty()).enumerate() {
        let pages = page_spec::parse(token, total_pages)?;
        if pages.is_empty() {
            continue;
        }
        let part = pdf_engine::select_pages(&bytes, &pages)?;
        files.push((format!("part-{:03}.pdf", idx + 1), part));
    }

    if files.is_empty() {
        return Err(AppError::bad_payload("page spec selected no pages"));
    }

    Ok(HandlerOutput::MultiFile { files })
}
