use crate::adapter::pdf_engine;
use crate::dto::HandlerOutput;
use crate::error::AppError;

use super::{read_input, HandlerCtx};

pub async fn run(ctx: &HandlerCtx, input_paths: &[String]) -> Result<HandlerOutput, AppError> {
    if input_paths.len() < 2 {
        return Err(AppError::bad_payload("merge requires at least two input files"));
    }
    let inputs: Result<Vec<Vec<u8>>, AppError> = input_paths.iter().map(|p| read_input(ctx, p)).collect();
    let bytes = pdf_engine::merge(&inputs?)?;
    Ok(HandlerOutput::SingleFile { bytes, ext: "pdf" })
}
