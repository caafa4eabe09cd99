use crate::adapter::pdf_engine;
use crate::dto::HandlerOutput;
use crate::error::AppError;

use super::{read_input, HandlerCtx};

pub async fn protect(ctx: &HandlerCtx, input_path: &str, password: &str) -> Result<HandlerOutput, AppError> {
    if password.is_empty() {
        return Err(AppError::bad_payload("protect requires a non-empty password"));
    }
    let bytes = read_input(ctx, input_path)?;
    let encrypted = pdf_engine::protect(&bytes, password).await?;
    Ok(HandlerOutput::SingleFile { bytes: encrypted, ext: "pdf" })
}

pub async fn unlock(ctx: &HandlerCtx, input_path: &str, password: &str) -> Result<HandlerOutput, AppError> {
    if password.is_empty() {
        return Err(AppError::bad_payload("unlock requires a non-empty password"));
    }
    let bytes = read_input(ctx, input_path)?;
    let decrypted = pdf_engine::unlock(&bytes, password).await?;
    Ok(HandlerOutput::SingleFile { bytes: decrypted, ext: "pdf" })
}
