use crate::adapter::rasterizer;
use crate::dto::{CompressPreset, HandlerOutput};
use crate::error::AppError;

use super::{read_input, HandlerCtx};

pub async fn run(ctx: &HandlerCtx, input_path: &str, preset: CompressPreset) -> Result<HandlerOutput, AppError> {
    let original = read_input(ctx, input_path)?;
    let original_size = original.len();
    let compressed = rasterizer::compress(&original, preset).await?;
    tracing::info!(original_size, compressed_size = compressed.len(), "compress finished");
    Ok(HandlerOutput::SingleFile { bytes: compressed, ext: "pdf" })
}
