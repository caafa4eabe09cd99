use crate::adapter::pdf_engine::{self, WatermarkPosition as EnginePosition};
use crate::dto::{HandlerOutput, WatermarkOptions, WatermarkPosition as DtoPosition};
use crate::error::AppError;

use super::{read_input, HandlerCtx};

fn engine_position(position: DtoPosition) -> EnginePosition {
    match position {
        DtoPosition::Center => EnginePosition::Center,
        DtoPosition::TopLeft => EnginePosition::TopLeft,
        DtoPosition::TopRight => EnginePosition::TopRight,
        DtoPosition::BottomLeft => EnginePosition::BottomLeft,
        DtoPosition::BottomRight => EnginePosition::BottomRight,
    }
}

/// Stamps `options.text` on every page. Not named in the spec's §4.4 handler
/// list, but the `JobKind`/payload already carries it, so it is supplemented
/// here per the expanded spec's watermark note.
pub async fn run(ctx: &HandlerCtx, input_path: &str, options: &WatermarkOptions) -> Result<HandlerOutput, AppError> {
    if options.text.trim().is_empty() {
        return Err(AppError::bad_payload("watermark text must not be empty"));
    }
    let bytes = read_input(ctx, input_path)?;
    let result = pdf_engine::watermark(&bytes, &options.text, options.opacity, engine_position(options.position))?;
    Ok(HandlerOutput::SingleFile { bytes: result, ext: "pdf" })
}
