use lopdf::Document;

use crate::adapter::pdf_engine::{self, QuickRepairStrategy};
use crate::adapter::rasterizer;
use crate::dto::{HandlerOutput, RepairMethod};
use crate::error::AppError;

use super::{read_input, HandlerCtx};

const QUICK_STRATEGIES: [QuickRepairStrategy; 4] = [
    QuickRepairStrategy::Relinearize,
    QuickRepairStrategy::ReEmit,
    QuickRepairStrategy::DisableObjectStreams,
    QuickRepairStrategy::StructuralClean,
];

fn is_valid_nonempty(bytes: &[u8]) -> bool {
    !bytes.is_empty() && Document::load_mem(bytes).is_ok()
}

/// Tries every quick strategy in order, returning the first one that
/// produces a non-empty, re-loadable PDF.
async fn try_quick(bytes: &[u8]) -> Option<Vec<u8>> {
    for strategy in QUICK_STRATEGIES {
        if let Ok(repaired) = pdf_engine::quick_repair(bytes, strategy).await {
            if is_valid_nonempty(&repaired) {
                return Some(repaired);
            }
        }
    }
    None
}

/// Ghostscript re-render, first strict then with a permissive retry that
/// ignores the kind of structural errors/warnings a badly damaged file
/// trips.
async fn try_deep(bytes: &[u8]) -> Result<Vec<u8>, AppError> {
    if let Ok(repaired) = rasterizer::deep_repair(bytes, false).await {
        if is_valid_nonempty(&repaired) {
            return Ok(repaired);
        }
    }
    let repaired = rasterizer::deep_repair(bytes, true).await?;
    if !is_valid_nonempty(&repaired) {
        return Err(AppError::new(crate::error::ErrorCode::RepairFailed, "deep repair produced no usable output"));
    }
    Ok(repaired)
}

/// Implements the repair algorithm: `quick` tries the bounded strategy
/// sequence only; `deep` goes straight to the re-render; `auto` tries quick
/// first and falls back to deep on total failure. First attempt producing a
/// non-empty, reloadable file wins.
pub async fn run(ctx: &HandlerCtx, input_path: &str, method: RepairMethod) -> Result<HandlerOutput, AppError> {
    let bytes = read_input(ctx, input_path)?;

    let repaired = match method {
        RepairMethod::Quick => try_quick(&bytes)
            .await
            .ok_or_else(|| AppError::new(crate::error::ErrorCode::RepairFailed, "no quick repair strategy produced a usable file"))?,
        RepairMethod::Deep => try_deep(&bytes).await?,
        RepairMethod::Auto => match try_quick(&bytes).await {
            Some(result) => result,
            None => try_deep(&bytes).await?,
        },
    };

    Ok(HandlerOutput::SingleFile { bytes: repaired, ext: "pdf" })
}
