//! One handler per [`crate::dto::JobKind`]. Each is a plain async function
//! over a typed payload and a [`HandlerCtx`], mirroring the
//! `AppState`-holds-shared-handles pattern `upload-api` and
//! `sharepoint-ingest` use for their own request/job context.

mod compress;
mod cv_generate;
mod from_html;
mod merge;
mod office_convert;
mod organize;
mod protect_unlock;
mod remove_pages;
mod repair;
mod rotate_crop;
mod split;
mod watermark;

use std::path::Path;
use std::sync::Arc;

use crate::config::Settings;
use crate::dto::{HandlerOutput, JobPayload};
use crate::error::AppError;
use crate::temp_store::TempStore;

/// Shared, read-only handles every handler needs: where temp files live and
/// the effective configuration (tool deadlines, limits).
pub struct HandlerCtx {
    pub store: TempStore,
    pub settings: Arc<Settings>,
}

/// Reads an input file after validating it resolves inside the uploads root.
/// Every handler goes through this rather than opening a payload path
/// directly, so a path-escaping payload always fails `PATH_ESCAPE`.
fn read_input(ctx: &HandlerCtx, path: &str) -> Result<Vec<u8>, AppError> {
    let resolved = ctx.store.validate_under(ctx.store.uploads_root(), Path::new(path))?;
    std::fs::read(resolved).map_err(AppError::from)
}

/// Dispatches `payload` to its matching handler. This is the single place
/// that maps a [`crate::dto::JobKind`] onto executable behavior; the worker
/// pool never matches on job kind itself.
pub async fn dispatch(payload: JobPayload, ctx: Arc<HandlerCtx>) -> Result<HandlerOutput, AppError> {
    match payload {
        JobPayload::Merge { input_paths } => merge::run(&ctx, &input_paths).await,
        JobPayload::Split { input_path, page_spec } => split::run(&ctx, &input_path, &page_spec).await,
        JobPayload::Compress { input_path, preset } => compress::run(&ctx, &input_path, preset).await,
        JobPayload::Protect { input_path, password } => protect_unlock::protect(&ctx, &input_path, &password).await,
        JobPayload::Unlock { input_path, password } => protect_unlock::unlock(&ctx, &input_path, &password).await,
        JobPayload::RemovePages { input_path, page_spec } => remove_pages::run(&ctx, &input_path, &page_spec).await,
        JobPayload::Rotate {
            input_path,
            page_spec,
            degrees,
        } => rotate_crop::rotate(&ctx, &input_path, page_spec.as_deref(), degrees).await,
        JobPayload::Organize { input_path, order } => organize::run(&ctx, &input_path, &order).await,
        JobPayload::Crop { input_path, margins } => rotate_crop::crop(&ctx, &input_path, &margins).await,
        JobPayload::ToWord { input_path } => office_convert::to_office(&ctx, &input_path, office_convert::Target::Docx).await,
        JobPayload::ToExcel { input_path } => office_convert::to_office(&ctx, &input_path, office_convert::Target::Xlsx).await,
        JobPayload::ToPpt { input_path } => office_convert::to_office(&ctx, &input_path, office_convert::Target::Pptx).await,
        JobPayload::FromWord { input_path } => office_convert::from_office(&ctx, &input_path, "docx").await,
        JobPayload::FromExcel { input_path } => office_convert::from_office(&ctx, &input_path, "xlsx").await,
        JobPayload::FromPpt { input_path } => office_convert::from_office(&ctx, &input_path, "pptx").await,
        JobPayload::FromHtml { html } => from_html::run(&html).await,
        JobPayload::Repair { input_path, method } => repair::run(&ctx, &input_path, method).await,
        JobPayload::Watermark { input_path, options } => watermark::run(&ctx, &input_path, &options).await,
        JobPayload::CvGenerate { cv } => cv_generate::run(&cv).await,
    }
}
