//! `POST /pdf/{op}`: one logical enqueue endpoint per [`JobKind`], all
//! sharing the same multipart-parse → validate → enqueue shape. The op in
//! the path picks the upload family, size limit, and payload assembly; the
//! streaming and validation machinery is not duplicated per kind.

use std::str::FromStr;

use actix_multipart::Multipart;
use actix_web::{web, HttpRequest, HttpResponse};

use shared::dto::{
    CompressPreset, CropMargins, EnqueueResponse, JobKind, JobPayload, MarginUnit, RepairMethod, WatermarkOptions, WatermarkPosition,
};
use shared::error::AppError;
use shared::validator::{UploadFamily, ValidatorConfig};

use crate::error_response::ApiError;
use crate::multipart::{self, ParsedMultipart};
use crate::state::AppState;

fn client_key(req: &HttpRequest) -> String {
    req.headers()
        .get("x-api-key")
        .and_then(|v| v.to_str().ok())
        .filter(|s| !s.is_empty())
        .unwrap_or("anon")
        .to_string()
}

fn family_for(kind: JobKind) -> UploadFamily {
    use JobKind::*;
    match kind {
        FromWord => UploadFamily::Docx,
        FromExcel => UploadFamily::Xlsx,
        FromPpt => UploadFamily::Pptx,
        _ => UploadFamily::Pdf,
    }
}

fn validator_config(kind: JobKind, settings: &shared::config::Settings) -> ValidatorConfig {
    let family = family_for(kind);
    let is_office_source = matches!(family, UploadFamily::Docx | UploadFamily::Xlsx | UploadFamily::Pptx);
    let max_size = if is_office_source {
        settings.upload_max_file_size_office
    } else {
        settings.upload_max_file_size
    };
    match kind {
        JobKind::Merge => ValidatorConfig::multi(settings.upload_max_files, max_size, family),
        _ => ValidatorConfig::single(max_size, family),
    }
}

fn parse_u32_field(parsed: &ParsedMultipart, name: &str) -> Result<u32, AppError> {
    parsed
        .field(name)
        .ok_or_else(|| AppError::bad_payload(format!("missing required field '{name}'")))?
        .trim()
        .parse::<u32>()
        .map_err(|_| AppError::bad_payload(format!("field '{name}' must be an integer")))
}

fn parse_f32_field(parsed: &ParsedMultipart, name: &str, default: Option<f32>) -> Result<f32, AppError> {
    match parsed.field(name) {
        Some(v) => v
            .trim()
            .parse::<f32>()
            .map_err(|_| AppError::bad_payload(format!("field '{name}' must be a number"))),
        None => default.ok_or_else(|| AppError::bad_payload(format!("missing required field '{name}'"))),
    }
}

fn single_input_path(parsed: &ParsedMultipart) -> Result<String, AppError> {
    parsed
        .files
        .first()
        .map(|f| f.path.to_string_lossy().into_owned())
        .ok_or_else(|| AppError::bad_payload("request carries no file"))
}

fn build_payload(kind: JobKind, parsed: &ParsedMultipart) -> Result<JobPayload, AppError> {
    Ok(match kind {
        JobKind::Merge => JobPayload::Merge {
            input_paths: parsed.files.iter().map(|f| f.path.to_string_lossy().into_owned()).collect(),
        },
        JobKind::Split => JobPayload::Split {
            input_path: single_input_path(parsed)?,
            page_spec: parsed
                .field("pageSpec")
                .or_else(|| parsed.field("page_spec"))
                .ok_or_else(|| AppError::bad_payload("missing required field 'pageSpec'"))?
                .to_string(),
        },
        JobKind::Compress => {
            let preset_str = parsed.field("preset").unwrap_or("balanced");
            let preset = match preset_str {
                "smallest" => CompressPreset::Smallest,
                "balanced" => CompressPreset::Balanced,
                "high" => CompressPreset::High,
                other => return Err(AppError::bad_payload(format!("unknown preset '{other}'"))),
            };
            JobPayload::Compress {
                input_path: single_input_path(parsed)?,
                preset,
            }
        }
        JobKind::Protect => JobPayload::Protect {
            input_path: single_input_path(parsed)?,
            password: parsed.field("password").unwrap_or("").to_string(),
        },
        JobKind::Unlock => JobPayload::Unlock {
            input_path: single_input_path(parsed)?,
            password: parsed.field("password").unwrap_or("").to_string(),
        },
        JobKind::RemovePages => JobPayload::RemovePages {
            input_path: single_input_path(parsed)?,
            page_spec: parsed
                .field("pageSpec")
                .or_else(|| parsed.field("page_spec"))
                .ok_or_else(|| AppError::bad_payload("missing required field 'pageSpec'"))?
                .to_string(),
        },
        JobKind::Rotate => JobPayload::Rotate {
            input_path: single_input_path(parsed)?,
            page_spec: parsed.field("pageSpec").or_else(|| parsed.field("page_spec")).map(str::to_string),
            degrees: parse_u32_field(parsed, "degrees")? as i32,
        },
        JobKind::Organize => {
            let order_str = parsed
                .field("order")
                .ok_or_else(|| AppError::bad_payload("missing required field 'order'"))?;
            let order = order_str
                .split(',')
                .map(|t| t.trim().parse::<u32>().map_err(|_| AppError::bad_payload("order must be a comma-separated list of integers")))
                .collect::<Result<Vec<u32>, AppError>>()?;
            JobPayload::Organize {
                input_path: single_input_path(parsed)?,
                order,
            }
        }
        JobKind::Crop => {
            let unit = match parsed.field("unit").unwrap_or("points") {
                "points" => MarginUnit::Points,
                "percent" => MarginUnit::Percent,
                other => return Err(AppError::bad_payload(format!("unknown margin unit '{other}'"))),
            };
            JobPayload::Crop {
                input_path: single_input_path(parsed)?,
                margins: CropMargins {
                    unit,
                    top: parse_f32_field(parsed, "top", Some(0.0))?,
                    bottom: parse_f32_field(parsed, "bottom", Some(0.0))?,
                    left: parse_f32_field(parsed, "left", Some(0.0))?,
                    right: parse_f32_field(parsed, "right", Some(0.0))?,
                },
            }
        }
        JobKind::ToWord => JobPayload::ToWord {
            input_path: single_input_path(parsed)?,
        },
        JobKind::ToExcel => JobPayload::ToExcel {
            input_path: single_input_path(parsed)?,
        },
        JobKind::ToPpt => JobPayload::ToPpt {
            input_path: single_input_path(parsed)?,
        },
        JobKind::FromWord => JobPayload::FromWord {
            input_path: single_input_path(parsed)?,
        },
        JobKind::FromExcel => JobPayload::FromExcel {
            input_path: single_input_path(parsed)?,
        },
        JobKind::FromPpt => JobPayload::FromPpt {
            input_path: single_input_path(parsed)?,
        },
        JobKind::FromHtml => JobPayload::FromHtml {
            html: parsed
                .field("html")
                .ok_or_else(|| AppError::bad_payload("missing required field 'html'"))?
                .to_string(),
        },
        JobKind::Repair => {
            let method = match parsed.field("method").unwrap_or("auto") {
                "quick" => RepairMethod::Quick,
                "deep" => RepairMethod::Deep,
                "auto" => RepairMethod::Auto,
                other => return Err(AppError::bad_payload(format!("unknown repair method '{other}'"))),
            };
            JobPayload::Repair {
                input_path: single_input_path(parsed)?,
                method,
            }
        }
        JobKind::Watermark => {
            let position = match parsed.field("position").unwrap_or("center") {
                "center" => WatermarkPosition::Center,
                "top-left" => WatermarkPosition::TopLeft,
                "top-right" => WatermarkPosition::TopRight,
                "bottom-left" => WatermarkPosition::BottomLeft,
                "bottom-right" => WatermarkPosition::BottomRight,
                other => return Err(AppError::bad_payload(format!("unknown watermark position '{other}'"))),
            };
            JobPayload::Watermark {
                input_path: single_input_path(parsed)?,
                options: WatermarkOptions {
                    text: parsed.field("text").unwrap_or("").to_string(),
                    opacity: parse_f32_field(parsed, "opacity", Some(0.3))?,
                    position,
                },
            }
        }
        JobKind::CvGenerate => return Err(AppError::bad_payload("cv-generate is served by POST /cv/generate")),
    })
}

pub async fn enqueue(req: HttpRequest, op: web::Path<String>, payload: Multipart, state: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let kind = JobKind::from_str(&op).map_err(|_| ApiError(AppError::bad_payload(format!("unknown operation '{op}'"))))?;

    let parsed = multipart::parse(payload, &state.store).await.map_err(ApiError)?;
    let config = validator_config(kind, &state.settings);

    if let Err(e) = shared::validator::validate(&parsed.files, &config, &state.store) {
        return Err(ApiError(e));
    }

    let payload = match build_payload(kind, &parsed) {
        Ok(p) => p,
        Err(e) => {
            for f in &parsed.files {
                state.store.unlink(&f.path);
            }
            return Err(ApiError(e));
        }
    };

    let cleanup_files = parsed.files.iter().map(|f| f.path.clone()).collect();
    let record = state.queue.enqueue(kind, client_key(&req), payload, cleanup_files);

    Ok(HttpResponse::Accepted().json(EnqueueResponse { job_id: record.id }))
}
