//! Job kinds, their typed payloads, and the HTTP request/response shapes the
//! server crate serializes at the edge.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The closed set of job kinds the pipeline understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum JobKind {
    Merge,
    Split,
    Compress,
    Protect,
    Unlock,
    RemovePages,
    Rotate,
    Organize,
    Crop,
    ToWord,
    ToExcel,
    ToPpt,
    FromWord,
    FromExcel,
    FromPpt,
    FromHtml,
    Repair,
    Watermark,
    CvGenerate,
}

impl JobKind {
    pub fn as_str(self) -> &'static str {
        use JobKind::*;
        match self {
            Merge => "merge",
            Split => "split",
            Compress => "compress",
            Protect => "protect",
            Unlock => "unlock",
            RemovePages => "remove-pages",
            Rotate => "rotate",
            Organize => "organize",
            Crop => "crop",
            ToWord => "to-word",
            ToExcel => "to-excel",
            ToPpt => "to-ppt",
            FromWord => "from-word",
            FromExcel => "from-excel",
            FromPpt => "from-ppt",
            FromHtml => "from-html",
            Repair => "repair",
            Watermark => "watermark",
            CvGenerate => "cv-generate",
        }
    }
}

impl FromStr for JobKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        use JobKind::*;
        Ok(match s {
            "merge" => Merge,
            "split" => Split,
            "compress" => Compress,
            "protect" => Protect,
            "unlock" => Unlock,
            "remove-pages" => RemovePages,
            "rotate" => Rotate,
            "organize" => Organize,
            "crop" => Crop,
            "to-word" => ToWord,
            "to-excel" => ToExcel,
            "to-ppt" => ToPpt,
            "from-word" => FromWord,
            "from-excel" => FromExcel,
            "from-ppt" => FromPpt,
            "from-html" => FromHtml,
            "repair" => Repair,
            "watermark" => Watermark,
            "cv-generate" => CvGenerate,
            _ => return Err(()),
        })
    }
}

/// Lifecycle status of a [`crate::queue::JobRecord`]. Transitions are
/// monotonic: `Queued -> Running -> {Succeeded, Failed, Cancelled}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

/// A quality preset name accepted by `compress`, mapped by the rasterizer
/// adapter onto tool-specific arguments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompressPreset {
    Smallest,
    Balanced,
    High,
}

/// Margin unit accepted by `crop`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarginUnit {
    Points,
    Percent,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CropMargins {
    pub unit: MarginUnit,
    pub top: f32,
    pub bottom: f32,
    pub left: f32,
    pub right: f32,
}

/// One of the three repair strategies named in the specification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepairMethod {
    Quick,
    Deep,
    Auto,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatermarkOptions {
    pub text: String,
    #[serde(default = "default_opacity")]
    pub opacity: f32,
    #[serde(default)]
    pub position: WatermarkPosition,
}

fn default_opacity() -> f32 {
    0.3
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum WatermarkPosition {
    #[default]
    Center,
    TopLeft,
    TopRight,
    BottomLeft,
    BottomRight,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CvExperience {
    pub title: String,
    pub company: String,
    pub period: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CvEducation {
    pub degree: String,
    pub school: String,
    pub period: String,
}

/// JSON body of `POST /cv/generate`, per the specification's external
/// interfaces section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CvGeneratePayload {
    pub full_name: String,
    pub email: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub experience: Vec<CvExperience>,
    #[serde(default)]
    pub education: Vec<CvEducation>,
    #[serde(default)]
    pub skills: Vec<String>,
    pub language: String,
}

/// The tagged variant carrying each job kind's typed payload, keyed on
/// [`JobKind`]. File-bearing fields hold paths already materialized under the
/// uploads root by the enqueue handler, never raw bytes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum JobPayload {
    Merge {
        input_paths: Vec<String>,
    },
    Split {
        input_path: String,
        page_spec: String,
    },
    Compress {
        input_path: String,
        preset: CompressPreset,
    },
    Protect {
        input_path: String,
        password: String,
    },
    Unlock {
        input_path: String,
        password: String,
    },
    RemovePages {
        input_path: String,
        page_spec: String,
    },
    Rotate {
        input_path: String,
        page_spec: Option<String>,
        degrees: i32,
    },
    Organize {
        input_path: String,
        order: Vec<u32>,
    },
    Crop {
        input_path: String,
        margins: CropMargins,
    },
    ToWord {
        input_path: String,
    },
    ToExcel {
        input_path: String,
    },
    ToPpt {
        input_path: String,
    },
    FromWord {
        input_path: String,
    },
    FromExcel {
        input_path: String,
    },
    FromPpt {
        input_path: String,
    },
    FromHtml {
        html: String,
    },
    Repair {
        input_path: String,
        method: RepairMethod,
    },
    Watermark {
        input_path: String,
        options: WatermarkOptions,
    },
    CvGenerate {
        cv: CvGeneratePayload,
    },
}

impl JobPayload {
    pub fn kind(&self) -> JobKind {
        match self {
            JobPayload::Merge { .. } => JobKind::Merge,
            JobPayload::Split { .. } => JobKind::Split,
            JobPayload::Compress { .. } => JobKind::Compress,
            JobPayload::Protect { .. } => JobKind::Protect,
            JobPayload::Unlock { .. } => JobKind::Unlock,
            JobPayload::RemovePages { .. } => JobKind::RemovePages,
            JobPayload::Rotate { .. } => JobKind::Rotate,
            JobPayload::Organize { .. } => JobKind::Organize,
            JobPayload::Crop { .. } => JobKind::Crop,
            JobPayload::ToWord { .. } => JobKind::ToWord,
            JobPayload::ToExcel { .. } => JobKind::ToExcel,
            JobPayload::ToPpt { .. } => JobKind::ToPpt,
            JobPayload::FromWord { .. } => JobKind::FromWord,
            JobPayload::FromExcel { .. } => JobKind::FromExcel,
            JobPayload::FromPpt { .. } => JobKind::FromPpt,
            JobPayload::FromHtml { .. } => JobKind::FromHtml,
            JobPayload::Repair { .. } => JobKind::Repair,
            JobPayload::Watermark { .. } => JobKind::Watermark,
            JobPayload::CvGenerate { .. } => JobKind::CvGenerate,
        }
    }

    /// Every input path this payload references, so the queue can resolve
    /// them against the uploads root before handing off to a handler.
    pub fn input_paths(&self) -> Vec<&str> {
        match self {
            JobPayload::Merge { input_paths } => input_paths.iter().map(String::as_str).collect(),
            JobPayload::Split { input_path, .. }
            | JobPayload::Compress { input_path, .. }
            | JobPayload::Protect { input_path, .. }
            | JobPayload::Unlock { input_path, .. }
            | JobPayload::RemovePages { input_path, .. }
            | JobPayload::Rotate { input_path, .. }
            | JobPayload::Organize { input_path, .. }
            | JobPayload::Crop { input_path, .. }
            | JobPayload::ToWord { input_path }
            | JobPayload::ToExcel { input_path }
            | JobPayload::ToPpt { input_path }
            | JobPayload::FromWord { input_path }
            | JobPayload::FromExcel { input_path }
            | JobPayload::FromPpt { input_path }
            | JobPayload::Repair { input_path, .. }
            | JobPayload::Watermark { input_path, .. } => vec![input_path.as_str()],
            JobPayload::FromHtml { .. } | JobPayload::CvGenerate { .. } => vec![],
        }
    }
}

/// A successful handler result: either one artifact or a set of them (zipped
/// by the worker before the record is marked succeeded).
#[derive(Debug, Clone)]
pub enum HandlerOutput {
    SingleFile { bytes: Vec<u8>, ext: &'static str },
    MultiFile { files: Vec<(String, Vec<u8>)> },
}

// ---- HTTP surface DTOs -----------------------------------------------------

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnqueueResponse {
    pub job_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatusResponse {
    pub status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub download_url: Option<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<chrono::DateTime<chrono::Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<chrono::DateTime<chrono::Utc>>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub provider: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_kind_round_trips_through_str() {
        for kind in [
            JobKind::Merge,
            JobKind::Split,
            JobKind::Compress,
            JobKind::Protect,
            JobKind::Unlock,
            JobKind::RemovePages,
            JobKind::Rotate,
            JobKind::Organize,
            JobKind::Crop,
            JobKind::ToWord,
            JobKind::ToExcel,
            JobKind::ToPpt,
            JobKind::FromWord,
            JobKind::FromExcel,
            JobKind::FromPpt,
            JobKind::FromHtml,
            JobKind::Repair,
            JobKind::Watermark,
            JobKind::CvGenerate,
        ] {
            let s = kind.as_str();
            assert_eq!(JobKind::from_str(s).unwrap(), kind);
        }
    }

    #[test]
    fn payload_kind_matches_variant() {
        let p = JobPayload::Merge {
            input_paths: vec!["a".into(), "b".into()],
        };
        assert_eq!(p.kind(), JobKind::Merge);
        assert_eq!(p.input_paths(), vec!["a", "b"]);
    }
}
