//! Error taxonomy shared by the validator, tool adapter, handlers, and queue.

use thiserror::Error;

/// Machine-readable tag surfaced to clients and recorded on a
/// [`crate::queue::JobRecord`]. Mirrors the error table in the specification
/// one-to-one; keep this enum and that table in sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    UploadTooManyFiles,
    UploadTooLarge,
    UploadInvalidMagic,
    UploadBadType,
    BadPayload,
    PathEscape,
    InvalidPassword,
    RemoteUrlDisabled,
    ToolUnavailable,
    ToolTimeout,
    ToolFailed,
    ToolOutputOverflow,
    RepairFailed,
    JobTimeout,
    RateLimited,
    Internal,
}

impl ErrorCode {
    /// The HTTP status a synchronous caller should see for this code.
    pub fn http_status(self) -> u16 {
        use ErrorCode::*;
        match self {
            UploadTooManyFiles | UploadTooLarge | UploadInvalidMagic | UploadBadType
            | BadPayload | RemoteUrlDisabled | InvalidPassword => 400,
            PathEscape => 403,
            RateLimited => 429,
            ToolUnavailable | ToolTimeout | ToolFailed | ToolOutputOverflow | RepairFailed
            | JobTimeout | Internal => 500,
        }
    }

    pub fn as_str(self) -> &'static str {
        use ErrorCode::*;
        match self {
            UploadTooManyFiles => "UPLOAD_TOO_MANY_FILES",
            UploadTooLarge => "UPLOAD_TOO_LARGE",
            UploadInvalidMagic => "UPLOAD_INVALID_MAGIC",
            UploadBadType => "UPLOAD_BAD_TYPE",
            BadPayload => "BAD_PAYLOAD",
            PathEscape => "PATH_ESCAPE",
            InvalidPassword => "INVALID_PASSWORD",
            RemoteUrlDisabled => "REMOTE_URL_DISABLED",
            ToolUnavailable => "TOOL_UNAVAILABLE",
            ToolTimeout => "TOOL_TIMEOUT",
            ToolFailed => "TOOL_FAILED",
            ToolOutputOverflow => "TOOL_OUTPUT_OVERFLOW",
            RepairFailed => "REPAIR_FAILED",
            JobTimeout => "JOB_TIMEOUT",
            RateLimited => "RATE_LIMITED",
            Internal => "INTERNAL",
        }
    }
}

/// Application-level error carrying a code and an operator message.
///
/// `message` must never contain a raw password or unredacted tool stderr;
/// construct via [`AppError::new`] with an already-sanitized string, or
/// through one of the helpers below.
#[derive(Error, Debug, Clone)]
#[error("{}: {message}", code.as_str())]
pub struct AppError {
    pub code: ErrorCode,
    pub message: String,
}

impl AppError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: redact(&message.into()),
        }
    }

    pub fn bad_payload(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::BadPayload, message)
    }

    pub fn path_escape() -> Self {
        Self::new(ErrorCode::PathEscape, "path resolves outside its allowed root")
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Internal, message)
    }
}

/// Strips anything resembling a password or credential before a message is
/// persisted on a job record or returned to a client. qpdf in particular
/// echoes the offending password back in some stderr variants.
fn redact(input: &str) -> String {
    if input.to_ascii_lowercase().contains("password") {
        "operation failed (password redacted)".to_string()
    } else {
        input.to_string()
    }
}

impl From<std::io::Error> for AppError {
    fn from(e: std::io::Error) -> Self {
        AppError::internal(e.to_string())
    }
}

/// Convenience alias for results that use [`AppError`].
pub type Result<T> = std::result::Result<T, AppError>;
