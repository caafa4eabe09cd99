//! Thin wrappers over the external binaries and embedded libraries the
//! handlers drive. `process` is the only place that spawns a child; every
//! other module here either calls into it or works in-process via `lopdf`.

pub mod browser;
pub mod office;
pub mod pdf_engine;
pub mod process;
pub mod rasterizer;
pub mod text_extractor;

use std::time::Duration;

use once_cell::sync::OnceCell;

use crate::error::{AppError, ErrorCode};

/// Resolves the absolute path to an external tool once per process and
/// caches it, mirroring the per-process singleton tool-path discovery called
/// out in the specification's re-architecture notes (a plain
/// `once_cell::sync::OnceCell`, generalized from `text-extraction`'s
/// `Lazy<Regex>` pattern to path lookups). Absence fails the caller with
/// `TOOL_UNAVAILABLE` instead of crashing the process.
pub struct ToolPath {
    cell: OnceCell<Option<String>>,
    candidates: &'static [&'static str],
}

impl ToolPath {
    pub const fn new(candidates: &'static [&'static str]) -> Self {
        Self {
            cell: OnceCell::new(),
            candidates,
        }
    }

    pub fn resolve(&self) -> Result<&str, AppError> {
        let resolved = self.cell.get_or_init(|| {
            self.candidates.iter().find(|bin| which_bin(bin)).map(|s| s.to_string())
        });
        resolved.as_deref().ok_or_else(|| {
            AppError::new(
                ErrorCode::ToolUnavailable,
                format!("none of {:?} is installed", self.candidates),
            )
        })
    }
}

fn which_bin(bin: &str) -> bool {
    std::process::Command::new(bin)
        .arg("--version")
        .stdin(std::process::Stdio::null())
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .status()
        .map(|_| true)
        .unwrap_or(false)
}

/// Default per-tool-invocation deadlines, chosen so each handler's chain of
/// invocations stays strictly under the per-job deadline (5 min default).
pub const COMPRESS_DEADLINE: Duration = Duration::from_secs(600);
pub const RENDER_DEADLINE: Duration = Duration::from_secs(30);
pub const REPAIR_ATTEMPT_DEADLINE: Duration = Duration::from_secs(120);
pub const OFFICE_CONVERT_DEADLINE: Duration = Duration::from_secs(180);
pub const QPDF_DEADLINE: Duration = Duration::from_secs(60);
pub const EXTRACT_DEADLINE: Duration = Duration::from_secs(60);

pub const MAX_TOOL_OUTPUT_BYTES: usize = 16 * 1024 * 1024;
