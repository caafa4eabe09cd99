use crate::adapter::browser;
use crate::adapter::RENDER_DEADLINE;
use crate::dto::HandlerOutput;
use crate::error::{AppError, ErrorCode};

/// A crude but sufficient "is this a remote fetch, not inline markup"
/// heuristic: an `http(s)://` string with no tag content is a bare URL, the
/// thing this handler refuses per the spec's safe default. Anything with a
/// `<` is treated as HTML even if it happens to mention a URL.
fn looks_like_remote_url(html: &str) -> bool {
    let trimmed = html.trim();
    (trimmed.starts_with("http://") || trimmed.starts_with("https://")) && !trimmed.contains('<')
}

pub async fn run(html: &str) -> Result<HandlerOutput, AppError> {
    if html.trim().is_empty() {
        return Err(AppError::bad_payload("html must not be empty"));
    }
    if looks_like_remote_url(html) {
        return Err(AppError::new(
            ErrorCode::RemoteUrlDisabled,
            "from-html only accepts inline markup, not a remote URL",
        ));
    }
    let bytes = browser::render_html_to_pdf(html, RENDER_DEADLINE).await?;
    Ok(HandlerOutput::SingleFile { bytes, ext: "pdf" })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_url_is_flagged_as_remote() {
        assert!(looks_like_remote_url("https://example.com/report"));
        assert!(looks_like_remote_url("  http://example.com  "));
    }

    #[test]
    fn markup_mentioning_a_url_is_not_flagged() {
        assert!(!looks_like_remote_url("<a href=\"https://example.com\">link</a>"));
        assert!(!looks_like_remote_url("<h1>Report</h1>"));
    }
}
