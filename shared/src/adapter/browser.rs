//! Headless-Chrome rendering via `chromiumoxide`, the CDP automation crate
//! the retrieval pack's `monokrome-foiacquire` pulls in for the same job
//! (`browser` feature, `tokio-runtime`). Every request the page issues while
//! rendering is intercepted through the CDP `Fetch` domain and failed unless
//! its scheme is in the allow-list — the mechanism behind `from-html`'s and
//! `cv-generate`'s `REMOTE_URL_DISABLED` guarantee.

use std::time::Duration;

use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::fetch::{
    ContinueRequestParams, EnableParams, EventRequestPaused, FailRequestParams, ErrorReason, RequestPattern,
};
use chromiumoxide::cdp::browser_protocol::page::PrintToPdfParams;
use futures::StreamExt;

use crate::error::{AppError, ErrorCode};

const ALLOWED_SCHEMES: &[&str] = &["data:", "blob:", "about:", "file:"];

fn scheme_allowed(url: &str) -> bool {
    ALLOWED_SCHEMES.iter().any(|scheme| url.starts_with(scheme))
}

/// Renders `html` to a PDF with every non-local-scheme network request
/// aborted, bounded by `deadline` end to end (browser launch + navigation +
/// network-idle wait + print).
pub async fn render_html_to_pdf(html: &str, deadline: Duration) -> Result<Vec<u8>, AppError> {
    tokio::time::timeout(deadline, render_inner(html))
        .await
        .map_err(|_| AppError::new(ErrorCode::ToolTimeout, "browser render exceeded its deadline"))?
}

async fn render_inner(html: &str) -> Result<Vec<u8>, AppError> {
    let config = chromium_config()?;
    let (mut browser, mut handler) = Browser::launch(config)
        .await
        .map_err(|e| AppError::new(ErrorCode::ToolUnavailable, format!("failed to launch browser: {e}")))?;

    let handler_task = tokio::spawn(async move { while handler.next().await.is_some() {} });

    let result = render_with_browser(&mut browser, html).await;

    let _ = browser.close().await;
    handler_task.abort();
    result
}

async fn render_with_browser(browser: &mut Browser, html: &str) -> Result<Vec<u8>, AppError> {
    let page = browser
        .new_page("about:blank")
        .await
        .map_err(|e| AppError::internal(format!("failed to open page: {e}")))?;

    page.execute(EnableParams {
        patterns: Some(vec![RequestPattern::default()]),
        handle_auth_requests: None,
    })
    .await
    .map_err(|e| AppError::internal(format!("failed to enable request interception: {e}")))?;

    let mut events = page
        .event_listener::<EventRequestPaused>()
        .await
        .map_err(|e| AppError::internal(e.to_string()))?;
    let page_for_filter = page.clone();
    tokio::spawn(async move {
        while let Some(event) = events.next().await {
            let allowed = scheme_allowed(&event.request.url);
            let outcome = if allowed {
                page_for_filter
                    .execute(ContinueRequestParams::new(event.request_id.clone()))
                    .await
                    .map(|_| ())
            } else {
                page_for_filter
                    .execute(FailRequestParams::new(event.request_id.clone(), ErrorReason::BlockedByClient))
                    .await
                    .map(|_| ())
            };
            if let Err(err) = outcome {
                tracing::warn!(error = %err, allowed, "failed to resolve intercepted request");
            }
        }
    });

    let data_url = format!("data:text/html;charset=utf-8,{}", urlencode(html));
    page.goto(data_url)
        .await
        .map_err(|e| AppError::internal(format!("failed to navigate: {e}")))?;
    page.wait_for_navigation()
        .await
        .map_err(|e| AppError::internal(format!("navigation did not settle: {e}")))?;

    let pdf = page
        .pdf(PrintToPdfParams::default())
        .await
        .map_err(|e| AppError::new(ErrorCode::ToolFailed, format!("print to pdf failed: {e}")))?;
    Ok(pdf)
}

fn chromium_config() -> Result<BrowserConfig, AppError> {
    let mut builder = BrowserConfig::builder().args(vec!["--disable-gpu", "--no-sandbox"]);
    if let Some(path) = chromium_path() {
        builder = builder.chrome_executable(path);
    }
    builder
        .build()
        .map_err(|e| AppError::new(ErrorCode::ToolUnavailable, format!("invalid browser configuration: {e}")))
}

fn chromium_path() -> Option<String> {
    std::env::var("CHROMIUM_PATH").ok().filter(|s| !s.is_empty())
}

fn urlencode(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for byte in input.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => out.push(byte as char),
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allows_only_local_schemes() {
        assert!(scheme_allowed("data:text/html,hi"));
        assert!(scheme_allowed("blob:abc"));
        assert!(scheme_allowed("about:blank"));
        assert!(scheme_allowed("file:///tmp/x"));
        assert!(!scheme_allowed("https://evil.example/x"));
        assert!(!scheme_allowed("http://evil.example/x"));
    }

    #[test]
    fn urlencode_escapes_reserved_characters() {
        assert_eq!(urlencode("<script>"), "%3Cscript%3E");
        assert_eq!(urlencode("a b"), "a%20b");
    }
}
