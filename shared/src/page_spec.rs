//! Parser for the page-spec mini-language used by remove-pages, rotate, crop,
//! and split (range mode): a comma-separated list of tokens, each either a
//! positive integer `n` or a range `a-b` with `1 <= a <= b`.

use crate::error::AppError;

/// Parses `spec` against a document of `total_pages` pages.
///
/// Out-of-range pages are silently clipped to `1..=total_pages`. Whitespace
/// around tokens is ignored. Duplicates collapse. The result is a
/// deterministic sorted set of 1-based page indices. An empty spec, or one
/// whose tokens are all out of range, fails with [`crate::error::ErrorCode::BadPayload`].
pub fn parse(spec: &str, total_pages: u32) -> Result<Vec<u32>, AppError> {
    let mut pages = std::collections::BTreeSet::new();
    let mut saw_token = false;

    for raw_token in spec.split(',') {
        let token = raw_token.trim();
        if token.is_empty() {
            continue;
        }
        saw_token = true;

        if let Some((a, b)) = token.split_once('-') {
            let a: u32 = a
                .trim()
                .parse()
                .map_err(|_| AppError::bad_payload(format!("invalid page range '{token}'")))?;
            let b: u32 = b
                .trim()
                .parse()
                .map_err(|_| AppError::bad_payload(format!("invalid page range '{token}'")))?;
            if a < 1 || a > b {
                return Err(AppError::bad_payload(format!("invalid page range '{token}'")));
            }
            for p in a..=b {
                if p <= total_pages {
                    pages.insert(p);
                }
            }
        } else {
            let n: u32 = token
                .parse()
                .map_err(|_| AppError::bad_payload(format!("invalid page token '{token}'")))?;
            if n < 1 {
                return Err(AppError::bad_payload(format!("invalid page token '{token}'")));
            }
            if n <= total_pages {
                pages.insert(n);
            }
        }
    }

    if !saw_token {
        return Err(AppError::bad_payload("page spec is empty"));
    }

    Ok(pages.into_iter().collect())
}

/// Renders a sorted, deduplicated page set back into a canonical spec string,
/// collapsing runs into ranges. Used only to prove the parser's idempotence
/// (`parse(format(parse(s))) == parse(s)`); not exposed over HTTP.
pub fn format(pages: &[u32]) -> String {
    if pages.is_empty() {
        return String::new();
    }
    let mut parts = Vec::new();
    let mut start = pages[0];
    let mut prev = pages[0];
    for &p in &pages[1..] {
        if p == prev + 1 {
            prev = p;
            continue;
        }
        parts.push(render_run(start, prev));
        start = p;
        prev = p;
    }
    parts.push(render_run(start, prev));
    parts.join(",")
}

fn render_run(start: u32, end: u32) -> String {
    if start == end {
        start.to_string()
    } else {
        format!("{start}-{end}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_mixed_tokens() {
        assert_eq!(parse("1-3,5,8-10", 20).unwrap(), vec![1, 2, 3, 5, 8, 9, 10]);
    }

    #[test]
    fn ignores_whitespace() {
        assert_eq!(parse(" 1 , 2-3 , 5 ", 10).unwrap(), vec![1, 2, 3, 5]);
    }

    #[test]
    fn collapses_duplicates() {
        assert_eq!(parse("1,1,2,2-3", 10).unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn clips_out_of_range() {
        assert_eq!(parse("1,50,2-100", 5).unwrap(), vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn empty_spec_is_bad_payload() {
        assert!(parse("", 10).is_err());
        assert!(parse("   ", 10).is_err());
        assert!(parse(",,,", 10).is_err());
    }

    #[test]
    fn invalid_range_order_is_bad_payload() {
        assert!(parse("5-2", 10).is_err());
    }

    #[test]
    fn non_numeric_token_is_bad_payload() {
        assert!(parse("abc", 10).is_err());
    }

    #[test]
    fn zero_is_rejected() {
        assert!(parse("0", 10).is_err());
    }

    #[test]
    fn parser_is_idempotent() {
        for spec in ["1-3,5,8-10", "1,2,3,4,5", "7", "2-2,4-4"] {
            let first = parse(spec, 50).unwrap();
            let rendered = format(&first);
            let second = parse(&rendered, 50).unwrap();
            assert_eq!(first, second);
        }
    }

    #[test]
    fn all_out_of_range_still_parses_to_empty_set_not_error() {
        // Spec: "Out-of-range pages (> total) are silently clipped." Only a
        // syntactically empty spec is BAD_PAYLOAD; a spec whose every token
        // clips away yields an empty (but Ok) set, and callers that require a
        // non-empty result (remove-pages) enforce that themselves.
        assert_eq!(parse("99,100", 5).unwrap(), Vec::<u32>::new());
    }
}
