use crate::adapter::browser;
use crate::adapter::RENDER_DEADLINE;
use crate::dto::{CvGeneratePayload, HandlerOutput};
use crate::error::AppError;

fn esc(s: &str) -> String {
    html_escape::encode_text(s).into_owned()
}

/// Builds the CV's HTML document, escaping every user-controlled field so a
/// payload like `<script>alert(1)</script>` in, say, `summary` lands as
/// inert text in the rendered page rather than executing.
fn render_template(cv: &CvGeneratePayload) -> String {
    let mut experience = String::new();
    for exp in &cv.experience {
        experience.push_str(&format!(
            "<section class=\"entry\"><h3>{}</h3><p class=\"meta\">{} &middot; {}</p><p>{}</p></section>",
            esc(&exp.title),
            esc(&exp.company),
            esc(&exp.period),
            esc(&exp.description),
        ));
    }

    let mut education = String::new();
    for edu in &cv.education {
        education.push_str(&format!(
            "<section class=\"entry\"><h3>{}</h3><p class=\"meta\">{} &middot; {}</p></section>",
            esc(&edu.degree),
            esc(&edu.school),
            esc(&edu.period),
        ));
    }

    let skills = cv
        .skills
        .iter()
        .map(|s| format!("<li>{}</li>", esc(s)))
        .collect::<String>();

    let contact_line = [cv.phone.as_deref(), cv.location.as_deref()]
        .into_iter()
        .flatten()
        .map(esc)
        .collect::<Vec<_>>()
        .join(" &middot; ");

    let summary = cv.summary.as_deref().map(esc).unwrap_or_default();

    format!(
        "<!doctype html><html lang=\"{lang}\"><head><meta charset=\"utf-8\"><title>{name}</title></head><body>\
<header><h1>{name}</h1><p>{email}{contact}</p></header>\
<section><h2>Summary</h2><p>{summary}</p></section>\
<section><h2>Experience</h2>{experience}</section>\
<section><h2>Education</h2>{education}</section>\
<section><h2>Skills</h2><ul>{skills}</ul></section>\
</body></html>",
        lang = esc(&cv.language),
        name = esc(&cv.full_name),
        email = esc(&cv.email),
        contact = if contact_line.is_empty() {
            String::new()
        } else {
            format!(" &middot; {contact_line}")
        },
        summary = summary,
        experience = experience,
        education = education,
        skills = skills,
    )
}

pub async fn run(cv: &CvGeneratePayload) -> Result<HandlerOutput, AppError> {
    if cv.full_name.trim().is_empty() {
        return Err(AppError::bad_payload("full_name must not be empty"));
    }
    if cv.email.trim().is_empty() {
        return Err(AppError::bad_payload("email must not be empty"));
    }
    let html = render_template(cv);
    let bytes = browser::render_html_to_pdf(&html, RENDER_DEADLINE).await?;
    Ok(HandlerOutput::SingleFile { bytes, ext: "pdf" })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload_with_script_tags() -> CvGeneratePayload {
        CvGeneratePayload {
            full_name: "<script>alert(1)</script>".to_string(),
            email: "a@b.com".to_string(),
            phone: None,
            location: Some("<img src=x onerror=alert(1)>".to_string()),
            summary: Some("<script>alert('summary')</script>".to_string()),
            experience: vec![crate::dto::CvExperience {
                title: "<script>alert('title')</script>".to_string(),
                company: "Acme".to_string(),
                period: "2020-2021".to_string(),
                description: "<script>alert('desc')</script>".to_string(),
            }],
            education: vec![],
            skills: vec!["<script>alert('skill')</script>".to_string()],
            language: "en".to_string(),
        }
    }

    #[test]
    fn escapes_script_tags_in_every_field() {
        let html = render_template(&payload_with_script_tags());
        assert!(!html.contains("<script>"), "raw script tag leaked into output: {html}");
        assert!(html.contains("&lt;script&gt;"), "expected an escaped script tag");
        assert!(!html.contains("onerror=alert"), "raw event handler leaked into output: {html}");
    }
}
