use crate::hydration::scripts::SYNC_RUNTIME;
use crate::render::html::{escape_html_attribute, escape_text};

pub const DOCUMENT_TAIL: &str = "</div></body></html>";

const TAILWIND_CDN: &str = "https://cdn.tailwindcss.com";

/// Fixed markup around the render output of a route.
#[derive(Debug, Clone)]
pub struct DocumentEnvelope {
    title: String,
    bundle: String,
}

impl DocumentEnvelope {
    pub fn new(title: impl Into<String>, bundle: impl Into<String>) -> Self {
        Self { title: title.into(), bundle: bundle.into() }
    }

    pub fn bundle(&self) -> &str {
        &self.bundle
    }

    /// Everything up to and including the opening of `#root`.
    pub fn head(&self) -> String {
        format!(
            r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1.0">
<title>{title}</title>
<script src="{TAILWIND_CDN}"></script>
<script>{SYNC_RUNTIME}</script>
<script type="module" async src="/{bundle}"></script>
</head>
<body>
<div id="root">"#,
            title = escape_text(&self.title),
            bundle = escape_html_attribute(&self.bundle),
        )
    }

    pub fn tail(&self) -> &'static str {
        DOCUMENT_TAIL
    }
}

/// Complete replacement document for a render that failed before its shell.
pub fn error_document(message: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head><meta charset="utf-8"><title>Server error</title></head>
<body><h1>500</h1><p>{}</p></body>
</html>"#,
        escape_text(message)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_head_references_bundle_and_runtime() {
        let envelope = DocumentEnvelope::new("Basic", "client-basic.js");
        let head = envelope.head();

        assert!(head.starts_with("<!DOCTYPE html>"));
        assert!(head.contains(r#"<script type="module" async src="/client-basic.js"></script>"#));
        assert!(head.contains("function __syncCache("));
        assert!(head.ends_with(r#"<div id="root">"#));
        assert_eq!(envelope.tail(), "</div></body></html>");
    }

    #[test]
    fn test_error_document_escapes_message() {
        let document = error_document("<oops>");
        assert!(document.contains("&lt;oops&gt;"));
        assert!(document.trim_end().ends_with("</html>"));
    }
}
