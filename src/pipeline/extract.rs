//! URL extraction: find `<img src="…">` references in a JSON document.
//!
//! Only top-level string elements are scanned: the documents this tool
//! migrates are flat arrays of HTML fragments interleaved with numbers and
//! small objects, and the rewrite step touches exactly the same strings.
//! Malformed fragments simply don't match; extraction never fails.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

/// `<img …src="URL"…>`, case-insensitive, either quote style, any attributes
/// around `src`. The greedy `[^>]*` before `src` picks the last `src` in a tag.
static RE_IMG_SRC: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)<img\s+[^>]*src\s*=\s*["']([^"']+)["'][^>]*>"#).unwrap()
});

/// An `<img src>` reference found in a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRef {
    /// The attribute value exactly as written; rewrite keys on this.
    pub src: String,
    /// Where to fetch it from: `src` with `//host/…` resolved to `https:`.
    pub url: String,
}

/// Return every image reference in document order. Duplicates are kept.
pub fn extract_image_refs(document: &Value) -> Vec<ImageRef> {
    string_elements(document).flat_map(refs_from_html).collect()
}

/// Return every image URL in document order. Duplicates are kept.
///
/// Protocol-relative URLs (`//host/a.png`) are normalised to `https:`.
pub fn extract_image_urls(document: &Value) -> Vec<String> {
    extract_image_refs(document)
        .into_iter()
        .map(|r| r.url)
        .collect()
}

/// Extract image URLs from a single HTML fragment.
pub fn extract_from_html(html: &str) -> Vec<String> {
    refs_from_html(html).into_iter().map(|r| r.url).collect()
}

fn refs_from_html(html: &str) -> Vec<ImageRef> {
    RE_IMG_SRC
        .captures_iter(html)
        .map(|caps| ImageRef {
            src: caps[1].to_string(),
            url: normalise_url(&caps[1]),
        })
        .collect()
}

/// Top-level strings of the document: the elements of an array, or the
/// document itself when it is a bare string.
pub(crate) fn string_elements(document: &Value) -> Box<dyn Iterator<Item = &str> + '_> {
    match document {
        Value::Array(items) => Box::new(items.iter().filter_map(Value::as_str)),
        Value::String(s) => Box::new(std::iter::once(s.as_str())),
        _ => Box::new(std::iter::empty()),
    }
}

fn normalise_url(url: &str) -> String {
    if url.starts_with("//") {
        format!("https:{url}")
    } else {
        url.to_string()
    }
}
