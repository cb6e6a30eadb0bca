//! Document composition.
//!
//! Splices the CSS and JS fragments into the HTML fragment at fixed points.
//! Pure: the same inputs always produce byte-identical output.

use crate::instrument::instrument;
use crate::markers::LinkMarkers;

/// Substituted for an empty HTML source so the preview never loads `""`.
pub const FALLBACK_DOCUMENT: &str =
    r#"<!doctype html><meta charset="utf-8"><title>Empty</title><p>No content.</p>"#;

/// Compose one HTML document from the three fragments.
///
/// CSS is inlined as a `<style>` block before the first `</head>` (or
/// prepended when there is none); JS is instrumented and inserted before the
/// first `</body>` (or appended). Each only happens when its marker flag is
/// set and its text is not blank.
pub fn compose(
    html: &str,
    css: &str,
    js: &str,
    has_style_marker: bool,
    has_script_marker: bool,
) -> String {
    let html = if html.is_empty() { FALLBACK_DOCUMENT } else { html };

    let style_block = if has_style_marker && !css.trim().is_empty() {
        format!("<style>{css}</style>")
    } else {
        String::new()
    };

    let script_block = if has_script_marker && !js.trim().is_empty() {
        instrument(js)
    } else {
        String::new()
    };

    let styled = insert_before(html, "</head>", &style_block, Placement::Prepend);
    insert_before(&styled, "</body>", &script_block, Placement::Append)
}

/// [`compose`] with marker flags detected from `html` itself.
pub fn compose_sources(html: &str, css: &str, js: &str) -> String {
    let markers = LinkMarkers::detect(html);
    compose(html, css, js, markers.style, markers.script)
}

enum Placement {
    Prepend,
    Append,
}

/// Insert `block` right before the first `anchor`, or at `fallback` when absent.
fn insert_before(document: &str, anchor: &str, block: &str, fallback: Placement) -> String {
    if block.is_empty() {
        return document.to_string();
    }

    let mut out = String::with_capacity(document.len() + block.len());
    match (document.find(anchor), fallback) {
        (Some(at), _) => {
            out.push_str(&document[..at]);
            out.push_str(block);
            out.push_str(&document[at..]);
        }
        (None, Placement::Prepend) => {
            out.push_str(block);
            out.push_str(document);
        }
        (None, Placement::Append) => {
            out.push_str(document);
            out.push_str(block);
        }
    }
    out
}
