//! Literal marker detection.
//!
//! The CSS and JS panes are opt-in: they activate only when the HTML source
//! contains one of two fixed tags, matched as exact substrings. This is not an
//! HTML parser - `<link href="styles.css" rel="stylesheet">` does NOT count.

/// Stylesheet link that activates CSS injection.
pub const STYLE_MARKER: &str = r#"<link rel="stylesheet" href="styles.css">"#;

/// Script tag that activates JS injection.
pub const SCRIPT_MARKER: &str = r#"<script src="script.js"></script>"#;

/// Whether `html` contains the stylesheet marker verbatim.
pub fn has_style_marker(html: &str) -> bool {
    html.contains(STYLE_MARKER)
}

/// Whether `html` contains the script marker verbatim.
pub fn has_script_marker(html: &str) -> bool {
    html.contains(SCRIPT_MARKER)
}

/// Both marker checks for one HTML source.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LinkMarkers {
    pub style: bool,
    pub script: bool,
}

impl LinkMarkers {
    pub fn detect(html: &str) -> Self {
        Self {
            style: has_style_marker(html),
            script: has_script_marker(html),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detects_exact_markers() {
        let html = r#"<head><link rel="stylesheet" href="styles.css"></head>
<body><script src="script.js"></script></body>"#;

        assert!(has_style_marker(html));
        assert!(has_script_marker(html));
        assert_eq!(
            LinkMarkers::detect(html),
            LinkMarkers {
                style: true,
                script: true
            }
        );
    }

    #[test]
    fn test_attribute_order_defeats_detection() {
        assert!(!has_style_marker(r#"<link href="styles.css" rel="stylesheet">"#));
        assert!(!has_style_marker(r#"<link rel="stylesheet" href="styles.css" />"#));
        assert!(!has_script_marker(r#"<script  src="script.js"></script>"#));
        assert!(!has_script_marker(r#"<script src='script.js'></script>"#));
    }

    #[test]
    fn test_plain_document_has_no_markers() {
        let markers = LinkMarkers::detect("<html><head></head><body></body></html>");
        assert_eq!(markers, LinkMarkers::default());
    }
}
