//! Script extraction from HTML test files.
//!
//! Produces one entry per `<script>` tag in document order. Tags with no
//! text content (src-only references) still contribute an empty entry so
//! the count matches the tag count exactly — injection later relies on
//! positional correspondence.

use crate::markup::{Document, MarkupError};

/// Extract the text content of every `<script>` element, in document order.
///
/// Pure function of its input; re-invocable per file with no shared state.
pub fn extract_scripts(html: &str) -> Result<Vec<String>, MarkupError> {
    let doc = Document::parse(html)?;
    Ok(doc
        .find_all(|el| el.name == "script")
        .into_iter()
        .map(|el| el.text())
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"<!DOCTYPE html>
<html>
<head>
<script src="../resources/js-test.js"></script>
</head>
<body>
<script>
description("sample");
shouldBeTrue("true");
</script>
<div><script>var nested = 1;</script></div>
</body>
</html>
"#;

    #[test]
    fn test_one_entry_per_script_tag() {
        let scripts = extract_scripts(SAMPLE).unwrap();
        assert_eq!(scripts.len(), 3);
    }

    #[test]
    fn test_src_only_scripts_are_empty_entries() {
        let scripts = extract_scripts(SAMPLE).unwrap();
        assert_eq!(scripts[0], "");
    }

    #[test]
    fn test_content_preserved_in_document_order() {
        let scripts = extract_scripts(SAMPLE).unwrap();
        assert!(scripts[1].contains(r#"description("sample");"#));
        assert!(scripts[1].contains(r#"shouldBeTrue("true");"#));
        assert_eq!(scripts[2], "var nested = 1;");
    }

    #[test]
    fn test_extraction_is_pure() {
        let first = extract_scripts(SAMPLE).unwrap();
        let second = extract_scripts(SAMPLE).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_no_scripts_yields_empty_sequence() {
        assert!(extract_scripts("<html><body></body></html>").unwrap().is_empty());
    }
}
