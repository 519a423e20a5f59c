//! Re-injection of rewritten scripts into the original HTML document.
//!
//! Works on a fresh parse of the original file — no tree state is shared
//! with extraction. Script bodies are replaced by positional index, the
//! js-test.js harness reference is migrated to testharness.js (with the
//! report script reference spliced in after it), and a `<title>` element
//! is inserted when the document lacks one. Everything the injector does
//! not touch serializes byte-identically.

use crate::log;
use crate::markup::{Document, Element, MarkupError, Node};
use thiserror::Error;

/// Legacy harness entry point being migrated away from.
pub const JS_TEST: &str = "js-test.js";
/// Target harness entry point.
pub const TEST_HARNESS: &str = "testharness.js";
/// Companion reporting script, always referenced right after the harness.
pub const TEST_HARNESS_REPORT: &str = "testharnessreport.js";
/// Optional garbage-collection helper script.
pub const GC_HELPER: &str = "gc.js";

/// Injection errors, fatal for the containing file.
#[derive(Debug, Error)]
pub enum InjectError {
    #[error(transparent)]
    Markup(#[from] MarkupError),

    /// The file qualified for transformation but no js-test.js reference
    /// was actually rewritten. The transformation must have a verified
    /// effect, so this is fatal.
    #[error("no <script src=...{JS_TEST}> reference found to migrate")]
    MissingHarnessReference,

    #[error("document has {found} script tags but {expected} rewritten scripts were supplied")]
    ScriptCountMismatch { found: usize, expected: usize },
}

/// Inject rewritten scripts and metadata into the original HTML text.
///
/// `scripts` must have exactly one entry per `<script>` tag, in document
/// order, with empty strings for src-only tags. Returns the final HTML.
pub fn inject_scripts(
    original_html: &str,
    scripts: &[String],
    title: &str,
    gc_helper: bool,
) -> Result<String, InjectError> {
    let mut doc = Document::parse(original_html)?;

    replace_script_bodies(&mut doc, scripts)?;
    migrate_harness_references(&mut doc, gc_helper)?;
    insert_title(&mut doc, title);

    Ok(doc.serialize())
}

/// Replace the body of the Nth script node that has text content with the
/// Nth rewritten entry. Src-only tags keep their position in the counter
/// but nothing is substituted for them. A script whose rewritten body is
/// empty (everything in it was deleted) is emptied, not left alone.
fn replace_script_bodies(doc: &mut Document, scripts: &[String]) -> Result<(), InjectError> {
    let mut index = 0usize;
    doc.for_each_element_mut(|el| {
        if el.name != "script" {
            return;
        }
        if let Some(body) = scripts.get(index)
            && !el.text().is_empty()
        {
            if body.is_empty() {
                el.set_text("");
            } else {
                el.set_text(&pad_with_newlines(body));
            }
        }
        index += 1;
    });

    if index != scripts.len() {
        return Err(InjectError::ScriptCountMismatch {
            found: index,
            expected: scripts.len(),
        });
    }
    Ok(())
}

/// Newline-pad a script body so it never abuts the surrounding tags.
fn pad_with_newlines(body: &str) -> String {
    let mut out = String::with_capacity(body.len() + 2);
    if !body.starts_with('\n') {
        out.push('\n');
    }
    out.push_str(body);
    if !out.ends_with('\n') {
        out.push('\n');
    }
    out
}

/// Rewrite the first js-test.js src reference to testharness.js and splice
/// in the testharnessreport.js reference after it (plus the gc helper when
/// requested). Returns the migrated harness src.
fn migrate_harness_references(
    doc: &mut Document,
    gc_helper: bool,
) -> Result<String, InjectError> {
    let mut harness_src: Option<String> = None;
    doc.for_each_element_mut(|el| {
        if harness_src.is_some() || el.name != "script" {
            return;
        }
        if let Some(src) = el.attr("src")
            && src.ends_with(JS_TEST)
        {
            let migrated = format!("{}{}", &src[..src.len() - JS_TEST.len()], TEST_HARNESS);
            el.rewrite_attr_value("src", &migrated);
            harness_src = Some(migrated);
        }
    });
    let harness_src = harness_src.ok_or(InjectError::MissingHarnessReference)?;

    let prefix = &harness_src[..harness_src.len() - TEST_HARNESS.len()];
    let report_src = format!("{prefix}{TEST_HARNESS_REPORT}");
    doc.insert_after(
        |el| el.name == "script" && el.attr("src") == Some(harness_src.as_str()),
        Node::Element(Element::new("script").with_attr("src", &report_src)),
    );

    if gc_helper {
        let gc_src = format!("{prefix}{GC_HELPER}");
        doc.insert_after(
            |el| el.name == "script" && el.attr("src") == Some(report_src.as_str()),
            Node::Element(Element::new("script").with_attr("src", &gc_src)),
        );
    }

    Ok(harness_src)
}

/// Insert a `<title>` with the harvested description, unless one exists.
///
/// Anchor preference: first child of `<head>`, first child of `<html>`,
/// after the doctype, start of the document. The surrounding whitespace
/// follows the indentation found at the chosen anchor.
fn insert_title(doc: &mut Document, title: &str) {
    if doc.has_element("title") {
        log!("inject"; "document already has a <title>, keeping it");
        return;
    }
    let make = || Node::Element(Element::new("title").with_text(title));
    if !doc.insert_first_child("head", make())
        && !doc.insert_first_child("html", make())
        && !doc.insert_after_doctype(make())
    {
        doc.insert_at_start(make());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::extract_scripts;

    const SAMPLE: &str = r#"<!DOCTYPE html>
<html>
<head>
  <script src="../resources/js-test.js"></script>
</head>
<body>
<script>
shouldBeTrue("true");
</script>
</body>
</html>
"#;

    fn scripts_for(doc: &str, bodies: &[&str]) -> Vec<String> {
        let count = extract_scripts(doc).unwrap().len();
        assert_eq!(count, bodies.len());
        bodies.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_body_replacement_by_position() {
        let scripts = scripts_for(SAMPLE, &["", "assert_true(true);"]);
        let html = inject_scripts(SAMPLE, &scripts, "t", false).unwrap();
        assert!(html.contains("<script>\nassert_true(true);\n</script>"));
        assert!(!html.contains("shouldBeTrue"));
    }

    #[test]
    fn test_empty_rewritten_body_clears_legacy_text() {
        // A script can rewrite to nothing at all; the old body must not
        // survive in the output.
        let scripts = scripts_for(SAMPLE, &["", ""]);
        let html = inject_scripts(SAMPLE, &scripts, "t", false).unwrap();
        assert!(!html.contains("shouldBeTrue"));
        assert!(html.contains("<script></script>"));
    }

    #[test]
    fn test_round_trip_reextracts_rewritten_scripts() {
        let scripts = scripts_for(SAMPLE, &["", "assert_true(true);"]);
        let html = inject_scripts(SAMPLE, &scripts, "t", false).unwrap();
        let reextracted = extract_scripts(&html).unwrap();
        assert_eq!(reextracted.len(), scripts.len());
        assert_eq!(reextracted[0], "");
        assert_eq!(reextracted[1].trim(), scripts[1]);
    }

    #[test]
    fn test_harness_reference_migration_order() {
        let scripts = scripts_for(SAMPLE, &["", "x();"]);
        let html = inject_scripts(SAMPLE, &scripts, "t", false).unwrap();
        assert!(!html.contains(JS_TEST));
        let harness = html.find("../resources/testharness.js\"").unwrap();
        let report = html.find("../resources/testharnessreport.js").unwrap();
        assert!(harness < report);
        // Inserted reference aligns with the original's indentation.
        assert!(html.contains(
            "<script src=\"../resources/testharness.js\"></script>\n  <script src=\"../resources/testharnessreport.js\"></script>"
        ));
    }

    #[test]
    fn test_gc_helper_reference_when_requested() {
        let scripts = scripts_for(SAMPLE, &["", "x();"]);
        let html = inject_scripts(SAMPLE, &scripts, "t", true).unwrap();
        let report = html.find("testharnessreport.js").unwrap();
        let gc = html.find("../resources/gc.js").unwrap();
        assert!(report < gc);
    }

    #[test]
    fn test_missing_harness_reference_is_fatal() {
        let doc = "<html><head></head><body><script>x();</script></body></html>";
        let scripts = scripts_for(doc, &["y();"]);
        assert!(matches!(
            inject_scripts(doc, &scripts, "t", false),
            Err(InjectError::MissingHarnessReference)
        ));
    }

    #[test]
    fn test_script_count_mismatch_is_fatal() {
        let scripts = vec!["x();".to_string()];
        assert!(matches!(
            inject_scripts(SAMPLE, &scripts, "t", false),
            Err(InjectError::ScriptCountMismatch { found: 2, expected: 1 })
        ));
    }

    #[test]
    fn test_title_inserted_into_head() {
        let scripts = scripts_for(SAMPLE, &["", "x();"]);
        let html = inject_scripts(SAMPLE, &scripts, "My title", false).unwrap();
        assert!(html.contains("<head>\n  <title>My title</title>\n  <script"));
    }

    #[test]
    fn test_existing_title_never_overwritten() {
        let doc = r#"<html>
<head>
  <title>original</title>
  <script src="resources/js-test.js"></script>
</head>
<body></body>
</html>
"#;
        let scripts = scripts_for(doc, &[""]);
        let html = inject_scripts(doc, &scripts, "replacement", false).unwrap();
        assert!(html.contains("<title>original</title>"));
        assert!(!html.contains("replacement"));
        assert_eq!(html.matches("<title>").count(), 1);
    }

    #[test]
    fn test_title_insertion_is_idempotent() {
        let scripts = scripts_for(SAMPLE, &["", "x();"]);
        let once = inject_scripts(SAMPLE, &scripts, "t", false).unwrap();
        let mut doc = Document::parse(&once).unwrap();
        insert_title(&mut doc, "t");
        assert_eq!(doc.serialize().matches("<title>").count(), 1);
    }

    #[test]
    fn test_title_falls_back_to_document_start() {
        let doc = r#"<script src="resources/js-test.js"></script>
<script>x();</script>
"#;
        let scripts = scripts_for(doc, &["", "y();"]);
        let html = inject_scripts(doc, &scripts, "bare", false).unwrap();
        assert!(html.starts_with("<title>bare</title>\n"));
    }

    #[test]
    fn test_title_anchor_after_doctype() {
        let doc = "<!DOCTYPE html>\n<script src=\"resources/js-test.js\"></script>\n";
        let scripts = scripts_for(doc, &[""]);
        let html = inject_scripts(doc, &scripts, "t", false).unwrap();
        assert!(html.starts_with("<!DOCTYPE html>\n<title>t</title>\n"));
    }

    #[test]
    fn test_unrelated_markup_untouched() {
        let scripts = scripts_for(SAMPLE, &["", "assert_true(true);"]);
        let html = inject_scripts(SAMPLE, &scripts, "t", false).unwrap();
        assert!(html.contains("<!DOCTYPE html>\n<html>"));
        assert!(html.contains("</body>\n</html>"));
    }
}
