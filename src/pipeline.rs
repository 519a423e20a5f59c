//! Per-file transformation pipeline and batch reporting.
//!
//! The order of operation is to extract each script from the HTML,
//! transform it, then inject the results back into the HTML. Each file is
//! processed independently: failures are converted into an [`Outcome`] at
//! this boundary and never abort a directory-wide batch.

use anyhow::{Context, Result, bail};
use jwalk::WalkDir;
use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use crate::extract::extract_scripts;
use crate::inject::inject_scripts;
use crate::rewrite::rewrite_script;
use crate::{debug, log};

/// Read-only configuration shared across a batch.
#[derive(Debug, Clone, Default)]
pub struct Options {
    /// Existing directory to write transformed files into, preserving the
    /// original filename. `None` overwrites each input in place.
    pub output_dir: Option<PathBuf>,
    /// Insert a gc.js helper reference after testharnessreport.js.
    pub gc_helper: bool,
}

impl Options {
    /// Where the transformed version of `input` is written.
    pub fn output_path(&self, input: &Path) -> PathBuf {
        match (&self.output_dir, input.file_name()) {
            (Some(dir), Some(name)) => dir.join(name),
            _ => input.to_path_buf(),
        }
    }
}

/// Externally observable status of one file's transformation.
#[derive(Debug)]
pub enum Outcome {
    Transformed,
    Skipped(&'static str),
    Failed(anyhow::Error),
}

/// Qualification filter: the file must reference the legacy harness entry
/// point from a script tag. This is not perfect, but injection verifies
/// that the src change is actually made and fails if not, so this only
/// exists to skip non-candidates fast.
fn references_js_test(html: &str) -> bool {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| {
        // [ \t]* keeps the pattern valid without regex's unicode tables.
        Regex::new(r#"<script src=.*/resources/js-test\.js.[ \t]*></script>"#).unwrap()
    });
    re.is_match(html)
}

/// Transform one legacy js-test.js HTML test to the testharness.js
/// framework, writing the result per `opts`.
///
/// All per-file errors are caught here and reported as an outcome; only
/// the outcome escapes.
pub fn transform_file(path: &Path, opts: &Options) -> Outcome {
    // Only transform .html tests, don't want to 'transform' something else.
    if path.extension().and_then(|e| e.to_str()) != Some("html") {
        return Outcome::Skipped("not a .html test");
    }

    match transform_html_file(path, opts) {
        Ok(Some(())) => Outcome::Transformed,
        Ok(None) => Outcome::Skipped("does not src js-test.js"),
        Err(err) => Outcome::Failed(err),
    }
}

/// The fallible body of [`transform_file`]. `Ok(None)` means the file did
/// not qualify and was left untouched on disk.
fn transform_html_file(path: &Path, opts: &Options) -> Result<Option<()>> {
    let html = fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;

    if !references_js_test(&html) {
        return Ok(None);
    }

    debug!("transform"; "starting transformation on {}", path.display());
    let original_scripts = extract_scripts(&html)
        .with_context(|| format!("failed to parse markup in {}", path.display()))?;

    // Scripts are processed strictly in order: the setup flag and the
    // harvested title flow from earlier scripts to later ones.
    let last_non_empty = original_scripts.iter().rposition(|s| !s.is_empty());
    let mut rewritten: Vec<String> = Vec::with_capacity(original_scripts.len());
    let mut title: Option<String> = None;
    let mut add_setup = true;

    for (index, script) in original_scripts.iter().enumerate() {
        // Src-only tags (e.g. <script src="js-test.js"></script>) pass
        // through as placeholders.
        if script.is_empty() {
            rewritten.push(String::new());
            continue;
        }
        let result = rewrite_script(script, add_setup, Some(index) == last_non_empty)
            .with_context(|| format!("failed to rewrite script {index} of {}", path.display()))?;
        add_setup = false;
        // Use the first title description that appears in the old file.
        if title.is_none() {
            title = result.title.filter(|t| !t.is_empty());
        }
        rewritten.push(result.code);
    }

    // Defensive check that the transformation didn't lose or gain scripts.
    if original_scripts.len() != rewritten.len() {
        bail!(
            "extracted {} scripts but rewrote {} in {}",
            original_scripts.len(),
            rewritten.len(),
            path.display()
        );
    }

    let title = title.unwrap_or_else(|| {
        debug!("transform"; "no description() found, using file path as title");
        path.display().to_string()
    });

    let output = inject_scripts(&html, &rewritten, &title, opts.gc_helper)
        .with_context(|| format!("failed to inject scripts into {}", path.display()))?;

    let output_path = opts.output_path(path);
    fs::write(&output_path, output)
        .with_context(|| format!("failed to write {}", output_path.display()))?;

    debug!("transform"; "completed transformation, wrote {}", output_path.display());
    Ok(Some(()))
}

/// Recursively collect `.html` files under a directory, in sorted order.
pub fn collect_html_files(dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(dir)
        .sort(true)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.path())
        .filter(|path| path.extension().and_then(|e| e.to_str()) == Some("html"))
        .collect();
    files.sort();
    files
}

// ============================================================================
// Batch Report
// ============================================================================

/// Aggregated per-file outcomes for a batch run.
#[derive(Debug, Default)]
pub struct Report {
    transformed: Vec<PathBuf>,
    skipped: Vec<(PathBuf, &'static str)>,
    failed: Vec<(PathBuf, String)>,
    verified: Vec<(PathBuf, bool)>,
}

impl Report {
    /// Record (and log) the outcome of one file.
    pub fn record(&mut self, path: PathBuf, outcome: Outcome) {
        match outcome {
            Outcome::Transformed => {
                log!("transform"; "{}", path.display());
                self.transformed.push(path);
            }
            Outcome::Skipped(reason) => {
                log!("skip"; "{}: {reason}", path.display());
                self.skipped.push((path, reason));
            }
            Outcome::Failed(err) => {
                log!("error"; "{}: {err:#}", path.display());
                self.failed.push((path, format!("{err:#}")));
            }
        }
    }

    /// Record the result of the external verification collaborator.
    pub fn record_verification(&mut self, path: PathBuf, passed: bool) {
        self.verified.push((path, passed));
    }

    /// Print the end-of-batch summary.
    pub fn print_summary(&self) {
        log!(
            "summary";
            "{} transformed, {} skipped, {} failed",
            self.transformed.len(),
            self.skipped.len(),
            self.failed.len()
        );
        for (path, error) in &self.failed {
            log!("summary"; "FAIL {}: {error}", path.display());
        }
        if !self.verified.is_empty() {
            let passed = self.verified.iter().filter(|(_, p)| *p).count();
            log!("summary"; "verification: {passed}/{} passed", self.verified.len());
            for (path, passed) in &self.verified {
                if !passed {
                    log!("summary"; "verification failed for {}", path.display());
                }
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    const QUALIFYING: &str = r#"<!DOCTYPE html>
<html>
<head>
<script src="../resources/js-test.js"></script>
</head>
<body>
<script>
description("pipeline test");
shouldBeTrue("1 === 1");
</script>
</body>
</html>
"#;

    #[test]
    fn test_qualification_regex() {
        assert!(references_js_test(
            r#"<script src="../resources/js-test.js"></script>"#
        ));
        assert!(references_js_test(
            r#"<script src="/deep/path/resources/js-test.js" ></script>"#
        ));
        assert!(references_js_test(
            "<script src=\"../resources/js-test.js\"\t></script>"
        ));
        assert!(!references_js_test(
            r#"<script src="../resources/testharness.js"></script>"#
        ));
        assert!(!references_js_test("<p>no scripts at all</p>"));
    }

    #[test]
    fn test_non_html_extension_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.js");
        fs::write(&path, "shouldBeTrue('x');").unwrap();
        let outcome = transform_file(&path, &Options::default());
        assert!(matches!(outcome, Outcome::Skipped(_)));
    }

    #[test]
    fn test_non_qualifying_file_left_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plain.html");
        let content = "<html><body><p>hello</p></body></html>";
        fs::write(&path, content).unwrap();
        let outcome = transform_file(&path, &Options::default());
        assert!(matches!(outcome, Outcome::Skipped(_)));
        assert_eq!(fs::read_to_string(&path).unwrap(), content);
    }

    #[test]
    fn test_full_transformation_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.html");
        fs::write(&path, QUALIFYING).unwrap();
        let outcome = transform_file(&path, &Options::default());
        assert!(matches!(outcome, Outcome::Transformed), "{outcome:?}");

        let result = fs::read_to_string(&path).unwrap();
        assert!(result.contains("testharness.js"));
        assert!(result.contains("testharnessreport.js"));
        assert!(!result.contains("js-test.js"));
        assert!(result.contains("assert_true(1 === 1);"));
        assert!(result.contains("setup("));
        assert!(result.contains("done();"));
        assert!(result.contains("<title>pipeline test</title>"));
        assert!(!result.contains("description("));
    }

    #[test]
    fn test_output_dir_preserves_filename() {
        let input = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        let path = input.path().join("test.html");
        fs::write(&path, QUALIFYING).unwrap();

        let opts = Options {
            output_dir: Some(output.path().to_path_buf()),
            gc_helper: false,
        };
        let outcome = transform_file(&path, &opts);
        assert!(matches!(outcome, Outcome::Transformed), "{outcome:?}");

        // Original untouched, transformed copy written next door.
        assert_eq!(fs::read_to_string(&path).unwrap(), QUALIFYING);
        let copy = fs::read_to_string(output.path().join("test.html")).unwrap();
        assert!(copy.contains("testharness.js"));
    }

    #[test]
    fn test_unsupported_call_fails_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.html");
        let html = QUALIFYING.replace("shouldBeTrue(\"1 === 1\");", "shouldThrow(\"f()\");");
        fs::write(&path, &html).unwrap();
        let outcome = transform_file(&path, &Options::default());
        match outcome {
            Outcome::Failed(err) => assert!(format!("{err:#}").contains("shouldThrow")),
            other => panic!("expected failure, got {other:?}"),
        }
        // Failed files are left untouched.
        assert_eq!(fs::read_to_string(&path).unwrap(), html);
    }

    #[test]
    fn test_batch_isolation_one_bad_file_does_not_abort() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("a-good.html");
        let bad = dir.path().join("b-bad.html");
        fs::write(&good, QUALIFYING).unwrap();
        fs::write(&bad, QUALIFYING.replace("shouldBeTrue", "shouldThrow")).unwrap();

        let opts = Options::default();
        let mut report = Report::default();
        for file in collect_html_files(dir.path()) {
            let outcome = transform_file(&file, &opts);
            report.record(file, outcome);
        }
        assert_eq!(report.transformed.len(), 1);
        assert_eq!(report.failed.len(), 1);
        assert!(report.skipped.is_empty());
    }

    #[test]
    fn test_script_rewriting_to_nothing_is_emptied() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.html");
        let html = r#"<html>
<head>
<script src="../resources/js-test.js"></script>
</head>
<body>
<script>
shouldBeTrue("a");
</script>
<script>
testRunner.dumpAsText();
</script>
<script>
shouldBeFalse("b");
</script>
</body>
</html>
"#;
        fs::write(&path, html).unwrap();
        let outcome = transform_file(&path, &Options::default());
        assert!(matches!(outcome, Outcome::Transformed), "{outcome:?}");

        // The middle script rewrites to an empty body; its legacy call
        // must not survive while its neighbors are rewritten.
        let result = fs::read_to_string(&path).unwrap();
        assert!(!result.contains("dumpAsText"));
        assert!(result.contains("<script></script>"));
        assert!(result.contains("assert_true(a);"));
        assert!(result.contains("assert_false(b);"));
    }

    #[test]
    fn test_collect_html_files_recurses() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("a.html"), "x").unwrap();
        fs::write(dir.path().join("sub/b.html"), "x").unwrap();
        fs::write(dir.path().join("c.txt"), "x").unwrap();
        let files = collect_html_files(dir.path());
        assert_eq!(files.len(), 2);
    }

    #[test]
    fn test_setup_only_on_first_script_done_only_on_last() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.html");
        let html = r#"<html>
<head>
<script src="x/resources/js-test.js"></script>
</head>
<body>
<script>
shouldBeTrue("a");
</script>
<script>
shouldBeFalse("b");
</script>
</body>
</html>
"#;
        fs::write(&path, html).unwrap();
        let outcome = transform_file(&path, &Options::default());
        assert!(matches!(outcome, Outcome::Transformed), "{outcome:?}");

        let result = fs::read_to_string(&path).unwrap();
        assert_eq!(result.matches("setup(").count(), 1);
        assert_eq!(result.matches("done();").count(), 1);
        // setup lands in the first script, done in the last.
        assert!(result.find("setup(").unwrap() < result.find("assert_true").unwrap());
        assert!(result.find("assert_false").unwrap() < result.find("done();").unwrap());
    }
}
