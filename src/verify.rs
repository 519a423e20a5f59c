//! External verification of transformed tests.
//!
//! Opaque collaborator for the pipeline: takes a transformed file path and
//! a target build identifier, returns pass/fail. Consults the stored
//! baseline expectation file first; a fully-passing testharness.js test
//! produces no baseline, so the baseline is deleted before the external
//! web-test runner is invoked against the transformed file.
//!
//! Assumes the working directory is the web_tests/ root and that the
//! target build is up to date.

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

use crate::log;
use crate::utils::exec::Cmd;

/// Relative launcher for the external web-test runner.
const WEB_TEST_RUNNER: &str = "../tools/run_web_tests.py";

/// Baseline expectation file for a test: `foo.html` → `foo-expected.txt`.
pub fn baseline_path(test: &Path) -> PathBuf {
    let stem = test.file_stem().and_then(|s| s.to_str()).unwrap_or_default();
    test.with_file_name(format!("{stem}-expected.txt"))
}

/// Whether every line of the baseline lacks a FAIL/WARN prefix.
pub fn baseline_all_pass(baseline: &Path) -> Result<bool> {
    let content = fs::read_to_string(baseline)
        .with_context(|| format!("failed to read baseline {}", baseline.display()))?;
    Ok(content
        .lines()
        .all(|line| !line.starts_with("FAIL") && !line.starts_with("WARN")))
}

/// Verify a transformed test against the external runner.
///
/// Returns false when the baseline is not all-pass (verification skipped)
/// or when the runner reports failure; true only on a clean run.
pub fn verify_transformation(transformed: &Path, build: &str) -> bool {
    let baseline = baseline_path(transformed);
    match baseline_all_pass(&baseline) {
        Ok(true) => {}
        Ok(false) => {
            log!("verify"; "{} baseline was not all PASS, skipping verification", transformed.display());
            return false;
        }
        Err(err) => {
            log!("verify"; "{err:#}");
            return false;
        }
    }

    // testharness.js tests have no baseline when they fully pass.
    if let Err(err) = fs::remove_file(&baseline) {
        log!("verify"; "failed to delete baseline {}: {err}", baseline.display());
        return false;
    }

    // Take the path relative to the web_tests/ directory if a full path
    // was given; a relative path passes through unchanged.
    let path_str = transformed.to_string_lossy();
    let relative = path_str
        .rsplit_once("web_tests/")
        .map_or(path_str.as_ref(), |(_, rel)| rel);

    log!("verify"; "running web test {relative}");
    match Cmd::new(WEB_TEST_RUNNER).args(["-t", build]).arg(relative).run() {
        Ok(_) => true,
        Err(err) => {
            log!("error"; "{} failed verification: {err:#}", transformed.display());
            false
        }
    }
}
