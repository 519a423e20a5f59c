//! Command-line interface definitions.

use clap::{ColorChoice, Parser};
use std::path::PathBuf;

/// Migrate legacy js-test.js HTML tests to the testharness.js framework
#[derive(Parser, Debug, Clone)]
#[command(version, about, long_about = None, arg_required_else_help = true)]
pub struct Cli {
    /// Path to a single test file to transform
    #[arg(short, long, value_hint = clap::ValueHint::FilePath)]
    pub file: Option<PathBuf>,

    /// Directory of test files to transform recursively
    #[arg(short, long, value_hint = clap::ValueHint::DirPath)]
    pub dir: Option<PathBuf>,

    /// Existing directory where transformed files are written, keeping
    /// their original filenames. Omit to overwrite inputs in place.
    #[arg(short, long, value_hint = clap::ValueHint::DirPath)]
    pub output: Option<PathBuf>,

    /// Run each transformed test through the external web-test runner and
    /// compare against its stored baseline
    #[arg(long)]
    pub verify: bool,

    /// Target build identifier passed to the web-test runner
    #[arg(short, long, default_value = "Default")]
    pub build: String,

    /// Also insert a gc.js helper script reference after the
    /// testharnessreport.js reference
    #[arg(long)]
    pub gc_helper: bool,

    /// Enable verbose output for debugging
    #[arg(short, long)]
    pub verbose: bool,

    /// Control colored output (auto, always, never)
    #[arg(long, default_value = "auto")]
    pub color: ColorChoice,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_file_mode() {
        let cli = Cli::parse_from(["testharness-migrate", "--file", "a.html"]);
        assert_eq!(cli.file, Some(PathBuf::from("a.html")));
        assert!(cli.dir.is_none());
        assert_eq!(cli.build, "Default");
    }

    #[test]
    fn test_cli_parses_dir_mode_with_options() {
        let cli = Cli::parse_from([
            "testharness-migrate",
            "--dir",
            "tests/",
            "--output",
            "out/",
            "--verify",
            "--build",
            "Release",
            "--gc-helper",
        ]);
        assert_eq!(cli.dir, Some(PathBuf::from("tests/")));
        assert_eq!(cli.output, Some(PathBuf::from("out/")));
        assert!(cli.verify);
        assert!(cli.gc_helper);
        assert_eq!(cli.build, "Release");
    }
}
