//! testharness-migrate - rewrite legacy js-test.js HTML tests to testharness.js.

mod cli;
mod extract;
mod inject;
mod logger;
mod markup;
mod pipeline;
mod rewrite;
mod utils;
mod verify;

use anyhow::{Result, bail};
use clap::{ColorChoice, Parser};
use cli::Cli;
use pipeline::{Options, Outcome, Report, collect_html_files, transform_file};
use std::path::PathBuf;

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set global color override based on CLI option
    match cli.color {
        ColorChoice::Always => owo_colors::set_override(true),
        ColorChoice::Never => owo_colors::set_override(false),
        ColorChoice::Auto => {} // owo-colors auto-detects TTY
    }
    logger::set_verbose(cli.verbose);

    // Specify exactly one of --file or --dir; a bad invocation aborts the
    // whole process, unlike per-file failures inside a batch.
    let files: Vec<PathBuf> = match (&cli.file, &cli.dir) {
        (Some(file), None) => vec![file.clone()],
        (None, Some(dir)) => {
            let files = collect_html_files(dir);
            if files.is_empty() {
                bail!("no .html files found under {}", dir.display());
            }
            files
        }
        _ => bail!("specify exactly one of --file or --dir"),
    };

    let opts = Options {
        output_dir: cli.output.clone(),
        gc_helper: cli.gc_helper,
    };

    let mut report = Report::default();
    for file in files {
        let outcome = transform_file(&file, &opts);
        if cli.verify && matches!(outcome, Outcome::Transformed) {
            let transformed = opts.output_path(&file);
            let passed = verify::verify_transformation(&transformed, &cli.build);
            report.record_verification(transformed, passed);
        }
        report.record(file, outcome);
    }

    report.print_summary();
    Ok(())
}
