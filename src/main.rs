use std::path::{Path, PathBuf};
use std::process;

use clap::Parser;

use jackc::TOKEN_SUFFIX;

#[derive(Parser)]
#[command(
    name = "jackc",
    version,
    about = "Jack back-end compiler: tokenized XML to Hack VM code"
)]
struct Cli {
    /// A *_myT.xml token file, or a directory containing such files
    input: PathBuf,
}

fn main() {
    let cli = Cli::parse();
    let files = collect_inputs(&cli.input);

    let mut total_errors = 0;
    let mut total_warnings = 0;
    for file in &files {
        println!("[INFO] Compiling: {}", file.display());
        match jackc::compile_token_file(file) {
            Ok(outcome) => {
                println!("[✓] Generated: {}", outcome.output.display());
                total_errors += outcome.errors;
                total_warnings += outcome.warnings;
            }
            Err(err) => {
                eprintln!("error: cannot write output for '{}': {}", file.display(), err);
                process::exit(1);
            }
        }
    }

    println!("[SUMMARY]");
    println!(" Files processed: {}", files.len());
    println!(" Total errors: {}", total_errors);
    println!(" Total warnings: {}", total_warnings);
}

/// Enumerate the token files named by `input`: either one `*_myT.xml` file
/// or the matching files directly inside a directory (non-recursive, sorted).
/// Invalid invocations exit with code 2.
fn collect_inputs(input: &Path) -> Vec<PathBuf> {
    if input.is_dir() {
        let entries = match std::fs::read_dir(input) {
            Ok(entries) => entries,
            Err(err) => {
                eprintln!("error: cannot read directory '{}': {}", input.display(), err);
                process::exit(2);
            }
        };
        let mut files: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.is_file() && has_token_suffix(path))
            .collect();
        files.sort();
        if files.is_empty() {
            eprintln!("No token files found (expected *{})", TOKEN_SUFFIX);
            process::exit(2);
        }
        files
    } else if input.is_file() {
        if !has_token_suffix(input) {
            eprintln!(
                "error: input file must be tokenizer output with the '{}' suffix",
                TOKEN_SUFFIX
            );
            process::exit(2);
        }
        vec![input.to_path_buf()]
    } else {
        eprintln!(
            "error: input path '{}' is neither a file nor a directory",
            input.display()
        );
        process::exit(2);
    }
}

fn has_token_suffix(path: &Path) -> bool {
    path.file_name()
        .map_or(false, |name| name.to_string_lossy().ends_with(TOKEN_SUFFIX))
}
