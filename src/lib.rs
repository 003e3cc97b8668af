pub mod cursor;
pub mod diagnostic;
pub mod engine;
pub mod reader;
pub mod span;
pub mod symtab;
pub mod token;
pub mod vm;

use std::io;
use std::path::{Path, PathBuf};

use cursor::TokenCursor;
use diagnostic::Reporter;
use engine::CompilationEngine;
use vm::VmWriter;

/// The filename suffix of tokenizer output.
pub const TOKEN_SUFFIX: &str = "_myT.xml";

/// Result of compiling one unit, surfaced in the driver's summary.
#[derive(Debug)]
pub struct UnitOutcome {
    pub output: PathBuf,
    pub errors: usize,
    pub warnings: usize,
}

/// Output path for a token file: `X_myT.xml` becomes `X.vm` beside it.
pub fn vm_output_path(input: &Path) -> PathBuf {
    let name = input
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let stem = name.strip_suffix(TOKEN_SUFFIX).unwrap_or(&name);
    input.with_file_name(format!("{}.vm", stem))
}

/// Compile one token file; the VM file lands next to the input. Every unit
/// gets a fresh cursor, symbol table, label counter, emitter, and reporter.
/// Diagnostics render to stderr after the write; the VM file is produced
/// even when errors were recorded (downstream tooling treats a nonzero error
/// count as fatal, not us).
pub fn compile_token_file(input: &Path) -> io::Result<UnitOutcome> {
    let mut reporter = Reporter::new();
    let (source, tokens) = reader::load(input, &mut reporter);

    let output = vm_output_path(input);
    let mut vm = VmWriter::new(&output);
    CompilationEngine::new(TokenCursor::new(tokens), &mut vm, &mut reporter).compile_class();
    vm.save()?;

    reporter.render_all(&input.to_string_lossy(), &source);
    Ok(UnitOutcome {
        output,
        errors: reporter.error_count(),
        warnings: reporter.warning_count(),
    })
}
