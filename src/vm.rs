use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// A Hack VM memory segment.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Segment {
    Constant,
    Argument,
    Local,
    Static,
    This,
    That,
    Pointer,
    Temp,
}

impl Segment {
    pub fn as_str(self) -> &'static str {
        match self {
            Segment::Constant => "constant",
            Segment::Argument => "argument",
            Segment::Local => "local",
            Segment::Static => "static",
            Segment::This => "this",
            Segment::That => "that",
            Segment::Pointer => "pointer",
            Segment::Temp => "temp",
        }
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A VM arithmetic-logic command.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Command {
    Add,
    Sub,
    Neg,
    Eq,
    Gt,
    Lt,
    And,
    Or,
    Not,
}

impl Command {
    pub fn as_str(self) -> &'static str {
        match self {
            Command::Add => "add",
            Command::Sub => "sub",
            Command::Neg => "neg",
            Command::Eq => "eq",
            Command::Gt => "gt",
            Command::Lt => "lt",
            Command::And => "and",
            Command::Or => "or",
            Command::Not => "not",
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Append-only buffer of VM instructions, flushed to the output path once by
/// [`VmWriter::save`]. One call, one line; the buffer is never re-read during
/// compilation.
#[derive(Debug)]
pub struct VmWriter {
    output_path: PathBuf,
    lines: Vec<String>,
}

impl VmWriter {
    pub fn new(output_path: impl Into<PathBuf>) -> Self {
        Self {
            output_path: output_path.into(),
            lines: Vec::new(),
        }
    }

    pub fn write_push(&mut self, segment: Segment, index: u16) {
        self.lines.push(format!("push {} {}", segment, index));
    }

    pub fn write_pop(&mut self, segment: Segment, index: u16) {
        self.lines.push(format!("pop {} {}", segment, index));
    }

    pub fn write_arithmetic(&mut self, command: Command) {
        self.lines.push(command.as_str().to_string());
    }

    pub fn write_label(&mut self, label: &str) {
        self.lines.push(format!("label {}", label));
    }

    pub fn write_goto(&mut self, label: &str) {
        self.lines.push(format!("goto {}", label));
    }

    pub fn write_if(&mut self, label: &str) {
        self.lines.push(format!("if-goto {}", label));
    }

    pub fn write_call(&mut self, name: &str, n_args: u16) {
        self.lines.push(format!("call {} {}", name, n_args));
    }

    pub fn write_function(&mut self, name: &str, n_locals: u16) {
        self.lines.push(format!("function {} {}", name, n_locals));
    }

    pub fn write_return(&mut self) {
        self.lines.push("return".to_string());
    }

    /// The buffered instructions, in emission order.
    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn output_path(&self) -> &Path {
        &self.output_path
    }

    /// Write every buffered line to the output path, LF-terminated, and clear
    /// the buffer.
    pub fn save(&mut self) -> io::Result<()> {
        let mut out = String::new();
        for line in &self.lines {
            out.push_str(line);
            out.push('\n');
        }
        fs::write(&self.output_path, out)?;
        self.lines.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_pop_formatting() {
        let mut vm = VmWriter::new("unused.vm");
        vm.write_push(Segment::Constant, 7);
        vm.write_pop(Segment::Local, 0);
        vm.write_push(Segment::That, 0);
        vm.write_pop(Segment::Pointer, 1);
        assert_eq!(
            vm.lines(),
            ["push constant 7", "pop local 0", "push that 0", "pop pointer 1"]
        );
    }

    #[test]
    fn test_arithmetic_mnemonics_verbatim() {
        let mut vm = VmWriter::new("unused.vm");
        for cmd in [
            Command::Add,
            Command::Sub,
            Command::Neg,
            Command::Eq,
            Command::Gt,
            Command::Lt,
            Command::And,
            Command::Or,
            Command::Not,
        ] {
            vm.write_arithmetic(cmd);
        }
        assert_eq!(
            vm.lines(),
            ["add", "sub", "neg", "eq", "gt", "lt", "and", "or", "not"]
        );
    }

    #[test]
    fn test_control_flow_and_calls() {
        let mut vm = VmWriter::new("unused.vm");
        vm.write_label("WHILE_EXP0");
        vm.write_if("WHILE_END1");
        vm.write_goto("WHILE_EXP0");
        vm.write_function("Main.main", 2);
        vm.write_call("Math.multiply", 2);
        vm.write_return();
        assert_eq!(
            vm.lines(),
            [
                "label WHILE_EXP0",
                "if-goto WHILE_END1",
                "goto WHILE_EXP0",
                "function Main.main 2",
                "call Math.multiply 2",
                "return"
            ]
        );
    }

    #[test]
    fn test_save_writes_lf_lines_and_clears_buffer() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Main.vm");
        let mut vm = VmWriter::new(&path);
        vm.write_function("Main.main", 0);
        vm.write_push(Segment::Constant, 0);
        vm.write_return();
        vm.save().unwrap();

        let written = std::fs::read_to_string(&path).unwrap();
        assert_eq!(written, "function Main.main 0\npush constant 0\nreturn\n");
        assert!(vm.lines().is_empty());
    }

    #[test]
    fn test_save_empty_buffer_writes_empty_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Empty.vm");
        let mut vm = VmWriter::new(&path);
        vm.save().unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "");
    }
}
