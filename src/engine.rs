//! The compilation engine: a recursive-descent walk of the Jack grammar that
//! emits VM code as productions are recognized. Single pass, left to right,
//! one token of lookahead, no backtracking. On a grammar mismatch the engine
//! records a diagnostic and keeps going, so a broken unit still produces a
//! best-effort VM file.

use crate::cursor::TokenCursor;
use crate::diagnostic::{Diagnostic, Reporter};
use crate::span::Span;
use crate::symtab::{SymbolTable, VarKind};
use crate::token::{Token, TokenTag};
use crate::vm::{Command, Segment, VmWriter};

/// Mints unique control-flow labels. One counter per class, shared across
/// all subroutines; uniqueness comes from monotonicity alone.
#[derive(Debug, Default)]
pub struct LabelGenerator {
    count: u32,
}

impl LabelGenerator {
    pub fn generate(&mut self, prefix: &str) -> String {
        let label = format!("{}{}", prefix, self.count);
        self.count += 1;
        label
    }
}

/// Drives one compilation unit: reads the cursor, updates the symbol table,
/// appends to the emitter, records diagnostics. All other components are
/// passive; control flow lives here.
pub struct CompilationEngine<'a> {
    cursor: TokenCursor,
    symbols: SymbolTable,
    labels: LabelGenerator,
    vm: &'a mut VmWriter,
    reporter: &'a mut Reporter,
    class_name: String,
}

impl<'a> CompilationEngine<'a> {
    pub fn new(cursor: TokenCursor, vm: &'a mut VmWriter, reporter: &'a mut Reporter) -> Self {
        Self {
            cursor,
            symbols: SymbolTable::new(),
            labels: LabelGenerator::default(),
            vm,
            reporter,
            class_name: String::new(),
        }
    }

    /// `class ClassName { classVarDec* subroutineDec* }`
    pub fn compile_class(&mut self) {
        if self.cursor.peek().is_none() {
            self.reporter.error(0, Span::dummy(), "no tokens to compile");
            return;
        }
        self.expect_value(TokenTag::Keyword, "class");
        self.class_name = match self.expect(TokenTag::Identifier) {
            Some(name) => name.value,
            None => "Unknown".to_string(),
        };
        self.expect_value(TokenTag::Symbol, "{");

        loop {
            let Some(token) = self.cursor.peek() else {
                self.error_at_end("unexpected end of stream in class body");
                break;
            };
            if token.is_symbol("}") {
                break;
            } else if token.is_keyword("static") || token.is_keyword("field") {
                self.compile_class_var_dec();
            } else if token.is_keyword("constructor")
                || token.is_keyword("function")
                || token.is_keyword("method")
            {
                self.compile_subroutine();
            } else {
                self.reporter.push(
                    Diagnostic::error(
                        format!("unexpected token in class body: '{}'", token.value),
                        token.index,
                        token.span,
                    )
                    .with_help(
                        "class members start with 'static', 'field', 'constructor', \
                         'function', or 'method'"
                            .to_string(),
                    ),
                );
                self.cursor.advance();
            }
        }
    }

    /// `(static|field) type name (, name)* ;`
    fn compile_class_var_dec(&mut self) {
        let Some(kind_token) = self.expect(TokenTag::Keyword) else {
            return;
        };
        let kind = if kind_token.value == "field" {
            VarKind::Field
        } else {
            VarKind::Static
        };
        let Some(ty) = self.declared_type("class variable declaration") else {
            return;
        };
        self.compile_declared_names(&ty, kind);
        self.expect_value(TokenTag::Symbol, ";");
    }

    /// `(constructor|function|method) (type|void) name (params) { body }`
    fn compile_subroutine(&mut self) {
        let Some(kind_token) = self.expect(TokenTag::Keyword) else {
            return;
        };
        let subr_kind = kind_token.value;
        // Return type is parsed and discarded; there is no type checking.
        if self.cursor.advance().is_none() {
            self.error_at_end("unexpected end of stream, expected a return type");
        }
        let name = match self.expect(TokenTag::Identifier) {
            Some(token) => token.value,
            None => "unknown".to_string(),
        };
        let full_name = format!("{}.{}", self.class_name, name);

        self.symbols.start_subroutine();
        if subr_kind == "method" {
            // The receiver is a synthetic argument 0 of the class type.
            let class_name = self.class_name.clone();
            self.symbols.define("this", &class_name, VarKind::Arg);
        }
        self.expect_value(TokenTag::Symbol, "(");
        self.compile_parameter_list();
        self.expect_value(TokenTag::Symbol, ")");
        self.expect_value(TokenTag::Symbol, "{");

        while self.peek_is_keyword("var") {
            self.compile_var_dec();
        }

        let n_locals = self.symbols.var_count(VarKind::Var);
        self.vm.write_function(&full_name, n_locals);
        match subr_kind.as_str() {
            "constructor" => {
                // Allocate the instance and bind `this` to its base address.
                let n_fields = self.symbols.var_count(VarKind::Field);
                self.vm.write_push(Segment::Constant, n_fields);
                self.vm.write_call("Memory.alloc", 1);
                self.vm.write_pop(Segment::Pointer, 0);
            }
            "method" => {
                // Bind `this` to the caller-provided receiver.
                self.vm.write_push(Segment::Argument, 0);
                self.vm.write_pop(Segment::Pointer, 0);
            }
            _ => {}
        }

        self.compile_statements();
        self.expect_value(TokenTag::Symbol, "}");
    }

    /// `((type name) (, type name)*)?` — caller handles the parentheses.
    fn compile_parameter_list(&mut self) {
        if self.cursor.peek().map_or(true, |t| t.is_symbol(")")) {
            return;
        }
        loop {
            let Some(ty) = self.declared_type("parameter list") else {
                return;
            };
            if let Some(name) = self.expect(TokenTag::Identifier) {
                self.define_checked(&name, &ty, VarKind::Arg);
            }
            if self.peek_is_symbol(",") {
                self.expect_value(TokenTag::Symbol, ",");
            } else {
                break;
            }
        }
    }

    /// `var type name (, name)* ;`
    fn compile_var_dec(&mut self) {
        self.expect_value(TokenTag::Keyword, "var");
        let Some(ty) = self.declared_type("variable declaration") else {
            return;
        };
        self.compile_declared_names(&ty, VarKind::Var);
        self.expect_value(TokenTag::Symbol, ";");
    }

    /// The shared `name (, name)*` tail of variable declarations.
    fn compile_declared_names(&mut self, ty: &str, kind: VarKind) {
        let mut name = self.expect(TokenTag::Identifier);
        loop {
            if let Some(ref name_token) = name {
                self.define_checked(name_token, ty, kind);
            }
            if self.peek_is_symbol(",") {
                self.expect_value(TokenTag::Symbol, ",");
                name = self.expect(TokenTag::Identifier);
            } else {
                break;
            }
        }
    }

    fn compile_statements(&mut self) {
        loop {
            let Some(token) = self.cursor.peek() else {
                break;
            };
            if token.tag != TokenTag::Keyword {
                break;
            }
            match token.value.as_str() {
                "let" => self.compile_let(),
                "if" => self.compile_if(),
                "while" => self.compile_while(),
                "do" => self.compile_do(),
                "return" => self.compile_return(),
                _ => break,
            }
        }
    }

    /// `let name ([expr])? = expr ;`
    fn compile_let(&mut self) {
        self.expect_value(TokenTag::Keyword, "let");
        let Some(target) = self.expect(TokenTag::Identifier) else {
            return;
        };

        let is_array = self.peek_is_symbol("[");
        if is_array {
            self.expect_value(TokenTag::Symbol, "[");
            self.compile_expression();
            self.expect_value(TokenTag::Symbol, "]");
            let (segment, index) = self.resolve_or(&target, "let statement", Segment::Local);
            self.vm.write_push(segment, index);
            self.vm.write_arithmetic(Command::Add);
        }
        self.expect_value(TokenTag::Symbol, "=");
        self.compile_expression();
        self.expect_value(TokenTag::Symbol, ";");

        if is_array {
            // The RHS may itself have gone through `pointer 1`/`that`, so the
            // value is spilled to temp 0 before retargeting the alias.
            self.vm.write_pop(Segment::Temp, 0);
            self.vm.write_pop(Segment::Pointer, 1);
            self.vm.write_push(Segment::Temp, 0);
            self.vm.write_pop(Segment::That, 0);
        } else {
            let (segment, index) = self.resolve_or(&target, "let statement", Segment::Local);
            self.vm.write_pop(segment, index);
        }
    }

    /// `while (expr) { statements }`
    fn compile_while(&mut self) {
        self.expect_value(TokenTag::Keyword, "while");
        self.expect_value(TokenTag::Symbol, "(");
        let start_label = self.labels.generate("WHILE_EXP");
        let end_label = self.labels.generate("WHILE_END");
        self.vm.write_label(&start_label);
        self.compile_expression();
        self.vm.write_arithmetic(Command::Not);
        self.vm.write_if(&end_label);
        self.expect_value(TokenTag::Symbol, ")");
        self.expect_value(TokenTag::Symbol, "{");
        self.compile_statements();
        self.expect_value(TokenTag::Symbol, "}");
        self.vm.write_goto(&start_label);
        self.vm.write_label(&end_label);
    }

    /// `if (expr) { statements } (else { statements })?`
    ///
    /// Both labels are minted even without an `else`; the unused jump target
    /// is still emitted.
    fn compile_if(&mut self) {
        self.expect_value(TokenTag::Keyword, "if");
        self.expect_value(TokenTag::Symbol, "(");
        self.compile_expression();
        self.expect_value(TokenTag::Symbol, ")");
        let false_label = self.labels.generate("IF_FALSE_");
        let end_label = self.labels.generate("IF_END_");
        self.vm.write_arithmetic(Command::Not);
        self.vm.write_if(&false_label);
        self.expect_value(TokenTag::Symbol, "{");
        self.compile_statements();
        self.expect_value(TokenTag::Symbol, "}");
        self.vm.write_goto(&end_label);
        self.vm.write_label(&false_label);
        if self.peek_is_keyword("else") {
            self.expect_value(TokenTag::Keyword, "else");
            self.expect_value(TokenTag::Symbol, "{");
            self.compile_statements();
            self.expect_value(TokenTag::Symbol, "}");
        }
        self.vm.write_label(&end_label);
    }

    /// `do subroutineCall ;` — the return value is always discarded.
    fn compile_do(&mut self) {
        self.expect_value(TokenTag::Keyword, "do");
        if let Some(first) = self.expect(TokenTag::Identifier) {
            self.compile_call_with(&first);
        }
        self.expect_value(TokenTag::Symbol, ";");
        self.vm.write_pop(Segment::Temp, 0);
    }

    /// `return expr? ;` — void returns push the 0 sentinel.
    fn compile_return(&mut self) {
        self.expect_value(TokenTag::Keyword, "return");
        if self.peek_is_symbol(";") {
            self.vm.write_push(Segment::Constant, 0);
        } else {
            self.compile_expression();
        }
        self.expect_value(TokenTag::Symbol, ";");
        self.vm.write_return();
    }

    /// `term (op term)*` — flat and left-associative; Jack has no operator
    /// precedence, each op applies as soon as its right term is compiled.
    fn compile_expression(&mut self) {
        self.compile_term();
        while let Some(op) = self.peek_binary_op() {
            self.cursor.advance();
            self.compile_term();
            self.emit_binary_op(&op);
        }
    }

    fn peek_binary_op(&self) -> Option<Token> {
        let token = self.cursor.peek()?;
        if token.tag == TokenTag::Symbol
            && matches!(
                token.value.as_str(),
                "+" | "-" | "*" | "/" | "&" | "|" | "<" | ">" | "="
            )
        {
            Some(token)
        } else {
            None
        }
    }

    fn emit_binary_op(&mut self, op: &Token) {
        match op.value.as_str() {
            "+" => self.vm.write_arithmetic(Command::Add),
            "-" => self.vm.write_arithmetic(Command::Sub),
            "*" => self.vm.write_call("Math.multiply", 2),
            "/" => self.vm.write_call("Math.divide", 2),
            "&" => self.vm.write_arithmetic(Command::And),
            "|" => self.vm.write_arithmetic(Command::Or),
            "<" => self.vm.write_arithmetic(Command::Lt),
            ">" => self.vm.write_arithmetic(Command::Gt),
            "=" => self.vm.write_arithmetic(Command::Eq),
            _ => self.error_at(op, format!("unknown operator '{}'", op.value)),
        }
    }

    fn compile_term(&mut self) {
        let Some(token) = self.cursor.peek() else {
            self.error_at_end("unexpected end of stream in term");
            return;
        };
        match token.tag {
            TokenTag::IntConst => {
                self.cursor.advance();
                let value = match token.value.parse::<u16>() {
                    Ok(value) => value,
                    Err(_) => {
                        self.error_at(
                            &token,
                            format!("invalid integer constant '{}'", token.value),
                        );
                        0
                    }
                };
                self.vm.write_push(Segment::Constant, value);
            }
            TokenTag::StrConst => {
                self.cursor.advance();
                self.compile_string_literal(&token.value);
            }
            TokenTag::Keyword => match token.value.as_str() {
                "true" => {
                    self.cursor.advance();
                    self.vm.write_push(Segment::Constant, 1);
                    self.vm.write_arithmetic(Command::Not);
                }
                "false" | "null" => {
                    self.cursor.advance();
                    self.vm.write_push(Segment::Constant, 0);
                }
                "this" => {
                    self.cursor.advance();
                    self.vm.write_push(Segment::Pointer, 0);
                }
                _ => {
                    self.error_at(
                        &token,
                        format!("unexpected token in term: '{}'", token.value),
                    );
                    self.cursor.advance();
                }
            },
            TokenTag::Symbol => match token.value.as_str() {
                "(" => {
                    self.cursor.advance();
                    self.compile_expression();
                    self.expect_value(TokenTag::Symbol, ")");
                }
                "-" => {
                    self.cursor.advance();
                    self.compile_term();
                    self.vm.write_arithmetic(Command::Neg);
                }
                "~" => {
                    self.cursor.advance();
                    self.compile_term();
                    self.vm.write_arithmetic(Command::Not);
                }
                _ => {
                    self.error_at(
                        &token,
                        format!("unexpected token in term: '{}'", token.value),
                    );
                    self.cursor.advance();
                }
            },
            TokenTag::Identifier => {
                self.cursor.advance();
                self.compile_identifier_term(&token);
            }
        }
    }

    /// A string literal materializes through the runtime allocator: a new
    /// String sized to the literal, then one appendChar per character. Each
    /// call leaves the string handle on the stack as the term's value.
    fn compile_string_literal(&mut self, value: &str) {
        self.vm
            .write_push(Segment::Constant, value.chars().count() as u16);
        self.vm.write_call("String.new", 1);
        for ch in value.chars() {
            self.vm.write_push(Segment::Constant, ch as u16);
            self.vm.write_call("String.appendChar", 2);
        }
    }

    /// Identifier-led term: array read, subroutine call, or a plain variable,
    /// distinguished by one token of lookahead.
    fn compile_identifier_term(&mut self, ident: &Token) {
        if self.peek_is_symbol("[") {
            self.expect_value(TokenTag::Symbol, "[");
            self.compile_expression();
            self.expect_value(TokenTag::Symbol, "]");
            let (segment, index) = self.resolve_or(ident, "array access", Segment::Local);
            self.vm.write_push(segment, index);
            self.vm.write_arithmetic(Command::Add);
            self.vm.write_pop(Segment::Pointer, 1);
            self.vm.write_push(Segment::That, 0);
        } else if self.peek_is_symbol("(") || self.peek_is_symbol(".") {
            self.compile_call_with(ident);
        } else {
            let (segment, index) = self.resolve_or(ident, "term", Segment::Constant);
            self.vm.write_push(segment, index);
        }
    }

    /// Subroutine call whose leading identifier is already consumed. Three
    /// shapes: `f(...)` is a method of the current class with the implicit
    /// receiver; `obj.m(...)` with `obj` a known variable is a method call on
    /// that object, dispatched through its declared type; `Class.f(...)`
    /// otherwise is a static call with no receiver.
    fn compile_call_with(&mut self, first: &Token) {
        let mut n_args: u16 = 0;
        let full_name;
        if self.peek_is_symbol(".") {
            self.expect_value(TokenTag::Symbol, ".");
            let Some(sub) = self.expect(TokenTag::Identifier) else {
                return;
            };
            match self.symbols.lookup(&first.value) {
                Some(symbol) => {
                    full_name = format!("{}.{}", symbol.ty, sub.value);
                    self.vm.write_push(symbol.kind.segment(), symbol.index);
                    n_args = 1;
                }
                None => {
                    full_name = format!("{}.{}", first.value, sub.value);
                }
            }
        } else {
            full_name = format!("{}.{}", self.class_name, first.value);
            self.vm.write_push(Segment::Pointer, 0);
            n_args = 1;
        }

        self.expect_value(TokenTag::Symbol, "(");
        n_args += self.compile_expression_list();
        self.expect_value(TokenTag::Symbol, ")");
        self.vm.write_call(&full_name, n_args);
    }

    /// `(expr (, expr)*)?` — returns the number of expressions compiled.
    fn compile_expression_list(&mut self) -> u16 {
        if self.cursor.peek().map_or(true, |t| t.is_symbol(")")) {
            return 0;
        }
        let mut count = 0;
        loop {
            self.compile_expression();
            count += 1;
            if self.peek_is_symbol(",") {
                self.expect_value(TokenTag::Symbol, ",");
            } else {
                break;
            }
        }
        count
    }

    // --- Utility methods ---

    fn peek_is_symbol(&self, value: &str) -> bool {
        self.cursor.peek().map_or(false, |t| t.is_symbol(value))
    }

    fn peek_is_keyword(&self, value: &str) -> bool {
        self.cursor.peek().map_or(false, |t| t.is_keyword(value))
    }

    /// Consume the next token, requiring its tag. A mismatch (or end of
    /// stream) is reported and yields `None`; the mismatched token stays
    /// consumed so parsing makes progress.
    fn expect(&mut self, tag: TokenTag) -> Option<Token> {
        let Some(token) = self.cursor.advance() else {
            self.error_at_end(format!(
                "unexpected end of stream, expected {}",
                tag.description()
            ));
            return None;
        };
        if token.tag != tag {
            self.error_at(
                &token,
                format!("expected {}, found '{}'", tag.description(), token.value),
            );
            return None;
        }
        Some(token)
    }

    /// Like [`expect`](Self::expect), additionally requiring the exact value.
    fn expect_value(&mut self, tag: TokenTag, value: &str) -> Option<Token> {
        let Some(token) = self.cursor.advance() else {
            self.error_at_end(format!("unexpected end of stream, expected '{}'", value));
            return None;
        };
        if token.tag != tag || token.value != value {
            self.error_at(
                &token,
                format!("expected '{}', found '{}'", value, token.value),
            );
            return None;
        }
        Some(token)
    }

    /// Parse a type: a primitive keyword or a class-name identifier. An
    /// absent token skips the declaration; a non-type token is reported but
    /// still used, matching the recovery policy of treating the mismatched
    /// token as the expected one.
    fn declared_type(&mut self, context: &str) -> Option<String> {
        let Some(token) = self.cursor.advance() else {
            self.error_at_end(format!(
                "unexpected end of stream, expected a type in {}",
                context
            ));
            return None;
        };
        if token.tag != TokenTag::Keyword && token.tag != TokenTag::Identifier {
            self.error_at(
                &token,
                format!("invalid type '{}' in {}", token.value, context),
            );
        }
        Some(token.value)
    }

    /// Define a variable, warning when the name already exists in the target
    /// scope. The replacement still takes a fresh index, so emitted code for
    /// well-formed input is unchanged.
    fn define_checked(&mut self, name: &Token, ty: &str, kind: VarKind) {
        if self.symbols.defined_in_scope(&name.value, kind) {
            self.reporter.warning(
                name.index,
                name.span,
                format!("redefinition of '{}'", name.value),
            );
        }
        self.symbols.define(&name.value, ty, kind);
    }

    /// Resolve a variable use. Undefined names are reported and fall back to
    /// index 0 of `fallback` so emission can continue.
    fn resolve_or(&mut self, token: &Token, context: &str, fallback: Segment) -> (Segment, u16) {
        match self.symbols.lookup(&token.value) {
            Some(symbol) => (symbol.kind.segment(), symbol.index),
            None => {
                self.error_at(
                    token,
                    format!("undefined variable '{}' in {}", token.value, context),
                );
                (fallback, 0)
            }
        }
    }

    fn error_at(&mut self, token: &Token, message: impl Into<String>) {
        self.reporter.error(token.index, token.span, message);
    }

    fn error_at_end(&mut self, message: impl Into<String>) {
        self.reporter
            .error(self.cursor.position(), Span::dummy(), message);
    }
}
