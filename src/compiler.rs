//! Pipeline driver: lex -> parse -> resolve -> emit.
//!
//! Phases run in declared order over one shared diagnostics sink. The
//! driver halts before a phase whose predecessor produced any
//! error-severity entry; warnings do not halt. Each invocation owns all
//! of its state, so independent compilations never interact.

use crate::ast::Program;
use crate::diagnostics::{Diagnostic, DiagnosticKind, Diagnostics, Phase, Severity};
use crate::emitter::{self, Instruction};
use crate::lexer;
use crate::parser;
use crate::resolver;
use crate::symbols::SymbolTables;
use crate::token::Token;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Options {
    /// Keep tokens, AST, and symbol tables in the result.
    pub debug: bool,
    /// Produce the instruction list on success.
    pub emit_ir: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            debug: false,
            emit_ir: true,
        }
    }
}

#[derive(Debug)]
pub struct CompileResult<'s> {
    pub success: bool,
    pub diagnostics: Vec<Diagnostic>,
    pub tokens: Option<Vec<Token<'s>>>,
    pub ast: Option<Program>,
    pub symbol_tables: Option<SymbolTables>,
    pub instructions: Option<Vec<Instruction>>,
}

impl<'s> CompileResult<'s> {
    /// Numbered listing in the stable text format, when IR was emitted.
    pub fn ir_text(&self) -> Option<String> {
        self.instructions
            .as_ref()
            .map(|instructions| emitter::render(instructions))
    }

    pub fn error_count(&self, phase: Phase) -> usize {
        self.diagnostics
            .iter()
            .filter(|entry| entry.phase == phase && entry.severity == Severity::Error)
            .count()
    }

    /// Process exit code: 0 success, 1 lex, 2 parse, 3 semantic,
    /// 4 codegen, 5 internal.
    pub fn exit_code(&self) -> u8 {
        if self.success {
            return 0;
        }
        let first = self
            .diagnostics
            .iter()
            .find(|entry| entry.severity == Severity::Error);
        match first {
            Some(entry) if entry.kind == DiagnosticKind::InternalInvariant => 5,
            Some(entry) => match entry.phase {
                Phase::Lex => 1,
                Phase::Parse => 2,
                Phase::Semantic => 3,
                Phase::Codegen => 4,
            },
            None => 5,
        }
    }
}

/// Compiles `source` through all four phases.
pub fn compile<'s>(source: &'s str, options: &Options) -> CompileResult<'s> {
    let mut diagnostics = Diagnostics::new();

    let tokens = lexer::tokenize(source, &mut diagnostics);
    if diagnostics.has_errors() {
        return halted(options, diagnostics, Some(tokens), None, None);
    }

    let mut program = parser::parse_tokens(&tokens, &mut diagnostics);
    if diagnostics.has_errors() {
        return halted(options, diagnostics, Some(tokens), Some(program), None);
    }

    let tables = resolver::resolve(&mut program, &mut diagnostics);
    if diagnostics.has_errors() {
        return halted(
            options,
            diagnostics,
            Some(tokens),
            Some(program),
            Some(tables),
        );
    }

    let instructions = emitter::emit(&program, &tables);

    CompileResult {
        success: true,
        diagnostics: diagnostics.into_vec(),
        tokens: if options.debug { Some(tokens) } else { None },
        ast: if options.debug { Some(program) } else { None },
        symbol_tables: if options.debug { Some(tables) } else { None },
        instructions: if options.emit_ir {
            Some(instructions)
        } else {
            None
        },
    }
}

fn halted<'s>(
    options: &Options,
    diagnostics: Diagnostics,
    tokens: Option<Vec<Token<'s>>>,
    ast: Option<Program>,
    symbol_tables: Option<SymbolTables>,
) -> CompileResult<'s> {
    CompileResult {
        success: false,
        diagnostics: diagnostics.into_vec(),
        tokens: if options.debug { tokens } else { None },
        ast: if options.debug { ast } else { None },
        symbol_tables: if options.debug { symbol_tables } else { None },
        instructions: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;

    #[test]
    fn compiles_assignment_with_precedence() {
        let result = compile("x = 10 + 20 * 2\n", &Options::default());
        assert!(result.success);
        assert_eq!(
            result.ir_text().expect("ir present"),
            "1: t1 = 20 * 2\n2: t2 = 10 + t1\n3: x = t2\n"
        );
    }

    #[test]
    fn reports_undefined_variable_and_emits_nothing() {
        let result = compile("y = z + 1\n", &Options::default());
        assert!(!result.success);
        assert!(result.instructions.is_none());
        assert_eq!(result.diagnostics.len(), 1);
        assert_eq!(
            result.diagnostics[0].to_string(),
            "semantic error at line 1:5: UndefinedVariable: z"
        );
        assert_eq!(result.exit_code(), 3);
    }

    #[test]
    fn halts_before_the_resolver_on_parse_errors() {
        // The undefined name would also be a semantic error, but the
        // resolver must never see this program.
        let result = compile("if missing\n    x = 1\n", &Options::default());
        assert!(!result.success);
        assert_eq!(result.error_count(Phase::Parse), 1);
        assert_eq!(result.error_count(Phase::Semantic), 0);
        assert_eq!(result.exit_code(), 2);
    }

    #[test]
    fn lex_errors_exit_with_code_one() {
        let result = compile("x = 1 $ 2\n", &Options::default());
        assert!(!result.success);
        assert_eq!(result.exit_code(), 1);
    }

    #[test]
    fn empty_and_blank_sources_compile_to_nothing() {
        for source in ["", "\n", "   \n\n", "# only a comment\n"] {
            let result = compile(source, &Options::default());
            assert!(result.success, "source {source:?} should compile");
            assert!(result.diagnostics.is_empty());
            assert_eq!(result.instructions.as_deref(), Some(&[][..]));
            assert_eq!(result.ir_text().as_deref(), Some(""));
        }
    }

    #[test]
    fn debug_option_retains_intermediate_artifacts() {
        let source = "x = 1\n";
        let plain = compile(source, &Options::default());
        assert!(plain.tokens.is_none());
        assert!(plain.ast.is_none());
        assert!(plain.symbol_tables.is_none());

        let debug = compile(
            source,
            &Options {
                debug: true,
                emit_ir: true,
            },
        );
        assert!(debug.tokens.is_some());
        assert!(debug.ast.is_some());
        assert!(debug.symbol_tables.is_some());
    }

    #[test]
    fn emit_ir_can_be_disabled() {
        let result = compile(
            "x = 1\n",
            &Options {
                debug: false,
                emit_ir: false,
            },
        );
        assert!(result.success);
        assert!(result.instructions.is_none());
        assert!(result.ir_text().is_none());
    }

    #[test]
    fn compilation_is_deterministic() {
        let source = indoc! {"
            def f(n):
                if n <= 1:
                    return 1
                return n * f(n - 1)
            r = f(5)
        "};
        let first = compile(source, &Options::default());
        let second = compile(source, &Options::default());
        assert_eq!(first.ir_text(), second.ir_text());
        assert_eq!(first.diagnostics, second.diagnostics);
    }

    #[test]
    fn sources_without_trailing_newline_compile() {
        let result = compile("x = 1", &Options::default());
        assert!(result.success);
        assert_eq!(result.ir_text().as_deref(), Some("1: x = 1\n"));
    }
}
