//! Shared diagnostics sink.
//!
//! Every phase appends positioned, phase-tagged entries here instead of
//! aborting on the first problem. The driver inspects the sink between
//! phases and halts the pipeline once a phase has produced an error.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Lex,
    Parse,
    Semantic,
    Codegen,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Lex => "lex",
            Phase::Parse => "parse",
            Phase::Semantic => "semantic",
            Phase::Codegen => "codegen",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Severity::Error => "error",
            Severity::Warning => "warning",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticKind {
    // Lex
    UnexpectedCharacter,
    UnterminatedString,
    InconsistentIndentation,
    MixedTabsAndSpaces,
    InvalidNumber,
    // Parse
    UnexpectedToken,
    MissingColon,
    MissingCloser,
    UnsupportedConstruct,
    EmptyBlock,
    // Semantic
    UndefinedVariable,
    ArityMismatch,
    TypeMismatch,
    ReturnOutsideFunction,
    BreakOutsideLoop,
    Redefinition,
    // Codegen
    InternalInvariant,
}

impl fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DiagnosticKind::UnexpectedCharacter => "UnexpectedCharacter",
            DiagnosticKind::UnterminatedString => "UnterminatedString",
            DiagnosticKind::InconsistentIndentation => "InconsistentIndentation",
            DiagnosticKind::MixedTabsAndSpaces => "MixedTabsAndSpaces",
            DiagnosticKind::InvalidNumber => "InvalidNumber",
            DiagnosticKind::UnexpectedToken => "UnexpectedToken",
            DiagnosticKind::MissingColon => "MissingColon",
            DiagnosticKind::MissingCloser => "MissingCloser",
            DiagnosticKind::UnsupportedConstruct => "UnsupportedConstruct",
            DiagnosticKind::EmptyBlock => "EmptyBlock",
            DiagnosticKind::UndefinedVariable => "UndefinedVariable",
            DiagnosticKind::ArityMismatch => "ArityMismatch",
            DiagnosticKind::TypeMismatch => "TypeMismatch",
            DiagnosticKind::ReturnOutsideFunction => "ReturnOutsideFunction",
            DiagnosticKind::BreakOutsideLoop => "BreakOutsideLoop",
            DiagnosticKind::Redefinition => "Redefinition",
            DiagnosticKind::InternalInvariant => "InternalInvariant",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub phase: Phase,
    pub severity: Severity,
    pub line: usize,
    pub column: usize,
    pub kind: DiagnosticKind,
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} at line {}:{}: {}: {}",
            self.phase, self.severity, self.line, self.column, self.kind, self.message
        )
    }
}

/// Accumulating sink shared by all phases of one pipeline invocation.
#[derive(Debug, Default)]
pub struct Diagnostics {
    entries: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn error(
        &mut self,
        phase: Phase,
        kind: DiagnosticKind,
        line: usize,
        column: usize,
        message: impl Into<String>,
    ) {
        self.entries.push(Diagnostic {
            phase,
            severity: Severity::Error,
            line,
            column,
            kind,
            message: message.into(),
        });
    }

    pub fn warning(
        &mut self,
        phase: Phase,
        kind: DiagnosticKind,
        line: usize,
        column: usize,
        message: impl Into<String>,
    ) {
        self.entries.push(Diagnostic {
            phase,
            severity: Severity::Warning,
            line,
            column,
            kind,
            message: message.into(),
        });
    }

    pub fn has_errors(&self) -> bool {
        self.entries
            .iter()
            .any(|entry| entry.severity == Severity::Error)
    }

    pub fn error_count(&self, phase: Phase) -> usize {
        self.entries
            .iter()
            .filter(|entry| entry.phase == phase && entry.severity == Severity::Error)
            .count()
    }

    /// Phase of the earliest error-severity entry, in accumulation order.
    pub fn first_error_phase(&self) -> Option<Phase> {
        self.entries
            .iter()
            .find(|entry| entry.severity == Severity::Error)
            .map(|entry| entry.phase)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.entries.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn into_vec(self) -> Vec<Diagnostic> {
        self.entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_phase_position_kind_and_message() {
        let mut sink = Diagnostics::new();
        sink.error(Phase::Semantic, DiagnosticKind::UndefinedVariable, 1, 5, "z");
        let rendered = sink.iter().next().expect("one entry").to_string();
        assert_eq!(rendered, "semantic error at line 1:5: UndefinedVariable: z");
    }

    #[test]
    fn warnings_do_not_count_as_errors() {
        let mut sink = Diagnostics::new();
        sink.warning(
            Phase::Parse,
            DiagnosticKind::UnexpectedToken,
            2,
            1,
            "stray semicolon",
        );
        assert!(!sink.has_errors());
        assert_eq!(sink.len(), 1);
        assert_eq!(sink.first_error_phase(), None);
    }

    #[test]
    fn counts_errors_per_phase() {
        let mut sink = Diagnostics::new();
        sink.error(Phase::Lex, DiagnosticKind::UnexpectedCharacter, 1, 1, "'$'");
        sink.error(Phase::Lex, DiagnosticKind::UnterminatedString, 3, 5, "string");
        sink.error(Phase::Parse, DiagnosticKind::MissingColon, 4, 9, "after 'if'");
        assert_eq!(sink.error_count(Phase::Lex), 2);
        assert_eq!(sink.error_count(Phase::Parse), 1);
        assert_eq!(sink.error_count(Phase::Semantic), 0);
        assert_eq!(sink.first_error_phase(), Some(Phase::Lex));
    }
}
