//! Semantic analysis: scope resolution and best-effort type inference.
//!
//! Walks the AST in source order with a stack of arena scopes. New scopes
//! open only for function bodies; `if`/`while`/`for` blocks share their
//! enclosing scope. Assignment declares into the current scope, reference
//! lookup walks outward, and every resolved node is annotated in place
//! with its symbol id. Type checks are advisory: `unknown` operands never
//! produce errors, and errors never stop the walk.

use crate::ast::{
    BinaryOperator, Expression, ExpressionKind, Program, Statement, StatementKind, UnaryOperator,
};
use crate::builtins::Builtin;
use crate::diagnostics::{DiagnosticKind, Diagnostics, Phase};
use crate::symbols::{ScopeId, Symbol, SymbolId, SymbolKind, SymbolTables, Type, GLOBAL_SCOPE};

/// Resolves `program` against a fresh symbol table, annotating the AST
/// and recording semantic diagnostics.
pub fn resolve(program: &mut Program, diagnostics: &mut Diagnostics) -> SymbolTables {
    let mut resolver = Resolver {
        tables: SymbolTables::new(),
        scope: GLOBAL_SCOPE,
        functions: Vec::new(),
        diagnostics,
    };
    resolver.resolve_block(&mut program.statements);
    resolver.tables
}

/// Per-function state while its body is being resolved.
struct FunctionFrame {
    symbol: SymbolId,
    /// Join of return value types seen so far; `None` before any
    /// `return`.
    returns: Option<Type>,
}

struct Resolver<'d> {
    tables: SymbolTables,
    scope: ScopeId,
    functions: Vec<FunctionFrame>,
    diagnostics: &'d mut Diagnostics,
}

impl<'d> Resolver<'d> {
    fn error(&mut self, kind: DiagnosticKind, line: usize, column: usize, message: String) {
        self.diagnostics
            .error(Phase::Semantic, kind, line, column, message);
    }

    fn resolve_block(&mut self, statements: &mut [Statement]) {
        for statement in statements {
            self.resolve_statement(statement);
        }
    }

    fn resolve_statement(&mut self, statement: &mut Statement) {
        let (line, column) = (statement.line, statement.column);
        match &mut statement.kind {
            StatementKind::Assignment {
                target,
                symbol,
                value,
            } => {
                let value_ty = self.resolve_expression(value);
                *symbol = Some(self.bind_target(target, value_ty, line, column));
            }
            StatementKind::If {
                condition,
                then_body,
                elif_clauses,
                else_body,
            } => {
                self.resolve_expression(condition);
                self.resolve_block(then_body);
                for (elif_condition, elif_body) in elif_clauses {
                    self.resolve_expression(elif_condition);
                    self.resolve_block(elif_body);
                }
                if let Some(else_body) = else_body {
                    self.resolve_block(else_body);
                }
            }
            StatementKind::While { condition, body } => {
                self.resolve_expression(condition);
                self.resolve_block(body);
            }
            StatementKind::For {
                variable,
                symbol,
                iterable,
                body,
            } => {
                let element_ty = self.resolve_iterable(iterable, line, column);
                *symbol = Some(self.bind_target(variable, element_ty, line, column));
                self.resolve_block(body);
            }
            StatementKind::FunctionDef {
                name,
                params,
                body,
                symbol,
                scope,
            } => {
                let declared = self.tables.declare(
                    self.scope,
                    Symbol {
                        name: name.clone(),
                        kind: SymbolKind::Function,
                        ty: Type::Function,
                        line,
                        scope: self.scope,
                        params: params.clone(),
                        return_ty: Type::None,
                    },
                );
                let function_id = match declared {
                    Ok(id) => id,
                    Err(_) => {
                        self.error(
                            DiagnosticKind::Redefinition,
                            line,
                            column,
                            format!("'{name}' is already defined in this scope"),
                        );
                        return;
                    }
                };
                *symbol = Some(function_id);

                let body_scope = self.tables.push_scope(self.scope);
                *scope = Some(body_scope);
                for param in params.iter() {
                    let result = self.tables.declare(
                        body_scope,
                        Symbol {
                            name: param.clone(),
                            kind: SymbolKind::Parameter,
                            ty: Type::Unknown,
                            line,
                            scope: body_scope,
                            params: Vec::new(),
                            return_ty: Type::None,
                        },
                    );
                    if result.is_err() {
                        self.error(
                            DiagnosticKind::Redefinition,
                            line,
                            column,
                            format!("duplicate parameter '{param}'"),
                        );
                    }
                }

                let enclosing = self.scope;
                self.scope = body_scope;
                self.functions.push(FunctionFrame {
                    symbol: function_id,
                    returns: None,
                });
                self.resolve_block(body);
                let frame = self.functions.pop();
                self.scope = enclosing;

                if let Some(frame) = frame {
                    self.tables.symbol_mut(function_id).return_ty =
                        frame.returns.unwrap_or(Type::None);
                }
            }
            StatementKind::Return(value) => {
                let ty = match value {
                    Some(expression) => self.resolve_expression(expression),
                    None => Type::None,
                };
                match self.functions.last_mut() {
                    Some(frame) => {
                        frame.returns = Some(match frame.returns {
                            Some(previous) => previous.join(ty),
                            None => ty,
                        });
                    }
                    None => {
                        self.error(
                            DiagnosticKind::ReturnOutsideFunction,
                            line,
                            column,
                            "return outside of a function".to_string(),
                        );
                    }
                }
            }
            StatementKind::Expr(expression) => {
                self.resolve_expression(expression);
            }
        }
    }

    /// Declares or re-types an assignment/loop target in the current
    /// scope and returns its symbol id.
    fn bind_target(&mut self, name: &str, ty: Type, line: usize, column: usize) -> SymbolId {
        if let Some(existing) = self.tables.lookup_local(self.scope, name) {
            let symbol = self.tables.symbol(existing);
            if matches!(symbol.kind, SymbolKind::Function | SymbolKind::Builtin) {
                self.error(
                    DiagnosticKind::Redefinition,
                    line,
                    column,
                    format!("'{name}' is already defined as a function"),
                );
            } else {
                let joined = symbol.ty.join(ty);
                self.tables.symbol_mut(existing).ty = joined;
            }
            return existing;
        }

        match self.tables.declare(
            self.scope,
            Symbol {
                name: name.to_string(),
                kind: SymbolKind::Variable,
                ty,
                line,
                scope: self.scope,
                params: Vec::new(),
                return_ty: Type::None,
            },
        ) {
            Ok(id) | Err(id) => id,
        }
    }

    /// Element type of a `for` iterable: range calls yield int, lists an
    /// unknown element, strings their characters.
    fn resolve_iterable(&mut self, iterable: &mut Expression, line: usize, column: usize) -> Type {
        let is_range_call = matches!(
            &iterable.kind,
            ExpressionKind::Call { callee, .. } if callee == "range"
        );
        let ty = self.resolve_expression(iterable);
        if is_range_call {
            // Only when 'range' still names the builtin.
            if let ExpressionKind::Call {
                symbol: Some(id), ..
            } = &iterable.kind
            {
                if self.tables.symbol(*id).kind == SymbolKind::Builtin {
                    return Type::Int;
                }
            }
        }
        match ty {
            Type::List | Type::Unknown => Type::Unknown,
            Type::Str => Type::Str,
            other => {
                self.error(
                    DiagnosticKind::TypeMismatch,
                    line,
                    column,
                    format!("cannot iterate over {other}"),
                );
                Type::Unknown
            }
        }
    }

    fn resolve_expression(&mut self, expression: &mut Expression) -> Type {
        let (line, column) = (expression.line, expression.column);
        match &mut expression.kind {
            ExpressionKind::Integer(_) => Type::Int,
            ExpressionKind::Float(_) => Type::Float,
            ExpressionKind::Str(_) => Type::Str,
            ExpressionKind::Boolean(_) => Type::Bool,
            ExpressionKind::NoneLiteral => Type::None,
            ExpressionKind::Identifier { name, symbol } => {
                match self.tables.lookup(self.scope, name) {
                    Some(id) => {
                        *symbol = Some(id);
                        self.tables.symbol(id).ty
                    }
                    None => {
                        let message = name.clone();
                        self.error(DiagnosticKind::UndefinedVariable, line, column, message);
                        Type::Unknown
                    }
                }
            }
            ExpressionKind::BinaryOp { op, left, right } => {
                let op = *op;
                let left_ty = self.resolve_expression(left);
                let right_ty = self.resolve_expression(right);
                self.check_binary(op, left_ty, right_ty, line, column)
            }
            ExpressionKind::UnaryOp { op, operand } => {
                let op = *op;
                let operand_ty = self.resolve_expression(operand);
                match op {
                    UnaryOperator::Not => Type::Bool,
                    UnaryOperator::Neg | UnaryOperator::Pos => {
                        if operand_ty.is_numeric() || operand_ty == Type::Unknown {
                            operand_ty
                        } else {
                            self.error(
                                DiagnosticKind::TypeMismatch,
                                line,
                                column,
                                format!("invalid operand type for '{}': {operand_ty}", op.symbol()),
                            );
                            Type::Unknown
                        }
                    }
                }
            }
            ExpressionKind::Call {
                callee,
                symbol,
                args,
            } => {
                let callee = callee.clone();
                let target = self.tables.lookup(self.scope, &callee);
                if let Some(id) = target {
                    *symbol = Some(id);
                }
                let arg_types: Vec<Type> = args
                    .iter_mut()
                    .map(|arg| self.resolve_expression(arg))
                    .collect();
                self.check_call(&callee, target, &arg_types, line, column)
            }
            ExpressionKind::Index { object, index } => {
                let object_ty = self.resolve_expression(object);
                let index_ty = self.resolve_expression(index);
                if !matches!(object_ty, Type::List | Type::Str | Type::Unknown) {
                    self.error(
                        DiagnosticKind::TypeMismatch,
                        line,
                        column,
                        format!("cannot index into {object_ty}"),
                    );
                }
                if !matches!(index_ty, Type::Int | Type::Unknown) {
                    self.error(
                        DiagnosticKind::TypeMismatch,
                        line,
                        column,
                        format!("index must be int, got {index_ty}"),
                    );
                }
                if object_ty == Type::Str {
                    Type::Str
                } else {
                    Type::Unknown
                }
            }
            ExpressionKind::List(elements) => {
                for element in elements {
                    self.resolve_expression(element);
                }
                Type::List
            }
        }
    }

    fn check_call(
        &mut self,
        callee: &str,
        target: Option<SymbolId>,
        arg_types: &[Type],
        line: usize,
        column: usize,
    ) -> Type {
        let id = match target {
            Some(id) => id,
            None => {
                self.error(
                    DiagnosticKind::UndefinedVariable,
                    line,
                    column,
                    callee.to_string(),
                );
                return Type::Unknown;
            }
        };

        match self.tables.symbol(id).kind {
            SymbolKind::Builtin => {
                let builtin = match Builtin::from_name(callee) {
                    Some(builtin) => builtin,
                    None => return Type::Unknown,
                };
                let (min, max) = builtin.arity();
                let count_ok =
                    arg_types.len() >= min && max.map_or(true, |max| arg_types.len() <= max);
                if !count_ok {
                    let expected = match (min, max) {
                        (min, Some(max)) if min == max => format!("{min}"),
                        (min, Some(max)) => format!("{min} to {max}"),
                        (min, None) => format!("at least {min}"),
                    };
                    self.error(
                        DiagnosticKind::ArityMismatch,
                        line,
                        column,
                        format!(
                            "'{callee}' expects {expected} argument(s), got {}",
                            arg_types.len()
                        ),
                    );
                }
                let class = builtin.arg_class();
                for (index, &ty) in arg_types.iter().enumerate() {
                    if !class.admits(ty) {
                        self.error(
                            DiagnosticKind::TypeMismatch,
                            line,
                            column,
                            format!(
                                "argument {} to '{callee}' must be {}, got {ty}",
                                index + 1,
                                class.describe()
                            ),
                        );
                    }
                }
                builtin.return_type()
            }
            SymbolKind::Function => {
                let expected = self.tables.symbol(id).param_count();
                if arg_types.len() != expected {
                    self.error(
                        DiagnosticKind::ArityMismatch,
                        line,
                        column,
                        format!(
                            "'{callee}' expects {expected} argument(s), got {}",
                            arg_types.len()
                        ),
                    );
                }
                // A function's return type is not trusted until its own
                // body has finished resolving.
                if self.functions.iter().any(|frame| frame.symbol == id) {
                    Type::Unknown
                } else {
                    self.tables.symbol(id).return_ty
                }
            }
            SymbolKind::Variable | SymbolKind::Parameter => {
                self.error(
                    DiagnosticKind::TypeMismatch,
                    line,
                    column,
                    format!("'{callee}' is not a function"),
                );
                Type::Unknown
            }
        }
    }

    fn check_binary(
        &mut self,
        op: BinaryOperator,
        left: Type,
        right: Type,
        line: usize,
        column: usize,
    ) -> Type {
        let unknown_involved = left == Type::Unknown || right == Type::Unknown;
        let both_numeric = left.is_numeric() && right.is_numeric();
        let numeric_result = if left == Type::Int && right == Type::Int {
            Type::Int
        } else {
            Type::Float
        };

        let mismatch = |resolver: &mut Self| {
            resolver.error(
                DiagnosticKind::TypeMismatch,
                line,
                column,
                format!(
                    "invalid operand types for '{}': {left} and {right}",
                    op.symbol()
                ),
            );
        };

        match op {
            BinaryOperator::And | BinaryOperator::Or => Type::Bool,
            BinaryOperator::Add => {
                if unknown_involved {
                    Type::Unknown
                } else if both_numeric {
                    numeric_result
                } else if left == Type::Str && right == Type::Str {
                    Type::Str
                } else if left == Type::List && right == Type::List {
                    Type::List
                } else {
                    mismatch(self);
                    Type::Unknown
                }
            }
            BinaryOperator::Mul => {
                if unknown_involved {
                    Type::Unknown
                } else if both_numeric {
                    numeric_result
                } else if (left == Type::Str && right == Type::Int)
                    || (left == Type::Int && right == Type::Str)
                {
                    Type::Str
                } else if (left == Type::List && right == Type::Int)
                    || (left == Type::Int && right == Type::List)
                {
                    Type::List
                } else {
                    mismatch(self);
                    Type::Unknown
                }
            }
            BinaryOperator::Sub | BinaryOperator::Div | BinaryOperator::Mod | BinaryOperator::Pow => {
                if unknown_involved {
                    Type::Unknown
                } else if both_numeric {
                    numeric_result
                } else {
                    mismatch(self);
                    Type::Unknown
                }
            }
            BinaryOperator::Equal
            | BinaryOperator::NotEqual
            | BinaryOperator::Less
            | BinaryOperator::LessEqual
            | BinaryOperator::Greater
            | BinaryOperator::GreaterEqual => {
                if !unknown_involved && !both_numeric && left != right {
                    mismatch(self);
                }
                Type::Bool
            }
        }
    }
}
