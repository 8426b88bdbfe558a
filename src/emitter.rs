//! Three-address code generation.
//!
//! A post-order walk of the resolved AST appends to a flat instruction
//! list. Expressions return the operand holding their value: literals and
//! identifiers are used in place, everything else lands in a fresh
//! temporary. Temporaries and labels come from per-invocation monotonic
//! counters, so identical programs emit byte-identical listings.

use std::fmt;

use crate::ast::{
    format_float, quote_string, BinaryOperator, Expression, ExpressionKind, Program, Statement,
    StatementKind, UnaryOperator,
};
use crate::symbols::{SymbolId, SymbolKind, SymbolTables};

#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Temp(u32),
    Name(String),
    Int(i64),
    Float(f64),
    Str(String),
    Bool(bool),
    None,
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Temp(index) => write!(f, "t{index}"),
            Operand::Name(name) => f.write_str(name),
            Operand::Int(value) => write!(f, "{value}"),
            Operand::Float(value) => f.write_str(&format_float(*value)),
            Operand::Str(value) => f.write_str(&quote_string(value)),
            Operand::Bool(value) => f.write_str(if *value { "true" } else { "false" }),
            Operand::None => f.write_str("None"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Label(pub u32);

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "L{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Instruction {
    Binary {
        dest: Operand,
        op: BinaryOperator,
        left: Operand,
        right: Operand,
    },
    Unary {
        dest: Operand,
        op: UnaryOperator,
        operand: Operand,
    },
    Copy {
        dest: Operand,
        src: Operand,
    },
    IndexLoad {
        dest: Operand,
        base: Operand,
        index: Operand,
    },
    Len {
        dest: Operand,
        source: Operand,
    },
    NewList {
        dest: Operand,
    },
    Append {
        list: Operand,
        value: Operand,
    },
    Label(Label),
    Goto(Label),
    IfTrue {
        cond: Operand,
        target: Label,
    },
    IfFalse {
        cond: Operand,
        target: Label,
    },
    Param(Operand),
    Call {
        name: String,
        argc: usize,
        dest: Operand,
    },
    Print(Operand),
    Return(Option<Operand>),
    FuncBegin {
        name: String,
        argc: usize,
    },
    FuncEnd,
}

fn unary_opcode(op: UnaryOperator) -> &'static str {
    match op {
        UnaryOperator::Neg => "NEG",
        UnaryOperator::Pos => "POS",
        UnaryOperator::Not => "NOT",
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instruction::Binary {
                dest,
                op,
                left,
                right,
            } => write!(f, "{dest} = {left} {} {right}", op.symbol()),
            Instruction::Unary { dest, op, operand } => {
                write!(f, "{dest} = {} {operand}", unary_opcode(*op))
            }
            Instruction::Copy { dest, src } => write!(f, "{dest} = {src}"),
            Instruction::IndexLoad { dest, base, index } => {
                write!(f, "{dest} = {base}[{index}]")
            }
            Instruction::Len { dest, source } => write!(f, "{dest} = LEN {source}"),
            Instruction::NewList { dest } => write!(f, "{dest} = NEW_LIST"),
            Instruction::Append { list, value } => write!(f, "APPEND {list}, {value}"),
            Instruction::Label(label) => write!(f, "LABEL {label}"),
            Instruction::Goto(label) => write!(f, "GOTO {label}"),
            Instruction::IfTrue { cond, target } => write!(f, "IF {cond} GOTO {target}"),
            Instruction::IfFalse { cond, target } => {
                write!(f, "IF_FALSE {cond} GOTO {target}")
            }
            Instruction::Param(operand) => write!(f, "PARAM {operand}"),
            Instruction::Call { name, argc, dest } => {
                write!(f, "CALL {name}, {argc}, {dest}")
            }
            Instruction::Print(operand) => write!(f, "PRINT {operand}"),
            Instruction::Return(Some(operand)) => write!(f, "RETURN {operand}"),
            Instruction::Return(Option::None) => f.write_str("RETURN"),
            Instruction::FuncBegin { name, argc } => {
                write!(f, "FUNC_BEGIN {name}, {argc}")
            }
            Instruction::FuncEnd => f.write_str("FUNC_END"),
        }
    }
}

/// Renders the stable external listing: `<n>: <payload>`, 1-based.
pub fn render(instructions: &[Instruction]) -> String {
    let mut out = String::new();
    for (index, instruction) in instructions.iter().enumerate() {
        out.push_str(&format!("{}: {instruction}\n", index + 1));
    }
    out
}

/// Emits three-address code for a resolved program.
pub fn emit(program: &Program, tables: &SymbolTables) -> Vec<Instruction> {
    let mut emitter = Emitter {
        tables,
        instructions: Vec::new(),
        temp_counter: 0,
        label_counter: 0,
    };
    for statement in &program.statements {
        emitter.emit_statement(statement);
    }
    emitter.instructions
}

struct Emitter<'a> {
    tables: &'a SymbolTables,
    instructions: Vec<Instruction>,
    temp_counter: u32,
    label_counter: u32,
}

impl<'a> Emitter<'a> {
    fn new_temp(&mut self) -> Operand {
        self.temp_counter += 1;
        Operand::Temp(self.temp_counter)
    }

    fn new_label(&mut self) -> Label {
        self.label_counter += 1;
        Label(self.label_counter)
    }

    fn push(&mut self, instruction: Instruction) {
        self.instructions.push(instruction);
    }

    fn emit_block(&mut self, statements: &[Statement]) {
        for statement in statements {
            self.emit_statement(statement);
        }
    }

    fn emit_statement(&mut self, statement: &Statement) {
        match &statement.kind {
            StatementKind::Assignment { target, value, .. } => {
                let src = self.emit_expression(value);
                self.push(Instruction::Copy {
                    dest: Operand::Name(target.clone()),
                    src,
                });
            }
            StatementKind::If {
                condition,
                then_body,
                elif_clauses,
                else_body,
            } => self.emit_if(condition, then_body, elif_clauses, else_body.as_deref()),
            StatementKind::While { condition, body } => {
                let start = self.new_label();
                let end = self.new_label();
                self.push(Instruction::Label(start));
                let cond = self.emit_expression(condition);
                self.push(Instruction::IfFalse { cond, target: end });
                self.emit_block(body);
                self.push(Instruction::Goto(start));
                self.push(Instruction::Label(end));
            }
            StatementKind::For {
                variable,
                iterable,
                body,
                ..
            } => self.emit_for(variable, iterable, body),
            StatementKind::FunctionDef {
                name, params, body, ..
            } => {
                self.push(Instruction::FuncBegin {
                    name: name.clone(),
                    argc: params.len(),
                });
                self.emit_block(body);
                if !matches!(self.instructions.last(), Some(Instruction::Return(_))) {
                    self.push(Instruction::Return(Option::None));
                }
                self.push(Instruction::FuncEnd);
            }
            StatementKind::Return(value) => {
                let operand = value.as_ref().map(|value| self.emit_expression(value));
                self.push(Instruction::Return(operand));
            }
            StatementKind::Expr(expression) => {
                self.emit_expression(expression);
            }
        }
    }

    /// An `if` with no other arms needs only the end label; a chain
    /// allocates each arm's next label before the shared end label.
    fn emit_if(
        &mut self,
        condition: &Expression,
        then_body: &[Statement],
        elif_clauses: &[(Expression, Vec<Statement>)],
        else_body: Option<&[Statement]>,
    ) {
        let cond = self.emit_expression(condition);

        if elif_clauses.is_empty() && else_body.is_none() {
            let end = self.new_label();
            self.push(Instruction::IfFalse { cond, target: end });
            self.emit_block(then_body);
            self.push(Instruction::Label(end));
            return;
        }

        let mut next = self.new_label();
        self.push(Instruction::IfFalse { cond, target: next });
        self.emit_block(then_body);
        let end = self.new_label();
        self.push(Instruction::Goto(end));
        self.push(Instruction::Label(next));

        for (elif_condition, elif_body) in elif_clauses {
            let elif_cond = self.emit_expression(elif_condition);
            next = self.new_label();
            self.push(Instruction::IfFalse {
                cond: elif_cond,
                target: next,
            });
            self.emit_block(elif_body);
            self.push(Instruction::Goto(end));
            self.push(Instruction::Label(next));
        }

        if let Some(else_body) = else_body {
            self.emit_block(else_body);
        }
        self.push(Instruction::Label(end));
    }

    /// Desugars `for` into an index/length while-loop over the evaluated
    /// iterable.
    fn emit_for(&mut self, variable: &str, iterable: &Expression, body: &[Statement]) {
        let iter = self.emit_expression(iterable);
        let index = self.new_temp();
        let length = self.new_temp();
        self.push(Instruction::Copy {
            dest: index.clone(),
            src: Operand::Int(0),
        });
        self.push(Instruction::Len {
            dest: length.clone(),
            source: iter.clone(),
        });

        let start = self.new_label();
        let end = self.new_label();
        self.push(Instruction::Label(start));
        let cond = self.new_temp();
        self.push(Instruction::Binary {
            dest: cond.clone(),
            op: BinaryOperator::Less,
            left: index.clone(),
            right: length,
        });
        self.push(Instruction::IfFalse { cond, target: end });
        self.push(Instruction::IndexLoad {
            dest: Operand::Name(variable.to_string()),
            base: iter,
            index: index.clone(),
        });
        self.emit_block(body);

        let bumped = self.new_temp();
        self.push(Instruction::Binary {
            dest: bumped.clone(),
            op: BinaryOperator::Add,
            left: index.clone(),
            right: Operand::Int(1),
        });
        self.push(Instruction::Copy {
            dest: index,
            src: bumped,
        });
        self.push(Instruction::Goto(start));
        self.push(Instruction::Label(end));
    }

    fn emit_expression(&mut self, expression: &Expression) -> Operand {
        match &expression.kind {
            ExpressionKind::Integer(value) => Operand::Int(*value),
            ExpressionKind::Float(value) => Operand::Float(*value),
            ExpressionKind::Str(value) => Operand::Str(value.clone()),
            ExpressionKind::Boolean(value) => Operand::Bool(*value),
            ExpressionKind::NoneLiteral => Operand::None,
            ExpressionKind::Identifier { name, .. } => Operand::Name(name.clone()),
            ExpressionKind::BinaryOp { op, left, right } => match op {
                BinaryOperator::And => self.emit_short_circuit(left, right, false),
                BinaryOperator::Or => self.emit_short_circuit(left, right, true),
                _ => {
                    let left = self.emit_expression(left);
                    let right = self.emit_expression(right);
                    let dest = self.new_temp();
                    self.push(Instruction::Binary {
                        dest: dest.clone(),
                        op: *op,
                        left,
                        right,
                    });
                    dest
                }
            },
            ExpressionKind::UnaryOp { op, operand } => {
                let operand = self.emit_expression(operand);
                let dest = self.new_temp();
                self.push(Instruction::Unary {
                    dest: dest.clone(),
                    op: *op,
                    operand,
                });
                dest
            }
            ExpressionKind::Call {
                callee,
                symbol,
                args,
            } => self.emit_call(callee, *symbol, args),
            ExpressionKind::Index { object, index } => {
                let base = self.emit_expression(object);
                let index = self.emit_expression(index);
                let dest = self.new_temp();
                self.push(Instruction::IndexLoad {
                    dest: dest.clone(),
                    base,
                    index,
                });
                dest
            }
            ExpressionKind::List(elements) => {
                let dest = self.new_temp();
                self.push(Instruction::NewList { dest: dest.clone() });
                for element in elements {
                    let value = self.emit_expression(element);
                    self.push(Instruction::Append {
                        list: dest.clone(),
                        value,
                    });
                }
                dest
            }
        }
    }

    /// Short-circuit lowering for `and`/`or`. The short-circuit label is
    /// allocated before the end label; both branches assign the same
    /// temporary.
    fn emit_short_circuit(
        &mut self,
        left: &Expression,
        right: &Expression,
        jump_on_true: bool,
    ) -> Operand {
        let left = self.emit_expression(left);
        let short = self.new_label();
        let end = self.new_label();
        let dest = self.new_temp();

        if jump_on_true {
            self.push(Instruction::IfTrue {
                cond: left,
                target: short,
            });
        } else {
            self.push(Instruction::IfFalse {
                cond: left,
                target: short,
            });
        }
        let right = self.emit_expression(right);
        self.push(Instruction::Copy {
            dest: dest.clone(),
            src: right,
        });
        self.push(Instruction::Goto(end));
        self.push(Instruction::Label(short));
        self.push(Instruction::Copy {
            dest: dest.clone(),
            src: Operand::Bool(jump_on_true),
        });
        self.push(Instruction::Label(end));
        dest
    }

    fn emit_call(
        &mut self,
        callee: &str,
        symbol: Option<SymbolId>,
        args: &[Expression],
    ) -> Operand {
        let is_builtin_print = callee == "print"
            && symbol.map_or(true, |id| self.tables.symbol(id).kind == SymbolKind::Builtin);

        if is_builtin_print {
            if args.is_empty() {
                self.push(Instruction::Print(Operand::Str(String::new())));
            } else {
                for arg in args {
                    let operand = self.emit_expression(arg);
                    self.push(Instruction::Print(operand));
                }
            }
            return Operand::None;
        }

        for arg in args {
            let operand = self.emit_expression(arg);
            self.push(Instruction::Param(operand));
        }
        let dest = self.new_temp();
        self.push(Instruction::Call {
            name: callee.to_string(),
            argc: args.len(),
            dest: dest.clone(),
        });
        dest
    }
}
