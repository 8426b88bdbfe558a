//! Scope arena and symbol records.
//!
//! Scopes live in a flat arena indexed by `ScopeId`; AST nodes refer to
//! symbols through `SymbolId`, so the tree holds no pointers into the
//! table and the table none into the tree.

use std::collections::HashMap;
use std::fmt;

use crate::builtins::Builtin;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScopeId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SymbolId(pub u32);

/// Inferred type lattice: `Int <= Float`, everything else incomparable,
/// `Unknown` on top.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Type {
    Int,
    Float,
    Str,
    Bool,
    List,
    None,
    Function,
    Unknown,
}

impl Type {
    pub fn is_numeric(self) -> bool {
        matches!(self, Type::Int | Type::Float)
    }

    /// Least upper bound of two inferred types.
    pub fn join(self, other: Type) -> Type {
        if self == other {
            return self;
        }
        match (self, other) {
            (Type::Int, Type::Float) | (Type::Float, Type::Int) => Type::Float,
            _ => Type::Unknown,
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Type::Int => "int",
            Type::Float => "float",
            Type::Str => "string",
            Type::Bool => "bool",
            Type::List => "list",
            Type::None => "none",
            Type::Function => "function",
            Type::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolKind {
    Variable,
    Function,
    Parameter,
    Builtin,
}

impl fmt::Display for SymbolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SymbolKind::Variable => "variable",
            SymbolKind::Function => "function",
            SymbolKind::Parameter => "parameter",
            SymbolKind::Builtin => "builtin",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Symbol {
    pub name: String,
    pub kind: SymbolKind,
    pub ty: Type,
    pub line: usize,
    pub scope: ScopeId,
    /// Parameter names, for function symbols.
    pub params: Vec<String>,
    /// Join of return expression types, for function symbols.
    pub return_ty: Type,
}

impl Symbol {
    pub fn param_count(&self) -> usize {
        self.params.len()
    }
}

#[derive(Debug, Clone)]
pub struct Scope {
    pub parent: Option<ScopeId>,
    names: HashMap<String, SymbolId>,
}

/// All scopes and symbols of one resolved program.
#[derive(Debug, Clone)]
pub struct SymbolTables {
    scopes: Vec<Scope>,
    symbols: Vec<Symbol>,
}

pub const GLOBAL_SCOPE: ScopeId = ScopeId(0);

impl SymbolTables {
    /// Fresh table with the global scope holding the builtin functions.
    pub fn new() -> Self {
        let mut tables = Self {
            scopes: vec![Scope {
                parent: None,
                names: HashMap::new(),
            }],
            symbols: Vec::new(),
        };
        for builtin in Builtin::ALL {
            tables.insert(
                GLOBAL_SCOPE,
                Symbol {
                    name: builtin.name().to_string(),
                    kind: SymbolKind::Builtin,
                    ty: Type::Function,
                    line: 0,
                    scope: GLOBAL_SCOPE,
                    params: Vec::new(),
                    return_ty: builtin.return_type(),
                },
            );
        }
        tables
    }

    pub fn push_scope(&mut self, parent: ScopeId) -> ScopeId {
        let id = ScopeId(self.scopes.len() as u32);
        self.scopes.push(Scope {
            parent: Some(parent),
            names: HashMap::new(),
        });
        id
    }

    /// Declares `symbol` in `scope`. Names are unique per scope; returns
    /// the existing id untouched when the name is already taken.
    pub fn declare(&mut self, scope: ScopeId, symbol: Symbol) -> Result<SymbolId, SymbolId> {
        if let Some(&existing) = self.scopes[scope.0 as usize].names.get(&symbol.name) {
            return Err(existing);
        }
        Ok(self.insert(scope, symbol))
    }

    fn insert(&mut self, scope: ScopeId, symbol: Symbol) -> SymbolId {
        let id = SymbolId(self.symbols.len() as u32);
        self.scopes[scope.0 as usize]
            .names
            .insert(symbol.name.clone(), id);
        self.symbols.push(symbol);
        id
    }

    pub fn lookup_local(&self, scope: ScopeId, name: &str) -> Option<SymbolId> {
        self.scopes[scope.0 as usize].names.get(name).copied()
    }

    /// Innermost-to-outermost lookup along the parent chain.
    pub fn lookup(&self, scope: ScopeId, name: &str) -> Option<SymbolId> {
        let mut current = Some(scope);
        while let Some(id) = current {
            if let Some(found) = self.lookup_local(id, name) {
                return Some(found);
            }
            current = self.scopes[id.0 as usize].parent;
        }
        None
    }

    pub fn symbol(&self, id: SymbolId) -> &Symbol {
        &self.symbols[id.0 as usize]
    }

    pub fn symbol_mut(&mut self, id: SymbolId) -> &mut Symbol {
        &mut self.symbols[id.0 as usize]
    }

    pub fn scope(&self, id: ScopeId) -> &Scope {
        &self.scopes[id.0 as usize]
    }

    pub fn scope_count(&self) -> usize {
        self.scopes.len()
    }

    pub fn symbols(&self) -> impl Iterator<Item = (SymbolId, &Symbol)> {
        self.symbols
            .iter()
            .enumerate()
            .map(|(index, symbol)| (SymbolId(index as u32), symbol))
    }

    /// Debug dump used by the driver's `--debug` mode: one line per
    /// symbol, grouped by scope in declaration order.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for (index, _) in self.scopes.iter().enumerate() {
            let id = ScopeId(index as u32);
            let header = if id == GLOBAL_SCOPE {
                "scope 0 (global)".to_string()
            } else {
                format!("scope {index}")
            };
            out.push_str(&header);
            out.push('\n');
            let mut entries: Vec<&Symbol> = self
                .symbols
                .iter()
                .filter(|symbol| symbol.scope == id)
                .collect();
            entries.sort_by(|a, b| a.name.cmp(&b.name));
            for symbol in entries {
                out.push_str(&format!(
                    "  {} {} : {}",
                    symbol.kind, symbol.name, symbol.ty
                ));
                if symbol.kind == SymbolKind::Function {
                    out.push_str(&format!(
                        " ({}) -> {}",
                        symbol.params.join(", "),
                        symbol.return_ty
                    ));
                }
                out.push('\n');
            }
        }
        out
    }
}

impl Default for SymbolTables {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn variable(name: &str, ty: Type, scope: ScopeId) -> Symbol {
        Symbol {
            name: name.to_string(),
            kind: SymbolKind::Variable,
            ty,
            line: 1,
            scope,
            params: Vec::new(),
            return_ty: Type::None,
        }
    }

    #[test]
    fn global_scope_is_seeded_with_builtins() {
        let tables = SymbolTables::new();
        for name in ["print", "input", "len", "int", "float", "str", "bool", "range"] {
            let id = tables.lookup(GLOBAL_SCOPE, name).expect("builtin present");
            assert_eq!(tables.symbol(id).kind, SymbolKind::Builtin);
        }
    }

    #[test]
    fn lookup_walks_parent_scopes() {
        let mut tables = SymbolTables::new();
        let outer = tables
            .declare(GLOBAL_SCOPE, variable("x", Type::Int, GLOBAL_SCOPE))
            .expect("declare x");
        let inner = tables.push_scope(GLOBAL_SCOPE);
        assert_eq!(tables.lookup(inner, "x"), Some(outer));
        assert_eq!(tables.lookup_local(inner, "x"), None);
    }

    #[test]
    fn inner_declarations_shadow_outer_ones() {
        let mut tables = SymbolTables::new();
        let outer = tables
            .declare(GLOBAL_SCOPE, variable("x", Type::Int, GLOBAL_SCOPE))
            .expect("declare outer x");
        let inner_scope = tables.push_scope(GLOBAL_SCOPE);
        let inner = tables
            .declare(inner_scope, variable("x", Type::Str, inner_scope))
            .expect("declare inner x");
        assert_ne!(outer, inner);
        assert_eq!(tables.lookup(inner_scope, "x"), Some(inner));
        assert_eq!(tables.lookup(GLOBAL_SCOPE, "x"), Some(outer));
    }

    #[test]
    fn duplicate_declaration_returns_existing_id() {
        let mut tables = SymbolTables::new();
        let first = tables
            .declare(GLOBAL_SCOPE, variable("x", Type::Int, GLOBAL_SCOPE))
            .expect("declare x");
        let err = tables
            .declare(GLOBAL_SCOPE, variable("x", Type::Str, GLOBAL_SCOPE))
            .expect_err("duplicate rejected");
        assert_eq!(err, first);
    }

    #[test]
    fn join_follows_the_lattice() {
        assert_eq!(Type::Int.join(Type::Int), Type::Int);
        assert_eq!(Type::Int.join(Type::Float), Type::Float);
        assert_eq!(Type::Float.join(Type::Int), Type::Float);
        assert_eq!(Type::Str.join(Type::Int), Type::Unknown);
        assert_eq!(Type::Unknown.join(Type::Int), Type::Unknown);
        assert_eq!(Type::List.join(Type::List), Type::List);
    }
}
