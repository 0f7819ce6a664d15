use std::collections::HashMap;

/// Where a symbol's value lives at run time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SymbolScope {
    Global,
    Local,
    /// Captured from an enclosing function; indexes the closure's free slots.
    Free,
    Builtin,
    /// The name of the function currently being compiled (self-reference).
    Function,
}

/// `scope` + `index` is the whole runtime address of a name; the VM never
/// looks names up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Symbol {
    pub name: String,
    pub scope: SymbolScope,
    pub index: usize,
}

/// Bindings of one lexical level (the global level or one function body).
#[derive(Debug, Clone, Default)]
pub struct SymbolTable {
    store: HashMap<String, Symbol>,
    num_definitions: usize,
    /// Outer symbols captured by this level, in discovery order. The
    /// compiler loads these (in the outer scope) right before `OpClosure`.
    pub free_symbols: Vec<Symbol>,
    /// Index of the enclosing table in the owning `SymbolTableStack`.
    outer: Option<usize>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of global or local slots allocated so far.
    pub fn num_definitions(&self) -> usize {
        self.num_definitions
    }

    /// Binds `name` at this level. Redefining a name that already has a
    /// slot at this level reuses the slot.
    pub fn define(&mut self, name: &str) -> Symbol {
        let scope = if self.outer.is_none() {
            SymbolScope::Global
        } else {
            SymbolScope::Local
        };

        if let Some(existing) = self.store.get(name) {
            if existing.scope == scope {
                return existing.clone();
            }
        }

        let symbol = Symbol {
            name: name.to_string(),
            scope,
            index: self.num_definitions,
        };
        self.num_definitions += 1;
        self.store.insert(name.to_string(), symbol.clone());
        symbol
    }

    pub fn define_builtin(&mut self, index: usize, name: &str) -> Symbol {
        let symbol = Symbol {
            name: name.to_string(),
            scope: SymbolScope::Builtin,
            index,
        };
        self.store.insert(name.to_string(), symbol.clone());
        symbol
    }

    pub fn define_function_name(&mut self, name: &str) -> Symbol {
        let symbol = Symbol {
            name: name.to_string(),
            scope: SymbolScope::Function,
            index: 0,
        };
        self.store.insert(name.to_string(), symbol.clone());
        symbol
    }

    fn define_free(&mut self, original: Symbol) -> Symbol {
        let symbol = Symbol {
            name: original.name.clone(),
            scope: SymbolScope::Free,
            index: self.free_symbols.len(),
        };
        self.free_symbols.push(original);
        self.store.insert(symbol.name.clone(), symbol.clone());
        symbol
    }

    /// Looks `name` up at this level only.
    pub fn get(&self, name: &str) -> Option<&Symbol> {
        self.store.get(name)
    }
}

/// The chain of symbol tables for the function nesting currently being
/// compiled. Index 0 is the global table.
#[derive(Debug, Clone)]
pub struct SymbolTableStack {
    tables: Vec<SymbolTable>,
}

impl SymbolTableStack {
    pub fn new(global: SymbolTable) -> Self {
        SymbolTableStack {
            tables: vec![global],
        }
    }

    pub fn depth(&self) -> usize {
        self.tables.len()
    }

    pub fn current(&self) -> &SymbolTable {
        &self.tables[self.tables.len() - 1]
    }

    pub fn current_mut(&mut self) -> &mut SymbolTable {
        let last = self.tables.len() - 1;
        &mut self.tables[last]
    }

    /// Opens a new function level enclosed by the current one.
    pub fn push(&mut self) {
        let table = SymbolTable {
            outer: Some(self.tables.len() - 1),
            ..SymbolTable::default()
        };
        self.tables.push(table);
    }

    /// Closes the innermost function level. The global table is never popped.
    pub fn pop(&mut self) -> Option<SymbolTable> {
        if self.tables.len() > 1 {
            self.tables.pop()
        } else {
            None
        }
    }

    pub fn define(&mut self, name: &str) -> Symbol {
        self.current_mut().define(name)
    }

    pub fn resolve(&mut self, name: &str) -> Option<Symbol> {
        let innermost = self.tables.len() - 1;
        self.resolve_at(innermost, name)
    }

    /// Resolves from table `level` outwards. A hit in an enclosing function
    /// level becomes a free symbol of `level` (and, through the recursion,
    /// of every level in between).
    fn resolve_at(&mut self, level: usize, name: &str) -> Option<Symbol> {
        if let Some(symbol) = self.tables[level].get(name) {
            return Some(symbol.clone());
        }

        let outer = self.tables[level].outer?;
        let symbol = self.resolve_at(outer, name)?;

        match symbol.scope {
            SymbolScope::Global | SymbolScope::Builtin => Some(symbol),
            _ => Some(self.tables[level].define_free(symbol)),
        }
    }

    /// Hands back the global table, dropping any open function levels.
    pub fn into_global(mut self) -> SymbolTable {
        self.tables.truncate(1);
        self.tables.swap_remove(0)
    }
}
