use log::debug;

use crate::compiler::ast::Type;

use super::error::SemanticError;

/// Handle into the scope arena. Copying the id does not copy the scope.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ScopeId(usize);

/// What a name in a scope resolves to.
#[derive(Clone, Debug, PartialEq)]
pub enum Identifier {
    Variable(Type),
    Param(Type),
    Function {
        ty: Type,
        /// Scope created for the function's body, kept so codegen can size
        /// the callee's frame.
        body_scope: ScopeId,
    },
}

impl Identifier {
    /// The value type of a variable or parameter; `None` for functions.
    pub fn var_type(&self) -> Option<&Type> {
        match self {
            Identifier::Variable(ty) | Identifier::Param(ty) => Some(ty),
            Identifier::Function { .. } => None,
        }
    }

    pub fn is_function(&self) -> bool {
        matches!(self, Identifier::Function { .. })
    }
}

#[derive(Clone, Debug, PartialEq)]
struct Symbol {
    name: String,
    ident: Identifier,
}

#[derive(Clone, Debug, PartialEq)]
struct Scope {
    parent: Option<ScopeId>,
    symbols: Vec<Symbol>,
    /// Bytes of stack the scope's variables occupy; cached by `close`.
    frame_size: Option<i32>,
}

/**
 All scopes of a program, stored as an arena indexed by `ScopeId`.

 The scope tree mirrors the block structure of the source: the root scope
 holds function signatures only, each function gets a scope for its formals
 with a child scope for its body, and every nested block opens a child of
 the enclosing scope. Name resolution walks the parent chain, so an inner
 declaration shadows an outer one without removing it.
*/
#[derive(Clone, Debug, PartialEq)]
pub struct SymbolTable {
    scopes: Vec<Scope>,
}

impl SymbolTable {
    pub fn new() -> Self {
        SymbolTable {
            scopes: vec![Scope {
                parent: None,
                symbols: vec![],
                frame_size: None,
            }],
        }
    }

    /// The root scope. Only function signatures live here.
    pub fn top_level(&self) -> ScopeId {
        ScopeId(0)
    }

    pub fn is_top_level(&self, scope: ScopeId) -> bool {
        scope == self.top_level()
    }

    /// Opens a new scope whose lookups fall through to `parent`.
    pub fn sub_scope(&mut self, parent: ScopeId) -> ScopeId {
        let id = ScopeId(self.scopes.len());
        self.scopes.push(Scope {
            parent: Some(parent),
            symbols: vec![],
            frame_size: None,
        });
        debug!("Opened scope {:?} under {:?}", id, parent);
        id
    }

    /// Declares `name` in `scope`. Fails if the scope itself (not a parent)
    /// already has the name; shadowing an outer declaration is legal.
    pub fn add(
        &mut self,
        scope: ScopeId,
        name: &str,
        ident: Identifier,
    ) -> Result<(), SemanticError> {
        if self.lookup(scope, name).is_some() {
            return Err(SemanticError::IdentifierAlreadyDeclared(name.into()));
        }
        self.scopes[scope.0].symbols.push(Symbol {
            name: name.into(),
            ident,
        });
        Ok(())
    }

    /// Resolves `name` in `scope` alone.
    pub fn lookup(&self, scope: ScopeId, name: &str) -> Option<&Identifier> {
        self.scopes[scope.0]
            .symbols
            .iter()
            .find(|s| s.name == name)
            .map(|s| &s.ident)
    }

    /// Resolves `name` in `scope` and then up the parent chain.
    pub fn lookup_all(&self, scope: ScopeId, name: &str) -> Option<&Identifier> {
        let mut current = Some(scope);
        while let Some(id) = current {
            if let Some(ident) = self.lookup(id, name) {
                return Some(ident);
            }
            current = self.scopes[id.0].parent;
        }
        None
    }

    /// Names declared directly in `scope`, in declaration order.
    pub fn names(&self, scope: ScopeId) -> impl Iterator<Item = &str> {
        self.scopes[scope.0].symbols.iter().map(|s| s.name.as_str())
    }

    /// Seals a scope once analysis of its block is done, caching the bytes
    /// its variables need on the stack.
    pub fn close(&mut self, scope: ScopeId) {
        let size = self.scopes[scope.0]
            .symbols
            .iter()
            .filter_map(|s| s.ident.var_type())
            .map(Type::size)
            .sum();
        self.scopes[scope.0].frame_size = Some(size);
        debug!("Closed scope {:?}, frame size {}", scope, size);
    }

    /// Bytes of stack the scope's variables occupy. Zero until `close` has
    /// been called on the scope.
    pub fn stack_size(&self, scope: ScopeId) -> i32 {
        self.scopes[scope.0].frame_size.unwrap_or(0)
    }
}
