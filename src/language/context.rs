use crate::language::types::Type;
use std::collections::HashMap;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ScopeId(pub usize);

#[derive(Clone, Debug, Default)]
pub struct Scope {
    pub parent: Option<ScopeId>,
    pub variables: HashMap<String, Type>,
}

/// Parent-linked scope tree built by the type checker, one scope per block.
#[derive(Clone, Debug)]
pub struct ContextTree {
    scopes: Vec<Scope>,
}

impl Default for ContextTree {
    fn default() -> Self {
        Self::new()
    }
}

impl ContextTree {
    pub fn new() -> Self {
        Self {
            scopes: vec![Scope::default()],
        }
    }

    pub fn root(&self) -> ScopeId {
        ScopeId(0)
    }

    pub fn child(&mut self, parent: ScopeId) -> ScopeId {
        self.scopes.push(Scope {
            parent: Some(parent),
            variables: HashMap::new(),
        });
        ScopeId(self.scopes.len() - 1)
    }

    pub fn define(&mut self, scope: ScopeId, name: impl Into<String>, ty: Type) {
        if let Some(entry) = self.scopes.get_mut(scope.0) {
            entry.variables.insert(name.into(), ty);
        }
    }

    pub fn parent(&self, scope: ScopeId) -> Option<ScopeId> {
        self.scopes.get(scope.0).and_then(|entry| entry.parent)
    }

    /// Whether `name` is defined in `scope` itself, ignoring ancestors.
    pub fn declares(&self, scope: ScopeId, name: &str) -> bool {
        self.scopes
            .get(scope.0)
            .is_some_and(|entry| entry.variables.contains_key(name))
    }

    /// Walks outward from `scope` until the name is found.
    pub fn lookup(&self, scope: ScopeId, name: &str) -> Option<&Type> {
        let mut current = Some(scope);
        while let Some(id) = current {
            let entry = self.scopes.get(id.0)?;
            if let Some(ty) = entry.variables.get(name) {
                return Some(ty);
            }
            current = entry.parent;
        }
        None
    }

    pub fn len(&self) -> usize {
        self.scopes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scopes.is_empty()
    }
}
