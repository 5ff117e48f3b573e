//! Lexical scope tree
//!
//! Scopes form a tree mirroring the source nesting. Each scope maps names to
//! the definitions that bind them; lookup walks the parent chain. The
//! translation unit owns the arena, so scopes outlive the nodes that refer
//! to them.

use crate::ast::DefnId;
use hashbrown::HashMap;
use serde::{Deserialize, Serialize};

/// Handle into the scope arena.
pub type ScopeId = u32;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Scope {
    pub parent: Option<ScopeId>,
    symbols: HashMap<String, DefnId>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Scopes {
    arena: Vec<Scope>,
}

impl Scopes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alloc(&mut self, parent: Option<ScopeId>) -> ScopeId {
        let id = self.arena.len() as ScopeId;
        self.arena.push(Scope { parent, symbols: HashMap::new() });
        id
    }

    pub fn get(&self, id: ScopeId) -> &Scope {
        &self.arena[id as usize]
    }

    pub fn parent(&self, id: ScopeId) -> Option<ScopeId> {
        self.get(id).parent
    }

    /// Bind `name` to `defn` in `scope`. Returns the previous binding if the
    /// name was already taken in this scope (the caller reports it fatal).
    pub fn add(&mut self, scope: ScopeId, name: &str, defn: DefnId) -> Option<DefnId> {
        let scope = &mut self.arena[scope as usize];
        if let Some(&existing) = scope.symbols.get(name) {
            return Some(existing);
        }

        scope.symbols.insert(name.to_string(), defn);
        None
    }

    /// Look `name` up in `scope`, walking the parent chain.
    pub fn lookup(&self, scope: ScopeId, name: &str) -> Option<DefnId> {
        let mut curr = Some(scope);
        while let Some(id) = curr {
            let scope = self.get(id);
            if let Some(&defn) = scope.symbols.get(name) {
                return Some(defn);
            }

            curr = scope.parent;
        }

        None
    }

    /// Look `name` up in `scope` only, without walking parents.
    pub fn lookup_local(&self, scope: ScopeId, name: &str) -> Option<DefnId> {
        self.get(scope).symbols.get(name).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_walks_parent_chain() {
        let mut scopes = Scopes::new();
        let root = scopes.alloc(None);
        let inner = scopes.alloc(Some(root));

        assert_eq!(scopes.add(root, "x", 0), None);
        assert_eq!(scopes.lookup(inner, "x"), Some(0));
        assert_eq!(scopes.lookup_local(inner, "x"), None);
    }

    #[test]
    fn duplicate_binding_is_reported() {
        let mut scopes = Scopes::new();
        let root = scopes.alloc(None);

        assert_eq!(scopes.add(root, "x", 0), None);
        assert_eq!(scopes.add(root, "x", 1), Some(0));
    }

    #[test]
    fn shadowing_across_scopes_is_allowed() {
        let mut scopes = Scopes::new();
        let root = scopes.alloc(None);
        let inner = scopes.alloc(Some(root));

        assert_eq!(scopes.add(root, "x", 0), None);
        assert_eq!(scopes.add(inner, "x", 1), None);
        assert_eq!(scopes.lookup(inner, "x"), Some(1));
        assert_eq!(scopes.lookup(root, "x"), Some(0));
    }
}
