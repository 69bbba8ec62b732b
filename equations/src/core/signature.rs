//! Global definitions that core terms can refer to.

use std::sync::Arc;

use crate::core::{ArcTerm, Telescope, Term};
use crate::symbol::{Symbol, Var};

pub fn eq_name() -> Symbol {
    Symbol::intern_static("Eq")
}

pub fn refl_name() -> Symbol {
    Symbol::intern_static("refl")
}

/// Inductive families.
#[derive(Debug, Clone)]
pub struct Inductive {
    pub name: Symbol,
    /// Parameters, shared by every constructor.
    pub params: Telescope,
    /// The full type of the family, starting with its parameters.
    pub r#type: ArcTerm,
    /// Constructors, in declaration order.
    pub ctors: Vec<Symbol>,
}

/// Constructors of inductive families.
#[derive(Debug, Clone)]
pub struct Constructor {
    pub name: Symbol,
    pub inductive: Symbol,
    pub num_params: usize,
    pub num_fields: usize,
    /// The full type of the constructor, starting with the parameters of the
    /// inductive family.
    pub r#type: ArcTerm,
}

/// Functions, either compiled from clauses or generated alongside them.
#[derive(Debug, Clone)]
pub struct Function {
    pub name: Symbol,
    pub r#type: ArcTerm,
    /// The compiled body. This is `None` while the function is being
    /// compiled, so that recursive calls can still be checked.
    pub body: Option<ArcTerm>,
    /// Whether the body may be unfolded during conversion checking.
    pub transparent: bool,
    /// The elimination principle derived from the function's clauses.
    pub elim: Option<Symbol>,
}

#[derive(Debug, Clone)]
pub enum Entry {
    Inductive(Arc<Inductive>),
    Constructor(Arc<Constructor>),
    Function(Arc<Function>),
    /// Postulated constants, including trusted rewrite rules.
    Axiom(ArcTerm),
}

/// A persistent map from global names to their definitions.
///
/// Cloning a signature is cheap, and clones can be extended independently.
/// This lets separate functions be compiled in parallel against a shared
/// snapshot, each adding its own generated definitions.
#[derive(Clone)]
pub struct Signature {
    entries: rpds::HashTrieMapSync<Symbol, Entry>,
    list_notation: Option<(Symbol, Symbol)>,
}

impl Signature {
    pub fn empty() -> Signature {
        Signature {
            entries: rpds::HashTrieMapSync::new_sync(),
            list_notation: None,
        }
    }

    /// A signature containing the prelude:
    ///
    /// ```text
    /// inductive Eq (A : Type) (x : A) : A -> Type {
    ///   refl : Eq A x x,
    /// }
    /// ```
    pub fn prelude() -> Signature {
        let mut signature = Signature::empty();

        let a = Var::fresh(Symbol::intern_static("A"));
        let x = Var::fresh(Symbol::intern_static("x"));
        let mut params = Telescope::new();
        params.push(a, Term::universe());
        params.push(x, Term::var(a));

        let eq_type = Term::fun_types(&params, Term::arrow(Term::var(a), Term::universe()));
        let refl_type = Term::fun_types(&params, Term::eq(Term::var(a), Term::var(x), Term::var(x)));

        signature.add_inductive(
            Inductive {
                name: eq_name(),
                params,
                r#type: eq_type,
                ctors: vec![refl_name()],
            },
            vec![Constructor {
                name: refl_name(),
                inductive: eq_name(),
                num_params: 2,
                num_fields: 0,
                r#type: refl_type,
            }],
        );

        signature
    }

    pub fn get(&self, name: Symbol) -> Option<&Entry> {
        self.entries.get(&name)
    }

    pub fn contains(&self, name: Symbol) -> bool {
        self.entries.contains_key(&name)
    }

    /// The names of every global in the signature, in no particular order.
    pub fn names(&self) -> impl Iterator<Item = Symbol> + '_ {
        self.entries.keys().copied()
    }

    pub fn inductive(&self, name: Symbol) -> Option<&Arc<Inductive>> {
        match self.entries.get(&name)? {
            Entry::Inductive(inductive) => Some(inductive),
            _ => None,
        }
    }

    pub fn constructor(&self, name: Symbol) -> Option<&Arc<Constructor>> {
        match self.entries.get(&name)? {
            Entry::Constructor(ctor) => Some(ctor),
            _ => None,
        }
    }

    pub fn function(&self, name: Symbol) -> Option<&Arc<Function>> {
        match self.entries.get(&name)? {
            Entry::Function(function) => Some(function),
            _ => None,
        }
    }

    /// The type of a global, if it is defined.
    pub fn r#type(&self, name: Symbol) -> Option<&ArcTerm> {
        match self.entries.get(&name)? {
            Entry::Inductive(inductive) => Some(&inductive.r#type),
            Entry::Constructor(ctor) => Some(&ctor.r#type),
            Entry::Function(function) => Some(&function.r#type),
            Entry::Axiom(r#type) => Some(r#type),
        }
    }

    /// The body of `name` if it should be unfolded. Functions are opaque
    /// unless they were declared transparent, or are explicitly listed in
    /// `unfold`.
    pub fn unfoldable(&self, name: Symbol, unfold: &[Symbol]) -> Option<&ArcTerm> {
        let function = self.function(name)?;
        match function.transparent || unfold.contains(&name) {
            true => function.body.as_ref(),
            false => None,
        }
    }

    pub fn add_inductive(&mut self, inductive: Inductive, ctors: Vec<Constructor>) {
        for ctor in ctors {
            self.entries
                .insert_mut(ctor.name, Entry::Constructor(Arc::new(ctor)));
        }
        self.entries
            .insert_mut(inductive.name, Entry::Inductive(Arc::new(inductive)));
    }

    pub fn add_function(&mut self, function: Function) {
        self.entries
            .insert_mut(function.name, Entry::Function(Arc::new(function)));
    }

    pub fn add_axiom(&mut self, name: Symbol, r#type: ArcTerm) {
        self.entries.insert_mut(name, Entry::Axiom(r#type));
    }

    /// Copy the entries named in `names` from `other` into this signature.
    pub fn import(&mut self, other: &Signature, names: impl IntoIterator<Item = Symbol>) {
        for name in names {
            if let Some(entry) = other.get(name) {
                self.entries.insert_mut(name, entry.clone());
            }
        }
    }

    pub fn list_notation(&self) -> Option<(Symbol, Symbol)> {
        self.list_notation
    }

    pub fn set_list_notation(&mut self, nil: Symbol, cons: Symbol) {
        self.list_notation = Some((nil, cons));
    }
}

impl Default for Signature {
    fn default() -> Signature {
        Signature::prelude()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prelude_contains_equality() {
        let signature = Signature::prelude();
        let eq = signature.inductive(eq_name()).unwrap();
        assert_eq!(eq.params.len(), 2);
        assert_eq!(eq.ctors, vec![refl_name()]);

        let refl = signature.constructor(refl_name()).unwrap();
        assert_eq!(refl.inductive, eq_name());
        assert_eq!(refl.num_fields, 0);
    }

    #[test]
    fn clones_are_independent() {
        let base = Signature::prelude();
        let mut extended = base.clone();
        extended.add_axiom(Symbol::intern("oops"), Term::universe());
        assert!(extended.contains(Symbol::intern("oops")));
        assert!(!base.contains(Symbol::intern("oops")));
    }
}
