//! Core language.
//!
//! This is the calculus that pattern-matching definitions are compiled into:
//! a dependently typed lambda calculus with inductive families, where the only
//! way to inspect a value is a [case split][Term::Case] on a local variable.

use std::sync::Arc;

use fxhash::FxHashSet;

use crate::symbol::{Symbol, Var};

pub mod pretty;
pub mod semantics;
pub mod signature;
pub mod typing;
pub mod unification;

pub type ArcTerm = Arc<Term>;

/// Core language terms.
#[derive(Debug, Clone)]
pub enum Term {
    /// The type of types.
    ///
    /// Universe levels are not tracked, so `Type : Type`.
    Universe,
    /// Local variable occurrences.
    ///
    /// These were bound by a [function type][Term::FunType], a [function
    /// literal][Term::FunLit], a [case branch][Branch], or by an entry of the
    /// [telescope][Telescope] the term lives in.
    LocalVar(Var),
    /// References to entries in the [signature].
    ///
    /// [signature]: signature::Signature
    Global(Symbol),
    /// Dependent function types.
    FunType(Var, ArcTerm, ArcTerm),
    /// Function literals, annotated with the type of their parameter.
    FunLit(Var, ArcTerm, ArcTerm),
    /// Function applications.
    FunApp(ArcTerm, ArcTerm),
    /// Annotated terms.
    Ann(ArcTerm, ArcTerm),
    /// Case splits.
    ///
    /// The scrutinee must be a local variable of an inductive type when the
    /// term is checked. Every constructor that is possible after unifying the
    /// indices of the scrutinee's type has exactly one branch; impossible
    /// constructors have none. A case split on a constructor application
    /// reduces to the matching branch.
    ///
    /// ```text
    /// case l {
    ///   nil => zero,
    ///   cons a l' => succ (length A l'),
    /// }
    /// ```
    Case(ArcTerm, Vec<Branch>),
    /// Eliminate a variable whose type has no possible constructors.
    ///
    /// This is the same as a case split with no branches, but keeps the intent
    /// visible when printing.
    Absurd(ArcTerm),
}

/// A branch of a [case split][Term::Case].
#[derive(Debug, Clone)]
pub struct Branch {
    pub ctor: Symbol,
    /// The constructor's fields. Parameters of the inductive are not bound.
    pub fields: Vec<Var>,
    pub body: ArcTerm,
}

impl Term {
    pub fn universe() -> ArcTerm {
        Arc::new(Term::Universe)
    }

    pub fn var(var: Var) -> ArcTerm {
        Arc::new(Term::LocalVar(var))
    }

    pub fn global(name: Symbol) -> ArcTerm {
        Arc::new(Term::Global(name))
    }

    pub fn fun_app(head: ArcTerm, arg: ArcTerm) -> ArcTerm {
        Arc::new(Term::FunApp(head, arg))
    }

    /// Apply `head` to each of `args`, from left to right.
    pub fn fun_apps(head: ArcTerm, args: impl IntoIterator<Item = ArcTerm>) -> ArcTerm {
        args.into_iter().fold(head, Term::fun_app)
    }

    /// A non-dependent function type.
    pub fn arrow(param_type: ArcTerm, body_type: ArcTerm) -> ArcTerm {
        let var = Var::fresh(Symbol::underscore());
        Arc::new(Term::FunType(var, param_type, body_type))
    }

    /// Abstract `body` over the entries of a telescope with function types.
    pub fn fun_types(telescope: &Telescope, body: ArcTerm) -> ArcTerm {
        (telescope.entries.iter().rev()).fold(body, |body, (var, r#type)| {
            Arc::new(Term::FunType(*var, r#type.clone(), body))
        })
    }

    /// Abstract `body` over the entries of a telescope with function literals.
    pub fn fun_lits(telescope: &Telescope, body: ArcTerm) -> ArcTerm {
        (telescope.entries.iter().rev()).fold(body, |body, (var, r#type)| {
            Arc::new(Term::FunLit(*var, r#type.clone(), body))
        })
    }

    /// Build an equality type using the `Eq` inductive from the prelude.
    pub fn eq(r#type: ArcTerm, lhs: ArcTerm, rhs: ArcTerm) -> ArcTerm {
        Term::fun_apps(Term::global(signature::eq_name()), [r#type, lhs, rhs])
    }

    /// Build a reflexivity proof using the `refl` constructor of the prelude.
    pub fn refl(r#type: ArcTerm, term: ArcTerm) -> ArcTerm {
        Term::fun_apps(Term::global(signature::refl_name()), [r#type, term])
    }

    pub fn as_var(&self) -> Option<Var> {
        match self {
            Term::LocalVar(var) => Some(*var),
            _ => None,
        }
    }

    /// Split a term into the head of an application and its arguments.
    pub fn spine(term: &ArcTerm) -> (&ArcTerm, Vec<ArcTerm>) {
        let mut head = term;
        let mut args = Vec::new();
        while let Term::FunApp(fun, arg) = head.as_ref() {
            args.push(arg.clone());
            head = fun;
        }
        args.reverse();
        (head, args)
    }

    /// The name of the global at the head of an application, along with the
    /// arguments it was applied to.
    pub fn global_spine(term: &ArcTerm) -> Option<(Symbol, Vec<ArcTerm>)> {
        let (head, args) = Term::spine(term);
        match head.as_ref() {
            Term::Global(name) => Some((*name, args)),
            _ => None,
        }
    }

    /// Returns `true` if `var` occurs free in the term.
    pub fn occurs(&self, var: Var) -> bool {
        match self {
            Term::Universe | Term::Global(_) => false,
            Term::LocalVar(other) => *other == var,
            Term::FunType(param, param_type, body) | Term::FunLit(param, param_type, body) => {
                param_type.occurs(var) || (*param != var && body.occurs(var))
            }
            Term::FunApp(head, arg) => head.occurs(var) || arg.occurs(var),
            Term::Ann(term, r#type) => term.occurs(var) || r#type.occurs(var),
            Term::Case(scrut, branches) => {
                scrut.occurs(var)
                    || (branches.iter())
                        .any(|branch| !branch.fields.contains(&var) && branch.body.occurs(var))
            }
            Term::Absurd(scrut) => scrut.occurs(var),
        }
    }

    /// Collect the free variables of the term.
    pub fn free_vars(&self, vars: &mut FxHashSet<Var>) {
        fn go(term: &Term, bound: &mut Vec<Var>, vars: &mut FxHashSet<Var>) {
            match term {
                Term::Universe | Term::Global(_) => {}
                Term::LocalVar(var) => {
                    if !bound.contains(var) {
                        vars.insert(*var);
                    }
                }
                Term::FunType(param, param_type, body) | Term::FunLit(param, param_type, body) => {
                    go(param_type, bound, vars);
                    bound.push(*param);
                    go(body, bound, vars);
                    bound.pop();
                }
                Term::FunApp(head, arg) => {
                    go(head, bound, vars);
                    go(arg, bound, vars);
                }
                Term::Ann(term, r#type) => {
                    go(term, bound, vars);
                    go(r#type, bound, vars);
                }
                Term::Case(scrut, branches) => {
                    go(scrut, bound, vars);
                    for branch in branches {
                        let len = bound.len();
                        bound.extend(branch.fields.iter().copied());
                        go(&branch.body, bound, vars);
                        bound.truncate(len);
                    }
                }
                Term::Absurd(scrut) => go(scrut, bound, vars),
            }
        }

        go(self, &mut Vec::new(), vars)
    }

    /// Returns `true` if the global `name` is referenced anywhere in the term.
    pub fn mentions_global(&self, name: Symbol) -> bool {
        match self {
            Term::Universe | Term::LocalVar(_) => false,
            Term::Global(other) => *other == name,
            Term::FunType(_, param_type, body) | Term::FunLit(_, param_type, body) => {
                param_type.mentions_global(name) || body.mentions_global(name)
            }
            Term::FunApp(head, arg) => head.mentions_global(name) || arg.mentions_global(name),
            Term::Ann(term, r#type) => term.mentions_global(name) || r#type.mentions_global(name),
            Term::Case(scrut, branches) => {
                scrut.mentions_global(name)
                    || branches.iter().any(|branch| branch.body.mentions_global(name))
            }
            Term::Absurd(scrut) => scrut.mentions_global(name),
        }
    }
}

/// An ordered list of typed local variables, where the type of each entry may
/// refer to the entries before it.
#[derive(Debug, Clone, Default)]
pub struct Telescope {
    entries: Vec<(Var, ArcTerm)>,
}

impl Telescope {
    pub fn new() -> Telescope {
        Telescope::default()
    }

    pub fn from_entries(entries: Vec<(Var, ArcTerm)>) -> Telescope {
        Telescope { entries }
    }

    /// Split the leading function types off `r#type`, without reducing it.
    pub fn from_fun_type(r#type: &ArcTerm) -> (Telescope, ArcTerm) {
        let mut telescope = Telescope::new();
        let mut r#type = r#type;
        while let Term::FunType(var, param_type, body_type) = r#type.as_ref() {
            telescope.push(*var, param_type.clone());
            r#type = body_type;
        }
        (telescope, r#type.clone())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn push(&mut self, var: Var, r#type: ArcTerm) {
        self.entries.push((var, r#type));
    }

    pub fn extend(&mut self, other: &Telescope) {
        self.entries.extend(other.entries.iter().cloned());
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &(Var, ArcTerm)> + ExactSizeIterator {
        self.entries.iter()
    }

    pub fn vars(&self) -> impl DoubleEndedIterator<Item = Var> + ExactSizeIterator + '_ {
        self.entries.iter().map(|(var, _)| *var)
    }

    /// The entries of the telescope as terms, for use as arguments.
    pub fn args(&self) -> Vec<ArcTerm> {
        self.vars().map(Term::var).collect()
    }

    pub fn get(&self, var: Var) -> Option<&ArcTerm> {
        (self.entries.iter().rev()).find_map(|(other, r#type)| (*other == var).then_some(r#type))
    }

    pub fn position(&self, var: Var) -> Option<usize> {
        self.entries.iter().position(|(other, _)| *other == var)
    }

    pub fn contains(&self, var: Var) -> bool {
        self.position(var).is_some()
    }

    pub fn entries(&self) -> &[(Var, ArcTerm)] {
        &self.entries
    }

    pub fn into_entries(self) -> Vec<(Var, ArcTerm)> {
        self.entries
    }

    pub fn truncate(&mut self, len: usize) {
        self.entries.truncate(len);
    }
}
