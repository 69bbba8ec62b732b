//! The operational semantics of the core language: substitution, weak-head
//! normalisation and conversion checking.

use std::sync::Arc;

use fxhash::FxHashMap;

use crate::core::signature::Signature;
use crate::core::{ArcTerm, Branch, Telescope, Term};
use crate::symbol::{Symbol, Var};

/// Simultaneous substitutions of terms for local variables.
///
/// Substitutions built up with [`Subst::insert`] are idempotent: no variable in
/// the domain of the substitution occurs in its range.
#[derive(Debug, Clone, Default)]
pub struct Subst {
    map: FxHashMap<Var, ArcTerm>,
}

impl Subst {
    pub fn new() -> Subst {
        Subst::default()
    }

    pub fn single(var: Var, term: ArcTerm) -> Subst {
        let mut subst = Subst::new();
        subst.map.insert(var, term);
        subst
    }

    /// Substitute `vars` for the corresponding `terms`, pairwise.
    pub fn from_pairs(pairs: impl IntoIterator<Item = (Var, ArcTerm)>) -> Subst {
        Subst {
            map: pairs.into_iter().collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn get(&self, var: Var) -> Option<&ArcTerm> {
        self.map.get(&var)
    }

    pub fn contains(&self, var: Var) -> bool {
        self.map.contains_key(&var)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Var, &ArcTerm)> {
        self.map.iter()
    }

    /// Extend the substitution with `var := term`, where `term` is expressed
    /// in terms of the variables that remain after this substitution.
    pub fn insert(&mut self, var: Var, term: ArcTerm) {
        let single = Subst::single(var, term.clone());
        for value in self.map.values_mut() {
            *value = single.apply(value);
        }
        self.map.insert(var, term);
    }

    /// The substitution that first applies `self`, then `then`.
    pub fn compose(&self, then: &Subst) -> Subst {
        let mut map: FxHashMap<_, _> = (self.map.iter())
            .map(|(var, term)| (*var, then.apply(term)))
            .collect();
        for (var, term) in then.map.iter() {
            map.entry(*var).or_insert_with(|| term.clone());
        }
        Subst { map }
    }

    /// Apply the substitution to a term, renaming binders so that no variable
    /// in the range of the substitution is captured.
    pub fn apply(&self, term: &ArcTerm) -> ArcTerm {
        if self.map.is_empty() {
            return term.clone();
        }
        let mut map = self.map.clone();
        subst(term, &mut map)
    }

    pub fn apply_all(&self, terms: &[ArcTerm]) -> Vec<ArcTerm> {
        terms.iter().map(|term| self.apply(term)).collect()
    }

    pub fn apply_telescope(&self, telescope: &Telescope) -> Telescope {
        Telescope::from_entries(
            (telescope.iter())
                .filter(|(var, _)| !self.contains(*var))
                .map(|(var, r#type)| (*var, self.apply(r#type)))
                .collect(),
        )
    }
}

fn subst(term: &ArcTerm, map: &mut FxHashMap<Var, ArcTerm>) -> ArcTerm {
    match term.as_ref() {
        Term::Universe | Term::Global(_) => term.clone(),
        Term::LocalVar(var) => match map.get(var) {
            Some(term) => term.clone(),
            None => term.clone(),
        },
        Term::FunType(var, param_type, body_type) => {
            let param_type = subst(param_type, map);
            let (var, body_type) = subst_binder(*var, body_type, map);
            Arc::new(Term::FunType(var, param_type, body_type))
        }
        Term::FunLit(var, param_type, body) => {
            let param_type = subst(param_type, map);
            let (var, body) = subst_binder(*var, body, map);
            Arc::new(Term::FunLit(var, param_type, body))
        }
        Term::FunApp(head, arg) => Term::fun_app(subst(head, map), subst(arg, map)),
        Term::Ann(term, r#type) => Arc::new(Term::Ann(subst(term, map), subst(r#type, map))),
        Term::Case(scrut, branches) => {
            let scrut = subst(scrut, map);
            let branches = branches
                .iter()
                .map(|branch| {
                    let fields: Vec<_> = branch.fields.iter().map(|var| var.refresh()).collect();
                    let saved: Vec<_> = (branch.fields.iter().zip(&fields))
                        .map(|(old, new)| (*old, map.insert(*old, Term::var(*new))))
                        .collect();
                    let body = subst(&branch.body, map);
                    for (var, previous) in saved.into_iter().rev() {
                        restore(map, var, previous);
                    }
                    Branch {
                        ctor: branch.ctor,
                        fields,
                        body,
                    }
                })
                .collect();
            Arc::new(Term::Case(scrut, branches))
        }
        Term::Absurd(scrut) => Arc::new(Term::Absurd(subst(scrut, map))),
    }
}

fn subst_binder(
    var: Var,
    body: &ArcTerm,
    map: &mut FxHashMap<Var, ArcTerm>,
) -> (Var, ArcTerm) {
    let fresh = var.refresh();
    let previous = map.insert(var, Term::var(fresh));
    let body = subst(body, map);
    restore(map, var, previous);
    (fresh, body)
}

fn restore(map: &mut FxHashMap<Var, ArcTerm>, var: Var, previous: Option<ArcTerm>) {
    match previous {
        Some(term) => map.insert(var, term),
        None => map.remove(&var),
    };
}

/// Rename the free occurrences of `from` to `to`.
pub fn rename(term: &ArcTerm, from: Var, to: Var) -> ArcTerm {
    if from == to {
        return term.clone();
    }
    Subst::single(from, Term::var(to)).apply(term)
}

/// Replace every subterm of `term` that is syntactically equal to `target`
/// with `replacement`.
pub fn abstract_term(term: &ArcTerm, target: &ArcTerm, replacement: &ArcTerm) -> ArcTerm {
    if alpha_eq(term, target) {
        return replacement.clone();
    }
    let go = |term: &ArcTerm| abstract_term(term, target, replacement);
    match term.as_ref() {
        Term::Universe | Term::Global(_) | Term::LocalVar(_) => term.clone(),
        Term::FunType(var, param_type, body_type) => {
            Arc::new(Term::FunType(*var, go(param_type), go(body_type)))
        }
        Term::FunLit(var, param_type, body) => {
            Arc::new(Term::FunLit(*var, go(param_type), go(body)))
        }
        Term::FunApp(head, arg) => Term::fun_app(go(head), go(arg)),
        Term::Ann(term, r#type) => Arc::new(Term::Ann(go(term), go(r#type))),
        Term::Case(scrut, branches) => Arc::new(Term::Case(
            go(scrut),
            (branches.iter())
                .map(|branch| Branch {
                    ctor: branch.ctor,
                    fields: branch.fields.clone(),
                    body: go(&branch.body),
                })
                .collect(),
        )),
        Term::Absurd(scrut) => Arc::new(Term::Absurd(go(scrut))),
    }
}

/// Syntactic equality up to the renaming of bound variables.
pub fn alpha_eq(lhs: &ArcTerm, rhs: &ArcTerm) -> bool {
    fn go(lhs: &Term, rhs: &Term, renaming: &mut Vec<(Var, Var)>) -> bool {
        match (lhs, rhs) {
            (Term::Universe, Term::Universe) => true,
            (Term::LocalVar(lhs), Term::LocalVar(rhs)) => {
                match renaming.iter().rev().find(|(l, r)| l == lhs || r == rhs) {
                    Some((l, r)) => l == lhs && r == rhs,
                    None => lhs == rhs,
                }
            }
            (Term::Global(lhs), Term::Global(rhs)) => lhs == rhs,
            (Term::FunType(lv, lp, lb), Term::FunType(rv, rp, rb))
            | (Term::FunLit(lv, lp, lb), Term::FunLit(rv, rp, rb)) => {
                go(lp, rp, renaming) && {
                    renaming.push((*lv, *rv));
                    let result = go(lb, rb, renaming);
                    renaming.pop();
                    result
                }
            }
            (Term::FunApp(lh, la), Term::FunApp(rh, ra)) => {
                go(lh, rh, renaming) && go(la, ra, renaming)
            }
            (Term::Ann(lt, lty), Term::Ann(rt, rty)) => go(lt, rt, renaming) && go(lty, rty, renaming),
            (Term::Case(ls, lbs), Term::Case(rs, rbs)) => {
                go(ls, rs, renaming)
                    && lbs.len() == rbs.len()
                    && lbs.iter().zip(rbs).all(|(lb, rb)| {
                        lb.ctor == rb.ctor && lb.fields.len() == rb.fields.len() && {
                            let len = renaming.len();
                            renaming.extend(lb.fields.iter().copied().zip(rb.fields.iter().copied()));
                            let result = go(&lb.body, &rb.body, renaming);
                            renaming.truncate(len);
                            result
                        }
                    })
            }
            (Term::Absurd(ls), Term::Absurd(rs)) => go(ls, rs, renaming),
            (_, _) => false,
        }
    }

    Arc::ptr_eq(lhs, rhs) || go(lhs, rhs, &mut Vec::new())
}

/// The environment needed for evaluation.
#[derive(Clone, Copy)]
pub struct Env<'a> {
    signature: &'a Signature,
    /// Opaque functions that may be unfolded anyway.
    unfold: &'a [Symbol],
}

impl<'a> Env<'a> {
    pub fn new(signature: &'a Signature) -> Env<'a> {
        Env {
            signature,
            unfold: &[],
        }
    }

    pub fn with_unfold(signature: &'a Signature, unfold: &'a [Symbol]) -> Env<'a> {
        Env { signature, unfold }
    }

    pub fn signature(&self) -> &'a Signature {
        self.signature
    }

    /// Reduce a term to weak-head normal form.
    pub fn whnf(&self, term: &ArcTerm) -> ArcTerm {
        match term.as_ref() {
            Term::Ann(term, _) => self.whnf(term),
            Term::FunApp(_, _) | Term::Global(_) => {
                let (head, args) = Term::spine(term);
                self.whnf_spine(head.clone(), args)
            }
            Term::Case(scrut, branches) => match self.reduce_case(scrut, branches) {
                Some(term) => self.whnf(&term),
                None => term.clone(),
            },
            Term::Universe
            | Term::LocalVar(_)
            | Term::FunType(_, _, _)
            | Term::FunLit(_, _, _)
            | Term::Absurd(_) => term.clone(),
        }
    }

    fn whnf_spine(&self, mut head: ArcTerm, mut args: Vec<ArcTerm>) -> ArcTerm {
        let mut next = 0;
        loop {
            let step = match head.as_ref() {
                Term::Ann(term, _) => term.clone(),
                Term::FunApp(_, _) => {
                    let (inner_head, mut inner_args) = Term::spine(&head);
                    let inner_head = inner_head.clone();
                    inner_args.extend(args.drain(next..));
                    args = inner_args;
                    next = 0;
                    inner_head
                }
                Term::FunLit(var, _, body) if next < args.len() => {
                    next += 1;
                    Subst::single(*var, args[next - 1].clone()).apply(body)
                }
                Term::Case(scrut, branches) => match self.reduce_case(scrut, branches) {
                    Some(term) => term,
                    None => break,
                },
                Term::Global(name) => match self.signature.unfoldable(*name, self.unfold) {
                    Some(body) => {
                        let unfolded = self.whnf_spine(body.clone(), args[next..].to_vec());
                        // Keep definitions folded when their unfolding is stuck, or when
                        // they are not applied to enough arguments to reach their body
                        let is_stuck = matches!(
                            Term::spine(&unfolded).0.as_ref(),
                            Term::Case(_, _) | Term::FunLit(_, _, _),
                        );
                        match is_stuck {
                            true => break,
                            false => return unfolded,
                        }
                    }
                    None => break,
                },
                _ => break,
            };
            head = step;
        }
        Term::fun_apps(head, args.drain(next..))
    }

    /// Reduce a case split on a constructor application to the body of the
    /// matching branch.
    fn reduce_case(&self, scrut: &ArcTerm, branches: &[Branch]) -> Option<ArcTerm> {
        let scrut = self.whnf(scrut);
        let (ctor_name, args) = Term::global_spine(&scrut)?;
        let ctor = self.signature.constructor(ctor_name)?;
        let branch = branches.iter().find(|branch| branch.ctor == ctor_name)?;
        let fields = args.get(ctor.num_params..)?;
        if fields.len() != branch.fields.len() {
            return None;
        }
        let subst = Subst::from_pairs(branch.fields.iter().copied().zip(fields.iter().cloned()));
        Some(subst.apply(&branch.body))
    }

    /// Returns `true` if the two terms are definitionally equal.
    pub fn is_convertible(&self, lhs: &ArcTerm, rhs: &ArcTerm) -> bool {
        if Arc::ptr_eq(lhs, rhs) {
            return true;
        }

        let lhs = self.whnf(lhs);
        let rhs = self.whnf(rhs);

        match (lhs.as_ref(), rhs.as_ref()) {
            (Term::Universe, Term::Universe) => true,
            (Term::LocalVar(lhs), Term::LocalVar(rhs)) => lhs == rhs,
            (Term::Global(lhs), Term::Global(rhs)) => lhs == rhs,
            (
                Term::FunType(lhs_var, lhs_param, lhs_body),
                Term::FunType(rhs_var, rhs_param, rhs_body),
            ) => {
                self.is_convertible(lhs_param, rhs_param)
                    && self.is_convertible(lhs_body, &rename(rhs_body, *rhs_var, *lhs_var))
            }
            (Term::FunLit(lhs_var, _, lhs_body), Term::FunLit(rhs_var, _, rhs_body)) => {
                self.is_convertible(lhs_body, &rename(rhs_body, *rhs_var, *lhs_var))
            }
            // Eta-conversion
            (Term::FunLit(var, _, body), _) => {
                self.is_convertible(body, &Term::fun_app(rhs.clone(), Term::var(*var)))
            }
            (_, Term::FunLit(var, _, body)) => {
                self.is_convertible(&Term::fun_app(lhs.clone(), Term::var(*var)), body)
            }
            (Term::FunApp(lhs_head, lhs_arg), Term::FunApp(rhs_head, rhs_arg)) => {
                self.is_convertible(lhs_head, rhs_head) && self.is_convertible(lhs_arg, rhs_arg)
            }
            (Term::Case(lhs_scrut, lhs_branches), Term::Case(rhs_scrut, rhs_branches)) => {
                self.is_convertible(lhs_scrut, rhs_scrut)
                    && lhs_branches.len() == rhs_branches.len()
                    && Iterator::zip(lhs_branches.iter(), rhs_branches.iter()).all(|(lhs, rhs)| {
                        lhs.ctor == rhs.ctor && lhs.fields.len() == rhs.fields.len() && {
                            let renaming = Subst::from_pairs(
                                (rhs.fields.iter().copied())
                                    .zip(lhs.fields.iter().map(|var| Term::var(*var))),
                            );
                            self.is_convertible(&lhs.body, &renaming.apply(&rhs.body))
                        }
                    })
            }
            (Term::Absurd(lhs), Term::Absurd(rhs)) => self.is_convertible(lhs, rhs),
            (_, _) => false,
        }
    }

    /// Fully normalise a term, reducing under binders.
    pub fn normalise(&self, term: &ArcTerm) -> ArcTerm {
        let term = self.whnf(term);
        match term.as_ref() {
            Term::Universe | Term::LocalVar(_) | Term::Global(_) => term,
            Term::FunType(var, param_type, body_type) => Arc::new(Term::FunType(
                *var,
                self.normalise(param_type),
                self.normalise(body_type),
            )),
            Term::FunLit(var, param_type, body) => Arc::new(Term::FunLit(
                *var,
                self.normalise(param_type),
                self.normalise(body),
            )),
            Term::FunApp(head, arg) => Term::fun_app(self.normalise(head), self.normalise(arg)),
            Term::Ann(term, _) => self.normalise(term),
            Term::Case(scrut, branches) => Arc::new(Term::Case(
                self.normalise(scrut),
                (branches.iter())
                    .map(|branch| Branch {
                        ctor: branch.ctor,
                        fields: branch.fields.clone(),
                        body: self.normalise(&branch.body),
                    })
                    .collect(),
            )),
            Term::Absurd(scrut) => Arc::new(Term::Absurd(self.normalise(scrut))),
        }
    }

    /// Split the function types off `r#type`, reducing it to weak-head normal
    /// form as needed.
    pub fn fun_type_telescope(&self, r#type: &ArcTerm) -> (Telescope, ArcTerm) {
        let mut telescope = Telescope::new();
        let mut r#type = self.whnf(r#type);
        loop {
            let next = match r#type.as_ref() {
                Term::FunType(var, param_type, body_type) => {
                    telescope.push(*var, param_type.clone());
                    self.whnf(body_type)
                }
                _ => return (telescope, r#type),
            };
            r#type = next;
        }
    }

    /// Instantiate a function type with a list of arguments, returning the
    /// remaining type.
    pub fn instantiate(&self, r#type: &ArcTerm, args: &[ArcTerm]) -> Option<ArcTerm> {
        let mut r#type = r#type.clone();
        for arg in args {
            let next = match self.whnf(&r#type).as_ref() {
                Term::FunType(var, _, body_type) => Subst::single(*var, arg.clone()).apply(body_type),
                _ => return None,
            };
            r#type = next;
        }
        Some(r#type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nat_signature() -> (Signature, Symbol, Symbol, Symbol) {
        use crate::core::signature::{Constructor, Inductive};

        let nat = Symbol::intern("Nat");
        let zero = Symbol::intern("zero");
        let succ = Symbol::intern("succ");

        let mut signature = Signature::prelude();
        signature.add_inductive(
            Inductive {
                name: nat,
                params: Telescope::new(),
                r#type: Term::universe(),
                ctors: vec![zero, succ],
            },
            vec![
                Constructor {
                    name: zero,
                    inductive: nat,
                    num_params: 0,
                    num_fields: 0,
                    r#type: Term::global(nat),
                },
                Constructor {
                    name: succ,
                    inductive: nat,
                    num_params: 0,
                    num_fields: 1,
                    r#type: Term::arrow(Term::global(nat), Term::global(nat)),
                },
            ],
        );
        (signature, nat, zero, succ)
    }

    #[test]
    fn substitution_avoids_capture() {
        let x = Var::fresh(Symbol::intern("x"));
        let y = Var::fresh(Symbol::intern("y"));
        // fun (y : Type) => x
        let term = Arc::new(Term::FunLit(y, Term::universe(), Term::var(x)));
        // [x := y]
        let result = Subst::single(x, Term::var(y)).apply(&term);
        match result.as_ref() {
            Term::FunLit(binder, _, body) => {
                assert_ne!(*binder, y);
                assert_eq!(body.as_var(), Some(y));
            }
            _ => panic!("expected a function literal"),
        }
    }

    #[test]
    fn substitutions_compose() {
        let x = Var::fresh(Symbol::intern("x"));
        let y = Var::fresh(Symbol::intern("y"));
        let mut subst = Subst::single(x, Term::var(y));
        subst.insert(y, Term::universe());
        assert!(matches!(subst.get(x).unwrap().as_ref(), Term::Universe));
    }

    #[test]
    fn beta_reduction() {
        let (signature, nat, zero, _) = nat_signature();
        let env = Env::new(&signature);
        let x = Var::fresh(Symbol::intern("x"));
        let id = Arc::new(Term::FunLit(x, Term::global(nat), Term::var(x)));
        let term = Term::fun_app(id, Term::global(zero));
        assert!(env.is_convertible(&term, &Term::global(zero)));
    }

    #[test]
    fn case_reduces_on_constructors() {
        let (signature, _, zero, succ) = nat_signature();
        let env = Env::new(&signature);
        let n = Var::fresh(Symbol::intern("n"));
        let m = Var::fresh(Symbol::intern("m"));
        // case (succ zero) { zero => zero, succ m => m }
        let term = Arc::new(Term::Case(
            Term::fun_app(Term::global(succ), Term::global(zero)),
            vec![
                Branch {
                    ctor: zero,
                    fields: vec![],
                    body: Term::global(zero),
                },
                Branch {
                    ctor: succ,
                    fields: vec![m],
                    body: Term::var(m),
                },
            ],
        ));
        assert!(matches!(env.whnf(&term).as_ref(), Term::Global(name) if *name == zero));

        // Case splits on variables are stuck
        let branches = match term.as_ref() {
            Term::Case(_, branches) => branches.clone(),
            _ => unreachable!(),
        };
        let stuck = Arc::new(Term::Case(Term::var(n), branches));
        assert!(matches!(env.whnf(&stuck).as_ref(), Term::Case(_, _)));
        assert!(env.is_convertible(&stuck, &stuck));
    }

    /// `double : Nat -> Nat`, defined by recursion on its argument.
    fn add_double(signature: &mut Signature, nat: Symbol, zero: Symbol, succ: Symbol) -> Symbol {
        use crate::core::signature::Function;

        let double = Symbol::intern("double");
        let n = Var::fresh(Symbol::intern("n"));
        let m = Var::fresh(Symbol::intern("m"));
        let recursive = Term::fun_app(Term::global(double), Term::var(m));
        let body = Arc::new(Term::FunLit(
            n,
            Term::global(nat),
            Arc::new(Term::Case(
                Term::var(n),
                vec![
                    Branch {
                        ctor: zero,
                        fields: vec![],
                        body: Term::global(zero),
                    },
                    Branch {
                        ctor: succ,
                        fields: vec![m],
                        body: Term::fun_app(
                            Term::global(succ),
                            Term::fun_app(Term::global(succ), recursive),
                        ),
                    },
                ],
            )),
        ));
        signature.add_function(Function {
            name: double,
            r#type: Term::arrow(Term::global(nat), Term::global(nat)),
            body: Some(body),
            transparent: false,
            elim: None,
        });
        double
    }

    #[test]
    fn recursive_definitions_stay_folded() {
        let (mut signature, nat, zero, succ) = nat_signature();
        let double = add_double(&mut signature, nat, zero, succ);
        let unfold = [double];
        let env = Env::with_unfold(&signature, &unfold);

        // Unapplied, the definition does not unfold to its lambda
        assert!(matches!(env.whnf(&Term::global(double)).as_ref(), Term::Global(name) if *name == double));

        // Stuck on a variable, `double x` stays folded and is convertible to itself
        let x = Var::fresh(Symbol::intern("x"));
        let lhs = Term::fun_app(Term::global(double), Term::var(x));
        let rhs = Term::fun_app(Term::global(double), Term::var(x));
        assert!(matches!(env.whnf(&lhs).as_ref(), Term::FunApp(_, _)));
        assert!(env.is_convertible(&lhs, &rhs));
        assert!(env.is_convertible(&Term::global(double), &Term::global(double)));

        // double (succ x) = succ (succ (double x))
        let term = Term::fun_app(
            Term::global(double),
            Term::fun_app(Term::global(succ), Term::var(x)),
        );
        let expected = Term::fun_app(
            Term::global(succ),
            Term::fun_app(Term::global(succ), rhs),
        );
        assert!(env.is_convertible(&term, &expected));
    }

    #[test]
    fn eta_conversion() {
        let (signature, nat, _, succ) = nat_signature();
        let env = Env::new(&signature);
        let x = Var::fresh(Symbol::intern("x"));
        let eta = Arc::new(Term::FunLit(
            x,
            Term::global(nat),
            Term::fun_app(Term::global(succ), Term::var(x)),
        ));
        assert!(env.is_convertible(&eta, &Term::global(succ)));
    }

    #[test]
    fn alpha_equivalence() {
        let x = Var::fresh(Symbol::intern("x"));
        let y = Var::fresh(Symbol::intern("y"));
        let lhs = Arc::new(Term::FunLit(x, Term::universe(), Term::var(x)));
        let rhs = Arc::new(Term::FunLit(y, Term::universe(), Term::var(y)));
        assert!(alpha_eq(&lhs, &rhs));
        let other = Arc::new(Term::FunLit(y, Term::universe(), Term::var(x)));
        assert!(!alpha_eq(&lhs, &other));
    }
}
