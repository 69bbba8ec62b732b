//! Unification of the indices of inductive families.
//!
//! When a variable `x : D ps is` is split on a constructor `c : Π ys. D ps js`,
//! the equations `js =? is` must be solved before the branch for `c` can be
//! checked. Every local variable in the context is treated as flexible, so a
//! solution eliminates a variable from the context by substituting it
//! everywhere. The rules are the ones described by Cockx, Devriese and
//! Piessens in ["Unifiers as Equivalences"][unifiers-as-equivalences], minus
//! the restrictions needed to avoid the K axiom:
//!
//! - _deletion_: `t =? t` is dropped
//! - _solution_: `x =? t` eliminates `x`, provided `x` does not occur in `t`
//! - _injectivity_: `c us =? c vs` becomes `us =? vs`
//! - _conflict_: `c us =? d vs` means that the branch is impossible
//! - _cycle_: `x =? c us` where `x` occurs in `us` is also impossible
//!
//! [unifiers-as-equivalences]: https://doi.org/10.1145/3236770

use std::collections::VecDeque;

use fxhash::FxHashSet;

use crate::core::semantics::{Env, Subst};
use crate::core::{ArcTerm, Telescope, Term};
use crate::symbol::Var;

/// The result of a successful unification.
#[derive(Debug, Clone)]
pub struct Unifier {
    /// The context after eliminating the solved variables.
    pub context: Telescope,
    /// The solutions, in terms of the remaining context.
    pub subst: Subst,
}

#[derive(Debug, Clone)]
pub enum Outcome {
    /// The equations have a most general unifier.
    Success(Unifier),
    /// The equations can never hold.
    Conflict,
}

/// Errors encountered during unification.
#[derive(Debug, Clone)]
pub enum Error {
    /// Neither side of the equation is a variable or a constructor
    /// application, and the two sides are not convertible.
    ///
    /// For example, with `double : Nat -> Nat` left opaque:
    ///
    /// ```text
    /// double n =? succ m
    /// ```
    ///
    /// This may or may not hold, depending on `n`.
    Stuck { lhs: ArcTerm, rhs: ArcTerm },
    /// A variable occurs in its own solution underneath something other than
    /// a constructor.
    ///
    /// ```text
    /// n =? double n
    /// ```
    Occurs { var: Var, term: ArcTerm },
    /// The context could not be put into dependency order after
    /// substituting a solution.
    IllScopedContext,
}

/// Unify the equations pairwise, from left to right.
pub fn unify(
    env: Env<'_>,
    context: Telescope,
    equations: impl IntoIterator<Item = (ArcTerm, ArcTerm)>,
) -> Result<Outcome, Error> {
    let mut context = context;
    let mut subst = Subst::new();
    let mut queue: VecDeque<_> = equations.into_iter().collect();

    while let Some((lhs, rhs)) = queue.pop_front() {
        let lhs = env.whnf(&subst.apply(&lhs));
        let rhs = env.whnf(&subst.apply(&rhs));

        let lhs_var = lhs.as_var().filter(|var| context.contains(*var));
        let rhs_var = rhs.as_var().filter(|var| context.contains(*var));

        let (var, term) = match (lhs_var, rhs_var) {
            // Deletion
            (Some(lhs_var), Some(rhs_var)) if lhs_var == rhs_var => continue,
            // Solution, eliminating the variable that was bound later
            (Some(lhs_var), Some(rhs_var)) => {
                match context.position(lhs_var) > context.position(rhs_var) {
                    true => (lhs_var, rhs),
                    false => (rhs_var, lhs),
                }
            }
            (Some(var), None) => (var, rhs),
            (None, Some(var)) => (var, lhs),
            (None, None) => {
                if env.is_convertible(&lhs, &rhs) {
                    continue;
                }
                match (ctor_spine(env, &lhs), ctor_spine(env, &rhs)) {
                    // Injectivity
                    (Some((lhs_ctor, lhs_args)), Some((rhs_ctor, rhs_args)))
                        if lhs_ctor == rhs_ctor && lhs_args.len() == rhs_args.len() =>
                    {
                        for equation in Iterator::zip(lhs_args.into_iter(), rhs_args).rev() {
                            queue.push_front(equation);
                        }
                        continue;
                    }
                    // Conflict
                    (Some(_), Some(_)) => return Ok(Outcome::Conflict),
                    (_, _) => return Err(Error::Stuck { lhs, rhs }),
                }
            }
        };

        if term.occurs(var) {
            return match ctor_spine(env, &term) {
                // Cycle
                Some(_) => Ok(Outcome::Conflict),
                None => Err(Error::Occurs { var, term }),
            };
        }

        let solution = Subst::single(var, term.clone());
        context = sort_telescope(solution.apply_telescope(&context))
            .ok_or(Error::IllScopedContext)?;
        subst.insert(var, term);
    }

    Ok(Outcome::Success(Unifier { context, subst }))
}

fn ctor_spine(env: Env<'_>, term: &ArcTerm) -> Option<(crate::symbol::Symbol, Vec<ArcTerm>)> {
    let (name, args) = Term::global_spine(term)?;
    env.signature().constructor(name)?;
    Some((name, args))
}

/// Stably reorder a telescope so that every entry only depends on the entries
/// before it. Returns `None` if the dependencies are cyclic.
pub fn sort_telescope(telescope: Telescope) -> Option<Telescope> {
    let mut remaining = telescope.into_entries();
    let mut sorted = Telescope::new();

    while !remaining.is_empty() {
        let pending: FxHashSet<Var> = remaining.iter().map(|(var, _)| *var).collect();
        let index = remaining.iter().position(|(var, r#type)| {
            let mut free_vars = FxHashSet::default();
            r#type.free_vars(&mut free_vars);
            free_vars.iter().all(|free| free == var || !pending.contains(free))
        })?;
        let (var, r#type) = remaining.remove(index);
        sorted.push(var, r#type);
    }

    Some(sorted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::signature::{Constructor, Inductive, Signature};
    use crate::symbol::Symbol;

    fn nat_signature() -> Signature {
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
        signature
    }

    fn succ(term: ArcTerm) -> ArcTerm {
        Term::fun_app(Term::global(Symbol::intern("succ")), term)
    }

    fn zero() -> ArcTerm {
        Term::global(Symbol::intern("zero"))
    }

    fn context(names: &[&str]) -> (Telescope, Vec<Var>) {
        let nat = Term::global(Symbol::intern("Nat"));
        let vars: Vec<_> = names.iter().map(|name| Var::fresh(Symbol::intern(name))).collect();
        let context = Telescope::from_entries(vars.iter().map(|var| (*var, nat.clone())).collect());
        (context, vars)
    }

    #[test]
    fn solution_eliminates_variable() {
        let signature = nat_signature();
        let (context, vars) = context(&["m", "n"]);
        let (m, n) = (vars[0], vars[1]);

        let outcome = unify(Env::new(&signature), context, [(Term::var(m), succ(Term::var(n)))]);
        match outcome {
            Ok(Outcome::Success(unifier)) => {
                assert_eq!(unifier.context.vars().collect::<Vec<_>>(), vec![n]);
                assert!(unifier.subst.contains(m));
            }
            _ => panic!("expected a unifier"),
        }
    }

    #[test]
    fn later_variable_is_eliminated() {
        let signature = nat_signature();
        let (context, vars) = context(&["m", "n"]);
        let (m, n) = (vars[0], vars[1]);

        let outcome = unify(Env::new(&signature), context, [(Term::var(m), Term::var(n))]);
        match outcome {
            Ok(Outcome::Success(unifier)) => {
                assert_eq!(unifier.context.vars().collect::<Vec<_>>(), vec![m]);
                assert!(unifier.subst.contains(n));
            }
            _ => panic!("expected a unifier"),
        }
    }

    #[test]
    fn injectivity_and_conflict() {
        let signature = nat_signature();
        let (context, vars) = context(&["n"]);
        let n = vars[0];

        let outcome = unify(
            Env::new(&signature),
            context.clone(),
            [(succ(Term::var(n)), succ(zero()))],
        );
        assert!(matches!(outcome, Ok(Outcome::Success(unifier)) if unifier.context.is_empty()));

        let outcome = unify(Env::new(&signature), context, [(succ(Term::var(n)), zero())]);
        assert!(matches!(outcome, Ok(Outcome::Conflict)));
    }

    #[test]
    fn cycle_is_a_conflict() {
        let signature = nat_signature();
        let (context, vars) = context(&["n"]);
        let n = vars[0];

        let outcome = unify(Env::new(&signature), context, [(Term::var(n), succ(Term::var(n)))]);
        assert!(matches!(outcome, Ok(Outcome::Conflict)));
    }

    #[test]
    fn opaque_functions_are_stuck() {
        let mut signature = nat_signature();
        let double = Symbol::intern("double");
        let nat = Term::global(Symbol::intern("Nat"));
        signature.add_axiom(double, Term::arrow(nat.clone(), nat));

        let (context, vars) = context(&["n"]);
        let n = vars[0];
        let lhs = Term::fun_app(Term::global(double), Term::var(n));

        let outcome = unify(Env::new(&signature), context, [(lhs, succ(zero()))]);
        assert!(matches!(outcome, Err(Error::Stuck { .. })));
    }
}
