//! Bidirectional type checking of core terms.
//!
//! This is the oracle that the pattern-matching compiler relies on: it
//! reports the constructors a variable can be split on, and checks that
//! synthesized terms have the types they should have.

use std::fmt;

use crate::core::pretty;
use crate::core::semantics::{Env, Subst};
use crate::core::unification::{self, Outcome};
use crate::core::{ArcTerm, Branch, Telescope, Term};
use crate::symbol::{Symbol, Var};

/// Type errors reported by the oracle.
#[derive(Debug, Clone)]
pub enum TypeError {
    UnboundVariable(Var),
    UnboundGlobal(Symbol),
    /// The type of a term was not convertible with the type it was expected
    /// to have.
    Mismatch {
        context: Telescope,
        term: ArcTerm,
        expected: ArcTerm,
        found: ArcTerm,
    },
    /// A term was applied to an argument, but its type is not a function
    /// type.
    NotAFunction { context: Telescope, head_type: ArcTerm },
    /// A variable was split on, but its type is not an inductive family.
    NotAnInductive { context: Telescope, r#type: ArcTerm },
    /// Case splits may only inspect local variables.
    CaseOnNonVariable { scrut: ArcTerm },
    /// A possible constructor has no branch in a case split.
    MissingBranch { context: Telescope, ctor: Symbol },
    /// A constructor that is ruled out by unification has a branch.
    ImpossibleBranch { ctor: Symbol },
    /// A branch does not correspond to any constructor of the scrutinee.
    UnexpectedBranch { ctor: Symbol },
    /// A constructor was given the wrong number of fields.
    FieldCountMismatch { ctor: Symbol, expected: usize, found: usize },
    /// A variable was eliminated as empty, but a constructor is possible.
    NotEmpty { var: Var, ctor: Symbol },
    /// An absurd clause was matched, but no variable in its context is
    /// provably empty.
    NoEmptyVariable { context: Telescope },
    /// Case splits must be checked against a known type.
    AmbiguousCase,
    /// Unification of indices failed to make progress.
    Unification {
        context: Telescope,
        error: unification::Error,
    },
}

impl fmt::Display for TypeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let pp = pretty::Context::new();
        match self {
            TypeError::UnboundVariable(var) => write!(f, "unbound local variable `{}`", var.name()),
            TypeError::UnboundGlobal(name) => write!(f, "cannot find `{name}` in the signature"),
            TypeError::Mismatch {
                context,
                term,
                expected,
                found,
            } => {
                pp.bind_telescope(context);
                write!(
                    f,
                    "mismatched types: expected `{}`, found `{}` for `{}`",
                    pp.render(expected),
                    pp.render(found),
                    pp.render(term),
                )
            }
            TypeError::NotAFunction { context, head_type } => {
                pp.bind_telescope(context);
                write!(f, "expected a function, found a term of type `{}`", pp.render(head_type))
            }
            TypeError::NotAnInductive { context, r#type } => {
                pp.bind_telescope(context);
                write!(f, "cannot split on a value of type `{}`", pp.render(r#type))
            }
            TypeError::CaseOnNonVariable { scrut } => {
                write!(f, "cannot split on the non-variable term `{}`", pp.render(scrut))
            }
            TypeError::MissingBranch { ctor, .. } => write!(f, "missing branch for `{ctor}`"),
            TypeError::ImpossibleBranch { ctor } => write!(f, "branch for impossible constructor `{ctor}`"),
            TypeError::UnexpectedBranch { ctor } => write!(f, "unexpected branch for `{ctor}`"),
            TypeError::FieldCountMismatch {
                ctor,
                expected,
                found,
            } => write!(f, "constructor `{ctor}` expects {expected} fields, found {found}"),
            TypeError::NotEmpty { var, ctor } => write!(
                f,
                "`{}` is not provably empty: constructor `{ctor}` is possible",
                var.name(),
            ),
            TypeError::NoEmptyVariable { context } => {
                let names = pp.render_telescope(context);
                match names.is_empty() {
                    true => write!(f, "no variable is provably empty in an empty context"),
                    false => write!(f, "none of `{}` is provably empty", names.join("`, `")),
                }
            }
            TypeError::AmbiguousCase => write!(f, "cannot infer the type of a case split"),
            TypeError::Unification { context, error } => {
                pp.bind_telescope(context);
                match error {
                    unification::Error::Stuck { lhs, rhs } => write!(
                        f,
                        "cannot unify `{}` with `{}` while splitting",
                        pp.render(lhs),
                        pp.render(rhs),
                    ),
                    unification::Error::Occurs { var, term } => write!(
                        f,
                        "`{}` occurs in its own solution `{}`",
                        pp.render(&Term::var(*var)),
                        pp.render(term),
                    ),
                    unification::Error::IllScopedContext => {
                        write!(f, "context is ill-scoped after unification")
                    }
                }
            }
        }
    }
}

/// The outcome of splitting a variable on one of its constructors.
#[derive(Debug, Clone)]
pub enum Candidate {
    Possible(Refinement),
    Impossible { ctor: Symbol },
}

impl Candidate {
    pub fn ctor(&self) -> Symbol {
        match self {
            Candidate::Possible(refinement) => refinement.ctor,
            Candidate::Impossible { ctor } => *ctor,
        }
    }
}

/// A context refined by splitting a variable on a constructor.
#[derive(Debug, Clone)]
pub struct Refinement {
    pub ctor: Symbol,
    /// The fields of the constructor, in the order they are bound.
    pub fields: Vec<Var>,
    /// The context, with the split variable replaced by the fields and with
    /// the variables solved by unification removed.
    pub context: Telescope,
    /// The substitution forced on the original context. It maps the split
    /// variable to the constructor application.
    pub subst: Subst,
}

/// Bidirectional type checker.
#[derive(Clone, Copy)]
pub struct Checker<'a> {
    env: Env<'a>,
}

impl<'a> Checker<'a> {
    pub fn new(env: Env<'a>) -> Checker<'a> {
        Checker { env }
    }

    pub fn env(&self) -> Env<'a> {
        self.env
    }

    /// The constructor oracle: every constructor of the variable's type, with
    /// the refinement it forces, in declaration order.
    pub fn constructors(&self, context: &Telescope, var: Var) -> Result<Vec<Candidate>, TypeError> {
        let (inductive, _) = self.split_type(context, var)?;
        let ctors = self.env.signature().inductive(inductive).map(|i| i.ctors.clone());
        (ctors.unwrap_or_default().into_iter())
            .map(|ctor| self.refine(context, var, ctor, None))
            .collect()
    }

    fn split_type(&self, context: &Telescope, var: Var) -> Result<(Symbol, Vec<ArcTerm>), TypeError> {
        let r#type = context.get(var).ok_or(TypeError::UnboundVariable(var))?;
        let r#type = self.env.whnf(r#type);
        match Term::global_spine(&r#type) {
            Some((name, args)) if self.env.signature().inductive(name).is_some() => Ok((name, args)),
            _ => Err(TypeError::NotAnInductive {
                context: context.clone(),
                r#type,
            }),
        }
    }

    /// Split `var` on the constructor `ctor`, optionally reusing existing
    /// variables for its fields.
    pub fn refine(
        &self,
        context: &Telescope,
        var: Var,
        ctor_name: Symbol,
        field_vars: Option<&[Var]>,
    ) -> Result<Candidate, TypeError> {
        let signature = self.env.signature();
        let (inductive_name, args) = self.split_type(context, var)?;
        let ctor = (signature.constructor(ctor_name))
            .filter(|ctor| ctor.inductive == inductive_name)
            .ok_or(TypeError::UnexpectedBranch { ctor: ctor_name })?;

        if let Some(field_vars) = field_vars {
            if field_vars.len() != ctor.num_fields {
                return Err(TypeError::FieldCountMismatch {
                    ctor: ctor_name,
                    expected: ctor.num_fields,
                    found: field_vars.len(),
                });
            }
        }

        let (params, indices) = args.split_at(ctor.num_params.min(args.len()));
        let mut r#type = (self.env.instantiate(&ctor.r#type, params))
            .ok_or(TypeError::UnexpectedBranch { ctor: ctor_name })?;

        let mut fields = Telescope::new();
        for index in 0..ctor.num_fields {
            let next = match self.env.whnf(&r#type).as_ref() {
                Term::FunType(binder, param_type, body_type) => {
                    let field = match field_vars {
                        Some(field_vars) => field_vars[index],
                        None if binder.name().is_underscore() => {
                            Var::fresh(Symbol::get_alphabetic_name(index))
                        }
                        None => binder.refresh(),
                    };
                    fields.push(field, param_type.clone());
                    Subst::single(*binder, Term::var(field)).apply(body_type)
                }
                _ => return Err(TypeError::UnexpectedBranch { ctor: ctor_name }),
            };
            r#type = next;
        }

        let ctor_indices = match Term::global_spine(&self.env.whnf(&r#type)) {
            Some((_, ctor_args)) => ctor_args.get(ctor.num_params..).unwrap_or_default().to_vec(),
            None => Vec::new(),
        };

        let ctor_term = Term::fun_apps(
            Term::global(ctor_name),
            params.iter().cloned().chain(fields.args()),
        );
        let split = Subst::single(var, ctor_term);

        let position = context.position(var).ok_or(TypeError::UnboundVariable(var))?;
        let mut entries = context.entries()[..position].to_vec();
        entries.extend(fields.iter().cloned());
        entries.extend(
            (context.entries()[(position + 1)..].iter())
                .map(|(var, r#type)| (*var, split.apply(r#type))),
        );
        let refined = Telescope::from_entries(entries);

        let equations = Iterator::zip(ctor_indices.into_iter(), indices.iter().cloned());
        match unification::unify(self.env, refined.clone(), equations) {
            Ok(Outcome::Success(unifier)) => Ok(Candidate::Possible(Refinement {
                ctor: ctor_name,
                fields: fields.vars().collect(),
                context: unifier.context,
                subst: split.compose(&unifier.subst),
            })),
            Ok(Outcome::Conflict) => Ok(Candidate::Impossible { ctor: ctor_name }),
            Err(error) => Err(TypeError::Unification {
                context: refined,
                error,
            }),
        }
    }

    /// Find a variable in the context whose type has no possible constructors.
    pub fn find_empty(&self, context: &Telescope) -> Option<Var> {
        context.vars().find(|var| match self.constructors(context, *var) {
            Ok(candidates) => (candidates.iter()).all(|c| matches!(c, Candidate::Impossible { .. })),
            Err(_) => false,
        })
    }

    pub fn check_type(&self, context: &Telescope, term: &ArcTerm) -> Result<(), TypeError> {
        self.check(context, term, &Term::universe())
    }

    pub fn synth(&self, context: &Telescope, term: &ArcTerm) -> Result<ArcTerm, TypeError> {
        match term.as_ref() {
            Term::Universe => Ok(Term::universe()),
            Term::LocalVar(var) => context.get(*var).cloned().ok_or(TypeError::UnboundVariable(*var)),
            Term::Global(name) => (self.env.signature().r#type(*name).cloned())
                .ok_or(TypeError::UnboundGlobal(*name)),
            Term::FunType(var, param_type, body_type) => {
                self.check_type(context, param_type)?;
                let mut context = context.clone();
                context.push(*var, param_type.clone());
                self.check_type(&context, body_type)?;
                Ok(Term::universe())
            }
            Term::FunLit(var, param_type, body) => {
                self.check_type(context, param_type)?;
                let mut body_context = context.clone();
                body_context.push(*var, param_type.clone());
                let body_type = self.synth(&body_context, body)?;
                Ok(std::sync::Arc::new(Term::FunType(*var, param_type.clone(), body_type)))
            }
            Term::FunApp(head, arg) => {
                let head_type = self.synth(context, head)?;
                match self.env.whnf(&head_type).as_ref() {
                    Term::FunType(var, param_type, body_type) => {
                        self.check(context, arg, param_type)?;
                        Ok(Subst::single(*var, arg.clone()).apply(body_type))
                    }
                    _ => Err(TypeError::NotAFunction {
                        context: context.clone(),
                        head_type,
                    }),
                }
            }
            Term::Ann(term, r#type) => {
                self.check_type(context, r#type)?;
                self.check(context, term, r#type)?;
                Ok(r#type.clone())
            }
            Term::Case(_, _) | Term::Absurd(_) => Err(TypeError::AmbiguousCase),
        }
    }

    pub fn check(&self, context: &Telescope, term: &ArcTerm, expected: &ArcTerm) -> Result<(), TypeError> {
        match term.as_ref() {
            Term::FunLit(var, param_type, body) => match self.env.whnf(expected).as_ref() {
                Term::FunType(expected_var, expected_param, expected_body) => {
                    self.check_type(context, param_type)?;
                    if !self.env.is_convertible(param_type, expected_param) {
                        return Err(TypeError::Mismatch {
                            context: context.clone(),
                            term: Term::var(*var),
                            expected: expected_param.clone(),
                            found: param_type.clone(),
                        });
                    }
                    let mut body_context = context.clone();
                    body_context.push(*var, param_type.clone());
                    let body_type = Subst::single(*expected_var, Term::var(*var)).apply(expected_body);
                    self.check(&body_context, body, &body_type)
                }
                _ => self.check_synth(context, term, expected),
            },
            Term::Case(scrut, branches) => self.check_case(context, scrut, branches, expected),
            Term::Absurd(scrut) => self.check_absurd(context, scrut),
            _ => self.check_synth(context, term, expected),
        }
    }

    fn check_synth(&self, context: &Telescope, term: &ArcTerm, expected: &ArcTerm) -> Result<(), TypeError> {
        let found = self.synth(context, term)?;
        match self.env.is_convertible(&found, expected) {
            true => Ok(()),
            false => Err(TypeError::Mismatch {
                context: context.clone(),
                term: term.clone(),
                expected: expected.clone(),
                found,
            }),
        }
    }

    fn check_case(
        &self,
        context: &Telescope,
        scrut: &ArcTerm,
        branches: &[Branch],
        expected: &ArcTerm,
    ) -> Result<(), TypeError> {
        let var = match scrut.as_var().filter(|var| context.contains(*var)) {
            Some(var) => var,
            None => {
                // Case splits on constructors can be reduced away
                let reduced = self.env.whnf(&std::sync::Arc::new(Term::Case(
                    scrut.clone(),
                    branches.to_vec(),
                )));
                return match reduced.as_ref() {
                    Term::Case(scrut, _) => Err(TypeError::CaseOnNonVariable { scrut: scrut.clone() }),
                    _ => self.check(context, &reduced, expected),
                };
            }
        };

        let (inductive, _) = self.split_type(context, var)?;
        let ctors = (self.env.signature().inductive(inductive))
            .map(|inductive| inductive.ctors.clone())
            .unwrap_or_default();

        for (index, branch) in branches.iter().enumerate() {
            let is_duplicate = branches[..index].iter().any(|other| other.ctor == branch.ctor);
            if is_duplicate || !ctors.contains(&branch.ctor) {
                return Err(TypeError::UnexpectedBranch { ctor: branch.ctor });
            }
        }

        for ctor in ctors {
            let branch = branches.iter().find(|branch| branch.ctor == ctor);
            let field_vars = branch.map(|branch| branch.fields.as_slice());
            match (self.refine(context, var, ctor, field_vars)?, branch) {
                (Candidate::Possible(refinement), Some(branch)) => {
                    let body = refinement.subst.apply(&branch.body);
                    let expected = refinement.subst.apply(expected);
                    self.check(&refinement.context, &body, &expected)?;
                }
                (Candidate::Possible(_), None) => {
                    return Err(TypeError::MissingBranch {
                        context: context.clone(),
                        ctor,
                    });
                }
                (Candidate::Impossible { .. }, Some(_)) => {
                    return Err(TypeError::ImpossibleBranch { ctor });
                }
                (Candidate::Impossible { .. }, None) => {}
            }
        }

        Ok(())
    }

    fn check_absurd(&self, context: &Telescope, scrut: &ArcTerm) -> Result<(), TypeError> {
        let var = (scrut.as_var().filter(|var| context.contains(*var)))
            .ok_or_else(|| TypeError::CaseOnNonVariable { scrut: scrut.clone() })?;
        for candidate in self.constructors(context, var)? {
            if let Candidate::Possible(refinement) = candidate {
                return Err(TypeError::NotEmpty {
                    var,
                    ctor: refinement.ctor,
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::core::signature::{Constructor, Inductive, Signature};

    /// `Nat`, and `Vec (A : Type) : Nat -> Type`.
    fn signature() -> Signature {
        let nat = Symbol::intern("Nat");
        let zero = Symbol::intern("zero");
        let succ = Symbol::intern("succ");
        let vec = Symbol::intern("Vec");
        let vnil = Symbol::intern("vnil");
        let vcons = Symbol::intern("vcons");

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

        let a = Var::fresh(Symbol::intern("A"));
        let n = Var::fresh(Symbol::intern("n"));
        let mut params = Telescope::new();
        params.push(a, Term::universe());
        let vec_of = |index: ArcTerm| Term::fun_apps(Term::global(vec), [Term::var(a), index]);

        signature.add_inductive(
            Inductive {
                name: vec,
                params: params.clone(),
                r#type: Term::fun_types(&params, Term::arrow(Term::global(nat), Term::universe())),
                ctors: vec![vnil, vcons],
            },
            vec![
                Constructor {
                    name: vnil,
                    inductive: vec,
                    num_params: 1,
                    num_fields: 0,
                    r#type: Term::fun_types(&params, vec_of(Term::global(zero))),
                },
                Constructor {
                    name: vcons,
                    inductive: vec,
                    num_params: 1,
                    num_fields: 3,
                    r#type: Term::fun_types(
                        &params,
                        Arc::new(Term::FunType(
                            n,
                            Term::global(nat),
                            Term::arrow(
                                Term::var(a),
                                Term::arrow(
                                    vec_of(Term::var(n)),
                                    vec_of(Term::fun_app(Term::global(succ), Term::var(n))),
                                ),
                            ),
                        )),
                    ),
                },
            ],
        );

        signature
    }

    fn vec_type(a: Var, index: ArcTerm) -> ArcTerm {
        Term::fun_apps(Term::global(Symbol::intern("Vec")), [Term::var(a), index])
    }

    #[test]
    fn oracle_refines_indices() {
        let signature = signature();
        let checker = Checker::new(Env::new(&signature));

        let a = Var::fresh(Symbol::intern("A"));
        let n = Var::fresh(Symbol::intern("n"));
        let xs = Var::fresh(Symbol::intern("xs"));
        let mut context = Telescope::new();
        context.push(a, Term::universe());
        context.push(n, Term::global(Symbol::intern("Nat")));
        context.push(xs, vec_type(a, Term::var(n)));

        let candidates = checker.constructors(&context, xs).unwrap();
        assert_eq!(candidates.len(), 2);
        for candidate in candidates {
            match candidate {
                Candidate::Possible(refinement) => {
                    // `n` is solved in both branches
                    assert!(refinement.subst.contains(n));
                    assert!(!refinement.context.contains(n));
                    assert!(!refinement.context.contains(xs));
                }
                Candidate::Impossible { .. } => panic!("both constructors are possible"),
            }
        }
    }

    #[test]
    fn oracle_rules_out_conflicts() {
        let signature = signature();
        let checker = Checker::new(Env::new(&signature));

        let a = Var::fresh(Symbol::intern("A"));
        let xs = Var::fresh(Symbol::intern("xs"));
        let mut context = Telescope::new();
        context.push(a, Term::universe());
        context.push(xs, vec_type(a, Term::global(Symbol::intern("zero"))));

        let candidates = checker.constructors(&context, xs).unwrap();
        assert!(matches!(&candidates[0], Candidate::Possible(_)));
        assert!(matches!(&candidates[1], Candidate::Impossible { .. }));
    }

    #[test]
    fn case_split_with_missing_impossible_branch() {
        let signature = signature();
        let checker = Checker::new(Env::new(&signature));

        let a = Var::fresh(Symbol::intern("A"));
        let xs = Var::fresh(Symbol::intern("xs"));
        let mut context = Telescope::new();
        context.push(a, Term::universe());
        context.push(xs, vec_type(a, Term::global(Symbol::intern("zero"))));

        let nat = Term::global(Symbol::intern("Nat"));
        let zero = Term::global(Symbol::intern("zero"));
        let term = Arc::new(Term::Case(
            Term::var(xs),
            vec![Branch {
                ctor: Symbol::intern("vnil"),
                fields: Vec::new(),
                body: zero.clone(),
            }],
        ));
        assert!(checker.check(&context, &term, &nat).is_ok());

        let missing = Arc::new(Term::Case(Term::var(xs), Vec::new()));
        assert!(checker.check(&context, &missing, &nat).is_err());
    }

    #[test]
    fn application_mismatch() {
        let signature = signature();
        let checker = Checker::new(Env::new(&signature));
        let term = Term::fun_app(Term::global(Symbol::intern("succ")), Term::universe());
        let error = checker.synth(&Telescope::new(), &term).unwrap_err();
        assert!(matches!(error, TypeError::Mismatch { .. }));
        assert!(error.to_string().starts_with("mismatched types"));
    }
}
